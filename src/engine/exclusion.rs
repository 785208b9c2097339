use async_trait::async_trait;

use crate::model::*;
use crate::store::{Store, StoreError};

/// One booked or blocked interval in a room, timestamps still raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedSlot {
    pub kind: ConflictKind,
    /// Set for assignment slots so a moving assignment can skip itself.
    pub assignment_id: Option<AssignmentId>,
    pub start: String,
    pub end: String,
}

impl BlockedSlot {
    pub fn span(&self) -> Option<Span> {
        Span::parse(&self.start, &self.end)
    }
}

/// A collection of intervals that can invalidate a slot for a room.
///
/// `Ok(vec![])` means the room has nothing booked here; `Err` means the source
/// could not be read. The two are never conflated.
#[async_trait]
pub trait ExclusionSource: Send + Sync {
    fn kind(&self) -> ConflictKind;

    /// Every slot for the room. No date filtering; callers apply the overlap test.
    async fn slots_for_room(&self, room_id: RoomId) -> Result<Vec<BlockedSlot>, StoreError>;
}

pub struct AssignmentSource<'a> {
    store: &'a dyn Store,
}

impl<'a> AssignmentSource<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ExclusionSource for AssignmentSource<'_> {
    fn kind(&self) -> ConflictKind {
        ConflictKind::Assignment
    }

    async fn slots_for_room(&self, room_id: RoomId) -> Result<Vec<BlockedSlot>, StoreError> {
        let rows = self.store.assignments_for_room(room_id).await?;
        Ok(rows
            .into_iter()
            .map(|a| BlockedSlot {
                kind: ConflictKind::Assignment,
                assignment_id: Some(a.assignment_id),
                start: a.start,
                end: a.end,
            })
            .collect())
    }
}

pub struct BlackoutSource<'a> {
    store: &'a dyn Store,
}

impl<'a> BlackoutSource<'a> {
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ExclusionSource for BlackoutSource<'_> {
    fn kind(&self) -> ConflictKind {
        ConflictKind::Blackout
    }

    async fn slots_for_room(&self, room_id: RoomId) -> Result<Vec<BlockedSlot>, StoreError> {
        let rows = self.store.blackouts_for_room(room_id).await?;
        Ok(rows
            .into_iter()
            .map(|b| BlockedSlot {
                kind: ConflictKind::Blackout,
                assignment_id: None,
                start: b.start,
                end: b.end,
            })
            .collect())
    }
}

pub type Sources<'a> = Vec<Box<dyn ExclusionSource + 'a>>;

/// Assignments first, then blackout windows.
pub fn standard_sources(store: &dyn Store) -> Sources<'_> {
    vec![
        Box::new(AssignmentSource::new(store)),
        Box::new(BlackoutSource::new(store)),
    ]
}
