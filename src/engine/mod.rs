mod conflict;
mod error;
mod exclusion;
mod lifecycle;
mod outcome;
mod ranking;
mod search;
mod suggest;

pub use conflict::{check_conflict, Check, Conflict, FetchPolicy};
pub use error::{Entity, ScheduleError};
pub use exclusion::{standard_sources, AssignmentSource, BlackoutSource, BlockedSlot, ExclusionSource, Sources};
pub use lifecycle::{EquipmentAsk, NewRequest};
pub use outcome::{Outcome, Propagation};
pub use ranking::rank;
pub use search::{AssignmentFilter, SearchHit, TimeFilter};
pub use suggest::{suggest, suggest_from, SuggestError};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::RoomId;
use crate::store::Store;

pub type RoomLock = Arc<Mutex<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub fetch_policy: FetchPolicy,
    /// Auto-suggest rounds before giving up when candidates keep getting
    /// taken between search and commit.
    pub suggest_attempts: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fetch_policy: FetchPolicy::FailClosed,
            suggest_attempts: 3,
        }
    }
}

/// Room scheduling over a [`Store`].
///
/// Every check-then-write runs under the lock of each room it touches, so two
/// requests for the same slot in the same room serialize: the second one's
/// conflict check sees the first one's assignment.
pub struct Scheduler {
    pub(super) store: Arc<dyn Store>,
    pub(super) config: SchedulerConfig,
    room_locks: DashMap<RoomId, RoomLock>,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, config: SchedulerConfig) -> Self {
        Self {
            store,
            config,
            room_locks: DashMap::new(),
        }
    }

    pub(super) fn sources(&self) -> Sources<'_> {
        standard_sources(self.store.as_ref())
    }

    pub(super) async fn lock_room(&self, room_id: RoomId) -> OwnedMutexGuard<()> {
        // Clone out of the map before awaiting so no shard lock is held.
        let lock = self.room_locks.entry(room_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Lock several rooms in ascending id order to prevent deadlocks.
    pub(super) async fn lock_rooms(&self, rooms: &[RoomId]) -> Vec<OwnedMutexGuard<()>> {
        let mut ids = rooms.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.lock_room(id).await);
        }
        guards
    }
}
