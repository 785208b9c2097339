mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::model::*;
use crate::schema::Table;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{table} row {id} not found")]
    NotFound { table: Table, id: i64 },
    /// A read could not be served. Callers decide whether that means "empty".
    #[error("{table} unavailable: {reason}")]
    Unavailable { table: Table, reason: String },
    #[error("write to {table} failed: {reason}")]
    Write { table: Table, reason: String },
    /// A conditional write found the row in an unexpected state.
    #[error("precondition failed: {0}")]
    Precondition(&'static str),
    #[error("snapshot io: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot format: {0}")]
    Format(#[from] serde_json::Error),
    #[error(transparent)]
    Document(#[from] crate::schema::NotADocument),
}

/// Persistence collaborator. Every record the scheduler reads or writes goes
/// through here; implementations own storage, the scheduler owns the rules.
#[async_trait]
pub trait Store: Send + Sync {
    /// Full room inventory.
    async fn rooms(&self) -> Result<Vec<Room>, StoreError>;

    /// Every assignment, ordered by id.
    async fn assignments(&self) -> Result<Vec<Assignment>, StoreError>;

    async fn sections(&self) -> Result<Vec<Section>, StoreError>;

    async fn courses(&self) -> Result<Vec<Course>, StoreError>;

    async fn departments(&self) -> Result<Vec<Department>, StoreError>;

    async fn room(&self, room_id: RoomId) -> Result<Option<Room>, StoreError>;

    /// Every assignment booked in the room, regardless of status.
    async fn assignments_for_room(&self, room_id: RoomId) -> Result<Vec<Assignment>, StoreError>;

    async fn blackouts_for_room(&self, room_id: RoomId) -> Result<Vec<BlackoutWindow>, StoreError>;

    async fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError>;

    async fn class_request(&self, id: RequestId) -> Result<Option<ClassRequest>, StoreError>;

    async fn equipment_requests(&self, request_id: RequestId) -> Result<Vec<EquipmentRequest>, StoreError>;

    /// Insert a new request in `pending` state.
    async fn insert_request(&self, draft: RequestDraft) -> Result<ClassRequest, StoreError>;

    async fn insert_equipment_request(&self, row: EquipmentRequest) -> Result<(), StoreError>;

    async fn insert_blackout(&self, draft: BlackoutDraft) -> Result<BlackoutWindow, StoreError>;

    async fn insert_room_equipment(&self, row: RoomEquipment) -> Result<(), StoreError>;

    /// Insert the assignment and mark its request `assigned` as one write.
    /// Fails with [`StoreError::Precondition`] if the request is not pending;
    /// nothing is written in that case.
    async fn commit_acceptance(&self, draft: AssignmentDraft) -> Result<Assignment, StoreError>;

    async fn update_assignment(&self, id: AssignmentId, patch: AssignmentPatch) -> Result<(), StoreError>;

    /// Rewrite a request's interval and preferred room. Fails with
    /// [`StoreError::Precondition`] unless the request is still pending, checked
    /// in the same step as the write.
    async fn update_request(&self, id: RequestId, patch: RequestPatch) -> Result<(), StoreError>;
}
