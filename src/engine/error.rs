use std::fmt;

use serde::Serialize;

use crate::model::RequestId;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Request,
    Room,
    Assignment,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Request => "class request",
            Entity::Room => "room",
            Entity::Assignment => "assignment",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },
    #[error("start or end time is missing or malformed")]
    InvalidInterval,
    #[error("class request {0} is already assigned")]
    AlreadyAssigned(RequestId),
    #[error("class request {request_id} is {status}, not pending")]
    NotPending { request_id: RequestId, status: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ScheduleError {
    pub(super) fn not_found(entity: Entity, id: i64) -> Self {
        ScheduleError::NotFound { entity, id }
    }
}
