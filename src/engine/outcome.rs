use serde::Serialize;

use crate::model::*;

use super::conflict::Check;
use super::error::{Entity, ScheduleError};

/// What happened to the room's equipment inventory after an acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Propagation {
    NotRequested,
    Applied { equip_id: EquipId, quantity: i64 },
    /// The assignment stands; only the inventory update was lost.
    Failed { reason: String },
}

/// Result of an accept or update. Every failure the caller can act on is a
/// variant here; nothing is raised past the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Assigned {
        room: Room,
        assignment_id: AssignmentId,
        equipment: Propagation,
    },
    ConflictDetected {
        kind: ConflictKind,
        span: Span,
    },
    NoRoomAvailable,
    InvalidInterval,
    NotFound {
        entity: Entity,
        id: i64,
    },
    AlreadyAssigned {
        request_id: RequestId,
    },
    /// The request is in a state other than pending or assigned.
    NotPending {
        request_id: RequestId,
        status: String,
    },
    SourceUnavailable {
        kind: ConflictKind,
        reason: String,
    },
    StoreFailure {
        reason: String,
    },
}

impl Outcome {
    pub fn is_assigned(&self) -> bool {
        matches!(self, Outcome::Assigned { .. })
    }

    /// Human-readable message for the presentation layer.
    pub fn message(&self) -> String {
        match self {
            Outcome::Assigned { room, .. } => format!("assigned to {}", room.label()),
            Outcome::ConflictDetected { kind: ConflictKind::Assignment, span } => {
                format!("that room is already booked during {span}")
            }
            Outcome::ConflictDetected { kind: ConflictKind::Blackout, span } => {
                format!("that room is unavailable during {span} due to blackout hours")
            }
            Outcome::NoRoomAvailable => "no available room found for this time slot".into(),
            Outcome::InvalidInterval => "start or end time is missing or malformed".into(),
            Outcome::NotFound { entity, id } => format!("{entity} {id} not found"),
            Outcome::AlreadyAssigned { request_id } => {
                format!("class request {request_id} is already assigned")
            }
            Outcome::NotPending { request_id, status } => {
                format!("class request {request_id} is {status}, not pending")
            }
            Outcome::SourceUnavailable { kind, reason } => {
                format!("could not verify {kind} conflicts: {reason}")
            }
            Outcome::StoreFailure { reason } => format!("storage error: {reason}"),
        }
    }
}

impl From<ScheduleError> for Outcome {
    fn from(e: ScheduleError) -> Self {
        match e {
            ScheduleError::NotFound { entity, id } => Outcome::NotFound { entity, id },
            ScheduleError::InvalidInterval => Outcome::InvalidInterval,
            ScheduleError::AlreadyAssigned(request_id) => Outcome::AlreadyAssigned { request_id },
            ScheduleError::NotPending { request_id, status } => Outcome::NotPending { request_id, status },
            ScheduleError::Store(e) => Outcome::StoreFailure { reason: e.to_string() },
        }
    }
}

/// The outcome a non-free check turns into; `None` when the slot is free.
pub(super) fn rejection(check: Check) -> Option<Outcome> {
    match check {
        Check::Free => None,
        Check::Conflict(c) => Some(Outcome::ConflictDetected {
            kind: c.kind,
            span: c.span,
        }),
        Check::Unverified { kind, reason } => Some(Outcome::SourceUnavailable { kind, reason }),
    }
}
