use std::collections::HashSet;

use tracing::{debug, trace};

use crate::model::*;

use super::conflict::{check_conflict, Check, FetchPolicy};
use super::exclusion::ExclusionSource;
use super::ranking::rank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SuggestError {
    #[error("request is missing valid start/end times")]
    InvalidRequestInterval,
    #[error("no available room found for this time slot")]
    Exhausted,
}

/// First-fit search: the first ranked room with no conflict for the request's
/// interval.
pub async fn suggest<'r>(
    sources: &[Box<dyn ExclusionSource + '_>],
    request: &ClassRequest,
    rooms: &'r [Room],
    policy: FetchPolicy,
) -> Result<(RoomId, &'r Room), SuggestError> {
    suggest_from(sources, request, rooms, policy, &HashSet::new()).await
}

/// [`suggest`], also passing over every room in `skip`.
pub async fn suggest_from<'r>(
    sources: &[Box<dyn ExclusionSource + '_>],
    request: &ClassRequest,
    rooms: &'r [Room],
    policy: FetchPolicy,
    skip: &HashSet<RoomId>,
) -> Result<(RoomId, &'r Room), SuggestError> {
    let span = request.span().ok_or(SuggestError::InvalidRequestInterval)?;
    let mut checked = 0u64;

    for room in rank(rooms, request.preferred_building()) {
        let Some(room_id) = room.key() else {
            trace!(room_id = %room.room_id, "skipping room with non-numeric id");
            continue;
        };
        if skip.contains(&room_id) {
            continue;
        }
        checked += 1;
        match check_conflict(sources, room_id, &span, None, policy).await {
            Check::Free => {
                metrics::histogram!(crate::observability::SUGGEST_CANDIDATES_CHECKED).record(checked as f64);
                debug!(request_id = request.request_id, room_id, checked, "suggested {}", room.label());
                return Ok((room_id, room));
            }
            Check::Conflict(c) => {
                trace!(room_id, "candidate rejected: {} conflict at {}", c.kind, c.span);
            }
            Check::Unverified { kind, .. } => {
                trace!(room_id, "candidate rejected: {kind} source unavailable");
            }
        }
    }

    metrics::histogram!(crate::observability::SUGGEST_CANDIDATES_CHECKED).record(checked as f64);
    Err(SuggestError::Exhausted)
}
