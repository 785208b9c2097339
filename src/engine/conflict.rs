use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::*;

use super::exclusion::ExclusionSource;

/// What an unreadable exclusion source means for the slot being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPolicy {
    /// Treat the source as empty and carry on.
    FailOpen,
    /// Report the slot as unverified.
    #[default]
    FailClosed,
}

impl FromStr for FetchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "fail-open" | "fail_open" => Ok(FetchPolicy::FailOpen),
            "closed" | "fail-closed" | "fail_closed" => Ok(FetchPolicy::FailClosed),
            other => Err(format!("unknown fetch policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub kind: ConflictKind,
    /// The existing interval that was hit.
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Free,
    Conflict(Conflict),
    /// A source could not be read under [`FetchPolicy::FailClosed`].
    Unverified { kind: ConflictKind, reason: String },
}

impl Check {
    pub fn is_free(&self) -> bool {
        matches!(self, Check::Free)
    }
}

/// Scan every source for an interval in `room_id` overlapping `span`.
///
/// Sources are consulted in order and the first overlap wins. Slots whose
/// bounds do not normalize are skipped, never treated as conflicts.
/// `exclude` names an assignment that must not conflict with itself.
pub async fn check_conflict(
    sources: &[Box<dyn ExclusionSource + '_>],
    room_id: RoomId,
    span: &Span,
    exclude: Option<AssignmentId>,
    policy: FetchPolicy,
) -> Check {
    for source in sources {
        let kind = source.kind();
        let slots = match source.slots_for_room(room_id).await {
            Ok(slots) => slots,
            Err(e) => {
                metrics::counter!(crate::observability::FETCH_FAILURES_TOTAL, "source" => kind.label())
                    .increment(1);
                match policy {
                    // Fail-open favours availability over correctness: a room whose
                    // bookings cannot be read is assumed free of this source's
                    // conflicts, so a double-booking can slip through.
                    FetchPolicy::FailOpen => {
                        warn!(room_id, source = kind.label(), "exclusion fetch failed, assuming no conflicts: {e}");
                        continue;
                    }
                    FetchPolicy::FailClosed => {
                        warn!(room_id, source = kind.label(), "exclusion fetch failed: {e}");
                        return Check::Unverified {
                            kind,
                            reason: e.to_string(),
                        };
                    }
                }
            }
        };

        for slot in &slots {
            if exclude.is_some() && slot.assignment_id == exclude {
                continue;
            }
            let Some(existing) = slot.span() else {
                debug!(room_id, start = %slot.start, end = %slot.end, "skipping unparseable {kind} slot");
                continue;
            };
            if existing.overlaps(span) {
                return Check::Conflict(Conflict { kind, span: existing });
            }
        }
    }
    Check::Free
}
