use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Minutes since the Unix epoch, wall-clock with no timezone.
pub type Minute = i64;

pub type RoomId = i64;
pub type AssignmentId = i64;
pub type RequestId = i64;
pub type SectionId = i64;
pub type EquipId = i64;

/// Length of the `YYYY-MM-DDTHH:MM` prefix that survives normalization.
const MINUTE_PREFIX_LEN: usize = 16;
const HOUR_ONLY_LEN: usize = 13;
const DATE_ONLY_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unparseable timestamp")]
pub struct Unparseable;

/// Normalize a stored timestamp to minute precision.
///
/// Accepts `YYYY-MM-DDTHH:MM` or `YYYY-MM-DD HH:MM` followed by anything
/// (seconds, fractions, a timezone suffix), all of which are discarded. A bare
/// date means midnight and `YYYY-MM-DDTHH` means the top of that hour.
/// Everything else is `Unparseable`.
pub fn normalize(raw: &str) -> Result<Minute, Unparseable> {
    let text = raw.trim();
    match text.len() {
        DATE_ONLY_LEN => {
            let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| Unparseable)?;
            let midnight = date.and_hms_opt(0, 0, 0).ok_or(Unparseable)?;
            return Ok(to_minute(midnight));
        }
        HOUR_ONLY_LEN => {
            let text = format!("{}:00", text.replacen(' ', "T", 1));
            let dt = NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M").map_err(|_| Unparseable)?;
            return Ok(to_minute(dt));
        }
        _ => {}
    }
    let prefix = text.get(..MINUTE_PREFIX_LEN).ok_or(Unparseable)?;
    let prefix = prefix.replacen(' ', "T", 1);
    let dt = NaiveDateTime::parse_from_str(&prefix, "%Y-%m-%dT%H:%M").map_err(|_| Unparseable)?;
    Ok(to_minute(dt))
}

fn to_minute(dt: NaiveDateTime) -> Minute {
    dt.and_utc().timestamp().div_euclid(60)
}

/// Render a minute back to `YYYY-MM-DDTHH:MM`.
pub fn format_minute(m: Minute) -> String {
    match DateTime::from_timestamp(m.saturating_mul(60), 0) {
        Some(dt) => dt.naive_utc().format("%Y-%m-%dT%H:%M").to_string(),
        None => m.to_string(),
    }
}

/// Half-open interval `[start, end)`.
///
/// `start < end` is not enforced: legacy rows may carry inverted bounds and the
/// overlap predicate is applied to them as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Minute,
    pub end: Minute,
}

impl Span {
    pub fn new(start: Minute, end: Minute) -> Self {
        Self { start, end }
    }

    /// Both bounds must normalize, otherwise there is no span.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self::new(normalize(start).ok()?, normalize(end).ok()?))
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", format_minute(self.start), format_minute(self.end))
    }
}

/// Which exclusion source produced a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Assignment,
    Blackout,
}

impl ConflictKind {
    pub fn label(&self) -> &'static str {
        match self {
            ConflictKind::Assignment => "assignment",
            ConflictKind::Blackout => "blackout",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Records ──────────────────────────────────────────────────────

/// A bookable room. `room_id` is kept as the inventory's text key; rows whose
/// key is not an integer are carried but never offered by the search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub building_id: String,
    #[serde(default)]
    pub room_num: String,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub max_capacity: Option<u32>,
}

impl Room {
    pub fn key(&self) -> Option<RoomId> {
        self.room_id.trim().parse().ok()
    }

    /// `"building room_num"`, the form stored in `ClassRequest::preferred_room`.
    pub fn label(&self) -> String {
        format!("{} {}", self.building_id, self.room_num)
    }
}

/// Workflow state of a class request. Only `Pending` can be accepted or
/// revised. States this crate does not drive (`cancelled`, `denied`, ...) are
/// kept verbatim so a save writes them back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestStatus {
    Pending,
    Assigned,
    Other(String),
}

impl RequestStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Assigned => "assigned",
            RequestStatus::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for RequestStatus {
    fn from(s: String) -> Self {
        if s.trim().eq_ignore_ascii_case("pending") {
            RequestStatus::Pending
        } else if s.trim().eq_ignore_ascii_case("assigned") {
            RequestStatus::Assigned
        } else {
            RequestStatus::Other(s)
        }
    }
}

impl From<RequestStatus> for String {
    fn from(s: RequestStatus) -> Self {
        match s {
            RequestStatus::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRequest {
    pub request_id: RequestId,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    #[serde(default)]
    pub requester: String,
    #[serde(default)]
    pub requested_start: String,
    #[serde(default)]
    pub requested_end: String,
    /// Free text, `"building room_num"`.
    #[serde(default)]
    pub preferred_room: Option<String>,
    pub status: RequestStatus,
}

impl ClassRequest {
    pub fn span(&self) -> Option<Span> {
        Span::parse(&self.requested_start, &self.requested_end)
    }

    /// First whitespace-delimited token of the preferred room text.
    pub fn preferred_building(&self) -> Option<&str> {
        self.preferred_room.as_deref()?.split_whitespace().next()
    }
}

pub const ASSIGNED: &str = "assigned";

/// A booked room interval. Rows imported without an id get one on load;
/// rows with no originating request still block their room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default)]
    pub assignment_id: AssignmentId,
    #[serde(default)]
    pub request_id: Option<RequestId>,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    pub room_id: RoomId,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub status: String,
}

impl Assignment {
    pub fn span(&self) -> Option<Span> {
        Span::parse(&self.start, &self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlackoutWindow {
    #[serde(default)]
    pub blackout_id: i64,
    pub room_id: RoomId,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentRequest {
    pub request_id: RequestId,
    #[serde(default)]
    pub room_id: Option<RoomId>,
    pub equip_id: EquipId,
    #[serde(default)]
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomEquipment {
    pub room_id: RoomId,
    pub equip_id: EquipId,
    pub quantity: i64,
}

// ── Catalogue ────────────────────────────────────────────────

/// Catalogue rows are read-only here; they label search results and are
/// written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub section_id: SectionId,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub section_type: Option<String>,
    #[serde(default)]
    pub section_num: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub course_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub dept_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub dept_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

// ── Write payloads ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentDraft {
    pub request_id: RequestId,
    pub section_id: Option<SectionId>,
    pub room_id: RoomId,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentPatch {
    pub room_id: RoomId,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDraft {
    pub section_id: Option<SectionId>,
    pub requester: String,
    pub requested_start: String,
    pub requested_end: String,
    pub preferred_room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPatch {
    pub requested_start: String,
    pub requested_end: String,
    pub preferred_room: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlackoutDraft {
    pub room_id: RoomId,
    pub start: String,
    pub end: String,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(raw: &str) -> Minute {
        normalize(raw).unwrap()
    }

    #[test]
    fn normalize_truncates_to_minute() {
        let base = at("2025-12-10T09:00");
        assert_eq!(at("2025-12-10T09:00:59"), base);
        assert_eq!(at("2025-12-10T09:00:00.123+02:00"), base);
        assert_eq!(at("2025-12-10 09:00"), base);
        assert_eq!(at("2025-12-10T09:01") - base, 1);
    }

    #[test]
    fn normalize_date_only_is_midnight() {
        assert_eq!(at("2025-12-10"), at("2025-12-10T00:00"));
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert_eq!(normalize(""), Err(Unparseable));
        assert_eq!(normalize("tomorrow morning"), Err(Unparseable));
        assert_eq!(normalize("2025-13-10T09:00"), Err(Unparseable));
        assert_eq!(normalize("2025-12-10T9"), Err(Unparseable));
        assert_eq!(normalize("2025-12-10T09:3"), Err(Unparseable));
        assert_eq!(normalize("2025-12-10T25"), Err(Unparseable));
    }

    #[test]
    fn normalize_hour_only_is_top_of_hour() {
        assert_eq!(at("2025-12-10T09"), at("2025-12-10T09:00"));
        assert_eq!(at("2025-12-10 14"), at("2025-12-10T14:00"));
    }

    #[test]
    fn format_round_trips() {
        assert_eq!(format_minute(at("2025-12-10T09:05")), "2025-12-10T09:05");
    }

    #[test]
    fn span_parse_requires_both_bounds() {
        assert!(Span::parse("2025-12-10T09:00", "2025-12-10T10:00").is_some());
        assert!(Span::parse("2025-12-10T09:00", "soon").is_none());
        assert!(Span::parse("", "2025-12-10T10:00").is_none());
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_overlaps_itself() {
        let a = Span::new(540, 600);
        assert!(a.overlaps(&a));
    }

    #[test]
    fn touching_hours_do_not_overlap() {
        let nine_ten = Span::parse("2025-12-10T09:00", "2025-12-10T10:00").unwrap();
        let ten_eleven = Span::parse("2025-12-10T10:00", "2025-12-10T11:00").unwrap();
        assert!(!nine_ten.overlaps(&ten_eleven));
        assert!(!ten_eleven.overlaps(&nine_ten));
    }

    #[test]
    fn overlap_is_symmetric() {
        let spans = [
            Span::new(0, 10),
            Span::new(5, 15),
            Span::new(10, 20),
            Span::new(-5, 30),
            Span::new(12, 12),
            Span::new(20, 8),
        ];
        for a in &spans {
            for b in &spans {
                assert_eq!(a.overlaps(b), b.overlaps(a), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn room_key_and_label() {
        let room = Room {
            room_id: " 12 ".into(),
            building_id: "ENG".into(),
            room_num: "101".into(),
            room_type: None,
            max_capacity: Some(40),
        };
        assert_eq!(room.key(), Some(12));
        assert_eq!(room.label(), "ENG 101");

        let broken = Room { room_id: "R-12".into(), ..room };
        assert_eq!(broken.key(), None);
    }

    #[test]
    fn preferred_building_is_first_token() {
        let mut req = ClassRequest {
            request_id: 1,
            section_id: None,
            requester: "sec".into(),
            requested_start: String::new(),
            requested_end: String::new(),
            preferred_room: Some("  SCI 204".into()),
            status: RequestStatus::Pending,
        };
        assert_eq!(req.preferred_building(), Some("SCI"));
        req.preferred_room = Some("   ".into());
        assert_eq!(req.preferred_building(), None);
        req.preferred_room = None;
        assert_eq!(req.preferred_building(), None);
    }

    #[test]
    fn request_status_accepts_legacy_casing() {
        let s: RequestStatus = serde_json::from_str("\"Pending\"").unwrap();
        assert_eq!(s, RequestStatus::Pending);
        assert_eq!(serde_json::to_string(&RequestStatus::Assigned).unwrap(), "\"assigned\"");
    }

    #[test]
    fn unknown_request_status_is_kept_verbatim() {
        let s: RequestStatus = serde_json::from_str("\"Cancelled\"").unwrap();
        assert_eq!(s, RequestStatus::Other("Cancelled".into()));
        assert_eq!(serde_json::to_string(&s).unwrap(), "\"Cancelled\"");
        assert_ne!(s, RequestStatus::Pending);
    }
}
