use std::cmp::Ordering;

use crate::model::Room;

/// Deterministic search order for a room inventory.
///
/// Rooms in `preferred_building` come first, then buildings by id, then rooms
/// by number. Room numbers compare by their leading digit run (so `50` sorts
/// before `101`) and then as text; a number with no leading digits sorts after
/// every numeric one. The sort is stable, so identical inputs always rank
/// identically.
pub fn rank<'r>(rooms: &'r [Room], preferred_building: Option<&str>) -> Vec<&'r Room> {
    let mut ranked: Vec<&Room> = rooms.iter().collect();
    ranked.sort_by(|a, b| compare(a, b, preferred_building));
    ranked
}

fn compare(a: &Room, b: &Room, preferred: Option<&str>) -> Ordering {
    affinity(a, preferred)
        .cmp(&affinity(b, preferred))
        .then_with(|| a.building_id.cmp(&b.building_id))
        .then_with(|| room_num_key(&a.room_num).cmp(&room_num_key(&b.room_num)))
}

fn affinity(room: &Room, preferred: Option<&str>) -> u8 {
    match preferred {
        Some(b) if room.building_id == b => 0,
        _ => 1,
    }
}

// Numeric first, not plain text: as text "101" < "50", which would rank
// `[{B,50},{B,101},{A,101}]` with preference B as B 101, B 50, A 101 instead
// of the required B 50, B 101, A 101. The text keeps the tuple a total order.
fn room_num_key(num: &str) -> (u64, &str) {
    let digits = num.bytes().take_while(u8::is_ascii_digit).count();
    let lead = if digits == 0 {
        u64::MAX
    } else {
        num[..digits].parse().unwrap_or(u64::MAX)
    };
    (lead, num)
}
