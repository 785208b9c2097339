use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use roomslot::command::{execute, parse_command, Reply};
use roomslot::engine::{Scheduler, SchedulerConfig};
use roomslot::model::RequestStatus;
use roomslot::store::MemoryStore;

// ── Test infrastructure ──────────────────────────────────────

fn snapshot_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("roomslot_int_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// Rows as an older export wrote them: numeric room ids, `assign_id`, a
/// blackout with no id and times with seconds.
fn legacy_document() -> Value {
    json!({
        "Room": [
            {"id": 1, "building_id": "ENG", "room_num": 101, "room_type": "lecture", "max_capacity": 60},
            {"id": 2, "building_id": "ENG", "room_num": 102},
            {"id": 3, "building_id": "SCI", "room_num": 5}
        ],
        "Room Assignment": [
            {"assign_id": 10, "request_id": 90, "room_id": 1,
             "start": "2025-12-10T09:00:00", "end": "2025-12-10T12:00:00", "status": "assigned"}
        ],
        "Blackout Hours": [
            {"room_id": 2, "start": "2025-12-10 08:00", "end": "2025-12-10 18:00", "reason": "painting"}
        ],
        "Class Request": [
            {"request_id": 1, "section_id": 301, "requester": "jdoe",
             "requested_start": "2025-12-10T10:00:00+00:00", "requested_end": "2025-12-10T11:00:00+00:00",
             "preferred_room": "ENG 101", "status": "Pending"},
            {"request_id": 2, "section_id": 302, "requester": "asmith",
             "requested_start": "2025-12-10T10:30", "requested_end": "2025-12-10T11:30",
             "status": "pending"}
        ],
        "Request Equipment": [
            {"request_id": 1, "equip_id": 5, "quantity": null}
        ]
    })
}

fn load(name: &str) -> (PathBuf, Arc<MemoryStore>, Scheduler) {
    let path = snapshot_path(name);
    std::fs::write(&path, serde_json::to_vec_pretty(&legacy_document()).unwrap()).unwrap();
    let store = Arc::new(MemoryStore::load(&path).unwrap());
    let scheduler = Scheduler::new(store.clone(), SchedulerConfig::default());
    (path, store, scheduler)
}

async fn run(scheduler: &Scheduler, line: &str) -> Value {
    let reply = match parse_command(line) {
        Ok(cmd) => execute(scheduler, cmd).await,
        Err(e) => Reply::from(e),
    };
    serde_json::to_value(reply).unwrap()
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn legacy_snapshot_drives_full_workflow() {
    let (path, store, s) = load("workflow.json");

    // Room 1 is booked and room 2 is blacked out, so the preferred building
    // is exhausted and SCI 5 is chosen.
    let reply = run(&s, "suggest 1").await;
    assert_eq!(reply["outcome"], "assigned", "{reply}");
    assert_eq!(reply["room"]["room_id"], "3");
    assert_eq!(reply["equipment"], json!({"status": "applied", "equip_id": 5, "quantity": 1}));

    // Request 2 overlaps it in the same room.
    let reply = run(&s, "accept 2 3").await;
    assert_eq!(reply["outcome"], "conflict_detected");
    assert_eq!(reply["kind"], "assignment");

    let reply = run(&s, "accept 2 2").await;
    assert_eq!(reply["outcome"], "conflict_detected");
    assert_eq!(reply["kind"], "blackout");

    // Move the old booking out of the way, then retry.
    let reply = run(&s, "move 10 1 2025-12-10T07:00 2025-12-10T08:00").await;
    assert_eq!(reply["outcome"], "assigned", "{reply}");
    let reply = run(&s, "accept 2 1").await;
    assert_eq!(reply["outcome"], "assigned", "{reply}");

    let reply = run(&s, "accept 2 1").await;
    assert_eq!(reply, json!({"outcome": "already_assigned", "request_id": 2}));

    store.save(&path).unwrap();
    let reloaded = MemoryStore::load(&path).unwrap().snapshot();
    assert_eq!(reloaded, store.snapshot());
    assert_eq!(reloaded.assignments.len(), 3);
    assert!(reloaded.requests.iter().all(|r| r.status == RequestStatus::Assigned));
    assert_eq!(reloaded.room_equipment.len(), 1);
}

#[tokio::test]
async fn request_revise_and_blackout_commands() {
    let (_, store, s) = load("secretary.json");

    let reply = run(&s, "request 303 kchen 2025-12-11T13:00 2025-12-11T14:00 room=2 equip=8 qty=2").await;
    assert_eq!(reply["request"]["status"], "pending", "{reply}");
    assert_eq!(reply["request"]["preferred_room"], "ENG 102");
    let id = reply["request"]["request_id"].as_i64().unwrap();
    assert!(id > 2);

    let reply = run(&s, &format!("revise {id} 2025-12-11T15:00 2025-12-11T16:00")).await;
    assert_eq!(reply["request"]["requested_start"], "2025-12-11T15:00");

    let reply = run(&s, "blackout 2 2025-12-11T15:30 2025-12-11T17:00 projector repair").await;
    assert_eq!(reply["blackout"]["reason"], "projector repair");

    let reply = run(&s, &format!("accept {id} 2")).await;
    assert_eq!(reply["outcome"], "conflict_detected");
    assert_eq!(reply["kind"], "blackout");

    let reply = run(&s, &format!("suggest {id}")).await;
    assert_eq!(reply["outcome"], "assigned");
    assert_eq!(reply["room"]["building_id"], "ENG");
    assert_eq!(reply["equipment"]["quantity"], 2);

    assert_eq!(store.snapshot().blackouts.len(), 2);
}

#[tokio::test]
async fn bad_input_is_reported_not_raised() {
    let (_, _, s) = load("errors.json");

    assert_eq!(run(&s, "reserve 1").await, json!({"error": "unknown command: reserve"}));
    assert!(run(&s, "accept 1").await["error"].as_str().unwrap().contains("expects"));
    assert_eq!(
        run(&s, "accept 404 1").await,
        json!({"outcome": "not_found", "entity": "request", "id": 404})
    );
    assert_eq!(
        run(&s, "move 10 1 noon 2025-12-10T13:00").await,
        json!({"outcome": "invalid_interval"})
    );
    assert_eq!(
        run(&s, "blackout 9 2025-12-10T08:00 2025-12-10T09:00").await,
        json!({"outcome": "not_found", "entity": "room", "id": 9})
    );
}

#[tokio::test]
async fn odd_legacy_rows_keep_blocking_and_survive_save() {
    let path = snapshot_path("odd_rows.json");
    let mut doc = legacy_document();
    doc["Room Assignment"] = json!([
        {"assign_id": 10, "request_id": null, "section_id": "301", "room_id": "1",
         "start": "2025-12-10T09:00", "end": "2025-12-10T12:00", "status": "assigned"},
        {"assign_id": 11, "room_id": "north wing"}
    ]);
    doc["Class Request"]
        .as_array_mut()
        .unwrap()
        .push(json!({"request_id": 3, "requester": "jdoe", "status": "cancelled"}));
    std::fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
    let store = Arc::new(MemoryStore::load(&path).unwrap());
    let s = Scheduler::new(store.clone(), SchedulerConfig::default());

    let reply = run(&s, "accept 1 1").await;
    assert_eq!(reply["outcome"], "conflict_detected", "{reply}");
    let reply = run(&s, "accept 3 1").await;
    assert_eq!(reply, json!({"outcome": "not_pending", "request_id": 3, "status": "cancelled"}));

    store.save(&path).unwrap();
    let written: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(written["Room Assignment"].as_array().unwrap().len(), 2);
    assert_eq!(written["Class Request"].as_array().unwrap().len(), 3);

    let reloaded = MemoryStore::load(&path).unwrap();
    assert_eq!(reloaded.snapshot(), store.snapshot());
    let s = Scheduler::new(Arc::new(reloaded), SchedulerConfig::default());
    assert_eq!(run(&s, "accept 1 1").await["outcome"], "conflict_detected");
}

#[tokio::test]
async fn search_command_lists_bookings() {
    let path = snapshot_path("search.json");
    let mut doc = legacy_document();
    doc["Room Assignment"][0]["section_id"] = json!(301);
    doc["Section"] = json!([{"section_id": 301, "courseID": "COMP 440", "type": "LEC"}]);
    doc["Course"] = json!([{"course_id": "COMP 440", "name": "Databases", "dept_id": 4}]);
    std::fs::write(&path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
    let store = Arc::new(MemoryStore::load(&path).unwrap());
    let s = Scheduler::new(store, SchedulerConfig::default());

    let reply = run(&s, "search building=ENG course=COMP 440 time=09:00").await;
    let results = reply["results"].as_array().unwrap();
    assert_eq!(results.len(), 1, "{reply}");
    assert_eq!(results[0]["assignment_id"], 10);
    assert_eq!(results[0]["course_name"], "Databases");
    assert_eq!(results[0]["dept_id"], "4");

    let reply = run(&s, "search time=12:00").await;
    assert_eq!(reply, json!({"results": []}));
    let reply = run(&s, "search building=SCI").await;
    assert_eq!(reply, json!({"results": []}));
}

#[tokio::test]
async fn missing_snapshot_starts_empty() {
    let path = snapshot_path("does_not_exist.json");
    let store = MemoryStore::load(&path).unwrap();
    assert_eq!(store.assignment_count(), 0);
    assert!(store.snapshot().rooms.is_empty());
}
