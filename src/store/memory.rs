use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
#[cfg(test)]
use dashmap::DashSet;

use crate::model::*;
use crate::schema::{self, Snapshot, Table};

use super::{Store, StoreError};

/// DashMap-backed [`Store`]. Loads from and saves to a JSON snapshot.
pub struct MemoryStore {
    /// Keyed by the raw inventory id, which may not be numeric.
    rooms: DashMap<String, Room>,
    assignments: DashMap<AssignmentId, Assignment>,
    blackouts: DashMap<i64, BlackoutWindow>,
    requests: DashMap<RequestId, ClassRequest>,
    equipment_requests: DashMap<RequestId, Vec<EquipmentRequest>>,
    room_equipment: DashMap<RoomId, Vec<RoomEquipment>>,
    /// Catalogue tables are never written here.
    sections: Vec<Section>,
    courses: Vec<Course>,
    departments: Vec<Department>,
    /// Carried through untouched so a save never loses what a load could not read.
    unreadable: Vec<(Table, Value)>,
    other_tables: Map<String, Value>,
    next_assignment: AtomicI64,
    next_blackout: AtomicI64,
    next_request: AtomicI64,
    /// Tables that fail every read and write. Test-only fault injection.
    #[cfg(test)]
    failing: DashSet<Table>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let store = Self {
            rooms: DashMap::new(),
            assignments: DashMap::new(),
            blackouts: DashMap::new(),
            requests: DashMap::new(),
            equipment_requests: DashMap::new(),
            room_equipment: DashMap::new(),
            sections: snapshot.sections,
            courses: snapshot.courses,
            departments: snapshot.departments,
            unreadable: snapshot.unreadable,
            other_tables: snapshot.other_tables,
            next_assignment: AtomicI64::new(1),
            next_blackout: AtomicI64::new(1),
            next_request: AtomicI64::new(1),
            #[cfg(test)]
            failing: DashSet::new(),
        };

        for room in snapshot.rooms {
            store.rooms.insert(room.room_id.clone(), room);
        }
        // Rows without an id, like unnumbered blackouts below, are numbered
        // after the rest so they keep blocking their room.
        let (numbered, unnumbered): (Vec<_>, Vec<_>) =
            snapshot.assignments.into_iter().partition(|a| a.assignment_id > 0);
        for a in numbered {
            bump_past(&store.next_assignment, a.assignment_id);
            store.assignments.insert(a.assignment_id, a);
        }
        for mut a in unnumbered {
            a.assignment_id = store.next_assignment.fetch_add(1, Ordering::SeqCst);
            store.assignments.insert(a.assignment_id, a);
        }
        for r in snapshot.requests {
            bump_past(&store.next_request, r.request_id);
            store.requests.insert(r.request_id, r);
        }
        // Legacy blackout rows may have no id; those are numbered after the rest.
        let (numbered, unnumbered): (Vec<_>, Vec<_>) =
            snapshot.blackouts.into_iter().partition(|b| b.blackout_id > 0);
        for b in numbered {
            bump_past(&store.next_blackout, b.blackout_id);
            store.blackouts.insert(b.blackout_id, b);
        }
        for mut b in unnumbered {
            b.blackout_id = store.next_blackout.fetch_add(1, Ordering::SeqCst);
            store.blackouts.insert(b.blackout_id, b);
        }
        for e in snapshot.equipment_requests {
            store.equipment_requests.entry(e.request_id).or_default().push(e);
        }
        for e in snapshot.room_equipment {
            store.room_equipment.entry(e.room_id).or_default().push(e);
        }
        store
    }

    /// Load a snapshot file. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };
        let doc: serde_json::Value = serde_json::from_reader(BufReader::new(file))?;
        Ok(Self::from_snapshot(schema::decode_snapshot(doc)?))
    }

    /// Write the snapshot to a temp file, fsync, then rename over `path`.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let tmp_path = path.with_extension("json.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.snapshot().to_document()?)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Current contents, every table sorted by key. Catalogue tables and
    /// unreadable rows come back as loaded.
    pub fn snapshot(&self) -> Snapshot {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));

        let mut assignments: Vec<Assignment> = self.assignments.iter().map(|e| e.value().clone()).collect();
        assignments.sort_by_key(|a| a.assignment_id);

        let mut blackouts: Vec<BlackoutWindow> = self.blackouts.iter().map(|e| e.value().clone()).collect();
        blackouts.sort_by_key(|b| b.blackout_id);

        let mut requests: Vec<ClassRequest> = self.requests.iter().map(|e| e.value().clone()).collect();
        requests.sort_by_key(|r| r.request_id);

        let mut equipment_requests: Vec<EquipmentRequest> =
            self.equipment_requests.iter().flat_map(|e| e.value().clone()).collect();
        equipment_requests.sort_by_key(|e| e.request_id);

        let mut room_equipment: Vec<RoomEquipment> =
            self.room_equipment.iter().flat_map(|e| e.value().clone()).collect();
        room_equipment.sort_by_key(|e| e.room_id);

        Snapshot {
            rooms,
            assignments,
            blackouts,
            requests,
            equipment_requests,
            room_equipment,
            sections: self.sections.clone(),
            courses: self.courses.clone(),
            departments: self.departments.clone(),
            unreadable: self.unreadable.clone(),
            other_tables: self.other_tables.clone(),
        }
    }

    pub fn room_equipment(&self, room_id: RoomId) -> Vec<RoomEquipment> {
        self.room_equipment
            .get(&room_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    #[cfg(test)]
    pub(crate) fn fail_table(&self, table: Table) {
        self.failing.insert(table);
    }

    #[cfg(test)]
    pub(crate) fn heal_table(&self, table: Table) {
        self.failing.remove(&table);
    }

    #[cfg(test)]
    fn check(&self, table: Table) -> Result<(), StoreError> {
        if self.failing.contains(&table) {
            return Err(StoreError::Unavailable {
                table,
                reason: "injected failure".into(),
            });
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check(&self, _table: Table) -> Result<(), StoreError> {
        Ok(())
    }

    fn check_write(&self, table: Table) -> Result<(), StoreError> {
        self.check(table).map_err(|e| StoreError::Write {
            table,
            reason: e.to_string(),
        })
    }
}

fn bump_past(seq: &AtomicI64, id: i64) {
    seq.fetch_max(id.saturating_add(1), Ordering::SeqCst);
}

#[async_trait]
impl Store for MemoryStore {
    async fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        self.check(Table::Rooms)?;
        let mut rooms: Vec<Room> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        Ok(rooms)
    }

    async fn assignments(&self) -> Result<Vec<Assignment>, StoreError> {
        self.check(Table::Assignments)?;
        let mut rows: Vec<Assignment> = self.assignments.iter().map(|e| e.value().clone()).collect();
        rows.sort_by_key(|a| a.assignment_id);
        Ok(rows)
    }

    async fn sections(&self) -> Result<Vec<Section>, StoreError> {
        self.check(Table::Sections)?;
        Ok(self.sections.clone())
    }

    async fn courses(&self) -> Result<Vec<Course>, StoreError> {
        self.check(Table::Courses)?;
        Ok(self.courses.clone())
    }

    async fn departments(&self) -> Result<Vec<Department>, StoreError> {
        self.check(Table::Departments)?;
        Ok(self.departments.clone())
    }

    async fn room(&self, room_id: RoomId) -> Result<Option<Room>, StoreError> {
        self.check(Table::Rooms)?;
        Ok(self
            .rooms
            .iter()
            .find(|e| e.value().key() == Some(room_id))
            .map(|e| e.value().clone()))
    }

    async fn assignments_for_room(&self, room_id: RoomId) -> Result<Vec<Assignment>, StoreError> {
        self.check(Table::Assignments)?;
        let mut rows: Vec<Assignment> = self
            .assignments
            .iter()
            .filter(|e| e.value().room_id == room_id)
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|a| a.assignment_id);
        Ok(rows)
    }

    async fn blackouts_for_room(&self, room_id: RoomId) -> Result<Vec<BlackoutWindow>, StoreError> {
        self.check(Table::Blackouts)?;
        let mut rows: Vec<BlackoutWindow> = self
            .blackouts
            .iter()
            .filter(|e| e.value().room_id == room_id)
            .map(|e| e.value().clone())
            .collect();
        rows.sort_by_key(|b| b.blackout_id);
        Ok(rows)
    }

    async fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        self.check(Table::Assignments)?;
        Ok(self.assignments.get(&id).map(|e| e.value().clone()))
    }

    async fn class_request(&self, id: RequestId) -> Result<Option<ClassRequest>, StoreError> {
        self.check(Table::Requests)?;
        Ok(self.requests.get(&id).map(|e| e.value().clone()))
    }

    async fn equipment_requests(&self, request_id: RequestId) -> Result<Vec<EquipmentRequest>, StoreError> {
        self.check(Table::EquipmentRequests)?;
        Ok(self
            .equipment_requests
            .get(&request_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    async fn insert_request(&self, draft: RequestDraft) -> Result<ClassRequest, StoreError> {
        self.check_write(Table::Requests)?;
        let request = ClassRequest {
            request_id: self.next_request.fetch_add(1, Ordering::SeqCst),
            section_id: draft.section_id,
            requester: draft.requester,
            requested_start: draft.requested_start,
            requested_end: draft.requested_end,
            preferred_room: draft.preferred_room,
            status: RequestStatus::Pending,
        };
        self.requests.insert(request.request_id, request.clone());
        Ok(request)
    }

    async fn insert_equipment_request(&self, row: EquipmentRequest) -> Result<(), StoreError> {
        self.check_write(Table::EquipmentRequests)?;
        self.equipment_requests.entry(row.request_id).or_default().push(row);
        Ok(())
    }

    async fn insert_blackout(&self, draft: BlackoutDraft) -> Result<BlackoutWindow, StoreError> {
        self.check_write(Table::Blackouts)?;
        let window = BlackoutWindow {
            blackout_id: self.next_blackout.fetch_add(1, Ordering::SeqCst),
            room_id: draft.room_id,
            start: draft.start,
            end: draft.end,
            reason: draft.reason,
        };
        self.blackouts.insert(window.blackout_id, window.clone());
        Ok(window)
    }

    async fn insert_room_equipment(&self, row: RoomEquipment) -> Result<(), StoreError> {
        self.check_write(Table::RoomEquipment)?;
        self.room_equipment.entry(row.room_id).or_default().push(row);
        Ok(())
    }

    async fn commit_acceptance(&self, draft: AssignmentDraft) -> Result<Assignment, StoreError> {
        self.check_write(Table::Assignments)?;
        self.check_write(Table::Requests)?;
        // The request entry stays locked until both rows are written.
        let mut request = self
            .requests
            .get_mut(&draft.request_id)
            .ok_or(StoreError::NotFound {
                table: Table::Requests,
                id: draft.request_id,
            })?;
        if request.status != RequestStatus::Pending {
            return Err(StoreError::Precondition("request is no longer pending"));
        }
        let assignment = Assignment {
            assignment_id: self.next_assignment.fetch_add(1, Ordering::SeqCst),
            request_id: Some(draft.request_id),
            section_id: draft.section_id,
            room_id: draft.room_id,
            start: draft.start,
            end: draft.end,
            status: ASSIGNED.to_string(),
        };
        self.assignments.insert(assignment.assignment_id, assignment.clone());
        request.status = RequestStatus::Assigned;
        Ok(assignment)
    }

    async fn update_assignment(&self, id: AssignmentId, patch: AssignmentPatch) -> Result<(), StoreError> {
        self.check_write(Table::Assignments)?;
        let mut row = self.assignments.get_mut(&id).ok_or(StoreError::NotFound {
            table: Table::Assignments,
            id,
        })?;
        row.room_id = patch.room_id;
        row.start = patch.start;
        row.end = patch.end;
        Ok(())
    }

    async fn update_request(&self, id: RequestId, patch: RequestPatch) -> Result<(), StoreError> {
        self.check_write(Table::Requests)?;
        // Same entry lock as `commit_acceptance`, so a revise and an accept
        // of one request cannot interleave.
        let mut row = self.requests.get_mut(&id).ok_or(StoreError::NotFound {
            table: Table::Requests,
            id,
        })?;
        if row.status != RequestStatus::Pending {
            return Err(StoreError::Precondition("request is no longer pending"));
        }
        row.requested_start = patch.requested_start;
        row.requested_end = patch.requested_end;
        row.preferred_room = patch.preferred_room;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_snapshot_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join("roomslot_test_store");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn pending(id: RequestId) -> ClassRequest {
        ClassRequest {
            request_id: id,
            section_id: Some(10),
            requester: "registrar".into(),
            requested_start: "2025-12-10T09:00".into(),
            requested_end: "2025-12-10T10:00".into(),
            preferred_room: None,
            status: RequestStatus::Pending,
        }
    }

    fn draft(request_id: RequestId, room_id: RoomId) -> AssignmentDraft {
        AssignmentDraft {
            request_id,
            section_id: Some(10),
            room_id,
            start: "2025-12-10T09:00".into(),
            end: "2025-12-10T10:00".into(),
        }
    }

    #[tokio::test]
    async fn commit_acceptance_writes_both_rows() {
        let store = MemoryStore::from_snapshot(Snapshot {
            requests: vec![pending(3)],
            ..Snapshot::default()
        });
        let a = store.commit_acceptance(draft(3, 7)).await.unwrap();
        assert_eq!(a.room_id, 7);
        assert_eq!(a.status, ASSIGNED);
        let req = store.class_request(3).await.unwrap().unwrap();
        assert_eq!(req.status, RequestStatus::Assigned);
        assert_eq!(store.assignments_for_room(7).await.unwrap(), vec![a]);
    }

    #[tokio::test]
    async fn commit_acceptance_refuses_assigned_request() {
        let store = MemoryStore::from_snapshot(Snapshot {
            requests: vec![pending(3)],
            ..Snapshot::default()
        });
        store.commit_acceptance(draft(3, 7)).await.unwrap();
        let second = store.commit_acceptance(draft(3, 8)).await;
        assert!(matches!(second, Err(StoreError::Precondition(_))));
        assert_eq!(store.assignment_count(), 1);
    }

    #[tokio::test]
    async fn ids_continue_after_loaded_rows() {
        let store = MemoryStore::from_snapshot(Snapshot {
            requests: vec![pending(41)],
            blackouts: vec![BlackoutWindow {
                blackout_id: 0,
                room_id: 1,
                start: "2025-12-10T09:00".into(),
                end: "2025-12-10T10:00".into(),
                reason: None,
            }],
            ..Snapshot::default()
        });
        let created = store
            .insert_request(RequestDraft {
                section_id: None,
                requester: "registrar".into(),
                requested_start: String::new(),
                requested_end: String::new(),
                preferred_room: None,
            })
            .await
            .unwrap();
        assert_eq!(created.request_id, 42);
        assert_eq!(created.status, RequestStatus::Pending);
        let loaded = store.blackouts_for_room(1).await.unwrap();
        assert_eq!(loaded[0].blackout_id, 1);
    }

    #[tokio::test]
    async fn room_lookup_by_numeric_key() {
        let store = MemoryStore::from_snapshot(Snapshot {
            rooms: vec![
                Room {
                    room_id: "7".into(),
                    building_id: "ENG".into(),
                    room_num: "101".into(),
                    room_type: None,
                    max_capacity: None,
                },
                Room {
                    room_id: "annex".into(),
                    building_id: "ENG".into(),
                    room_num: "B1".into(),
                    room_type: None,
                    max_capacity: None,
                },
            ],
            ..Snapshot::default()
        });
        assert_eq!(store.room(7).await.unwrap().unwrap().room_num, "101");
        assert!(store.room(8).await.unwrap().is_none());
        assert_eq!(store.rooms().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn injected_failures() {
        let store = MemoryStore::new();
        store.fail_table(Table::Blackouts);
        assert!(matches!(
            store.blackouts_for_room(1).await,
            Err(StoreError::Unavailable { table: Table::Blackouts, .. })
        ));
        store.heal_table(Table::Blackouts);
        assert!(store.blackouts_for_room(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_and_load_snapshot() {
        let path = test_snapshot_path("save_and_load.json");
        let store = MemoryStore::from_snapshot(Snapshot {
            requests: vec![pending(3)],
            ..Snapshot::default()
        });
        store.commit_acceptance(draft(3, 7)).await.unwrap();
        store
            .insert_room_equipment(RoomEquipment { room_id: 7, equip_id: 2, quantity: 1 })
            .await
            .unwrap();
        store.save(&path).unwrap();

        let reloaded = MemoryStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());
        assert_eq!(reloaded.room_equipment(7).len(), 1);
    }

    #[tokio::test]
    async fn update_request_refuses_assigned_request() {
        let store = MemoryStore::from_snapshot(Snapshot {
            requests: vec![pending(3)],
            ..Snapshot::default()
        });
        store.commit_acceptance(draft(3, 7)).await.unwrap();
        let patch = RequestPatch {
            requested_start: "2025-12-10T15:00".into(),
            requested_end: "2025-12-10T16:00".into(),
            preferred_room: None,
        };
        let result = store.update_request(3, patch).await;
        assert!(matches!(result, Err(StoreError::Precondition(_))));
        let req = store.class_request(3).await.unwrap().unwrap();
        assert_eq!(req.requested_start, "2025-12-10T09:00");
    }

    #[tokio::test]
    async fn unnumbered_assignment_gets_an_id_and_blocks() {
        let store = MemoryStore::from_snapshot(Snapshot {
            assignments: vec![Assignment {
                assignment_id: 0,
                request_id: None,
                section_id: None,
                room_id: 1,
                start: "2025-12-10T09:00".into(),
                end: "2025-12-10T12:00".into(),
                status: String::new(),
            }],
            requests: vec![pending(3)],
            ..Snapshot::default()
        });
        let rows = store.assignments_for_room(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].assignment_id, 1);
        let next = store.commit_acceptance(draft(3, 2)).await.unwrap();
        assert_eq!(next.assignment_id, 2);
    }

    #[test]
    fn max_id_does_not_overflow_sequence() {
        let store = MemoryStore::from_snapshot(Snapshot {
            requests: vec![pending(i64::MAX)],
            ..Snapshot::default()
        });
        assert_eq!(store.next_request.load(Ordering::SeqCst), i64::MAX);
    }

    #[test]
    fn save_keeps_rows_the_load_could_not_read() {
        let path = test_snapshot_path("keeps_unreadable.json");
        let doc = serde_json::json!({
            "Room Assignment": [
                {"assign_id": 10, "request_id": null, "room_id": 1,
                 "start": "2025-12-10T09:00", "end": "2025-12-10T12:00", "status": "assigned"},
                {"assign_id": 11, "room_id": "annex"},
            ],
            "Class Request": [
                {"request_id": 2, "status": "cancelled"},
            ],
            "Building": [{"building_id": "ENG"}],
        });
        fs::write(&path, doc.to_string()).unwrap();

        let store = MemoryStore::load(&path).unwrap();
        assert_eq!(store.assignment_count(), 1);
        store.save(&path).unwrap();

        let written: Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(written["Room Assignment"].as_array().unwrap().len(), 2);
        assert_eq!(written["Class Request"][0]["status"], "cancelled");
        assert_eq!(written["Building"], serde_json::json!([{"building_id": "ENG"}]));

        let reloaded = MemoryStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());
    }

    #[test]
    fn load_missing_file_is_empty() {
        let path = test_snapshot_path("does_not_exist.json");
        let store = MemoryStore::load(&path).unwrap();
        assert_eq!(store.assignment_count(), 0);
    }
}
