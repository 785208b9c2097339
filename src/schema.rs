//! Canonical table layout and the single place where legacy row shapes are
//! folded into it.
//!
//! Exports from the old workflow are inconsistent: ids arrive as numbers or
//! strings, a few columns were renamed over time, and timestamps are sometimes
//! null. Every such quirk is listed in [`COLUMN_ALIASES`], [`TEXT_COLUMNS`] or
//! [`NUMBER_COLUMNS`]; nothing downstream looks at raw rows. A row that still
//! does not fit its record type is kept verbatim and written back on save.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Rooms,
    Assignments,
    Blackouts,
    Requests,
    EquipmentRequests,
    RoomEquipment,
    Sections,
    Courses,
    Departments,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::Rooms,
        Table::Assignments,
        Table::Blackouts,
        Table::Requests,
        Table::EquipmentRequests,
        Table::RoomEquipment,
        Table::Sections,
        Table::Courses,
        Table::Departments,
    ];

    /// Table name as it appears in snapshot documents.
    pub fn name(&self) -> &'static str {
        match self {
            Table::Rooms => "Room",
            Table::Assignments => "Room Assignment",
            Table::Blackouts => "Blackout Hours",
            Table::Requests => "Class Request",
            Table::EquipmentRequests => "Request Equipment",
            Table::RoomEquipment => "Room Equipment",
            Table::Sections => "Section",
            Table::Courses => "Course",
            Table::Departments => "Department",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `(table, legacy column, canonical column)`. When several legacy columns
/// map to one canonical column, the first one present wins.
const COLUMN_ALIASES: &[(Table, &str, &str)] = &[
    (Table::Rooms, "id", "room_id"),
    (Table::Rooms, "type", "room_type"),
    (Table::Rooms, "capacity", "max_capacity"),
    (Table::Assignments, "assign_id", "assignment_id"),
    (Table::Blackouts, "id", "blackout_id"),
    (Table::Requests, "id", "request_id"),
    (Table::Sections, "courseID", "course_id"),
    (Table::Sections, "course", "course_id"),
    (Table::Sections, "type", "section_type"),
    (Table::Sections, "number", "section_num"),
    (Table::Sections, "sec_num", "section_num"),
    (Table::Courses, "id", "course_id"),
    (Table::Courses, "course_name", "name"),
    (Table::Courses, "department_id", "dept_id"),
    (Table::Courses, "dept", "dept_id"),
    (Table::Departments, "department_id", "dept_id"),
    (Table::Departments, "id", "dept_id"),
    (Table::Departments, "dept_name", "name"),
    (Table::Departments, "department_name", "name"),
];

/// Columns held as text in canonical records even when legacy rows carry
/// numbers. A null in one of these columns is treated as absent.
const TEXT_COLUMNS: &[(Table, &str)] = &[
    (Table::Rooms, "room_id"),
    (Table::Rooms, "building_id"),
    (Table::Rooms, "room_num"),
    (Table::Rooms, "room_type"),
    (Table::Assignments, "start"),
    (Table::Assignments, "end"),
    (Table::Assignments, "status"),
    (Table::Blackouts, "start"),
    (Table::Blackouts, "end"),
    (Table::Requests, "requester"),
    (Table::Requests, "requested_start"),
    (Table::Requests, "requested_end"),
    (Table::Requests, "preferred_room"),
    (Table::Sections, "course_id"),
    (Table::Sections, "section_type"),
    (Table::Sections, "section_num"),
    (Table::Courses, "course_id"),
    (Table::Courses, "name"),
    (Table::Courses, "dept_id"),
    (Table::Departments, "dept_id"),
    (Table::Departments, "name"),
];

/// Integer key columns. Text holding an integer becomes a number; null or
/// blank text is treated as absent.
const NUMBER_COLUMNS: &[(Table, &str)] = &[
    (Table::Assignments, "assignment_id"),
    (Table::Assignments, "request_id"),
    (Table::Assignments, "section_id"),
    (Table::Assignments, "room_id"),
    (Table::Blackouts, "blackout_id"),
    (Table::Blackouts, "room_id"),
    (Table::Requests, "request_id"),
    (Table::Requests, "section_id"),
    (Table::EquipmentRequests, "request_id"),
    (Table::EquipmentRequests, "room_id"),
    (Table::EquipmentRequests, "equip_id"),
    (Table::EquipmentRequests, "quantity"),
    (Table::RoomEquipment, "room_id"),
    (Table::RoomEquipment, "equip_id"),
    (Table::RoomEquipment, "quantity"),
    (Table::Sections, "section_id"),
];

/// Whole-store document: one array of rows per table.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(rename = "Room", default)]
    pub rooms: Vec<Room>,
    #[serde(rename = "Room Assignment", default)]
    pub assignments: Vec<Assignment>,
    #[serde(rename = "Blackout Hours", default)]
    pub blackouts: Vec<BlackoutWindow>,
    #[serde(rename = "Class Request", default)]
    pub requests: Vec<ClassRequest>,
    #[serde(rename = "Request Equipment", default)]
    pub equipment_requests: Vec<EquipmentRequest>,
    #[serde(rename = "Room Equipment", default)]
    pub room_equipment: Vec<RoomEquipment>,
    #[serde(rename = "Section", default)]
    pub sections: Vec<Section>,
    #[serde(rename = "Course", default)]
    pub courses: Vec<Course>,
    #[serde(rename = "Department", default)]
    pub departments: Vec<Department>,
    /// Rows that did not fit their record type, exactly as read.
    #[serde(skip)]
    pub unreadable: Vec<(Table, Value)>,
    /// Top-level entries that are not a known table of rows.
    #[serde(skip)]
    pub other_tables: Map<String, Value>,
}

impl Snapshot {
    /// The document [`decode_snapshot`] reads back: typed rows first, then
    /// each table's unreadable rows, plus every unknown top-level entry.
    pub fn to_document(&self) -> Result<Value, serde_json::Error> {
        let mut doc = match serde_json::to_value(self)? {
            Value::Object(doc) => doc,
            _ => Map::new(),
        };
        for (table, row) in &self.unreadable {
            if let Some(Value::Array(rows)) = doc.get_mut(table.name()) {
                rows.push(row.clone());
            }
        }
        for (name, value) in &self.other_tables {
            let typed_is_empty = match doc.get(name) {
                None => true,
                Some(Value::Array(rows)) => rows.is_empty(),
                Some(_) => false,
            };
            if typed_is_empty {
                doc.insert(name.clone(), value.clone());
            }
        }
        Ok(Value::Object(doc))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("snapshot document must be a JSON object of tables")]
pub struct NotADocument;

/// Decode a snapshot document, canonicalizing every row. Nothing in the
/// document is dropped: rows that still do not fit are kept in
/// [`Snapshot::unreadable`] and unknown entries in [`Snapshot::other_tables`].
pub fn decode_snapshot(doc: Value) -> Result<Snapshot, NotADocument> {
    let Value::Object(mut tables) = doc else {
        return Err(NotADocument);
    };
    let mut unreadable = Vec::new();
    let mut snapshot = Snapshot {
        rooms: decode_rows(&mut tables, Table::Rooms, &mut unreadable),
        assignments: decode_rows(&mut tables, Table::Assignments, &mut unreadable),
        blackouts: decode_rows(&mut tables, Table::Blackouts, &mut unreadable),
        requests: decode_rows(&mut tables, Table::Requests, &mut unreadable),
        equipment_requests: decode_rows(&mut tables, Table::EquipmentRequests, &mut unreadable),
        room_equipment: decode_rows(&mut tables, Table::RoomEquipment, &mut unreadable),
        sections: decode_rows(&mut tables, Table::Sections, &mut unreadable),
        courses: decode_rows(&mut tables, Table::Courses, &mut unreadable),
        departments: decode_rows(&mut tables, Table::Departments, &mut unreadable),
        ..Snapshot::default()
    };
    snapshot.unreadable = unreadable;
    snapshot.other_tables = tables;
    Ok(snapshot)
}

fn decode_rows<T: DeserializeOwned>(
    tables: &mut Map<String, Value>,
    table: Table,
    unreadable: &mut Vec<(Table, Value)>,
) -> Vec<T> {
    let rows = match tables.remove(table.name()) {
        Some(Value::Array(rows)) => rows,
        Some(Value::Null) | None => return Vec::new(),
        Some(other) => {
            warn!(table = table.name(), "expected an array of rows, keeping the entry as-is");
            tables.insert(table.name().to_string(), other);
            return Vec::new();
        }
    };
    let mut out = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        match canonicalize(table, row.clone()).map(serde_json::from_value::<T>) {
            Some(Ok(record)) => out.push(record),
            Some(Err(e)) => {
                warn!(table = table.name(), row = idx, "keeping unreadable row as-is: {e}");
                unreadable.push((table, row));
            }
            None => {
                warn!(table = table.name(), row = idx, "keeping non-object row as-is");
                unreadable.push((table, row));
            }
        }
    }
    out
}

/// Rewrite one legacy row into canonical column names and types.
pub fn canonicalize(table: Table, row: Value) -> Option<Value> {
    let Value::Object(mut row) = row else {
        return None;
    };
    for (t, legacy, canonical) in COLUMN_ALIASES {
        if *t != table || row.contains_key(*canonical) {
            continue;
        }
        if let Some(v) = row.remove(*legacy) {
            row.insert((*canonical).to_string(), v);
        }
    }
    for (t, column) in TEXT_COLUMNS {
        if *t != table {
            continue;
        }
        match row.get(*column) {
            Some(Value::Null) => {
                row.remove(*column);
            }
            Some(Value::Number(n)) => {
                let text = n.to_string();
                row.insert((*column).to_string(), Value::String(text));
            }
            _ => {}
        }
    }
    for (t, column) in NUMBER_COLUMNS {
        if *t != table {
            continue;
        }
        match row.get(*column) {
            Some(Value::Null) => {
                row.remove(*column);
            }
            Some(Value::String(text)) if text.trim().is_empty() => {
                row.remove(*column);
            }
            Some(Value::String(text)) => {
                if let Ok(n) = text.trim().parse::<i64>() {
                    row.insert((*column).to_string(), Value::from(n));
                }
            }
            _ => {}
        }
    }
    Some(Value::Object(row))
}
