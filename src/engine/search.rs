use std::collections::HashMap;
use std::time::Instant;

use chrono::{NaiveTime, Timelike};
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::*;
use crate::observability;
use crate::store::StoreError;

use super::error::ScheduleError;
use super::Scheduler;

const MINUTES_PER_DAY: Minute = 24 * 60;

/// Time-of-day part of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeFilter {
    /// Minute of the day, matched against `[start, end)` of each booking.
    Within(Minute),
    /// Anything that is not `HH:MM` is matched as text in either bound.
    Contains(String),
}

impl TimeFilter {
    pub fn parse(text: &str) -> Self {
        match NaiveTime::parse_from_str(text.trim(), "%H:%M") {
            Ok(t) => TimeFilter::Within(Minute::from(t.hour() * 60 + t.minute())),
            Err(_) => TimeFilter::Contains(text.trim().to_string()),
        }
    }

    fn matches(&self, assignment: &Assignment) -> bool {
        match self {
            TimeFilter::Within(minute) => {
                // Bookings that do not normalize cannot be placed in the day.
                let Some(span) = assignment.span() else { return false };
                let start = span.start.rem_euclid(MINUTES_PER_DAY);
                let end = span.end.rem_euclid(MINUTES_PER_DAY);
                start <= *minute && *minute < end
            }
            TimeFilter::Contains(text) => assignment.start.contains(text.as_str()) || assignment.end.contains(text.as_str()),
        }
    }
}

/// Read-only query over booked rooms. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentFilter {
    pub building_id: Option<String>,
    pub course_id: Option<String>,
    pub dept_id: Option<String>,
    pub time: Option<TimeFilter>,
}

/// One booking joined to its room and, where the catalogue has them, its
/// section, course and department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub assignment_id: AssignmentId,
    pub room: Room,
    pub start: String,
    pub end: String,
    pub section_id: Option<SectionId>,
    pub section_type: Option<String>,
    pub section_num: Option<String>,
    pub course_id: Option<String>,
    pub course_name: Option<String>,
    pub dept_id: Option<String>,
    pub dept_name: Option<String>,
}

impl AssignmentFilter {
    fn matches(&self, hit: &SearchHit, assignment: &Assignment) -> bool {
        if let Some(building) = &self.building_id
            && hit.room.building_id != *building
        {
            return false;
        }
        if let Some(course) = &self.course_id
            && hit.course_id.as_ref() != Some(course)
        {
            return false;
        }
        if let Some(dept) = &self.dept_id
            && hit.dept_id.as_ref() != Some(dept)
        {
            return false;
        }
        self.time.as_ref().is_none_or(|t| t.matches(assignment))
    }
}

impl Scheduler {
    /// Every booking that passes `filter`, in assignment id order. Bookings
    /// whose room is not in the inventory are left out.
    pub async fn search_assignments(&self, filter: &AssignmentFilter) -> Result<Vec<SearchHit>, ScheduleError> {
        let started = Instant::now();
        let result = self.try_search_assignments(filter).await;
        observability::record("search_assignments", started, observability::result_label(&result));
        result
    }

    async fn try_search_assignments(&self, filter: &AssignmentFilter) -> Result<Vec<SearchHit>, ScheduleError> {
        let rooms: HashMap<RoomId, Room> = self
            .store
            .rooms()
            .await?
            .into_iter()
            .filter_map(|r| Some((r.key()?, r)))
            .collect();
        let assignments = self.store.assignments().await?;

        // The catalogue only labels results; a missing table leaves the labels empty.
        let sections: HashMap<SectionId, Section> = catalogue("sections", self.store.sections().await)
            .into_iter()
            .map(|s| (s.section_id, s))
            .collect();
        let courses: HashMap<String, Course> = catalogue("courses", self.store.courses().await)
            .into_iter()
            .map(|c| (c.course_id.clone(), c))
            .collect();
        let departments: HashMap<String, Department> = catalogue("departments", self.store.departments().await)
            .into_iter()
            .map(|d| (d.dept_id.clone(), d))
            .collect();

        let mut hits = Vec::new();
        for assignment in &assignments {
            let Some(room) = rooms.get(&assignment.room_id) else {
                debug!(assignment_id = assignment.assignment_id, room_id = assignment.room_id, "booking outside inventory");
                continue;
            };
            let section = assignment.section_id.and_then(|id| sections.get(&id));
            let course = section
                .and_then(|s| s.course_id.as_ref())
                .and_then(|id| courses.get(id));
            let dept_id = course.and_then(|c| c.dept_id.clone());
            let dept = dept_id.as_ref().and_then(|id| departments.get(id));

            let hit = SearchHit {
                assignment_id: assignment.assignment_id,
                room: room.clone(),
                start: assignment.start.clone(),
                end: assignment.end.clone(),
                section_id: assignment.section_id,
                section_type: section.and_then(|s| s.section_type.clone()),
                section_num: section.and_then(|s| s.section_num.clone()),
                course_id: course.map(|c| c.course_id.clone()),
                course_name: course.and_then(|c| c.name.clone()),
                dept_id,
                dept_name: dept.and_then(|d| d.name.clone()),
            };
            if filter.matches(&hit, assignment) {
                hits.push(hit);
            }
        }
        Ok(hits)
    }
}

fn catalogue<T>(table: &'static str, rows: Result<Vec<T>, StoreError>) -> Vec<T> {
    rows.unwrap_or_else(|e| {
        warn!(table, "catalogue unavailable for search: {e}");
        Vec::new()
    })
}
