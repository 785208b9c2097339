use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::model::*;
use crate::observability;
use crate::schema::Table;
use crate::store::StoreError;

use super::conflict::check_conflict;
use super::error::{Entity, ScheduleError};
use super::outcome::{rejection, Outcome, Propagation};
use super::suggest::{suggest_from, SuggestError};
use super::Scheduler;

/// A class request as submitted by a department secretary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub section_id: Option<SectionId>,
    pub requester: String,
    pub requested_start: String,
    pub requested_end: String,
    /// Resolved to `"building room_num"` text on insert.
    pub preferred_room_id: Option<RoomId>,
    pub equipment: Option<EquipmentAsk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EquipmentAsk {
    pub equip_id: EquipId,
    pub quantity: Option<i64>,
}

/// Missing or non-positive quantities count as one.
fn effective_quantity(quantity: Option<i64>) -> i64 {
    quantity.filter(|q| *q > 0).unwrap_or(1)
}

impl Scheduler {
    // ── Accept ────────────────────────────────────────────────

    /// Assign a pending request to a room the registrar picked.
    pub async fn accept_manual(&self, request_id: RequestId, room_id: RoomId) -> Outcome {
        let started = Instant::now();
        let outcome = self
            .try_accept_manual(request_id, room_id)
            .await
            .unwrap_or_else(Outcome::from);
        observability::record("accept_manual", started, observability::outcome_label(&outcome));
        outcome
    }

    async fn try_accept_manual(&self, request_id: RequestId, room_id: RoomId) -> Result<Outcome, ScheduleError> {
        let request = self.pending_request(request_id).await?;
        let room = self.existing_room(room_id).await?;
        let span = request.span().ok_or(ScheduleError::InvalidInterval)?;

        let _guard = self.lock_room(room_id).await;
        let check = check_conflict(&self.sources(), room_id, &span, None, self.config.fetch_policy).await;
        if let Some(rejected) = rejection(check) {
            info!(request_id, room_id, "accept rejected: {}", rejected.message());
            return Ok(rejected);
        }
        self.commit(&request, room_id, room).await
    }

    /// Assign a pending request to the first free room in ranked order.
    pub async fn accept_auto(&self, request_id: RequestId) -> Outcome {
        let started = Instant::now();
        let outcome = self.try_accept_auto(request_id).await.unwrap_or_else(Outcome::from);
        observability::record("accept_auto", started, observability::outcome_label(&outcome));
        outcome
    }

    async fn try_accept_auto(&self, request_id: RequestId) -> Result<Outcome, ScheduleError> {
        let request = self.pending_request(request_id).await?;
        let span = request.span().ok_or(ScheduleError::InvalidInterval)?;
        let rooms = self.store.rooms().await?;
        let policy = self.config.fetch_policy;

        // The search runs unlocked; the winner is re-checked under its lock and
        // passed over if someone booked it in between.
        let mut skip = HashSet::new();
        for attempt in 1..=self.config.suggest_attempts.max(1) {
            let (room_id, room) = match suggest_from(&self.sources(), &request, &rooms, policy, &skip).await {
                Ok(found) => found,
                Err(SuggestError::InvalidRequestInterval) => return Err(ScheduleError::InvalidInterval),
                Err(SuggestError::Exhausted) => {
                    info!(request_id, "no available room found");
                    return Ok(Outcome::NoRoomAvailable);
                }
            };

            let _guard = self.lock_room(room_id).await;
            let check = check_conflict(&self.sources(), room_id, &span, None, policy).await;
            if check.is_free() {
                return self.commit(&request, room_id, room.clone()).await;
            }
            debug!(request_id, room_id, attempt, "suggested room taken before commit");
            skip.insert(room_id);
        }

        info!(request_id, attempts = self.config.suggest_attempts, "gave up after repeated contention");
        Ok(Outcome::NoRoomAvailable)
    }

    async fn pending_request(&self, request_id: RequestId) -> Result<ClassRequest, ScheduleError> {
        let request = self
            .store
            .class_request(request_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found(Entity::Request, request_id))?;
        match request.status {
            RequestStatus::Pending => Ok(request),
            RequestStatus::Assigned => Err(ScheduleError::AlreadyAssigned(request_id)),
            RequestStatus::Other(status) => Err(ScheduleError::NotPending { request_id, status }),
        }
    }

    async fn existing_room(&self, room_id: RoomId) -> Result<Room, ScheduleError> {
        self.store
            .room(room_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found(Entity::Room, room_id))
    }

    /// Caller holds the room lock.
    async fn commit(&self, request: &ClassRequest, room_id: RoomId, room: Room) -> Result<Outcome, ScheduleError> {
        let draft = AssignmentDraft {
            request_id: request.request_id,
            section_id: request.section_id,
            room_id,
            start: request.requested_start.clone(),
            end: request.requested_end.clone(),
        };
        let assignment = match self.store.commit_acceptance(draft).await {
            Ok(a) => a,
            Err(StoreError::Precondition(_)) => return Err(ScheduleError::AlreadyAssigned(request.request_id)),
            Err(StoreError::NotFound { table: Table::Requests, id }) => {
                return Err(ScheduleError::not_found(Entity::Request, id));
            }
            Err(e) => return Err(e.into()),
        };
        info!(
            request_id = request.request_id,
            assignment_id = assignment.assignment_id,
            "assigned to {}",
            room.label()
        );

        let equipment = self.propagate_equipment(request.request_id, room_id).await;
        Ok(Outcome::Assigned {
            room,
            assignment_id: assignment.assignment_id,
            equipment,
        })
    }

    /// Copy the request's first equipment ask into the room's inventory.
    /// Never undoes the acceptance it follows.
    async fn propagate_equipment(&self, request_id: RequestId, room_id: RoomId) -> Propagation {
        let asks = match self.store.equipment_requests(request_id).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(request_id, room_id, "could not read equipment request: {e}");
                return Propagation::Failed { reason: e.to_string() };
            }
        };
        let Some(ask) = asks.into_iter().next() else {
            return Propagation::NotRequested;
        };

        let quantity = effective_quantity(ask.quantity);
        let row = RoomEquipment {
            room_id,
            equip_id: ask.equip_id,
            quantity,
        };
        match self.store.insert_room_equipment(row).await {
            Ok(()) => Propagation::Applied {
                equip_id: ask.equip_id,
                quantity,
            },
            Err(e) => {
                warn!(request_id, room_id, equip_id = ask.equip_id, "equipment propagation failed: {e}");
                Propagation::Failed { reason: e.to_string() }
            }
        }
    }

    // ── Move ──────────────────────────────────────────────────

    /// Move an assignment to a new room and/or interval. Its own current
    /// booking never blocks the move.
    pub async fn update_assignment(&self, assignment_id: AssignmentId, room_id: RoomId, start: &str, end: &str) -> Outcome {
        let started = Instant::now();
        let outcome = self
            .try_update_assignment(assignment_id, room_id, start, end)
            .await
            .unwrap_or_else(Outcome::from);
        observability::record("update_assignment", started, observability::outcome_label(&outcome));
        outcome
    }

    async fn try_update_assignment(
        &self,
        assignment_id: AssignmentId,
        room_id: RoomId,
        start: &str,
        end: &str,
    ) -> Result<Outcome, ScheduleError> {
        let current = self
            .store
            .assignment(assignment_id)
            .await?
            .ok_or_else(|| ScheduleError::not_found(Entity::Assignment, assignment_id))?;
        let room = self.existing_room(room_id).await?;
        let span = Span::parse(start, end).ok_or(ScheduleError::InvalidInterval)?;

        let _guards = self.lock_rooms(&[current.room_id, room_id]).await;
        let check = check_conflict(&self.sources(), room_id, &span, Some(assignment_id), self.config.fetch_policy).await;
        if let Some(rejected) = rejection(check) {
            info!(assignment_id, room_id, "move rejected: {}", rejected.message());
            return Ok(rejected);
        }

        let patch = AssignmentPatch {
            room_id,
            start: start.to_string(),
            end: end.to_string(),
        };
        self.store.update_assignment(assignment_id, patch).await?;
        info!(assignment_id, from = current.room_id, "moved to {} at {span}", room.label());
        Ok(Outcome::Assigned {
            room,
            assignment_id,
            equipment: Propagation::NotRequested,
        })
    }

    // ── Requests & blackouts ──────────────────────────────────

    pub async fn submit_request(&self, new: NewRequest) -> Result<ClassRequest, ScheduleError> {
        let started = Instant::now();
        let result = self.try_submit_request(new).await;
        observability::record("submit_request", started, observability::result_label(&result));
        result
    }

    async fn try_submit_request(&self, new: NewRequest) -> Result<ClassRequest, ScheduleError> {
        if Span::parse(&new.requested_start, &new.requested_end).is_none() {
            return Err(ScheduleError::InvalidInterval);
        }
        let preferred_room = match new.preferred_room_id {
            Some(id) => self.preferred_room_label(id).await,
            None => None,
        };
        let request = self
            .store
            .insert_request(RequestDraft {
                section_id: new.section_id,
                requester: new.requester,
                requested_start: new.requested_start,
                requested_end: new.requested_end,
                preferred_room,
            })
            .await?;

        if let Some(ask) = new.equipment {
            let row = EquipmentRequest {
                request_id: request.request_id,
                room_id: new.preferred_room_id,
                equip_id: ask.equip_id,
                quantity: Some(effective_quantity(ask.quantity)),
            };
            if let Err(e) = self.store.insert_equipment_request(row).await {
                warn!(request_id = request.request_id, equip_id = ask.equip_id, "equipment request not saved: {e}");
            }
        }
        info!(request_id = request.request_id, requester = %request.requester, "request submitted");
        Ok(request)
    }

    /// Change a pending request's interval. `preferred_room_id` replaces the
    /// preferred room when given; otherwise the current one is kept.
    pub async fn revise_request(
        &self,
        request_id: RequestId,
        start: &str,
        end: &str,
        preferred_room_id: Option<RoomId>,
    ) -> Result<ClassRequest, ScheduleError> {
        let started = Instant::now();
        let result = self.try_revise_request(request_id, start, end, preferred_room_id).await;
        observability::record("revise_request", started, observability::result_label(&result));
        result
    }

    async fn try_revise_request(
        &self,
        request_id: RequestId,
        start: &str,
        end: &str,
        preferred_room_id: Option<RoomId>,
    ) -> Result<ClassRequest, ScheduleError> {
        let mut request = self.pending_request(request_id).await?;
        if Span::parse(start, end).is_none() {
            return Err(ScheduleError::InvalidInterval);
        }
        if let Some(id) = preferred_room_id {
            request.preferred_room = self.preferred_room_label(id).await;
        }
        request.requested_start = start.to_string();
        request.requested_end = end.to_string();

        let patch = RequestPatch {
            requested_start: request.requested_start.clone(),
            requested_end: request.requested_end.clone(),
            preferred_room: request.preferred_room.clone(),
        };
        match self.store.update_request(request_id, patch).await {
            Ok(()) => Ok(request),
            // Accepted while the preferred room was being resolved.
            Err(StoreError::Precondition(_)) => Err(ScheduleError::AlreadyAssigned(request_id)),
            Err(StoreError::NotFound { table: Table::Requests, id }) => {
                Err(ScheduleError::not_found(Entity::Request, id))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Lookup failures leave the preferred room empty; the request still goes in.
    async fn preferred_room_label(&self, room_id: RoomId) -> Option<String> {
        match self.store.room(room_id).await {
            Ok(Some(room)) => Some(room.label()),
            Ok(None) => {
                warn!(room_id, "preferred room not in inventory");
                None
            }
            Err(e) => {
                warn!(room_id, "preferred room lookup failed: {e}");
                None
            }
        }
    }

    pub async fn add_blackout(&self, draft: BlackoutDraft) -> Result<BlackoutWindow, ScheduleError> {
        let started = Instant::now();
        let result = self.try_add_blackout(draft).await;
        observability::record("add_blackout", started, observability::result_label(&result));
        result
    }

    async fn try_add_blackout(&self, draft: BlackoutDraft) -> Result<BlackoutWindow, ScheduleError> {
        let span = Span::parse(&draft.start, &draft.end).ok_or(ScheduleError::InvalidInterval)?;
        self.existing_room(draft.room_id).await?;

        let _guard = self.lock_room(draft.room_id).await;
        let window = self.store.insert_blackout(draft).await?;
        info!(room_id = window.room_id, blackout_id = window.blackout_id, "blackout added for {span}");
        Ok(window)
    }
}
