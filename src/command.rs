//! Line-oriented command surface: one command per line, one JSON reply each.
//!
//! ```text
//! accept   <request_id> <room_id>
//! suggest  <request_id>
//! move     <assignment_id> <room_id> <start> <end>
//! request  <section_id> <requester> <start> <end> [room=<id>] [equip=<id>] [qty=<n>]
//! revise   <request_id> <start> <end> [room=<id>]
//! blackout <room_id> <start> <end> [reason...]
//! search   [building=<id>] [course=<id>] [dept=<id>] [time=<HH:MM>]
//! ```
//!
//! Timestamps are single tokens, so use the `T` separator (`2025-12-10T09:00`).
//! A search option value runs until the next option, so `course=COMP 440` works.

use serde::Serialize;

use crate::engine::{AssignmentFilter, EquipmentAsk, NewRequest, Outcome, ScheduleError, Scheduler, SearchHit, TimeFilter};
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Accept {
        request_id: RequestId,
        room_id: RoomId,
    },
    Suggest {
        request_id: RequestId,
    },
    Move {
        assignment_id: AssignmentId,
        room_id: RoomId,
        start: String,
        end: String,
    },
    Request {
        section_id: SectionId,
        requester: String,
        start: String,
        end: String,
        room_id: Option<RoomId>,
        equipment: Option<EquipmentAsk>,
    },
    Revise {
        request_id: RequestId,
        start: String,
        end: String,
        room_id: Option<RoomId>,
    },
    Blackout {
        room_id: RoomId,
        start: String,
        end: String,
        reason: Option<String>,
    },
    Search {
        filter: AssignmentFilter,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("{command} expects {expected}")]
    WrongArity {
        command: &'static str,
        expected: &'static str,
    },
    #[error("{field} is not a number: {value}")]
    BadNumber { field: &'static str, value: String },
    #[error("unrecognized option: {0}")]
    BadOption(String),
}

fn number(field: &'static str, value: &str) -> Result<i64, CommandError> {
    value.parse().map_err(|_| CommandError::BadNumber {
        field,
        value: value.to_string(),
    })
}

fn arity(command: &'static str, expected: &'static str) -> CommandError {
    CommandError::WrongArity { command, expected }
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next().ok_or(CommandError::Empty)?;
    let args: Vec<&str> = tokens.collect();

    match verb.to_ascii_lowercase().as_str() {
        "accept" => match args[..] {
            [request_id, room_id] => Ok(Command::Accept {
                request_id: number("request_id", request_id)?,
                room_id: number("room_id", room_id)?,
            }),
            _ => Err(arity("accept", "<request_id> <room_id>")),
        },
        "suggest" => match args[..] {
            [request_id] => Ok(Command::Suggest {
                request_id: number("request_id", request_id)?,
            }),
            _ => Err(arity("suggest", "<request_id>")),
        },
        "move" => match args[..] {
            [assignment_id, room_id, start, end] => Ok(Command::Move {
                assignment_id: number("assignment_id", assignment_id)?,
                room_id: number("room_id", room_id)?,
                start: start.to_string(),
                end: end.to_string(),
            }),
            _ => Err(arity("move", "<assignment_id> <room_id> <start> <end>")),
        },
        "request" => {
            let usage = "<section_id> <requester> <start> <end> [room=<id>] [equip=<id>] [qty=<n>]";
            let [section_id, requester, start, end, ref options @ ..] = args[..] else {
                return Err(arity("request", usage));
            };
            let mut room_id = None;
            let mut equip_id = None;
            let mut quantity = None;
            for opt in options {
                match opt.split_once('=') {
                    Some(("room", v)) => room_id = Some(number("room", v)?),
                    Some(("equip", v)) => equip_id = Some(number("equip", v)?),
                    Some(("qty", v)) => quantity = Some(number("qty", v)?),
                    _ => return Err(CommandError::BadOption(opt.to_string())),
                }
            }
            Ok(Command::Request {
                section_id: number("section_id", section_id)?,
                requester: requester.to_string(),
                start: start.to_string(),
                end: end.to_string(),
                room_id,
                equipment: equip_id.map(|equip_id| EquipmentAsk { equip_id, quantity }),
            })
        }
        "revise" => {
            let (request_id, start, end, room_id) = match args[..] {
                [request_id, start, end] => (request_id, start, end, None),
                [request_id, start, end, opt] => match opt.split_once('=') {
                    Some(("room", v)) => (request_id, start, end, Some(number("room", v)?)),
                    _ => return Err(CommandError::BadOption(opt.to_string())),
                },
                _ => return Err(arity("revise", "<request_id> <start> <end> [room=<id>]")),
            };
            Ok(Command::Revise {
                request_id: number("request_id", request_id)?,
                start: start.to_string(),
                end: end.to_string(),
                room_id,
            })
        }
        "blackout" => {
            let [room_id, start, end, ref reason @ ..] = args[..] else {
                return Err(arity("blackout", "<room_id> <start> <end> [reason...]"));
            };
            Ok(Command::Blackout {
                room_id: number("room_id", room_id)?,
                start: start.to_string(),
                end: end.to_string(),
                reason: (!reason.is_empty()).then(|| reason.join(" ")),
            })
        }
        "search" => Ok(Command::Search {
            filter: search_filter(&args)?,
        }),
        _ => Err(CommandError::Unknown(verb.to_string())),
    }
}

const SEARCH_KEYS: [&str; 4] = ["building", "course", "dept", "time"];

fn search_filter(args: &[&str]) -> Result<AssignmentFilter, CommandError> {
    let mut options: Vec<(&str, String)> = Vec::new();
    for token in args {
        match token.split_once('=') {
            Some((key, value)) if SEARCH_KEYS.contains(&key) => options.push((key, value.to_string())),
            _ => match options.last_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(token);
                }
                None => return Err(CommandError::BadOption(token.to_string())),
            },
        }
    }

    let mut filter = AssignmentFilter::default();
    for (key, value) in options {
        match key {
            "building" => filter.building_id = Some(value),
            "course" => filter.course_id = Some(value),
            "dept" => filter.dept_id = Some(value),
            _ => filter.time = Some(TimeFilter::parse(&value)),
        }
    }
    Ok(filter)
}

/// One printed reply line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Outcome(Outcome),
    Request { request: ClassRequest },
    Blackout { blackout: BlackoutWindow },
    Search { results: Vec<SearchHit> },
    Error { error: String },
}

impl From<Result<ClassRequest, ScheduleError>> for Reply {
    fn from(result: Result<ClassRequest, ScheduleError>) -> Self {
        match result {
            Ok(request) => Reply::Request { request },
            Err(e) => Reply::Outcome(e.into()),
        }
    }
}

impl From<CommandError> for Reply {
    fn from(e: CommandError) -> Self {
        Reply::Error { error: e.to_string() }
    }
}

pub async fn execute(scheduler: &Scheduler, command: Command) -> Reply {
    match command {
        Command::Accept { request_id, room_id } => Reply::Outcome(scheduler.accept_manual(request_id, room_id).await),
        Command::Suggest { request_id } => Reply::Outcome(scheduler.accept_auto(request_id).await),
        Command::Move {
            assignment_id,
            room_id,
            start,
            end,
        } => Reply::Outcome(scheduler.update_assignment(assignment_id, room_id, &start, &end).await),
        Command::Request {
            section_id,
            requester,
            start,
            end,
            room_id,
            equipment,
        } => scheduler
            .submit_request(NewRequest {
                section_id: Some(section_id),
                requester,
                requested_start: start,
                requested_end: end,
                preferred_room_id: room_id,
                equipment,
            })
            .await
            .into(),
        Command::Revise {
            request_id,
            start,
            end,
            room_id,
        } => scheduler.revise_request(request_id, &start, &end, room_id).await.into(),
        Command::Blackout {
            room_id,
            start,
            end,
            reason,
        } => match scheduler
            .add_blackout(BlackoutDraft {
                room_id,
                start,
                end,
                reason,
            })
            .await
        {
            Ok(blackout) => Reply::Blackout { blackout },
            Err(e) => Reply::Outcome(e.into()),
        },
        Command::Search { filter } => match scheduler.search_assignments(&filter).await {
            Ok(results) => Reply::Search { results },
            Err(e) => Reply::Outcome(e.into()),
        },
    }
}
