use ulid::Ulid;

use crate::model::Ms;

#[derive(Debug)]
pub enum ScheduleError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The subject already holds a live registration on this resource.
    /// An expected business outcome; callers branch on it.
    AlreadyRegistered {
        resource: Ulid,
        subject: Ulid,
    },
    RegistrationClosed(&'static str),
    InvalidRange {
        start: Ms,
        end: Ms,
    },
    /// The slot is held by an approved reservation (its id is carried).
    /// An expected business outcome; callers branch on it.
    SlotConflict(Ulid),
    InvalidTransition(&'static str),
    /// Bounded lock retries exhausted. Transient; retry the call.
    Busy,
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::NotFound(id) => write!(f, "not found: {id}"),
            ScheduleError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            ScheduleError::AlreadyRegistered { resource, subject } => {
                write!(f, "subject {subject} already registered on resource {resource}")
            }
            ScheduleError::RegistrationClosed(why) => {
                write!(f, "registration closed: {why}")
            }
            ScheduleError::InvalidRange { start, end } => {
                write!(f, "invalid range: [{start}, {end})")
            }
            ScheduleError::SlotConflict(id) => {
                write!(f, "slot conflict with approved reservation: {id}")
            }
            ScheduleError::InvalidTransition(why) => {
                write!(f, "invalid transition: {why}")
            }
            ScheduleError::Busy => write!(f, "resource busy: lock retries exhausted"),
            ScheduleError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            ScheduleError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for ScheduleError {}
