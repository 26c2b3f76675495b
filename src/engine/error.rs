use ulid::Ulid;

use crate::model::{Ms, SlotStatus};

/// One distinct kind per rejected precondition — nothing is silently
/// swallowed. `SlotUnavailable` is the ordinary result of losing a booking
/// race, not a fault; callers should treat it as a normal outcome.
#[derive(Debug)]
pub enum EngineError {
    InvalidInterval { start: Ms, end: Ms },
    InvalidMetadata(String),
    ProviderNotFound(Ulid),
    ConsumerNotFound(Ulid),
    SlotNotFound(Ulid),
    SlotProviderMismatch { slot_id: Ulid, provider_id: Ulid },
    NotOwner { slot_id: Ulid, provider_id: Ulid },
    SlotOverlap { conflicting: Ulid },
    SlotUnavailable { slot_id: Ulid, status: SlotStatus },
    Timeout { slot_id: Ulid },
    AlreadyExists(Ulid),
    LimitExceeded(&'static str),
    StorageFailure(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): start must be before end")
            }
            EngineError::InvalidMetadata(e) => write!(f, "metadata is not valid JSON: {e}"),
            EngineError::ProviderNotFound(id) => write!(f, "provider not found: {id}"),
            EngineError::ConsumerNotFound(id) => write!(f, "consumer not found: {id}"),
            EngineError::SlotNotFound(id) => write!(f, "slot not found: {id}"),
            EngineError::SlotProviderMismatch { slot_id, provider_id } => {
                write!(f, "slot {slot_id} does not belong to provider {provider_id}")
            }
            EngineError::NotOwner { slot_id, provider_id } => {
                write!(f, "provider {provider_id} does not own slot {slot_id}")
            }
            EngineError::SlotOverlap { conflicting } => {
                write!(f, "interval overlaps existing slot {conflicting}")
            }
            EngineError::SlotUnavailable { slot_id, status } => {
                write!(f, "slot {slot_id} is not available (status: {status:?})")
            }
            EngineError::Timeout { slot_id } => {
                write!(f, "timed out waiting for exclusive access to slot {slot_id}")
            }
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::StorageFailure(e) => write!(f, "storage failure: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
