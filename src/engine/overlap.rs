//! Interval validation and the overlap check. Pure functions, no I/O.

use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as Ms
}

/// Check `start < end` plus the sanity caps, returning the validated span.
/// Zero-length and inverted intervals are rejected, no exceptions.
pub(crate) fn validate_interval(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if start >= end {
        return Err(EngineError::InvalidInterval { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if end - start > MAX_SLOT_DURATION_MS {
        return Err(EngineError::LimitExceeded("interval too wide"));
    }
    Ok(Span::new(start, end))
}

/// Metadata is opaque to the engine but must at least be JSON.
pub(crate) fn validate_metadata(metadata: Option<&str>) -> Result<(), EngineError> {
    let Some(raw) = metadata else {
        return Ok(());
    };
    if raw.len() > MAX_METADATA_LEN {
        return Err(EngineError::LimitExceeded("metadata too large"));
    }
    serde_json::from_str::<serde_json::Value>(raw)
        .map(|_| ())
        .map_err(|e| EngineError::InvalidMetadata(e.to_string()))
}

/// Does `candidate` overlap any of `existing`? Half-open semantics;
/// touching endpoints do not overlap.
pub fn overlaps_any(candidate: &Span, existing: &[Span]) -> bool {
    existing.iter().any(|s| s.overlaps(candidate))
}

/// Find a non-cancelled sibling slot conflicting with `candidate`.
/// `exclude` skips the slot's own record on updates.
pub(crate) fn find_conflict(
    ps: &ProviderState,
    candidate: &Span,
    exclude: Option<Ulid>,
) -> Option<Ulid> {
    ps.overlapping(candidate)
        .find(|e| exclude != Some(e.id))
        .map(|e| e.id)
}
