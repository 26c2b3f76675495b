//! Hard caps on inputs. These are sanity bounds, not business rules.

use crate::model::Ms;

/// Slots a single provider may have on the books (including cancelled ones).
pub const MAX_SLOTS_PER_PROVIDER: usize = 100_000;

/// Provider/consumer display names.
pub const MAX_NAME_LEN: usize = 256;

/// Serialized slot metadata payload.
pub const MAX_METADATA_LEN: usize = 16 * 1024;

/// Nothing before the unix epoch.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// One year. No appointment slot is wider than this.
pub const MAX_SLOT_DURATION_MS: Ms = 31_536_000_000;
