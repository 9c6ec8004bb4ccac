//! Pre-flight bounds. Every limit is checked before any mutation is
//! staged, so `LimitExceeded` never follows a partial write.

use crate::model::Ms;

pub const MAX_RESOURCES: usize = 100_000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_REASON_LEN: usize = 512;

/// Registrations (all statuses) per resource.
pub const MAX_REGISTRATIONS_PER_RESOURCE: usize = 100_000;
/// Reservations (all statuses) per resource.
pub const MAX_RESERVATIONS_PER_RESOURCE: usize = 10_000;

/// Sanity floor for timestamps (2000-01-01T00:00:00Z).
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// Sanity ceiling for timestamps (2100-01-01T00:00:00Z).
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Widest single reservation range (90 days).
pub const MAX_RANGE_DURATION_MS: Ms = 90 * 24 * 3_600_000;
/// Widest conflict query window (366 days).
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 24 * 3_600_000;

/// Bounded lock acquisition: per-attempt wait and attempt count before the
/// operation surfaces `Busy`.
pub const LOCK_WAIT_MS: u64 = 200;
pub const LOCK_RETRIES: u32 = 3;
