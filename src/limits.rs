//! Hard caps that bound memory and input size. All are generous for a single
//! shop; hitting one means the caller is misbehaving.

use crate::model::Ms;

pub const MAX_BARBERS: usize = 64;
pub const MAX_SERVICES: usize = 256;
pub const MAX_CLIENTS: usize = 100_000;
pub const MAX_APPOINTMENTS_PER_BARBER: usize = 50_000;
pub const MAX_BLOCKS_PER_BARBER: usize = 10_000;
pub const MAX_WAITLIST_ENTRIES: usize = 10_000;

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_REASON_LEN: usize = 240;

/// Slot granularity bounds (minutes).
pub const MIN_SLOT_MINUTES: u16 = 5;
pub const MAX_SLOT_MINUTES: u16 = 120;

/// Longest service we will schedule (minutes).
pub const MAX_SERVICE_MINUTES: u16 = 480;

/// Unix epoch — nothing is scheduled before it.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 2100-01-01T00:00:00Z — nothing is scheduled after it.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
