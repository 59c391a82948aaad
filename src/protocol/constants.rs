//! Protocol constants for remoted network communication

/// Readiness banner written once by the server right after accept, outside the framing
pub const BANNER: &[u8] = b"PWNREMOTE/1.0 READY";

/// Length prefix size of every frame
pub const FRAME_PREFIX_LEN: usize = 4;

/// Hard safety limit on a single frame payload
pub const MAX_FRAME_SIZE: usize = 1024 * 1024; // 1MB

/// Envelope discriminants
pub const TYPE_REQUEST: &str = "CMD";
pub const TYPE_RESPONSE: &str = "RSP";

/// Codec limits
pub const MAX_JSON_SIZE: usize = 256 * 1024;
pub const MAX_STRING_SIZE: usize = 128 * 1024;
pub const MAX_FIELDS: usize = 64;
pub const MAX_ARRAY_SIZE: usize = 64;
pub const MAX_DEPTH: usize = 4;
