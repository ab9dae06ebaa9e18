//! Size limits for submitted events and captured request context.
//!
//! The `#[validate]` derive macro requires literal values in attributes,
//! so `MAX_SOURCE_LEN` is duplicated there. Keep both in sync when modifying.

/// Maximum request body size in bytes (64KB).
///
/// One request carries one event.
pub const MAX_EVENT_BODY_BYTES: usize = 64 * 1024;

/// Maximum serialized metadata size in bytes (16KB).
pub const MAX_METADATA_BYTES: usize = 16 * 1024;

/// Event type name max length.
pub const MAX_EVENT_TYPE_LEN: usize = 128;

/// Source identifier max length.
pub const MAX_SOURCE_LEN: usize = 128;

/// User agent string max length. Longer values are truncated, not rejected.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// IP address max length (IPv6 = 45 chars).
pub const MAX_IP_LEN: usize = 45;

/// Timezone identifier max length.
pub const MAX_TIMEZONE_LEN: usize = 64;

/// Locale tag max length.
pub const MAX_LOCALE_LEN: usize = 35;
