//! Size limits, cookie parameters, and engagement thresholds.
//!
//! The `#[validate]` derive macro requires literal values in attributes,
//! so field limits are duplicated there. Keep both in sync when modifying.

// === Cookie Parameters ===

/// Visitor identity cookie name.
pub const VISITOR_COOKIE: &str = "visitor_id";

/// Session identity cookie name.
pub const SESSION_COOKIE: &str = "session_id";

/// First-touch traffic source cookie name (write-once).
pub const SOURCE_COOKIE: &str = "traffic_source";

/// Visitor cookie lifetime in days (sliding).
pub const VISITOR_COOKIE_DAYS: i64 = 30;

/// Session cookie lifetime in minutes (sliding, refreshed on every event).
pub const SESSION_COOKIE_MINUTES: i64 = 30;

/// First-touch source cookie lifetime in days.
pub const SOURCE_COOKIE_DAYS: i64 = 30;

// === Engagement Thresholds ===

/// Scroll depth percentage at which a session counts as engaged.
pub const ENGAGED_SCROLL_DEPTH: i32 = 25;

/// Scroll depth percentage at which a post counts as read to the end.
pub const READ_TO_END_DEPTH: i32 = 100;

/// Seconds on page at which a session counts as engaged.
pub const ENGAGED_TIME_SECS: i64 = 30;

/// Scroll milestones counted in aggregates.
pub const SCROLL_MILESTONES: [i32; 4] = [25, 50, 75, 100];

// === String Field Limits (chars) ===

/// Page path max length.
pub const MAX_PATH_LEN: usize = 2000;

/// Referrer URL max length. Matches HTTP Referer header limit.
pub const MAX_REFERRER_LEN: usize = 2048;

/// User agent string max length.
/// Browser UAs: 100-300 typical, 500+ with extensions.
pub const MAX_USER_AGENT_LEN: usize = 512;

/// IP address max length (IPv6 = 45 chars).
pub const MAX_IP_LEN: usize = 45;

/// User ID max length.
pub const MAX_USER_ID_LEN: usize = 128;

/// Share platform name max length.
pub const MAX_PLATFORM_LEN: usize = 64;

/// Source hint max length (query parameter or client-supplied field).
pub const MAX_SOURCE_HINT_LEN: usize = 256;

// === Payload Limits ===

/// Maximum event_data JSON size in bytes (16KB).
///
/// The payload is open-ended; this bounds memory per tracked event.
pub const MAX_EVENT_DATA_BYTES: usize = 16 * 1024;
