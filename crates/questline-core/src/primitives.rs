//! # Engine Primitives
//!
//! Hardcoded limits and format constants for the Questline CORE.
//!
//! These are compiled into the binary and are immutable at runtime.
//! Every list the engine stores is bounded by one of them, so every
//! operation stays a bounded unit of work.

/// Magic bytes for the Questline snapshot header.
pub const MAGIC_BYTES: &[u8; 4] = b"QSTL";

/// Current snapshot format version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum number of milestones on one progression achievement.
pub const MAX_MILESTONES: usize = 64;

/// Maximum number of prerequisite requirements on one achievement.
pub const MAX_REQUIREMENTS: usize = 16;

/// Maximum length for achievement names and milestone names.
pub const MAX_NAME_LENGTH: usize = 256;

/// Maximum length for descriptions and badge URIs.
pub const MAX_TEXT_LENGTH: usize = 4096;

// =============================================================================
// METADATA LIMITS
// =============================================================================

/// Maximum length for metadata attribute keys.
pub const MAX_METADATA_KEY_LENGTH: usize = 128;

/// Maximum length for metadata attribute values (16KB).
pub const MAX_METADATA_VALUE_LENGTH: usize = 16384;

// =============================================================================
// EVENT LOG
// =============================================================================

/// Number of events kept in the in-memory event log.
///
/// Oldest entries are dropped first once the log is full.
pub const MAX_EVENT_LOG: usize = 1024;

/// Maximum number of events returned by a single `recent_events` call.
pub const MAX_EVENT_PAGE: usize = 256;

const _: () = assert!(MAX_EVENT_PAGE <= MAX_EVENT_LOG);

/// Maximum snapshot payload accepted by `import_snapshot` (256 MB).
pub const MAX_SNAPSHOT_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;
