//! # questline-core
//!
//! The deterministic achievement and progression engine for Questline -
//! THE LOGIC.
//!
//! The engine records, per participant, advancement toward named goals
//! organized by category, gates each goal behind optional prerequisites,
//! and derives unlock state and category rollups from it.
//!
//! ## Architectural Constraints
//!
//! The CORE:
//! - Only records that a qualifying event occurred; it never decides when
//!   a game action is allowed
//! - Moves no value and generates no randomness
//! - Is synchronous: every operation is one bounded read-modify-write
//! - Never logs; it reports what changed through returned events
//! - Has NO async, NO network dependencies (pure Rust)

// =============================================================================
// MODULES
// =============================================================================

pub mod aggregate;
pub mod clock;
pub mod events;
pub mod guard;
pub mod primitives;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod snapshot;
pub mod store;
pub mod tracker;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    AchievementConfig, AchievementDefinition, AchievementId, AchievementKind, Category,
    ErrorClass, KindTag, Milestone, ParticipantId, Principal, QuestError, Requirement,
    RequirementTarget, Subtype, TOKEN_LEN, Timestamp,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use aggregate::{CategoryAggregator, CategoryProgressView, CategoryTotals, Summary};
pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventLog, EventRecord, TrackerEvent};
pub use guard::{AllowList, Authorizer, Guard};
pub use progress::{
    DetailedProgressView, ProgressOutcome, ProgressPhase, ProgressState, ProgressView,
    UserProgress,
};
pub use registry::DefinitionRegistry;
pub use resolver::RequirementResolver;
pub use store::{AchievementStore, MemoryStore, RedbStore};
pub use tracker::{StorageBackend, Tracker};

// =============================================================================
// RE-EXPORTS: Snapshots
// =============================================================================

pub use snapshot::{
    SnapshotHeader, TrackerSnapshot, export_snapshot, import_snapshot, snapshot_checksum,
    snapshot_digest,
};
