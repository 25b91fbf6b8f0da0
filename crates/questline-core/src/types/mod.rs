//! # Core Type Definitions
//!
//! This module contains all core types for the Questline achievement engine:
//! - Opaque identifiers (`AchievementId`, `ParticipantId`, `Principal`, `Subtype`)
//! - Classification (`Category`, `AchievementKind`, `KindTag`)
//! - Definition structures (`Milestone`, `Requirement`, `AchievementDefinition`)
//! - Configuration input (`AchievementConfig`)
//! - Error types (`QuestError`, `ErrorClass`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` where they act as keys in `BTreeMap`/`BTreeSet`
//! - Derive identifiers from keys with BLAKE3, never from randomness

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Seconds since the Unix epoch, as reported by a [`crate::Clock`].
pub type Timestamp = u64;

/// Width of every opaque identifier, in bytes.
pub const TOKEN_LEN: usize = 32;

// =============================================================================
// OPAQUE IDENTIFIERS
// =============================================================================

macro_rules! define_token {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub [u8; TOKEN_LEN]);

        impl $name {
            /// Derive the token from a human-readable key (BLAKE3 of the UTF-8 bytes).
            #[must_use]
            pub fn from_key(key: &str) -> Self {
                Self(*blake3::hash(key.as_bytes()).as_bytes())
            }

            /// Accept either a 64-character hex token or a human-readable key.
            ///
            /// Input that decodes as exactly 32 hex bytes is taken verbatim;
            /// anything else is treated as a key and hashed.
            #[must_use]
            pub fn resolve(input: &str) -> Self {
                input.parse().unwrap_or_else(|_| Self::from_key(input))
            }

            /// Raw bytes of the token.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; TOKEN_LEN] {
                &self.0
            }

            /// Lowercase hex rendering.
            #[must_use]
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), &self.to_hex()[..12])
            }
        }

        impl FromStr for $name {
            type Err = QuestError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s.trim_start_matches("0x"))
                    .map_err(|_| QuestError::InvalidIdentifier(s.to_string()))?;
                let token: [u8; TOKEN_LEN] = bytes
                    .try_into()
                    .map_err(|_| QuestError::InvalidIdentifier(s.to_string()))?;
                Ok(Self(token))
            }
        }

        // Hex strings for JSON/TOML, raw bytes for postcard.
        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.to_hex())
                } else {
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let s = String::deserialize(deserializer)?;
                    s.parse().map_err(serde::de::Error::custom)
                } else {
                    <[u8; TOKEN_LEN]>::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

define_token!(
    /// Stable identifier of an achievement definition, derived from its key
    /// (e.g. `AchievementId::from_key("stage_1")`).
    AchievementId
);

define_token!(
    /// Identifier of a participant (player account) whose progress is tracked.
    ParticipantId
);

define_token!(
    /// A caller identity checked by the authorization guard.
    Principal
);

define_token!(
    /// Opaque event-class discriminator collaborators use to pick which
    /// definitions apply to an event (e.g. `Subtype::from_key("feed_count")`).
    Subtype
);

// =============================================================================
// CATEGORY
// =============================================================================

/// Fixed classification bucket used for grouping and aggregate reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Evolution,
    Collection,
    Streak,
    Action,
    Challenge,
    Expedition,
}

impl Category {
    /// Every category, in index order.
    pub const ALL: [Category; 6] = [
        Category::Evolution,
        Category::Collection,
        Category::Streak,
        Category::Action,
        Category::Challenge,
        Category::Expedition,
    ];

    /// Wire index of the category (0..=5).
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Decode a wire index.
    pub fn from_index(index: u8) -> Result<Self, QuestError> {
        Self::ALL
            .get(index as usize)
            .copied()
            .ok_or_else(|| QuestError::InvalidCategory(index.to_string()))
    }

    /// Human-readable name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Category::Evolution => "Evolution",
            Category::Collection => "Collection",
            Category::Streak => "Streak",
            Category::Action => "Action",
            Category::Challenge => "Challenge",
            Category::Expedition => "Expedition",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = QuestError;

    /// Accepts a category name (any case) or its numeric index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(index) = s.parse::<u8>() {
            return Self::from_index(index);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| QuestError::InvalidCategory(s.to_string()))
    }
}

// =============================================================================
// ACHIEVEMENT KIND
// =============================================================================

/// Kind tag as it appears in configuration input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KindTag {
    OneTime,
    Progression,
}

impl KindTag {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            KindTag::OneTime => "one_time",
            KindTag::Progression => "progression",
        }
    }
}

impl fmt::Display for KindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KindTag {
    type Err = QuestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "one_time" | "onetime" | "0" => Ok(KindTag::OneTime),
            "progression" | "1" => Ok(KindTag::Progression),
            _ => Err(QuestError::InvalidAchievementKind(s.to_string())),
        }
    }
}

/// One ordered step within a progression achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub badge_uri: String,
    /// Cumulative count at which this milestone unlocks.
    pub threshold: u64,
}

impl Milestone {
    #[must_use]
    pub fn new(name: impl Into<String>, threshold: u64) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            badge_uri: String::new(),
            threshold,
        }
    }
}

/// Validated achievement kind.
///
/// Milestones only exist on `Progression`; a one-time achievement with
/// milestones cannot be represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    OneTime,
    Progression { milestones: Vec<Milestone> },
}

impl AchievementKind {
    /// Milestones of the kind (empty for one-time achievements).
    #[must_use]
    pub fn milestones(&self) -> &[Milestone] {
        match self {
            AchievementKind::OneTime => &[],
            AchievementKind::Progression { milestones } => milestones,
        }
    }

    #[must_use]
    pub fn tag(&self) -> KindTag {
        match self {
            AchievementKind::OneTime => KindTag::OneTime,
            AchievementKind::Progression { .. } => KindTag::Progression,
        }
    }

    #[must_use]
    pub fn is_one_time(&self) -> bool {
        matches!(self, AchievementKind::OneTime)
    }
}

// =============================================================================
// REQUIREMENTS
// =============================================================================

/// Level of a prerequisite that must be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementTarget {
    /// The prerequisite's milestone at this index must be unlocked.
    Milestone(usize),
    /// One-time: achieved. Progression: final milestone unlocked.
    FullCompletion,
}

/// A prerequisite achievement and the level of it that must be satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub prerequisite: AchievementId,
    pub target: RequirementTarget,
}

impl Requirement {
    #[must_use]
    pub const fn milestone(prerequisite: AchievementId, index: usize) -> Self {
        Self {
            prerequisite,
            target: RequirementTarget::Milestone(index),
        }
    }

    #[must_use]
    pub const fn completion(prerequisite: AchievementId) -> Self {
        Self {
            prerequisite,
            target: RequirementTarget::FullCompletion,
        }
    }
}

// =============================================================================
// ACHIEVEMENT DEFINITION
// =============================================================================

/// A validated, stored achievement definition.
///
/// Only [`crate::DefinitionRegistry::validate`] produces these, so every
/// stored definition satisfies the configuration invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: AchievementId,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub kind: AchievementKind,
    /// Badge for one-time achievements; empty when milestones carry badges.
    pub badge_uri: String,
    pub subtype: Subtype,
    pub requirements: Vec<Requirement>,
    pub enabled: bool,
}

impl AchievementDefinition {
    #[must_use]
    pub fn milestones(&self) -> &[Milestone] {
        self.kind.milestones()
    }

    #[must_use]
    pub fn milestone_count(&self) -> usize {
        self.milestones().len()
    }

    #[must_use]
    pub fn is_one_time(&self) -> bool {
        self.kind.is_one_time()
    }
}

// =============================================================================
// CONFIGURATION INPUT
// =============================================================================

/// Unvalidated configuration for one achievement.
///
/// This is what catalogs and API requests carry; `configure` turns it into
/// an [`AchievementDefinition`] or rejects it whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementConfig {
    pub id: AchievementId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Category,
    pub kind: KindTag,
    #[serde(default)]
    pub badge_uri: String,
    #[serde(default)]
    pub subtype: Subtype,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AchievementConfig {
    fn new(key: &str, name: impl Into<String>, category: Category, kind: KindTag) -> Self {
        Self {
            id: AchievementId::from_key(key),
            name: name.into(),
            description: String::new(),
            category,
            kind,
            badge_uri: String::new(),
            subtype: Subtype::default(),
            milestones: Vec::new(),
            requirements: Vec::new(),
            enabled: true,
        }
    }

    /// Start a one-time achievement config whose id is derived from `key`.
    #[must_use]
    pub fn one_time(key: &str, name: impl Into<String>, category: Category) -> Self {
        Self::new(key, name, category, KindTag::OneTime)
    }

    /// Start a progression achievement config whose id is derived from `key`.
    #[must_use]
    pub fn progression(key: &str, name: impl Into<String>, category: Category) -> Self {
        Self::new(key, name, category, KindTag::Progression)
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_badge(mut self, badge_uri: impl Into<String>) -> Self {
        self.badge_uri = badge_uri.into();
        self
    }

    #[must_use]
    pub fn with_subtype(mut self, subtype: Subtype) -> Self {
        self.subtype = subtype;
        self
    }

    #[must_use]
    pub fn with_milestone(mut self, name: impl Into<String>, threshold: u64) -> Self {
        self.milestones.push(Milestone::new(name, threshold));
        self
    }

    /// Add one milestone per threshold, named `"<name> <n>"`.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: &[u64]) -> Self {
        for (i, &threshold) in thresholds.iter().enumerate() {
            let name = format!("{} {}", self.name, i + 1);
            self.milestones.push(Milestone::new(name, threshold));
        }
        self
    }

    #[must_use]
    pub fn requires(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

impl From<&AchievementDefinition> for AchievementConfig {
    fn from(definition: &AchievementDefinition) -> Self {
        Self {
            id: definition.id,
            name: definition.name.clone(),
            description: definition.description.clone(),
            category: definition.category,
            kind: definition.kind.tag(),
            badge_uri: definition.badge_uri.clone(),
            subtype: definition.subtype,
            milestones: definition.milestones().to_vec(),
            requirements: definition.requirements.clone(),
            enabled: definition.enabled,
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Broad class of a [`QuestError`], used by adapters to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed configuration; the whole configure call was rejected.
    Configuration,
    /// The caller lacks permission. Distinct from rule failures.
    Authorization,
    /// A business rule rejected the call; skip or log, do not retry blindly.
    BusinessRule,
    /// Storage or encoding failure.
    Storage,
}

/// Errors that can occur in the Questline engine.
///
/// - Every error is scoped to the single call that produced it
/// - A call that returns an error has changed nothing
/// - The CORE never panics
#[derive(Debug, Error)]
pub enum QuestError {
    // --- configuration ---
    #[error("Milestone thresholds must be positive and strictly increasing (index {0})")]
    InvalidMilestoneOrdering(usize),

    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    #[error("Invalid achievement kind: {0}")]
    InvalidAchievementKind(String),

    #[error("Unknown prerequisite achievement: {0}")]
    UnknownPrerequisite(AchievementId),

    #[error("Achievement {0} cannot require itself, directly or transitively")]
    SelfReference(AchievementId),

    #[error("Requirement on {prerequisite} targets milestone {index}, which does not exist")]
    InvalidRequirement {
        prerequisite: AchievementId,
        index: usize,
    },

    #[error("Too many milestones: {0}")]
    TooManyMilestones(usize),

    #[error("Too many requirements: {0}")]
    TooManyRequirements(usize),

    #[error("Invalid definition field: {0}")]
    InvalidField(&'static str),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    // --- authorization ---
    #[error("Caller {0} is not authorized")]
    UnauthorizedCaller(Principal),

    // --- business rules ---
    #[error("Achievement not found: {0}")]
    AchievementNotFound(AchievementId),

    #[error("Achievement is disabled: {0}")]
    AchievementIsDisabled(AchievementId),

    #[error("Requirements not met for achievement {0}")]
    RequirementNotMet(AchievementId),

    #[error("Achievement {id} is {actual}; operation needs {expected}")]
    WrongAchievementKind {
        id: AchievementId,
        expected: KindTag,
        actual: KindTag,
    },

    #[error("Progress delta must be greater than zero")]
    InvalidDelta,

    #[error("Invalid metadata key")]
    InvalidMetadataKey,

    #[error("Invalid metadata value")]
    InvalidMetadataValue,

    // --- infrastructure ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

impl QuestError {
    /// Taxonomy class of this error.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            QuestError::InvalidMilestoneOrdering(_)
            | QuestError::InvalidCategory(_)
            | QuestError::InvalidAchievementKind(_)
            | QuestError::UnknownPrerequisite(_)
            | QuestError::SelfReference(_)
            | QuestError::InvalidRequirement { .. }
            | QuestError::TooManyMilestones(_)
            | QuestError::TooManyRequirements(_)
            | QuestError::InvalidField(_)
            | QuestError::InvalidIdentifier(_) => ErrorClass::Configuration,
            QuestError::UnauthorizedCaller(_) => ErrorClass::Authorization,
            QuestError::AchievementNotFound(_)
            | QuestError::AchievementIsDisabled(_)
            | QuestError::RequirementNotMet(_)
            | QuestError::WrongAchievementKind { .. }
            | QuestError::InvalidDelta
            | QuestError::InvalidMetadataKey
            | QuestError::InvalidMetadataValue => ErrorClass::BusinessRule,
            QuestError::SerializationError(_)
            | QuestError::DeserializationError(_)
            | QuestError::IoError(_) => ErrorClass::Storage,
        }
    }

    /// Short machine-readable code, stable across versions.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            QuestError::InvalidMilestoneOrdering(_) => "invalid_milestone_ordering",
            QuestError::InvalidCategory(_) => "invalid_category",
            QuestError::InvalidAchievementKind(_) => "invalid_achievement_kind",
            QuestError::UnknownPrerequisite(_) => "unknown_prerequisite",
            QuestError::SelfReference(_) => "self_reference",
            QuestError::InvalidRequirement { .. } => "invalid_requirement",
            QuestError::TooManyMilestones(_) => "too_many_milestones",
            QuestError::TooManyRequirements(_) => "too_many_requirements",
            QuestError::InvalidField(_) => "invalid_field",
            QuestError::InvalidIdentifier(_) => "invalid_identifier",
            QuestError::UnauthorizedCaller(_) => "unauthorized_caller",
            QuestError::AchievementNotFound(_) => "achievement_not_found",
            QuestError::AchievementIsDisabled(_) => "achievement_is_disabled",
            QuestError::RequirementNotMet(_) => "requirement_not_met",
            QuestError::WrongAchievementKind { .. } => "wrong_achievement_kind",
            QuestError::InvalidDelta => "invalid_delta",
            QuestError::InvalidMetadataKey => "invalid_metadata_key",
            QuestError::InvalidMetadataValue => "invalid_metadata_value",
            QuestError::SerializationError(_) => "serialization_error",
            QuestError::DeserializationError(_) => "deserialization_error",
            QuestError::IoError(_) => "io_error",
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
