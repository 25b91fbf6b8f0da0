//! # Achievement Catalogs
//!
//! Human-authored achievement definitions, read from TOML files by
//! `questline seed` and from JSON bodies by `POST /achievements`.
//!
//! Entries name achievements and prerequisites by key; ids are derived
//! with [`AchievementId::resolve`], so a 64-character hex id works too.
//!
//! ```toml
//! [[achievement]]
//! key = "rare_collector"
//! name = "Rare Collector"
//! category = "collection"
//! kind = "one_time"
//!
//! [[achievement]]
//! key = "rare_evolution"
//! name = "Rare Evolution"
//! category = "evolution"
//! kind = "one_time"
//! requires = [{ prerequisite = "rare_collector" }]
//! ```

use questline_core::{
    AchievementConfig, AchievementDefinition, AchievementId, Category, KindTag, Milestone,
    Principal, QuestError, Requirement, Subtype, Tracker,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum catalog file size (4 MB).
const MAX_CATALOG_FILE_SIZE: u64 = 4 * 1024 * 1024;

// =============================================================================
// ENTRY TYPES
// =============================================================================

/// A prerequisite named by key.
///
/// Without `milestone` the prerequisite must be fully completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementSpec {
    pub prerequisite: String,
    #[serde(default)]
    pub milestone: Option<usize>,
}

impl RequirementSpec {
    pub fn to_requirement(&self) -> Result<Requirement, QuestError> {
        let prerequisite = resolve_id(&self.prerequisite)?;
        Ok(match self.milestone {
            Some(index) => Requirement::milestone(prerequisite, index),
            None => Requirement::completion(prerequisite),
        })
    }
}

/// One achievement as written in a catalog or API request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementSpec {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Category name (any case) or index.
    pub category: String,
    pub kind: KindTag,
    #[serde(default)]
    pub badge_uri: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub requires: Vec<RequirementSpec>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl AchievementSpec {
    /// Resolve keys and category into an engine configuration.
    ///
    /// Structural rules (threshold ordering, prerequisite existence) are
    /// left to the engine's registry.
    pub fn to_config(&self) -> Result<AchievementConfig, QuestError> {
        let category: Category = self.category.parse()?;
        let requirements = self
            .requires
            .iter()
            .map(RequirementSpec::to_requirement)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(AchievementConfig {
            id: resolve_id(&self.key)?,
            name: self.name.clone(),
            description: self.description.clone(),
            category,
            kind: self.kind,
            badge_uri: self.badge_uri.clone(),
            subtype: self
                .subtype
                .as_deref()
                .map(Subtype::resolve)
                .unwrap_or_default(),
            milestones: self.milestones.clone(),
            requirements,
            enabled: self.enabled,
        })
    }
}

/// Resolve a key or hex id, rejecting blank input.
pub fn resolve_id(input: &str) -> Result<AchievementId, QuestError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(QuestError::InvalidIdentifier(input.to_string()));
    }
    Ok(AchievementId::resolve(trimmed))
}

// =============================================================================
// CATALOG
// =============================================================================

/// An ordered list of achievement entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, rename = "achievement")]
    pub achievements: Vec<AchievementSpec>,
}

impl Catalog {
    /// Parse a catalog from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, QuestError> {
        toml::from_str(text).map_err(|e| QuestError::DeserializationError(e.to_string()))
    }

    /// Read and parse a catalog file.
    pub fn load(path: &Path) -> Result<Self, QuestError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| QuestError::IoError(format!("Cannot read catalog metadata: {}", e)))?;
        if metadata.len() > MAX_CATALOG_FILE_SIZE {
            return Err(QuestError::DeserializationError(format!(
                "Catalog size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CATALOG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| QuestError::IoError(format!("Read catalog: {}", e)))?;
        Self::from_toml(&text)
    }

    /// Configure every entry, in file order.
    ///
    /// Stops at the first rejected entry; entries before it stay configured.
    pub fn apply(
        &self,
        tracker: &mut Tracker,
        caller: &Principal,
    ) -> Result<Vec<AchievementDefinition>, QuestError> {
        self.achievements
            .iter()
            .map(|spec| tracker.configure(caller, &spec.to_config()?))
            .collect()
    }
}
