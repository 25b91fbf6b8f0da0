//! # Definition Registry
//!
//! Validation of raw [`AchievementConfig`] input into stored
//! [`AchievementDefinition`]s.
//!
//! - Reject malformed configuration as a whole
//! - Never partially apply a configuration
//! - Metadata keys and values are checked here too

use crate::primitives::{
    MAX_METADATA_KEY_LENGTH, MAX_METADATA_VALUE_LENGTH, MAX_MILESTONES, MAX_NAME_LENGTH,
    MAX_REQUIREMENTS, MAX_TEXT_LENGTH,
};
use crate::store::AchievementStore;
use crate::{
    AchievementConfig, AchievementDefinition, AchievementId, AchievementKind, KindTag, Milestone,
    QuestError, RequirementTarget,
};
use std::collections::BTreeSet;

/// The registry validates definitions against the current store contents.
pub struct DefinitionRegistry;

impl DefinitionRegistry {
    /// Validate a configuration.
    ///
    /// Checks, in order:
    /// - kind and milestone list agree, and stay within limits
    /// - thresholds are non-zero and strictly increasing
    /// - text fields are within length limits
    /// - every requirement names another, already configured achievement,
    ///   and milestone targets index an existing milestone
    /// - no requirement chain leads back to this achievement
    /// - an existing id keeps its kind, and keeps every milestone that a
    ///   stored requirement targets
    pub fn validate(
        config: &AchievementConfig,
        store: &dyn AchievementStore,
    ) -> Result<AchievementDefinition, QuestError> {
        let kind = Self::validate_kind(config)?;
        Self::validate_text(config)?;

        if config.requirements.len() > MAX_REQUIREMENTS {
            return Err(QuestError::TooManyRequirements(config.requirements.len()));
        }
        for requirement in &config.requirements {
            if requirement.prerequisite == config.id {
                return Err(QuestError::SelfReference(config.id));
            }
            let prerequisite = store
                .definition(&requirement.prerequisite)?
                .ok_or(QuestError::UnknownPrerequisite(requirement.prerequisite))?;
            // One-time prerequisites accept any target
            if let RequirementTarget::Milestone(index) = requirement.target {
                if !prerequisite.is_one_time() && index >= prerequisite.milestone_count() {
                    return Err(QuestError::InvalidRequirement {
                        prerequisite: requirement.prerequisite,
                        index,
                    });
                }
            }
        }
        Self::check_cycles(config, store)?;

        if let Some(existing) = store.definition(&config.id)? {
            if existing.kind.tag() != config.kind {
                return Err(QuestError::InvalidAchievementKind(format!(
                    "{} cannot change from {} to {}",
                    config.id,
                    existing.kind.tag(),
                    config.kind
                )));
            }
            Self::check_dependents(config.id, &kind, store)?;
        }

        Ok(AchievementDefinition {
            id: config.id,
            name: config.name.clone(),
            description: config.description.clone(),
            category: config.category,
            kind,
            badge_uri: config.badge_uri.clone(),
            subtype: config.subtype,
            requirements: config.requirements.clone(),
            enabled: config.enabled,
        })
    }

    /// Validate a metadata attribute key and value.
    pub fn validate_metadata(key: &str, value: &str) -> Result<(), QuestError> {
        if key.is_empty() || key.len() > MAX_METADATA_KEY_LENGTH {
            return Err(QuestError::InvalidMetadataKey);
        }
        if value.is_empty() || value.len() > MAX_METADATA_VALUE_LENGTH {
            return Err(QuestError::InvalidMetadataValue);
        }
        Ok(())
    }

    fn validate_kind(config: &AchievementConfig) -> Result<AchievementKind, QuestError> {
        match config.kind {
            KindTag::OneTime => {
                if !config.milestones.is_empty() {
                    return Err(QuestError::InvalidAchievementKind(
                        "one_time achievements cannot carry milestones".to_string(),
                    ));
                }
                Ok(AchievementKind::OneTime)
            }
            KindTag::Progression => {
                if config.milestones.len() > MAX_MILESTONES {
                    return Err(QuestError::TooManyMilestones(config.milestones.len()));
                }
                Self::validate_thresholds(&config.milestones)?;
                Ok(AchievementKind::Progression {
                    milestones: config.milestones.clone(),
                })
            }
        }
    }

    /// Non-empty, every threshold > 0, strictly increasing.
    ///
    /// The error carries the index of the first offending milestone.
    fn validate_thresholds(milestones: &[Milestone]) -> Result<(), QuestError> {
        if milestones.is_empty() {
            return Err(QuestError::InvalidMilestoneOrdering(0));
        }
        let mut previous = 0u64;
        for (index, milestone) in milestones.iter().enumerate() {
            if milestone.threshold <= previous {
                return Err(QuestError::InvalidMilestoneOrdering(index));
            }
            previous = milestone.threshold;
        }
        Ok(())
    }

    fn validate_text(config: &AchievementConfig) -> Result<(), QuestError> {
        if config.name.is_empty() || config.name.len() > MAX_NAME_LENGTH {
            return Err(QuestError::InvalidField("name"));
        }
        if config.description.len() > MAX_TEXT_LENGTH {
            return Err(QuestError::InvalidField("description"));
        }
        if config.badge_uri.len() > MAX_TEXT_LENGTH {
            return Err(QuestError::InvalidField("badge_uri"));
        }
        for milestone in &config.milestones {
            if milestone.name.is_empty() || milestone.name.len() > MAX_NAME_LENGTH {
                return Err(QuestError::InvalidField("milestone.name"));
            }
            if milestone.description.len() > MAX_TEXT_LENGTH
                || milestone.badge_uri.len() > MAX_TEXT_LENGTH
            {
                return Err(QuestError::InvalidField("milestone"));
            }
        }
        Ok(())
    }

    /// Every stored `Milestone(index)` requirement on `id` must still index a
    /// milestone of `kind`. One-time prerequisites accept any target.
    fn check_dependents(
        id: AchievementId,
        kind: &AchievementKind,
        store: &dyn AchievementStore,
    ) -> Result<(), QuestError> {
        let AchievementKind::Progression { milestones } = kind else {
            return Ok(());
        };
        for dependent in store.definitions()? {
            for requirement in &dependent.requirements {
                if requirement.prerequisite != id {
                    continue;
                }
                if let RequirementTarget::Milestone(index) = requirement.target {
                    if index >= milestones.len() {
                        return Err(QuestError::InvalidRequirement {
                            prerequisite: id,
                            index,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Depth-first walk over stored requirements starting from the new
    /// prerequisites. Reaching `config.id` means the update closes a cycle.
    fn check_cycles(
        config: &AchievementConfig,
        store: &dyn AchievementStore,
    ) -> Result<(), QuestError> {
        let mut stack: Vec<AchievementId> =
            config.requirements.iter().map(|r| r.prerequisite).collect();
        let mut visited = BTreeSet::new();

        while let Some(current) = stack.pop() {
            if current == config.id {
                return Err(QuestError::SelfReference(config.id));
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(def) = store.definition(&current)? {
                stack.extend(def.requirements.iter().map(|r| r.prerequisite));
            }
        }
        Ok(())
    }
}
