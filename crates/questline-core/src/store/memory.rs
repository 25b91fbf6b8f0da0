//! In-memory store.

use super::{AchievementStore, MetadataEntry, ProgressEntry};
use crate::progress::UserProgress;
use crate::types::{AchievementDefinition, AchievementId, ParticipantId, Principal, QuestError};
use std::collections::{BTreeMap, BTreeSet};

/// Volatile store backed by `BTreeMap`s.
///
/// Infallible in practice; the `Result` signatures come from the trait.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    definitions: BTreeMap<AchievementId, AchievementDefinition>,
    registry: Vec<AchievementId>,
    progress: BTreeMap<(AchievementId, ParticipantId), UserProgress>,
    metadata: BTreeMap<(AchievementId, String), String>,
    principals: BTreeSet<Principal>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AchievementStore for MemoryStore {
    fn definition(&self, id: &AchievementId) -> Result<Option<AchievementDefinition>, QuestError> {
        Ok(self.definitions.get(id).cloned())
    }

    fn put_definition(&mut self, definition: &AchievementDefinition) -> Result<bool, QuestError> {
        let created = self
            .definitions
            .insert(definition.id, definition.clone())
            .is_none();
        if created {
            self.registry.push(definition.id);
        }
        Ok(created)
    }

    fn achievement_ids(&self) -> Result<Vec<AchievementId>, QuestError> {
        Ok(self.registry.clone())
    }

    fn progress(
        &self,
        achievement: &AchievementId,
        participant: &ParticipantId,
    ) -> Result<Option<UserProgress>, QuestError> {
        Ok(self.progress.get(&(*achievement, *participant)).cloned())
    }

    fn put_progress(
        &mut self,
        achievement: &AchievementId,
        participant: &ParticipantId,
        progress: &UserProgress,
    ) -> Result<(), QuestError> {
        self.progress
            .insert((*achievement, *participant), progress.clone());
        Ok(())
    }

    fn progress_entries(&self) -> Result<Vec<ProgressEntry>, QuestError> {
        Ok(self
            .progress
            .iter()
            .map(|((a, p), progress)| (*a, *p, progress.clone()))
            .collect())
    }

    fn metadata(
        &self,
        achievement: &AchievementId,
        key: &str,
    ) -> Result<Option<String>, QuestError> {
        Ok(self.metadata.get(&(*achievement, key.to_string())).cloned())
    }

    fn put_metadata(
        &mut self,
        achievement: &AchievementId,
        key: &str,
        value: &str,
    ) -> Result<(), QuestError> {
        self.metadata
            .insert((*achievement, key.to_string()), value.to_string());
        Ok(())
    }

    fn metadata_entries(&self) -> Result<Vec<MetadataEntry>, QuestError> {
        Ok(self
            .metadata
            .iter()
            .map(|((a, k), v)| (*a, k.clone(), v.clone()))
            .collect())
    }

    fn principals(&self) -> Result<Vec<Principal>, QuestError> {
        Ok(self.principals.iter().copied().collect())
    }

    fn add_principal(&mut self, principal: &Principal) -> Result<(), QuestError> {
        self.principals.insert(*principal);
        Ok(())
    }

    fn remove_principal(&mut self, principal: &Principal) -> Result<(), QuestError> {
        self.principals.remove(principal);
        Ok(())
    }
}
