//! # Storage
//!
//! The [`AchievementStore`] trait abstracts over where definitions, progress,
//! metadata and the principal allow-list live.
//!
//! Implementations:
//! - [`MemoryStore`]: `BTreeMap`-backed, volatile
//! - [`RedbStore`]: redb-backed, ACID, one write transaction per mutation
//!
//! All listing methods return entries in a deterministic order.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::progress::UserProgress;
use crate::types::{AchievementDefinition, AchievementId, ParticipantId, Principal, QuestError};
use std::fmt;

/// One stored progress record with its key.
pub type ProgressEntry = (AchievementId, ParticipantId, UserProgress);

/// One stored metadata attribute: (achievement, key, value).
pub type MetadataEntry = (AchievementId, String, String);

/// Persistence seam of the tracker.
pub trait AchievementStore: fmt::Debug + Send + Sync {
    /// Get a definition by id.
    fn definition(&self, id: &AchievementId) -> Result<Option<AchievementDefinition>, QuestError>;

    /// Insert or replace a definition.
    ///
    /// A new id is appended to the registry order in the same operation.
    /// Returns `true` if the id was new.
    fn put_definition(&mut self, definition: &AchievementDefinition) -> Result<bool, QuestError>;

    /// Every configured id, in first-configuration order.
    fn achievement_ids(&self) -> Result<Vec<AchievementId>, QuestError>;

    /// Every definition, in registry order.
    fn definitions(&self) -> Result<Vec<AchievementDefinition>, QuestError> {
        let mut out = Vec::new();
        for id in self.achievement_ids()? {
            if let Some(def) = self.definition(&id)? {
                out.push(def);
            }
        }
        Ok(out)
    }

    fn progress(
        &self,
        achievement: &AchievementId,
        participant: &ParticipantId,
    ) -> Result<Option<UserProgress>, QuestError>;

    fn put_progress(
        &mut self,
        achievement: &AchievementId,
        participant: &ParticipantId,
        progress: &UserProgress,
    ) -> Result<(), QuestError>;

    /// Every progress record, sorted by (achievement, participant).
    fn progress_entries(&self) -> Result<Vec<ProgressEntry>, QuestError>;

    /// Progress records of one achievement, sorted by participant.
    fn achievement_progress(
        &self,
        achievement: &AchievementId,
    ) -> Result<Vec<(ParticipantId, UserProgress)>, QuestError> {
        Ok(self
            .progress_entries()?
            .into_iter()
            .filter(|(a, _, _)| a == achievement)
            .map(|(_, participant, progress)| (participant, progress))
            .collect())
    }

    /// Replace a definition and rewrite progress records of it together.
    ///
    /// Returns `true` if the id was new.
    fn put_definition_with_progress(
        &mut self,
        definition: &AchievementDefinition,
        progress: &[(ParticipantId, UserProgress)],
    ) -> Result<bool, QuestError> {
        let created = self.put_definition(definition)?;
        for (participant, record) in progress {
            self.put_progress(&definition.id, participant, record)?;
        }
        Ok(created)
    }

    fn metadata(&self, achievement: &AchievementId, key: &str)
    -> Result<Option<String>, QuestError>;

    fn put_metadata(
        &mut self,
        achievement: &AchievementId,
        key: &str,
        value: &str,
    ) -> Result<(), QuestError>;

    /// Every metadata attribute, sorted by (achievement, key).
    fn metadata_entries(&self) -> Result<Vec<MetadataEntry>, QuestError>;

    /// Persisted allow-list, sorted.
    fn principals(&self) -> Result<Vec<Principal>, QuestError>;

    fn add_principal(&mut self, principal: &Principal) -> Result<(), QuestError>;

    fn remove_principal(&mut self, principal: &Principal) -> Result<(), QuestError>;
}

#[cfg(test)]
pub(crate) mod conformance {
    //! Behaviour every store must share; run against each implementation.

    use super::*;
    use crate::types::{AchievementKind, Category, Milestone, Subtype};

    pub fn definition(key: &str, thresholds: &[u64]) -> AchievementDefinition {
        AchievementDefinition {
            id: AchievementId::from_key(key),
            name: key.to_string(),
            description: String::new(),
            category: Category::Collection,
            kind: if thresholds.is_empty() {
                AchievementKind::OneTime
            } else {
                AchievementKind::Progression {
                    milestones: thresholds.iter().map(|t| Milestone::new("m", *t)).collect(),
                }
            },
            badge_uri: String::new(),
            subtype: Subtype::default(),
            requirements: Vec::new(),
            enabled: true,
        }
    }

    pub fn registry_keeps_first_configuration_order(store: &mut dyn AchievementStore) {
        let b = definition("b", &[1]);
        let a = definition("a", &[]);
        assert!(store.put_definition(&b).expect("put b"));
        assert!(store.put_definition(&a).expect("put a"));

        let mut renamed = b.clone();
        renamed.name = "renamed".into();
        assert!(!store.put_definition(&renamed).expect("replace b"));

        assert_eq!(store.achievement_ids().expect("ids"), vec![b.id, a.id]);
        let defs = store.definitions().expect("defs");
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "renamed");
    }

    pub fn progress_roundtrips_sorted(store: &mut dyn AchievementStore) {
        let def = definition("p", &[1, 2]);
        store.put_definition(&def).expect("put");
        let p2 = ParticipantId([2; 32]);
        let p1 = ParticipantId([1; 32]);
        let mut progress = UserProgress::new(&def, 42);
        progress.add(2);
        store.put_progress(&def.id, &p2, &progress).expect("put p2");
        store.put_progress(&def.id, &p1, &progress).expect("put p1");

        assert_eq!(
            store.progress(&def.id, &p1).expect("get"),
            Some(progress.clone())
        );
        assert_eq!(
            store
                .progress(&def.id, &ParticipantId([9; 32]))
                .expect("get missing"),
            None
        );
        let entries = store.progress_entries().expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, p1);
        assert_eq!(entries[1].1, p2);
    }

    pub fn definition_replaced_with_progress(store: &mut dyn AchievementStore) {
        let def = definition("q", &[1, 2]);
        let other = definition("r", &[1]);
        store.put_definition(&def).expect("put");
        store.put_definition(&other).expect("put other");
        let alice = ParticipantId([1; 32]);
        let bob = ParticipantId([2; 32]);
        let mut progress = UserProgress::new(&def, 1);
        progress.add(2);
        let _ = progress.evaluate_milestones(def.milestones());
        store.put_progress(&def.id, &bob, &progress).expect("put bob");
        store.put_progress(&other.id, &alice, &progress).expect("put other");

        let raised = definition("q", &[5, 10]);
        let mut realigned = progress.clone();
        assert!(realigned.realign_milestones(raised.milestones()));
        assert!(
            !store
                .put_definition_with_progress(&raised, &[(bob, realigned.clone())])
                .expect("replace")
        );

        assert_eq!(store.definition(&def.id).expect("get"), Some(raised));
        assert_eq!(
            store.achievement_progress(&def.id).expect("progress"),
            vec![(bob, realigned)]
        );
        assert_eq!(
            store.progress(&other.id, &alice).expect("get other"),
            Some(progress)
        );
    }

    pub fn metadata_and_principals(store: &mut dyn AchievementStore) {
        let id = AchievementId::from_key("m");
        store.put_metadata(&id, "rarity", "rare").expect("put");
        store.put_metadata(&id, "rarity", "legendary").expect("overwrite");
        store.put_metadata(&id, "art", "ipfs://x").expect("put");
        assert_eq!(
            store.metadata(&id, "rarity").expect("get").as_deref(),
            Some("legendary")
        );
        assert_eq!(store.metadata(&id, "missing").expect("get"), None);
        let keys: Vec<String> = store
            .metadata_entries()
            .expect("entries")
            .into_iter()
            .map(|(_, k, _)| k)
            .collect();
        assert_eq!(keys, vec!["art".to_string(), "rarity".to_string()]);

        let game = Principal::from_key("game");
        store.add_principal(&game).expect("add");
        store.add_principal(&game).expect("add twice");
        assert_eq!(store.principals().expect("list"), vec![game]);
        store.remove_principal(&game).expect("remove");
        assert!(store.principals().expect("list").is_empty());
    }
}
