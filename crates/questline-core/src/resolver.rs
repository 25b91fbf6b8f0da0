//! # Requirement Resolver
//!
//! Decides whether a participant has met an achievement's prerequisites.
//!
//! - One-time prerequisite: satisfied only by its `achieved` flag,
//!   whatever the target says
//! - Progression prerequisite: the targeted milestone, or for
//!   `FullCompletion` the final milestone, must be unlocked
//! - No requirements: always satisfied

use crate::progress::UserProgress;
use crate::store::AchievementStore;
use crate::{AchievementDefinition, ParticipantId, QuestError, Requirement, RequirementTarget};

/// Stateless evaluator over the store.
pub struct RequirementResolver;

impl RequirementResolver {
    /// `true` when every requirement of `definition` is met by `participant`.
    pub fn is_satisfied(
        definition: &AchievementDefinition,
        participant: &ParticipantId,
        store: &dyn AchievementStore,
    ) -> Result<bool, QuestError> {
        for requirement in &definition.requirements {
            if !Self::requirement_met(requirement, participant, store)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// The requirements of `definition` that `participant` has not met yet.
    pub fn unmet(
        definition: &AchievementDefinition,
        participant: &ParticipantId,
        store: &dyn AchievementStore,
    ) -> Result<Vec<Requirement>, QuestError> {
        let mut unmet = Vec::new();
        for requirement in &definition.requirements {
            if !Self::requirement_met(requirement, participant, store)? {
                unmet.push(*requirement);
            }
        }
        Ok(unmet)
    }

    /// Evaluate one requirement.
    ///
    /// A prerequisite that no longer resolves to a definition counts as unmet.
    pub fn requirement_met(
        requirement: &Requirement,
        participant: &ParticipantId,
        store: &dyn AchievementStore,
    ) -> Result<bool, QuestError> {
        let Some(prerequisite) = store.definition(&requirement.prerequisite)? else {
            return Ok(false);
        };
        let Some(progress) = store.progress(&prerequisite.id, participant)? else {
            return Ok(false);
        };
        Ok(Self::met_by(&prerequisite, &progress, requirement.target))
    }

    fn met_by(
        prerequisite: &AchievementDefinition,
        progress: &UserProgress,
        target: RequirementTarget,
    ) -> bool {
        if prerequisite.is_one_time() {
            return progress.is_completed(prerequisite);
        }
        match target {
            RequirementTarget::Milestone(index) => progress.milestone_unlocked(index),
            RequirementTarget::FullCompletion => progress.is_completed(prerequisite),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DefinitionRegistry;
    use crate::store::MemoryStore;
    use crate::{AchievementConfig, Category};

    struct Fixture {
        store: MemoryStore,
        player: ParticipantId,
        base: AchievementDefinition,
        badge: AchievementDefinition,
    }

    fn configure(store: &mut MemoryStore, config: &AchievementConfig) -> AchievementDefinition {
        let def = DefinitionRegistry::validate(config, store).expect("valid");
        store.put_definition(&def).expect("put");
        def
    }

    fn fixture() -> Fixture {
        let mut store = MemoryStore::new();
        let base = configure(
            &mut store,
            &AchievementConfig::progression("base", "Base", Category::Evolution)
                .with_thresholds(&[2, 4]),
        );
        let badge = configure(
            &mut store,
            &AchievementConfig::one_time("badge", "Badge", Category::Collection),
        );
        Fixture {
            store,
            player: ParticipantId::from_key("player"),
            base,
            badge,
        }
    }

    fn set_count(f: &mut Fixture, count: u64) {
        let mut p = UserProgress::new(&f.base, 0);
        p.add(count);
        let _ = p.evaluate_milestones(f.base.milestones());
        f.store.put_progress(&f.base.id, &f.player, &p).expect("put");
    }

    #[test]
    fn no_requirements_always_satisfied() {
        let f = fixture();
        assert!(RequirementResolver::is_satisfied(&f.base, &f.player, &f.store).expect("eval"));
    }

    #[test]
    fn milestone_and_completion_targets() {
        let mut f = fixture();
        let milestone = Requirement::milestone(f.base.id, 0);
        let complete = Requirement::completion(f.base.id);

        assert!(!RequirementResolver::requirement_met(&milestone, &f.player, &f.store).expect("e"));
        set_count(&mut f, 2);
        assert!(RequirementResolver::requirement_met(&milestone, &f.player, &f.store).expect("e"));
        assert!(!RequirementResolver::requirement_met(&complete, &f.player, &f.store).expect("e"));
        set_count(&mut f, 4);
        assert!(RequirementResolver::requirement_met(&complete, &f.player, &f.store).expect("e"));
    }

    #[test]
    fn one_time_prerequisite_ignores_target() {
        let mut f = fixture();
        let req = Requirement::milestone(f.badge.id, 3);
        assert!(!RequirementResolver::requirement_met(&req, &f.player, &f.store).expect("e"));

        let mut p = UserProgress::new(&f.badge, 0);
        assert!(p.unlock());
        f.store.put_progress(&f.badge.id, &f.player, &p).expect("put");
        assert!(RequirementResolver::requirement_met(&req, &f.player, &f.store).expect("e"));
    }

    #[test]
    fn unmet_lists_only_missing() {
        let mut f = fixture();
        set_count(&mut f, 2);
        let gated = AchievementDefinition {
            requirements: vec![
                Requirement::milestone(f.base.id, 0),
                Requirement::completion(f.badge.id),
            ],
            ..f.badge.clone()
        };
        let unmet = RequirementResolver::unmet(&gated, &f.player, &f.store).expect("eval");
        assert_eq!(unmet, vec![Requirement::completion(f.badge.id)]);
        assert!(!RequirementResolver::is_satisfied(&gated, &f.player, &f.store).expect("eval"));
    }
}
