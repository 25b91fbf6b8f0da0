//! # Category Aggregator
//!
//! Read-only rollups derived on demand from definitions and progress.
//! Holds no state of its own.
//!
//! A "goal" is one milestone of a progression achievement or one one-time
//! achievement. Disabled achievements are counted like enabled ones.

use crate::store::AchievementStore;
use crate::{AchievementDefinition, Category, ParticipantId, QuestError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Static totals of one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTotals {
    pub category: Category,
    pub achievement_count: usize,
    /// Milestones across all progression achievements in the category.
    pub milestone_count: usize,
    pub one_time_count: usize,
}

impl CategoryTotals {
    #[must_use]
    pub fn empty(category: Category) -> Self {
        Self {
            category,
            achievement_count: 0,
            milestone_count: 0,
            one_time_count: 0,
        }
    }

    /// Milestones plus one-time achievements.
    #[must_use]
    pub fn total_goals(&self) -> usize {
        self.milestone_count.saturating_add(self.one_time_count)
    }

    fn add(&mut self, definition: &AchievementDefinition) {
        self.achievement_count = self.achievement_count.saturating_add(1);
        if definition.is_one_time() {
            self.one_time_count = self.one_time_count.saturating_add(1);
        } else {
            self.milestone_count = self
                .milestone_count
                .saturating_add(definition.milestone_count());
        }
    }
}

/// One participant's standing in one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryProgressView {
    pub category: Category,
    pub completed_achievements: usize,
    pub unlocked_milestones: usize,
    pub total_goals: usize,
    pub completed_goals: usize,
}

/// Engine-wide counts for dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub achievements: usize,
    pub one_time: usize,
    pub progression: usize,
    pub milestones: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub participants: usize,
    pub progress_records: usize,
    pub categories: Vec<CategoryTotals>,
}

/// Rollup queries over a store.
pub struct CategoryAggregator;

impl CategoryAggregator {
    pub fn category_totals(
        store: &dyn AchievementStore,
        category: Category,
    ) -> Result<CategoryTotals, QuestError> {
        let mut totals = CategoryTotals::empty(category);
        for def in store.definitions()? {
            if def.category == category {
                totals.add(&def);
            }
        }
        Ok(totals)
    }

    pub fn category_progress(
        store: &dyn AchievementStore,
        category: Category,
        participant: &ParticipantId,
    ) -> Result<CategoryProgressView, QuestError> {
        let definitions: Vec<AchievementDefinition> = store
            .definitions()?
            .into_iter()
            .filter(|d| d.category == category)
            .collect();
        Self::progress_over(store, category, &definitions, participant)
    }

    /// One view per category, in category index order.
    pub fn all_categories_progress(
        store: &dyn AchievementStore,
        participant: &ParticipantId,
    ) -> Result<Vec<CategoryProgressView>, QuestError> {
        let definitions = store.definitions()?;
        let mut out = Vec::with_capacity(Category::ALL.len());
        for category in Category::ALL {
            let in_category: Vec<AchievementDefinition> = definitions
                .iter()
                .filter(|d| d.category == category)
                .cloned()
                .collect();
            out.push(Self::progress_over(
                store,
                category,
                &in_category,
                participant,
            )?);
        }
        Ok(out)
    }

    /// Definitions the participant has completed, in registry order.
    pub fn completed_achievements(
        store: &dyn AchievementStore,
        participant: &ParticipantId,
    ) -> Result<Vec<AchievementDefinition>, QuestError> {
        let mut out = Vec::new();
        for def in store.definitions()? {
            if let Some(progress) = store.progress(&def.id, participant)? {
                if progress.is_completed(&def) {
                    out.push(def);
                }
            }
        }
        Ok(out)
    }

    pub fn summary(store: &dyn AchievementStore) -> Result<Summary, QuestError> {
        let mut categories: Vec<CategoryTotals> =
            Category::ALL.iter().map(|c| CategoryTotals::empty(*c)).collect();
        let mut summary = Summary {
            achievements: 0,
            one_time: 0,
            progression: 0,
            milestones: 0,
            enabled: 0,
            disabled: 0,
            participants: 0,
            progress_records: 0,
            categories: Vec::new(),
        };

        for def in store.definitions()? {
            summary.achievements = summary.achievements.saturating_add(1);
            if def.is_one_time() {
                summary.one_time = summary.one_time.saturating_add(1);
            } else {
                summary.progression = summary.progression.saturating_add(1);
                summary.milestones = summary.milestones.saturating_add(def.milestone_count());
            }
            if def.enabled {
                summary.enabled = summary.enabled.saturating_add(1);
            } else {
                summary.disabled = summary.disabled.saturating_add(1);
            }
            if let Some(totals) = categories.get_mut(def.category.index() as usize) {
                totals.add(&def);
            }
        }

        let entries = store.progress_entries()?;
        let participants: BTreeSet<ParticipantId> = entries.iter().map(|(_, p, _)| *p).collect();
        summary.participants = participants.len();
        summary.progress_records = entries.len();
        summary.categories = categories;
        Ok(summary)
    }

    fn progress_over(
        store: &dyn AchievementStore,
        category: Category,
        definitions: &[AchievementDefinition],
        participant: &ParticipantId,
    ) -> Result<CategoryProgressView, QuestError> {
        let mut view = CategoryProgressView {
            category,
            completed_achievements: 0,
            unlocked_milestones: 0,
            total_goals: 0,
            completed_goals: 0,
        };
        for def in definitions {
            let goals = if def.is_one_time() {
                1
            } else {
                def.milestone_count()
            };
            view.total_goals = view.total_goals.saturating_add(goals);

            let Some(progress) = store.progress(&def.id, participant)? else {
                continue;
            };
            if progress.is_completed(def) {
                view.completed_achievements = view.completed_achievements.saturating_add(1);
            }
            if def.is_one_time() {
                if progress.is_completed(def) {
                    view.completed_goals = view.completed_goals.saturating_add(1);
                }
            } else {
                let unlocked = progress.unlocked_count(def.milestone_count());
                view.unlocked_milestones = view.unlocked_milestones.saturating_add(unlocked);
                view.completed_goals = view.completed_goals.saturating_add(unlocked);
            }
        }
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::UserProgress;
    use crate::registry::DefinitionRegistry;
    use crate::store::MemoryStore;
    use crate::AchievementConfig;

    fn configure(store: &mut MemoryStore, config: AchievementConfig) -> AchievementDefinition {
        let def = DefinitionRegistry::validate(&config, store).expect("valid");
        store.put_definition(&def).expect("put");
        def
    }

    #[test]
    fn totals_and_progress() {
        let mut store = MemoryStore::new();
        let stages = configure(
            &mut store,
            AchievementConfig::progression("stages", "Stages", Category::Evolution)
                .with_thresholds(&[1, 2, 3]),
        );
        let first = configure(
            &mut store,
            AchievementConfig::one_time("first", "First", Category::Evolution).disabled(),
        );
        configure(
            &mut store,
            AchievementConfig::one_time("collector", "Collector", Category::Collection),
        );

        let totals = CategoryAggregator::category_totals(&store, Category::Evolution).expect("t");
        assert_eq!(totals.achievement_count, 2);
        assert_eq!(totals.milestone_count, 3);
        assert_eq!(totals.one_time_count, 1);
        assert_eq!(totals.total_goals(), 4);

        let player = ParticipantId::from_key("player");
        let mut p = UserProgress::new(&stages, 0);
        p.add(2);
        let _ = p.evaluate_milestones(stages.milestones());
        store.put_progress(&stages.id, &player, &p).expect("put");
        let mut o = UserProgress::new(&first, 0);
        o.unlock();
        store.put_progress(&first.id, &player, &o).expect("put");

        let view =
            CategoryAggregator::category_progress(&store, Category::Evolution, &player).expect("v");
        assert_eq!(view.completed_achievements, 1);
        assert_eq!(view.unlocked_milestones, 2);
        assert_eq!(view.total_goals, 4);
        assert_eq!(view.completed_goals, 3);

        let completed = CategoryAggregator::completed_achievements(&store, &player).expect("c");
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, first.id);
    }

    #[test]
    fn all_categories_in_index_order() {
        let store = MemoryStore::new();
        let views = CategoryAggregator::all_categories_progress(
            &store,
            &ParticipantId::from_key("nobody"),
        )
        .expect("views");
        let categories: Vec<Category> = views.iter().map(|v| v.category).collect();
        assert_eq!(categories, Category::ALL.to_vec());
        assert!(views.iter().all(|v| v.total_goals == 0));
    }

    #[test]
    fn summary_counts() {
        let mut store = MemoryStore::new();
        let a = configure(
            &mut store,
            AchievementConfig::progression("a", "A", Category::Streak).with_thresholds(&[1, 7]),
        );
        configure(
            &mut store,
            AchievementConfig::one_time("b", "B", Category::Action).disabled(),
        );
        store
            .put_progress(
                &a.id,
                &ParticipantId::from_key("p1"),
                &UserProgress::new(&a, 0),
            )
            .expect("put");

        let summary = CategoryAggregator::summary(&store).expect("summary");
        assert_eq!(summary.achievements, 2);
        assert_eq!(summary.one_time, 1);
        assert_eq!(summary.progression, 1);
        assert_eq!(summary.milestones, 2);
        assert_eq!(summary.disabled, 1);
        assert_eq!(summary.participants, 1);
        assert_eq!(summary.categories.len(), Category::ALL.len());
        assert_eq!(summary.categories[Category::Streak.index() as usize].milestone_count, 2);
    }
}
