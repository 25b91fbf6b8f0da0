//! # Scenario Tests
//!
//! End-to-end behaviour of the tracker through its public API, on both
//! storage backends.

#![allow(clippy::unwrap_used, clippy::panic)]

use questline_core::{
    AchievementConfig, AchievementId, Category, ManualClock, ParticipantId, ProgressPhase,
    ProgressView, Principal, QuestError, Requirement, Tracker, TrackerEvent,
};
use tempfile::tempdir;

// =============================================================================
// HELPERS
// =============================================================================

struct World {
    tracker: Tracker,
    admin: Principal,
    game: Principal,
    player: ParticipantId,
}

fn world() -> World {
    let admin = Principal::from_key("owner");
    let game = Principal::from_key("game-server");
    let mut tracker = Tracker::in_memory(admin).with_clock(ManualClock::new(1_700_000_000));
    tracker.authorize(&admin, game).expect("authorize");
    World {
        tracker,
        admin,
        game,
        player: ParticipantId::from_key("player-1"),
    }
}

impl World {
    fn configure(&mut self, config: AchievementConfig) -> AchievementId {
        self.tracker
            .configure(&self.admin, &config)
            .expect("configure")
            .id
    }
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn evolution_progression_dedup_scenario() {
    let mut w = world();
    let id = w.configure(
        AchievementConfig::progression(
            "evolution_progression",
            "Evolution Progression",
            Category::Evolution,
        )
        .with_thresholds(&[1, 2, 3, 4]),
    );

    w.tracker
        .update_deduped_progress(&w.game, &id, &w.player, 1)
        .expect("observe 1");
    let view = w.tracker.get_detailed_progress(&id, &w.player).expect("view");
    assert_eq!(view.count, 1);
    assert_eq!(view.milestones, vec![true, false, false, false]);

    let repeat = w
        .tracker
        .update_deduped_progress(&w.game, &id, &w.player, 1)
        .expect("observe 1 again");
    assert!(repeat.is_noop());
    assert_eq!(w.tracker.get_progress(&id, &w.player).expect("view").count, 1);

    w.tracker
        .update_deduped_progress(&w.game, &id, &w.player, 2)
        .expect("observe 2");
    let view = w.tracker.get_detailed_progress(&id, &w.player).expect("view");
    assert_eq!(view.count, 2);
    assert_eq!(view.milestones, vec![true, true, false, false]);
    assert_eq!(view.highest_observed, Some(2));
    assert_eq!(view.phase, ProgressPhase::PartiallyUnlocked { unlocked: 2 });
}

#[test]
fn rare_collector_gates_rare_evolution() {
    let mut w = world();
    let collector = w.configure(AchievementConfig::one_time(
        "rare_collector",
        "Rare Collector",
        Category::Collection,
    ));
    let evolution = w.configure(
        AchievementConfig::one_time("rare_evolution", "Rare Evolution", Category::Evolution)
            .requires(Requirement::completion(collector)),
    );

    assert!(matches!(
        w.tracker.unlock_achievement(&w.game, &evolution, &w.player),
        Err(QuestError::RequirementNotMet(id)) if id == evolution
    ));
    assert_eq!(
        w.tracker.unmet_requirements(&evolution, &w.player).expect("unmet"),
        vec![Requirement::completion(collector)]
    );

    w.tracker
        .unlock_achievement(&w.game, &collector, &w.player)
        .expect("unlock collector");
    let outcome = w
        .tracker
        .unlock_achievement(&w.game, &evolution, &w.player)
        .expect("unlock evolution");
    assert!(outcome.view.achieved);
    assert!(w.tracker.has_achievement(&evolution, &w.player).expect("has"));
    assert!(w
        .tracker
        .unmet_requirements(&evolution, &w.player)
        .expect("unmet")
        .is_empty());
}

#[test]
fn unlock_idempotent_across_disable_and_enable() {
    let mut w = world();
    let id = w.configure(AchievementConfig::one_time(
        "first_feed",
        "First Feed",
        Category::Action,
    ));
    w.tracker.disable(&w.admin, &id).expect("disable");
    assert!(matches!(
        w.tracker.unlock_achievement(&w.game, &id, &w.player),
        Err(QuestError::AchievementIsDisabled(_))
    ));
    w.tracker.enable(&w.admin, &id).expect("enable");

    let first = w
        .tracker
        .unlock_achievement(&w.game, &id, &w.player)
        .expect("unlock");
    assert!(matches!(
        first.events.as_slice(),
        [TrackerEvent::AchievementUnlocked { .. }]
    ));
    for _ in 0..3 {
        let again = w
            .tracker
            .unlock_achievement(&w.game, &id, &w.player)
            .expect("repeat unlock");
        assert!(again.is_noop());
        assert!(again.view.achieved);
        assert_eq!(again.view.count, 1);
    }
}

#[test]
fn unauthorized_calls_change_nothing() {
    let mut w = world();
    let progression = w.configure(
        AchievementConfig::progression("streak", "Streak", Category::Streak)
            .with_thresholds(&[3, 7]),
    );
    let one_time = w.configure(AchievementConfig::one_time(
        "explorer",
        "Explorer",
        Category::Expedition,
    ));
    w.tracker
        .update_progress(&w.game, &progression, &w.player, 2)
        .expect("update");

    let before_p = w.tracker.get_progress(&progression, &w.player).expect("view");
    let before_o = w.tracker.get_progress(&one_time, &w.player).expect("view");

    for intruder in [Principal::from_key("intruder"), w.admin] {
        assert!(matches!(
            w.tracker.update_progress(&intruder, &progression, &w.player, 5),
            Err(QuestError::UnauthorizedCaller(_))
        ));
        assert!(matches!(
            w.tracker
                .update_deduped_progress(&intruder, &progression, &w.player, 99),
            Err(QuestError::UnauthorizedCaller(_))
        ));
        assert!(matches!(
            w.tracker.unlock_achievement(&intruder, &one_time, &w.player),
            Err(QuestError::UnauthorizedCaller(_))
        ));
    }

    assert_eq!(
        w.tracker.get_progress(&progression, &w.player).expect("view"),
        before_p
    );
    assert_eq!(
        w.tracker.get_progress(&one_time, &w.player).expect("view"),
        before_o
    );
}

#[test]
fn milestone_requirement_blocks_until_reached() {
    let mut w = world();
    let stages = w.configure(
        AchievementConfig::progression("stages", "Stages", Category::Evolution)
            .with_thresholds(&[2, 5, 9]),
    );
    let trainer = w.configure(
        AchievementConfig::progression("trainer", "Trainer", Category::Action)
            .with_thresholds(&[1])
            .requires(Requirement::milestone(stages, 1)),
    );

    w.tracker
        .update_progress(&w.game, &stages, &w.player, 4)
        .expect("stages to 4");
    assert!(matches!(
        w.tracker.update_progress(&w.game, &trainer, &w.player, 1),
        Err(QuestError::RequirementNotMet(_))
    ));
    assert_eq!(
        w.tracker.get_progress(&trainer, &w.player).expect("view"),
        ProgressView::default()
    );

    w.tracker
        .update_progress(&w.game, &stages, &w.player, 1)
        .expect("stages to 5");
    let outcome = w
        .tracker
        .update_progress(&w.game, &trainer, &w.player, 1)
        .expect("trainer");
    assert!(outcome.view.achieved);
}

#[test]
fn disable_preserves_state_and_resumes() {
    let mut w = world();
    let id = w.configure(
        AchievementConfig::progression("feeder", "Feeder", Category::Action)
            .with_thresholds(&[2, 4, 6]),
    );
    w.tracker
        .update_progress(&w.game, &id, &w.player, 3)
        .expect("update");
    w.tracker.disable(&w.admin, &id).expect("disable");

    assert!(matches!(
        w.tracker.update_progress(&w.game, &id, &w.player, 1),
        Err(QuestError::AchievementIsDisabled(_))
    ));
    let frozen = w.tracker.get_detailed_progress(&id, &w.player).expect("view");
    assert_eq!(frozen.count, 3);
    assert_eq!(frozen.milestones, vec![true, false, false]);

    w.tracker.enable(&w.admin, &id).expect("enable");
    let outcome = w
        .tracker
        .update_progress(&w.game, &id, &w.player, 1)
        .expect("resume");
    assert_eq!(outcome.view.count, 4);
    assert_eq!(outcome.unlocked_milestones(), vec![1]);
}

#[test]
fn large_delta_unlocks_several_milestones_in_order() {
    let mut w = world();
    let id = w.configure(
        AchievementConfig::progression("hoard", "Hoard", Category::Collection)
            .with_thresholds(&[1, 10, 100]),
    );
    let outcome = w
        .tracker
        .update_progress(&w.game, &id, &w.player, 100)
        .expect("update");

    let kinds: Vec<&str> = outcome.events.iter().map(TrackerEvent::name).collect();
    assert_eq!(
        kinds,
        vec![
            "progress_updated",
            "milestone_unlocked",
            "milestone_unlocked",
            "milestone_unlocked",
            "achievement_completed",
        ]
    );
    assert_eq!(outcome.unlocked_milestones(), vec![0, 1, 2]);
}

#[test]
fn reconfigure_realigns_unlocks_to_new_thresholds() {
    let mut w = world();
    let config = AchievementConfig::progression("ladder", "Ladder", Category::Challenge)
        .with_thresholds(&[5, 10]);
    let id = w.configure(config.clone());
    w.tracker
        .update_progress(&w.game, &id, &w.player, 6)
        .expect("update");

    // Raise the bar and add a rung; a count of 6 no longer reaches the first
    let mut harder = config.clone();
    harder.milestones.clear();
    let harder = harder.with_thresholds(&[8, 12, 20]);
    let created = w.tracker.configure(&w.admin, &harder).expect("reconfigure");
    assert_eq!(created.milestone_count(), 3);
    assert_eq!(w.tracker.list_achievement_ids().expect("ids"), vec![id]);

    let view = w.tracker.get_detailed_progress(&id, &w.player).expect("view");
    assert_eq!(view.count, 6);
    assert_eq!(view.milestones, vec![false, false, false]);

    let outcome = w
        .tracker
        .update_progress(&w.game, &id, &w.player, 6)
        .expect("update");
    assert_eq!(outcome.view.count, 12);
    assert_eq!(outcome.unlocked_milestones(), vec![0, 1]);

    // Lowering thresholds unlocks what the count already covers
    let mut easier = config;
    easier.milestones.clear();
    let easier = easier.with_thresholds(&[2, 4, 12]);
    w.tracker.configure(&w.admin, &easier).expect("reconfigure");
    let view = w.tracker.get_detailed_progress(&id, &w.player).expect("view");
    assert_eq!(view.milestones, vec![true, true, true]);
}

#[test]
fn raised_thresholds_revoke_full_completion_gate() {
    let mut w = world();
    let base = AchievementConfig::progression("base", "Base", Category::Evolution)
        .with_thresholds(&[1, 2]);
    let base_id = w.configure(base.clone());
    let gated = w.configure(
        AchievementConfig::progression("gated", "Gated", Category::Challenge)
            .with_thresholds(&[1])
            .requires(Requirement::completion(base_id)),
    );
    w.tracker
        .update_progress(&w.game, &base_id, &w.player, 2)
        .expect("complete base");
    assert!(w.tracker.has_achievement(&base_id, &w.player).expect("has"));

    let mut raised = base;
    raised.milestones.clear();
    w.tracker
        .configure(&w.admin, &raised.with_thresholds(&[5, 10]))
        .expect("reconfigure");

    assert!(!w.tracker.has_achievement(&base_id, &w.player).expect("has"));
    let result = w.tracker.update_progress(&w.game, &gated, &w.player, 1);
    assert!(matches!(result, Err(QuestError::RequirementNotMet(_))));
}

#[test]
fn category_rollups_and_completed_list() {
    let mut w = world();
    let stages = w.configure(
        AchievementConfig::progression("stages", "Stages", Category::Evolution)
            .with_thresholds(&[1, 2]),
    );
    let badge = w.configure(AchievementConfig::one_time(
        "badge",
        "Badge",
        Category::Evolution,
    ));
    w.configure(AchievementConfig::one_time(
        "collector",
        "Collector",
        Category::Collection,
    ));

    w.tracker
        .update_progress(&w.game, &stages, &w.player, 1)
        .expect("update");
    w.tracker
        .unlock_achievement(&w.game, &badge, &w.player)
        .expect("unlock");

    let evolution = w
        .tracker
        .category_progress(Category::Evolution, &w.player)
        .expect("rollup");
    assert_eq!(evolution.total_goals, 3);
    assert_eq!(evolution.completed_goals, 2);
    assert_eq!(evolution.unlocked_milestones, 1);
    assert_eq!(evolution.completed_achievements, 1);

    let all = w.tracker.all_categories_progress(&w.player).expect("all");
    assert_eq!(all.len(), Category::ALL.len());
    assert_eq!(all[Category::Collection.index() as usize].total_goals, 1);

    let completed: Vec<AchievementId> = w
        .tracker
        .completed_achievements(&w.player)
        .expect("completed")
        .iter()
        .map(|d| d.id)
        .collect();
    assert_eq!(completed, vec![badge]);

    let listed = w
        .tracker
        .list_by_category(Category::Evolution)
        .expect("list");
    assert_eq!(listed.len(), 2);
    let totals = w.tracker.category_totals(Category::Evolution).expect("totals");
    assert_eq!(totals.milestone_count, 2);
    assert_eq!(totals.one_time_count, 1);
}

#[test]
fn unknown_ids_and_participants() {
    let mut w = world();
    let ghost = AchievementId::from_key("ghost");
    assert!(matches!(
        w.tracker.get_progress(&ghost, &w.player),
        Err(QuestError::AchievementNotFound(_))
    ));
    assert!(matches!(
        w.tracker.update_progress(&w.game, &ghost, &w.player, 1),
        Err(QuestError::AchievementNotFound(_))
    ));

    let id = w.configure(
        AchievementConfig::progression("a", "A", Category::Action).with_thresholds(&[1]),
    );
    let stranger = ParticipantId::from_key("never-seen");
    assert_eq!(
        w.tracker.get_progress(&id, &stranger).expect("view"),
        ProgressView::default()
    );
    assert!(!w.tracker.has_achievement(&id, &stranger).expect("has"));
}

// =============================================================================
// PERSISTENCE
// =============================================================================

#[test]
fn redb_tracker_survives_reopen() {
    let temp = tempdir().expect("temp dir");
    let path = temp.path().join("questline.redb");
    let admin = Principal::from_key("owner");
    let game = Principal::from_key("game-server");
    let player = ParticipantId::from_key("player-1");

    let id = {
        let mut tracker = Tracker::open_redb(&path, admin).expect("open");
        assert!(tracker.is_persistent());
        tracker.authorize(&admin, game).expect("authorize");
        let id = tracker
            .configure(
                &admin,
                &AchievementConfig::progression("stages", "Stages", Category::Evolution)
                    .with_thresholds(&[1, 2, 3]),
            )
            .expect("configure")
            .id;
        tracker
            .update_progress(&game, &id, &player, 2)
            .expect("update");
        id
    };

    let mut tracker = Tracker::open_redb(&path, admin).expect("reopen");
    assert!(tracker.is_authorized(&game));
    let view = tracker.get_detailed_progress(&id, &player).expect("view");
    assert_eq!(view.count, 2);
    assert_eq!(view.milestones, vec![true, true, false]);

    let outcome = tracker
        .update_progress(&game, &id, &player, 1)
        .expect("update");
    assert!(outcome.view.achieved);
}
