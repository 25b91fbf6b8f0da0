//! # Tracker
//!
//! The engine facade: guard, registry, ledger, resolver and aggregator
//! over one storage backend.
//!
//! Every mutation:
//! 1. runs all checks before touching state
//! 2. writes its result in one store operation
//! 3. returns and logs the [`TrackerEvent`]s it produced
//!
//! A mutation that returns an error has changed nothing.
//!
//! ## Storage Backends
//!
//! - `InMemory`: [`MemoryStore`] (fast, volatile)
//! - `Persistent`: [`RedbStore`] (disk-backed ACID storage)

use crate::aggregate::{CategoryAggregator, CategoryProgressView, CategoryTotals, Summary};
use crate::clock::{Clock, SystemClock};
use crate::events::{EventLog, EventRecord, TrackerEvent};
use crate::guard::{Authorizer, Guard};
use crate::progress::{DetailedProgressView, ProgressOutcome, ProgressView, UserProgress};
use crate::registry::DefinitionRegistry;
use crate::resolver::RequirementResolver;
use crate::store::{AchievementStore, MemoryStore, RedbStore};
use crate::{
    AchievementConfig, AchievementDefinition, AchievementId, Category, KindTag, ParticipantId,
    Principal, QuestError, Requirement, Timestamp,
};
use std::path::Path;

/// Storage backend of a tracker.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory maps (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

impl StorageBackend {
    #[must_use]
    pub fn store(&self) -> &dyn AchievementStore {
        match self {
            StorageBackend::InMemory(s) => s,
            StorageBackend::Persistent(s) => s,
        }
    }

    pub fn store_mut(&mut self) -> &mut dyn AchievementStore {
        match self {
            StorageBackend::InMemory(s) => s,
            StorageBackend::Persistent(s) => s,
        }
    }
}

/// The achievement and progression engine.
#[derive(Debug)]
pub struct Tracker {
    backend: StorageBackend,
    guard: Guard,
    clock: Box<dyn Clock>,
    events: EventLog,
}

impl Tracker {
    /// Create an empty in-memory tracker administered by `admin`.
    #[must_use]
    pub fn in_memory(admin: Principal) -> Self {
        Self {
            backend: StorageBackend::default(),
            guard: Guard::new(admin),
            clock: Box::new(SystemClock),
            events: EventLog::new(),
        }
    }

    /// Open or create a redb-backed tracker.
    ///
    /// The persisted allow-list is loaded into the guard.
    pub fn open_redb(path: impl AsRef<Path>, admin: Principal) -> Result<Self, QuestError> {
        let store = RedbStore::open(path)?;
        Self::with_backend(StorageBackend::Persistent(store), admin)
    }

    /// Wrap an existing backend, loading its allow-list.
    pub fn with_backend(backend: StorageBackend, admin: Principal) -> Result<Self, QuestError> {
        let mut guard = Guard::new(admin);
        for principal in backend.store().principals()? {
            guard.authorize(principal);
        }
        Ok(Self {
            backend,
            guard,
            clock: Box::new(SystemClock),
            events: EventLog::new(),
        })
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Replace the allow-list implementation, seeding it with the
    /// persisted principals.
    pub fn with_authorizer(
        mut self,
        mut authorizer: Box<dyn Authorizer>,
    ) -> Result<Self, QuestError> {
        for principal in self.store().principals()? {
            authorizer.authorize(principal);
        }
        self.guard = Guard::with_authorizer(self.guard.admin(), authorizer);
        Ok(self)
    }

    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StorageBackend::Persistent(_))
    }

    #[must_use]
    pub fn admin(&self) -> Principal {
        self.guard.admin()
    }

    /// Read access to the underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn AchievementStore {
        self.backend.store()
    }

    /// Give up the tracker, keeping its stored state. The event log is dropped.
    #[must_use]
    pub fn into_backend(self) -> StorageBackend {
        self.backend
    }

    fn store_mut(&mut self) -> &mut dyn AchievementStore {
        self.backend.store_mut()
    }

    fn record(&mut self, events: &[TrackerEvent]) {
        let now = self.clock.now();
        self.events.extend(now, events);
    }

    // =========================================================================
    // ADMINISTRATION
    // =========================================================================

    /// Insert or replace an achievement definition.
    ///
    /// Replacing the milestone list realigns every stored unlock flag of the
    /// achievement to `threshold <= count` in the same store operation.
    pub fn configure(
        &mut self,
        caller: &Principal,
        config: &AchievementConfig,
    ) -> Result<AchievementDefinition, QuestError> {
        self.guard.require_admin(caller)?;
        let definition = DefinitionRegistry::validate(config, self.store())?;
        let realigned = self.realigned_progress(&definition)?;
        let created = self
            .store_mut()
            .put_definition_with_progress(&definition, &realigned)?;
        self.record(&[TrackerEvent::AchievementConfigured {
            achievement: definition.id,
            created,
        }]);
        Ok(definition)
    }

    /// Stored progress whose flags disagree with `definition`'s thresholds.
    fn realigned_progress(
        &self,
        definition: &AchievementDefinition,
    ) -> Result<Vec<(ParticipantId, UserProgress)>, QuestError> {
        let Some(previous) = self.store().definition(&definition.id)? else {
            return Ok(Vec::new());
        };
        let thresholds = |def: &AchievementDefinition| -> Vec<u64> {
            def.milestones().iter().map(|m| m.threshold).collect()
        };
        if thresholds(&previous) == thresholds(definition) {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for (participant, mut progress) in self.store().achievement_progress(&definition.id)? {
            if progress.realign_milestones(definition.milestones()) {
                out.push((participant, progress));
            }
        }
        Ok(out)
    }

    pub fn enable(&mut self, caller: &Principal, id: &AchievementId) -> Result<(), QuestError> {
        self.set_enabled(caller, id, true)
    }

    /// Disable an achievement. Progress is kept; mutations are refused.
    pub fn disable(&mut self, caller: &Principal, id: &AchievementId) -> Result<(), QuestError> {
        self.set_enabled(caller, id, false)
    }

    fn set_enabled(
        &mut self,
        caller: &Principal,
        id: &AchievementId,
        enabled: bool,
    ) -> Result<(), QuestError> {
        self.guard.require_admin(caller)?;
        let mut definition = self.get_achievement(id)?;
        if definition.enabled == enabled {
            return Ok(());
        }
        definition.enabled = enabled;
        self.store_mut().put_definition(&definition)?;
        let event = if enabled {
            TrackerEvent::AchievementEnabled { achievement: *id }
        } else {
            TrackerEvent::AchievementDisabled { achievement: *id }
        };
        self.record(&[event]);
        Ok(())
    }

    /// Add a principal to the allow-list. Returns `true` if it was new.
    pub fn authorize(
        &mut self,
        caller: &Principal,
        principal: Principal,
    ) -> Result<bool, QuestError> {
        self.guard.require_admin(caller)?;
        self.store_mut().add_principal(&principal)?;
        let added = self.guard.authorize(principal);
        if added {
            self.record(&[TrackerEvent::PrincipalAuthorized { principal }]);
        }
        Ok(added)
    }

    /// Remove a principal from the allow-list. Returns `true` if it was present.
    pub fn revoke(&mut self, caller: &Principal, principal: &Principal) -> Result<bool, QuestError> {
        self.guard.require_admin(caller)?;
        self.store_mut().remove_principal(principal)?;
        let removed = self.guard.revoke(principal);
        if removed {
            self.record(&[TrackerEvent::PrincipalRevoked {
                principal: *principal,
            }]);
        }
        Ok(removed)
    }

    pub fn set_metadata_attribute(
        &mut self,
        caller: &Principal,
        id: &AchievementId,
        key: &str,
        value: &str,
    ) -> Result<(), QuestError> {
        self.guard.require_admin(caller)?;
        self.get_achievement(id)?;
        DefinitionRegistry::validate_metadata(key, value)?;
        self.store_mut().put_metadata(id, key, value)?;
        self.record(&[TrackerEvent::MetadataUpdated {
            achievement: *id,
            key: key.to_string(),
        }]);
        Ok(())
    }

    // =========================================================================
    // PROGRESS MUTATIONS
    // =========================================================================

    /// Add `delta` to a progression achievement and unlock reached milestones.
    pub fn update_progress(
        &mut self,
        caller: &Principal,
        id: &AchievementId,
        participant: &ParticipantId,
        delta: u64,
    ) -> Result<ProgressOutcome, QuestError> {
        let definition = self.precheck(caller, id, KindTag::Progression)?;
        if delta == 0 {
            return Err(QuestError::InvalidDelta);
        }
        self.require_prerequisites(&definition, participant)?;

        let now = self.clock.now();
        let mut progress = self.load_or_start(&definition, participant, now)?;
        progress.add(delta);
        self.commit_progression(&definition, participant, progress, now)
    }

    /// Count `observed` once if it is higher than anything seen before.
    ///
    /// A stale or repeated value is a successful no-op.
    pub fn update_deduped_progress(
        &mut self,
        caller: &Principal,
        id: &AchievementId,
        participant: &ParticipantId,
        observed: u64,
    ) -> Result<ProgressOutcome, QuestError> {
        let definition = self.precheck(caller, id, KindTag::Progression)?;
        self.require_prerequisites(&definition, participant)?;

        let now = self.clock.now();
        let mut progress = self.load_or_start(&definition, participant, now)?;
        if !progress.observe(observed) {
            return Ok(ProgressOutcome::unchanged(ProgressView::of(
                &definition,
                Some(&progress),
            )));
        }
        self.commit_progression(&definition, participant, progress, now)
    }

    /// Unlock a one-time achievement. Repeat calls are successful no-ops.
    pub fn unlock_achievement(
        &mut self,
        caller: &Principal,
        id: &AchievementId,
        participant: &ParticipantId,
    ) -> Result<ProgressOutcome, QuestError> {
        let definition = self.precheck(caller, id, KindTag::OneTime)?;
        self.require_prerequisites(&definition, participant)?;

        let now = self.clock.now();
        let mut progress = self.load_or_start(&definition, participant, now)?;
        if !progress.unlock() {
            return Ok(ProgressOutcome::unchanged(ProgressView::of(
                &definition,
                Some(&progress),
            )));
        }
        progress.last_update = now;
        self.store_mut().put_progress(id, participant, &progress)?;

        let events = vec![TrackerEvent::AchievementUnlocked {
            achievement: *id,
            participant: *participant,
        }];
        self.events.extend(now, &events);
        Ok(ProgressOutcome {
            view: ProgressView::of(&definition, Some(&progress)),
            events,
        })
    }

    /// Caller authorized, definition exists, enabled, expected kind.
    fn precheck(
        &self,
        caller: &Principal,
        id: &AchievementId,
        expected: KindTag,
    ) -> Result<AchievementDefinition, QuestError> {
        self.guard.require_authorized(caller)?;
        let definition = self.get_achievement(id)?;
        if !definition.enabled {
            return Err(QuestError::AchievementIsDisabled(*id));
        }
        let actual = definition.kind.tag();
        if actual != expected {
            return Err(QuestError::WrongAchievementKind {
                id: *id,
                expected,
                actual,
            });
        }
        Ok(definition)
    }

    fn require_prerequisites(
        &self,
        definition: &AchievementDefinition,
        participant: &ParticipantId,
    ) -> Result<(), QuestError> {
        if RequirementResolver::is_satisfied(definition, participant, self.store())? {
            Ok(())
        } else {
            Err(QuestError::RequirementNotMet(definition.id))
        }
    }

    fn load_or_start(
        &self,
        definition: &AchievementDefinition,
        participant: &ParticipantId,
        now: Timestamp,
    ) -> Result<UserProgress, QuestError> {
        Ok(self
            .store()
            .progress(&definition.id, participant)?
            .unwrap_or_else(|| UserProgress::new(definition, now)))
    }

    /// Walk milestones, persist, and report.
    fn commit_progression(
        &mut self,
        definition: &AchievementDefinition,
        participant: &ParticipantId,
        mut progress: UserProgress,
        now: Timestamp,
    ) -> Result<ProgressOutcome, QuestError> {
        let newly = progress.evaluate_milestones(definition.milestones());
        progress.last_update = now;
        self.store_mut()
            .put_progress(&definition.id, participant, &progress)?;

        let mut events = vec![TrackerEvent::ProgressUpdated {
            achievement: definition.id,
            participant: *participant,
            count: progress.count,
        }];
        let last = definition.milestone_count().checked_sub(1);
        for index in newly {
            let threshold = definition
                .milestones()
                .get(index)
                .map_or(0, |m| m.threshold);
            events.push(TrackerEvent::MilestoneUnlocked {
                achievement: definition.id,
                participant: *participant,
                index,
                threshold,
            });
            if Some(index) == last {
                events.push(TrackerEvent::AchievementCompleted {
                    achievement: definition.id,
                    participant: *participant,
                });
            }
        }
        self.events.extend(now, &events);

        Ok(ProgressOutcome {
            view: ProgressView::of(definition, Some(&progress)),
            events,
        })
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn get_achievement(&self, id: &AchievementId) -> Result<AchievementDefinition, QuestError> {
        self.store()
            .definition(id)?
            .ok_or(QuestError::AchievementNotFound(*id))
    }

    /// Every configured id, in first-configuration order.
    pub fn list_achievement_ids(&self) -> Result<Vec<AchievementId>, QuestError> {
        self.store().achievement_ids()
    }

    pub fn list_by_category(
        &self,
        category: Category,
    ) -> Result<Vec<AchievementDefinition>, QuestError> {
        Ok(self
            .store()
            .definitions()?
            .into_iter()
            .filter(|d| d.category == category)
            .collect())
    }

    /// Compact view; all zero for a participant with no record.
    pub fn get_progress(
        &self,
        id: &AchievementId,
        participant: &ParticipantId,
    ) -> Result<ProgressView, QuestError> {
        let definition = self.get_achievement(id)?;
        let progress = self.store().progress(id, participant)?;
        Ok(ProgressView::of(&definition, progress.as_ref()))
    }

    pub fn get_detailed_progress(
        &self,
        id: &AchievementId,
        participant: &ParticipantId,
    ) -> Result<DetailedProgressView, QuestError> {
        let definition = self.get_achievement(id)?;
        let progress = self.store().progress(id, participant)?;
        Ok(DetailedProgressView::of(
            &definition,
            *participant,
            progress.as_ref(),
        ))
    }

    /// One-time achieved, or progression fully completed.
    pub fn has_achievement(
        &self,
        id: &AchievementId,
        participant: &ParticipantId,
    ) -> Result<bool, QuestError> {
        Ok(self.get_progress(id, participant)?.achieved)
    }

    pub fn unmet_requirements(
        &self,
        id: &AchievementId,
        participant: &ParticipantId,
    ) -> Result<Vec<Requirement>, QuestError> {
        let definition = self.get_achievement(id)?;
        RequirementResolver::unmet(&definition, participant, self.store())
    }

    #[must_use]
    pub fn is_authorized(&self, principal: &Principal) -> bool {
        self.guard.is_authorized(principal)
    }

    #[must_use]
    pub fn principals(&self) -> Vec<Principal> {
        self.guard.principals()
    }

    pub fn get_metadata_attribute(
        &self,
        id: &AchievementId,
        key: &str,
    ) -> Result<Option<String>, QuestError> {
        self.store().metadata(id, key)
    }

    /// All metadata of one achievement, sorted by key.
    pub fn metadata_attributes(
        &self,
        id: &AchievementId,
    ) -> Result<Vec<(String, String)>, QuestError> {
        Ok(self
            .store()
            .metadata_entries()?
            .into_iter()
            .filter(|(a, _, _)| a == id)
            .map(|(_, k, v)| (k, v))
            .collect())
    }

    pub fn category_totals(&self, category: Category) -> Result<CategoryTotals, QuestError> {
        CategoryAggregator::category_totals(self.store(), category)
    }

    pub fn category_progress(
        &self,
        category: Category,
        participant: &ParticipantId,
    ) -> Result<CategoryProgressView, QuestError> {
        CategoryAggregator::category_progress(self.store(), category, participant)
    }

    pub fn all_categories_progress(
        &self,
        participant: &ParticipantId,
    ) -> Result<Vec<CategoryProgressView>, QuestError> {
        CategoryAggregator::all_categories_progress(self.store(), participant)
    }

    pub fn completed_achievements(
        &self,
        participant: &ParticipantId,
    ) -> Result<Vec<AchievementDefinition>, QuestError> {
        CategoryAggregator::completed_achievements(self.store(), participant)
    }

    pub fn summary(&self) -> Result<Summary, QuestError> {
        CategoryAggregator::summary(self.store())
    }

    /// The newest `limit` events, oldest first.
    #[must_use]
    pub fn recent_events(&self, limit: usize) -> Vec<EventRecord> {
        self.events.recent(limit)
    }

    /// Events with sequence >= `since`, oldest first.
    #[must_use]
    pub fn events_since(&self, since: u64, limit: usize) -> Vec<EventRecord> {
        self.events.since(since, limit)
    }

    /// Sequence number the next recorded event will carry.
    #[must_use]
    pub fn next_event_sequence(&self) -> u64 {
        self.events.next_sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn setup() -> (Tracker, Principal, Principal, ManualClock) {
        let admin = Principal::from_key("owner");
        let game = Principal::from_key("game");
        let clock = ManualClock::new(1_000);
        let mut tracker = Tracker::in_memory(admin).with_clock(clock.clone());
        tracker.authorize(&admin, game).expect("authorize");
        (tracker, admin, game, clock)
    }

    #[test]
    fn update_sets_timestamps() {
        let (mut tracker, admin, game, clock) = setup();
        let def = tracker
            .configure(
                &admin,
                &AchievementConfig::progression("feed", "Feed", Category::Action)
                    .with_thresholds(&[2]),
            )
            .expect("configure");
        let player = ParticipantId::from_key("p");

        tracker
            .update_progress(&game, &def.id, &player, 1)
            .expect("update");
        clock.advance(60);
        let outcome = tracker
            .update_progress(&game, &def.id, &player, 1)
            .expect("update");

        assert_eq!(outcome.view.start_time, 1_000);
        assert_eq!(outcome.view.last_update, 1_060);
        assert!(outcome.view.achieved);
        assert_eq!(outcome.unlocked_milestones(), vec![0]);
        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, TrackerEvent::AchievementCompleted { .. })));
    }

    #[test]
    fn admin_operations_require_admin() {
        let (mut tracker, _admin, game, _) = setup();
        let config = AchievementConfig::one_time("x", "X", Category::Challenge);
        assert!(matches!(
            tracker.configure(&game, &config),
            Err(QuestError::UnauthorizedCaller(p)) if p == game
        ));
        assert!(matches!(
            tracker.authorize(&game, Principal::from_key("other")),
            Err(QuestError::UnauthorizedCaller(_))
        ));
        assert!(tracker.list_achievement_ids().expect("ids").is_empty());
    }

    #[test]
    fn check_order_auth_before_existence() {
        let (mut tracker, _admin, _game, _) = setup();
        let stranger = Principal::from_key("stranger");
        let ghost = AchievementId::from_key("ghost");
        let player = ParticipantId::from_key("p");
        assert!(matches!(
            tracker.update_progress(&stranger, &ghost, &player, 1),
            Err(QuestError::UnauthorizedCaller(_))
        ));
    }

    #[test]
    fn wrong_kind_before_delta() {
        let (mut tracker, admin, game, _) = setup();
        let def = tracker
            .configure(
                &admin,
                &AchievementConfig::one_time("badge", "Badge", Category::Collection),
            )
            .expect("configure");
        let player = ParticipantId::from_key("p");
        assert!(matches!(
            tracker.update_progress(&game, &def.id, &player, 0),
            Err(QuestError::WrongAchievementKind {
                expected: KindTag::Progression,
                actual: KindTag::OneTime,
                ..
            })
        ));
    }

    #[test]
    fn zero_delta_rejected() {
        let (mut tracker, admin, game, _) = setup();
        let def = tracker
            .configure(
                &admin,
                &AchievementConfig::progression("a", "A", Category::Action).with_thresholds(&[1]),
            )
            .expect("configure");
        let player = ParticipantId::from_key("p");
        assert!(matches!(
            tracker.update_progress(&game, &def.id, &player, 0),
            Err(QuestError::InvalidDelta)
        ));
        assert_eq!(
            tracker.get_progress(&def.id, &player).expect("view"),
            ProgressView::default()
        );
    }

    #[test]
    fn metadata_roundtrip_and_limits() {
        let (mut tracker, admin, _game, _) = setup();
        let def = tracker
            .configure(
                &admin,
                &AchievementConfig::one_time("rare", "Rare", Category::Collection),
            )
            .expect("configure");
        tracker
            .set_metadata_attribute(&admin, &def.id, "rarity", "rare")
            .expect("set");
        assert_eq!(
            tracker
                .get_metadata_attribute(&def.id, "rarity")
                .expect("get")
                .as_deref(),
            Some("rare")
        );
        assert!(matches!(
            tracker.set_metadata_attribute(&admin, &def.id, "", "x"),
            Err(QuestError::InvalidMetadataKey)
        ));
        assert!(matches!(
            tracker.set_metadata_attribute(&admin, &AchievementId::from_key("nope"), "k", "v"),
            Err(QuestError::AchievementNotFound(_))
        ));
        assert_eq!(
            tracker.metadata_attributes(&def.id).expect("list"),
            vec![("rarity".to_string(), "rare".to_string())]
        );
    }

    #[test]
    fn revoke_blocks_further_updates() {
        let (mut tracker, admin, game, _) = setup();
        let def = tracker
            .configure(
                &admin,
                &AchievementConfig::progression("a", "A", Category::Action).with_thresholds(&[5]),
            )
            .expect("configure");
        let player = ParticipantId::from_key("p");
        tracker
            .update_progress(&game, &def.id, &player, 1)
            .expect("update");
        assert!(tracker.revoke(&admin, &game).expect("revoke"));
        assert!(!tracker.is_authorized(&game));
        assert!(matches!(
            tracker.update_progress(&game, &def.id, &player, 1),
            Err(QuestError::UnauthorizedCaller(_))
        ));
        assert_eq!(tracker.get_progress(&def.id, &player).expect("view").count, 1);
    }

    #[test]
    fn events_are_logged_in_order() {
        let (mut tracker, admin, _game, _) = setup();
        tracker
            .configure(
                &admin,
                &AchievementConfig::one_time("a", "A", Category::Action),
            )
            .expect("configure");
        let names: Vec<&str> = tracker
            .recent_events(10)
            .iter()
            .map(|r| r.event.name())
            .collect();
        assert_eq!(names, vec!["principal_authorized", "achievement_configured"]);
        assert_eq!(tracker.events_since(1, 10).len(), 1);
        assert_eq!(tracker.next_event_sequence(), 2);
    }

    #[test]
    fn into_backend_keeps_stored_state() {
        let (mut tracker, admin, game, _) = setup();
        let def = tracker
            .configure(
                &admin,
                &AchievementConfig::progression("feed", "Feed", Category::Action)
                    .with_thresholds(&[5]),
            )
            .expect("configure");
        let player = ParticipantId::from_key("p");
        tracker
            .update_progress(&game, &def.id, &player, 2)
            .expect("update");

        let reopened = Tracker::with_backend(tracker.into_backend(), admin).expect("reopen");
        assert!(reopened.is_authorized(&game));
        assert_eq!(reopened.get_progress(&def.id, &player).expect("view").count, 2);
        assert!(reopened.recent_events(10).is_empty());
    }
}
