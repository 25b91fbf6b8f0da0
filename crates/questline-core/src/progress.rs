//! # Progress Ledger
//!
//! Per-(achievement, participant) progress state and the milestone walk.
//!
//! State machine:
//! - Progression: `Unstarted -> InProgress -> PartiallyUnlocked* -> Completed`
//! - One-time:    `Unstarted -> Achieved`
//!
//! Records are created lazily on the first accepted mutation and never
//! removed. Progress mutations only move unlock flags from `false` to `true`;
//! reconfiguring an achievement realigns the flags to its new thresholds.

use crate::events::TrackerEvent;
use crate::types::{AchievementDefinition, AchievementId, Milestone, ParticipantId, Timestamp};
use serde::{Deserialize, Serialize};

/// Kind-specific unlock state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressState {
    OneTime { achieved: bool },
    Progression { unlocked: Vec<bool> },
}

/// Stored progress of one participant on one achievement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub count: u64,
    /// Highest value seen by deduplicated updates.
    pub highest_observed: Option<u64>,
    pub state: ProgressState,
    pub start_time: Timestamp,
    pub last_update: Timestamp,
}

impl UserProgress {
    /// Fresh record for `definition`, started at `now`.
    #[must_use]
    pub fn new(definition: &AchievementDefinition, now: Timestamp) -> Self {
        let state = if definition.is_one_time() {
            ProgressState::OneTime { achieved: false }
        } else {
            ProgressState::Progression {
                unlocked: vec![false; definition.milestone_count()],
            }
        };
        Self {
            count: 0,
            highest_observed: None,
            state,
            start_time: now,
            last_update: now,
        }
    }

    /// Saturating add to the cumulative count.
    pub fn add(&mut self, delta: u64) {
        self.count = self.count.saturating_add(delta);
    }

    /// Deduplicated observation: counts once per strictly higher value.
    ///
    /// Returns `false` (and changes nothing) for a stale or repeated value.
    pub fn observe(&mut self, observed: u64) -> bool {
        match self.highest_observed {
            Some(highest) if observed <= highest => false,
            _ => {
                self.highest_observed = Some(observed);
                self.add(1);
                true
            }
        }
    }

    /// Mark a one-time achievement achieved. Returns `true` on the first unlock.
    pub fn unlock(&mut self) -> bool {
        match &mut self.state {
            ProgressState::OneTime { achieved } if !*achieved => {
                *achieved = true;
                self.count = 1;
                true
            }
            _ => false,
        }
    }

    /// Unlock every milestone whose threshold is reached, walking in
    /// ascending order and stopping at the first unmet threshold.
    ///
    /// Returns the indices newly unlocked by this call.
    pub fn evaluate_milestones(&mut self, milestones: &[Milestone]) -> Vec<usize> {
        let count = self.count;
        let ProgressState::Progression { unlocked } = &mut self.state else {
            return Vec::new();
        };
        if unlocked.len() < milestones.len() {
            unlocked.resize(milestones.len(), false);
        }

        let mut newly = Vec::new();
        for (index, milestone) in milestones.iter().enumerate() {
            if milestone.threshold > count {
                break;
            }
            if let Some(flag) = unlocked.get_mut(index).filter(|f| !**f) {
                *flag = true;
                newly.push(index);
            }
        }
        newly
    }

    /// Reset the unlock flags to `threshold <= count` for `milestones`.
    ///
    /// Used when a definition's milestone list is replaced. Returns `true`
    /// if any flag changed.
    pub fn realign_milestones(&mut self, milestones: &[Milestone]) -> bool {
        let count = self.count;
        let ProgressState::Progression { unlocked } = &mut self.state else {
            return false;
        };
        let aligned: Vec<bool> = milestones.iter().map(|m| m.threshold <= count).collect();
        if *unlocked == aligned {
            return false;
        }
        *unlocked = aligned;
        true
    }

    /// Unlock flags aligned to a definition with `milestone_count` milestones.
    #[must_use]
    pub fn milestone_flags(&self, milestone_count: usize) -> Vec<bool> {
        match &self.state {
            ProgressState::OneTime { .. } => vec![false; milestone_count],
            ProgressState::Progression { unlocked } => (0..milestone_count)
                .map(|i| unlocked.get(i).copied().unwrap_or(false))
                .collect(),
        }
    }

    #[must_use]
    pub fn milestone_unlocked(&self, index: usize) -> bool {
        match &self.state {
            ProgressState::OneTime { .. } => false,
            ProgressState::Progression { unlocked } => {
                unlocked.get(index).copied().unwrap_or(false)
            }
        }
    }

    #[must_use]
    pub fn unlocked_count(&self, milestone_count: usize) -> usize {
        match &self.state {
            ProgressState::OneTime { .. } => 0,
            ProgressState::Progression { unlocked } => {
                unlocked.iter().take(milestone_count).filter(|f| **f).count()
            }
        }
    }

    /// One-time: achieved. Progression: final milestone unlocked.
    #[must_use]
    pub fn is_completed(&self, definition: &AchievementDefinition) -> bool {
        match &self.state {
            ProgressState::OneTime { achieved } => *achieved,
            ProgressState::Progression { .. } => match definition.milestone_count() {
                0 => false,
                n => self.milestone_unlocked(n - 1),
            },
        }
    }

    #[must_use]
    pub fn phase(&self, definition: &AchievementDefinition) -> ProgressPhase {
        if definition.is_one_time() {
            return if self.is_completed(definition) {
                ProgressPhase::Achieved
            } else {
                ProgressPhase::Unstarted
            };
        }
        let unlocked = self.unlocked_count(definition.milestone_count());
        if self.is_completed(definition) {
            ProgressPhase::Completed
        } else if unlocked > 0 {
            ProgressPhase::PartiallyUnlocked { unlocked }
        } else if self.count > 0 {
            ProgressPhase::InProgress
        } else {
            ProgressPhase::Unstarted
        }
    }
}

// =============================================================================
// VIEWS
// =============================================================================

/// Where a participant stands on one achievement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ProgressPhase {
    Unstarted,
    InProgress,
    PartiallyUnlocked { unlocked: usize },
    Completed,
    Achieved,
}

/// Compact progress view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressView {
    pub count: u64,
    /// One-time flag, or progression fully completed.
    pub achieved: bool,
    pub start_time: Timestamp,
    pub last_update: Timestamp,
}

impl ProgressView {
    /// View of `progress` (all zero when absent).
    #[must_use]
    pub fn of(definition: &AchievementDefinition, progress: Option<&UserProgress>) -> Self {
        progress.map_or_else(Self::default, |p| Self {
            count: p.count,
            achieved: p.is_completed(definition),
            start_time: p.start_time,
            last_update: p.last_update,
        })
    }
}

/// Progress view with per-milestone flags for UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedProgressView {
    pub achievement: AchievementId,
    pub participant: ParticipantId,
    pub count: u64,
    pub achieved: bool,
    pub start_time: Timestamp,
    pub last_update: Timestamp,
    pub highest_observed: Option<u64>,
    /// Aligned to the current definition's milestone list.
    pub milestones: Vec<bool>,
    pub phase: ProgressPhase,
}

impl DetailedProgressView {
    #[must_use]
    pub fn of(
        definition: &AchievementDefinition,
        participant: ParticipantId,
        progress: Option<&UserProgress>,
    ) -> Self {
        let view = ProgressView::of(definition, progress);
        let n = definition.milestone_count();
        Self {
            achievement: definition.id,
            participant,
            count: view.count,
            achieved: view.achieved,
            start_time: view.start_time,
            last_update: view.last_update,
            highest_observed: progress.and_then(|p| p.highest_observed),
            milestones: progress.map_or_else(|| vec![false; n], |p| p.milestone_flags(n)),
            phase: progress.map_or(ProgressPhase::Unstarted, |p| p.phase(definition)),
        }
    }
}

/// Result of an accepted progress mutation.
///
/// `events` is empty when the call was a no-op success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressOutcome {
    pub view: ProgressView,
    pub events: Vec<TrackerEvent>,
}

impl ProgressOutcome {
    #[must_use]
    pub fn unchanged(view: ProgressView) -> Self {
        Self {
            view,
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.events.is_empty()
    }

    /// Milestone indices unlocked by this call.
    #[must_use]
    pub fn unlocked_milestones(&self) -> Vec<usize> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TrackerEvent::MilestoneUnlocked { index, .. } => Some(*index),
                _ => None,
            })
            .collect()
    }
}
