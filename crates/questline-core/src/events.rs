//! # Tracker Events
//!
//! Every accepted mutation reports what it changed as a list of
//! [`TrackerEvent`]s. The tracker also appends them to a bounded
//! [`EventLog`] so adapters can page through recent activity.
//!
//! The CORE does not log; the app layer turns events into tracing records.

use crate::primitives::{MAX_EVENT_LOG, MAX_EVENT_PAGE};
use crate::types::{AchievementId, ParticipantId, Principal, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Something the tracker changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TrackerEvent {
    AchievementConfigured {
        achievement: AchievementId,
        created: bool,
    },
    AchievementEnabled {
        achievement: AchievementId,
    },
    AchievementDisabled {
        achievement: AchievementId,
    },
    PrincipalAuthorized {
        principal: Principal,
    },
    PrincipalRevoked {
        principal: Principal,
    },
    ProgressUpdated {
        achievement: AchievementId,
        participant: ParticipantId,
        count: u64,
    },
    MilestoneUnlocked {
        achievement: AchievementId,
        participant: ParticipantId,
        index: usize,
        threshold: u64,
    },
    /// Final milestone of a progression achievement unlocked.
    AchievementCompleted {
        achievement: AchievementId,
        participant: ParticipantId,
    },
    /// One-time achievement unlocked.
    AchievementUnlocked {
        achievement: AchievementId,
        participant: ParticipantId,
    },
    MetadataUpdated {
        achievement: AchievementId,
        key: String,
    },
}

impl TrackerEvent {
    /// Stable snake_case name, matching the serde tag.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            TrackerEvent::AchievementConfigured { .. } => "achievement_configured",
            TrackerEvent::AchievementEnabled { .. } => "achievement_enabled",
            TrackerEvent::AchievementDisabled { .. } => "achievement_disabled",
            TrackerEvent::PrincipalAuthorized { .. } => "principal_authorized",
            TrackerEvent::PrincipalRevoked { .. } => "principal_revoked",
            TrackerEvent::ProgressUpdated { .. } => "progress_updated",
            TrackerEvent::MilestoneUnlocked { .. } => "milestone_unlocked",
            TrackerEvent::AchievementCompleted { .. } => "achievement_completed",
            TrackerEvent::AchievementUnlocked { .. } => "achievement_unlocked",
            TrackerEvent::MetadataUpdated { .. } => "metadata_updated",
        }
    }

    /// Whether this event records an unlock a participant would be told about.
    #[must_use]
    pub fn is_unlock(&self) -> bool {
        matches!(
            self,
            TrackerEvent::MilestoneUnlocked { .. }
                | TrackerEvent::AchievementCompleted { .. }
                | TrackerEvent::AchievementUnlocked { .. }
        )
    }
}

/// An event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub event: TrackerEvent,
}

/// Bounded, volatile log of recent events.
///
/// - Never persisted
/// - Sequence numbers keep increasing after old entries are dropped
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: VecDeque<EventRecord>,
    next_sequence: u64,
}

impl EventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, timestamp: Timestamp, event: TrackerEvent) {
        if self.entries.len() >= MAX_EVENT_LOG {
            self.entries.pop_front();
        }
        self.entries.push_back(EventRecord {
            sequence: self.next_sequence,
            timestamp,
            event,
        });
        self.next_sequence = self.next_sequence.saturating_add(1);
    }

    pub fn extend(&mut self, timestamp: Timestamp, events: &[TrackerEvent]) {
        for event in events {
            self.record(timestamp, event.clone());
        }
    }

    /// Events with `sequence >= since`, oldest first, at most `limit`
    /// (capped at `MAX_EVENT_PAGE`).
    #[must_use]
    pub fn since(&self, since: u64, limit: usize) -> Vec<EventRecord> {
        self.entries
            .iter()
            .filter(|r| r.sequence >= since)
            .take(limit.min(MAX_EVENT_PAGE))
            .cloned()
            .collect()
    }

    /// The newest `limit` events, oldest first.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<EventRecord> {
        let limit = limit.min(MAX_EVENT_PAGE);
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence number the next recorded event will get.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}
