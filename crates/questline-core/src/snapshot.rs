//! # Snapshot Export
//!
//! Deterministic binary snapshot of a tracker's persistent state, for
//! backups and for moving state between backends.
//!
//! Layout:
//! ```text
//! [u32 LE header length][postcard SnapshotHeader][postcard TrackerSnapshot]
//! ```
//!
//! - Definitions appear in registry order, everything else sorted by key
//! - The same state always exports to the same bytes
//! - The event log is volatile and never exported

use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES, MAX_SNAPSHOT_PAYLOAD_SIZE};
use crate::progress::{ProgressState, UserProgress};
use crate::registry::DefinitionRegistry;
use crate::store::{AchievementStore, MemoryStore};
use crate::tracker::{StorageBackend, Tracker};
use crate::{
    AchievementConfig, AchievementDefinition, AchievementId, ParticipantId, Principal, QuestError,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Header of a snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u8,
    pub definition_count: u64,
    pub progress_count: u64,
    /// FNV-1a of the encoded payload.
    pub checksum: u64,
}

impl SnapshotHeader {
    #[must_use]
    pub fn new(definition_count: u64, progress_count: u64, checksum: u64) -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
            definition_count,
            progress_count,
            checksum,
        }
    }

    /// Error messages stay generic on purpose.
    pub fn validate(&self) -> Result<(), QuestError> {
        if &self.magic != MAGIC_BYTES {
            return Err(QuestError::DeserializationError(
                "Invalid file format".to_string(),
            ));
        }
        if self.version != FORMAT_VERSION {
            return Err(QuestError::DeserializationError(
                "Unsupported file version".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotProgress {
    pub achievement: AchievementId,
    pub participant: ParticipantId,
    pub progress: UserProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotMetadata {
    pub achievement: AchievementId,
    pub key: String,
    pub value: String,
}

/// Full persistent state of a tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub admin: Principal,
    /// Registry order.
    pub definitions: Vec<AchievementDefinition>,
    /// Sorted by (achievement, participant).
    pub progress: Vec<SnapshotProgress>,
    /// Sorted by (achievement, key).
    pub metadata: Vec<SnapshotMetadata>,
    /// Sorted.
    pub principals: Vec<Principal>,
}

impl TrackerSnapshot {
    /// Capture the persistent state of `tracker`.
    pub fn capture(tracker: &Tracker) -> Result<Self, QuestError> {
        let store = tracker.store();
        Ok(Self {
            admin: tracker.admin(),
            definitions: store.definitions()?,
            progress: store
                .progress_entries()?
                .into_iter()
                .map(|(achievement, participant, progress)| SnapshotProgress {
                    achievement,
                    participant,
                    progress,
                })
                .collect(),
            metadata: store
                .metadata_entries()?
                .into_iter()
                .map(|(achievement, key, value)| SnapshotMetadata {
                    achievement,
                    key,
                    value,
                })
                .collect(),
            principals: store.principals()?,
        })
    }

    /// Check that every record refers to a definition in the snapshot.
    pub fn validate(&self) -> Result<(), QuestError> {
        let ids: BTreeSet<AchievementId> = self.definitions.iter().map(|d| d.id).collect();
        if ids.len() != self.definitions.len() {
            return Err(QuestError::DeserializationError(
                "Duplicate definition".to_string(),
            ));
        }
        let dangling = self
            .definitions
            .iter()
            .flat_map(|d| d.requirements.iter().map(|r| r.prerequisite))
            .chain(self.progress.iter().map(|p| p.achievement))
            .chain(self.metadata.iter().map(|m| m.achievement))
            .find(|id| !ids.contains(id));
        match dangling {
            Some(id) => Err(QuestError::DeserializationError(format!(
                "Dangling reference to {id}"
            ))),
            None => Ok(()),
        }
    }

    /// Write the snapshot into `backend` and open a tracker over it.
    ///
    /// Every definition passes the same rules as `configure`, checked
    /// against the backend's definitions merged with the snapshot's. Nothing
    /// is written unless all of them pass. Unlock flags are realigned to the
    /// thresholds the merged definitions end up with.
    pub fn restore(self, mut backend: StorageBackend) -> Result<Tracker, QuestError> {
        self.validate()?;
        let staged = self.stage(backend.store())?;

        let store = backend.store_mut();
        for definition in &self.definitions {
            let mut existing = store.achievement_progress(&definition.id)?;
            existing.retain_mut(|(_, progress)| {
                progress.realign_milestones(definition.milestones())
            });
            store.put_definition_with_progress(definition, &existing)?;
        }
        for entry in &self.progress {
            let mut progress = entry.progress.clone();
            if let Some(definition) = staged.definition(&entry.achievement)? {
                progress.realign_milestones(definition.milestones());
            }
            store.put_progress(&entry.achievement, &entry.participant, &progress)?;
        }
        for entry in &self.metadata {
            store.put_metadata(&entry.achievement, &entry.key, &entry.value)?;
        }
        for principal in &self.principals {
            store.add_principal(principal)?;
        }
        Tracker::with_backend(backend, self.admin)
    }

    /// Merge the snapshot's definitions over `target`'s in a scratch store
    /// and validate the result.
    fn stage(&self, target: &dyn AchievementStore) -> Result<MemoryStore, QuestError> {
        let mut staged = MemoryStore::new();
        for definition in target.definitions()? {
            staged.put_definition(&definition)?;
        }
        for definition in &self.definitions {
            if let Some(existing) = staged.definition(&definition.id)? {
                if existing.kind.tag() != definition.kind.tag() {
                    return Err(QuestError::InvalidAchievementKind(format!(
                        "{} cannot change from {} to {}",
                        definition.id,
                        existing.kind.tag(),
                        definition.kind.tag()
                    )));
                }
            }
            staged.put_definition(definition)?;
        }
        for definition in &self.definitions {
            DefinitionRegistry::validate(&AchievementConfig::from(definition), &staged)?;
        }
        for entry in &self.progress {
            let definition = staged
                .definition(&entry.achievement)?
                .ok_or_else(|| {
                    QuestError::DeserializationError(format!(
                        "Dangling reference to {}",
                        entry.achievement
                    ))
                })?;
            let one_time = matches!(entry.progress.state, ProgressState::OneTime { .. });
            if one_time != definition.is_one_time() {
                return Err(QuestError::DeserializationError(format!(
                    "Progress on {} does not match its kind",
                    entry.achievement
                )));
            }
        }
        Ok(staged)
    }

    fn encode(&self) -> Result<Vec<u8>, QuestError> {
        postcard::to_allocvec(self).map_err(|e| QuestError::SerializationError(e.to_string()))
    }
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Export `tracker` as snapshot bytes.
pub fn export_snapshot(tracker: &Tracker) -> Result<Vec<u8>, QuestError> {
    let snapshot = TrackerSnapshot::capture(tracker)?;
    let payload = snapshot.encode()?;
    let header = SnapshotHeader::new(
        snapshot.definitions.len() as u64,
        snapshot.progress.len() as u64,
        fnv1a(&payload),
    );
    let header_bytes = postcard::to_allocvec(&header)
        .map_err(|e| QuestError::SerializationError(e.to_string()))?;
    let header_len = u32::try_from(header_bytes.len())
        .map_err(|_| QuestError::SerializationError("Header too large".to_string()))?;

    let mut out = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode and verify snapshot bytes.
///
/// Header, payload size and checksum are checked before the payload is
/// decoded.
pub fn import_snapshot(data: &[u8]) -> Result<TrackerSnapshot, QuestError> {
    let too_short = || QuestError::DeserializationError("Data too short".to_string());
    let len_bytes: [u8; 4] = data
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(too_short)?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_end = header_len.checked_add(4).ok_or_else(too_short)?;
    let header_bytes = data.get(4..header_end).ok_or_else(too_short)?;
    let payload = data.get(header_end..).ok_or_else(too_short)?;

    let header: SnapshotHeader = postcard::from_bytes(header_bytes)
        .map_err(|e| QuestError::DeserializationError(format!("Header: {e}")))?;
    header.validate()?;

    if payload.len() > MAX_SNAPSHOT_PAYLOAD_SIZE {
        return Err(QuestError::DeserializationError(format!(
            "Payload size {} exceeds maximum allowed {}",
            payload.len(),
            MAX_SNAPSHOT_PAYLOAD_SIZE
        )));
    }
    let computed = fnv1a(payload);
    if computed != header.checksum {
        return Err(QuestError::DeserializationError(format!(
            "Checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }

    let snapshot: TrackerSnapshot = postcard::from_bytes(payload)
        .map_err(|e| QuestError::DeserializationError(format!("Data: {e}")))?;
    if snapshot.definitions.len() as u64 != header.definition_count
        || snapshot.progress.len() as u64 != header.progress_count
    {
        return Err(QuestError::DeserializationError(
            "Record count mismatch".to_string(),
        ));
    }
    Ok(snapshot)
}

/// Fast checksum of the tracker's snapshot payload.
pub fn snapshot_checksum(tracker: &Tracker) -> Result<u64, QuestError> {
    Ok(fnv1a(&TrackerSnapshot::capture(tracker)?.encode()?))
}

/// BLAKE3 hex digest of the full snapshot, for integrity checks across
/// machines.
pub fn snapshot_digest(tracker: &Tracker) -> Result<String, QuestError> {
    Ok(blake3::hash(&export_snapshot(tracker)?).to_hex().to_string())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::{AchievementKind, Category, Milestone, Requirement};

    fn populated() -> Tracker {
        let admin = Principal::from_key("owner");
        let game = Principal::from_key("game");
        let mut tracker = Tracker::in_memory(admin).with_clock(ManualClock::new(50));
        tracker.authorize(&admin, game).expect("authorize");
        let stages = tracker
            .configure(
                &admin,
                &AchievementConfig::progression("stages", "Stages", Category::Evolution)
                    .with_thresholds(&[1, 2]),
            )
            .expect("configure");
        let rare = tracker
            .configure(
                &admin,
                &AchievementConfig::one_time("rare", "Rare", Category::Collection)
                    .requires(Requirement::milestone(stages.id, 0)),
            )
            .expect("configure");
        tracker
            .set_metadata_attribute(&admin, &rare.id, "rarity", "rare")
            .expect("metadata");
        let player = ParticipantId::from_key("player");
        tracker
            .update_progress(&game, &stages.id, &player, 1)
            .expect("update");
        tracker
            .unlock_achievement(&game, &rare.id, &player)
            .expect("unlock");
        tracker
    }

    #[test]
    fn export_is_deterministic() {
        let tracker = populated();
        let a = export_snapshot(&tracker).expect("export");
        let b = export_snapshot(&tracker).expect("export");
        assert_eq!(a, b);
        assert_eq!(
            snapshot_digest(&tracker).expect("digest"),
            snapshot_digest(&tracker).expect("digest")
        );
        assert_eq!(snapshot_digest(&tracker).expect("digest").len(), 64);
    }

    #[test]
    fn restore_reproduces_state() {
        let tracker = populated();
        let bytes = export_snapshot(&tracker).expect("export");
        let restored = import_snapshot(&bytes)
            .expect("import")
            .restore(StorageBackend::default())
            .expect("restore");

        assert_eq!(
            snapshot_checksum(&restored).expect("checksum"),
            snapshot_checksum(&tracker).expect("checksum")
        );
        assert_eq!(restored.admin(), tracker.admin());
        assert!(restored.is_authorized(&Principal::from_key("game")));
        let player = ParticipantId::from_key("player");
        assert!(restored
            .has_achievement(&AchievementId::from_key("rare"), &player)
            .expect("has"));
    }

    #[test]
    fn corrupted_payload_rejected() {
        let mut bytes = export_snapshot(&populated()).expect("export");
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xff;
        }
        assert!(matches!(
            import_snapshot(&bytes),
            Err(QuestError::DeserializationError(_))
        ));
    }

    #[test]
    fn short_and_foreign_data_rejected() {
        assert!(import_snapshot(&[1, 2]).is_err());
        assert!(import_snapshot(&[200, 0, 0, 0, 1]).is_err());

        let header = SnapshotHeader {
            magic: *b"KREX",
            ..SnapshotHeader::new(0, 0, 0)
        };
        assert!(header.validate().is_err());
    }

    #[test]
    fn dangling_progress_rejected_on_restore() {
        let tracker = populated();
        let mut snapshot = TrackerSnapshot::capture(&tracker).expect("capture");
        snapshot.definitions.truncate(1);
        assert!(matches!(
            snapshot.restore(StorageBackend::default()),
            Err(QuestError::DeserializationError(_))
        ));
    }

    #[test]
    fn unordered_thresholds_rejected_on_restore() {
        let mut snapshot = TrackerSnapshot::capture(&populated()).expect("capture");
        snapshot.definitions[0].kind = AchievementKind::Progression {
            milestones: vec![Milestone::new("late", 5), Milestone::new("early", 2)],
        };
        assert!(matches!(
            snapshot.restore(StorageBackend::default()),
            Err(QuestError::InvalidMilestoneOrdering(1))
        ));
    }

    #[test]
    fn kind_change_rejected_on_merge() {
        let snapshot = TrackerSnapshot::capture(&populated()).expect("capture");
        let admin = Principal::from_key("owner");
        let mut target = Tracker::in_memory(admin);
        target
            .configure(
                &admin,
                &AchievementConfig::one_time("stages", "Stages", Category::Evolution),
            )
            .expect("configure");

        assert!(matches!(
            snapshot.restore(target.into_backend()),
            Err(QuestError::InvalidAchievementKind(_))
        ));
    }

    #[test]
    fn progress_of_wrong_kind_rejected() {
        let mut snapshot = TrackerSnapshot::capture(&populated()).expect("capture");
        let stages = AchievementId::from_key("stages");
        let entry = snapshot
            .progress
            .iter_mut()
            .find(|p| p.achievement == stages)
            .expect("stages progress");
        entry.progress.state = ProgressState::OneTime { achieved: true };
        assert!(matches!(
            snapshot.restore(StorageBackend::default()),
            Err(QuestError::DeserializationError(_))
        ));
    }

    #[test]
    fn merge_realigns_existing_progress() {
        let admin = Principal::from_key("owner");
        let game = Principal::from_key("game");
        let player = ParticipantId::from_key("other-player");
        let mut target = Tracker::in_memory(admin);
        target.authorize(&admin, game).expect("authorize");
        let stages = target
            .configure(
                &admin,
                &AchievementConfig::progression("stages", "Stages", Category::Evolution)
                    .with_thresholds(&[3, 4]),
            )
            .expect("configure");
        target
            .update_progress(&game, &stages.id, &player, 2)
            .expect("update");

        // The snapshot lowers the thresholds to [1, 2]
        let snapshot = TrackerSnapshot::capture(&populated()).expect("capture");
        let merged = snapshot.restore(target.into_backend()).expect("restore");
        let view = merged
            .get_detailed_progress(&stages.id, &player)
            .expect("view");
        assert_eq!(view.milestones, vec![true, true]);
    }
}
