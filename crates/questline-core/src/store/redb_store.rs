//! # redb-backed Store
//!
//! Disk-backed [`AchievementStore`] on the redb embedded database.
//!
//! - ACID transactions, copy-on-write B-trees
//! - Each mutation is a single write transaction
//! - Values are postcard-encoded; keys are raw token bytes, so redb's
//!   byte ordering matches the in-memory `BTreeMap` ordering

use super::{AchievementStore, MetadataEntry, ProgressEntry};
use crate::progress::UserProgress;
use crate::types::{
    AchievementDefinition, AchievementId, ParticipantId, Principal, QuestError, TOKEN_LEN,
};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Definitions: achievement id -> postcard `AchievementDefinition`
const DEFINITIONS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("definitions");

/// Registry order: position -> achievement id
const REGISTRY: TableDefinition<u64, &[u8]> = TableDefinition::new("registry");

/// Progress: (achievement id, participant id) -> postcard `UserProgress`
const PROGRESS: TableDefinition<(&[u8], &[u8]), &[u8]> = TableDefinition::new("progress");

/// Metadata: (achievement id, key) -> value
const METADATA: TableDefinition<(&[u8], &str), &str> = TableDefinition::new("metadata");

/// Allow-list: principal -> 1
const PRINCIPALS: TableDefinition<&[u8], u8> = TableDefinition::new("principals");

fn io_err(e: impl std::fmt::Display) -> QuestError {
    QuestError::IoError(e.to_string())
}

fn token(bytes: &[u8]) -> Result<[u8; TOKEN_LEN], QuestError> {
    bytes
        .try_into()
        .map_err(|_| QuestError::DeserializationError(format!("bad key length {}", bytes.len())))
}

/// A disk-backed achievement store.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QuestError> {
        let db = Database::create(path.as_ref()).map_err(io_err)?;

        // Create tables up front so reads never hit a missing table
        let write_txn = db.begin_write().map_err(io_err)?;
        {
            let _ = write_txn.open_table(DEFINITIONS).map_err(io_err)?;
            let _ = write_txn.open_table(REGISTRY).map_err(io_err)?;
            let _ = write_txn.open_table(PROGRESS).map_err(io_err)?;
            let _ = write_txn.open_table(METADATA).map_err(io_err)?;
            let _ = write_txn.open_table(PRINCIPALS).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;

        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<bool, QuestError> {
        self.db.compact().map_err(io_err)
    }
}

impl AchievementStore for RedbStore {
    fn definition(&self, id: &AchievementId) -> Result<Option<AchievementDefinition>, QuestError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(DEFINITIONS).map_err(io_err)?;
        match table.get(id.as_bytes().as_slice()).map_err(io_err)? {
            Some(data) => postcard::from_bytes(data.value())
                .map(Some)
                .map_err(|e| QuestError::DeserializationError(e.to_string())),
            None => Ok(None),
        }
    }

    fn put_definition(&mut self, definition: &AchievementDefinition) -> Result<bool, QuestError> {
        self.put_definition_with_progress(definition, &[])
    }

    fn achievement_ids(&self) -> Result<Vec<AchievementId>, QuestError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(REGISTRY).map_err(io_err)?;
        let mut ids = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (_, value) = entry.map_err(io_err)?;
            ids.push(AchievementId(token(value.value())?));
        }
        Ok(ids)
    }

    fn progress(
        &self,
        achievement: &AchievementId,
        participant: &ParticipantId,
    ) -> Result<Option<UserProgress>, QuestError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(PROGRESS).map_err(io_err)?;
        let key = (
            achievement.as_bytes().as_slice(),
            participant.as_bytes().as_slice(),
        );
        match table.get(key).map_err(io_err)? {
            Some(data) => postcard::from_bytes(data.value())
                .map(Some)
                .map_err(|e| QuestError::DeserializationError(e.to_string())),
            None => Ok(None),
        }
    }

    fn put_progress(
        &mut self,
        achievement: &AchievementId,
        participant: &ParticipantId,
        progress: &UserProgress,
    ) -> Result<(), QuestError> {
        let bytes = postcard::to_allocvec(progress)
            .map_err(|e| QuestError::SerializationError(e.to_string()))?;
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(PROGRESS).map_err(io_err)?;
            let key = (
                achievement.as_bytes().as_slice(),
                participant.as_bytes().as_slice(),
            );
            table.insert(key, bytes.as_slice()).map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn progress_entries(&self) -> Result<Vec<ProgressEntry>, QuestError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(PROGRESS).map_err(io_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key, value) = entry.map_err(io_err)?;
            let (achievement, participant) = key.value();
            let progress: UserProgress = postcard::from_bytes(value.value())
                .map_err(|e| QuestError::DeserializationError(e.to_string()))?;
            out.push((
                AchievementId(token(achievement)?),
                ParticipantId(token(participant)?),
                progress,
            ));
        }
        Ok(out)
    }

    fn achievement_progress(
        &self,
        achievement: &AchievementId,
    ) -> Result<Vec<(ParticipantId, UserProgress)>, QuestError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(PROGRESS).map_err(io_err)?;
        let low = [0u8; TOKEN_LEN];
        let high = [u8::MAX; TOKEN_LEN];
        let id = achievement.as_bytes().as_slice();
        let mut out = Vec::new();
        for entry in table
            .range((id, low.as_slice())..=(id, high.as_slice()))
            .map_err(io_err)?
        {
            let (key, value) = entry.map_err(io_err)?;
            let (_, participant) = key.value();
            let progress: UserProgress = postcard::from_bytes(value.value())
                .map_err(|e| QuestError::DeserializationError(e.to_string()))?;
            out.push((ParticipantId(token(participant)?), progress));
        }
        Ok(out)
    }

    /// Definition, registry slot and progress rewrites share one transaction.
    fn put_definition_with_progress(
        &mut self,
        definition: &AchievementDefinition,
        progress: &[(ParticipantId, UserProgress)],
    ) -> Result<bool, QuestError> {
        let bytes = postcard::to_allocvec(definition)
            .map_err(|e| QuestError::SerializationError(e.to_string()))?;
        let records = progress
            .iter()
            .map(|(participant, record)| {
                postcard::to_allocvec(record)
                    .map(|bytes| (participant, bytes))
                    .map_err(|e| QuestError::SerializationError(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let key = definition.id.as_bytes().as_slice();

        let write_txn = self.db.begin_write().map_err(io_err)?;
        let created = {
            let mut defs = write_txn.open_table(DEFINITIONS).map_err(io_err)?;
            let created = defs.insert(key, bytes.as_slice()).map_err(io_err)?.is_none();
            if created {
                let mut registry = write_txn.open_table(REGISTRY).map_err(io_err)?;
                let position = registry.len().map_err(io_err)?;
                registry.insert(position, key).map_err(io_err)?;
            }
            let mut table = write_txn.open_table(PROGRESS).map_err(io_err)?;
            for (participant, record) in &records {
                table
                    .insert((key, participant.as_bytes().as_slice()), record.as_slice())
                    .map_err(io_err)?;
            }
            created
        };
        write_txn.commit().map_err(io_err)?;
        Ok(created)
    }

    fn metadata(
        &self,
        achievement: &AchievementId,
        key: &str,
    ) -> Result<Option<String>, QuestError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(METADATA).map_err(io_err)?;
        Ok(table
            .get((achievement.as_bytes().as_slice(), key))
            .map_err(io_err)?
            .map(|v| v.value().to_string()))
    }

    fn put_metadata(
        &mut self,
        achievement: &AchievementId,
        key: &str,
        value: &str,
    ) -> Result<(), QuestError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(METADATA).map_err(io_err)?;
            table
                .insert((achievement.as_bytes().as_slice(), key), value)
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn metadata_entries(&self) -> Result<Vec<MetadataEntry>, QuestError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(METADATA).map_err(io_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key, value) = entry.map_err(io_err)?;
            let (achievement, attr) = key.value();
            out.push((
                AchievementId(token(achievement)?),
                attr.to_string(),
                value.value().to_string(),
            ));
        }
        Ok(out)
    }

    fn principals(&self) -> Result<Vec<Principal>, QuestError> {
        let read_txn = self.db.begin_read().map_err(io_err)?;
        let table = read_txn.open_table(PRINCIPALS).map_err(io_err)?;
        let mut out = Vec::new();
        for entry in table.iter().map_err(io_err)? {
            let (key, _) = entry.map_err(io_err)?;
            out.push(Principal(token(key.value())?));
        }
        Ok(out)
    }

    fn add_principal(&mut self, principal: &Principal) -> Result<(), QuestError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(PRINCIPALS).map_err(io_err)?;
            table
                .insert(principal.as_bytes().as_slice(), 1u8)
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }

    fn remove_principal(&mut self, principal: &Principal) -> Result<(), QuestError> {
        let write_txn = self.db.begin_write().map_err(io_err)?;
        {
            let mut table = write_txn.open_table(PRINCIPALS).map_err(io_err)?;
            table
                .remove(principal.as_bytes().as_slice())
                .map_err(io_err)?;
        }
        write_txn.commit().map_err(io_err)?;
        Ok(())
    }
}
