//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Every command opens the database, runs one tracker operation, and (for
//! the memory backend) writes the snapshot file back.

use super::{Backend, Context};
use crate::api;
use crate::catalog::{Catalog, resolve_id};
use questline_core::{
    AchievementId, Category, ParticipantId, Principal, ProgressOutcome, QuestError, RedbStore,
    StorageBackend, Tracker, export_snapshot, import_snapshot, snapshot_checksum,
    snapshot_digest,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum snapshot file size for import and memory-backend loads (256 MB).
const MAX_SNAPSHOT_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), QuestError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| QuestError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(QuestError::DeserializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, QuestError> {
    let canonical = path.canonicalize().map_err(|e| {
        QuestError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(QuestError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path and require a directory.
fn validate_output_path(path: &Path) -> Result<PathBuf, QuestError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        QuestError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(QuestError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| QuestError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

/// Pretty-print `value` as JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<(), QuestError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| QuestError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(ctx: &Context, host: &str, port: u16) -> Result<(), QuestError> {
    if ctx.backend == Backend::Memory {
        tracing::warn!("Memory backend: changes made through the server are not saved on exit");
    }
    let tracker = load_tracker(ctx)?;

    println!("Questline Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Backend:  {}", ctx.backend);
    println!("  Database: {:?}", ctx.database);
    println!("  Admin:    {}", tracker.admin());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    api::run_server(&addr, tracker).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show tracker summary.
pub fn cmd_status(ctx: &Context) -> Result<(), QuestError> {
    let tracker = load_tracker(ctx)?;
    let summary = tracker.summary()?;

    if ctx.json_mode {
        let output = serde_json::json!({
            "database": ctx.database.to_string_lossy(),
            "backend": ctx.backend.to_string(),
            "admin": tracker.admin(),
            "principals": tracker.principals().len(),
            "summary": summary,
        });
        return print_json(&output);
    }

    println!("Questline Status");
    println!("================");
    println!("Database: {:?}", ctx.database);
    println!("Backend:  {}", ctx.backend);
    println!();
    println!("Achievements:     {}", summary.achievements);
    println!("  One-time:       {}", summary.one_time);
    println!("  Progression:    {}", summary.progression);
    println!("  Milestones:     {}", summary.milestones);
    println!("  Disabled:       {}", summary.disabled);
    println!("Participants:     {}", summary.participants);
    println!("Progress records: {}", summary.progress_records);
    println!("Principals:       {}", tracker.principals().len());

    Ok(())
}

// =============================================================================
// INIT / SEED
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), QuestError> {
    if ctx.database.exists() {
        if !force {
            return Err(QuestError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&ctx.database)
            .map_err(|e| QuestError::IoError(format!("Remove database: {}", e)))?;
    }

    let tracker = match ctx.backend {
        Backend::Redb => Tracker::open_redb(&ctx.database, ctx.admin)?,
        Backend::Memory => Tracker::in_memory(ctx.admin),
    };
    save_tracker(&tracker, &ctx.database)?;
    println!(
        "Initialized new {} database at {:?}",
        ctx.backend, ctx.database
    );
    Ok(())
}

/// Configure every achievement of a catalog file.
pub fn cmd_seed(ctx: &Context, file: &Path) -> Result<(), QuestError> {
    let path = validate_file_path(file)?;
    let catalog = Catalog::load(&path)?;

    let mut tracker = load_tracker(ctx)?;
    let since = tracker.next_event_sequence();
    let result = catalog.apply(&mut tracker, &ctx.admin);
    api::log_events_since(&tracker, since);
    // Entries configured before a failure are kept.
    save_tracker(&tracker, &ctx.database)?;
    let definitions = result?;

    if ctx.json_mode {
        let ids: Vec<AchievementId> = definitions.iter().map(|d| d.id).collect();
        return print_json(&serde_json::json!({ "configured": ids }));
    }
    println!("Configured {} achievements:", definitions.len());
    for definition in &definitions {
        println!(
            "  {} {} ({}, {})",
            definition.id,
            definition.name,
            definition.category,
            definition.kind.tag()
        );
    }
    Ok(())
}

// =============================================================================
// ADMINISTRATION
// =============================================================================

/// Add (`grant`) or remove a principal from the allow-list.
pub fn cmd_authorize(ctx: &Context, principal: &str, grant: bool) -> Result<(), QuestError> {
    let principal = Principal::resolve(principal);
    let mut tracker = load_tracker(ctx)?;
    let since = tracker.next_event_sequence();
    let changed = if grant {
        tracker.authorize(&ctx.admin, principal)?
    } else {
        tracker.revoke(&ctx.admin, &principal)?
    };
    api::log_events_since(&tracker, since);
    save_tracker(&tracker, &ctx.database)?;

    if ctx.json_mode {
        return print_json(&serde_json::json!({
            "principal": principal,
            "authorized": tracker.is_authorized(&principal),
            "changed": changed,
        }));
    }
    match (grant, changed) {
        (true, true) => println!("Authorized {}", principal),
        (true, false) => println!("{} was already authorized", principal),
        (false, true) => println!("Revoked {}", principal),
        (false, false) => println!("{} was not authorized", principal),
    }
    Ok(())
}

/// Enable or disable one achievement.
pub fn cmd_set_enabled(ctx: &Context, achievement: &str, enabled: bool) -> Result<(), QuestError> {
    let id = resolve_id(achievement)?;
    let mut tracker = load_tracker(ctx)?;
    let since = tracker.next_event_sequence();
    if enabled {
        tracker.enable(&ctx.admin, &id)?;
    } else {
        tracker.disable(&ctx.admin, &id)?;
    }
    let changed = api::log_events_since(&tracker, since);
    save_tracker(&tracker, &ctx.database)?;

    if ctx.json_mode {
        return print_json(&serde_json::json!({
            "achievement": id,
            "enabled": enabled,
            "changed": changed,
        }));
    }
    println!(
        "{} {}{}",
        id,
        if enabled { "enabled" } else { "disabled" },
        if changed { "" } else { " (unchanged)" }
    );
    Ok(())
}

/// List, read, or set metadata attributes.
pub fn cmd_metadata(
    ctx: &Context,
    achievement: &str,
    key: Option<&str>,
    value: Option<&str>,
) -> Result<(), QuestError> {
    let id = resolve_id(achievement)?;

    match (key, value) {
        (Some(key), Some(value)) => {
            let mut tracker = load_tracker(ctx)?;
            let since = tracker.next_event_sequence();
            tracker.set_metadata_attribute(&ctx.admin, &id, key, value)?;
            api::log_events_since(&tracker, since);
            save_tracker(&tracker, &ctx.database)?;
            println!("Set {} on {}", key, id);
            Ok(())
        }
        (Some(key), None) => {
            let tracker = load_tracker(ctx)?;
            tracker.get_achievement(&id)?;
            let value = tracker.get_metadata_attribute(&id, key)?;
            if ctx.json_mode {
                return print_json(&serde_json::json!({ "key": key, "value": value }));
            }
            match value {
                Some(v) => println!("{}", v),
                None => println!("{} is not set", key),
            }
            Ok(())
        }
        (None, _) => {
            let tracker = load_tracker(ctx)?;
            tracker.get_achievement(&id)?;
            let attributes = tracker.metadata_attributes(&id)?;
            if ctx.json_mode {
                let map: serde_json::Map<String, serde_json::Value> = attributes
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::String(v)))
                    .collect();
                return print_json(&map);
            }
            for (k, v) in attributes {
                println!("{} = {}", k, v);
            }
            Ok(())
        }
    }
}

// =============================================================================
// PROGRESS COMMANDS
// =============================================================================

/// Which progress mutation to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    Add(u64),
    Observe(u64),
    Unlock,
}

/// Run one progress mutation as `caller`.
pub fn cmd_progress(
    ctx: &Context,
    caller: &str,
    achievement: &str,
    participant: &str,
    action: ProgressAction,
) -> Result<(), QuestError> {
    let caller = Principal::resolve(caller);
    let id = resolve_id(achievement)?;
    let participant = ParticipantId::resolve(participant);

    let mut tracker = load_tracker(ctx)?;
    let since = tracker.next_event_sequence();
    let outcome = match action {
        ProgressAction::Add(delta) => tracker.update_progress(&caller, &id, &participant, delta),
        ProgressAction::Observe(value) => {
            tracker.update_deduped_progress(&caller, &id, &participant, value)
        }
        ProgressAction::Unlock => tracker.unlock_achievement(&caller, &id, &participant),
    }?;
    api::log_events_since(&tracker, since);
    save_tracker(&tracker, &ctx.database)?;

    print_outcome(ctx, &outcome)
}

fn print_outcome(ctx: &Context, outcome: &ProgressOutcome) -> Result<(), QuestError> {
    if ctx.json_mode {
        return print_json(outcome);
    }
    if outcome.is_noop() {
        println!("No change (count {})", outcome.view.count);
        return Ok(());
    }
    println!(
        "Count: {}  Achieved: {}",
        outcome.view.count, outcome.view.achieved
    );
    for event in outcome.events.iter().filter(|e| e.is_unlock()) {
        println!("  {}", event.name());
    }
    Ok(())
}

// =============================================================================
// READ COMMANDS
// =============================================================================

/// Show a definition, or a participant's progress on it.
pub fn cmd_show(
    ctx: &Context,
    achievement: &str,
    participant: Option<&str>,
) -> Result<(), QuestError> {
    let id = resolve_id(achievement)?;
    let tracker = load_tracker(ctx)?;
    let definition = tracker.get_achievement(&id)?;

    let Some(participant) = participant.map(ParticipantId::resolve) else {
        if ctx.json_mode {
            return print_json(&definition);
        }
        println!("{} ({})", definition.name, definition.id);
        println!("Category: {}", definition.category);
        println!("Kind:     {}", definition.kind.tag());
        println!("Enabled:  {}", definition.enabled);
        for (i, m) in definition.milestones().iter().enumerate() {
            println!("  [{}] {} at {}", i, m.name, m.threshold);
        }
        for r in &definition.requirements {
            println!("  requires {} ({:?})", r.prerequisite, r.target);
        }
        return Ok(());
    };

    let view = tracker.get_detailed_progress(&id, &participant)?;
    let unmet = tracker.unmet_requirements(&id, &participant)?;
    if ctx.json_mode {
        return print_json(&serde_json::json!({
            "progress": view,
            "unmet_requirements": unmet,
        }));
    }
    println!("{} / {}", definition.name, participant);
    println!("Count:    {}", view.count);
    println!("Achieved: {}", view.achieved);
    if let Some(highest) = view.highest_observed {
        println!("Highest observed: {}", highest);
    }
    for (m, unlocked) in definition.milestones().iter().zip(&view.milestones) {
        let mark = if *unlocked { "x" } else { " " };
        println!("  [{}] {} ({})", mark, m.name, m.threshold);
    }
    if !unmet.is_empty() {
        println!("Unmet requirements: {}", unmet.len());
    }
    Ok(())
}

/// Category totals, or one participant's rollups.
pub fn cmd_categories(
    ctx: &Context,
    participant: Option<&str>,
    category: Option<&str>,
) -> Result<(), QuestError> {
    let tracker = load_tracker(ctx)?;
    let categories: Vec<Category> = match category {
        Some(c) => vec![c.parse()?],
        None => Category::ALL.to_vec(),
    };

    match participant.map(ParticipantId::resolve) {
        Some(participant) => {
            let views = categories
                .into_iter()
                .map(|c| tracker.category_progress(c, &participant))
                .collect::<Result<Vec<_>, _>>()?;
            if ctx.json_mode {
                return print_json(&views);
            }
            for v in views {
                println!(
                    "{:<11} {}/{} goals, {} completed, {} milestones",
                    v.category.name(),
                    v.completed_goals,
                    v.total_goals,
                    v.completed_achievements,
                    v.unlocked_milestones
                );
            }
        }
        None => {
            let totals = categories
                .into_iter()
                .map(|c| tracker.category_totals(c))
                .collect::<Result<Vec<_>, _>>()?;
            if ctx.json_mode {
                return print_json(&totals);
            }
            for t in totals {
                println!(
                    "{:<11} {} achievements, {} milestones, {} one-time, {} goals",
                    t.category.name(),
                    t.achievement_count,
                    t.milestone_count,
                    t.one_time_count,
                    t.total_goals()
                );
            }
        }
    }
    Ok(())
}

/// Achievements a participant has completed.
pub fn cmd_completed(ctx: &Context, participant: &str) -> Result<(), QuestError> {
    let participant = ParticipantId::resolve(participant);
    let tracker = load_tracker(ctx)?;
    let completed = tracker.completed_achievements(&participant)?;

    if ctx.json_mode {
        let ids: Vec<AchievementId> = completed.iter().map(|d| d.id).collect();
        return print_json(&ids);
    }
    println!("{} completed achievements", completed.len());
    for definition in completed {
        println!("  {} {}", definition.id, definition.name);
    }
    Ok(())
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Export a snapshot file.
pub fn cmd_export(ctx: &Context, output: &Path) -> Result<(), QuestError> {
    let output = validate_output_path(output)?;
    let tracker = load_tracker(ctx)?;
    let data = export_snapshot(&tracker)?;
    std::fs::write(&output, &data)
        .map_err(|e| QuestError::IoError(format!("Write file: {}", e)))?;

    let checksum = snapshot_checksum(&tracker)?;
    let digest = snapshot_digest(&tracker)?;
    if ctx.json_mode {
        return print_json(&serde_json::json!({
            "output": output.to_string_lossy(),
            "bytes": data.len(),
            "checksum": checksum,
            "digest": digest,
        }));
    }
    println!("Exported {} bytes to {:?}", data.len(), output);
    println!("Checksum: {}", checksum);
    println!("BLAKE3:   {}", digest);
    Ok(())
}

/// Merge a snapshot file into the database.
pub fn cmd_import(ctx: &Context, input: &Path) -> Result<(), QuestError> {
    let path = validate_file_path(input)?;
    validate_file_size(&path, MAX_SNAPSHOT_FILE_SIZE)?;
    let data =
        std::fs::read(&path).map_err(|e| QuestError::IoError(format!("Read file: {}", e)))?;
    let snapshot = import_snapshot(&data)?;
    let definitions = snapshot.definitions.len();
    let progress = snapshot.progress.len();

    let backend = match ctx.backend {
        Backend::Redb => StorageBackend::Persistent(RedbStore::open(&ctx.database)?),
        Backend::Memory => load_tracker(ctx)?.into_backend(),
    };
    let tracker = snapshot.restore(backend)?;
    save_tracker(&tracker, &ctx.database)?;

    println!(
        "Imported {} definitions and {} progress records",
        definitions, progress
    );
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the database with the configured backend.
///
/// A memory-backend database is a snapshot file; a missing file starts an
/// empty tracker administered by `--admin`.
pub fn load_tracker(ctx: &Context) -> Result<Tracker, QuestError> {
    match ctx.backend {
        Backend::Redb => Tracker::open_redb(&ctx.database, ctx.admin),
        Backend::Memory => {
            if !ctx.database.exists() {
                return Ok(Tracker::in_memory(ctx.admin));
            }
            validate_file_size(&ctx.database, MAX_SNAPSHOT_FILE_SIZE)?;
            let data = std::fs::read(&ctx.database)
                .map_err(|e| QuestError::IoError(format!("Read db: {}", e)))?;
            let snapshot = import_snapshot(&data)?;
            if snapshot.admin != ctx.admin {
                tracing::warn!(
                    admin = %snapshot.admin,
                    "Database has a different administrator than --admin; using the database's"
                );
            }
            snapshot.restore(StorageBackend::default())
        }
    }
}

/// Persist a memory-backend tracker as a snapshot file.
pub fn save_tracker(tracker: &Tracker, db_path: &Path) -> Result<(), QuestError> {
    if tracker.is_persistent() {
        // redb commits on every mutation
        return Ok(());
    }
    let data = export_snapshot(tracker)?;
    std::fs::write(db_path, &data).map_err(|e| QuestError::IoError(format!("Write db: {}", e)))
}
