//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Mutations take the tracker write lock for the whole call, so concurrent
//! updates to the same achievement and participant are serialized. Every
//! event a mutation records is logged once the call succeeds.

use super::{
    AppState,
    types::{
        AchievementListResponse, AchievementResponse, AckResponse, ApiError, ApiResult,
        CallerRequest, CategoryResponse, CompletedResponse, ConfigureRequest,
        DetailedProgressResponse, EventsQuery, EventsResponse, ExportResponse, HealthResponse,
        MetadataEntry, MetadataResponse, MetadataValueResponse, ObserveProgressRequest,
        ParticipantCategoriesResponse, PrincipalRequest, ProgressResponse, SetMetadataRequest,
        StatusResponse, UnlockRequest, UpdateProgressRequest, parse_achievement,
        parse_participant, parse_principal,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use questline_core::{
    Category, ErrorClass, EventRecord, Principal, QuestError, Tracker, TrackerEvent,
    export_snapshot, primitives::MAX_EVENT_PAGE, snapshot_checksum, snapshot_digest,
};

/// Default page size of `GET /events`.
const DEFAULT_EVENT_LIMIT: usize = 50;

// =============================================================================
// EVENT LOGGING
// =============================================================================

/// Log one recorded engine event with structured fields.
pub fn log_event(record: &EventRecord) {
    let name = record.event.name();
    let sequence = record.sequence;
    match &record.event {
        TrackerEvent::AchievementConfigured {
            achievement,
            created,
        } => tracing::info!(event = name, sequence, %achievement, created, "Achievement configured"),
        TrackerEvent::AchievementEnabled { achievement }
        | TrackerEvent::AchievementDisabled { achievement } => {
            tracing::info!(event = name, sequence, %achievement, "Achievement toggled")
        }
        TrackerEvent::PrincipalAuthorized { principal }
        | TrackerEvent::PrincipalRevoked { principal } => {
            tracing::info!(event = name, sequence, %principal, "Allow-list changed")
        }
        TrackerEvent::ProgressUpdated {
            achievement,
            participant,
            count,
        } => tracing::info!(event = name, sequence, %achievement, %participant, count, "Progress updated"),
        TrackerEvent::MilestoneUnlocked {
            achievement,
            participant,
            index,
            threshold,
        } => tracing::info!(
            event = name,
            sequence,
            %achievement,
            %participant,
            index,
            threshold,
            "Milestone unlocked"
        ),
        TrackerEvent::AchievementCompleted {
            achievement,
            participant,
        }
        | TrackerEvent::AchievementUnlocked {
            achievement,
            participant,
        } => tracing::info!(event = name, sequence, %achievement, %participant, "Achievement earned"),
        TrackerEvent::MetadataUpdated { achievement, key } => {
            tracing::info!(event = name, sequence, %achievement, key = key.as_str(), "Metadata updated")
        }
    }
}

/// Log every event recorded since `since`. Returns whether there were any.
pub fn log_events_since(tracker: &Tracker, since: u64) -> bool {
    let records = tracker.events_since(since, MAX_EVENT_PAGE);
    for record in &records {
        log_event(record);
    }
    !records.is_empty()
}

/// Convert an engine error, warning on authorization failures.
fn rejected(operation: &'static str, caller: &Principal, error: QuestError) -> ApiError {
    match error.class() {
        ErrorClass::Authorization => tracing::warn!(
            event = "authorization_failure",
            operation,
            %caller,
            "Caller not permitted"
        ),
        ErrorClass::Storage => tracing::error!(operation, code = error.code(), "{}", error),
        ErrorClass::Configuration | ErrorClass::BusinessRule => {
            tracing::debug!(operation, code = error.code(), "{}", error)
        }
    }
    ApiError::from(error)
}

// =============================================================================
// HEALTH / STATUS
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Summary counts of the tracker.
pub async fn status_handler(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    let tracker = state.tracker.read().await;
    Ok(Json(StatusResponse {
        summary: tracker.summary()?,
        principals: tracker.principals().len(),
        persistent: tracker.is_persistent(),
        next_event_sequence: tracker.next_event_sequence(),
    }))
}

// =============================================================================
// ACHIEVEMENT HANDLERS
// =============================================================================

/// Insert or replace an achievement definition.
pub async fn configure_handler(
    State(state): State<AppState>,
    Json(request): Json<ConfigureRequest>,
) -> ApiResult<AchievementResponse> {
    let caller = parse_principal(&request.caller)?;
    let config = request.achievement.to_config()?;

    let mut tracker = state.tracker.write().await;
    let since = tracker.next_event_sequence();
    let definition = tracker
        .configure(&caller, &config)
        .map_err(|e| rejected("configure", &caller, e))?;
    log_events_since(&tracker, since);
    Ok(Json(AchievementResponse::new(definition)))
}

/// List every achievement id.
pub async fn list_achievements_handler(
    State(state): State<AppState>,
) -> ApiResult<AchievementListResponse> {
    let tracker = state.tracker.read().await;
    let ids = tracker.list_achievement_ids()?;
    Ok(Json(AchievementListResponse {
        count: ids.len(),
        ids,
    }))
}

pub async fn get_achievement_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<AchievementResponse> {
    let id = parse_achievement(&id)?;
    let tracker = state.tracker.read().await;
    Ok(Json(AchievementResponse::new(tracker.get_achievement(&id)?)))
}

pub async fn enable_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CallerRequest>,
) -> ApiResult<AckResponse> {
    set_enabled(state, &id, &request.caller, true).await
}

pub async fn disable_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CallerRequest>,
) -> ApiResult<AckResponse> {
    set_enabled(state, &id, &request.caller, false).await
}

async fn set_enabled(
    state: AppState,
    id: &str,
    caller: &str,
    enabled: bool,
) -> ApiResult<AckResponse> {
    let id = parse_achievement(id)?;
    let caller = parse_principal(caller)?;

    let mut tracker = state.tracker.write().await;
    let since = tracker.next_event_sequence();
    let result = if enabled {
        tracker.enable(&caller, &id)
    } else {
        tracker.disable(&caller, &id)
    };
    result.map_err(|e| rejected("set_enabled", &caller, e))?;
    Ok(Json(AckResponse::changed(log_events_since(&tracker, since))))
}

/// Achievements of one category with its totals.
pub async fn category_handler(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<CategoryResponse> {
    let category: Category = category.parse()?;
    let tracker = state.tracker.read().await;
    Ok(Json(CategoryResponse {
        totals: tracker.category_totals(category)?,
        achievements: tracker.list_by_category(category)?,
    }))
}

// =============================================================================
// METADATA HANDLERS
// =============================================================================

pub async fn list_metadata_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MetadataResponse> {
    let id = parse_achievement(&id)?;
    let tracker = state.tracker.read().await;
    tracker.get_achievement(&id)?;
    let attributes = tracker
        .metadata_attributes(&id)?
        .into_iter()
        .map(|(key, value)| MetadataEntry { key, value })
        .collect();
    Ok(Json(MetadataResponse {
        achievement: id,
        attributes,
    }))
}

pub async fn get_metadata_handler(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> ApiResult<MetadataValueResponse> {
    let id = parse_achievement(&id)?;
    let tracker = state.tracker.read().await;
    tracker.get_achievement(&id)?;
    let value = tracker.get_metadata_attribute(&id, &key)?;
    Ok(Json(MetadataValueResponse {
        achievement: id,
        key,
        value,
    }))
}

pub async fn set_metadata_handler(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
    Json(request): Json<SetMetadataRequest>,
) -> ApiResult<AckResponse> {
    let id = parse_achievement(&id)?;
    let caller = parse_principal(&request.caller)?;

    let mut tracker = state.tracker.write().await;
    let since = tracker.next_event_sequence();
    tracker
        .set_metadata_attribute(&caller, &id, &key, &request.value)
        .map_err(|e| rejected("set_metadata", &caller, e))?;
    Ok(Json(AckResponse::changed(log_events_since(&tracker, since))))
}

// =============================================================================
// PRINCIPAL HANDLERS
// =============================================================================

pub async fn authorize_handler(
    State(state): State<AppState>,
    Json(request): Json<PrincipalRequest>,
) -> ApiResult<AckResponse> {
    let caller = parse_principal(&request.caller)?;
    let principal = parse_principal(&request.principal)?;

    let mut tracker = state.tracker.write().await;
    let since = tracker.next_event_sequence();
    let added = tracker
        .authorize(&caller, principal)
        .map_err(|e| rejected("authorize", &caller, e))?;
    log_events_since(&tracker, since);
    Ok(Json(AckResponse::changed(added)))
}

pub async fn revoke_handler(
    State(state): State<AppState>,
    Json(request): Json<PrincipalRequest>,
) -> ApiResult<AckResponse> {
    let caller = parse_principal(&request.caller)?;
    let principal = parse_principal(&request.principal)?;

    let mut tracker = state.tracker.write().await;
    let since = tracker.next_event_sequence();
    let removed = tracker
        .revoke(&caller, &principal)
        .map_err(|e| rejected("revoke", &caller, e))?;
    log_events_since(&tracker, since);
    Ok(Json(AckResponse::changed(removed)))
}

// =============================================================================
// PROGRESS HANDLERS
// =============================================================================

/// Add a delta to a progression achievement.
pub async fn update_progress_handler(
    State(state): State<AppState>,
    Json(request): Json<UpdateProgressRequest>,
) -> ApiResult<ProgressResponse> {
    let caller = parse_principal(&request.caller)?;
    let id = parse_achievement(&request.achievement)?;
    let participant = parse_participant(&request.participant)?;

    let mut tracker = state.tracker.write().await;
    let since = tracker.next_event_sequence();
    let outcome = tracker
        .update_progress(&caller, &id, &participant, request.delta)
        .map_err(|e| rejected("update_progress", &caller, e))?;
    log_events_since(&tracker, since);
    Ok(Json(outcome.into()))
}

/// Report an absolute observed value.
pub async fn observe_progress_handler(
    State(state): State<AppState>,
    Json(request): Json<ObserveProgressRequest>,
) -> ApiResult<ProgressResponse> {
    let caller = parse_principal(&request.caller)?;
    let id = parse_achievement(&request.achievement)?;
    let participant = parse_participant(&request.participant)?;

    let mut tracker = state.tracker.write().await;
    let since = tracker.next_event_sequence();
    let outcome = tracker
        .update_deduped_progress(&caller, &id, &participant, request.observed)
        .map_err(|e| rejected("update_deduped_progress", &caller, e))?;
    log_events_since(&tracker, since);
    Ok(Json(outcome.into()))
}

/// Unlock a one-time achievement.
pub async fn unlock_handler(
    State(state): State<AppState>,
    Json(request): Json<UnlockRequest>,
) -> ApiResult<ProgressResponse> {
    let caller = parse_principal(&request.caller)?;
    let id = parse_achievement(&request.achievement)?;
    let participant = parse_participant(&request.participant)?;

    let mut tracker = state.tracker.write().await;
    let since = tracker.next_event_sequence();
    let outcome = tracker
        .unlock_achievement(&caller, &id, &participant)
        .map_err(|e| rejected("unlock_achievement", &caller, e))?;
    log_events_since(&tracker, since);
    Ok(Json(outcome.into()))
}

/// Detailed progress plus unmet prerequisites.
pub async fn get_progress_handler(
    State(state): State<AppState>,
    Path((id, participant)): Path<(String, String)>,
) -> ApiResult<DetailedProgressResponse> {
    let id = parse_achievement(&id)?;
    let participant = parse_participant(&participant)?;
    let tracker = state.tracker.read().await;
    Ok(Json(DetailedProgressResponse {
        progress: tracker.get_detailed_progress(&id, &participant)?,
        unmet_requirements: tracker.unmet_requirements(&id, &participant)?,
    }))
}

// =============================================================================
// PARTICIPANT ROLLUPS
// =============================================================================

pub async fn participant_categories_handler(
    State(state): State<AppState>,
    Path(participant): Path<String>,
) -> ApiResult<ParticipantCategoriesResponse> {
    let participant = parse_participant(&participant)?;
    let tracker = state.tracker.read().await;
    Ok(Json(ParticipantCategoriesResponse {
        participant,
        categories: tracker.all_categories_progress(&participant)?,
    }))
}

pub async fn participant_category_handler(
    State(state): State<AppState>,
    Path((participant, category)): Path<(String, String)>,
) -> ApiResult<ParticipantCategoriesResponse> {
    let participant = parse_participant(&participant)?;
    let category: Category = category.parse()?;
    let tracker = state.tracker.read().await;
    Ok(Json(ParticipantCategoriesResponse {
        participant,
        categories: vec![tracker.category_progress(category, &participant)?],
    }))
}

pub async fn completed_handler(
    State(state): State<AppState>,
    Path(participant): Path<String>,
) -> ApiResult<CompletedResponse> {
    let participant = parse_participant(&participant)?;
    let tracker = state.tracker.read().await;
    let achievements: Vec<_> = tracker
        .completed_achievements(&participant)?
        .into_iter()
        .map(|d| d.id)
        .collect();
    Ok(Json(CompletedResponse {
        participant,
        count: achievements.len(),
        achievements,
    }))
}

// =============================================================================
// EVENTS / EXPORT
// =============================================================================

/// Recent events, or a page starting at `since`.
pub async fn events_handler(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<EventsResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    let tracker = state.tracker.read().await;
    let events = match query.since {
        Some(since) => tracker.events_since(since, limit),
        None => tracker.recent_events(limit),
    };
    Ok(Json(EventsResponse {
        events,
        next_sequence: tracker.next_event_sequence(),
    }))
}

/// Export the tracker as a base64 snapshot.
pub async fn export_handler(State(state): State<AppState>) -> ApiResult<ExportResponse> {
    let tracker = state.tracker.read().await;
    let data = export_snapshot(&tracker)?;
    let checksum = snapshot_checksum(&tracker)?;
    let digest = snapshot_digest(&tracker)?;
    Ok(Json(ExportResponse::success(data, checksum, digest)))
}
