//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.
//!
//! Identifiers (achievements, participants, principals) are accepted as
//! either a human-readable key or a 64-character hex token, and always
//! rendered as hex.

use crate::catalog::AchievementSpec;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use questline_core::{
    AchievementDefinition, AchievementId, CategoryProgressView, CategoryTotals,
    DetailedProgressView, ErrorClass, EventRecord, ParticipantId, Principal, ProgressOutcome,
    ProgressView, QuestError, Requirement, Summary, TrackerEvent,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// ERROR RESPONSE
// =============================================================================

/// Error body returned with every non-2xx response from a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub success: bool,
    /// HTTP status code.
    pub status: u16,
    /// Stable machine-readable code (e.g. `requirement_not_met`).
    pub code: String,
    pub error: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: status.as_u16(),
            code: code.into(),
            error: error.into(),
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", error)
    }
}

/// Status code for an engine error.
///
/// Unknown achievements are 404 regardless of class.
pub fn status_for(error: &QuestError) -> StatusCode {
    if matches!(error, QuestError::AchievementNotFound(_)) {
        return StatusCode::NOT_FOUND;
    }
    match error.class() {
        ErrorClass::Configuration => StatusCode::BAD_REQUEST,
        ErrorClass::Authorization => StatusCode::FORBIDDEN,
        ErrorClass::BusinessRule => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorClass::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<QuestError> for ApiError {
    fn from(error: QuestError) -> Self {
        Self::new(status_for(&error), error.code(), error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<Json<T>, ApiError>;

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// STATUS RESPONSE
// =============================================================================

/// Tracker status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub summary: Summary,
    pub principals: usize,
    pub persistent: bool,
    pub next_event_sequence: u64,
}

// =============================================================================
// ADMINISTRATION
// =============================================================================

/// Body carrying only the calling principal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerRequest {
    pub caller: String,
}

/// Configure (insert or replace) an achievement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureRequest {
    pub caller: String,
    #[serde(flatten)]
    pub achievement: AchievementSpec,
}

/// One achievement definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementResponse {
    pub success: bool,
    pub achievement: AchievementDefinition,
}

impl AchievementResponse {
    pub fn new(achievement: AchievementDefinition) -> Self {
        Self {
            success: true,
            achievement,
        }
    }
}

/// Every configured achievement id, in first-configuration order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementListResponse {
    pub count: usize,
    pub ids: Vec<AchievementId>,
}

/// Achievements of one category together with its totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub totals: CategoryTotals,
    pub achievements: Vec<AchievementDefinition>,
}

/// Plain acknowledgement of a mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    /// Whether the call changed state (false for repeats).
    pub changed: bool,
}

impl AckResponse {
    pub fn changed(changed: bool) -> Self {
        Self {
            success: true,
            changed,
        }
    }
}

/// Add or remove a principal from the allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalRequest {
    pub caller: String,
    pub principal: String,
}

// =============================================================================
// METADATA
// =============================================================================

/// Set one metadata attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetMetadataRequest {
    pub caller: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
}

/// All metadata of one achievement, sorted by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataResponse {
    pub achievement: AchievementId,
    pub attributes: Vec<MetadataEntry>,
}

/// One metadata attribute; `value` is absent when the key is unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataValueResponse {
    pub achievement: AchievementId,
    pub key: String,
    pub value: Option<String>,
}

// =============================================================================
// PROGRESS
// =============================================================================

/// Add `delta` to a progression achievement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateProgressRequest {
    pub caller: String,
    pub achievement: String,
    pub participant: String,
    pub delta: u64,
}

/// Report an absolute observed value; counted once per new high.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserveProgressRequest {
    pub caller: String,
    pub achievement: String,
    pub participant: String,
    pub observed: u64,
}

/// Unlock a one-time achievement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnlockRequest {
    pub caller: String,
    pub achievement: String,
    pub participant: String,
}

/// Result of a progress mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub success: bool,
    pub progress: ProgressView,
    /// Milestone indices newly unlocked by this call.
    pub unlocked_milestones: Vec<usize>,
    pub events: Vec<TrackerEvent>,
}

impl From<ProgressOutcome> for ProgressResponse {
    fn from(outcome: ProgressOutcome) -> Self {
        Self {
            success: true,
            unlocked_milestones: outcome.unlocked_milestones(),
            progress: outcome.view,
            events: outcome.events,
        }
    }
}

/// Detailed progress of one participant on one achievement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailedProgressResponse {
    #[serde(flatten)]
    pub progress: DetailedProgressView,
    /// Prerequisites the participant has not yet satisfied.
    pub unmet_requirements: Vec<Requirement>,
}

// =============================================================================
// PARTICIPANT ROLLUPS
// =============================================================================

/// Progress across every category for one participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantCategoriesResponse {
    pub participant: ParticipantId,
    pub categories: Vec<CategoryProgressView>,
}

/// Achievements the participant has fully completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedResponse {
    pub participant: ParticipantId,
    pub count: usize,
    pub achievements: Vec<AchievementId>,
}

// =============================================================================
// EVENTS
// =============================================================================

/// Query parameters of `GET /events`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventsQuery {
    /// Return events with sequence >= `since`; newest events when absent.
    pub since: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsResponse {
    pub events: Vec<EventRecord>,
    pub next_sequence: u64,
}

// =============================================================================
// EXPORT RESPONSE
// =============================================================================

/// Export response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResponse {
    pub success: bool,
    pub data: Option<String>, // Base64 encoded
    pub checksum: Option<u64>,
    pub digest: Option<String>,
    pub error: Option<String>,
}

impl ExportResponse {
    pub fn success(data: Vec<u8>, checksum: u64, digest: String) -> Self {
        Self {
            success: true,
            data: Some(base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                &data,
            )),
            checksum: Some(checksum),
            digest: Some(digest),
            error: None,
        }
    }
}

// =============================================================================
// IDENTIFIER PARSING
// =============================================================================

/// Resolve a caller or principal field.
pub fn parse_principal(input: &str) -> Result<Principal, ApiError> {
    non_blank(input, "principal").map(Principal::resolve)
}

pub fn parse_participant(input: &str) -> Result<ParticipantId, ApiError> {
    non_blank(input, "participant").map(ParticipantId::resolve)
}

pub fn parse_achievement(input: &str) -> Result<AchievementId, ApiError> {
    crate::catalog::resolve_id(input).map_err(ApiError::from)
}

fn non_blank<'a>(input: &'a str, field: &str) -> Result<&'a str, ApiError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(format!("Empty {} identifier", field)));
    }
    Ok(trimmed)
}
