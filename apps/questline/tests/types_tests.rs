//! Unit tests for API types serialization/deserialization.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use questline::api::{
    ApiError, ConfigureRequest, EventsQuery, ExportResponse, HealthResponse, ProgressResponse,
    UpdateProgressRequest, status_for,
};
use questline_core::{
    AchievementId, KindTag, ParticipantId, Principal, ProgressOutcome, ProgressView,
    QuestError, TrackerEvent,
};

// =============================================================================
// HEALTH RESPONSE TESTS
// =============================================================================

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_health_response_deserialization() {
    let json = r#"{"status":"healthy","version":"1.0.0"}"#;
    let health: HealthResponse = serde_json::from_str(json).unwrap();

    assert_eq!(health.status, "healthy");
    assert_eq!(health.version, "1.0.0");
}

// =============================================================================
// ERROR MAPPING TESTS
// =============================================================================

#[test]
fn test_status_for_error_classes() {
    let id = AchievementId::from_key("x");
    assert_eq!(
        status_for(&QuestError::InvalidCategory("9".into())),
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        status_for(&QuestError::UnauthorizedCaller(Principal::from_key("caller"))),
        StatusCode::FORBIDDEN
    );
    assert_eq!(
        status_for(&QuestError::RequirementNotMet(id)),
        StatusCode::UNPROCESSABLE_ENTITY
    );
    assert_eq!(
        status_for(&QuestError::IoError("disk".into())),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[test]
fn test_missing_achievement_is_not_found() {
    let error = QuestError::AchievementNotFound(AchievementId::from_key("x"));
    assert_eq!(status_for(&error), StatusCode::NOT_FOUND);
}

#[test]
fn test_api_error_from_quest_error() {
    let error = ApiError::from(QuestError::InvalidDelta);

    assert!(!error.success);
    assert_eq!(error.status, 422);
    assert_eq!(error.code, "invalid_delta");
    assert!(!error.error.is_empty());

    let json = serde_json::to_string(&error).unwrap();
    assert!(json.contains("\"code\":\"invalid_delta\""));
    assert!(json.contains("\"success\":false"));
}

#[test]
fn test_bad_request_error() {
    let error = ApiError::bad_request("Empty participant identifier");
    assert_eq!(error.status, 400);
    assert_eq!(error.code, "bad_request");
}

// =============================================================================
// REQUEST TESTS
// =============================================================================

#[test]
fn test_configure_request_flattens_achievement() {
    let json = r#"{
        "caller": "admin",
        "key": "first_feed",
        "name": "First Meal",
        "category": "action",
        "kind": "one_time"
    }"#;
    let request: ConfigureRequest = serde_json::from_str(json).unwrap();

    assert_eq!(request.caller, "admin");
    assert_eq!(request.achievement.key, "first_feed");
    assert_eq!(request.achievement.kind, KindTag::OneTime);
    assert!(request.achievement.enabled);
    assert!(request.achievement.milestones.is_empty());
    assert!(request.achievement.requires.is_empty());
}

#[test]
fn test_configure_request_with_milestones() {
    let json = r#"{
        "caller": "admin",
        "key": "feed_count",
        "name": "Devoted Keeper",
        "category": "3",
        "kind": "progression",
        "enabled": false,
        "milestones": [{"name": "Snack Giver", "threshold": 10}]
    }"#;
    let request: ConfigureRequest = serde_json::from_str(json).unwrap();

    assert!(!request.achievement.enabled);
    assert_eq!(request.achievement.milestones.len(), 1);
    assert_eq!(request.achievement.milestones[0].threshold, 10);
}

#[test]
fn test_update_request_requires_delta() {
    let json = r#"{"caller":"game","achievement":"feed_count","participant":"alice"}"#;
    let result: Result<UpdateProgressRequest, _> = serde_json::from_str(json);
    assert!(result.is_err());
}

#[test]
fn test_events_query_defaults() {
    let query: EventsQuery = serde_json::from_str("{}").unwrap();
    assert!(query.since.is_none());
    assert!(query.limit.is_none());
}

// =============================================================================
// RESPONSE TESTS
// =============================================================================

#[test]
fn test_progress_response_from_outcome() {
    let achievement = AchievementId::from_key("feed_count");
    let participant = ParticipantId::from_key("alice");
    let outcome = ProgressOutcome {
        view: ProgressView {
            count: 12,
            achieved: false,
            start_time: 100,
            last_update: 200,
        },
        events: vec![
            TrackerEvent::ProgressUpdated {
                achievement,
                participant,
                count: 12,
            },
            TrackerEvent::MilestoneUnlocked {
                achievement,
                participant,
                index: 0,
                threshold: 10,
            },
        ],
    };

    let response = ProgressResponse::from(outcome);

    assert!(response.success);
    assert_eq!(response.unlocked_milestones, vec![0]);
    assert_eq!(response.progress.count, 12);

    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"event\":\"milestone_unlocked\""));
    assert!(json.contains(&achievement.to_hex()));
}

#[test]
fn test_export_response_encodes_base64() {
    let response = ExportResponse::success(vec![1, 2, 3], 42, "ab".repeat(32));

    assert!(response.success);
    assert_eq!(response.data.as_deref(), Some("AQID"));
    assert_eq!(response.checksum, Some(42));
    assert!(response.error.is_none());
}
