//! Duplicate scan REST endpoints
//!
//! Scans run in the background; clients poll /duplicates/progress (or use
//! the service's broadcast channel internally) and fetch the grouped
//! results once the scan completes.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::dedupe::cluster::{DuplicateGroup, GroupMember};
use crate::dedupe::scanner::ScanProgress;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupsResponse {
    pub groups: Vec<DuplicateGroup>,
    pub group_count: usize,
    pub scanned_tracks: usize,
    pub malformed_records: usize,
    pub reclaimable_bytes_total: u64,
}

#[derive(Debug, Deserialize)]
pub struct RemoveMemberRequest {
    /// Exact filepath of the group member to remove from the index
    pub filepath: String,
}

/// Start a background scan
async fn start_scan(State(state): State<AppState>) -> (StatusCode, Json<ActionResponse>) {
    match state.scan_service.clone().start_scan() {
        Ok(_) => (
            StatusCode::ACCEPTED,
            Json(ActionResponse {
                success: true,
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::CONFLICT,
            Json(ActionResponse {
                success: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}

/// Request cancellation of the running scan
async fn cancel_scan(State(state): State<AppState>) -> (StatusCode, Json<ActionResponse>) {
    if state.scan_service.cancel() {
        (
            StatusCode::ACCEPTED,
            Json(ActionResponse {
                success: true,
                error: None,
            }),
        )
    } else {
        (
            StatusCode::CONFLICT,
            Json(ActionResponse {
                success: false,
                error: Some("no scan in progress".to_string()),
            }),
        )
    }
}

/// Current progress snapshot, in any scan state
async fn scan_progress(State(state): State<AppState>) -> Json<ScanProgress> {
    Json(state.scan_service.progress())
}

/// Groups from the last completed scan
async fn list_groups(State(state): State<AppState>) -> Result<Json<GroupsResponse>, StatusCode> {
    let groups = state
        .scan_service
        .results()
        .map_err(|_| StatusCode::NOT_FOUND)?;
    let progress = state.scan_service.progress();

    Ok(Json(GroupsResponse {
        group_count: groups.len(),
        scanned_tracks: progress.total_count,
        malformed_records: progress.malformed_records,
        reclaimable_bytes_total: groups.iter().map(|g| g.reclaimable_bytes).sum(),
        groups: groups.as_ref().clone(),
    }))
}

/// Remove a non-anchor group member from the track index
async fn remove_member(
    State(state): State<AppState>,
    Json(body): Json<RemoveMemberRequest>,
) -> (StatusCode, Json<ActionResponse>) {
    let groups = match state.scan_service.results() {
        Ok(groups) => groups,
        Err(e) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ActionResponse {
                    success: false,
                    error: Some(e.to_string()),
                }),
            );
        }
    };

    let member = match locate_member(&groups, &body.filepath) {
        Some(member) => member,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ActionResponse {
                    success: false,
                    error: Some(format!(
                        "'{}' is not part of any duplicate group",
                        body.filepath
                    )),
                }),
            );
        }
    };

    if member.best_match {
        return (
            StatusCode::BAD_REQUEST,
            Json(ActionResponse {
                success: false,
                error: Some("cannot remove the best copy of a group".to_string()),
            }),
        );
    }

    match state.store.remove_track(&body.filepath) {
        Ok(true) => {
            tracing::info!(filepath = %body.filepath, "duplicate member removed from index");
            (
                StatusCode::OK,
                Json(ActionResponse {
                    success: true,
                    error: None,
                }),
            )
        }
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ActionResponse {
                success: false,
                error: Some("track is no longer in the index".to_string()),
            }),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ActionResponse {
                success: false,
                error: Some(e.to_string()),
            }),
        ),
    }
}

fn locate_member<'a>(groups: &'a [DuplicateGroup], filepath: &str) -> Option<&'a GroupMember> {
    groups
        .iter()
        .flat_map(|g| g.members.iter())
        .find(|m| m.track.filepath == filepath)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/duplicates/scan", post(start_scan))
        .route("/duplicates/scan/cancel", post(cancel_scan))
        .route("/duplicates/progress", get(scan_progress))
        .route("/duplicates/groups", get(list_groups))
        .route("/duplicates/member", delete(remove_member))
}
