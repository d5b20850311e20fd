use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::detection_store::{DetectionFilter, DetectionStore};
use crate::grade_tracker::GradeTracker;
use crate::models::{Detection, Grade};
use crate::scanner::Scanner;

#[derive(Clone)]
pub struct ApiState {
    pub detection_store: Arc<DetectionStore>,
    pub grade_tracker: Arc<GradeTracker>,
    pub scanner: Arc<Scanner>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/status", get(get_status))
        .route("/api/v1/detections", get(list_detections))
        .route("/api/v1/upgrades/recent", get(list_recent_upgrades))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    scanning: bool,
    detections: crate::detection_store::DetectionSummary,
}

async fn get_status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, StatusCode> {
    let detections = state.detection_store.summary().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(StatusResponse { scanning: state.scanner.is_running(), detections }))
}

#[derive(Debug, Deserialize)]
struct DetectionsQuery {
    symbol: Option<String>,
    min_grade: Option<String>,
    #[serde(default)]
    active_only: bool,
}

#[derive(Debug, Serialize)]
struct DetectionsResponse {
    detections: Vec<Detection>,
    count: usize,
}

async fn list_detections(
    State(state): State<ApiState>,
    Query(params): Query<DetectionsQuery>,
) -> Result<Json<DetectionsResponse>, StatusCode> {
    let min_grade = match params.min_grade {
        Some(raw) => Some(raw.parse::<Grade>().map_err(|_| StatusCode::BAD_REQUEST)?),
        None => None,
    };
    let filter = DetectionFilter { symbol: params.symbol, min_grade, active_only: params.active_only };
    let detections = state.detection_store.query(&filter).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let count = detections.len();
    Ok(Json(DetectionsResponse { detections, count }))
}

#[derive(Debug, Serialize)]
struct UpgradesResponse {
    upgrades: Vec<crate::grade_tracker::UpgradeEvent>,
}

async fn list_recent_upgrades(State(state): State<ApiState>) -> Json<UpgradesResponse> {
    Json(UpgradesResponse { upgrades: state.grade_tracker.recent_upgrades() })
}
