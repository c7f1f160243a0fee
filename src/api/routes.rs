//! API route definitions.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::{routing::get, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use crate::cache::CacheStats;
use crate::sampler::logo::KnownApp;
use crate::snapshot::{
    DashboardPage, ProcessLookup, ProcessSearch, SelfMonitorReport, SnapshotFilter, SnapshotView,
};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/dashboard", get(dashboard))
        .route("/snapshot", get(snapshot))
        .route("/cache-stats", get(cache_stats))
        .route("/self-monitor", get(self_monitor))
        .route("/process-search", get(process_search))
        .route("/process-details/{pid}", get(process_details))
        .route("/app-icons", get(app_icons))
        .route("/all-apps", get(all_apps))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    #[serde(default = "first_page")]
    page: usize,
}

fn first_page() -> usize {
    1
}

async fn dashboard(State(state): State<AppState>, Query(q): Query<PageQuery>) -> Json<DashboardPage> {
    Json(state.service.get_dashboard_page(q.page).await)
}

async fn snapshot(
    State(state): State<AppState>,
    Query(filter): Query<SnapshotFilter>,
) -> Json<SnapshotView> {
    Json(state.service.get_snapshot(&filter).await)
}

async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.service.cache_stats())
}

async fn self_monitor(State(state): State<AppState>) -> Json<SelfMonitorReport> {
    Json(state.service.self_monitor().await)
}

async fn process_search(State(state): State<AppState>) -> Json<ProcessSearch> {
    Json(state.service.process_search().await)
}

async fn process_details(State(state): State<AppState>, Path(pid): Path<u32>) -> Json<ProcessLookup> {
    Json(state.service.process_details(pid).await)
}

async fn app_icons(State(state): State<AppState>) -> Json<BTreeMap<String, String>> {
    Json(state.service.app_icons())
}

async fn all_apps(State(state): State<AppState>) -> Json<Vec<KnownApp>> {
    Json(state.service.all_apps())
}
