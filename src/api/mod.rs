//! API layer -- axum routes, handlers, and middleware.

mod routes;
pub mod state;
pub mod timeout;

use std::path::Path;

use axum::{middleware, Router};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use self::state::AppState;
use self::timeout::RequestDeadline;

/// Build the application router with all API routes.
///
/// Every request, static files included, runs under `deadline`.
pub fn router(state: AppState, deadline: RequestDeadline, static_dir: Option<&Path>) -> Router {
    let app = Router::new().nest("/api", routes::api_routes());

    let app = match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app.fallback(fallback),
    };

    app.layer(middleware::from_fn_with_state(
        deadline,
        timeout::enforce_deadline,
    ))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn fallback() -> (axum::http::StatusCode, &'static str) {
    (axum::http::StatusCode::NOT_FOUND, "not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::WorkerPool;
    use crate::sampler::deviation::DeviationTracker;
    use crate::sampler::logo::LogoTable;
    use crate::sampler::testing::*;
    use crate::sampler::{ConnState, Sampler};
    use crate::snapshot::{DashboardCache, ServiceSettings, SnapshotService};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt; // for `oneshot`

    fn app() -> Router {
        let reads = (0..45)
            .map(|i| fact(100 + i, &format!("app{i:02}"), f64::from(i), 10))
            .collect();
        app_with(FakeProcesses::new(reads), Duration::from_secs(5))
    }

    fn app_with(processes: FakeProcesses, deadline: Duration) -> Router {
        let connections = FakeConnections {
            facts: vec![conn(100, ConnState::Listen, false)],
            denied: false,
        };
        let mut logos = LogoTable::default();
        logos.insert("app00", "/static/logo/linux/app00.svg");
        logos.insert("Zeta", "");
        let sampler = Sampler::new(
            Arc::new(processes),
            Arc::new(connections),
            logos,
            Arc::new(DeviationTracker::default()),
        );
        let service = SnapshotService::new(
            Arc::new(sampler),
            Arc::new(DashboardCache::new()),
            WorkerPool::new(2),
            ServiceSettings::default(),
        );
        let state = AppState {
            service: Arc::new(service),
        };
        router(state, RequestDeadline::new(deadline), None)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1_000_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[tokio::test]
    async fn test_dashboard_default_and_last_page() {
        let (status, json) = get_json(app(), "/api/dashboard").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["page"], 1);
        assert_eq!(json["items_per_page"], 20);
        assert_eq!(json["total_items"], 45);
        assert_eq!(json["has_more"], true);
        assert_eq!(json["items"][0]["name"], "app44");

        let (_, json) = get_json(app(), "/api/dashboard?page=3").await;
        assert_eq!(json["items"].as_array().unwrap().len(), 5);
        assert_eq!(json["has_more"], false);
    }

    #[tokio::test]
    async fn test_snapshot_filters() {
        let (status, json) = get_json(app(), "/api/snapshot?min_cpu=40&search=APP4").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["total"], 45);
        assert_eq!(json["filtered"], 5);
        assert_eq!(json["processes"][0]["name"], "app44");
    }

    #[tokio::test]
    async fn test_connections_show_in_snapshot() {
        let (_, json) = get_json(app(), "/api/snapshot?search=app00").await;
        assert_eq!(json["processes"][0]["incoming"], 1);
    }

    #[tokio::test]
    async fn test_cache_stats_shape() {
        let app = app();
        get_json(app.clone(), "/api/dashboard").await;
        get_json(app.clone(), "/api/dashboard?page=2").await;

        let (status, json) = get_json(app, "/api/cache-stats").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["hits"], 1);
        assert_eq!(json["misses"], 1);
        assert_eq!(json["total"], 2);
        assert_eq!(json["hit_rate_percent"], 50.0);
        assert_eq!(json["active_entries"], 1);
    }

    #[tokio::test]
    async fn test_self_monitor_shape() {
        let (status, json) = get_json(app(), "/api/self-monitor").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cpu_alert"], true);
        assert_eq!(json["status"], "warning");
        assert!(json["uptime_seconds"].is_u64());
        assert!(json["last_deviation"].is_null());
    }

    #[tokio::test]
    async fn test_process_search_and_details() {
        let (_, json) = get_json(app(), "/api/process-search").await;
        let processes = json["processes"].as_array().unwrap();
        assert_eq!(processes.len(), 45);
        assert_eq!(processes[0]["name"], "app00");
        assert!(processes[0]["exe"].is_string());

        let (status, json) = get_json(app(), "/api/process-details/101").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["found"], true);
        assert_eq!(json["name"], "app01");

        let (status, json) = get_json(app(), "/api/process-details/5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["found"], false);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_health_and_fallback() {
        let (status, json) = get_json(app(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["status"], "ok");

        let (status, _) = get_json(app(), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_slow_dashboard_hits_deadline() {
        let processes = FakeProcesses {
            delay: Duration::from_millis(400),
            ..FakeProcesses::new(vec![fact(1, "slow", 1.0, 1)])
        };
        let app = app_with(processes, Duration::from_millis(100));

        let (status, json) = get_json(app, "/api/dashboard").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json["error"], "Request timeout");
        assert_eq!(json["timeout_seconds"], 0.1);
    }

    #[tokio::test]
    async fn test_app_icons() {
        let (status, json) = get_json(app(), "/api/app-icons").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["app00"], "/static/logo/linux/app00.svg");
        assert_eq!(json["zeta"], "");
    }

    #[tokio::test]
    async fn test_all_apps() {
        let (status, json) = get_json(app(), "/api/all-apps").await;
        assert_eq!(status, StatusCode::OK);
        let apps = json.as_array().unwrap();
        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0]["exe_name"], "zeta");
        assert_eq!(apps[0]["display_name"], "Zeta");
        assert_eq!(apps[0]["logo"], "/static/logo/default.png");
        assert_eq!(apps[1]["display_name"], "app00");
    }
}
