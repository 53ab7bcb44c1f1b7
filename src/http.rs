use crate::collectors::Capture;
use crate::metrics::Metrics;
use crate::scheduler::RefreshScheduler;
use crate::state::{Dashboard, HistorySample, TimeRange};
use crate::view::{CurrentView, DashboardView, SortColumn, SortDirection};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub dashboard: Arc<Dashboard>,
    pub scheduler: Arc<RefreshScheduler>,
}

#[derive(Debug, Default, Deserialize)]
struct MetricsQuery {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Default, Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    range: TimeRange,
}

#[derive(Debug, Default, Deserialize)]
struct DashboardQuery {
    #[serde(default)]
    range: TimeRange,
    #[serde(default)]
    sort: SortColumn,
    #[serde(default)]
    order: SortDirection,
}

#[derive(Debug, Serialize)]
struct AutoRefreshState {
    running: bool,
    interval_ms: u64,
}

pub fn build_router(
    metrics: Arc<Metrics>,
    dashboard: Arc<Dashboard>,
    scheduler: Arc<RefreshScheduler>,
) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/metrics", get(metrics_api))
        .route("/api/history", get(history_api))
        .route("/api/dashboard", get(dashboard_api))
        .route("/api/refresh", post(refresh_api))
        .route("/api/auto-refresh", get(auto_refresh_state))
        .route("/api/auto-refresh/toggle", post(auto_refresh_toggle))
        .with_state(HttpAppState {
            metrics,
            dashboard,
            scheduler,
        })
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn metrics_api(
    State(state): State<HttpAppState>,
    Query(query): Query<MetricsQuery>,
) -> Json<Capture> {
    let capture = state.dashboard.fetch(query.force).await;
    Json((*capture).clone())
}

async fn history_api(
    State(state): State<HttpAppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<HistorySample>> {
    Json(state.dashboard.history(query.range).await)
}

async fn dashboard_api(
    State(state): State<HttpAppState>,
    Query(query): Query<DashboardQuery>,
) -> Json<DashboardView> {
    let current = state
        .dashboard
        .current()
        .await
        .map(|capture| CurrentView::from_capture(&capture, query.sort, query.order));
    Json(DashboardView {
        loading: state.dashboard.is_loading() || current.is_none(),
        auto_refresh: state.scheduler.is_running(),
        range: query.range,
        sort: query.sort,
        order: query.order,
        current,
        history: state.dashboard.history(query.range).await,
    })
}

async fn refresh_api(State(state): State<HttpAppState>) -> Response {
    state.scheduler.manual_refresh().await;
    match state.dashboard.current().await {
        Some(capture) => Json((*capture).clone()).into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

async fn auto_refresh_state(State(state): State<HttpAppState>) -> Json<AutoRefreshState> {
    Json(auto_refresh_body(&state.scheduler))
}

async fn auto_refresh_toggle(State(state): State<HttpAppState>) -> Json<AutoRefreshState> {
    state.scheduler.toggle();
    Json(auto_refresh_body(&state.scheduler))
}

fn auto_refresh_body(scheduler: &RefreshScheduler) -> AutoRefreshState {
    AutoRefreshState {
        running: scheduler.is_running(),
        interval_ms: scheduler.interval().as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::collectors::mock::MockCollector;
    use crate::persist::NullPersistence;
    use crate::store::MetricsStore;
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        scheduler: Arc<RefreshScheduler>,
        metrics: Arc<Metrics>,
    }

    fn test_app() -> TestApp {
        let metrics = Metrics::new().expect("metrics init");
        let clock = Arc::new(SystemClock);
        let store = Arc::new(
            MetricsStore::new(
                Arc::new(MockCollector::seeded(1)),
                Arc::new(NullPersistence),
                clock.clone(),
            )
            .with_metrics(metrics.clone()),
        );
        let dashboard = Arc::new(Dashboard::new(store, clock, 24).with_metrics(metrics.clone()));
        let scheduler = Arc::new(RefreshScheduler::new(
            dashboard.clone(),
            Duration::from_secs(60),
        ));
        TestApp {
            router: build_router(metrics.clone(), dashboard, scheduler.clone()),
            scheduler,
            metrics,
        }
    }

    async fn call(router: &Router, method: &str, uri: &str) -> (StatusCode, String) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let app = test_app();
        let (status, body) = call(&app.router, "GET", "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn index_serves_dashboard_page() {
        let app = test_app();
        let (status, body) = call(&app.router, "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/api/dashboard"));
    }

    #[tokio::test]
    async fn dashboard_is_loading_before_first_fetch() {
        let app = test_app();
        let (status, body) = call(&app.router, "GET", "/api/dashboard").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["loading"], true);
        assert!(json["current"].is_null());
        assert_eq!(json["history"].as_array().unwrap().len(), 0);
        assert_eq!(json["range"], "1h");
    }

    #[tokio::test]
    async fn metrics_api_returns_capture_and_records_history() {
        let app = test_app();
        let (status, body) = call(&app.router, "GET", "/api/metrics").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        let cpu = json["snapshot"]["cpu"]["usage_percent"].as_f64().unwrap();
        assert!((30.0..60.0).contains(&cpu));
        assert!(json["captured_at"].is_string());

        let (_, body) = call(&app.router, "GET", "/api/dashboard?range=24h&sort=name&order=asc").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["loading"], false);
        assert_eq!(json["current"]["processes"][0]["name"], "chrome");
        assert_eq!(json["current"]["processes"][4]["name"], "vscode");
        assert_eq!(json["history"].as_array().unwrap().len(), 1);

        let (_, body) = call(&app.router, "GET", "/api/history?range=6h").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refresh_forces_a_new_capture() {
        let app = test_app();
        let (_, first) = call(&app.router, "GET", "/api/metrics").await;
        let (status, second) = call(&app.router, "POST", "/api/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(first, second);

        let collected = app
            .metrics
            .store_requests_total
            .with_label_values(&["collected"])
            .get();
        assert_eq!(collected, 2.0);
    }

    #[tokio::test]
    async fn toggle_flips_auto_refresh() {
        let app = test_app();
        let (_, body) = call(&app.router, "GET", "/api/auto-refresh").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["running"], false);
        assert_eq!(json["interval_ms"], 60_000);

        let (_, body) = call(&app.router, "POST", "/api/auto-refresh/toggle").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["running"], true);
        assert!(app.scheduler.is_running());

        let (_, body) = call(&app.router, "POST", "/api/auto-refresh/toggle").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["running"], false);
    }

    #[tokio::test]
    async fn metrics_endpoint_exports_snapshot_gauges() {
        let app = test_app();
        call(&app.router, "GET", "/api/metrics").await;

        let (status, body) = call(&app.router, "GET", "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("sysdash_cpu_usage_percent"));
        assert!(body.contains("sysdash_history_samples 1"));
    }
}
