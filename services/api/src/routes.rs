use crate::infra::{AppState, MaintenanceState};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use vaani::pipeline::alerts::{
    alert_router, AlertRegistryStore, AlertServices, NotificationLogStore, OpportunityStore,
    ProfileStore, TaskIntake,
};
use vaani::pipeline::calls::{call_router, CallLogStore, CallServices};

/// Merges the alert and call routers with the operational endpoints every
/// deployment carries.
pub(crate) fn with_service_routes<P, O, R, Q, L, C>(
    alerts: Arc<AlertServices<P, O, R, Q, L>>,
    calls: Arc<CallServices<C>>,
) -> axum::Router
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
    C: CallLogStore + 'static,
{
    alert_router(alerts)
        .merge(call_router(calls))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/maintenance/purge",
            axum::routing::post(purge_endpoint),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct PurgeRequest {
    /// Evaluation date for the opportunity retention rule; defaults to today.
    #[serde(default)]
    pub(crate) today: Option<NaiveDate>,
    #[serde(default = "default_retention_days")]
    pub(crate) retention_days: i64,
}

fn default_retention_days() -> i64 {
    90
}

/// Drops opportunities past their retention window and call sessions past the
/// resume window. Both removals are idempotent.
pub(crate) async fn purge_endpoint(
    Extension(state): Extension<MaintenanceState>,
    Json(request): Json<PurgeRequest>,
) -> Json<serde_json::Value> {
    let now = Utc::now();
    let today = request.today.unwrap_or_else(|| now.date_naive());

    let opportunities_purged = state
        .opportunities
        .purge_expired(today, request.retention_days);
    let sessions_purged = state.calls.manager.purge_expired(now);

    info!(
        %today,
        retention_days = request.retention_days,
        opportunities_purged,
        sessions_purged,
        "retention purge complete"
    );

    Json(json!({
        "today": today,
        "retention_days": request.retention_days,
        "opportunities_purged": opportunities_purged,
        "sessions_purged": sessions_purged,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_prometheus::PrometheusMetricLayer;
    use chrono::Duration;
    use metrics_exporter_prometheus::PrometheusHandle;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::OnceLock;
    use vaani::pipeline::alerts::{
        EducationLevel, InMemoryOpportunityStore, Opportunity, OpportunityId, OpportunityStore,
    };
    use vaani::pipeline::calls::{InMemoryCallLog, SessionManager};

    fn test_state(ready: bool) -> AppState {
        static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
        let handle = HANDLE
            .get_or_init(|| PrometheusMetricLayer::pair().1)
            .clone();
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(handle),
        }
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn readiness_flips_from_initializing_to_ready() {
        let state = test_state(false);
        let response = readiness_endpoint(Extension(state.clone()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.readiness.store(true, Ordering::Release);
        let response = readiness_endpoint(Extension(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let state = test_state(true);
        let response = metrics_endpoint(Extension(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .expect("content type present");
        assert_eq!(content_type, "text/plain; version=0.0.4");
    }

    #[tokio::test]
    async fn purge_endpoint_reports_removed_counts() {
        let opportunities = Arc::new(InMemoryOpportunityStore::default());
        opportunities
            .put(Opportunity {
                opportunity_id: OpportunityId("opp-stale".to_string()),
                title: "Closed program".to_string(),
                description: String::new(),
                deadline: NaiveDate::from_ymd_opt(2025, 1, 31).expect("valid date"),
                application_url: "https://example.gov/apply".to_string(),
                min_age: 0,
                max_age: 150,
                min_education: EducationLevel::HighSchool,
                eligible_locations: BTreeSet::new(),
                categories: BTreeSet::from(["jobs".to_string()]),
                source: "gazette".to_string(),
                published_at: Utc::now(),
            })
            .expect("seed opportunity");

        let call_log = Arc::new(InMemoryCallLog::default());
        let calls = Arc::new(CallServices {
            manager: SessionManager::new(call_log.clone()),
            log: call_log,
        });
        calls
            .manager
            .create_session("+911234567890", Utc::now() - Duration::minutes(45));

        let state = MaintenanceState {
            opportunities,
            calls,
        };
        let request = PurgeRequest {
            today: Some(NaiveDate::from_ymd_opt(2025, 6, 1).expect("valid date")),
            retention_days: 90,
        };

        let Json(body) = purge_endpoint(Extension(state), Json(request)).await;
        assert_eq!(body["opportunities_purged"], 1);
        assert_eq!(body["sessions_purged"], 1);
    }
}
