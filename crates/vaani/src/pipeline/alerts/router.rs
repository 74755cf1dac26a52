use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;

use super::directory::DirectoryService;
use super::dispatch::NotificationDispatcher;
use super::domain::{OpportunityDraft, OpportunityId, ProfileDraft, UserId};
use super::ingest::IngestService;
use super::matching;
use super::queue::TaskIntake;
use super::repository::{
    AlertRegistryStore, NotificationLogStore, OpportunityStore, ProfileStore, StoreError,
};

/// Composed pipeline services shared by the HTTP handlers.
pub struct AlertServices<P, O, R, Q, L> {
    pub directory: DirectoryService<P, R>,
    pub ingest: IngestService<O>,
    pub dispatcher: NotificationDispatcher<R, P, Q, L>,
    pub profiles: Arc<P>,
    pub opportunities: Arc<O>,
    pub log: Arc<L>,
}

/// Router builder exposing the directory, ingestion, publish, and match
/// query surfaces.
pub fn alert_router<P, O, R, Q, L>(services: Arc<AlertServices<P, O, R, Q, L>>) -> Router
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    Router::new()
        .route("/api/v1/profiles", post(create_profile_handler))
        .route(
            "/api/v1/profiles/:user_id",
            get(get_profile_handler)
                .put(update_profile_handler)
                .delete(delete_profile_handler),
        )
        .route("/api/v1/profiles/by-phone/:phone", get(profile_by_phone_handler))
        .route(
            "/api/v1/profiles/:user_id/alerts",
            post(register_alerts_handler).delete(unregister_alerts_handler),
        )
        .route(
            "/api/v1/profiles/:user_id/notifications",
            get(notification_history_handler),
        )
        .route("/api/v1/opportunities", post(ingest_handler))
        .route("/api/v1/opportunities/batch", post(ingest_batch_handler))
        .route("/api/v1/opportunities/import", post(ingest_csv_handler))
        .route("/api/v1/opportunities/:opportunity_id", get(get_opportunity_handler))
        .route(
            "/api/v1/opportunities/:opportunity_id/publish",
            post(publish_handler),
        )
        .route("/api/v1/users/:user_id/matches", get(matches_handler))
        .with_state(services)
}

async fn create_profile_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Json(draft): Json<ProfileDraft>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let profile = services.directory.create_profile(draft)?;
    Ok((StatusCode::CREATED, Json(profile)))
}

async fn get_profile_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let profile = services.directory.get_profile(&UserId(user_id))?;
    Ok(Json(profile))
}

async fn update_profile_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Path(user_id): Path<String>,
    Json(draft): Json<ProfileDraft>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let profile = services
        .directory
        .update_profile(&UserId(user_id), draft)?;
    Ok(Json(profile))
}

async fn delete_profile_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    services.directory.delete_profile(&UserId(user_id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn profile_by_phone_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Path(phone): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let profile = services.directory.find_by_phone(&phone)?;
    Ok(Json(profile))
}

async fn register_alerts_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let registration = services
        .directory
        .register_alerts(&UserId(user_id), Utc::now())?;
    Ok((StatusCode::CREATED, Json(registration)))
}

async fn unregister_alerts_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    services
        .directory
        .unregister_alerts(&UserId(user_id), Utc::now())?;
    Ok(StatusCode::NO_CONTENT)
}

async fn notification_history_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let records = services.log.query_by_user(&UserId(user_id))?;
    Ok(Json(records))
}

async fn ingest_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Json(draft): Json<OpportunityDraft>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let opportunity = services.ingest.ingest_one(draft, Utc::now())?;
    Ok((StatusCode::CREATED, Json(opportunity)))
}

async fn ingest_batch_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Json(drafts): Json<Vec<OpportunityDraft>>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let report = services.ingest.ingest_batch(drafts, Utc::now())?;
    Ok(Json(report))
}

async fn ingest_csv_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    body: String,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let report = services
        .ingest
        .ingest_csv(body.as_bytes(), Utc::now())?;
    Ok(Json(report))
}

async fn get_opportunity_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Path(opportunity_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let opportunity = services
        .opportunities
        .get(&OpportunityId(opportunity_id))?
        .ok_or(StoreError::NotFound)?;
    Ok(Json(opportunity))
}

async fn publish_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Path(opportunity_id): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let opportunity = services
        .opportunities
        .get(&OpportunityId(opportunity_id))?
        .ok_or(StoreError::NotFound)?;

    let outcome = services.dispatcher.dispatch(&opportunity, Utc::now())?;
    Ok(Json(json!({
        "opportunity_id": opportunity.opportunity_id.0,
        "matched": outcome.matched,
        "tasks_created": outcome.tasks_created,
        "skipped_active": outcome.skipped_active,
        "skipped_completed": outcome.skipped_completed,
        "missing_profiles": outcome.missing_profiles,
    })))
}

#[derive(Debug, Deserialize)]
struct MatchQuery {
    today: Option<NaiveDate>,
    days: Option<i64>,
    #[serde(default)]
    explain: bool,
}

async fn matches_handler<P, O, R, Q, L>(
    State(services): State<Arc<AlertServices<P, O, R, Q, L>>>,
    Path(user_id): Path<String>,
    Query(query): Query<MatchQuery>,
) -> Result<impl IntoResponse, AppError>
where
    P: ProfileStore + 'static,
    O: OpportunityStore + 'static,
    R: AlertRegistryStore + 'static,
    Q: TaskIntake + 'static,
    L: NotificationLogStore + 'static,
{
    let profile = services.directory.get_profile(&UserId(user_id))?;
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());
    let horizon = today + chrono::Duration::days(query.days.unwrap_or(365));

    let candidates = services
        .opportunities
        .query_by_deadline_range(today, horizon)?;

    let diagnostics = if query.explain {
        Some(
            candidates
                .iter()
                .map(|opportunity| {
                    json!({
                        "opportunity_id": opportunity.opportunity_id.0,
                        "breakdown": matching::explain(&profile, opportunity, today),
                    })
                })
                .collect::<Vec<_>>(),
        )
    } else {
        None
    };

    let matches = matching::rank_matches(&profile, candidates, today);

    let mut payload = json!({
        "user_id": profile.user_id.0,
        "today": today,
        "matches": matches,
    });
    if let Some(diagnostics) = diagnostics {
        payload["diagnostics"] = json!(diagnostics);
    }
    Ok(Json(payload))
}
