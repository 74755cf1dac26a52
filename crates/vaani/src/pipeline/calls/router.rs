use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::pipeline::alerts::domain::is_e164;

use super::domain::{SessionDelta, SessionId, SessionOutcome};
use super::manager::{SessionError, SessionManager};
use super::repository::CallLogStore;

/// Session manager plus the completion log it writes to.
pub struct CallServices<L> {
    pub manager: SessionManager<L>,
    pub log: Arc<L>,
}

/// Router builder for the inbound-call webhook surface.
pub fn call_router<L>(services: Arc<CallServices<L>>) -> Router
where
    L: CallLogStore + 'static,
{
    Router::new()
        .route("/api/v1/calls", post(start_or_resume_handler))
        .route(
            "/api/v1/calls/:session_id",
            get(get_session_handler)
                .patch(update_session_handler)
                .delete(expire_session_handler),
        )
        .route(
            "/api/v1/calls/:session_id/complete",
            post(complete_session_handler),
        )
        .route("/api/v1/calls/history/:phone", get(call_history_handler))
        .with_state(services)
}

struct CallApiError(SessionError);

impl From<SessionError> for CallApiError {
    fn from(value: SessionError) -> Self {
        Self(value)
    }
}

impl IntoResponse for CallApiError {
    fn into_response(self) -> Response {
        let (status, payload) = match &self.0 {
            SessionError::NotFound => (
                StatusCode::NOT_FOUND,
                json!({ "error": self.0.to_string() }),
            ),
            SessionError::RevisionConflict { current } => (
                StatusCode::CONFLICT,
                json!({ "error": self.0.to_string(), "current_revision": current }),
            ),
            SessionError::Log(error) => {
                let status = if error.is_transient() {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (status, json!({ "error": self.0.to_string() }))
            }
        };
        (status, Json(payload)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct StartCallRequest {
    phone: String,
}

async fn start_or_resume_handler<L>(
    State(services): State<Arc<CallServices<L>>>,
    Json(request): Json<StartCallRequest>,
) -> Response
where
    L: CallLogStore + 'static,
{
    if !is_e164(request.phone.trim()) {
        let payload = json!({ "error": "phone must be E.164, e.g. +911234567890" });
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
    }
    let phone = request.phone.trim();
    let now = Utc::now();

    if let Some(view) = services.manager.find_resumable(phone, now) {
        let payload = json!({ "resumed": true, "session": view });
        return (StatusCode::OK, Json(payload)).into_response();
    }

    let view = services.manager.create_session(phone, now);
    let payload = json!({ "resumed": false, "session": view });
    (StatusCode::CREATED, Json(payload)).into_response()
}

async fn get_session_handler<L>(
    State(services): State<Arc<CallServices<L>>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, CallApiError>
where
    L: CallLogStore + 'static,
{
    let view = services
        .manager
        .get(&SessionId(session_id), Utc::now())
        .ok_or(SessionError::NotFound)?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct UpdateSessionRequest {
    revision: u64,
    #[serde(default)]
    delta: SessionDelta,
}

async fn update_session_handler<L>(
    State(services): State<Arc<CallServices<L>>>,
    Path(session_id): Path<String>,
    Json(request): Json<UpdateSessionRequest>,
) -> Result<impl IntoResponse, CallApiError>
where
    L: CallLogStore + 'static,
{
    let view = services.manager.update(
        &SessionId(session_id),
        request.revision,
        request.delta,
        Utc::now(),
    )?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct CompleteSessionRequest {
    outcome: SessionOutcome,
}

async fn complete_session_handler<L>(
    State(services): State<Arc<CallServices<L>>>,
    Path(session_id): Path<String>,
    Json(request): Json<CompleteSessionRequest>,
) -> Result<impl IntoResponse, CallApiError>
where
    L: CallLogStore + 'static,
{
    let record = services
        .manager
        .complete(&SessionId(session_id), request.outcome, Utc::now())?;
    Ok(Json(record))
}

async fn expire_session_handler<L>(
    State(services): State<Arc<CallServices<L>>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, CallApiError>
where
    L: CallLogStore + 'static,
{
    if services.manager.expire(&SessionId(session_id)) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(CallApiError(SessionError::NotFound))
    }
}

async fn call_history_handler<L>(
    State(services): State<Arc<CallServices<L>>>,
    Path(phone): Path<String>,
) -> Result<impl IntoResponse, CallApiError>
where
    L: CallLogStore + 'static,
{
    let records = services
        .log
        .query_by_phone(&phone)
        .map_err(|error| CallApiError(SessionError::Log(error)))?;
    Ok(Json(records))
}
