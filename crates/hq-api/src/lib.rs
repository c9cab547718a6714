//! HHR Queue HTTP API
//!
//! Request bodies are read as text and parsed as JSON whatever the declared
//! content type: HHR-Pro and SServer post `text/plain`.

pub mod error;

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use hq_common::{Message, MessagePage, Publisher, QueueError, QueueStatus, ReceivedRecord};
use hq_engine::QueueService;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::debug;

pub use error::{ApiError, ErrorBody};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<QueueService>,
}

pub fn create_router(service: Arc<QueueService>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/msg", get(list_messages).post(add_message))
        .route("/msg/all", delete(clear_pending))
        .route("/msg/:id", delete(delete_message))
        .route("/cmd/:cmd", post(command))
        .route("/register", post(list_publishers))
        .route("/register/create", post(create_publisher))
        .route("/register/:publisher", delete(revoke_publisher))
        .route("/:msg_type", post(relay_message))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

// ============================================================================
// Request / response bodies
// ============================================================================

/// Body carrying the admin key
#[derive(Debug, Default, Deserialize)]
struct KeyBody {
    #[serde(default)]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    pg: Option<u32>,
    offset: Option<u32>,
    filter: Option<String>,
}

#[derive(Debug, Serialize)]
struct Acknowledged {
    code: u16,
    message: String,
}

impl Acknowledged {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            code: 200,
            message: message.into(),
        })
    }
}

fn parse_json(body: &str) -> Result<Value, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError(QueueError::bad_format(vec![e.to_string()])))
}

/// Admin key from an optional body; a missing or malformed body means no key
fn key_from(body: &str) -> KeyBody {
    if body.trim().is_empty() {
        return KeyBody::default();
    }
    serde_json::from_str(body).unwrap_or_default()
}

// ============================================================================
// Queue
// ============================================================================

async fn status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(state.service.status())
}

async fn command(
    State(state): State<AppState>,
    Path(cmd): Path<String>,
    body: String,
) -> Result<Response, ApiError> {
    let KeyBody { key } = key_from(&body);
    let key = key.as_deref();

    let status = match cmd.as_str() {
        "start" => state.service.start(key).await?,
        "stop" => state.service.stop(key).await?,
        "reset" => state.service.reset(key).await?,
        other => {
            debug!(cmd = %other, "Unknown command");
            let body = ErrorBody {
                code: 405,
                message: format!("unknown command {}", other),
                detail: None,
            };
            return Ok((StatusCode::METHOD_NOT_ALLOWED, Json(body)).into_response());
        }
    };
    Ok(Json(status).into_response())
}

// ============================================================================
// Messages
// ============================================================================

async fn list_messages(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<MessagePage> {
    let page = state
        .service
        .get_messages(params.pg, params.offset, params.filter.as_deref())
        .await?;
    Ok(Json(page))
}

async fn add_message(State(state): State<AppState>, body: String) -> ApiResult<Message> {
    let payload = parse_json(&body)?;
    Ok(Json(state.service.add_msg(payload).await?))
}

async fn delete_message(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Acknowledged> {
    state.service.del_message(&id).await?;
    Ok(Acknowledged::ok(format!("message {} deleted", id)))
}

async fn clear_pending(State(state): State<AppState>) -> ApiResult<Acknowledged> {
    let removed = state.service.clear_pending().await?;
    Ok(Acknowledged::ok(format!("{} pending messages removed", removed)))
}

// ============================================================================
// Publishers
// ============================================================================

async fn list_publishers(State(state): State<AppState>, body: String) -> ApiResult<Vec<Publisher>> {
    let KeyBody { key } = key_from(&body);
    Ok(Json(state.service.get_publishers(key.as_deref()).await?))
}

async fn create_publisher(State(state): State<AppState>, body: String) -> ApiResult<Publisher> {
    let KeyBody { key } = key_from(&body);
    Ok(Json(state.service.create_publisher(key.as_deref()).await?))
}

async fn revoke_publisher(
    State(state): State<AppState>,
    Path(publisher): Path<String>,
    body: String,
) -> ApiResult<Acknowledged> {
    let KeyBody { key } = key_from(&body);
    state.service.revoke_publisher(key.as_deref(), &publisher).await?;
    Ok(Acknowledged::ok("publisher revoked"))
}

// ============================================================================
// Relay
// ============================================================================

async fn relay_message(
    State(state): State<AppState>,
    Path(msg_type): Path<String>,
    body: String,
) -> ApiResult<ReceivedRecord> {
    let message = parse_json(&body)?;
    Ok(Json(state.service.relay_msg(&msg_type, message).await?))
}
