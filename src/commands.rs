use crate::adapters::openai::OpenAIMessage;
use crate::adapters::tools::{args, spawn_tool};
use crate::app_state::AppState;
use crate::domain::error::{AgentError, StoreError};
use crate::domain::fitness::WorkoutTemplate;
use crate::domain::models::{Message, ToolDefinition, ToolErrorKind, ToolResult, UserId};
use crate::domain::ports::{blocking, ToolContext, WorkoutStore};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([
            AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            CONTENT_TYPE,
        ]);

    Router::new()
        .route("/ai-trainer", post(chat))
        .route("/tools", get(list_tools))
        .route("/tools/execute", post(execute_tool))
        .route("/workouts/:id/export", get(export_workout))
        .route("/workouts/import", post(import_workout))
        .route("/health", get(health))
        .with_state(state)
        .layer(cors)
}

// --- Errors ---

/// Error body returned by every route: `{error, error_type, details?}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    error_type: &'static str,
    details: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    error_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl ApiError {
    fn new(status: StatusCode, error_type: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            error_type,
            details: None,
        }
    }

    fn unauthorized(error: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", error)
    }

    fn bad_request(error_type: &'static str, error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_type, error)
    }

    fn with_chain(mut self, err: &dyn std::error::Error) -> Self {
        let mut chain = vec![err.to_string()];
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        self.details = Some(chain.join(": "));
        self
    }

    /// Drops `details` unless the server is configured to expose them.
    fn scrub(mut self, state: &AppState) -> Self {
        if !state.expose_error_details {
            self.details = None;
        }
        self
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        let status = match err {
            AgentError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AgentError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AgentError::MaxTurnsExceeded(_) | AgentError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.error_type(), err.to_string()).with_chain(&err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::NotFound(_) => StatusCode::NOT_FOUND,
            StoreError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            StoreError::ConstraintViolation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Connection(_) | StoreError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let error_type = match err.kind() {
            ToolErrorKind::NotFound => "not_found",
            ToolErrorKind::PermissionDenied => "permission_denied",
            ToolErrorKind::ConstraintViolation => "constraint_violation",
            ToolErrorKind::ConnectionError => "connection_error",
            _ => "unknown_error",
        };
        Self::new(status, error_type, err.user_message()).with_chain(&err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("invalid_request", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.error,
            error_type: self.error_type,
            details: self.details.as_deref(),
        };
        (self.status, Json(body)).into_response()
    }
}

// --- Auth ---

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserId, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Unauthorized"))?
        .to_string();

    let auth = state.auth.clone();
    match blocking(move || auth.authenticate(&token)).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => {
            warn!("Rejected request with unknown token");
            Err(ApiError::unauthorized("Unauthorized"))
        }
        Err(e) => Err(ApiError::from(e).scrub(state)),
    }
}

// --- Chat ---

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub messages: Vec<OpenAIMessage>,
    #[serde(default)]
    pub stream: bool,
}

fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

fn completion(id: &str, model: &str, content: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

fn chunk(id: &str, model: &str, delta: Value, finish_reason: Option<&str>) -> Event {
    let body = json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": chrono::Utc::now().timestamp(),
        "model": model,
        "choices": [{ "index": 0, "delta": delta, "finish_reason": finish_reason }]
    });
    Event::default().data(body.to_string())
}

async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let Json(body) = body?;
    if body.messages.is_empty() {
        return Err(ApiError::bad_request("invalid_request", "messages must not be empty"));
    }

    let history: Vec<Message> = body.messages.into_iter().map(Message::from).collect();
    info!(user_id = %user, messages = history.len(), stream = body.stream, "Trainer request");

    if body.stream {
        return Ok(stream_chat(state, user, history).into_response());
    }

    let outcome = state.agent.run(user, history).await.map_err(|e| {
        error!(user_id = %user, error = %e, "Trainer turn failed");
        ApiError::from(e).scrub(&state)
    })?;

    let model = &state.agent.options().model.0;
    Ok(Json(completion(&completion_id(), model, &outcome.content)).into_response())
}

/// Runs the turn on its own task and relays deltas as SSE chunks. A client
/// that disconnects closes the event channel, which drops the turn at its
/// next await point even when no text is flowing.
fn stream_chat(
    state: AppState,
    user: UserId,
    history: Vec<Message>,
) -> Sse<ReceiverStream<Result<Event, Infallible>>> {
    let (events, rx) = mpsc::channel::<Result<Event, Infallible>>(64);

    tokio::spawn(async move {
        let id = completion_id();
        let model = state.agent.options().model.0.clone();
        let (delta_tx, mut deltas) = mpsc::channel::<String>(64);

        let turn = state.agent.run_stream(user, history, delta_tx);
        tokio::pin!(turn);

        let result = loop {
            tokio::select! {
                biased;
                Some(delta) = deltas.recv() => {
                    let event = chunk(&id, &model, json!({ "content": delta }), None);
                    if events.send(Ok(event)).await.is_err() {
                        info!(user_id = %user, "Client went away mid-stream");
                        return;
                    }
                }
                _ = events.closed() => {
                    info!(user_id = %user, "Client went away mid-stream");
                    return;
                }
                result = &mut turn => break result,
            }
        };

        while let Ok(delta) = deltas.try_recv() {
            let event = chunk(&id, &model, json!({ "content": delta }), None);
            if events.send(Ok(event)).await.is_err() {
                return;
            }
        }

        let last = match result {
            Ok(_) => chunk(&id, &model, json!({}), Some("stop")),
            Err(e) => {
                error!(user_id = %user, error = %e, "Streamed trainer turn failed");
                let err = ApiError::from(e).scrub(&state);
                let mut body = json!({ "error": err.error, "error_type": err.error_type });
                if let Some(details) = err.details {
                    body["details"] = Value::String(details);
                }
                Event::default().data(body.to_string())
            }
        };
        let _ = events.send(Ok(last)).await;
        let _ = events.send(Ok(Event::default().data("[DONE]"))).await;
    });

    Sse::new(ReceiverStream::new(rx))
}

// --- Tools ---

async fn list_tools(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<ToolDefinition>>, ApiError> {
    authenticate(&state, &headers).await?;
    Ok(Json(state.tools.definitions()))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteBody {
    pub tool_name: String,
    #[serde(default)]
    pub tool_arguments: Value,
}

async fn execute_tool(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ExecuteBody>, JsonRejection>,
) -> Result<Json<ToolResult>, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let Json(body) = body?;

    let input = match body.tool_arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    let ctx = ToolContext { user_id: user };
    let tools = state.tools.clone();
    let name = body.tool_name;
    let result = spawn_tool(async move { tools.execute_value(&ctx, &name, input).await })
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "Tool task did not complete");
            ToolResult::failure(ToolErrorKind::UnknownError, "Tool execution failed")
        });
    Ok(Json(result))
}

// --- Import / export ---

async fn export_workout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let workout_id = Uuid::parse_str(&id)
        .map_err(|_| ApiError::bad_request("validation_error", "Invalid UUID format for workout_id"))?;

    let store = state.store.clone();
    let workout = blocking(move || store.get_workout(user, workout_id))
        .await
        .map_err(|e| ApiError::from(e).scrub(&state))?;
    Ok(Json(workout).into_response())
}

async fn import_workout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let user = authenticate(&state, &headers).await?;
    let Json(body) = body?;

    let mut template: WorkoutTemplate = args::parse(body).map_err(|invalid| {
        let problems = invalid.validation_errors.unwrap_or_default().join("; ");
        ApiError::bad_request("validation_error", format!("Invalid workout: {}", problems))
    })?;
    let problems = template.problems();
    if !problems.is_empty() {
        return Err(ApiError::bad_request(
            "validation_error",
            format!("Invalid workout: {}", problems.join("; ")),
        ));
    }
    template.name = format!("{} (Imported)", template.name.trim());

    let store = state.store.clone();
    let summary = blocking(move || store.import_workout(user, &template))
        .await
        .map_err(|e| ApiError::from(e).scrub(&state))?;
    Ok((StatusCode::CREATED, Json(summary)).into_response())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
