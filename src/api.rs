use std::convert::Infallible;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use futures_util::stream::Stream;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::error::SessionError;
use crate::health::health_check;
use crate::payload::{self, to_relaxed_json};
use crate::session::Session;
use crate::store::{DocumentStore, MongoStore};

pub struct AppState<S = MongoStore> {
    pub session: Session<S>,
    pub watch_buffer: usize,
    /// Cancelled when the server is going down; open watch feeds end on it.
    pub shutdown: CancellationToken,
}

impl<S> AppState<S> {
    pub fn new(session: Session<S>, watch_buffer: usize) -> Self {
        Self {
            session,
            watch_buffer,
            shutdown: CancellationToken::new(),
        }
    }
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            watch_buffer: self.watch_buffer,
            shutdown: self.shutdown.clone(),
        }
    }
}

pub fn router<S: DocumentStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(health_check::<S>))
        .route("/collections/{name}/documents", post(insert_document::<S>))
        .route(
            "/collections/{name}/documents/audited",
            post(insert_audited::<S>),
        )
        .route("/collections/{name}/find", post(find_one::<S>))
        .route("/collections/{name}/watch", get(watch_inserts::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Body is extended JSON text, passed through as-is.
async fn insert_document<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = state.session.insert_document(&name, &body).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "inserted_id": to_relaxed_json(id) })),
    ))
}

async fn insert_audited<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let document = payload::parse_document(&body).map_err(SessionError::from)?;
    let ids = state.session.insert_document_dual(&name, &document).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "audit_id": to_relaxed_json(ids.audit_id),
            "inserted_id": to_relaxed_json(ids.inserted_id),
        })),
    ))
}

async fn find_one<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let document = state.session.find_one_json(&name, &body).await?;
    Ok(Json(to_relaxed_json(document)))
}

/// Server-Sent Events feed of inserts into `name`. The watch stops when
/// the client disconnects or the server shuts down.
async fn watch_inserts<S: DocumentStore>(
    State(state): State<AppState<S>>,
    Path(name): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut watch = state.session.spawn_watch(name.clone(), state.watch_buffer);
    let shutdown = state.shutdown.clone();

    let stream = async_stream::stream! {
        loop {
            let next = tokio::select! {
                event = watch.recv() => event,
                _ = shutdown.cancelled() => None,
            };
            let Some(event) = next else { break };

            match event.to_document() {
                Ok(doc) => {
                    yield Ok::<Event, Infallible>(Event::default()
                        .event("insert")
                        .data(to_relaxed_json(doc).to_string()));
                }
                Err(e) => tracing::warn!("undecodable change event on {}: {}", name, e),
            }
        }

        let last = match watch.cancel().await {
            Ok(end) => Event::default().event("end").json_data(end),
            Err(e) => Event::default()
                .event("error")
                .json_data(json!({ "error": e.to_string() })),
        };
        match last {
            Ok(event) => yield Ok(event),
            Err(e) => tracing::warn!("could not encode final event for {}: {}", name, e),
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SessionError::Decode(_) | SessionError::Encode(_) => StatusCode::BAD_REQUEST,
            SessionError::NoDocuments(_) => StatusCode::NOT_FOUND,
            SessionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        };

        let message = match &self.0 {
            SessionError::Decode(e) => format!("{}: {}", self.0, e),
            other => other.to_string(),
        };
        let body = Json(json!({
            "error": message,
        }));
        (status, body).into_response()
    }
}
