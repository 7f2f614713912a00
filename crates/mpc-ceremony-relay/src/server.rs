//! HTTP server for the relay service
//!
//! ## Routes
//!
//! | Method | Path | Success |
//! |---|---|---|
//! | POST | `/{session_id}` | 201 |
//! | GET | `/{session_id}` | 200, participants |
//! | DELETE | `/{session_id}` | 200 |
//! | POST | `/message/{session_id}` | 202, or 507 with the receipt |
//! | GET | `/message/{session_id}/{participant}` | 200, messages |
//! | DELETE | `/message/{session_id}/{participant}/{hash}` | 200 |
//! | POST | `/start/{session_id}` | 200 |
//! | GET | `/start/{session_id}` | 200, committee |
//!
//! The message routes read the round tag from the optional `message_id`
//! header. Error bodies are plain text.
//!
//! ## Production Features
//!
//! - Graceful shutdown on SIGTERM/SIGINT, after which the store is wiped
//! - Request timeout middleware
//! - CORS configuration

use crate::{ROUND_TAG_HEADER, RelayError, RelayService};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use mpc_ceremony_core::{Message, PartyId};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Relay server configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to listen on
    pub listen_addr: SocketAddr,
    /// Maximum number of stored records
    pub max_entries: usize,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_entries: 100_000,
            cors_enabled: true,
            request_timeout_secs: 30,
        }
    }
}

impl RelayConfig {
    /// Set the listen address
    pub fn with_listen_addr(mut self, addr: impl Into<SocketAddr>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Set the store capacity
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Set request timeout
    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Disable CORS
    pub fn without_cors(mut self) -> Self {
        self.cors_enabled = false;
        self
    }
}

/// Relay HTTP server
pub struct RelayServer {
    service: Arc<RelayService>,
    config: RelayConfig,
}

impl RelayServer {
    /// Create a server with a fresh store
    pub fn new(config: RelayConfig) -> Self {
        let service = Arc::new(RelayService::new(config.max_entries));
        Self { service, config }
    }

    /// Create a server around an existing service
    pub fn with_service(service: Arc<RelayService>, config: RelayConfig) -> Self {
        Self { service, config }
    }

    /// Get the service behind the routes
    pub fn service(&self) -> Arc<RelayService> {
        Arc::clone(&self.service)
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);

        let mut router = Router::new()
            // Sessions
            .route(
                "/{session_id}",
                post(join_session).get(get_participants).delete(delete_session),
            )
            // Start gate
            .route("/start/{session_id}", post(start_session).get(get_start))
            // Messages
            .route("/message/{session_id}", post(post_message))
            .route("/message/{session_id}/{participant}", get(get_messages))
            .route(
                "/message/{session_id}/{participant}/{hash}",
                delete(delete_message),
            )
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::with_status_code(
                        StatusCode::REQUEST_TIMEOUT,
                        timeout,
                    )),
            )
            .with_state(Arc::clone(&self.service));

        if self.config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }

        router
    }

    /// Bind the configured address and serve until SIGINT/SIGTERM
    pub async fn serve(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve_listener(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// The store is wiped once the server has drained.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        info!(
            address = %listener.local_addr()?,
            max_entries = self.config.max_entries,
            "Starting relay service"
        );

        let router = self.router();
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutdown signal received, cleaning up...");
        let stats = self.service.stats();
        info!(
            sessions_created = stats.sessions_created,
            messages_stored = stats.messages_stored,
            messages_dropped = stats.messages_dropped,
            messages_acknowledged = stats.messages_acknowledged,
            "Relay statistics"
        );
        self.service.clear();

        info!("Relay service stopped");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// API error response that implements IntoResponse
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn from_relay_error(e: RelayError) -> Self {
        Self {
            status: StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: e.to_string(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

impl From<RelayError> for ApiError {
    fn from(e: RelayError) -> Self {
        Self::from_relay_error(e)
    }
}

// ============================================================================
// Handlers
// ============================================================================

type AppState = Arc<RelayService>;

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid body: {}", e)))
}

fn round_tag(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    match headers.get(ROUND_TAG_HEADER) {
        None => Ok(None),
        Some(value) => {
            let tag = value
                .to_str()
                .map_err(|_| ApiError::bad_request("message_id header is not valid text"))?
                .trim();
            Ok((!tag.is_empty()).then(|| tag.to_string()))
        }
    }
}

async fn join_session(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let participants: Vec<PartyId> = parse_body(&body)?;
    service.join_session(&session_id, &participants)?;
    Ok(StatusCode::CREATED)
}

async fn get_participants(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(service.participants(&session_id)?))
}

async fn delete_session(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    service.delete_session(&session_id)?;
    Ok(StatusCode::OK)
}

async fn start_session(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let committee: Vec<PartyId> = parse_body(&body)?;
    service.start_session(&session_id, &committee)?;
    Ok(StatusCode::OK)
}

async fn get_start(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(service.start_committee(&session_id)?))
}

async fn post_message(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let tag = round_tag(&headers)?;
    let message: Message = parse_body(&body)?;

    let receipt = service.post_message(&session_id, tag.as_deref(), message)?;
    if receipt.is_complete() {
        Ok(StatusCode::ACCEPTED.into_response())
    } else {
        Ok((StatusCode::INSUFFICIENT_STORAGE, Json(receipt)).into_response())
    }
}

async fn get_messages(
    State(service): State<AppState>,
    Path((session_id, participant)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let tag = round_tag(&headers)?;
    let messages = service.get_messages(&session_id, &participant, tag.as_deref())?;

    let body = serde_json::to_vec(&messages).map_err(|e| {
        error!(session_id = %session_id, error = %e, "Failed to encode messages");
        ApiError::internal(format!("Failed to encode messages: {}", e))
    })?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

async fn delete_message(
    State(service): State<AppState>,
    Path((session_id, participant, hash)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let tag = round_tag(&headers)?;
    service.delete_message(&session_id, &participant, &hash, tag.as_deref())?;
    Ok(StatusCode::OK)
}
