//! HTTP surface for the Codepad execution core
//!
//! The editor UI posts a language and a source buffer and renders the single
//! output string it gets back. One [`Session`] is shared by all requests and
//! guarded by an async mutex, so executions and installs run one at a time
//! against the same workspace. `/session` reads a snapshot published after
//! each request instead, so it answers while an install holds the session.

pub mod error;

pub use error::{Result, ServerError};

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Json as AxumJson, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use codepad_core::config::ServerSection;
use codepad_core::executor::ExecutionResult;
use codepad_core::installer::{BundleResult, DependencyInstallRequest, InstallResult};
use codepad_core::toolchain::LanguageInfo;
use codepad_core::workspace::Workspace;
use codepad_core::{CodePad, Session};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub language: String,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Rendered text for the output pane
    pub output: String,
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub previous_source: String,
    pub previous_language: Option<String>,
    pub workspace: Option<Workspace>,
    /// An execution or install currently holds the session
    pub busy: bool,
}

impl SessionResponse {
    fn of(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            started_at: session.started_at(),
            previous_source: session.previous_source().to_string(),
            previous_language: session.previous_language().map(String::from),
            workspace: session.workspace().cloned(),
            busy: false,
        }
    }
}

/// Configuration for the Codepad server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub enable_cors: bool,
    /// CORS allowed origins (if None, allows any origin)
    pub cors_origins: Option<Vec<String>>,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
    pub enable_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3001)),
            enable_cors: true,
            cors_origins: None,
            max_body_size: 1024 * 1024, // 1MB
            enable_logging: true,
        }
    }
}

impl ServerConfig {
    /// Build from the `server` section of `codepad.yaml`.
    pub fn from_section(section: &ServerSection) -> Result<Self> {
        if let Some(origins) = &section.cors_origins {
            for origin in origins {
                origin.parse::<HeaderValue>().map_err(|e| {
                    ServerError::config_error(format!("Invalid CORS origin '{}': {}", origin, e))
                })?;
            }
        }
        Ok(Self {
            cors_origins: section.cors_origins.clone(),
            max_body_size: section.max_body_size,
            ..Self::default()
        }
        .with_bind_addr_str(&section.bind_addr)?
        .with_cors(section.enable_cors))
    }

    /// Parse and set the bind address from a string.
    pub fn with_bind_addr_str(mut self, addr: &str) -> Result<Self> {
        self.bind_addr = addr
            .parse()
            .map_err(|e| ServerError::config_error(format!("Invalid bind address '{}': {}", addr, e)))?;
        Ok(self)
    }

    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    pub fn with_logging(mut self, enable: bool) -> Self {
        self.enable_logging = enable;
        self
    }
}

/// Shared application state: the execution core and the one session it serves.
#[derive(Clone)]
pub struct AppState {
    pub codepad: Arc<CodePad>,
    pub session: Arc<Mutex<Session>>,
    snapshot: Arc<RwLock<SessionResponse>>,
}

impl AppState {
    fn new(codepad: CodePad) -> Self {
        let session = Session::new();
        let snapshot = SessionResponse::of(&session);
        Self {
            codepad: Arc::new(codepad),
            session: Arc::new(Mutex::new(session)),
            snapshot: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Called with the session lock held, after every mutation.
    async fn publish(&self, session: &Session) {
        *self.snapshot.write().await = SessionResponse::of(session);
    }
}

async fn languages_handler(State(state): State<AppState>) -> Json<Vec<LanguageInfo>> {
    Json(state.codepad.languages())
}

async fn execute_handler(
    State(state): State<AppState>,
    payload: std::result::Result<AxumJson<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>> {
    let AxumJson(request) = payload?;
    log::info!(
        "Execute request: language '{}', {} bytes of source",
        request.language,
        request.source.len()
    );

    let mut session = state.session.lock().await;
    let result = state
        .codepad
        .execute(&mut session, &request.language, &request.source)
        .await;
    state.publish(&session).await;
    drop(session);
    let result = result?;

    log::info!(
        "Execution finished with {:?} in {:?}",
        result.status,
        result.duration
    );
    Ok(Json(ExecuteResponse {
        output: result.output(),
        result,
    }))
}

async fn install_handler(
    State(state): State<AppState>,
    payload: std::result::Result<AxumJson<DependencyInstallRequest>, JsonRejection>,
) -> Result<Json<InstallResult>> {
    let AxumJson(request) = payload?;
    log::info!(
        "Install request: {} package '{}'",
        request.ecosystem,
        request.package_name
    );
    let mut session = state.session.lock().await;
    let result = state.codepad.install(&mut session, &request).await;
    state.publish(&session).await;
    Ok(Json(result?))
}

async fn install_bundle_handler(State(state): State<AppState>) -> Result<Json<BundleResult>> {
    log::info!("Browser automation bundle install requested");
    let mut session = state.session.lock().await;
    let result = state.codepad.install_bundle(&mut session).await;
    state.publish(&session).await;
    Ok(Json(result?))
}

/// Never waits on the session lock; reflects the last finished request.
async fn session_handler(State(state): State<AppState>) -> Json<SessionResponse> {
    let busy = state.session.try_lock().is_err();
    let mut snapshot = state.snapshot.read().await.clone();
    snapshot.busy = busy;
    Json(snapshot)
}

async fn workspace_delete_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let mut session = state.session.lock().await;
    let existed = session.workspace().is_some();
    state.codepad.destroy_workspace(&mut session);
    state.publish(&session).await;
    log::info!("Workspace reset requested (existed: {})", existed);
    Json(json!({
        "status": "success",
        "removed": existed,
        "timestamp": chrono::Utc::now()
    }))
}

/// The Codepad HTTP server.
pub struct CodepadServer {
    state: AppState,
    config: ServerConfig,
}

impl CodepadServer {
    pub fn new(codepad: CodePad) -> Self {
        Self::with_config(codepad, ServerConfig::default())
    }

    pub fn with_config(codepad: CodePad, config: ServerConfig) -> Self {
        Self {
            state: AppState::new(codepad),
            config,
        }
    }

    /// Build the Axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route(
                "/health",
                get(|| async {
                    Json(HealthResponse {
                        status: "healthy".to_string(),
                        timestamp: chrono::Utc::now(),
                        version: env!("CARGO_PKG_VERSION").to_string(),
                    })
                }),
            )
            .route("/languages", get(languages_handler))
            .route("/execute", post(execute_handler))
            .route("/install", post(install_handler))
            .route("/install/bundle", post(install_bundle_handler))
            .route("/session", get(session_handler))
            .route("/workspace", delete(workspace_delete_handler))
            .fallback(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({
                        "error": "not_found",
                        "timestamp": chrono::Utc::now()
                    })),
                )
            })
            .layer(DefaultBodyLimit::max(self.config.max_body_size))
            .with_state(self.state.clone());

        if self.config.enable_logging {
            router = router.layer(middleware::from_fn(
                |request: axum::http::Request<axum::body::Body>, next: axum::middleware::Next| async {
                    let request_id = uuid::Uuid::new_v4().to_string();
                    let method = request.method().clone();
                    let uri = request.uri().clone();

                    // Health probes are frequent
                    if uri.path() == "/health" {
                        log::debug!("Request {} {} {}", request_id, method, uri);
                    } else {
                        log::info!("Request {} {} {}", request_id, method, uri);
                    }

                    let start = std::time::Instant::now();
                    let response = next.run(request).await;
                    log::info!(
                        "Response {} {} in {:?}",
                        request_id,
                        response.status(),
                        start.elapsed()
                    );
                    response
                },
            ));
        }

        router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            let cors_layer = if let Some(ref origins) = self.config.cors_origins {
                let origins: Vec<HeaderValue> = origins
                    .iter()
                    .filter_map(|origin| match origin.parse() {
                        Ok(value) => Some(value),
                        Err(_) => {
                            log::warn!("Ignoring invalid CORS origin '{}'", origin);
                            None
                        }
                    })
                    .collect();
                CorsLayer::new()
                    .allow_origin(origins)
                    .allow_methods(Any)
                    .allow_headers(Any)
            } else {
                CorsLayer::permissive()
            };
            router = router.layer(cors_layer);
        }

        router
    }

    /// Serve until `shutdown_signal` resolves, then remove the session workspace.
    pub async fn serve_with_shutdown<F>(self, shutdown_signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let listener = TcpListener::bind(self.config.bind_addr)
            .await
            .map_err(|e| {
                ServerError::config_error(format!(
                    "Failed to bind to {}: {}",
                    self.config.bind_addr, e
                ))
            })?;

        log::info!("Codepad server starting on {}", self.config.bind_addr);
        log::info!("Health check: http://{}/health", self.config.bind_addr);
        log::info!("Execute endpoint: http://{}/execute", self.config.bind_addr);

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::internal(format!("Server error: {}", e)));

        let mut session = self.state.session.lock().await;
        self.state.codepad.destroy_workspace(&mut session);
        self.state.publish(&session).await;
        log::info!("Codepad server shut down");
        served
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            log::info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            log::info!("Received SIGTERM, shutting down...");
        },
    }
}
