use crate::{
    app::{AppError, MatchParams, MatchService},
    semantic::{LoadReport, Match},
};
use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{path::PathBuf, sync::Arc};
use tokio::signal;

struct SharedState {
    service: Arc<MatchService>,
    database_path: PathBuf,
}

pub fn router(service: Arc<MatchService>, database_path: PathBuf) -> Router {
    let shared_state = Arc::new(SharedState {
        service,
        database_path,
    });

    Router::new()
        .route("/api/match", post(match_text))
        .route("/api/reload", post(reload))
        .route("/api/status", get(status))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(shared_state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            log::error!("failed to install Ctrl+C handler: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                log::error!("failed to install signal handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::warn!("shutting down");
}

async fn start_app(app: Router, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn start_daemon(
    service: Arc<MatchService>,
    database_path: PathBuf,
    addr: &str,
) -> anyhow::Result<()> {
    let app = router(service, database_path);

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(start_app(app, addr))
}

#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = if self.0.is_client_error() {
            log::debug!("{self:?}");
            axum::http::StatusCode::BAD_REQUEST
        } else {
            log::error!("{self:?}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        };

        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, E: Into<AppError>>`.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// Run blocking embedding work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, HttpError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| AppError::Other(err.into()))?
        .map_err(HttpError)
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchRequest {
    pub text: String,

    #[serde(flatten)]
    pub params: MatchParams,
}

async fn match_text(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<MatchRequest>,
) -> Result<Json<Vec<Match>>, HttpError> {
    log::debug!("payload: {payload:?}");

    let service = state.service.clone();
    let matches = blocking(move || service.match_text(&payload.text, &payload.params)).await?;

    Ok(Json(matches))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReloadRequest {
    pub path: Option<PathBuf>,
}

async fn reload(
    State(state): State<Arc<SharedState>>,
    payload: Option<Json<ReloadRequest>>,
) -> Result<Json<LoadReport>, HttpError> {
    let path = payload
        .and_then(|Json(req)| req.path)
        .unwrap_or_else(|| state.database_path.clone());

    log::info!("reloading reference database from {}", path.display());

    let service = state.service.clone();
    let report = blocking(move || service.reload(&path)).await?;

    Ok(Json(report))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub references: usize,
    pub dimensions: Option<usize>,
    pub model: String,
}

async fn status(State(state): State<Arc<SharedState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        references: state.service.reference_count(),
        dimensions: state.service.reference_dimensions(),
        model: state.service.model_name().to_string(),
    })
}
