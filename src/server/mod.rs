//! JSON API: task and research slots plus thin wrappers over third-party services.
//!
//! Every handler answers; failures become a `{success: false, error}`
//! envelope (or a fallback payload where the upstream is cosmetic).

mod crm;
mod mail;
mod tasks;
mod telegram;
mod weather;

pub use telegram::{CallbackAction, ChatAction, ChatActionLog};
pub use weather::wmo_condition;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::kv::KvStore;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub kv: Option<Arc<dyn KvStore>>,
    pub http: reqwest::Client,
    pub chat_log: Arc<Mutex<ChatActionLog>>,
}

impl AppState {
    pub fn new(config: Config, kv: Option<Arc<dyn KvStore>>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .build()?;
        Ok(Self {
            config: Arc::new(config),
            kv,
            http,
            chat_log: Arc::new(Mutex::new(ChatActionLog::default())),
        })
    }

    fn kv(&self) -> Result<&Arc<dyn KvStore>> {
        self.kv.as_ref().ok_or(Error::NotConfigured("KV"))
    }
}

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

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Error::EmptyTitle => StatusCode::BAD_REQUEST,
            Error::UnknownTask(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", err);
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    success: bool,
    error: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorEnvelope {
            success: false,
            error: &self.message,
        });
        (self.status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct Health {
    success: bool,
    service: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        success: true,
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tasks", get(tasks::get_tasks).post(tasks::save_tasks))
        .route(
            "/api/research",
            get(tasks::get_research).post(tasks::save_research),
        )
        .route("/api/weather", get(weather::current))
        .route("/api/crm/contacts", get(crm::contacts))
        .route("/api/mail", get(mail::inbox))
        .route(
            "/api/telegram/send",
            get(telegram::send_ready).post(telegram::send),
        )
        .route("/api/telegram/webhook", post(telegram::webhook))
        .route(
            "/api/telegram/poll",
            get(telegram::poll).post(telegram::record),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("taskdash API listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
