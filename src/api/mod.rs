//! HTTP client for the TaskMate REST API. Each resource is a trait
//! implemented on [`ApiClient`].

mod auth;
mod members;
mod projects;
mod tasks;

pub use auth::{AuthService, Registration};
pub use members::MemberService;
pub use projects::ProjectService;
pub use tasks::TaskService;

use crate::config::Config;
use crate::errors::ApiError;
use crate::session::Session;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// Bodies may carry `message` and `error` together; `message` wins.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn text(self) -> Option<String> {
        self.message.or(self.error).or(self.msg)
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<Session>,
    cancel: CancellationToken,
}

impl ApiClient {
    pub fn new(config: &Config, session: Arc<Session>) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("taskmate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Transport)?;
        Ok(Self::with_http(http, &config.api_url, session))
    }

    pub fn with_http(http: reqwest::Client, base_url: &str, session: Arc<Session>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            cancel: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// A handle whose in-flight requests end with [`ApiError::Cancelled`]
    /// once `token` is cancelled. Screens hand out one per lifetime.
    pub fn scoped(&self, token: &CancellationToken) -> Self {
        Self {
            cancel: token.child_token(),
            ..self.clone()
        }
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request with the bearer token attached when a session exists.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let request = builder.build().map_err(ApiError::Transport)?;
        let method = request.method().clone();
        let url = request.url().path().to_string();
        debug!(%method, path = %url, "api request");

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ApiError::Cancelled),
            res = self.http.execute(request) => res.map_err(ApiError::Transport)?,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let mut parsed = ErrorBody::parse(&body);
        let code = parsed.code.take();
        warn!(%method, path = %url, status = status.as_u16(), "api request failed");
        Err(ApiError::from_status(status, parsed.text(), code))
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.execute(builder).await?;
        let text = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ApiError::Cancelled),
            res = response.text() => res.map_err(ApiError::Transport)?,
        };
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }

    pub(crate) async fn send_text(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let response = self.execute(builder).await?;
        response.text().await.map_err(ApiError::Transport)
    }

    pub(crate) async fn send_empty(&self, builder: RequestBuilder) -> Result<(), ApiError> {
        self.execute(builder).await.map(|_| ())
    }
}
