//! Session-aware API client

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::pipeline::{ApiRequest, RequestPipeline, RetryContext};
use crate::refresh::{RefreshController, Renewal};
use crate::session::{self, Navigator, SessionState, TracingNavigator};
use crate::store::{KeyValueSessionStore, MemoryBackend, SessionStore};
use crate::types::Envelope;
use reqwest::{ClientBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Veridia API client.
///
/// Every call goes through the request pipeline, which attaches the stored
/// access token, and through the refresh controller when the backend answers
/// 401. Cloning is cheap and clones share the session.
#[derive(Clone)]
pub struct ApiClient {
    http: RequestPipeline,
    store: Arc<dyn SessionStore>,
    refresh: Arc<RefreshController>,
}

impl ApiClient {
    /// Create a new client with default configuration and an in-memory session
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }

    /// Session storage shared by this client
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Current session, derived from storage
    pub fn session(&self) -> SessionState {
        session::bootstrap(self.store.as_ref())
    }

    /// Send a request, refreshing the access token once on 401
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, ClientError> {
        self.send_with_context(request, RetryContext::new()).await
    }

    /// Send a request with explicit retry state
    pub async fn send_with_context(
        &self,
        request: &ApiRequest,
        mut ctx: RetryContext,
    ) -> Result<Response, ClientError> {
        let mut token = self.store.access_token();

        loop {
            let response = self.http.dispatch(request, token.as_deref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED || !ctx.can_refresh() {
                return Ok(response);
            }

            match self.refresh.renew(&self.http, token.as_deref()).await? {
                Renewal::Replay(access_token) => {
                    ctx.mark_retried();
                    debug!(path = %request.path, "Replaying request with renewed token");
                    token = Some(access_token);
                }
                Renewal::NoSession => return Ok(response),
            }
        }
    }

    /// Execute a request and handle common errors.
    ///
    /// A success status with no body reads as a successful envelope without
    /// data.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<Envelope<T>, ClientError> {
        let response = self.send(request).await?;
        let status = response.status();

        if status.is_success() {
            let body = response.bytes().await?;
            if status == StatusCode::NO_CONTENT || body.trim_ascii().is_empty() {
                return Ok(Envelope::no_content());
            }
            Ok(serde_json::from_slice(&body)?)
        } else {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(ClientError::from_status(status, message))
        }
    }

    /// Execute a form-style request whose error envelope is a normal answer.
    ///
    /// Any response whose body parses as an envelope is returned as-is,
    /// whatever its status. Refresh is not attempted.
    pub(crate) async fn execute_form<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<Envelope<T>, ClientError> {
        let response = self
            .send_with_context(request, RetryContext::exempt())
            .await?;
        let status = response.status();
        let body = response.bytes().await?;

        let status_error =
            || ClientError::from_status(status, String::from_utf8_lossy(&body).into_owned());

        match serde_json::from_slice::<Envelope<T>>(&body) {
            Ok(envelope) if status.is_success() || !envelope.success => Ok(envelope),
            Ok(_) => Err(status_error()),
            Err(_) if !status.is_success() => Err(status_error()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Builder for ApiClient
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    store: Option<Arc<dyn SessionStore>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl ApiClientBuilder {
    /// Start from a loaded configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut builder = Self::default()
            .base_url(config.base_url.clone())
            .user_agent(config.user_agent.clone());
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        builder
    }

    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Session storage; defaults to an in-memory store
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Navigation hook run when the session is torn down
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        let mut client_builder = ClientBuilder::new();

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        client_builder = client_builder.user_agent(
            self.user_agent
                .unwrap_or_else(|| ClientConfig::default().user_agent),
        );

        let client = client_builder.build()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(KeyValueSessionStore::new(MemoryBackend::new())));
        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(TracingNavigator));

        Ok(ApiClient {
            http: RequestPipeline::new(client, base_url),
            refresh: Arc::new(RefreshController::new(store.clone(), navigator)),
            store,
        })
    }
}
