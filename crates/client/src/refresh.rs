//! Refresh-and-retry controller
//!
//! On a 401 the client asks the controller for a usable access token. The
//! controller serialises refreshes: one refresh call is in flight at a time,
//! and a request that waited behind another refresh reuses its result instead
//! of spending the refresh token again.

use crate::error::ClientError;
use crate::pipeline::{ApiRequest, RequestPipeline};
use crate::session::{Navigator, Route};
use crate::store::SessionStore;
use crate::types::{RefreshTokenRequest, RefreshTokenResponse};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const TOKEN_REFRESH_PATH: &str = "/auth/token/refresh/";

/// Observable controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Normal,
    Refreshing,
}

/// Outcome of asking the controller to recover from a 401
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renewal {
    /// Replay the request with this access token
    Replay(String),
    /// No session to refresh; the 401 stands
    NoSession,
}

pub struct RefreshController {
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    slot: Mutex<()>,
    refreshing: AtomicBool,
    refresh_calls: AtomicU64,
}

/// Resets the state to `Normal` even if the refresh future is dropped
struct RefreshingGuard<'a>(&'a AtomicBool);

impl<'a> RefreshingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for RefreshingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RefreshController {
    pub fn new(store: Arc<dyn SessionStore>, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            store,
            navigator,
            slot: Mutex::new(()),
            refreshing: AtomicBool::new(false),
            refresh_calls: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> RefreshState {
        if self.refreshing.load(Ordering::SeqCst) {
            RefreshState::Refreshing
        } else {
            RefreshState::Normal
        }
    }

    /// Refresh calls issued since the controller was created
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Obtain a token to replay a request that was rejected while carrying
    /// `rejected_token`.
    ///
    /// Fails with [`ClientError::SessionExpired`] after tearing the session
    /// down when the refresh token is refused.
    pub async fn renew(
        &self,
        http: &RequestPipeline,
        rejected_token: Option<&str>,
    ) -> Result<Renewal, ClientError> {
        let _slot = self.slot.lock().await;

        let Some(session) = self.store.read() else {
            return match rejected_token {
                None => Ok(Renewal::NoSession),
                Some(_) => Err(ClientError::SessionExpired(
                    "session ended while the request was in flight".into(),
                )),
            };
        };

        if rejected_token != Some(session.tokens.access_token.as_str()) {
            debug!("Access token already renewed, replaying without refresh");
            return Ok(Renewal::Replay(session.tokens.access_token));
        }

        let refresh_token = session.tokens.refresh_token;
        let _state = RefreshingGuard::enter(&self.refreshing);
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        debug!("Refreshing access token");

        match self.request_access_token(http, &refresh_token).await {
            Ok(access_token) => {
                if self.store.replace_access_token(&refresh_token, &access_token) {
                    info!("Access token refreshed");
                    return Ok(Renewal::Replay(access_token));
                }
                // A logout or a new login won the race
                match self.store.read() {
                    Some(current) => Ok(Renewal::Replay(current.tokens.access_token)),
                    None => Err(ClientError::SessionExpired(
                        "session ended during token refresh".into(),
                    )),
                }
            }
            Err(e) => {
                warn!("Token refresh failed, ending session: {e}");
                if self.store.clear_if_refresh_token(&refresh_token) {
                    self.navigator.navigate(Route::Login);
                } else {
                    debug!("A newer session replaced the one that failed to refresh");
                }
                Err(ClientError::SessionExpired(e.to_string()))
            }
        }
    }

    async fn request_access_token(
        &self,
        http: &RequestPipeline,
        refresh_token: &str,
    ) -> Result<String, ClientError> {
        let request =
            ApiRequest::post(TOKEN_REFRESH_PATH).json(&RefreshTokenRequest { refresh_token })?;
        let response = http.dispatch(&request, None).await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            return Err(ClientError::from_status(status, message));
        }

        let body: RefreshTokenResponse = serde_json::from_slice(&response.bytes().await?)?;
        Ok(body.access_token)
    }
}
