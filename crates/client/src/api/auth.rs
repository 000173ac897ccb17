//! Authentication API client methods

use crate::client::ApiClient;
use crate::error::ClientError;
use crate::pipeline::ApiRequest;
use crate::types::{Credentials, Envelope, LoginData, RefreshTokenRequest, RegisterRequest};
use serde_json::Value;
use tracing::{info, warn};

pub const LOGIN_PATH: &str = "/auth/login/";
pub const LOGOUT_PATH: &str = "/auth/logout/";
pub const REGISTER_PATH: &str = "/auth/register/";

impl ApiClient {
    /// Log in and persist the session on success.
    ///
    /// A rejected login comes back as `Ok` with the backend's error envelope;
    /// the store is left untouched in that case. Fails with
    /// [`ClientError::Storage`] if the session could not be persisted.
    pub async fn login(
        &self,
        credentials: &Credentials,
    ) -> Result<Envelope<LoginData>, ClientError> {
        let request = ApiRequest::post(LOGIN_PATH).json(credentials)?;
        let envelope: Envelope<LoginData> = self.execute_form(&request).await?;

        if envelope.success {
            if let Some(data) = &envelope.data {
                self.store().save(&data.tokens(), &data.user)?;
                info!(user_type = %data.user.user_type, "Logged in");
            }
        }

        Ok(envelope)
    }

    /// Tell the backend to revoke the refresh token, then clear the session.
    ///
    /// The backend call is best effort; its failure is only logged.
    pub async fn logout(&self) {
        if let Some(session) = self.store().read() {
            if let Err(e) = self.revoke(&session.tokens.refresh_token).await {
                warn!("Logout error: {e}");
            }
        }
        self.store().clear();
        info!("Logged out");
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), ClientError> {
        let request = ApiRequest::post(LOGOUT_PATH).json(&RefreshTokenRequest { refresh_token })?;
        self.execute::<Value>(&request).await.map(|_| ())
    }

    /// Create an account. Validation failures come back as the error envelope.
    pub async fn register(&self, request: &RegisterRequest) -> Result<Envelope, ClientError> {
        let request = ApiRequest::post(REGISTER_PATH).json(request)?;
        self.execute_form(&request).await
    }
}
