//! Profile and shared lookup endpoints

use crate::client::ApiClient;
use crate::error::ClientError;
use crate::pipeline::{ApiRequest, FormPart};
use crate::types::Envelope;
use serde_json::Value;
use tracing::debug;

impl ApiClient {
    /// Fetch the profile and fold it into the cached session user
    pub async fn profile(&self) -> Result<Envelope, ClientError> {
        let envelope: Envelope = self.execute(&ApiRequest::get("/profile/")).await?;

        if envelope.success {
            if let (Some(Value::Object(profile)), Some(session)) =
                (envelope.payload(), self.store().read())
            {
                let mut user = session.user;
                user.merge_profile(profile);
                if self.store().replace_user(&user) {
                    debug!("Cached user updated from profile");
                }
            }
        }

        Ok(envelope)
    }

    pub async fn update_profile(&self, changes: &Value) -> Result<Envelope, ClientError> {
        let request = ApiRequest::patch("/profile/").json(changes)?;
        self.execute(&request).await
    }

    /// Profile update carrying files, e.g. a new profile picture
    pub async fn update_profile_multipart(
        &self,
        parts: Vec<FormPart>,
    ) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::patch("/profile/").multipart(parts)).await
    }

    pub async fn departments(&self) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::get("/departments/")).await
    }

    pub async fn positions(&self) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::get("/positions/")).await
    }
}
