//! Admin console endpoints

use crate::client::ApiClient;
use crate::error::ClientError;
use crate::pipeline::ApiRequest;
use crate::types::{AdminApplicationQuery, Envelope, StatusUpdate};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
struct ActivityQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u32>,
}

impl ApiClient {
    pub async fn admin_dashboard_stats(&self) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::get("/admin/dashboard/stats/")).await
    }

    pub async fn admin_applications(
        &self,
        query: &AdminApplicationQuery,
    ) -> Result<Envelope, ClientError> {
        let request = ApiRequest::get("/admin/applications/").query(query)?;
        self.execute(&request).await
    }

    pub async fn admin_application(&self, id: u64) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::get(format!("/admin/applications/{id}/"))).await
    }

    /// Partial update of an application's fields
    pub async fn update_application(
        &self,
        id: u64,
        changes: &Value,
    ) -> Result<Envelope, ClientError> {
        let request = ApiRequest::patch(format!("/admin/applications/{id}/")).json(changes)?;
        self.execute(&request).await
    }

    pub async fn update_application_status(
        &self,
        id: u64,
        update: &StatusUpdate,
    ) -> Result<Envelope, ClientError> {
        let request = ApiRequest::patch(format!("/admin/applications/{id}/status/")).json(update)?;
        self.execute(&request).await
    }

    pub async fn delete_application(&self, id: u64) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::delete(format!("/admin/applications/{id}/"))).await
    }

    /// Server-computed analytics aggregates, passed through untouched
    pub async fn analytics(&self) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::get("/admin/analytics/")).await
    }

    pub async fn recent_activity(&self, limit: Option<u32>) -> Result<Envelope, ClientError> {
        let request = ApiRequest::get("/admin/activity/").query(&ActivityQuery { limit })?;
        self.execute(&request).await
    }

    pub async fn upcoming_interviews(&self) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::get("/admin/interviews/upcoming/")).await
    }
}
