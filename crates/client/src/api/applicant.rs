//! Applicant-facing endpoints

use crate::client::ApiClient;
use crate::error::ClientError;
use crate::pipeline::{ApiRequest, FormPart};
use crate::types::{ApplicationQuery, ApplicationSubmission, Envelope};

impl ApiClient {
    pub async fn applicant_dashboard_stats(&self) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::get("/applicant/dashboard/stats/")).await
    }

    pub async fn applicant_applications(
        &self,
        query: &ApplicationQuery,
    ) -> Result<Envelope, ClientError> {
        let request = ApiRequest::get("/applicant/applications/").query(query)?;
        self.execute(&request).await
    }

    pub async fn applicant_application(&self, id: u64) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::get(format!("/applicant/applications/{id}/"))).await
    }

    /// Submit a new application as a multipart form with the resume attached
    pub async fn submit_application(
        &self,
        submission: &ApplicationSubmission,
    ) -> Result<Envelope, ClientError> {
        let mut parts = vec![
            FormPart::text("position", &submission.position),
            FormPart::text("department", &submission.department),
        ];
        parts.extend(
            submission
                .fields
                .iter()
                .map(|(name, value)| FormPart::text(name, value)),
        );
        parts.push(FormPart::file("resume", submission.resume.clone()));

        let request = ApiRequest::post("/applicant/applications/").multipart(parts);
        self.execute(&request).await
    }

    pub async fn withdraw_application(&self, id: u64) -> Result<Envelope, ClientError> {
        self.execute(&ApiRequest::delete(format!("/applicant/applications/{id}/"))).await
    }
}
