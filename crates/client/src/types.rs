//! Wire types shared by the session layer and the endpoint wrappers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Login credentials. Never persisted.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Access and refresh token as issued by the backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TokenPair { .. }")
    }
}

/// Kind of portal account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Applicant,
    Admin,
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applicant => f.write_str("applicant"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// Cached copy of the authenticated identity.
///
/// Only `user_type` is required; everything the backend sends beyond the
/// named fields is kept in `extra` so the cache round-trips unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub user_type: UserType,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl SessionUser {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    /// Merge a profile payload into the cached user.
    ///
    /// The profile endpoint omits `user_type`, so the cached role is kept.
    pub fn merge_profile(&mut self, profile: &Map<String, Value>) {
        for (key, value) in profile {
            match key.as_str() {
                "id" => self.id = value.as_i64().or(self.id),
                "email" => {
                    if let Some(email) = value.as_str() {
                        self.email = email.to_string();
                    }
                }
                "first_name" => {
                    if let Some(name) = value.as_str() {
                        self.first_name = name.to_string();
                    }
                }
                "last_name" => {
                    if let Some(name) = value.as_str() {
                        self.last_name = name.to_string();
                    }
                }
                "user_type" => {}
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

/// Error object inside the response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default, alias = "detail", skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Response envelope used by every backend endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T = Value> {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
}

/// Envelope as carried by non-2xx responses
pub type ErrorEnvelope = Envelope<Value>;

impl<T> Envelope<T> {
    /// `data`, falling back to `results` for list endpoints
    pub fn payload(&self) -> Option<&T> {
        self.data.as_ref().or(self.results.as_ref())
    }

    /// Successful answer without a body, e.g. `204 No Content` from a delete
    pub fn no_content() -> Self {
        Self {
            success: true,
            message: None,
            data: None,
            results: None,
            error: None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// Payload of a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginData {
    pub access_token: String,
    pub refresh_token: String,
    pub user: SessionUser,
}

impl LoginData {
    pub fn tokens(&self) -> TokenPair {
        TokenPair::new(&self.access_token, &self.refresh_token)
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshTokenResponse {
    pub access_token: String,
}

/// Account registration form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    pub user_type: UserType,
}

/// Application lifecycle states known to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplicationStatus {
    UnderReview,
    InterviewScheduled,
    Accepted,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnderReview => "under-review",
            Self::InterviewScheduled => "interview-scheduled",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "under-review" => Ok(Self::UnderReview),
            "interview-scheduled" => Ok(Self::InterviewScheduled),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown application status '{other}'")),
        }
    }
}

/// Filters for the applicant's own application list
#[derive(Debug, Clone, Default, Serialize)]
pub struct ApplicationQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

/// Filters for the admin application list
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdminApplicationQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApplicationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordering: Option<String>,
}

/// Body of the admin status transition endpoint
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub status: ApplicationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interview_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl StatusUpdate {
    pub fn new(status: ApplicationStatus) -> Self {
        Self {
            status,
            interview_date: None,
            notes: None,
            comment: None,
        }
    }
}

/// A file attached to a multipart form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// New job application, sent as a multipart form
#[derive(Debug, Clone)]
pub struct ApplicationSubmission {
    pub position: String,
    pub department: String,
    /// Optional form fields such as `experience`, `skills` or `cover_letter`
    pub fields: BTreeMap<String, String>,
    pub resume: FileUpload,
}
