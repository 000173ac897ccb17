//! Veridia API client
//!
//! Client side of the Veridia recruitment portal API: a persisted session
//! (tokens plus cached user), a request pipeline that attaches the bearer
//! token to every call, and a controller that refreshes the access token on
//! 401 and replays the request once.

mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod refresh;
pub mod session;
pub mod store;
pub mod types;

pub use api::{LOGIN_PATH, LOGOUT_PATH, REGISTER_PATH};
pub use client::{ApiClient, ApiClientBuilder};
pub use config::ClientConfig;
pub use error::ClientError;
pub use pipeline::{ApiRequest, FormPart, RequestBody, RetryContext};
pub use refresh::{RefreshState, TOKEN_REFRESH_PATH};
pub use session::{Navigator, Route, SessionState, TracingNavigator, bootstrap};
pub use store::{
    FileBackend, KeyValueBackend, KeyValueSessionStore, MemoryBackend, SessionStore,
    StoredSession,
};
pub use types::{
    AdminApplicationQuery, ApplicationQuery, ApplicationStatus, ApplicationSubmission,
    Credentials, Envelope, FileUpload, LoginData, RegisterRequest, SessionUser, StatusUpdate,
    TokenPair, UserType,
};
