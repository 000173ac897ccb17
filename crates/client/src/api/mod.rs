//! Endpoint wrappers. None of them touch tokens; the pipeline does.

mod admin;
mod applicant;
mod auth;
mod profile;

pub use auth::{LOGIN_PATH, LOGOUT_PATH, REGISTER_PATH};
