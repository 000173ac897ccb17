//! Session state as consumed by the UI shell

use crate::store::SessionStore;
use crate::types::{SessionUser, UserType};
use std::fmt;
use tracing::{info, warn};

/// Top-level screens the shell can route to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Unauthenticated entry point
    Login,
    ApplicantDashboard,
    AdminDashboard,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => f.write_str("login"),
            Self::ApplicantDashboard => f.write_str("applicant dashboard"),
            Self::AdminDashboard => f.write_str("admin dashboard"),
        }
    }
}

/// Client-side navigation hook, invoked when the session is torn down
#[cfg_attr(test, mockall::automock)]
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// Navigator that only records the redirect in the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNavigator;

impl Navigator for TracingNavigator {
    fn navigate(&self, route: Route) {
        match route {
            Route::Login => warn!("Session ended, navigating to {route}"),
            _ => info!("Navigating to {route}"),
        }
    }
}

/// Whether a user is logged in, and as what
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { user: SessionUser, role: UserType },
}

impl SessionState {
    pub fn authenticated(user: SessionUser) -> Self {
        let role = user.user_type;
        Self::Authenticated { user, role }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn role(&self) -> Option<UserType> {
        match self {
            Self::Authenticated { role, .. } => Some(*role),
            Self::Unauthenticated => None,
        }
    }

    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            Self::Authenticated { user, .. } => Some(user),
            Self::Unauthenticated => None,
        }
    }

    /// Screen to show first for this state
    pub fn entry_route(&self) -> Route {
        match self.role() {
            None => Route::Login,
            Some(UserType::Applicant) => Route::ApplicantDashboard,
            Some(UserType::Admin) => Route::AdminDashboard,
        }
    }
}

/// Derive the initial session from persisted state. No network access.
pub fn bootstrap(store: &dyn SessionStore) -> SessionState {
    match store.read() {
        Some(session) => SessionState::authenticated(session.user),
        None => SessionState::Unauthenticated,
    }
}
