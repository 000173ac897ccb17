//! Persistent session storage
//!
//! A session is three raw keys on a key-value backend: the access token, the
//! refresh token and the JSON-encoded cached user. The keys only mean
//! something together; `read` treats any partial or unparseable state as an
//! absent session and wipes it.

mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::error::ClientError;
use crate::types::{SessionUser, TokenPair};
use std::io;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_KEY: &str = "user";

const SESSION_KEYS: [&str; 3] = [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY];

/// A complete session as read back from storage
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub tokens: TokenPair,
    pub user: SessionUser,
}

/// Session persistence used by the request pipeline and the refresh controller
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send + Sync {
    /// Persist tokens and user together
    fn save(&self, tokens: &TokenPair, user: &SessionUser) -> Result<(), ClientError>;

    /// Read the session back, clearing any partial or corrupt state
    fn read(&self) -> Option<StoredSession>;

    /// Remove every session key
    fn clear(&self);

    /// Current access token, if a complete session is stored
    fn access_token(&self) -> Option<String> {
        self.read().map(|session| session.tokens.access_token)
    }

    /// Overwrite the access token of the session that owns `refresh_token`.
    ///
    /// Returns `false` without writing when that session is no longer stored.
    fn replace_access_token(&self, refresh_token: &str, access_token: &str) -> bool;

    /// Clear the session only if it still owns `refresh_token`
    fn clear_if_refresh_token(&self, refresh_token: &str) -> bool;

    /// Replace the cached user of the stored session
    fn replace_user(&self, user: &SessionUser) -> bool;
}

/// Raw string key-value storage
pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;

    /// Write several keys at once. Backends that persist should do it in one go.
    fn set_many(&self, entries: &[(&str, &str)]) -> io::Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Remove several keys at once
    fn remove_many(&self, keys: &[&str]) -> io::Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// [`SessionStore`] over a [`KeyValueBackend`].
///
/// All multi-key operations run under one lock, so a reader never sees a
/// half-written session.
pub struct KeyValueSessionStore<B> {
    backend: B,
    lock: Mutex<()>,
}

impl<B: KeyValueBackend> KeyValueSessionStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wipe_locked(&self) -> bool {
        match self.backend.remove_many(&SESSION_KEYS) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to clear stored session: {e}");
                false
            }
        }
    }

    fn read_locked(&self) -> Option<StoredSession> {
        let access = self.backend.get(ACCESS_TOKEN_KEY);
        let refresh = self.backend.get(REFRESH_TOKEN_KEY);
        let user = self.backend.get(USER_KEY);

        if access.is_none() && refresh.is_none() && user.is_none() {
            return None;
        }

        let session = match (access, refresh, user) {
            (Some(access), Some(refresh), Some(user)) => {
                match serde_json::from_str::<SessionUser>(&user) {
                    Ok(user) => Some(StoredSession {
                        tokens: TokenPair::new(access, refresh),
                        user,
                    }),
                    Err(e) => {
                        warn!("Discarding cached session user: {e}");
                        None
                    }
                }
            }
            _ => {
                warn!("Discarding incomplete stored session");
                None
            }
        };

        if session.is_none() {
            self.wipe_locked();
        }
        session
    }
}

impl<B: KeyValueBackend> SessionStore for KeyValueSessionStore<B> {
    fn save(&self, tokens: &TokenPair, user: &SessionUser) -> Result<(), ClientError> {
        let user = serde_json::to_string(user)?;

        let _guard = self.guard();
        self.backend
            .set_many(&[
                (ACCESS_TOKEN_KEY, tokens.access_token.as_str()),
                (REFRESH_TOKEN_KEY, tokens.refresh_token.as_str()),
                (USER_KEY, user.as_str()),
            ])
            .map_err(|e| ClientError::Storage(format!("failed to save session: {e}")))?;
        debug!("Session saved");
        Ok(())
    }

    fn read(&self) -> Option<StoredSession> {
        let _guard = self.guard();
        self.read_locked()
    }

    fn clear(&self) {
        let _guard = self.guard();
        if self.wipe_locked() {
            debug!("Session cleared");
        }
    }

    fn replace_access_token(&self, refresh_token: &str, access_token: &str) -> bool {
        let _guard = self.guard();
        match self.read_locked() {
            Some(session) if session.tokens.refresh_token == refresh_token => {
                match self.backend.set(ACCESS_TOKEN_KEY, access_token) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to store refreshed access token: {e}");
                        false
                    }
                }
            }
            _ => false,
        }
    }

    fn clear_if_refresh_token(&self, refresh_token: &str) -> bool {
        let _guard = self.guard();
        match self.read_locked() {
            Some(session) if session.tokens.refresh_token == refresh_token => self.wipe_locked(),
            Some(_) => false,
            // Partial state was already wiped by the read
            None => true,
        }
    }

    fn replace_user(&self, user: &SessionUser) -> bool {
        let Ok(encoded) = serde_json::to_string(user) else {
            return false;
        };

        let _guard = self.guard();
        if self.read_locked().is_none() {
            return false;
        }
        match self.backend.set(USER_KEY, &encoded) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to update cached user: {e}");
                false
            }
        }
    }
}
