//! Session credentials and the HTTP Basic header derived from them.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Encode `username:password` for the `Basic` scheme.
pub fn basic_auth_value(username: &str, password: &str) -> String {
    let token = STANDARD.encode(format!("{}:{}", username, password));
    format!("Basic {}", token)
}

/// Shared handle over the current credentials.
///
/// Clones observe the same values, so a change made through any handle is
/// seen by the next outbound request of every component.
#[derive(Clone, Default)]
pub struct CredentialStore {
    inner: Arc<RwLock<Credentials>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(username: &str, password: &str) -> Self {
        let store = Self::new();
        store.set_username(username);
        store.set_password(password);
        store
    }

    pub fn set_username(&self, username: &str) {
        self.write().username = username.to_string();
        log(
            Level::Debug,
            Domain::Auth,
            "username_set",
            obj(&[("username", v_str(username))]),
        );
    }

    pub fn set_password(&self, password: &str) {
        self.write().password = password.to_string();
        log(Level::Debug, Domain::Auth, "password_set", obj(&[]));
    }

    pub fn snapshot(&self) -> Credentials {
        self.read().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.snapshot().is_complete()
    }

    /// Value for the `Authorization` header, computed from the latest input.
    pub fn auth_header_value(&self) -> String {
        let creds = self.snapshot();
        basic_auth_value(&creds.username, &creds.password)
    }

    fn read(&self) -> RwLockReadGuard<'_, Credentials> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Credentials> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialStore").field(&self.snapshot()).finish()
    }
}
