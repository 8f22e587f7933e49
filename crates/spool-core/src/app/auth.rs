//! Basic credentials for the metrics feed.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::domain::{Result, SchedulerError};

#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Parse an `Authorization: Basic <base64(user:pass)>` header value.
    pub fn from_header(value: &str) -> Result<Self> {
        let encoded = value
            .trim()
            .strip_prefix("Basic ")
            .ok_or(SchedulerError::Auth)?;
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|_| SchedulerError::Auth)?;
        let decoded = String::from_utf8(decoded).map_err(|_| SchedulerError::Auth)?;
        let (username, password) = decoded.split_once(':').ok_or(SchedulerError::Auth)?;
        Ok(Self::new(username, password))
    }
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Checks presented credentials against the configured pair.
///
/// With no configured pair every request is rejected.
#[derive(Clone, Default)]
pub struct MetricsAuth {
    expected: Option<BasicCredentials>,
}

impl MetricsAuth {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self {
            expected: username
                .zip(password)
                .map(|(u, p)| BasicCredentials::new(u, p)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.expected.is_some()
    }

    /// `Auth` on any mismatch, without telling which field was wrong.
    pub fn verify(&self, presented: &BasicCredentials) -> Result<()> {
        let Some(expected) = &self.expected else {
            return Err(SchedulerError::Auth);
        };
        // Both comparisons always run.
        let username_ok = constant_time_eq(&presented.username, &expected.username);
        let password_ok = constant_time_eq(&presented.password, &expected.password);
        if username_ok & password_ok {
            Ok(())
        } else {
            Err(SchedulerError::Auth)
        }
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();
    if a_bytes.len() != b_bytes.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a_bytes.iter().zip(b_bytes) {
        diff |= x ^ y;
    }
    diff == 0
}
