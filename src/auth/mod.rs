//! Resolves which session an inbound request acts for.
//!
//! With auth enabled the caller names its session in
//! `Authorization: Bearer <session-key>`; otherwise every request shares
//! [`DEFAULT_SESSION_KEY`].

use axum::http::{header::AUTHORIZATION, HeaderMap};


/// Session used when auth is disabled
pub const DEFAULT_SESSION_KEY: &str = "default";

/// Longest session key accepted from a header
const MAX_SESSION_KEY_LEN: usize = 256;

/// Session key for a request.
pub fn session_key(headers: &HeaderMap, auth_enabled: bool) -> Result<String, SessionKeyError> {
    if !auth_enabled {
        return Ok(DEFAULT_SESSION_KEY.to_string());
    }

    let value = headers
        .get(AUTHORIZATION)
        .ok_or(SessionKeyError::Missing)?
        .to_str()
        .map_err(|_| SessionKeyError::InvalidFormat)?;

    parse_bearer(value)
}

fn parse_bearer(value: &str) -> Result<String, SessionKeyError> {
    let (scheme, key) = value
        .split_once(' ')
        .ok_or(SessionKeyError::InvalidFormat)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(SessionKeyError::InvalidFormat);
    }

    let key = key.trim();
    if key.is_empty() {
        return Err(SessionKeyError::Empty);
    }
    if key.len() > MAX_SESSION_KEY_LEN || key.chars().any(char::is_whitespace) {
        return Err(SessionKeyError::InvalidFormat);
    }

    Ok(key.to_string())
}

/// Session key extraction errors
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SessionKeyError {
    /// No Authorization header
    Missing,
    /// Not `Bearer <key>`, or the key is malformed
    InvalidFormat,
    Empty,
}

impl std::fmt::Display for SessionKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKeyError::Missing => write!(f, "Session key not provided"),
            SessionKeyError::InvalidFormat => write!(f, "Invalid session key format"),
            SessionKeyError::Empty => write!(f, "Session key is empty"),
        }
    }
}

impl std::error::Error for SessionKeyError {}
