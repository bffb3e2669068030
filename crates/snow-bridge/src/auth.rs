//! Inbound request authentication.

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Authentication mode that enables HTTP Basic checks.
pub const BASIC_MODE: &str = "basic";

/// Realm announced in the `WWW-Authenticate` challenge.
pub const REALM: &str = "SNOW";

/// Outcome of checking a request's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Request may proceed
    Allowed,
    /// No credentials supplied; client should be challenged
    Challenge,
    /// Credentials supplied but wrong
    Forbidden,
}

/// Build the `Basic <base64(user:password)>` token.
#[must_use]
pub fn basic_token(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

/// Whether the configured mode turns on Basic authentication.
#[must_use]
pub fn basic_enabled(auth_mode: &str) -> bool {
    auth_mode.eq_ignore_ascii_case(BASIC_MODE)
}

/// Check the `Authorization` header value against the configured credentials.
///
/// The header passes when it contains the expected token, compared without
/// regard to case.
#[must_use]
pub fn authenticate(
    auth_mode: &str,
    username: &str,
    password: &str,
    authorization: Option<&str>,
) -> AuthOutcome {
    if !basic_enabled(auth_mode) {
        return AuthOutcome::Allowed;
    }

    let Some(provided) = authorization.filter(|h| !h.is_empty()) else {
        return AuthOutcome::Challenge;
    };

    let required = basic_token(username, password).to_lowercase();
    if provided.to_lowercase().contains(&required) {
        AuthOutcome::Allowed
    } else {
        AuthOutcome::Forbidden
    }
}
