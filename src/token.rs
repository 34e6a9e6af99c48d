//! Shared-secret check for inbound webhook calls.

use subtle::ConstantTimeEq;

use crate::config::Settings;

/// Header that carries the shared secret.
pub const TOKEN_HEADER: &str = "x-ping-token";

/// Query parameter that carries the shared secret.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Returns true when either carrier holds the configured secret.
///
/// An empty configured secret rejects everything, including an empty token.
pub fn is_valid_token(
    settings: &Settings,
    header_token: Option<&str>,
    query_token: Option<&str>,
) -> bool {
    if settings.token.is_empty() {
        return false;
    }
    [header_token, query_token]
        .into_iter()
        .flatten()
        .any(|candidate| !candidate.is_empty() && token_eq(candidate, &settings.token))
}

fn token_eq(candidate: &str, expected: &str) -> bool {
    candidate.as_bytes().ct_eq(expected.as_bytes()).into()
}
