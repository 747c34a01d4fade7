//! Caller authentication and the gateway's own platform credential.
//!
//! - [`jwt`]: verifies caller bearer tokens (`verify_session`)
//! - [`user`]: reads the caller's user id from an already trusted token
//! - [`token`]: holds and refreshes the service credential used upstream

pub mod jwt;
pub mod token;
pub mod user;

pub use jwt::{KeyFamily, Session, SessionVerifier};
pub use token::{ClientCredentialsGrant, GrantedToken, TokenGrant, TokenManager};
pub use user::extract_user_id;

/// Strips a case-insensitive `Bearer ` prefix, returning the raw token.
///
/// Headers without a scheme are returned trimmed as-is.
#[must_use]
pub fn strip_bearer(header: &str) -> &str {
    let header = header.trim();
    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") => token.trim(),
        _ => header,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer a.b.c"), "a.b.c");
        assert_eq!(strip_bearer("bearer  a.b.c "), "a.b.c");
        assert_eq!(strip_bearer("a.b.c"), "a.b.c");
        assert_eq!(strip_bearer("Basic dXNlcg=="), "Basic dXNlcg==");
    }
}
