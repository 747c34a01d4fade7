//! User id extraction from an already verified bearer token.
//!
//! The session middleware has checked the signature by the time handlers
//! run, so this only base64-decodes the payload segment.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde::Deserialize;

use crate::{Error, Result};

use super::strip_bearer;

#[derive(Deserialize)]
struct UserClaim {
    #[serde(default)]
    user_id: String,
}

/// Reads the `user_id` claim from an `Authorization` header value.
///
/// # Errors
///
/// - [`Error::MalformedToken`] `"Invalid token"` if the token is not three
///   segments or the payload is not base64 JSON
/// - [`Error::MalformedToken`] `"missing user information"` if the claim is
///   absent or empty
pub fn extract_user_id(header: &str) -> Result<String> {
    let invalid = || Error::MalformedToken("Invalid token".to_string());

    let token = strip_bearer(header);
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) => payload.trim_end_matches('='),
        _ => return Err(invalid()),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|_| invalid())?;
    let claim: UserClaim = serde_json::from_slice(&bytes).map_err(|_| invalid())?;

    if claim.user_id.is_empty() {
        return Err(Error::MalformedToken(
            "missing user information".to_string(),
        ));
    }
    Ok(claim.user_id)
}
