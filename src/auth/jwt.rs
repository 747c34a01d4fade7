//! Session verification for caller bearer tokens.
//!
//! The algorithm is configured once. Its family decides how the configured
//! key material is parsed:
//!
//! | Family | Algorithms | Key material |
//! |--------|------------|--------------|
//! | HMAC | `HS256`, `HS384`, `HS512` | raw shared secret |
//! | RSA | `RS*`, `PS*` | PEM public key, or PKCS#1/PKCS#8 private key |
//! | EC | `ES256`, `ES384` | PEM public key, or SEC1/PKCS#8 private key |
//! | Ed | `EdDSA` | PEM public key |
//!
//! A private key is reduced to its public half at startup. EdDSA private
//! keys are rejected.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use p256::pkcs8::DecodePrivateKey as _;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey as _;
use rsa::traits::PublicKeyParts as _;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::JwtConfig;
use crate::{Error, Result};

use super::strip_bearer;

/// How key material is interpreted for an algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFamily {
    /// Shared secret.
    Hmac,
    /// RSA public key.
    Rsa,
    /// Elliptic curve public key.
    Ec,
    /// Edwards curve public key.
    Ed,
}

impl KeyFamily {
    /// Returns the family of an algorithm.
    #[must_use]
    pub const fn of(alg: Algorithm) -> Self {
        match alg {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Self::Hmac,
            Algorithm::ES256 | Algorithm::ES384 => Self::Ec,
            Algorithm::EdDSA => Self::Ed,
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Self::Rsa,
        }
    }

    /// Parses key material for `alg`, which must belong to this family.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the PEM cannot be parsed, is a key
    /// for another curve, or is an EdDSA private key.
    pub fn decoding_key(self, alg: Algorithm, material: &str) -> Result<DecodingKey> {
        let private = pem_label(material).is_some_and(|label| label.ends_with("PRIVATE KEY"));
        let pem = material.as_bytes();
        let key = match (self, private) {
            (Self::Hmac, _) => return Ok(DecodingKey::from_secret(pem)),
            (Self::Rsa, false) => DecodingKey::from_rsa_pem(pem),
            (Self::Ec, false) => DecodingKey::from_ec_pem(pem),
            (Self::Ed, false) => DecodingKey::from_ed_pem(pem),
            (Self::Rsa, true) => return rsa_public_half(material),
            (Self::Ec, true) => return ec_public_half(alg, material),
            (Self::Ed, true) => {
                return Err(Error::InvalidInput(
                    "EdDSA private keys are not supported, configure the public key".to_string(),
                ));
            },
        };
        key.map_err(|e| Error::InvalidInput(format!("invalid {self:?} public key: {e}")))
    }
}

/// Returns the label of the first PEM block, e.g. `RSA PRIVATE KEY`.
fn pem_label(material: &str) -> Option<&str> {
    let rest = material.trim_start().strip_prefix("-----BEGIN ")?;
    rest.split_once("-----").map(|(label, _)| label)
}

fn rsa_public_half(material: &str) -> Result<DecodingKey> {
    let private = RsaPrivateKey::from_pkcs1_pem(material)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(material))
        .map_err(|e| Error::InvalidInput(format!("invalid Rsa private key: {e}")))?;
    Ok(DecodingKey::from_rsa_raw_components(
        &private.n().to_bytes_be(),
        &private.e().to_bytes_be(),
    ))
}

fn ec_public_half(alg: Algorithm, material: &str) -> Result<DecodingKey> {
    let invalid = |e: &dyn fmt::Display| {
        Error::InvalidInput(format!("invalid Ec private key for {alg:?}: {e}"))
    };
    let sec1 = match alg {
        Algorithm::ES384 => p384::SecretKey::from_sec1_pem(material)
            .or_else(|_| p384::SecretKey::from_pkcs8_pem(material))
            .map_err(|e| invalid(&e))?
            .public_key()
            .to_sec1_bytes(),
        _ => p256::SecretKey::from_sec1_pem(material)
            .or_else(|_| p256::SecretKey::from_pkcs8_pem(material))
            .map_err(|e| invalid(&e))?
            .public_key()
            .to_sec1_bytes(),
    };
    Ok(DecodingKey::from_ec_der(&sec1))
}

/// Claims the gateway reads from caller tokens.
#[derive(Debug, Deserialize)]
struct ScopeClaims {
    #[serde(default)]
    scope: Option<Vec<String>>,
    #[serde(default)]
    user_id: Option<String>,
}

/// The outcome of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Whether the token carries the admin scope.
    pub is_admin: bool,
    /// Scopes granted to the token.
    pub scopes: Vec<String>,
    /// The `user_id` claim, absent for client tokens.
    pub user_id: Option<String>,
}

/// Verifies caller bearer tokens.
#[derive(Clone)]
pub struct SessionVerifier {
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
    family: KeyFamily,
    admin_scope: String,
}

impl fmt::Debug for SessionVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionVerifier")
            .field("family", &self.family)
            .field("validation", &self.validation)
            .field("admin_scope", &self.admin_scope)
            .finish_non_exhaustive()
    }
}

impl SessionVerifier {
    /// Builds a verifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the algorithm is unknown or the key
    /// material does not parse for its family.
    pub fn new(config: &JwtConfig, admin_scope: impl Into<String>) -> Result<Self> {
        let alg = Algorithm::from_str(&config.alg)
            .map_err(|_| Error::InvalidInput(format!("invalid jwt alg '{}'", config.alg)))?;
        let family = KeyFamily::of(alg);
        let decoding_key = Arc::new(family.decoding_key(alg, config.secret.expose_secret())?);

        let mut validation = Validation::new(alg);
        validation.validate_exp = true;
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        // Identity provider tokens always carry `aud`; only check it when asked to.
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Ok(Self {
            decoding_key,
            validation,
            family,
            admin_scope: admin_scope.into(),
        })
    }

    /// Returns the key family selected at construction.
    #[must_use]
    pub const fn family(&self) -> KeyFamily {
        self.family
    }

    /// Verifies an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedToken`] if the header is empty or the token is not
    ///   three dot-separated segments
    /// - [`Error::Unauthorized`] on a bad signature, wrong algorithm, expired
    ///   token or missing `scope` claim
    pub fn verify_session(&self, header: &str) -> Result<Session> {
        if header.trim().is_empty() {
            return Err(Error::MalformedToken(
                "missing authorization header".to_string(),
            ));
        }

        let token = strip_bearer(header);
        if token.split('.').count() != 3 {
            return Err(Error::MalformedToken("unknown token format".to_string()));
        }

        let data = decode::<ScopeClaims>(token, &self.decoding_key, &self.validation).map_err(
            |e| {
                tracing::warn!(error = %e, "JWT validation failed");
                match e.kind() {
                    ErrorKind::InvalidSignature => {
                        Error::Unauthorized("JWT : invalid signature".to_string())
                    },
                    _ => Error::Unauthorized(e.to_string()),
                }
            },
        )?;

        let scopes = data
            .claims
            .scope
            .ok_or_else(|| Error::Unauthorized("unexpected token claims".to_string()))?;
        let is_admin = scopes.iter().any(|scope| scope == &self.admin_scope);

        tracing::debug!(is_admin, scopes = ?scopes, "JWT validated successfully");

        Ok(Session {
            is_admin,
            scopes,
            user_id: data.claims.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use secrecy::SecretString;
    use serde_json::json;
    use test_case::test_case;

    const SECRET: &str = "a-very-long-secret-key-that-is-at-least-32-chars";

    fn hs256_config() -> JwtConfig {
        JwtConfig {
            alg: "HS256".to_string(),
            secret: SecretString::from(SECRET.to_string()),
            issuer: None,
            audience: None,
        }
    }

    fn token(claims: &serde_json::Value, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn exp() -> i64 {
        (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp()
    }

    fn verifier() -> SessionVerifier {
        SessionVerifier::new(&hs256_config(), "cloud_controller.admin").unwrap()
    }

    #[test]
    fn test_admin_scope_detected() {
        let jwt = token(
            &json!({
                "user_id": "u1",
                "scope": ["openid", "cloud_controller.admin"],
                "aud": ["cloud_controller"],
                "exp": exp(),
            }),
            SECRET,
        );
        let session = verifier().verify_session(&format!("Bearer {jwt}")).unwrap();
        assert!(session.is_admin);
        assert_eq!(session.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_regular_user() {
        let jwt = token(
            &json!({"user_id": "u1", "scope": ["cloud_controller.read"], "exp": exp()}),
            SECRET,
        );
        let session = verifier().verify_session(&format!("bearer {jwt}")).unwrap();
        assert!(!session.is_admin);
        assert_eq!(session.scopes, vec!["cloud_controller.read".to_string()]);
    }

    #[test]
    fn test_wrong_secret_is_invalid_signature() {
        let jwt = token(
            &json!({"scope": [], "exp": exp()}),
            "a-different-long-secret-key-that-is-32-chars",
        );
        let err = verifier()
            .verify_session(&format!("Bearer {jwt}"))
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(ref msg) if msg == "JWT : invalid signature"));
    }

    #[test]
    fn test_missing_scope_claim() {
        let jwt = token(&json!({"user_id": "u1", "exp": exp()}), SECRET);
        let err = verifier()
            .verify_session(&format!("Bearer {jwt}"))
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(ref msg) if msg == "unexpected token claims"));
    }

    #[test]
    fn test_expired_token() {
        let expired = (chrono::Utc::now() - chrono::Duration::hours(1)).timestamp();
        let jwt = token(&json!({"scope": [], "exp": expired}), SECRET);
        assert!(matches!(
            verifier().verify_session(&format!("Bearer {jwt}")),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test]
    fn test_algorithm_mismatch() {
        let jwt = encode(
            &Header::new(Algorithm::HS512),
            &json!({"scope": [], "exp": exp()}),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            verifier().verify_session(&format!("Bearer {jwt}")),
            Err(Error::Unauthorized(_))
        ));
    }

    #[test_case("" ; "empty header")]
    #[test_case("Bearer not-a-jwt" ; "one segment")]
    #[test_case("Bearer a.b" ; "two segments")]
    fn test_malformed_header(header: &str) {
        assert!(matches!(
            verifier().verify_session(header),
            Err(Error::MalformedToken(_))
        ));
    }

    #[test]
    fn test_issuer_validation() {
        let mut config = hs256_config();
        config.issuer = Some("https://uaa.example.com/oauth/token".to_string());
        let verifier = SessionVerifier::new(&config, "cloud_controller.admin").unwrap();

        let wrong = token(&json!({"scope": [], "exp": exp(), "iss": "elsewhere"}), SECRET);
        assert!(verifier.verify_session(&wrong).is_err());

        let right = token(
            &json!({"scope": [], "exp": exp(), "iss": "https://uaa.example.com/oauth/token"}),
            SECRET,
        );
        assert!(verifier.verify_session(&right).is_ok());
    }

    #[test_case(Algorithm::HS384, KeyFamily::Hmac)]
    #[test_case(Algorithm::RS256, KeyFamily::Rsa)]
    #[test_case(Algorithm::PS512, KeyFamily::Rsa)]
    #[test_case(Algorithm::ES256, KeyFamily::Ec)]
    #[test_case(Algorithm::EdDSA, KeyFamily::Ed)]
    fn test_key_family(alg: Algorithm, family: KeyFamily) {
        assert_eq!(KeyFamily::of(alg), family);
    }

    #[test]
    fn test_asymmetric_family_rejects_garbage_key() {
        let config = JwtConfig {
            alg: "RS256".to_string(),
            secret: SecretString::from("not a pem".to_string()),
            issuer: None,
            audience: None,
        };
        assert!(matches!(
            SessionVerifier::new(&config, "cloud_controller.admin"),
            Err(Error::InvalidInput(_))
        ));
    }

    const RSA_PKCS1: &str = include_str!("testdata/rsa_pkcs1.pem");
    const RSA_PKCS8: &str = include_str!("testdata/rsa_pkcs8.pem");
    const RSA_PUBLIC: &str = include_str!("testdata/rsa_public.pem");
    const EC256_SEC1: &str = include_str!("testdata/ec256_sec1.pem");
    const EC256_PKCS8: &str = include_str!("testdata/ec256_pkcs8.pem");
    const EC256_PUBLIC: &str = include_str!("testdata/ec256_public.pem");
    const EC384_SEC1: &str = include_str!("testdata/ec384_sec1.pem");
    const EC384_PKCS8: &str = include_str!("testdata/ec384_pkcs8.pem");
    const ED_PRIVATE: &str = include_str!("testdata/ed_private.pem");

    fn asymmetric_config(alg: &str, key: &str) -> JwtConfig {
        JwtConfig {
            alg: alg.to_string(),
            secret: SecretString::from(key.to_string()),
            issuer: None,
            audience: None,
        }
    }

    fn signed(alg: Algorithm, key: EncodingKey) -> String {
        let claims = json!({"user_id": "u1", "scope": ["cloud_controller.admin"], "exp": exp()});
        encode(&Header::new(alg), &claims, &key).unwrap()
    }

    #[test_case("RS256", RSA_PUBLIC ; "rs256 public key")]
    #[test_case("RS256", RSA_PKCS1 ; "rs256 pkcs1 private key")]
    #[test_case("RS256", RSA_PKCS8 ; "rs256 pkcs8 private key")]
    #[test_case("PS384", RSA_PKCS1 ; "ps384 private key")]
    fn test_rsa_signature_verified(alg: &str, configured: &str) {
        let verifier =
            SessionVerifier::new(&asymmetric_config(alg, configured), "cloud_controller.admin")
                .unwrap();
        let jwt = signed(
            Algorithm::from_str(alg).unwrap(),
            EncodingKey::from_rsa_pem(RSA_PKCS1.as_bytes()).unwrap(),
        );

        let session = verifier.verify_session(&format!("Bearer {jwt}")).unwrap();
        assert!(session.is_admin);
        assert_eq!(session.user_id.as_deref(), Some("u1"));
    }

    #[test_case("ES256", EC256_PUBLIC, EC256_PKCS8 ; "es256 public key")]
    #[test_case("ES256", EC256_SEC1, EC256_PKCS8 ; "es256 sec1 private key")]
    #[test_case("ES256", EC256_PKCS8, EC256_PKCS8 ; "es256 pkcs8 private key")]
    #[test_case("ES384", EC384_SEC1, EC384_PKCS8 ; "es384 sec1 private key")]
    #[test_case("ES384", EC384_PKCS8, EC384_PKCS8 ; "es384 pkcs8 private key")]
    fn test_ec_signature_verified(alg: &str, configured: &str, signing: &str) {
        let verifier =
            SessionVerifier::new(&asymmetric_config(alg, configured), "cloud_controller.admin")
                .unwrap();
        let jwt = signed(
            Algorithm::from_str(alg).unwrap(),
            EncodingKey::from_ec_pem(signing.as_bytes()).unwrap(),
        );

        assert!(verifier.verify_session(&format!("Bearer {jwt}")).unwrap().is_admin);
    }

    #[test]
    fn test_tokens_signed_elsewhere_rejected() {
        let verifier =
            SessionVerifier::new(&asymmetric_config("RS256", RSA_PKCS1), "cloud_controller.admin")
                .unwrap();
        let jwt = token(&json!({"scope": [], "exp": exp()}), SECRET);
        assert!(matches!(
            verifier.verify_session(&format!("Bearer {jwt}")),
            Err(Error::Unauthorized(_))
        ));

        let forged = signed(
            Algorithm::ES256,
            EncodingKey::from_ec_pem(EC256_PKCS8.as_bytes()).unwrap(),
        );
        assert!(verifier.verify_session(&format!("Bearer {forged}")).is_err());
    }

    #[test_case("ES256", EC384_PKCS8 ; "p384 key for es256")]
    #[test_case("ES384", EC256_SEC1 ; "p256 key for es384")]
    #[test_case("EdDSA", ED_PRIVATE ; "ed private key")]
    #[test_case("RS256", EC256_PKCS8 ; "ec key for rsa")]
    fn test_unusable_private_key_rejected_at_startup(alg: &str, configured: &str) {
        assert!(matches!(
            SessionVerifier::new(&asymmetric_config(alg, configured), "cloud_controller.admin"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_unknown_algorithm() {
        let mut config = hs256_config();
        config.alg = "none".to_string();
        assert!(SessionVerifier::new(&config, "cloud_controller.admin").is_err());
    }
}
