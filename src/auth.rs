use std::fmt;

use axum::http::HeaderValue;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GatewayError;

/// Claims
///
/// The payload the auth service signs into every token it issues. Produced only by a
/// successful verification, stored on the request for its lifetime and then dropped.
/// The gateway never forwards these fields itself; upstreams see the original
/// `Authorization` header and decode it on their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Opaque user identifier. The auth service writes it as `id`; `sub` is accepted too.
    #[serde(alias = "sub")]
    pub id: SubjectId,
    pub email: String,
    pub role: Role,
    /// Issued At (iat), seconds since the epoch.
    #[serde(default)]
    pub iat: u64,
    /// Expiration Time (exp), seconds since the epoch. Always validated.
    pub exp: u64,
}

/// SubjectId
///
/// User ids are numeric for database-backed accounts but the gateway does not care;
/// anything the issuer wrote is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubjectId {
    Numeric(i64),
    Text(String),
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectId::Numeric(id) => write!(f, "{id}"),
            SubjectId::Text(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Participant,
    Organizer,
    Admin,
    /// Roles this gateway does not know about. Authorization is the backends' concern.
    #[serde(other)]
    Other,
}

/// AuthError
///
/// The two internal failure kinds of the verifier. Both render as an opaque 401, but they
/// stay distinct so callers in code (and tests) can tell "no credential" from "bad credential".
#[derive(Debug, Error)]
pub enum AuthError {
    /// Header missing, not valid ASCII, not the `Bearer` scheme, or an empty token.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Signature mismatch, malformed payload, or expired.
    #[error("invalid or expired token: {0}")]
    InvalidOrExpiredToken(#[source] jsonwebtoken::errors::Error),
}

impl AuthError {
    pub fn is_expired(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidOrExpiredToken(e) if matches!(e.kind(), ErrorKind::ExpiredSignature)
        )
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthenticationRequired => GatewayError::AuthenticationRequired,
            AuthError::InvalidOrExpiredToken(_) => GatewayError::InvalidOrExpiredToken,
        }
    }
}

/// TokenVerifier
///
/// Holds the decoding key and validation rules, built once from the shared secret at
/// startup and shared read-only by every request.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is mandatory and checked to the second.
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// verify_header
    ///
    /// Full check of a raw `Authorization` header value: scheme parsing first, then
    /// signature and expiry. Parsing failures never reach the cryptographic step.
    pub fn verify_header(&self, header: Option<&HeaderValue>) -> Result<Claims, AuthError> {
        let token = extract_bearer(header).ok_or(AuthError::AuthenticationRequired)?;
        self.verify(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(AuthError::InvalidOrExpiredToken)
    }
}

/// Splits `Bearer <token>` on the first space. Any other scheme, extra segments
/// or an empty token yield `None`.
pub fn extract_bearer(header: Option<&HeaderValue>) -> Option<&str> {
    let raw = header?.to_str().ok()?;
    let (scheme, token) = raw.split_once(' ')?;
    if scheme != "Bearer" || token.is_empty() || token.contains(' ') {
        return None;
    }
    Some(token)
}
