//! Handshake credential verification.
//!
//! The Identity service signs an HS256 token carrying the user id, role and
//! school id. The gateway only needs the decoded claims; anything beyond that
//! (permissions, school membership) stays with the issuing service.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Claims carried by a session credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(default, alias = "sub", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_id: Option<String>,
    pub exp: u64,
}

/// Identity resolved from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub school_id: Option<String>,
}

impl From<Claims> for AuthenticatedUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.id.filter(|id| !id.is_empty()),
            role: claims.role,
            school_id: claims.school_id,
        }
    }
}

pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<AuthenticatedUser>;
}

/// Verifies HS256 tokens against a shared secret.
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<AuthenticatedUser> {
        if token.is_empty() {
            return Err(GameError::MissingCredential);
        }

        decode::<Claims>(token, &self.key, &self.validation)
            .map(|data| data.claims.into())
            .map_err(|e| GameError::invalid_credential(e.to_string()))
    }
}

/// Pulls the bearer token out of an `Authorization` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
