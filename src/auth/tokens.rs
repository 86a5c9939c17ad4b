//! Stateless signer/verifier for access and refresh tokens.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AuthError;
use super::state::AuthConfig;
use super::users::{AuthenticatedUser, Role};

/// Claim set shared by both token kinds.
///
/// The kind is not encoded in the claims; it is enforced by which secret
/// signed the token, so possession of one secret cannot forge the other
/// kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub teacher_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
    pub jti: Uuid,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    /// Rebuild the request-context projection carried by the token.
    #[must_use]
    pub fn to_authenticated_user(&self) -> AuthenticatedUser {
        AuthenticatedUser {
            id: self.sub,
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            role: self.role,
            teacher_id: self.teacher_id,
            student_id: self.student_id,
        }
    }
}

pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
}

impl TokenService {
    #[must_use]
    pub fn new(
        access_secret: &SecretString,
        refresh_secret: &SecretString,
        config: &AuthConfig,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.expose_secret().as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.expose_secret().as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.expose_secret().as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.expose_secret().as_bytes()),
            access_ttl_seconds: config.access_ttl_seconds(),
            refresh_ttl_seconds: config.refresh_ttl_seconds(),
        }
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    pub fn issue_access(&self, user: &AuthenticatedUser, jti: Uuid) -> Result<String, AuthError> {
        self.sign(user, jti, self.access_ttl_seconds, &self.access_encoding)
    }

    pub fn issue_refresh(&self, user: &AuthenticatedUser, jti: Uuid) -> Result<String, AuthError> {
        self.sign(user, jti, self.refresh_ttl_seconds, &self.refresh_encoding)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, AuthError> {
        Self::verify(token, &self.access_decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, AuthError> {
        Self::verify(token, &self.refresh_decoding)
    }

    fn sign(
        &self,
        user: &AuthenticatedUser,
        jti: Uuid,
        ttl_seconds: i64,
        key: &EncodingKey,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            teacher_id: user.teacher_id,
            student_id: user.student_id,
            jti,
            iat: now,
            exp: now + ttl_seconds,
        };
        encode(&Header::default(), &claims, key)
            .map_err(|err| AuthError::Internal(anyhow::anyhow!("failed to sign token: {err}")))
    }

    fn verify(token: &str, key: &DecodingKey) -> Result<Claims, AuthError> {
        // No leeway: an expired token must fail deterministically.
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<Claims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}
