//! Login, refresh rotation, logout, and registration orchestration.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::error::AuthError;
use super::ledger::{hash_refresh_token, NewSession, RotateOutcome, SessionLedger};
use super::lockout::LockoutStore;
use super::password::{check_password_policy, hash_password, verify_password};
use super::state::AuthConfig;
use super::tokens::TokenService;
use super::users::{
    normalize_email, AuthenticatedUser, CreateOutcome, CredentialStore, NewUser, Role,
};

/// Request metadata recorded on session ledger rows and used to key the
/// lockout store.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Lockout keys need a concrete ip even when the caller had none.
    #[must_use]
    fn lockout_ip(&self) -> &str {
        self.ip.as_deref().unwrap_or("unknown")
    }
}

/// Issued token pair. Access tokens are not tracked server-side; the
/// refresh token's lineage lives in the session ledger.
#[derive(Clone, Debug)]
pub struct Tokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub token_type: &'static str,
}

/// Registration payload after shape validation; privilege is enforced at
/// the HTTP boundary, not here.
#[derive(Clone, Debug)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    pub teacher_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct AuthEngine {
    users: Arc<dyn CredentialStore>,
    ledger: Arc<dyn SessionLedger>,
    lockout: Arc<dyn LockoutStore>,
    tokens: Arc<TokenService>,
    config: AuthConfig,
}

impl AuthEngine {
    #[must_use]
    pub fn new(
        users: Arc<dyn CredentialStore>,
        ledger: Arc<dyn SessionLedger>,
        lockout: Arc<dyn LockoutStore>,
        tokens: Arc<TokenService>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            ledger,
            lockout,
            tokens,
            config,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Authenticate an email/password pair.
    ///
    /// Unknown email and wrong password take the same failure path; both
    /// count against the (email, ip) lockout counter.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<Tokens, AuthError> {
        let email = normalize_email(email);
        let ip = ctx.lockout_ip();

        if let Some(retry_after_seconds) = self.lockout.blocked_for(&email, ip).await? {
            return Err(AuthError::AccountLocked {
                retry_after_seconds,
            });
        }

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.note_failure(&email, ip).await?;
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(password, &user.password_hash)? {
            self.note_failure(&email, ip).await?;
            return Err(AuthError::InvalidCredentials);
        }

        self.lockout.clear(&email, ip).await?;
        self.issue(&AuthenticatedUser::from(&user), ctx).await
    }

    /// Rotate a refresh token: revoke the consumed lineage and issue a
    /// successor. A token whose lineage is missing or already revoked is a
    /// reuse signal and fails with `TokenRevoked`.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<Tokens, AuthError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;

        // Re-read the identity so a deleted user cannot keep a lineage
        // alive on stale claims.
        let Some(user) = self.users.find_by_id(claims.sub).await? else {
            return Err(AuthError::NotFound);
        };
        let user = AuthenticatedUser::from(&user);

        let new_jti = Uuid::new_v4();
        let access_token = self.tokens.issue_access(&user, new_jti)?;
        let new_refresh = self.tokens.issue_refresh(&user, new_jti)?;

        let next = NewSession {
            user_id: user.id,
            jti: new_jti,
            token_hash: hash_refresh_token(&new_refresh),
            expires_at: Utc::now() + Duration::seconds(self.config.refresh_ttl_seconds()),
            // Session metadata follows the most recent activity.
            user_agent: ctx.user_agent.clone(),
            ip_address: ctx.ip.clone(),
        };

        match self
            .ledger
            .rotate(claims.jti, &hash_refresh_token(refresh_token), next)
            .await?
        {
            RotateOutcome::Rotated => Ok(Tokens {
                access_token,
                refresh_token: new_refresh,
                expires_in: self.config.access_ttl_seconds(),
                refresh_expires_in: self.config.refresh_ttl_seconds(),
                token_type: "Bearer",
            }),
            RotateOutcome::Reused => {
                warn!(user_id = %user.id, jti = %claims.jti, "refresh token reuse detected");
                Err(AuthError::TokenRevoked)
            }
            RotateOutcome::Mismatch => Err(AuthError::InvalidToken),
        }
    }

    /// Revoke a single refresh token lineage. Idempotent: revoking an
    /// already-revoked or unknown lineage still acknowledges success.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let claims = self.tokens.verify_refresh(refresh_token)?;
        self.ledger.revoke(claims.jti).await?;
        Ok(())
    }

    /// Create a user and return their initial token pair. The SUPERADMIN
    /// requirement on the caller is the guard chain's job.
    pub async fn register(
        &self,
        registration: Registration,
        ctx: &RequestContext,
    ) -> Result<Tokens, AuthError> {
        let policy_errors = check_password_policy(&registration.password);
        if !policy_errors.is_empty() {
            return Err(AuthError::Validation(policy_errors));
        }

        let email = normalize_email(&registration.email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let outcome = self
            .users
            .create(NewUser {
                email,
                password_hash: hash_password(&registration.password)?,
                full_name: registration.full_name,
                role: registration.role,
                teacher_id: registration.teacher_id,
                student_id: registration.student_id,
            })
            .await?;

        let user = match outcome {
            CreateOutcome::Created(user) => user,
            // Lost the race with a concurrent registration.
            CreateOutcome::EmailTaken => return Err(AuthError::EmailTaken),
        };

        self.issue(&AuthenticatedUser::from(&user), ctx).await
    }

    /// Project the current identity for `/me`. The user may have been
    /// removed between token issuance and use.
    pub async fn me(&self, user_id: Uuid) -> Result<AuthenticatedUser, AuthError> {
        let Some(user) = self.users.find_by_id(user_id).await? else {
            return Err(AuthError::NotFound);
        };
        Ok(AuthenticatedUser::from(&user))
    }

    async fn note_failure(&self, email: &str, ip: &str) -> Result<(), AuthError> {
        let count = self
            .lockout
            .record_failure(email, ip, self.config.attempt_window_seconds())
            .await?;
        if count >= self.config.max_login_attempts() {
            warn!(email, ip, count, "login lockout threshold reached");
            self.lockout
                .block(email, ip, self.config.lockout_seconds())
                .await?;
        }
        Ok(())
    }

    async fn issue(&self, user: &AuthenticatedUser, ctx: &RequestContext) -> Result<Tokens, AuthError> {
        let jti = Uuid::new_v4();
        let access_token = self.tokens.issue_access(user, jti)?;
        let refresh_token = self.tokens.issue_refresh(user, jti)?;

        self.ledger
            .insert(NewSession {
                user_id: user.id,
                jti,
                token_hash: hash_refresh_token(&refresh_token),
                expires_at: Utc::now() + Duration::seconds(self.config.refresh_ttl_seconds()),
                user_agent: ctx.user_agent.clone(),
                ip_address: ctx.ip.clone(),
            })
            .await?;

        Ok(Tokens {
            access_token,
            refresh_token,
            expires_in: self.config.access_ttl_seconds(),
            refresh_expires_in: self.config.refresh_ttl_seconds(),
            token_type: "Bearer",
        })
    }
}
