//! Session ledger: one row per issued refresh token, soft-revoked.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

/// Persisted lineage record for one issued refresh token.
#[derive(Clone, Debug)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub jti: Uuid,
    pub token_hash: Vec<u8>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Fields for appending a new active record.
#[derive(Clone, Debug)]
pub struct NewSession {
    pub user_id: Uuid,
    pub jti: Uuid,
    pub token_hash: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Outcome of an atomic rotation attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The consumed record was revoked and the successor inserted.
    Rotated,
    /// The jti was unknown or already revoked: a reuse signal.
    Reused,
    /// The record was active but the presented token did not match it.
    Mismatch,
}

/// Hash a refresh token for storage; raw tokens never touch the ledger.
#[must_use]
pub fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

#[async_trait]
pub trait SessionLedger: Send + Sync {
    /// Append one active record (login, registration).
    async fn insert(&self, session: NewSession) -> Result<()>;

    /// Atomically consume `jti` and append `next` in its place.
    ///
    /// Exactly one of two concurrent calls for the same jti may observe
    /// `Rotated`; the loser observes `Reused`. On `Reused` and `Mismatch`
    /// no state changes.
    async fn rotate(
        &self,
        jti: Uuid,
        presented_hash: &[u8],
        next: NewSession,
    ) -> Result<RotateOutcome>;

    /// Soft-revoke one record. Revoking an already-revoked or unknown jti
    /// is a no-op.
    async fn revoke(&self, jti: Uuid) -> Result<()>;

    /// Revoke every active record owned by a user, returning how many were
    /// revoked. Not exposed over HTTP; used for account-compromise handling.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64>;

    async fn find(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>>;
}

/// Postgres-backed ledger.
pub struct PgSessionLedger {
    pool: PgPool,
}

impl PgSessionLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionLedger for PgSessionLedger {
    async fn insert(&self, session: NewSession) -> Result<()> {
        let query = r"
            INSERT INTO refresh_tokens
                (user_id, jti, token_hash, expires_at, user_agent, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(session.user_id)
            .bind(session.jti)
            .bind(&session.token_hash)
            .bind(session.expires_at)
            .bind(&session.user_agent)
            .bind(&session.ip_address)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert refresh token record")?;
        Ok(())
    }

    async fn rotate(
        &self,
        jti: Uuid,
        presented_hash: &[u8],
        next: NewSession,
    ) -> Result<RotateOutcome> {
        let mut tx = self.pool.begin().await.context("begin rotation")?;

        // CAS on revoked_at IS NULL: of two concurrent rotations exactly one
        // sees the row, the other gets zero rows and reports reuse.
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE jti = $1 AND revoked_at IS NULL
            RETURNING token_hash
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(jti)
            .fetch_optional(&mut *tx)
            .instrument(span)
            .await
            .context("failed to consume refresh token record")?;

        let Some(row) = row else {
            tx.rollback().await.context("rollback reused rotation")?;
            return Ok(RotateOutcome::Reused);
        };

        let stored_hash: Vec<u8> = row.get("token_hash");
        if stored_hash != presented_hash {
            // Keep the record active; the presented token was not the one
            // this lineage issued.
            tx.rollback().await.context("rollback mismatched rotation")?;
            return Ok(RotateOutcome::Mismatch);
        }

        let query = r"
            INSERT INTO refresh_tokens
                (user_id, jti, token_hash, expires_at, user_agent, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(next.user_id)
            .bind(next.jti)
            .bind(&next.token_hash)
            .bind(next.expires_at)
            .bind(&next.user_agent)
            .bind(&next.ip_address)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert rotated refresh token record")?;

        tx.commit().await.context("commit rotation")?;
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke(&self, jti: Uuid) -> Result<()> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE jti = $1 AND revoked_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(jti)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh token record")?;
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = NOW()
            WHERE user_id = $1 AND revoked_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke user sessions")?;
        Ok(result.rows_affected())
    }

    async fn find(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>> {
        let query = r"
            SELECT id, user_id, jti, token_hash, revoked_at, created_at,
                   expires_at, user_agent, ip_address
            FROM refresh_tokens
            WHERE jti = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(jti)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup refresh token record")?;
        Ok(row.map(|row| RefreshTokenRecord {
            id: row.get("id"),
            user_id: row.get("user_id"),
            jti: row.get("jti"),
            token_hash: row.get("token_hash"),
            revoked_at: row.get("revoked_at"),
            created_at: row.get("created_at"),
            expires_at: row.get("expires_at"),
            user_agent: row.get("user_agent"),
            ip_address: row.get("ip_address"),
        }))
    }
}

/// In-memory ledger for deterministic tests.
///
/// One mutex guards the whole map, so `rotate` is a single critical
/// section with the same winner-takes-all semantics as the Postgres
/// transaction.
#[derive(Default)]
pub struct InMemorySessionLedger {
    records: Mutex<HashMap<Uuid, RefreshTokenRecord>>,
}

impl InMemorySessionLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn record_from(session: NewSession) -> RefreshTokenRecord {
    RefreshTokenRecord {
        id: Uuid::new_v4(),
        user_id: session.user_id,
        jti: session.jti,
        token_hash: session.token_hash,
        revoked_at: None,
        created_at: Utc::now(),
        expires_at: session.expires_at,
        user_agent: session.user_agent,
        ip_address: session.ip_address,
    }
}

#[async_trait]
impl SessionLedger for InMemorySessionLedger {
    async fn insert(&self, session: NewSession) -> Result<()> {
        let mut records = self.records.lock().await;
        records.insert(session.jti, record_from(session));
        Ok(())
    }

    async fn rotate(
        &self,
        jti: Uuid,
        presented_hash: &[u8],
        next: NewSession,
    ) -> Result<RotateOutcome> {
        let mut records = self.records.lock().await;
        let Some(record) = records.get_mut(&jti) else {
            return Ok(RotateOutcome::Reused);
        };
        if record.revoked_at.is_some() {
            return Ok(RotateOutcome::Reused);
        }
        if record.token_hash != presented_hash {
            return Ok(RotateOutcome::Mismatch);
        }
        record.revoked_at = Some(Utc::now());
        records.insert(next.jti, record_from(next));
        Ok(RotateOutcome::Rotated)
    }

    async fn revoke(&self, jti: Uuid) -> Result<()> {
        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(&jti) {
            if record.revoked_at.is_none() {
                record.revoked_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64> {
        let mut records = self.records.lock().await;
        let mut revoked = 0;
        for record in records.values_mut() {
            if record.user_id == user_id && record.revoked_at.is_none() {
                record.revoked_at = Some(Utc::now());
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn find(&self, jti: Uuid) -> Result<Option<RefreshTokenRecord>> {
        let records = self.records.lock().await;
        Ok(records.get(&jti).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        hash_refresh_token, InMemorySessionLedger, NewSession, RotateOutcome, SessionLedger,
    };
    use anyhow::Result;
    use chrono::{Duration, Utc};
    use std::sync::Arc;
    use uuid::Uuid;

    fn session(user_id: Uuid, jti: Uuid, token: &str) -> NewSession {
        NewSession {
            user_id,
            jti,
            token_hash: hash_refresh_token(token),
            expires_at: Utc::now() + Duration::days(30),
            user_agent: Some("test-agent".to_string()),
            ip_address: Some("10.0.0.1".to_string()),
        }
    }

    #[test]
    fn token_hash_is_stable_and_distinct() {
        assert_eq!(hash_refresh_token("token"), hash_refresh_token("token"));
        assert_ne!(hash_refresh_token("token"), hash_refresh_token("other"));
    }

    #[tokio::test]
    async fn rotation_consumes_the_predecessor() -> Result<()> {
        let ledger = InMemorySessionLedger::new();
        let user = Uuid::new_v4();
        let (jti0, jti1, jti2) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        ledger.insert(session(user, jti0, "r0")).await?;
        let outcome = ledger
            .rotate(jti0, &hash_refresh_token("r0"), session(user, jti1, "r1"))
            .await?;
        assert_eq!(outcome, RotateOutcome::Rotated);

        // Presenting the consumed lineage again is reuse, whatever the hash.
        let outcome = ledger
            .rotate(jti0, &hash_refresh_token("r0"), session(user, jti2, "r2"))
            .await?;
        assert_eq!(outcome, RotateOutcome::Reused);

        // The successor stays active.
        let record = ledger.find(jti1).await?.expect("successor record");
        assert!(record.revoked_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn rotation_rejects_wrong_token_without_revoking() -> Result<()> {
        let ledger = InMemorySessionLedger::new();
        let user = Uuid::new_v4();
        let jti = Uuid::new_v4();
        ledger.insert(session(user, jti, "real")).await?;

        let outcome = ledger
            .rotate(
                jti,
                &hash_refresh_token("forged"),
                session(user, Uuid::new_v4(), "next"),
            )
            .await?;
        assert_eq!(outcome, RotateOutcome::Mismatch);

        let record = ledger.find(jti).await?.expect("record");
        assert!(record.revoked_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_jti_rotation_is_reuse() -> Result<()> {
        let ledger = InMemorySessionLedger::new();
        let outcome = ledger
            .rotate(
                Uuid::new_v4(),
                &hash_refresh_token("r0"),
                session(Uuid::new_v4(), Uuid::new_v4(), "r1"),
            )
            .await?;
        assert_eq!(outcome, RotateOutcome::Reused);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_rotations_have_exactly_one_winner() -> Result<()> {
        let ledger = Arc::new(InMemorySessionLedger::new());
        let user = Uuid::new_v4();
        let jti = Uuid::new_v4();
        ledger.insert(session(user, jti, "r0")).await?;

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            tasks.push(tokio::spawn(async move {
                ledger
                    .rotate(
                        jti,
                        &hash_refresh_token("r0"),
                        session(user, Uuid::new_v4(), "next"),
                    )
                    .await
            }));
        }

        let mut rotated = 0;
        let mut reused = 0;
        for task in tasks {
            match task.await?? {
                RotateOutcome::Rotated => rotated += 1,
                RotateOutcome::Reused => reused += 1,
                RotateOutcome::Mismatch => anyhow::bail!("unexpected mismatch"),
            }
        }
        assert_eq!(rotated, 1);
        assert_eq!(reused, 7);
        Ok(())
    }

    #[tokio::test]
    async fn revoke_is_idempotent() -> Result<()> {
        let ledger = InMemorySessionLedger::new();
        let user = Uuid::new_v4();
        let jti = Uuid::new_v4();
        ledger.insert(session(user, jti, "r0")).await?;

        ledger.revoke(jti).await?;
        let first = ledger.find(jti).await?.expect("record").revoked_at;
        assert!(first.is_some());

        ledger.revoke(jti).await?;
        let second = ledger.find(jti).await?.expect("record").revoked_at;
        // Second revoke performs no additional state change.
        assert_eq!(first, second);

        // Unknown jti revocation is a quiet no-op.
        ledger.revoke(Uuid::new_v4()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn revoke_all_targets_one_user() -> Result<()> {
        let ledger = InMemorySessionLedger::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        ledger.insert(session(alice, Uuid::new_v4(), "a1")).await?;
        ledger.insert(session(alice, Uuid::new_v4(), "a2")).await?;
        let bob_jti = Uuid::new_v4();
        ledger.insert(session(bob, bob_jti, "b1")).await?;

        assert_eq!(ledger.revoke_all_for_user(alice).await?, 2);
        assert_eq!(ledger.revoke_all_for_user(alice).await?, 0);
        let record = ledger.find(bob_jti).await?.expect("bob record");
        assert!(record.revoked_at.is_none());
        Ok(())
    }
}
