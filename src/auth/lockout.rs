//! Login-attempt counters and lockout flags, keyed by (email, ip).

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::Instrument;

#[async_trait]
pub trait LockoutStore: Send + Sync {
    /// Remaining lockout in seconds if the pair is currently blocked.
    async fn blocked_for(&self, email: &str, ip: &str) -> Result<Option<u64>>;

    /// Atomically record one failed attempt and return the new count.
    /// A counter past its window restarts at 1.
    async fn record_failure(&self, email: &str, ip: &str, window_seconds: i64) -> Result<u32>;

    /// Set the block flag and clear the counter. Setting an existing block
    /// again is harmless.
    async fn block(&self, email: &str, ip: &str, lockout_seconds: i64) -> Result<()>;

    /// Drop all attempt state for the pair (successful login).
    async fn clear(&self, email: &str, ip: &str) -> Result<()>;
}

/// Postgres-backed lockout store.
///
/// TTLs are expressed as `expires_at` columns; expired rows are treated as
/// absent and overwritten in place rather than vacuumed eagerly.
pub struct PgLockoutStore {
    pool: PgPool,
}

impl PgLockoutStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockoutStore for PgLockoutStore {
    async fn blocked_for(&self, email: &str, ip: &str) -> Result<Option<u64>> {
        let query = r"
            SELECT CEIL(EXTRACT(EPOCH FROM (expires_at - NOW())))::BIGINT AS remaining
            FROM login_blocks
            WHERE email = $1 AND ip_address = $2 AND expires_at > NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(ip)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to check login block")?;
        Ok(row.map(|row| {
            let remaining: i64 = row.get("remaining");
            remaining.max(0) as u64
        }))
    }

    async fn record_failure(&self, email: &str, ip: &str, window_seconds: i64) -> Result<u32> {
        // Single atomic upsert: concurrent failures interleave without
        // losing increments, and an expired counter restarts at 1.
        let query = r"
            INSERT INTO login_attempts (email, ip_address, count, expires_at)
            VALUES ($1, $2, 1, NOW() + ($3 * INTERVAL '1 second'))
            ON CONFLICT (email, ip_address) DO UPDATE
            SET count = CASE
                    WHEN login_attempts.expires_at <= NOW() THEN 1
                    ELSE login_attempts.count + 1
                END,
                expires_at = NOW() + ($3 * INTERVAL '1 second')
            RETURNING count
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .bind(ip)
            .bind(window_seconds)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login failure")?;
        let count: i32 = row.get("count");
        Ok(count.max(0) as u32)
    }

    async fn block(&self, email: &str, ip: &str, lockout_seconds: i64) -> Result<()> {
        let query = r"
            INSERT INTO login_blocks (email, ip_address, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
            ON CONFLICT (email, ip_address) DO UPDATE
            SET expires_at = EXCLUDED.expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(ip)
            .bind(lockout_seconds)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to set login block")?;

        let query = "DELETE FROM login_attempts WHERE email = $1 AND ip_address = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(ip)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear attempt counter after block")?;
        Ok(())
    }

    async fn clear(&self, email: &str, ip: &str) -> Result<()> {
        let query = "DELETE FROM login_attempts WHERE email = $1 AND ip_address = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(ip)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear attempt counter")?;

        let query = "DELETE FROM login_blocks WHERE email = $1 AND ip_address = $2";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(ip)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear login block")?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
struct Counter {
    count: u32,
    expires_at: Instant,
}

/// In-memory lockout store for deterministic tests.
#[derive(Default)]
pub struct InMemoryLockoutStore {
    attempts: Mutex<HashMap<(String, String), Counter>>,
    blocks: Mutex<HashMap<(String, String), Instant>>,
}

impl InMemoryLockoutStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(email: &str, ip: &str) -> (String, String) {
    (email.to_string(), ip.to_string())
}

#[async_trait]
impl LockoutStore for InMemoryLockoutStore {
    async fn blocked_for(&self, email: &str, ip: &str) -> Result<Option<u64>> {
        let blocks = self.blocks.lock().await;
        Ok(blocks.get(&key(email, ip)).and_then(|expires_at| {
            let now = Instant::now();
            if *expires_at > now {
                Some((*expires_at - now).as_secs().max(1))
            } else {
                None
            }
        }))
    }

    async fn record_failure(&self, email: &str, ip: &str, window_seconds: i64) -> Result<u32> {
        let mut attempts = self.attempts.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(window_seconds.max(0) as u64);
        let counter = attempts
            .entry(key(email, ip))
            .and_modify(|counter| {
                if counter.expires_at <= now {
                    counter.count = 1;
                } else {
                    counter.count += 1;
                }
                counter.expires_at = now + window;
            })
            .or_insert(Counter {
                count: 1,
                expires_at: now + window,
            });
        Ok(counter.count)
    }

    async fn block(&self, email: &str, ip: &str, lockout_seconds: i64) -> Result<()> {
        let expires_at = Instant::now() + Duration::from_secs(lockout_seconds.max(0) as u64);
        self.blocks.lock().await.insert(key(email, ip), expires_at);
        self.attempts.lock().await.remove(&key(email, ip));
        Ok(())
    }

    async fn clear(&self, email: &str, ip: &str) -> Result<()> {
        self.attempts.lock().await.remove(&key(email, ip));
        self.blocks.lock().await.remove(&key(email, ip));
        Ok(())
    }
}
