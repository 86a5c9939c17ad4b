//! Identity records and the credential store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Actor roles, ordered roughly by privilege.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Superadmin,
    Admin,
    Operator,
    Teacher,
    Homeroom,
    Student,
    Parent,
}

impl Role {
    /// Administrative roles bypass ownership resolution entirely.
    #[must_use]
    pub fn is_administrative(self) -> bool {
        matches!(self, Self::Superadmin | Self::Admin | Self::Operator)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superadmin => "SUPERADMIN",
            Self::Admin => "ADMIN",
            Self::Operator => "OPERATOR",
            Self::Teacher => "TEACHER",
            Self::Homeroom => "HOMEROOM",
            Self::Student => "STUDENT",
            Self::Parent => "PARENT",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "SUPERADMIN" => Ok(Self::Superadmin),
            "ADMIN" => Ok(Self::Admin),
            "OPERATOR" => Ok(Self::Operator),
            "TEACHER" => Ok(Self::Teacher),
            "HOMEROOM" => Ok(Self::Homeroom),
            "STUDENT" => Ok(Self::Student),
            "PARENT" => Ok(Self::Parent),
            other => Err(anyhow::anyhow!("unknown role: {other}")),
        }
    }
}

/// Full identity record as persisted by the credential store.
#[derive(Clone, Debug)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub teacher_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
}

/// Projection carried in token claims and request extensions.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub teacher_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            teacher_id: user.teacher_id,
            student_id: user.student_id,
        }
    }
}

/// Fields needed to create a user. The password is hashed before it gets here.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub teacher_id: Option<Uuid>,
    pub student_id: Option<Uuid>,
}

/// Outcome when attempting to create a user.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(User),
    EmailTaken,
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Lookup by already-normalized email.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    /// Create a user; a concurrent duplicate resolves to `EmailTaken`, not
    /// an error, so the race with `find_by_email` stays harmless.
    async fn create(&self, user: NewUser) -> Result<CreateOutcome>;
}

/// Postgres-backed credential store.
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User> {
    let role: String = row.get("role");
    Ok(User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        full_name: row.get("full_name"),
        role: role.parse()?,
        teacher_id: row.get("teacher_id"),
        student_id: row.get("student_id"),
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = r"
            SELECT id, email, password_hash, full_name, role, teacher_id, student_id
            FROM users
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let query = r"
            SELECT id, email, password_hash, full_name, role, teacher_id, student_id
            FROM users
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome> {
        let query = r"
            INSERT INTO users
                (email, password_hash, full_name, role, teacher_id, student_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, password_hash, full_name, role, teacher_id, student_id
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.full_name)
            .bind(user.role.as_str())
            .bind(user.teacher_id)
            .bind(user.student_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await;

        match row {
            Ok(row) => Ok(CreateOutcome::Created(user_from_row(&row)?)),
            Err(err) if is_unique_violation(&err) => Ok(CreateOutcome::EmailTaken),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }
}

/// In-memory credential store for deterministic tests.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|user| user.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<CreateOutcome> {
        let mut users = self.users.lock().await;
        if users.values().any(|existing| existing.email == user.email) {
            return Ok(CreateOutcome::EmailTaken);
        }
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            role: user.role,
            teacher_id: user.teacher_id,
            student_id: user.student_id,
        };
        users.insert(created.id, created.clone());
        Ok(CreateOutcome::Created(created))
    }
}

#[cfg(test)]
mod tests {
    use super::{
        normalize_email, AuthenticatedUser, CreateOutcome, CredentialStore,
        InMemoryCredentialStore, NewUser, Role, User,
    };
    use anyhow::Result;
    use uuid::Uuid;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            full_name: "Test User".to_string(),
            role: Role::Teacher,
            teacher_id: Some(Uuid::new_v4()),
            student_id: None,
        }
    }

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@School.EDU "), "alice@school.edu");
    }

    #[test]
    fn role_round_trips_through_str() -> Result<()> {
        for role in [
            Role::Superadmin,
            Role::Admin,
            Role::Operator,
            Role::Teacher,
            Role::Homeroom,
            Role::Student,
            Role::Parent,
        ] {
            assert_eq!(role.as_str().parse::<Role>()?, role);
        }
        assert!("JANITOR".parse::<Role>().is_err());
        Ok(())
    }

    #[test]
    fn administrative_set_is_exactly_three_roles() {
        assert!(Role::Superadmin.is_administrative());
        assert!(Role::Admin.is_administrative());
        assert!(Role::Operator.is_administrative());
        assert!(!Role::Teacher.is_administrative());
        assert!(!Role::Homeroom.is_administrative());
        assert!(!Role::Student.is_administrative());
        assert!(!Role::Parent.is_administrative());
    }

    #[test]
    fn authenticated_user_projects_identity() {
        let user = User {
            id: Uuid::new_v4(),
            email: "t@school.edu".to_string(),
            password_hash: "hash".to_string(),
            full_name: "A Teacher".to_string(),
            role: Role::Teacher,
            teacher_id: Some(Uuid::new_v4()),
            student_id: None,
        };
        let projected = AuthenticatedUser::from(&user);
        assert_eq!(projected.id, user.id);
        assert_eq!(projected.teacher_id, user.teacher_id);
    }

    #[tokio::test]
    async fn in_memory_store_enforces_unique_email() -> Result<()> {
        let store = InMemoryCredentialStore::new();
        let outcome = store.create(new_user("a@school.edu")).await?;
        assert!(matches!(outcome, CreateOutcome::Created(_)));
        let outcome = store.create(new_user("a@school.edu")).await?;
        assert!(matches!(outcome, CreateOutcome::EmailTaken));
        Ok(())
    }

    #[tokio::test]
    async fn in_memory_store_finds_by_email_and_id() -> Result<()> {
        let store = InMemoryCredentialStore::new();
        let CreateOutcome::Created(created) = store.create(new_user("b@school.edu")).await? else {
            anyhow::bail!("expected creation");
        };
        let by_email = store.find_by_email("b@school.edu").await?;
        assert_eq!(by_email.map(|user| user.id), Some(created.id));
        let by_id = store.find_by_id(created.id).await?;
        assert_eq!(by_id.map(|user| user.email), Some(created.email));
        assert!(store.find_by_id(Uuid::new_v4()).await?.is_none());
        Ok(())
    }
}
