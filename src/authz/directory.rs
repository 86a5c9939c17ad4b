//! Read-only projections of the domain tables ownership resolution walks.
//!
//! The resolver never mutates these; every call re-reads current state so
//! assignment changes take effect between requests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

/// Class projection: the only fields class access needs.
#[derive(Clone, Debug)]
pub struct ClassSummary {
    pub id: Uuid,
    pub homeroom_id: Option<Uuid>,
}

/// Grade/attendance projection: enrollment linkage plus stored author.
#[derive(Clone, Debug)]
pub struct RecordRef {
    pub enrollment_id: Uuid,
    pub teacher_id: Option<Uuid>,
}

#[async_trait]
pub trait DomainDirectory: Send + Sync {
    async fn class_summary(&self, class_id: Uuid) -> Result<Option<ClassSummary>>;
    async fn subject_exists(&self, subject_id: Uuid) -> Result<bool>;
    async fn has_class_assignment(&self, teacher_id: Uuid, class_id: Uuid) -> Result<bool>;
    async fn has_class_schedule_entry(&self, teacher_id: Uuid, class_id: Uuid) -> Result<bool>;
    async fn has_subject_assignment(&self, teacher_id: Uuid, subject_id: Uuid) -> Result<bool>;
    async fn has_subject_schedule_entry(&self, teacher_id: Uuid, subject_id: Uuid) -> Result<bool>;
    async fn enrollment_class(&self, enrollment_id: Uuid) -> Result<Option<Uuid>>;
    async fn grade_ref(&self, grade_id: Uuid) -> Result<Option<RecordRef>>;
    async fn attendance_ref(&self, attendance_id: Uuid) -> Result<Option<RecordRef>>;
    async fn report_enrollment(&self, report_id: Uuid) -> Result<Option<Uuid>>;
}

/// Postgres-backed directory.
pub struct PgDomainDirectory {
    pool: PgPool,
}

impl PgDomainDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, query: &'static str, first: Uuid, second: Uuid) -> Result<bool> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(first)
            .bind(second)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to check relationship")?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl DomainDirectory for PgDomainDirectory {
    async fn class_summary(&self, class_id: Uuid) -> Result<Option<ClassSummary>> {
        let query = "SELECT id, homeroom_id FROM classes WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(class_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup class")?;
        Ok(row.map(|row| ClassSummary {
            id: row.get("id"),
            homeroom_id: row.get("homeroom_id"),
        }))
    }

    async fn subject_exists(&self, subject_id: Uuid) -> Result<bool> {
        let query = "SELECT 1 FROM subjects WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup subject")?;
        Ok(row.is_some())
    }

    async fn has_class_assignment(&self, teacher_id: Uuid, class_id: Uuid) -> Result<bool> {
        self.exists(
            "SELECT 1 FROM teaching_assignments WHERE teacher_id = $1 AND class_id = $2 LIMIT 1",
            teacher_id,
            class_id,
        )
        .await
    }

    async fn has_class_schedule_entry(&self, teacher_id: Uuid, class_id: Uuid) -> Result<bool> {
        self.exists(
            "SELECT 1 FROM schedule_entries WHERE teacher_id = $1 AND class_id = $2 LIMIT 1",
            teacher_id,
            class_id,
        )
        .await
    }

    async fn has_subject_assignment(&self, teacher_id: Uuid, subject_id: Uuid) -> Result<bool> {
        self.exists(
            "SELECT 1 FROM teaching_assignments WHERE teacher_id = $1 AND subject_id = $2 LIMIT 1",
            teacher_id,
            subject_id,
        )
        .await
    }

    async fn has_subject_schedule_entry(&self, teacher_id: Uuid, subject_id: Uuid) -> Result<bool> {
        self.exists(
            "SELECT 1 FROM schedule_entries WHERE teacher_id = $1 AND subject_id = $2 LIMIT 1",
            teacher_id,
            subject_id,
        )
        .await
    }

    async fn enrollment_class(&self, enrollment_id: Uuid) -> Result<Option<Uuid>> {
        let query = "SELECT class_id FROM enrollments WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(enrollment_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup enrollment")?;
        Ok(row.map(|row| row.get("class_id")))
    }

    async fn grade_ref(&self, grade_id: Uuid) -> Result<Option<RecordRef>> {
        let query = "SELECT enrollment_id, teacher_id FROM grades WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(grade_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup grade")?;
        Ok(row.map(|row| RecordRef {
            enrollment_id: row.get("enrollment_id"),
            teacher_id: row.get("teacher_id"),
        }))
    }

    async fn attendance_ref(&self, attendance_id: Uuid) -> Result<Option<RecordRef>> {
        let query = "SELECT enrollment_id, teacher_id FROM attendance WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(attendance_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup attendance")?;
        Ok(row.map(|row| RecordRef {
            enrollment_id: row.get("enrollment_id"),
            teacher_id: row.get("teacher_id"),
        }))
    }

    async fn report_enrollment(&self, report_id: Uuid) -> Result<Option<Uuid>> {
        let query = "SELECT enrollment_id FROM reports WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(report_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup report")?;
        Ok(row.map(|row| row.get("enrollment_id")))
    }
}

/// In-memory directory for deterministic tests; populated imperatively.
#[derive(Default)]
pub struct InMemoryDomainDirectory {
    classes: Mutex<HashMap<Uuid, ClassSummary>>,
    subjects: Mutex<HashSet<Uuid>>,
    assignments: Mutex<HashSet<(Uuid, Uuid, Uuid)>>, // (teacher, subject, class)
    schedule: Mutex<HashSet<(Uuid, Uuid, Uuid)>>,    // (teacher, subject, class)
    enrollments: Mutex<HashMap<Uuid, Uuid>>,         // enrollment -> class
    grades: Mutex<HashMap<Uuid, RecordRef>>,
    attendance: Mutex<HashMap<Uuid, RecordRef>>,
    reports: Mutex<HashMap<Uuid, Uuid>>, // report -> enrollment
}

impl InMemoryDomainDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_class(&self, class_id: Uuid, homeroom_id: Option<Uuid>) {
        self.classes.lock().await.insert(
            class_id,
            ClassSummary {
                id: class_id,
                homeroom_id,
            },
        );
    }

    pub async fn add_subject(&self, subject_id: Uuid) {
        self.subjects.lock().await.insert(subject_id);
    }

    pub async fn add_assignment(&self, teacher_id: Uuid, subject_id: Uuid, class_id: Uuid) {
        self.assignments
            .lock()
            .await
            .insert((teacher_id, subject_id, class_id));
    }

    pub async fn add_schedule_entry(&self, teacher_id: Uuid, subject_id: Uuid, class_id: Uuid) {
        self.schedule
            .lock()
            .await
            .insert((teacher_id, subject_id, class_id));
    }

    pub async fn add_enrollment(&self, enrollment_id: Uuid, class_id: Uuid) {
        self.enrollments
            .lock()
            .await
            .insert(enrollment_id, class_id);
    }

    pub async fn add_grade(&self, grade_id: Uuid, enrollment_id: Uuid, teacher_id: Option<Uuid>) {
        self.grades.lock().await.insert(
            grade_id,
            RecordRef {
                enrollment_id,
                teacher_id,
            },
        );
    }

    pub async fn add_attendance(
        &self,
        attendance_id: Uuid,
        enrollment_id: Uuid,
        teacher_id: Option<Uuid>,
    ) {
        self.attendance.lock().await.insert(
            attendance_id,
            RecordRef {
                enrollment_id,
                teacher_id,
            },
        );
    }

    pub async fn add_report(&self, report_id: Uuid, enrollment_id: Uuid) {
        self.reports.lock().await.insert(report_id, enrollment_id);
    }
}

#[async_trait]
impl DomainDirectory for InMemoryDomainDirectory {
    async fn class_summary(&self, class_id: Uuid) -> Result<Option<ClassSummary>> {
        Ok(self.classes.lock().await.get(&class_id).cloned())
    }

    async fn subject_exists(&self, subject_id: Uuid) -> Result<bool> {
        Ok(self.subjects.lock().await.contains(&subject_id))
    }

    async fn has_class_assignment(&self, teacher_id: Uuid, class_id: Uuid) -> Result<bool> {
        Ok(self
            .assignments
            .lock()
            .await
            .iter()
            .any(|(teacher, _, class)| *teacher == teacher_id && *class == class_id))
    }

    async fn has_class_schedule_entry(&self, teacher_id: Uuid, class_id: Uuid) -> Result<bool> {
        Ok(self
            .schedule
            .lock()
            .await
            .iter()
            .any(|(teacher, _, class)| *teacher == teacher_id && *class == class_id))
    }

    async fn has_subject_assignment(&self, teacher_id: Uuid, subject_id: Uuid) -> Result<bool> {
        Ok(self
            .assignments
            .lock()
            .await
            .iter()
            .any(|(teacher, subject, _)| *teacher == teacher_id && *subject == subject_id))
    }

    async fn has_subject_schedule_entry(&self, teacher_id: Uuid, subject_id: Uuid) -> Result<bool> {
        Ok(self
            .schedule
            .lock()
            .await
            .iter()
            .any(|(teacher, subject, _)| *teacher == teacher_id && *subject == subject_id))
    }

    async fn enrollment_class(&self, enrollment_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self.enrollments.lock().await.get(&enrollment_id).copied())
    }

    async fn grade_ref(&self, grade_id: Uuid) -> Result<Option<RecordRef>> {
        Ok(self.grades.lock().await.get(&grade_id).cloned())
    }

    async fn attendance_ref(&self, attendance_id: Uuid) -> Result<Option<RecordRef>> {
        Ok(self.attendance.lock().await.get(&attendance_id).cloned())
    }

    async fn report_enrollment(&self, report_id: Uuid) -> Result<Option<Uuid>> {
        Ok(self.reports.lock().await.get(&report_id).copied())
    }
}
