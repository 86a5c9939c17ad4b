//! Ownership resolution: may this actor touch this record?
//!
//! Every resource kind reduces to a class-access check; adding a new
//! ownership-gated kind means defining how it maps down to `class` or
//! `enrollment`, not re-implementing the access paths.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;

use super::directory::DomainDirectory;

/// Resource kinds an endpoint may declare for ownership enforcement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Class,
    Subject,
    Enrollment,
    Grade,
    Attendance,
    Report,
}

impl ResourceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Subject => "subject",
            Self::Enrollment => "enrollment",
            Self::Grade => "grade",
            Self::Attendance => "attendance",
            Self::Report => "report",
        }
    }
}

impl FromStr for ResourceKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "class" => Ok(Self::Class),
            "subject" => Ok(Self::Subject),
            "enrollment" => Ok(Self::Enrollment),
            "grade" => Ok(Self::Grade),
            "attendance" => Ok(Self::Attendance),
            "report" => Ok(Self::Report),
            other => Err(anyhow::anyhow!("unknown resource kind: {other}")),
        }
    }
}

#[derive(Clone)]
pub struct OwnershipResolver {
    directory: Arc<dyn DomainDirectory>,
}

impl OwnershipResolver {
    #[must_use]
    pub fn new(directory: Arc<dyn DomainDirectory>) -> Self {
        Self { directory }
    }

    /// Decide access. Absent targets and broken chains resolve to `false`,
    /// never to an error: deny by default.
    pub async fn can_access(
        &self,
        actor: &AuthenticatedUser,
        kind: ResourceKind,
        resource_id: Uuid,
    ) -> Result<bool> {
        if actor.role.is_administrative() {
            return Ok(true);
        }
        // Student/parent self-access is handled by resource-scoped filters
        // outside this resolver; without a teacher link there is no
        // ownership path.
        let Some(teacher_id) = actor.teacher_id else {
            return Ok(false);
        };

        match kind {
            ResourceKind::Class => self.class_access(teacher_id, resource_id).await,
            ResourceKind::Subject => self.subject_access(teacher_id, resource_id).await,
            ResourceKind::Enrollment => self.enrollment_access(teacher_id, resource_id).await,
            ResourceKind::Grade => {
                let Some(grade) = self.directory.grade_ref(resource_id).await? else {
                    return Ok(false);
                };
                // Authored-record shortcut: the stored teacher id wins even
                // if that teacher has since lost the class assignment.
                if grade.teacher_id == Some(teacher_id) {
                    return Ok(true);
                }
                self.enrollment_access(teacher_id, grade.enrollment_id).await
            }
            ResourceKind::Attendance => {
                let Some(attendance) = self.directory.attendance_ref(resource_id).await? else {
                    return Ok(false);
                };
                if attendance.teacher_id == Some(teacher_id) {
                    return Ok(true);
                }
                self.enrollment_access(teacher_id, attendance.enrollment_id)
                    .await
            }
            // Reports are derived artifacts, never teacher-authored: no
            // fast path.
            ResourceKind::Report => {
                let Some(enrollment_id) = self.directory.report_enrollment(resource_id).await?
                else {
                    return Ok(false);
                };
                self.enrollment_access(teacher_id, enrollment_id).await
            }
        }
    }

    /// Three independent access paths: homeroom, standing assignment, or a
    /// schedule entry. Any one match grants access.
    async fn class_access(&self, teacher_id: Uuid, class_id: Uuid) -> Result<bool> {
        let Some(class) = self.directory.class_summary(class_id).await? else {
            return Ok(false);
        };
        if class.homeroom_id == Some(teacher_id) {
            return Ok(true);
        }
        if self
            .directory
            .has_class_assignment(teacher_id, class_id)
            .await?
        {
            return Ok(true);
        }
        self.directory
            .has_class_schedule_entry(teacher_id, class_id)
            .await
    }

    async fn subject_access(&self, teacher_id: Uuid, subject_id: Uuid) -> Result<bool> {
        if self
            .directory
            .has_subject_assignment(teacher_id, subject_id)
            .await?
        {
            return Ok(true);
        }
        self.directory
            .has_subject_schedule_entry(teacher_id, subject_id)
            .await
    }

    async fn enrollment_access(&self, teacher_id: Uuid, enrollment_id: Uuid) -> Result<bool> {
        let Some(class_id) = self.directory.enrollment_class(enrollment_id).await? else {
            return Ok(false);
        };
        self.class_access(teacher_id, class_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::{OwnershipResolver, ResourceKind};
    use crate::auth::{AuthenticatedUser, Role};
    use crate::authz::directory::InMemoryDomainDirectory;
    use anyhow::Result;
    use std::sync::Arc;
    use uuid::Uuid;

    fn actor(role: Role, teacher_id: Option<Uuid>) -> AuthenticatedUser {
        AuthenticatedUser {
            id: Uuid::new_v4(),
            email: "actor@school.edu".to_string(),
            full_name: "Actor".to_string(),
            role,
            teacher_id,
            student_id: None,
        }
    }

    struct Fixture {
        resolver: OwnershipResolver,
        directory: Arc<InMemoryDomainDirectory>,
        teacher: Uuid,
        class: Uuid,
        subject: Uuid,
        enrollment: Uuid,
    }

    /// Teacher bound to subject and class via an assignment; enrollment in
    /// that class.
    async fn fixture() -> Fixture {
        let directory = Arc::new(InMemoryDomainDirectory::new());
        let teacher = Uuid::new_v4();
        let class = Uuid::new_v4();
        let subject = Uuid::new_v4();
        let enrollment = Uuid::new_v4();
        directory.add_class(class, None).await;
        directory.add_assignment(teacher, subject, class).await;
        directory.add_enrollment(enrollment, class).await;
        Fixture {
            resolver: OwnershipResolver::new(Arc::clone(&directory) as _),
            directory,
            teacher,
            class,
            subject,
            enrollment,
        }
    }

    #[test]
    fn resource_kind_round_trips_through_str() -> Result<()> {
        for kind in [
            ResourceKind::Class,
            ResourceKind::Subject,
            ResourceKind::Enrollment,
            ResourceKind::Grade,
            ResourceKind::Attendance,
            ResourceKind::Report,
        ] {
            assert_eq!(kind.as_str().parse::<ResourceKind>()?, kind);
        }
        assert!("homework".parse::<ResourceKind>().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn admins_short_circuit_every_check() -> Result<()> {
        let f = fixture().await;
        for role in [Role::Superadmin, Role::Admin, Role::Operator] {
            let admin = actor(role, None);
            // Even a nonexistent target is allowed for administrators.
            assert!(
                f.resolver
                    .can_access(&admin, ResourceKind::Enrollment, f.enrollment)
                    .await?
            );
            assert!(
                f.resolver
                    .can_access(&admin, ResourceKind::Grade, Uuid::new_v4())
                    .await?
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn actors_without_teacher_link_are_denied() -> Result<()> {
        let f = fixture().await;
        for role in [Role::Teacher, Role::Student, Role::Parent] {
            let unlinked = actor(role, None);
            assert!(
                !f.resolver
                    .can_access(&unlinked, ResourceKind::Class, f.class)
                    .await?
            );
        }
        Ok(())
    }

    #[tokio::test]
    async fn assigned_teacher_reaches_enrollment_through_class() -> Result<()> {
        let f = fixture().await;
        let teacher = actor(Role::Teacher, Some(f.teacher));
        assert!(
            f.resolver
                .can_access(&teacher, ResourceKind::Enrollment, f.enrollment)
                .await?
        );

        let stranger = actor(Role::Teacher, Some(Uuid::new_v4()));
        assert!(
            !f.resolver
                .can_access(&stranger, ResourceKind::Enrollment, f.enrollment)
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn class_access_paths_are_independent_ors() -> Result<()> {
        let directory = Arc::new(InMemoryDomainDirectory::new());
        let resolver = OwnershipResolver::new(Arc::clone(&directory) as _);
        let subject = Uuid::new_v4();

        // Homeroom only.
        let homeroom_teacher = Uuid::new_v4();
        let homeroom_class = Uuid::new_v4();
        directory
            .add_class(homeroom_class, Some(homeroom_teacher))
            .await;
        assert!(
            resolver
                .can_access(
                    &actor(Role::Homeroom, Some(homeroom_teacher)),
                    ResourceKind::Class,
                    homeroom_class,
                )
                .await?
        );

        // Schedule entry only.
        let scheduled_teacher = Uuid::new_v4();
        let scheduled_class = Uuid::new_v4();
        directory.add_class(scheduled_class, None).await;
        directory
            .add_schedule_entry(scheduled_teacher, subject, scheduled_class)
            .await;
        assert!(
            resolver
                .can_access(
                    &actor(Role::Teacher, Some(scheduled_teacher)),
                    ResourceKind::Class,
                    scheduled_class,
                )
                .await?
        );

        // No path at all.
        assert!(
            !resolver
                .can_access(
                    &actor(Role::Teacher, Some(Uuid::new_v4())),
                    ResourceKind::Class,
                    scheduled_class,
                )
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn subject_access_ignores_class_restriction() -> Result<()> {
        let f = fixture().await;
        let teacher = actor(Role::Teacher, Some(f.teacher));
        assert!(
            f.resolver
                .can_access(&teacher, ResourceKind::Subject, f.subject)
                .await?
        );
        assert!(
            !f.resolver
                .can_access(&teacher, ResourceKind::Subject, Uuid::new_v4())
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn grade_author_fast_path_overrides_class_walk() -> Result<()> {
        let f = fixture().await;
        // Grade authored by an outsider teacher, in a class they have no
        // relationship to.
        let outsider = Uuid::new_v4();
        let grade = Uuid::new_v4();
        f.directory
            .add_grade(grade, f.enrollment, Some(outsider))
            .await;

        assert!(
            f.resolver
                .can_access(&actor(Role::Teacher, Some(outsider)), ResourceKind::Grade, grade)
                .await?
        );
        // The class-bound teacher still gets in through the walk.
        assert!(
            f.resolver
                .can_access(&actor(Role::Teacher, Some(f.teacher)), ResourceKind::Grade, grade)
                .await?
        );
        // A third teacher has neither path.
        assert!(
            !f.resolver
                .can_access(
                    &actor(Role::Teacher, Some(Uuid::new_v4())),
                    ResourceKind::Grade,
                    grade,
                )
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn attendance_mirrors_grade_semantics() -> Result<()> {
        let f = fixture().await;
        let author = Uuid::new_v4();
        let attendance = Uuid::new_v4();
        f.directory
            .add_attendance(attendance, f.enrollment, Some(author))
            .await;

        assert!(
            f.resolver
                .can_access(
                    &actor(Role::Teacher, Some(author)),
                    ResourceKind::Attendance,
                    attendance,
                )
                .await?
        );
        assert!(
            f.resolver
                .can_access(
                    &actor(Role::Teacher, Some(f.teacher)),
                    ResourceKind::Attendance,
                    attendance,
                )
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn reports_have_no_fast_path() -> Result<()> {
        let f = fixture().await;
        let report = Uuid::new_v4();
        f.directory.add_report(report, f.enrollment).await;

        assert!(
            f.resolver
                .can_access(&actor(Role::Teacher, Some(f.teacher)), ResourceKind::Report, report)
                .await?
        );
        assert!(
            !f.resolver
                .can_access(
                    &actor(Role::Teacher, Some(Uuid::new_v4())),
                    ResourceKind::Report,
                    report,
                )
                .await?
        );
        Ok(())
    }

    #[tokio::test]
    async fn broken_chains_resolve_to_deny() -> Result<()> {
        let f = fixture().await;
        let teacher = actor(Role::Teacher, Some(f.teacher));

        // Missing targets of every kind.
        for kind in [
            ResourceKind::Class,
            ResourceKind::Enrollment,
            ResourceKind::Grade,
            ResourceKind::Attendance,
            ResourceKind::Report,
        ] {
            assert!(!f.resolver.can_access(&teacher, kind, Uuid::new_v4()).await?);
        }

        // Grade whose enrollment points at a class that does not exist.
        let dangling_enrollment = Uuid::new_v4();
        f.directory
            .add_enrollment(dangling_enrollment, Uuid::new_v4())
            .await;
        let grade = Uuid::new_v4();
        f.directory.add_grade(grade, dangling_enrollment, None).await;
        assert!(
            !f.resolver
                .can_access(&teacher, ResourceKind::Grade, grade)
                .await?
        );
        Ok(())
    }
}
