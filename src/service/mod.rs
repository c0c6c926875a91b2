//! EduHub - the course-management facade.
//!
//! Ties repositories, integrity checks and analytics together over one
//! store. Every relationship-creating write runs its integrity check first.
//!
//! ```ignore
//! let hub = EduHub::new(InMemoryDocumentStore::new(), StoreConfig::default());
//! hub.setup()?;
//! hub.create_user(&User::new("U001", "ada@example.com", "Ada", "Lovelace", Role::Student))?;
//! let enrollment = hub.enroll_student("U001", "C001")?;
//! ```

mod search;

use serde_json::Value;
use tracing::{info, warn};

use crate::analytics::Analytics;
use crate::config::StoreConfig;
use crate::document::{Document, DocumentError, Fields};
use crate::error::Result;
use crate::filter::Filter;
use crate::integrity::{IntegrityValidator, RelationshipCheck, RelationshipViolation};
use crate::model::{
    all_constraints, all_schemas, Assignment, Course, Enrollment, EnrollmentStatus, Entity,
    Lesson, Profile, Submission, User, ACTIVE_ENROLLMENT,
};
use crate::repository::{DocumentRepository, DocumentsExt, RepositoryError};
use crate::store::DocumentStore;

pub use search::CourseSearch;

pub struct EduHub<S> {
    store: S,
    config: StoreConfig,
}

impl<S: DocumentStore> EduHub<S> {
    pub fn new(store: S, config: StoreConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Register every collection schema at the configured validation level
    /// and every unique constraint.
    pub fn setup(&self) -> Result<()> {
        self.config.validate()?;
        for schema in all_schemas() {
            let collection = schema.collection.clone();
            self.store
                .set_schema(&collection, schema, self.config.validation_level)?;
        }
        for (collection, constraint) in all_constraints() {
            self.store.create_unique_constraint(collection, constraint)?;
        }
        info!(
            database = %self.config.database_name,
            level = ?self.config.validation_level,
            "collections configured"
        );
        Ok(())
    }

    pub fn analytics(&self) -> Analytics<'_, S> {
        Analytics::new(&self.store)
    }

    fn repo<D: Entity>(&self) -> DocumentRepository<'_, S, D> {
        self.store.documents::<D>()
    }

    fn check(&self, check: RelationshipCheck<'_>) -> Result<()> {
        Ok(IntegrityValidator::new(&self.store).validate(&check)?)
    }

    // =========================================================================
    // Users
    // =========================================================================

    pub fn create_user(&self, user: &User) -> Result<User> {
        let user = self.repo::<User>().insert(user)?;
        info!(user_id = %user.user_id, "user created");
        Ok(user)
    }

    /// Create users independently; one outcome per input, in input order.
    pub fn create_users(&self, users: &[User]) -> Vec<Result<User>> {
        self.repo::<User>()
            .insert_many(users)
            .into_iter()
            .map(|r| r.map_err(Into::into))
            .collect()
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.repo::<User>().find_one(&Filter::eq("email", email))?)
    }

    /// Replace the user's profile sub-document.
    pub fn update_user_profile(&self, user_id: &str, profile: &Profile) -> Result<User> {
        let value = serde_json::to_value(profile).map_err(|e| {
            RepositoryError::from(DocumentError::Serde {
                collection: User::COLLECTION.to_string(),
                message: e.to_string(),
            })
        })?;
        let user = self.repo::<User>().update(user_id, patch([("profile", value)]))?;
        info!(user_id, "user profile updated");
        Ok(user)
    }

    pub fn deactivate_user(&self, user_id: &str) -> Result<User> {
        Ok(self.repo::<User>().soft_delete(user_id)?)
    }

    // =========================================================================
    // Courses
    // =========================================================================

    pub fn create_course(&self, course: &Course) -> Result<Course> {
        self.check(RelationshipCheck::CourseCreate {
            instructor_id: &course.instructor_id,
        })?;
        let course = self.repo::<Course>().insert(course)?;
        info!(course_id = %course.course_id, "course created");
        Ok(course)
    }

    pub fn search_courses(&self, search: &CourseSearch) -> Result<Vec<Course>> {
        let courses = self.repo::<Course>().find_with(&search.options())?;
        info!(found = courses.len(), "course search");
        Ok(courses)
    }

    pub fn publish_course(&self, course_id: &str) -> Result<Course> {
        let course = self
            .repo::<Course>()
            .update(course_id, patch([("isPublished", Value::Bool(true))]))?;
        info!(course_id, "course published");
        Ok(course)
    }

    pub fn unpublish_course(&self, course_id: &str) -> Result<Course> {
        Ok(self.repo::<Course>().soft_delete(course_id)?)
    }

    // =========================================================================
    // Enrollments
    // =========================================================================

    /// Enroll an active student in a published course. A concurrent
    /// duplicate that slips past the check is caught by the store's
    /// `active_enrollment` constraint and reported the same way.
    pub fn enroll_student(&self, student_id: &str, course_id: &str) -> Result<Enrollment> {
        self.check(RelationshipCheck::EnrollmentCreate {
            student_id,
            course_id,
        })?;

        let fields = patch([
            ("userId", Value::from(student_id)),
            ("courseId", Value::from(course_id)),
        ]);
        match self.repo::<Enrollment>().create(fields) {
            Ok(enrollment) => {
                info!(
                    enrollment_id = %enrollment.enrollment_id,
                    student_id,
                    course_id,
                    "student enrolled"
                );
                Ok(enrollment)
            }
            Err(e) if e.duplicate_constraint() == Some(ACTIVE_ENROLLMENT) => {
                warn!(student_id, course_id, "concurrent duplicate enrollment");
                Err(RelationshipViolation::DuplicateEnrollment {
                    student_id: student_id.to_string(),
                    course_id: course_id.to_string(),
                }
                .into())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_progress(&self, enrollment_id: &str, progress: f64) -> Result<Enrollment> {
        Ok(self
            .repo::<Enrollment>()
            .update(enrollment_id, patch([("progress", Value::from(progress))]))?)
    }

    pub fn complete_enrollment(&self, enrollment_id: &str) -> Result<Enrollment> {
        let enrollment = self.repo::<Enrollment>().update(
            enrollment_id,
            patch([
                ("status", Value::from(EnrollmentStatus::Completed.as_str())),
                ("progress", Value::from(100.0)),
            ]),
        )?;
        info!(enrollment_id, "enrollment completed");
        Ok(enrollment)
    }

    pub fn drop_enrollment(&self, enrollment_id: &str) -> Result<Enrollment> {
        Ok(self.repo::<Enrollment>().soft_delete(enrollment_id)?)
    }

    // =========================================================================
    // Lessons, assignments, submissions
    // =========================================================================

    pub fn create_lesson(&self, lesson: &Lesson) -> Result<Lesson> {
        self.check(RelationshipCheck::LessonCreate {
            course_id: &lesson.course_id,
        })?;
        Ok(self.repo::<Lesson>().insert(lesson)?)
    }

    pub fn create_assignment(&self, assignment: &Assignment) -> Result<Assignment> {
        self.check(RelationshipCheck::AssignmentCreate {
            course_id: &assignment.course_id,
        })?;
        Ok(self.repo::<Assignment>().insert(assignment)?)
    }

    pub fn submit_assignment(&self, submission: &Submission) -> Result<Submission> {
        self.check(RelationshipCheck::SubmissionCreate {
            assignment_id: &submission.assignment_id,
            student_id: &submission.student_id,
            grade: submission.grade,
        })?;
        let submission = self.repo::<Submission>().insert(submission)?;
        info!(submission_id = %submission.submission_id, "assignment submitted");
        Ok(submission)
    }

    /// Set the grade of a submission, bounded by its assignment's
    /// `maxPoints`.
    pub fn grade_submission(&self, submission_id: &str, grade: f64) -> Result<Submission> {
        let submission: Submission = self
            .repo::<Submission>()
            .get(submission_id)?
            .ok_or_else(|| RepositoryError::NotFound {
                collection: Submission::COLLECTION.to_string(),
                id: submission_id.to_string(),
            })?;
        IntegrityValidator::new(&self.store).check_grade(&submission.assignment_id, grade)?;
        let graded = self
            .repo::<Submission>()
            .update(submission_id, patch([("grade", Value::from(grade))]))?;
        info!(submission_id, grade, "submission graded");
        Ok(graded)
    }
}

fn patch<const N: usize>(entries: [(&str, Value); N]) -> Fields {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
