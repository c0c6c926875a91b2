//! Referential integrity between entity kinds.
//!
//! The store only enforces unique constraints, so relationship-creating
//! writes are checked here first. Every check is read-only and finishes
//! before the caller writes anything.

use thiserror::Error;
use tracing::{debug, warn};

use crate::filter::Filter;
use crate::model::{Assignment, Course, Enrollment, EnrollmentStatus, Role, User};
use crate::repository::{DocumentsExt, RepositoryError};
use crate::store::DocumentStore;

/// A relationship about to be created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelationshipCheck<'a> {
    EnrollmentCreate {
        student_id: &'a str,
        course_id: &'a str,
    },
    LessonCreate {
        course_id: &'a str,
    },
    AssignmentCreate {
        course_id: &'a str,
    },
    SubmissionCreate {
        assignment_id: &'a str,
        student_id: &'a str,
        grade: Option<f64>,
    },
    CourseCreate {
        instructor_id: &'a str,
    },
}

impl RelationshipCheck<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EnrollmentCreate { .. } => "enrollment_create",
            Self::LessonCreate { .. } => "lesson_create",
            Self::AssignmentCreate { .. } => "assignment_create",
            Self::SubmissionCreate { .. } => "submission_create",
            Self::CourseCreate { .. } => "course_create",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelationshipViolation {
    #[error("user {student_id} cannot enroll or submit: {reason}")]
    StudentNotEligible {
        student_id: String,
        reason: &'static str,
    },
    #[error("course {course_id} is not available for enrollment: {reason}")]
    CourseNotAvailable {
        course_id: String,
        reason: &'static str,
    },
    #[error("user {student_id} already has an active enrollment in course {course_id}")]
    DuplicateEnrollment {
        student_id: String,
        course_id: String,
    },
    #[error("instructor {instructor_id} not found")]
    InstructorNotFound { instructor_id: String },
    #[error("course {course_id} not found")]
    CourseNotFound { course_id: String },
    #[error("assignment {assignment_id} not found")]
    AssignmentNotFound { assignment_id: String },
    #[error("grade {grade} is outside [0, {max_points}]")]
    GradeOutOfRange { grade: f64, max_points: u32 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrityError {
    #[error(transparent)]
    Violation(#[from] RelationshipViolation),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl IntegrityError {
    pub fn is_transient(&self) -> bool {
        matches!(self, IntegrityError::Repository(e) if e.is_transient())
    }

    pub fn violation(&self) -> Option<&RelationshipViolation> {
        match self {
            IntegrityError::Violation(v) => Some(v),
            IntegrityError::Repository(_) => None,
        }
    }
}

/// Cross-entity existence and state checks run before a write.
pub struct IntegrityValidator<'a, S> {
    store: &'a S,
}

impl<'a, S: DocumentStore> IntegrityValidator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn validate(&self, check: &RelationshipCheck<'_>) -> Result<(), IntegrityError> {
        let outcome = match *check {
            RelationshipCheck::EnrollmentCreate {
                student_id,
                course_id,
            } => self.check_enrollment(student_id, course_id),
            RelationshipCheck::LessonCreate { course_id }
            | RelationshipCheck::AssignmentCreate { course_id } => {
                self.course(course_id).map(|_| ())
            }
            RelationshipCheck::SubmissionCreate {
                assignment_id,
                student_id,
                grade,
            } => self.check_submission(assignment_id, student_id, grade),
            RelationshipCheck::CourseCreate { instructor_id } => {
                self.check_instructor(instructor_id)
            }
        };

        match &outcome {
            Ok(()) => debug!(check = check.kind(), "relationship check passed"),
            Err(IntegrityError::Violation(v)) => {
                warn!(check = check.kind(), violation = %v, "relationship check failed")
            }
            Err(_) => {}
        }
        outcome
    }

    /// A grade is valid when it lies within `[0, maxPoints]` of its
    /// assignment.
    pub fn check_grade(&self, assignment_id: &str, grade: f64) -> Result<(), IntegrityError> {
        let assignment = self.assignment(assignment_id)?;
        grade_in_range(grade, assignment.max_points)
    }

    fn check_enrollment(&self, student_id: &str, course_id: &str) -> Result<(), IntegrityError> {
        self.eligible_student(student_id)?;

        let course = self
            .store
            .documents::<Course>()
            .find_one(&Filter::eq("courseId", course_id))?
            .ok_or_else(|| RelationshipViolation::CourseNotAvailable {
                course_id: course_id.to_string(),
                reason: "course does not exist",
            })?;
        if !course.is_published {
            return Err(RelationshipViolation::CourseNotAvailable {
                course_id: course_id.to_string(),
                reason: "course is not published",
            }
            .into());
        }

        let active = Filter::eq("userId", student_id)
            .and(Filter::eq("courseId", course_id))
            .and(Filter::eq("status", EnrollmentStatus::Active.as_str()));
        if self.store.documents::<Enrollment>().count(&active)? > 0 {
            return Err(RelationshipViolation::DuplicateEnrollment {
                student_id: student_id.to_string(),
                course_id: course_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn check_submission(
        &self,
        assignment_id: &str,
        student_id: &str,
        grade: Option<f64>,
    ) -> Result<(), IntegrityError> {
        let assignment = self.assignment(assignment_id)?;
        self.eligible_student(student_id)?;
        match grade {
            Some(grade) => grade_in_range(grade, assignment.max_points),
            None => Ok(()),
        }
    }

    fn check_instructor(&self, instructor_id: &str) -> Result<(), IntegrityError> {
        let filter = Filter::eq("userId", instructor_id)
            .and(Filter::eq("role", Role::Instructor.as_str()));
        let instructor = self.store.documents::<User>().find_one(&filter)?;
        match instructor {
            Some(_) => Ok(()),
            None => Err(RelationshipViolation::InstructorNotFound {
                instructor_id: instructor_id.to_string(),
            }
            .into()),
        }
    }

    fn eligible_student(&self, student_id: &str) -> Result<User, IntegrityError> {
        let not_eligible = |reason| RelationshipViolation::StudentNotEligible {
            student_id: student_id.to_string(),
            reason,
        };
        let user = self
            .store
            .documents::<User>()
            .find_one(&Filter::eq("userId", student_id))?
            .ok_or_else(|| not_eligible("user does not exist"))?;
        if user.role != Role::Student {
            return Err(not_eligible("user is not a student").into());
        }
        if !user.is_active {
            return Err(not_eligible("user is inactive").into());
        }
        Ok(user)
    }

    fn course(&self, course_id: &str) -> Result<Course, IntegrityError> {
        self.store
            .documents::<Course>()
            .find_one(&Filter::eq("courseId", course_id))?
            .ok_or_else(|| {
                RelationshipViolation::CourseNotFound {
                    course_id: course_id.to_string(),
                }
                .into()
            })
    }

    fn assignment(&self, assignment_id: &str) -> Result<Assignment, IntegrityError> {
        self.store
            .documents::<Assignment>()
            .find_one(&Filter::eq("assignmentId", assignment_id))?
            .ok_or_else(|| {
                RelationshipViolation::AssignmentNotFound {
                    assignment_id: assignment_id.to_string(),
                }
                .into()
            })
    }
}

fn grade_in_range(grade: f64, max_points: u32) -> Result<(), IntegrityError> {
    if (0.0..=f64::from(max_points)).contains(&grade) {
        Ok(())
    } else {
        Err(RelationshipViolation::GradeOutOfRange { grade, max_points }.into())
    }
}
