mod support;

use eduhub::{
    DocumentsExt, Enrollment, EnrollmentStatus, Error, Filter, RelationshipViolation,
    RepositoryError, Submission,
};
use std::thread;
use support::{seeded_hub, Hub};

fn enrollments_for(hub: &Hub, student_id: &str, course_id: &str) -> Vec<Enrollment> {
    hub.store()
        .documents::<Enrollment>()
        .find(&Filter::eq("userId", student_id).and(Filter::eq("courseId", course_id)))
        .unwrap()
}

fn violation(result: eduhub::Result<Enrollment>) -> RelationshipViolation {
    result
        .unwrap_err()
        .relationship()
        .cloned()
        .expect("expected a relationship violation")
}

#[test]
fn enroll_then_re_enroll_is_a_duplicate() {
    let hub = seeded_hub();

    let enrollment = hub.enroll_student("U001", "C001").unwrap();
    assert_eq!(enrollment.status, EnrollmentStatus::Active);
    assert_eq!(enrollment.progress, 0.0);
    assert!(enrollment.enrollment_id.starts_with("E-"));

    assert_eq!(
        violation(hub.enroll_student("U001", "C001")),
        RelationshipViolation::DuplicateEnrollment {
            student_id: "U001".into(),
            course_id: "C001".into(),
        }
    );
    assert_eq!(enrollments_for(&hub, "U001", "C001").len(), 1);
}

#[test]
fn ineligible_students_write_nothing() {
    let hub = seeded_hub();

    // Inactive student.
    assert!(matches!(
        violation(hub.enroll_student("U003", "C001")),
        RelationshipViolation::StudentNotEligible { .. }
    ));
    // Instructors cannot enroll.
    assert!(matches!(
        violation(hub.enroll_student("U010", "C001")),
        RelationshipViolation::StudentNotEligible { .. }
    ));
    // Unknown user.
    assert!(matches!(
        violation(hub.enroll_student("U999", "C001")),
        RelationshipViolation::StudentNotEligible { .. }
    ));

    let total = hub
        .store()
        .documents::<Enrollment>()
        .count(&Filter::all())
        .unwrap();
    assert_eq!(total, 0);
}

#[test]
fn unpublished_course_is_not_available() {
    let hub = seeded_hub();

    assert!(matches!(
        violation(hub.enroll_student("U001", "C003")),
        RelationshipViolation::CourseNotAvailable { .. }
    ));
    assert!(enrollments_for(&hub, "U001", "C003").is_empty());

    hub.publish_course("C003").unwrap();
    assert!(hub.enroll_student("U001", "C003").is_ok());

    // Unpublishing keeps existing enrollments but blocks new ones.
    hub.unpublish_course("C003").unwrap();
    assert!(matches!(
        violation(hub.enroll_student("U002", "C003")),
        RelationshipViolation::CourseNotAvailable { .. }
    ));
    assert_eq!(enrollments_for(&hub, "U001", "C003").len(), 1);
}

#[test]
fn dropped_or_completed_enrollments_allow_a_new_one() {
    let hub = seeded_hub();

    let first = hub.enroll_student("U001", "C001").unwrap();
    let dropped = hub.drop_enrollment(&first.enrollment_id).unwrap();
    assert_eq!(dropped.status, EnrollmentStatus::Dropped);

    let second = hub.enroll_student("U001", "C001").unwrap();
    let completed = hub.complete_enrollment(&second.enrollment_id).unwrap();
    assert_eq!(completed.status, EnrollmentStatus::Completed);
    assert_eq!(completed.progress, 100.0);

    hub.enroll_student("U001", "C001").unwrap();
    assert_eq!(enrollments_for(&hub, "U001", "C001").len(), 3);
}

#[test]
fn deactivated_student_can_no_longer_enroll() {
    let hub = seeded_hub();
    let user = hub.deactivate_user("U002").unwrap();
    assert!(!user.is_active);
    assert!(matches!(
        violation(hub.enroll_student("U002", "C002")),
        RelationshipViolation::StudentNotEligible { .. }
    ));
}

#[test]
fn concurrent_enrollments_for_one_pair_admit_exactly_one() {
    let hub = seeded_hub();

    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| hub.enroll_student("U002", "C002")))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for outcome in outcomes.iter().filter(|r| r.is_err()) {
        let err = outcome.as_ref().unwrap_err();
        assert!(matches!(
            err.relationship(),
            Some(RelationshipViolation::DuplicateEnrollment { .. })
        ));
    }
    assert_eq!(enrollments_for(&hub, "U002", "C002").len(), 1);
}

#[test]
fn progress_is_validated_and_the_pair_is_immutable() {
    let hub = seeded_hub();
    let enrollment = hub.enroll_student("U001", "C001").unwrap();

    let updated = hub.update_progress(&enrollment.enrollment_id, 42.5).unwrap();
    assert_eq!(updated.progress, 42.5);

    let err = hub
        .update_progress(&enrollment.enrollment_id, 140.0)
        .unwrap_err();
    assert!(matches!(err, Error::Repository(RepositoryError::Validation { .. })));

    let mut patch = eduhub::Fields::new();
    patch.insert("courseId".into(), "C002".into());
    let err = hub
        .store()
        .documents::<Enrollment>()
        .update(&enrollment.enrollment_id, patch)
        .unwrap_err();
    assert!(matches!(
        err,
        RepositoryError::ImmutableField { ref field, .. } if field == "courseId"
    ));

    let err = hub.update_progress("E-missing", 10.0).unwrap_err();
    assert!(matches!(err, Error::Repository(RepositoryError::NotFound { .. })));
}

#[test]
fn submissions_and_grades_are_checked_against_the_assignment() {
    let hub = seeded_hub();

    let submission = hub
        .submit_assignment(&Submission::new("S001", "A001", "U001"))
        .unwrap();
    assert_eq!(submission.grade, None);

    let graded = hub.grade_submission("S001", 88.0).unwrap();
    assert_eq!(graded.grade, Some(88.0));

    let err = hub.grade_submission("S001", 101.0).unwrap_err();
    assert_eq!(
        err.relationship(),
        Some(&RelationshipViolation::GradeOutOfRange {
            grade: 101.0,
            max_points: 100
        })
    );

    let err = hub
        .submit_assignment(&Submission::new("S002", "A404", "U001"))
        .unwrap_err();
    assert!(matches!(
        err.relationship(),
        Some(RelationshipViolation::AssignmentNotFound { .. })
    ));

    let err = hub
        .submit_assignment(&Submission::new("S003", "A001", "U010"))
        .unwrap_err();
    assert!(matches!(
        err.relationship(),
        Some(RelationshipViolation::StudentNotEligible { .. })
    ));
}

#[test]
fn lessons_and_assignments_require_an_existing_course() {
    let hub = seeded_hub();
    assert!(hub
        .create_lesson(&eduhub::Lesson::new("L001", "C001", "Hello, Cargo", 0))
        .is_ok());
    let err = hub
        .create_lesson(&eduhub::Lesson::new("L002", "C404", "Orphan", 1))
        .unwrap_err();
    assert_eq!(
        err.relationship(),
        Some(&RelationshipViolation::CourseNotFound {
            course_id: "C404".into()
        })
    );
}
