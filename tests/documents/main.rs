//! Integration tests for the Document derive and typed repositories over
//! caller-defined entities.

mod views;

use eduhub::{
    to_fields, Document, DocumentsExt, Filter, InMemoryDocumentStore, RepositoryError,
};
use views::{Badge, Cohort, StudyNote};

#[test]
fn derive_defaults_and_overrides() {
    assert_eq!(StudyNote::COLLECTION, "study_notes");
    assert_eq!(StudyNote::ID_FIELD, "id");
    assert_eq!(Badge::COLLECTION, "badges");
    assert_eq!(Badge::ID_FIELD, "badgeCode");
    assert_eq!(Cohort::COLLECTION, "cohorts");
    assert_eq!(Cohort::ID_FIELD, "slug");

    let cohort = Cohort {
        key: "spring-25".into(),
        intake_year: 2025,
    };
    assert_eq!(cohort.id(), "spring-25");
    let fields = to_fields(&cohort).unwrap();
    assert_eq!(fields.get(Cohort::ID_FIELD).and_then(|v| v.as_str()), Some("spring-25"));
    assert!(fields.contains_key("intakeYear"));
}

#[test]
fn custom_entity_round_trips_through_repository() {
    let store = InMemoryDocumentStore::new();
    let badges = store.documents::<Badge>();

    badges.insert(&Badge::new("B1", "First steps")).unwrap();
    badges.insert(&Badge::new("B2", "Streak")).unwrap();

    let err = badges.insert(&Badge::new("B1", "Again")).unwrap_err();
    assert_eq!(err.duplicate_constraint(), Some("badgeCode"));

    let found: Option<Badge> = badges.get("B2").unwrap();
    assert_eq!(found.map(|b| b.label), Some("Streak".to_string()));
    let many: Vec<Badge> = badges.get(["B2", "missing", "B1"]).unwrap();
    let codes: Vec<&str> = many.iter().map(|b| b.id()).collect();
    assert_eq!(codes, ["B2", "B1"]);
}

#[test]
fn custom_entity_rules_apply_on_update_and_soft_delete() {
    let store = InMemoryDocumentStore::new();
    let badges = store.documents::<Badge>();
    badges.insert(&Badge::new("B1", "First steps")).unwrap();

    let mut patch = eduhub::Fields::new();
    patch.insert("label".into(), "Renamed".into());
    let err = badges.update("B1", patch).unwrap_err();
    assert!(matches!(err, RepositoryError::ImmutableField { ref field, .. } if field == "label"));

    let archived = badges.soft_delete("B1").unwrap();
    assert!(archived.archived);
    assert_eq!(badges.count(&Filter::eq("archived", true)).unwrap(), 1);

    let err = badges.soft_delete("B9").unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound { .. }));
}
