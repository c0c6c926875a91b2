//! DocumentRepository - typed accessor for entity CRUD over a DocumentStore.

use std::marker::PhantomData;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::document::{from_fields, lookup_path, to_fields, Fields, INTERNAL_ID};
use crate::filter::Filter;
use crate::model::Entity;
use crate::store::{DocumentStore, FindOptions, UniqueConstraint};

use super::error::RepositoryError;
use super::gettable::{GetMany, GetOne, Gettable};

/// Typed repository wrapper for documents of one entity kind.
pub struct DocumentRepository<'a, S, D> {
    store: &'a S,
    _marker: PhantomData<D>,
}

impl<'a, S: DocumentStore, D: Entity> DocumentRepository<'a, S, D> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Fill defaults, validate and insert a new document. Nothing is
    /// written when any check fails.
    pub fn create(&self, mut fields: Fields) -> Result<D, RepositoryError> {
        D::apply_defaults(&mut fields, Utc::now());
        D::schema()
            .validate(&fields)
            .map_err(|errors| RepositoryError::invalid(D::COLLECTION, errors))
            .inspect_err(|e| warn!(collection = D::COLLECTION, error = %e, "create rejected"))?;
        self.check_unique(&fields)?;
        let document: D = from_fields(fields.clone())?;

        self.store.insert(D::COLLECTION, fields)?;
        debug!(collection = D::COLLECTION, id = document.id(), "document created");
        Ok(document)
    }

    /// Typed equivalent of [`create`](Self::create).
    pub fn insert(&self, document: &D) -> Result<D, RepositoryError> {
        self.create(to_fields(document)?)
    }

    /// Create each document independently. One outcome per input, in order;
    /// a failure never stops the rest of the batch.
    pub fn create_many(&self, batch: Vec<Fields>) -> Vec<Result<D, RepositoryError>> {
        let results: Vec<_> = batch.into_iter().map(|fields| self.create(fields)).collect();
        let created = results.iter().filter(|r| r.is_ok()).count();
        info!(
            collection = D::COLLECTION,
            created,
            failed = results.len() - created,
            "bulk create finished"
        );
        results
    }

    /// Typed equivalent of [`create_many`](Self::create_many).
    pub fn insert_many(&self, documents: &[D]) -> Vec<Result<D, RepositoryError>> {
        let results: Vec<_> = documents.iter().map(|d| self.insert(d)).collect();
        let created = results.iter().filter(|r| r.is_ok()).count();
        info!(
            collection = D::COLLECTION,
            created,
            failed = results.len() - created,
            "bulk insert finished"
        );
        results
    }

    /// Get one document by id, or several by a list of ids.
    pub fn get<G: Gettable<D>>(&self, ids: G) -> Result<G::Output, RepositoryError> {
        ids.get_from(self)
    }

    pub fn find(&self, filter: &Filter) -> Result<Vec<D>, RepositoryError> {
        self.find_with(&FindOptions::new(filter.clone()))
    }

    pub fn find_with(&self, options: &FindOptions) -> Result<Vec<D>, RepositoryError> {
        self.store
            .find(D::COLLECTION, options)?
            .into_iter()
            .map(|fields| from_fields(fields).map_err(RepositoryError::from))
            .collect()
    }

    pub fn find_one(&self, filter: &Filter) -> Result<Option<D>, RepositoryError> {
        match self.store.find_one(D::COLLECTION, filter)? {
            Some(fields) => Ok(Some(from_fields(fields)?)),
            None => Ok(None),
        }
    }

    pub fn count(&self, filter: &Filter) -> Result<usize, RepositoryError> {
        Ok(self.store.count(D::COLLECTION, filter)?)
    }

    pub fn exists(&self, id: &str) -> Result<bool, RepositoryError> {
        Ok(self.count(&Self::by_id(id))? > 0)
    }

    /// Set the fields in `patch` on the document with this id. Immutable
    /// fields are rejected and only the provided fields are validated.
    pub fn update(&self, id: &str, mut patch: Fields) -> Result<D, RepositoryError> {
        if let Some(field) = patch.keys().find(|k| !D::is_mutable(k)) {
            warn!(collection = D::COLLECTION, id, field = %field, "immutable field in update");
            return Err(RepositoryError::ImmutableField {
                collection: D::COLLECTION.to_string(),
                field: field.clone(),
            });
        }
        D::schema()
            .validate_patch(&patch)
            .map_err(|errors| RepositoryError::invalid(D::COLLECTION, errors))?;
        D::touch(&mut patch, Utc::now());
        self.apply(id, &patch)
    }

    /// Flip the entity's soft-delete flag. Related documents are untouched.
    pub fn soft_delete(&self, id: &str) -> Result<D, RepositoryError> {
        let mut patch =
            D::soft_delete_patch().ok_or_else(|| RepositoryError::SoftDeleteUnsupported {
                collection: D::COLLECTION.to_string(),
            })?;
        D::touch(&mut patch, Utc::now());
        let document = self.apply(id, &patch)?;
        info!(collection = D::COLLECTION, id, "document soft-deleted");
        Ok(document)
    }

    fn apply(&self, id: &str, patch: &Fields) -> Result<D, RepositoryError> {
        let current = self
            .store
            .find_one(D::COLLECTION, &Self::by_id(id))?
            .ok_or_else(|| self.not_found(id))?;
        let mut merged = current.clone();
        merged.extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));

        // Only keys the patch changes, or constraints it brings the
        // document under, can collide.
        let exclude = current.get(INTERNAL_ID);
        for constraint in D::unique_constraints() {
            let key_changed = constraint
                .fields
                .iter()
                .any(|f| lookup_path(&current, f) != lookup_path(&merged, f));
            let entered = constraint.applies_to(&merged) && !constraint.applies_to(&current);
            if key_changed || entered {
                self.check_constraint(constraint, &merged, exclude)?;
            }
        }

        let result = self.store.update(D::COLLECTION, &Self::by_id(id), patch)?;
        if result.matched == 0 {
            return Err(self.not_found(id));
        }
        debug!(
            collection = D::COLLECTION,
            id,
            modified = result.modified,
            "document updated"
        );
        self.get_one(id)?.ok_or_else(|| self.not_found(id))
    }

    /// Look for an existing holder of any unique key `fields` would take.
    fn check_unique(&self, fields: &Fields) -> Result<(), RepositoryError> {
        for constraint in D::unique_constraints() {
            self.check_constraint(constraint, fields, None)?;
        }
        Ok(())
    }

    /// `exclude` is the `_id` of the document being replaced.
    fn check_constraint(
        &self,
        constraint: UniqueConstraint,
        fields: &Fields,
        exclude: Option<&Value>,
    ) -> Result<(), RepositoryError> {
        if !constraint.applies_to(fields) {
            return Ok(());
        }
        let values: Vec<Value> = constraint
            .fields
            .iter()
            .map(|f| lookup_path(fields, f).cloned().unwrap_or(Value::Null))
            .collect();
        let mut filter = constraint.partial.clone().unwrap_or_default();
        for (field, value) in constraint.fields.iter().zip(&values) {
            filter = filter.and(Filter::eq(field.as_str(), value.clone()));
        }
        if let Some(id) = exclude {
            filter = filter.and(Filter::ne(INTERNAL_ID, id.clone()));
        }
        if self.store.count(D::COLLECTION, &filter)? > 0 {
            warn!(collection = D::COLLECTION, constraint = %constraint.name, "duplicate key");
            return Err(RepositoryError::DuplicateKey {
                collection: D::COLLECTION.to_string(),
                constraint: constraint.name,
                key: Value::Array(values).to_string(),
            });
        }
        Ok(())
    }

    fn by_id(id: &str) -> Filter {
        Filter::eq(D::ID_FIELD, id)
    }

    fn not_found(&self, id: &str) -> RepositoryError {
        RepositoryError::NotFound {
            collection: D::COLLECTION.to_string(),
            id: id.to_string(),
        }
    }
}

impl<S: DocumentStore, D: Entity> GetOne<D> for DocumentRepository<'_, S, D> {
    fn get_one(&self, id: &str) -> Result<Option<D>, RepositoryError> {
        self.find_one(&Self::by_id(id))
    }
}

impl<S: DocumentStore, D: Entity> GetMany<D> for DocumentRepository<'_, S, D> {
    fn get_many(&self, ids: &[&str]) -> Result<Vec<D>, RepositoryError> {
        let values = ids.iter().map(|id| Value::from(*id)).collect();
        let mut found = self.find(&Filter::is_in(D::ID_FIELD, values))?;
        found.sort_by_key(|d| ids.iter().position(|id| *id == d.id()));
        Ok(found)
    }
}

/// Extension trait for typed document access on any DocumentStore.
pub trait DocumentsExt: DocumentStore + Sized {
    /// Get a typed repository for one entity kind.
    fn documents<D: Entity>(&self) -> DocumentRepository<'_, Self, D> {
        DocumentRepository::new(self)
    }
}

impl<S: DocumentStore> DocumentsExt for S {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Course, Enrollment, EnrollmentStatus, Lesson, Level, Role, User};
    use crate::store::InMemoryDocumentStore;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn create_fills_defaults_and_reads_back() {
        let store = InMemoryDocumentStore::new();
        let user = store
            .documents::<User>()
            .create(fields(json!({
                "userId": "U001",
                "email": "ada@example.com",
                "firstName": "Ada",
                "lastName": "Lovelace",
                "role": "student"
            })))
            .unwrap();
        assert!(user.is_active);

        let loaded: Option<User> = store.documents::<User>().get("U001").unwrap();
        assert_eq!(loaded.unwrap().email, "ada@example.com");
        let many: Vec<User> = store.documents::<User>().get(["U404", "U001"]).unwrap();
        assert_eq!(many.len(), 1);
    }

    #[test]
    fn create_reports_missing_field_before_writing() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .documents::<User>()
            .create(fields(json!({
                "userId": "U1",
                "firstName": "A",
                "lastName": "B",
                "role": "student"
            })))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::MissingField { ref field, .. } if field == "email"));
        assert_eq!(store.documents::<User>().count(&Filter::all()).unwrap(), 0);
    }

    #[test]
    fn update_rejects_immutable_fields_and_touches_course() {
        let store = InMemoryDocumentStore::new();
        let repo = store.documents::<Course>();
        let created = repo
            .insert(&Course::new("C001", "Rust", "U010", Level::Beginner))
            .unwrap();

        let err = repo
            .update("C001", fields(json!({"courseId": "C999"})))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::ImmutableField { .. }));

        let updated = repo
            .update("C001", fields(json!({"title": "Rust in Practice"})))
            .unwrap();
        assert_eq!(updated.title, "Rust in Practice");
        assert_eq!(updated.level, Level::Beginner);
        assert!(updated.updated_at >= created.updated_at);

        let err = repo.update("C404", fields(json!({"title": "x"}))).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn update_validates_only_provided_fields() {
        let store = InMemoryDocumentStore::new();
        store.documents::<Enrollment>().insert(&Enrollment::new("U1", "C1")).unwrap();
        let id = store.documents::<Enrollment>().find(&Filter::all()).unwrap()[0]
            .enrollment_id
            .clone();
        let err = store
            .documents::<Enrollment>()
            .update(&id, fields(json!({"progress": 150})))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Validation { .. }));
    }

    #[test]
    fn soft_delete_flips_flag_or_is_unsupported() {
        let store = InMemoryDocumentStore::new();
        store
            .documents::<User>()
            .insert(&User::new("U1", "a@x.io", "A", "B", Role::Student))
            .unwrap();
        let user = store.documents::<User>().soft_delete("U1").unwrap();
        assert!(!user.is_active);

        store
            .documents::<Lesson>()
            .insert(&Lesson::new("L1", "C1", "Intro", 0))
            .unwrap();
        let err = store.documents::<Lesson>().soft_delete("L1").unwrap_err();
        assert!(matches!(err, RepositoryError::SoftDeleteUnsupported { .. }));
    }

    #[test]
    fn duplicate_unique_key_is_rejected_without_registered_constraint() {
        let store = InMemoryDocumentStore::new();
        let repo = store.documents::<User>();
        repo.insert(&User::new("U1", "a@x.io", "A", "B", Role::Student)).unwrap();
        let err = repo
            .insert(&User::new("U2", "a@x.io", "C", "D", Role::Student))
            .unwrap_err();
        assert_eq!(err.duplicate_constraint(), Some("email"));
    }

    #[test]
    fn update_cannot_take_another_documents_unique_key() {
        let store = InMemoryDocumentStore::new();
        let users = store.documents::<User>();
        users.insert(&User::new("U1", "a@x.io", "A", "B", Role::Student)).unwrap();
        users.insert(&User::new("U2", "b@x.io", "C", "D", Role::Student)).unwrap();

        let err = users
            .update("U2", fields(json!({"email": "a@x.io"})))
            .unwrap_err();
        assert_eq!(err.duplicate_constraint(), Some("email"));
        assert_eq!(users.count(&Filter::eq("email", "a@x.io")).unwrap(), 1);

        // Rewriting a document's own key is not a clash.
        let same = users.update("U1", fields(json!({"email": "a@x.io"}))).unwrap();
        assert_eq!(same.email, "a@x.io");
        let renamed = users.update("U2", fields(json!({"email": "c@x.io"}))).unwrap();
        assert_eq!(renamed.email, "c@x.io");
    }

    #[test]
    fn update_cannot_reactivate_a_second_enrollment_for_the_pair() {
        let store = InMemoryDocumentStore::new();
        let enrollments = store.documents::<Enrollment>();
        let mut dropped = Enrollment::new("U1", "C1");
        dropped.status = EnrollmentStatus::Dropped;
        let dropped = enrollments.insert(&dropped).unwrap();
        enrollments.insert(&Enrollment::new("U1", "C1")).unwrap();

        let err = enrollments
            .update(&dropped.enrollment_id, fields(json!({"status": "active"})))
            .unwrap_err();
        assert_eq!(err.duplicate_constraint(), Some("active_enrollment"));
        assert_eq!(enrollments.count(&Filter::eq("status", "active")).unwrap(), 1);
    }
}
