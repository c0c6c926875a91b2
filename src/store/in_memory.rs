//! InMemoryDocumentStore - collection-per-Vec document store for tests and
//! embedded use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::document::{lookup_path, Fields, INTERNAL_ID};
use crate::filter::Filter;
use crate::pipeline::{LookupSource, Pipeline, PipelineError};
use crate::schema::{CollectionSchema, ValidationLevel};

use super::{
    AggregateOptions, DocumentStore, FindOptions, StoreError, UniqueConstraint, UpdateResult,
};

#[derive(Default)]
struct Collection {
    docs: Vec<Fields>,
    constraints: Vec<UniqueConstraint>,
    schema: Option<(CollectionSchema, ValidationLevel)>,
}

impl Collection {
    fn check_insert(&self, name: &str, doc: &Fields) -> Result<(), StoreError> {
        if let Some((schema, level)) = &self.schema {
            if *level != ValidationLevel::Off {
                schema
                    .validate(doc)
                    .map_err(|errors| StoreError::DocumentValidation {
                        collection: name.to_string(),
                        errors,
                    })?;
            }
        }
        let others: Vec<&Fields> = self.docs.iter().collect();
        self.check_unique(name, doc, &others)
    }

    /// Schema check for a replacement of `before` by `after`. Under
    /// `Moderate`, documents that already fail the schema are exempt.
    fn check_replace(&self, name: &str, before: &Fields, after: &Fields) -> Result<(), StoreError> {
        let Some((schema, level)) = &self.schema else {
            return Ok(());
        };
        let enforce = match level {
            ValidationLevel::Strict => true,
            ValidationLevel::Moderate => schema.validate(before).is_ok(),
            ValidationLevel::Off => false,
        };
        if enforce {
            schema
                .validate(after)
                .map_err(|errors| StoreError::DocumentValidation {
                    collection: name.to_string(),
                    errors,
                })?;
        }
        Ok(())
    }

    /// Reject `doc` if any of `others` holds the same key under any
    /// constraint.
    fn check_unique(&self, name: &str, doc: &Fields, others: &[&Fields]) -> Result<(), StoreError> {
        if let Some(id) = doc.get(INTERNAL_ID) {
            if others.iter().any(|other| other.get(INTERNAL_ID) == Some(id)) {
                return Err(StoreError::DuplicateKey {
                    collection: name.to_string(),
                    constraint: INTERNAL_ID.to_string(),
                    key: id.to_string(),
                });
            }
        }

        for constraint in &self.constraints {
            if !constraint.applies_to(doc) {
                continue;
            }
            let key = constraint_key(constraint, doc);
            let clash = others.iter().any(|other| {
                constraint.applies_to(other) && constraint_key(constraint, other) == key
            });
            if clash {
                return Err(StoreError::DuplicateKey {
                    collection: name.to_string(),
                    constraint: constraint.name.clone(),
                    key,
                });
            }
        }
        Ok(())
    }
}

/// Missing fields take part as null.
fn constraint_key(constraint: &UniqueConstraint, doc: &Fields) -> String {
    let values: Vec<Value> = constraint
        .fields
        .iter()
        .map(|f| lookup_path(doc, f).cloned().unwrap_or(Value::Null))
        .collect();
    Value::Array(values).to_string()
}

#[derive(Default)]
struct Collections(HashMap<String, Collection>);

impl LookupSource for Collections {
    fn documents(&self, collection: &str) -> &[Fields] {
        self.0
            .get(collection)
            .map(|c| c.docs.as_slice())
            .unwrap_or(&[])
    }
}

/// In-memory document store.
///
/// One lock guards every collection, so writes are serialised store-wide.
/// Clone-friendly via Arc; clones share the same data.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    inner: Arc<RwLock<Collections>>,
    config: StoreConfig,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Collections::default())),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// `_id`s of documents in `collection` that fail its current schema.
    pub fn non_conforming(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let guard = self.read(collection, "non_conforming", self.config.operation_timeout())?;
        let Some(coll) = guard.0.get(collection) else {
            return Ok(Vec::new());
        };
        let Some((schema, _)) = &coll.schema else {
            return Ok(Vec::new());
        };
        Ok(coll
            .docs
            .iter()
            .filter(|d| schema.validate(d).is_err())
            .filter_map(|d| d.get(INTERNAL_ID).and_then(Value::as_str).map(str::to_string))
            .collect())
    }

    fn read(
        &self,
        collection: &str,
        operation: &'static str,
        timeout: Duration,
    ) -> Result<RwLockReadGuard<'_, Collections>, StoreError> {
        self.inner
            .try_read_for(timeout)
            .ok_or_else(|| timed_out(collection, operation, timeout))
    }

    fn write(
        &self,
        collection: &str,
        operation: &'static str,
    ) -> Result<RwLockWriteGuard<'_, Collections>, StoreError> {
        let timeout = self.config.operation_timeout();
        self.inner
            .try_write_for(timeout)
            .ok_or_else(|| timed_out(collection, operation, timeout))
    }
}

fn timed_out(collection: &str, operation: &'static str, timeout: Duration) -> StoreError {
    warn!(collection, operation, ?timeout, "store lock timed out");
    StoreError::Timeout {
        collection: collection.to_string(),
        operation,
        timeout,
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn insert(&self, collection: &str, mut doc: Fields) -> Result<String, StoreError> {
        let id = match doc.get(INTERNAL_ID).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                doc.insert(INTERNAL_ID.to_string(), Value::String(id.clone()));
                id
            }
        };

        let mut guard = self.write(collection, "insert")?;
        let coll = guard.0.entry(collection.to_string()).or_default();
        coll.check_insert(collection, &doc)?;
        coll.docs.push(doc);
        debug!(collection, id = %id, "document inserted");
        Ok(id)
    }

    fn find(&self, collection: &str, options: &FindOptions) -> Result<Vec<Fields>, StoreError> {
        options.filter.validate()?;
        let guard = self.read(collection, "find", self.config.operation_timeout())?;
        let Some(coll) = guard.0.get(collection) else {
            return Ok(Vec::new());
        };

        let matcher = options.filter.matcher();
        let mut docs: Vec<Fields> = coll
            .docs
            .iter()
            .filter(|d| matcher.matches(d))
            .cloned()
            .collect();
        drop(guard);

        if let Some(sort) = &options.sort {
            sort.apply(&mut docs);
        }
        let docs: Vec<Fields> = docs
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        debug!(collection, returned = docs.len(), "find");
        Ok(docs)
    }

    fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Fields,
    ) -> Result<UpdateResult, StoreError> {
        filter.validate()?;
        let mut guard = self.write(collection, "update")?;
        let Some(coll) = guard.0.get_mut(collection) else {
            return Ok(UpdateResult::default());
        };

        // Stage every replacement first so a failing document leaves the
        // collection untouched.
        let matcher = filter.matcher();
        let mut staged = Vec::new();
        for (i, doc) in coll.docs.iter().enumerate() {
            if !matcher.matches(doc) {
                continue;
            }
            let mut next = doc.clone();
            for (key, value) in patch {
                if key != INTERNAL_ID {
                    next.insert(key.clone(), value.clone());
                }
            }
            let changed = next != *doc;
            if changed {
                coll.check_replace(collection, doc, &next)?;
            }
            staged.push((i, next, changed));
        }

        // Unique keys are checked against the collection as it will look
        // after the update, so staged documents also see each other.
        let replacements: HashMap<usize, &Fields> = staged
            .iter()
            .filter(|(_, _, changed)| *changed)
            .map(|(i, next, _)| (*i, next))
            .collect();
        let after: Vec<&Fields> = coll
            .docs
            .iter()
            .enumerate()
            .map(|(j, doc)| replacements.get(&j).copied().unwrap_or(doc))
            .collect();
        for (i, next, _) in staged.iter().filter(|(_, _, changed)| *changed) {
            let others: Vec<&Fields> = after
                .iter()
                .enumerate()
                .filter(|(j, _)| j != i)
                .map(|(_, doc)| *doc)
                .collect();
            coll.check_unique(collection, next, &others)?;
        }

        let mut result = UpdateResult {
            matched: staged.len(),
            modified: 0,
        };
        for (i, next, changed) in staged {
            if changed {
                coll.docs[i] = next;
                result.modified += 1;
            }
        }
        debug!(
            collection,
            matched = result.matched,
            modified = result.modified,
            "documents updated"
        );
        Ok(result)
    }

    fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
        options: &AggregateOptions,
    ) -> Result<Vec<Fields>, StoreError> {
        let timeout = options
            .timeout
            .unwrap_or_else(|| self.config.operation_timeout());
        let guard = self.read(collection, "aggregate", timeout)?;
        let input = guard.documents(collection).to_vec();
        let limit = (!options.allow_disk_use).then_some(self.config.max_working_set);

        let out = pipeline
            .execute(input, &*guard, limit)
            .map_err(|err| match err {
                PipelineError::WorkingSetExceeded { limit, .. } => {
                    StoreError::WorkingSetExceeded {
                        collection: collection.to_string(),
                        limit,
                    }
                }
                other => StoreError::Pipeline(other),
            })?;
        debug!(
            collection,
            stages = pipeline.stages().len(),
            returned = out.len(),
            "aggregate"
        );
        Ok(out)
    }

    fn create_unique_constraint(
        &self,
        collection: &str,
        constraint: UniqueConstraint,
    ) -> Result<(), StoreError> {
        let mut guard = self.write(collection, "create_unique_constraint")?;
        let coll = guard.0.entry(collection.to_string()).or_default();

        let mut seen = HashMap::new();
        for doc in coll.docs.iter().filter(|d| constraint.applies_to(d)) {
            let key = constraint_key(&constraint, doc);
            if seen.insert(key.clone(), ()).is_some() {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    constraint: constraint.name.clone(),
                    key,
                });
            }
        }

        debug!(collection, constraint = %constraint.name, "unique constraint registered");
        coll.constraints.retain(|c| c.name != constraint.name);
        coll.constraints.push(constraint);
        Ok(())
    }

    fn set_schema(
        &self,
        collection: &str,
        schema: CollectionSchema,
        level: ValidationLevel,
    ) -> Result<(), StoreError> {
        let mut guard = self.write(collection, "set_schema")?;
        let coll = guard.0.entry(collection.to_string()).or_default();
        debug!(collection, ?level, "schema applied");
        coll.schema = Some((schema, level));
        Ok(())
    }
}
