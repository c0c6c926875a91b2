use std::cmp::Ordering;
use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::document::{lookup_path, set_path, Fields, INTERNAL_ID};
use crate::filter::{sort_cmp, values_equal};

use super::expr::Expr;
use super::stage::{Accumulator, Group, Lookup, Project, Projection, Stage, Unwind};
use super::PipelineError;

/// Read access to the collections a `Lookup` stage joins against.
pub trait LookupSource {
    fn documents(&self, collection: &str) -> &[Fields];
}

pub(super) fn run(
    stages: &[Stage],
    mut docs: Vec<Fields>,
    source: &dyn LookupSource,
    limit: Option<usize>,
) -> Result<Vec<Fields>, PipelineError> {
    check_working_set(docs.len(), limit)?;
    for stage in stages {
        docs = match stage {
            Stage::Match(filter) => {
                let matcher = filter.matcher();
                docs.into_iter().filter(|d| matcher.matches(d)).collect()
            }
            Stage::Group(group) => run_group(group, docs),
            Stage::Lookup(lookup) => run_lookup(lookup, docs, source),
            Stage::Unwind(unwind) => run_unwind(unwind, docs),
            Stage::Project(project) => docs.iter().map(|d| run_project(project, d)).collect(),
            Stage::Sort(sort) => {
                sort.apply(&mut docs);
                docs
            }
            Stage::Limit(n) => {
                docs.truncate(*n);
                docs
            }
        };
        check_working_set(docs.len(), limit)?;
    }
    Ok(docs)
}

fn check_working_set(size: usize, limit: Option<usize>) -> Result<(), PipelineError> {
    match limit {
        Some(limit) if size > limit => Err(PipelineError::WorkingSetExceeded { size, limit }),
        _ => Ok(()),
    }
}

// =============================================================================
// Group
// =============================================================================

enum State {
    Sum { int: i64, float: f64, is_float: bool },
    Avg { total: f64, count: u64 },
    Max(Option<Value>),
    Min(Option<Value>),
    Set(Vec<Value>),
    Count(u64),
}

impl State {
    fn new(accumulator: &Accumulator) -> Self {
        match accumulator {
            Accumulator::Sum(_) => Self::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
            Accumulator::Avg(_) => Self::Avg {
                total: 0.0,
                count: 0,
            },
            Accumulator::Max(_) => Self::Max(None),
            Accumulator::Min(_) => Self::Min(None),
            Accumulator::AddToSet(_) => Self::Set(Vec::new()),
            Accumulator::Count => Self::Count(0),
        }
    }

    fn push(&mut self, value: Value) {
        match self {
            Self::Sum {
                int,
                float,
                is_float,
            } => {
                let Value::Number(n) = &value else { return };
                match n.as_i64().and_then(|x| int.checked_add(x)) {
                    Some(next) if !*is_float => *int = next,
                    _ => {
                        if !*is_float {
                            *is_float = true;
                            *float = *int as f64;
                        }
                        *float += n.as_f64().unwrap_or(0.0);
                    }
                }
            }
            Self::Avg { total, count } => {
                if let Some(x) = value.as_f64() {
                    *total += x;
                    *count += 1;
                }
            }
            Self::Max(best) => keep_extreme(best, value, Ordering::Greater),
            Self::Min(best) => keep_extreme(best, value, Ordering::Less),
            Self::Set(items) => {
                if !items.iter().any(|v| values_equal(v, &value)) {
                    items.push(value);
                }
            }
            Self::Count(n) => *n += 1,
        }
    }

    fn finish(self) -> Value {
        match self {
            Self::Sum {
                int,
                float,
                is_float,
            } => {
                if is_float {
                    Value::from(float)
                } else {
                    Value::from(int)
                }
            }
            Self::Avg { count: 0, .. } => Value::Null,
            Self::Avg { total, count } => Value::from(total / count as f64),
            Self::Max(v) | Self::Min(v) => v.unwrap_or(Value::Null),
            Self::Set(items) => Value::Array(items),
            Self::Count(n) => Value::from(n),
        }
    }
}

fn keep_extreme(best: &mut Option<Value>, value: Value, wanted: Ordering) {
    if value.is_null() {
        return;
    }
    let replace = match best {
        None => true,
        Some(current) => sort_cmp(Some(&value), Some(current)) == wanted,
    };
    if replace {
        *best = Some(value);
    }
}

fn run_group(group: &Group, docs: Vec<Fields>) -> Vec<Fields> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<(Value, Vec<State>)> = Vec::new();

    for doc in &docs {
        let key = group.key.evaluate(doc);
        let slot = *index.entry(bucket_key(&key)).or_insert_with(|| {
            let states = group
                .accumulators
                .iter()
                .map(|(_, a)| State::new(a))
                .collect();
            buckets.push((key, states));
            buckets.len() - 1
        });
        let (_, states) = &mut buckets[slot];
        for ((_, accumulator), state) in group.accumulators.iter().zip(states.iter_mut()) {
            let value = accumulator
                .expr()
                .map(|e: &Expr| e.evaluate(doc))
                .unwrap_or(Value::Null);
            state.push(value);
        }
    }

    buckets
        .into_iter()
        .map(|(key, states)| {
            let mut out = Map::new();
            out.insert(INTERNAL_ID.to_string(), key);
            for ((name, _), state) in group.accumulators.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect()
}

/// Bucket identity for a group key. Integral floats collapse onto the
/// integer they equal, so `80` and `80.0` share a bucket.
fn bucket_key(key: &Value) -> String {
    canonical(key).to_string()
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) if n.as_i64().is_none() && n.as_u64().is_none() => {
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= -(2f64.powi(63)) && f < 2f64.powi(63) => {
                    Value::from(f as i64)
                }
                Some(f) if f.fract() == 0.0 && f >= 0.0 && f < 2f64.powi(64) => {
                    Value::from(f as u64)
                }
                _ => value.clone(),
            }
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

// =============================================================================
// Lookup / Unwind / Project
// =============================================================================

fn run_lookup(lookup: &Lookup, mut docs: Vec<Fields>, source: &dyn LookupSource) -> Vec<Fields> {
    let foreign = source.documents(&lookup.from);
    for doc in &mut docs {
        let matches: Vec<Value> = match lookup_path(doc, &lookup.local_field) {
            None | Some(Value::Null) => Vec::new(),
            Some(local) => foreign
                .iter()
                .filter(|f| {
                    lookup_path(f, &lookup.foreign_field).is_some_and(|v| values_equal(v, local))
                })
                .map(|f| Value::Object(f.clone()))
                .collect(),
        };
        set_path(doc, &lookup.alias, Value::Array(matches));
    }
    docs
}

fn run_unwind(unwind: &Unwind, docs: Vec<Fields>) -> Vec<Fields> {
    let mut out = Vec::with_capacity(docs.len());
    for doc in docs {
        match lookup_path(&doc, &unwind.path).cloned() {
            Some(Value::Array(items)) if !items.is_empty() => {
                for item in items {
                    let mut copy = doc.clone();
                    set_path(&mut copy, &unwind.path, item);
                    out.push(copy);
                }
            }
            Some(Value::Array(_)) | Some(Value::Null) | None => {
                if unwind.preserve_null_and_empty {
                    out.push(doc);
                }
            }
            Some(_) => out.push(doc),
        }
    }
    out
}

fn run_project(project: &Project, doc: &Fields) -> Fields {
    let mut out = Map::new();
    for (name, projection) in &project.fields {
        match projection {
            Projection::Include => {
                if let Some(value) = lookup_path(doc, name) {
                    set_path(&mut out, name, value.clone());
                }
            }
            Projection::Computed(expr) => set_path(&mut out, name, expr.evaluate(doc)),
        }
    }
    out
}
