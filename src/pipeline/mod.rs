//! Aggregation pipelines as typed stage descriptors.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s built through
//! [`PipelineBuilder`], which rejects orderings that cannot produce the
//! intended result: a stage that reads a lookup alias before the lookup that
//! introduces it, or a field that an earlier `Group`/`Project` has already
//! reshaped away.
//!
//! ```ignore
//! let pipeline = Pipeline::builder()
//!     .lookup(Lookup::new("courses", "courseId", "courseId", "course"))
//!     .unwind("course")
//!     .group(Group::by(Expr::field("course.category")).accumulate("total", Accumulator::Count))
//!     .sort(Sort::desc("total"))
//!     .build()?;
//! ```

mod executor;
mod expr;
mod stage;

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::document::{root_of, Fields, INTERNAL_ID};
use crate::filter::{Filter, Sort};

pub use executor::LookupSource;
pub use expr::Expr;
pub use stage::{Accumulator, Group, Lookup, Project, Projection, Stage, Unwind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error(
        "stage {stage} ({kind}) reads `{field}`, which is only introduced by stage {introduced_at}"
    )]
    StageOrder {
        stage: usize,
        kind: &'static str,
        field: String,
        introduced_at: usize,
    },
    #[error(
        "stage {stage} ({kind}) reads `{field}`, which no longer exists after stage {shaped_at}"
    )]
    UnknownField {
        stage: usize,
        kind: &'static str,
        field: String,
        shaped_at: usize,
    },
    #[error("stage {stage} ({kind}): {message}")]
    InvalidStage {
        stage: usize,
        kind: &'static str,
        message: String,
    },
    #[error("intermediate result of {size} documents exceeds the working set of {limit}")]
    WorkingSetExceeded { size: usize, limit: usize },
}

/// A validated, ordered sequence of stages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Collections joined by `Lookup` stages.
    pub fn lookup_collections(&self) -> impl Iterator<Item = &str> {
        self.stages.iter().filter_map(|stage| match stage {
            Stage::Lookup(lookup) => Some(lookup.from.as_str()),
            _ => None,
        })
    }

    /// Run the pipeline over `input`. With a `working_set_limit`, any
    /// intermediate result larger than the limit fails instead of growing.
    pub fn execute(
        &self,
        input: Vec<Fields>,
        source: &dyn LookupSource,
        working_set_limit: Option<usize>,
    ) -> Result<Vec<Fields>, PipelineError> {
        executor::run(&self.stages, input, source, working_set_limit)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn matching(self, filter: Filter) -> Self {
        self.stage(Stage::Match(filter))
    }

    pub fn group(self, group: Group) -> Self {
        self.stage(Stage::Group(group))
    }

    pub fn lookup(self, lookup: Lookup) -> Self {
        self.stage(Stage::Lookup(lookup))
    }

    pub fn unwind(self, path: impl Into<String>) -> Self {
        self.stage(Stage::Unwind(Unwind {
            path: path.into(),
            preserve_null_and_empty: false,
        }))
    }

    pub fn unwind_preserving(self, path: impl Into<String>) -> Self {
        self.stage(Stage::Unwind(Unwind {
            path: path.into(),
            preserve_null_and_empty: true,
        }))
    }

    pub fn project(self, project: Project) -> Self {
        self.stage(Stage::Project(project))
    }

    pub fn sort(self, sort: Sort) -> Self {
        self.stage(Stage::Sort(sort))
    }

    pub fn limit(self, limit: usize) -> Self {
        self.stage(Stage::Limit(limit))
    }

    pub fn build(self) -> Result<Pipeline, PipelineError> {
        validate(&self.stages)?;
        Ok(Pipeline {
            stages: self.stages,
        })
    }
}

fn validate(stages: &[Stage]) -> Result<(), PipelineError> {
    let mut alias_origin: HashMap<&str, usize> = HashMap::new();
    for (i, stage) in stages.iter().enumerate() {
        if let Stage::Lookup(lookup) = stage {
            alias_origin.entry(lookup.alias.as_str()).or_insert(i);
        }
    }

    // None while documents still have their source shape.
    let mut shape: Option<(usize, HashSet<String>)> = None;
    let mut joined: HashSet<&str> = HashSet::new();

    for (i, stage) in stages.iter().enumerate() {
        check_stage(i, stage)?;

        for field in stage.referenced_fields() {
            let root = root_of(field);
            let available = match &shape {
                None => joined.contains(root) || !alias_origin.contains_key(root),
                Some((_, fields)) => fields.contains(root),
            };
            if available {
                continue;
            }
            if let Some(&origin) = alias_origin.get(root) {
                if origin >= i {
                    return Err(PipelineError::StageOrder {
                        stage: i,
                        kind: stage.kind(),
                        field: field.to_string(),
                        introduced_at: origin,
                    });
                }
            }
            if let Some((shaped_at, _)) = &shape {
                return Err(PipelineError::UnknownField {
                    stage: i,
                    kind: stage.kind(),
                    field: field.to_string(),
                    shaped_at: *shaped_at,
                });
            }
        }

        match stage {
            Stage::Lookup(lookup) => {
                joined.insert(&lookup.alias);
                if let Some((_, fields)) = &mut shape {
                    fields.insert(lookup.alias.clone());
                }
            }
            Stage::Group(group) => {
                let fields = std::iter::once(INTERNAL_ID.to_string())
                    .chain(group.accumulators.iter().map(|(name, _)| name.clone()))
                    .collect();
                shape = Some((i, fields));
            }
            Stage::Project(project) => {
                let fields = project
                    .fields
                    .iter()
                    .map(|(name, _)| root_of(name).to_string())
                    .collect();
                shape = Some((i, fields));
            }
            _ => {}
        }
    }

    Ok(())
}

fn check_stage(index: usize, stage: &Stage) -> Result<(), PipelineError> {
    let invalid = |message: String| PipelineError::InvalidStage {
        stage: index,
        kind: stage.kind(),
        message,
    };

    match stage {
        Stage::Match(filter) => filter.validate().map_err(|e| invalid(e.to_string())),
        Stage::Lookup(lookup) if lookup.alias.is_empty() || lookup.from.is_empty() => {
            Err(invalid("lookup needs a source collection and an alias".into()))
        }
        Stage::Unwind(unwind) if unwind.path.is_empty() => {
            Err(invalid("unwind needs a path".into()))
        }
        Stage::Sort(sort) if sort.is_empty() => Err(invalid("sort needs at least one key".into())),
        Stage::Project(project) if project.fields.is_empty() => {
            Err(invalid("project needs at least one field".into()))
        }
        Stage::Group(group) => {
            let mut seen = HashSet::new();
            for (name, _) in &group.accumulators {
                if name == INTERNAL_ID || !seen.insert(name.as_str()) {
                    return Err(invalid(format!("duplicate or reserved output field `{}`", name)));
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category_group() -> Group {
        Group::by(Expr::field("course.category"))
            .accumulate("total", Accumulator::Count)
            .accumulate("students", Accumulator::AddToSet(Expr::field("userId")))
    }

    #[test]
    fn accepts_lookup_before_group_on_joined_field() {
        let pipeline = Pipeline::builder()
            .lookup(Lookup::new("courses", "courseId", "courseId", "course"))
            .unwind("course")
            .group(category_group())
            .project(
                Project::new()
                    .computed("category", Expr::field("_id"))
                    .include("total")
                    .computed("uniqueStudents", Expr::size(Expr::field("students"))),
            )
            .sort(Sort::desc("total"))
            .build()
            .unwrap();
        assert_eq!(pipeline.stages().len(), 5);
        assert_eq!(pipeline.lookup_collections().collect::<Vec<_>>(), vec!["courses"]);
    }

    #[test]
    fn rejects_group_before_the_lookup_it_depends_on() {
        let err = Pipeline::builder()
            .group(category_group())
            .lookup(Lookup::new("courses", "courseId", "courseId", "course"))
            .unwind("course")
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            PipelineError::StageOrder {
                stage: 0,
                kind: "group",
                field: "course.category".into(),
                introduced_at: 1,
            }
        );
    }

    #[test]
    fn rejects_fields_dropped_by_group() {
        let err = Pipeline::builder()
            .group(Group::by(Expr::field("courseId")).accumulate("total", Accumulator::Count))
            .sort(Sort::desc("enrolledAt"))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnknownField { stage: 1, shaped_at: 0, .. }
        ));
    }

    #[test]
    fn lookup_after_group_extends_the_shape() {
        let pipeline = Pipeline::builder()
            .group(Group::by(Expr::field("courseId")).accumulate("total", Accumulator::Count))
            .lookup(Lookup::new("courses", "_id", "courseId", "course"))
            .unwind("course")
            .project(
                Project::new()
                    .computed("title", Expr::field("course.title"))
                    .include("total"),
            )
            .build();
        assert!(pipeline.is_ok());
    }

    #[test]
    fn rejects_invalid_stages() {
        assert!(matches!(
            Pipeline::builder().sort(Sort::default()).build(),
            Err(PipelineError::InvalidStage { kind: "sort", .. })
        ));
        assert!(matches!(
            Pipeline::builder()
                .matching(Filter::regex("title", "(unclosed"))
                .build(),
            Err(PipelineError::InvalidStage { kind: "match", .. })
        ));
        assert!(matches!(
            Pipeline::builder()
                .group(
                    Group::by(Expr::field("a"))
                        .accumulate("n", Accumulator::Count)
                        .accumulate("n", Accumulator::Count)
                )
                .build(),
            Err(PipelineError::InvalidStage { kind: "group", .. })
        ));
    }
}
