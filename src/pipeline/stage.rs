use serde::{Deserialize, Serialize};

use crate::filter::{Filter, Sort};

use super::expr::Expr;

/// Group accumulator. `Avg`, `Max` and `Min` ignore null and missing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Accumulator {
    Sum(Expr),
    Avg(Expr),
    Max(Expr),
    Min(Expr),
    AddToSet(Expr),
    Count,
}

impl Accumulator {
    pub(crate) fn expr(&self) -> Option<&Expr> {
        match self {
            Self::Sum(e) | Self::Avg(e) | Self::Max(e) | Self::Min(e) | Self::AddToSet(e) => {
                Some(e)
            }
            Self::Count => None,
        }
    }
}

/// Groups documents by `key`; each output document is `{_id: key, ...accumulators}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub key: Expr,
    pub accumulators: Vec<(String, Accumulator)>,
}

impl Group {
    pub fn by(key: Expr) -> Self {
        Self {
            key,
            accumulators: Vec::new(),
        }
    }

    pub fn accumulate(mut self, name: impl Into<String>, accumulator: Accumulator) -> Self {
        self.accumulators.push((name.into(), accumulator));
        self
    }
}

/// Left outer join: `alias` receives the array of `from` documents whose
/// `foreign_field` equals the local `local_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup {
    pub from: String,
    pub local_field: String,
    pub foreign_field: String,
    pub alias: String,
}

impl Lookup {
    pub fn new(
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            alias: alias.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unwind {
    pub path: String,
    /// Keep documents whose array is missing, null or empty.
    pub preserve_null_and_empty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    Include,
    Computed(Expr),
}

/// Reshapes each document to exactly the listed fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Project {
    pub fields: Vec<(String, Projection)>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), Projection::Include));
        self
    }

    pub fn computed(mut self, field: impl Into<String>, expr: Expr) -> Self {
        self.fields.push((field.into(), Projection::Computed(expr)));
        self
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    Match(Filter),
    Group(Group),
    Lookup(Lookup),
    Unwind(Unwind),
    Project(Project),
    Sort(Sort),
    Limit(usize),
}

impl Stage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Match(_) => "match",
            Self::Group(_) => "group",
            Self::Lookup(_) => "lookup",
            Self::Unwind(_) => "unwind",
            Self::Project(_) => "project",
            Self::Sort(_) => "sort",
            Self::Limit(_) => "limit",
        }
    }

    /// Fields of the incoming documents this stage reads.
    pub(crate) fn referenced_fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        match self {
            Self::Match(filter) => out.extend(filter.fields()),
            Self::Group(group) => {
                group.key.collect_fields(&mut out);
                for (_, accumulator) in &group.accumulators {
                    if let Some(expr) = accumulator.expr() {
                        expr.collect_fields(&mut out);
                    }
                }
            }
            Self::Lookup(lookup) => out.push(&lookup.local_field),
            Self::Unwind(unwind) => out.push(&unwind.path),
            Self::Project(project) => {
                for (name, projection) in &project.fields {
                    match projection {
                        Projection::Include => out.push(name),
                        Projection::Computed(expr) => expr.collect_fields(&mut out),
                    }
                }
            }
            Self::Sort(sort) => out.extend(sort.fields()),
            Self::Limit(_) => {}
        }
        out
    }
}
