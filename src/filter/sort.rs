use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::document::{lookup_path, Fields};

use super::sort_cmp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Multi-key sort specification. Earlier keys take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sort {
    pub keys: Vec<(String, SortOrder)>,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self::default().then_asc(field)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::default().then_desc(field)
    }

    pub fn then_asc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Ascending));
        self
    }

    pub fn then_desc(mut self, field: impl Into<String>) -> Self {
        self.keys.push((field.into(), SortOrder::Descending));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(field, _)| field.as_str())
    }

    pub fn compare(&self, a: &Fields, b: &Fields) -> Ordering {
        for (field, order) in &self.keys {
            let ord = sort_cmp(lookup_path(a, field), lookup_path(b, field));
            let ord = match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Stable sort in place.
    pub fn apply(&self, docs: &mut [Fields]) {
        if !self.is_empty() {
            docs.sort_by(|a, b| self.compare(a, b));
        }
    }
}
