use serde_json::Value;

use crate::filter::{Filter, Sort};
use crate::model::Level;
use crate::store::FindOptions;

/// Course search criteria. Unset criteria do not filter.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseSearch {
    /// Whole-word match against title and description.
    pub keyword: Option<String>,
    pub category: Option<String>,
    pub level: Option<Level>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub published_only: bool,
    pub limit: Option<usize>,
}

impl Default for CourseSearch {
    fn default() -> Self {
        Self {
            keyword: None,
            category: None,
            level: None,
            min_price: None,
            max_price: None,
            published_only: true,
            limit: None,
        }
    }
}

impl CourseSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn level(mut self, level: Level) -> Self {
        self.level = Some(level);
        self
    }

    pub fn price_between(mut self, min: f64, max: f64) -> Self {
        self.min_price = Some(min);
        self.max_price = Some(max);
        self
    }

    pub fn include_unpublished(mut self) -> Self {
        self.published_only = false;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn filter(&self) -> Filter {
        let mut filter = Filter::all();
        if let Some(keyword) = &self.keyword {
            filter = filter.and(Filter::text(["title", "description"], keyword.as_str()));
        }
        if let Some(category) = &self.category {
            filter = filter.and(Filter::eq("category", category.as_str()));
        }
        if let Some(level) = self.level {
            filter = filter.and(Filter::eq("level", level.as_str()));
        }
        if let Some(min) = self.min_price {
            filter = filter.and(Filter::gte("price", min));
        }
        if let Some(max) = self.max_price {
            filter = filter.and(Filter::lte("price", max));
        }
        if self.published_only {
            filter = filter.and(Filter::eq("isPublished", Value::Bool(true)));
        }
        filter
    }

    pub(crate) fn options(&self) -> FindOptions {
        let options = FindOptions::new(self.filter()).sort(Sort::asc("title").then_asc("courseId"));
        match self.limit {
            Some(limit) => options.limit(limit),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_search_only_covers_published_courses() {
        assert_eq!(CourseSearch::new().filter(), Filter::eq("isPublished", true));
    }

    #[test]
    fn criteria_combine_with_and() {
        let search = CourseSearch::new()
            .keyword("rust")
            .level(Level::Beginner)
            .price_between(0.0, 50.0)
            .include_unpublished();
        let course = match json!({
            "title": "Practical Rust",
            "level": "beginner",
            "price": 20.0,
            "isPublished": false
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert!(search.filter().matches(&course));
        assert!(!search.clone().category("Design").filter().matches(&course));
    }
}
