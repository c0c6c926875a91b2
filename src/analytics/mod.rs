//! Named aggregation reports over enrollments and submissions.
//!
//! Each [`Report`] builds a validated [`Pipeline`] against one collection;
//! [`Analytics`] runs it through the store and decodes the rows into typed
//! results.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::document::Document;
use crate::filter::{Filter, Sort};
use crate::model::{timestamp, Course, Enrollment, EnrollmentStatus, Level, Submission};
use crate::pipeline::{Accumulator, Expr, Group, Lookup, Pipeline, PipelineError, Project};
use crate::store::{AggregateOptions, DocumentStore, StoreError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
    #[error("student {student_id} has no graded submissions")]
    NoGradedSubmissions { student_id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{report}: could not decode result row: {message}")]
    Decode {
        report: &'static str,
        message: String,
    },
}

impl AnalyticsError {
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyticsError::Store(e) if e.is_transient())
    }
}

// =============================================================================
// Result rows
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEnrollmentStats {
    pub course_id: String,
    pub title: String,
    pub category: Option<String>,
    pub total_enrollments: u64,
    pub active_enrollments: u64,
    pub completed_enrollments: u64,
    /// Percent of enrollments completed, 0 to 100.
    pub completion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPopularity {
    pub category: Option<String>,
    pub total_enrollments: u64,
    pub unique_students: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformance {
    pub student_id: String,
    pub total_submissions: u64,
    pub average_grade: f64,
    pub highest_grade: f64,
    pub lowest_grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentEnrollment {
    pub enrollment_id: String,
    pub course_id: String,
    pub enrolled_at: DateTime<Utc>,
    pub status: EnrollmentStatus,
    pub progress: f64,
    pub course_title: String,
    pub course_category: Option<String>,
    pub course_level: Level,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentTrend {
    pub year: i32,
    pub month: u32,
    pub count: u64,
}

/// Raw performance row; grade aggregates are null when nothing is graded.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerformanceRow {
    total_submissions: u64,
    average_grade: Option<f64>,
    highest_grade: Option<f64>,
    lowest_grade: Option<f64>,
}

// =============================================================================
// Reports
// =============================================================================

/// A named aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Report<'a> {
    CourseEnrollmentStats,
    CategoryPopularity,
    StudentPerformance { student_id: &'a str },
    StudentEnrollments { student_id: &'a str },
    EnrollmentTrends { since: DateTime<Utc> },
}

impl Report<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CourseEnrollmentStats => "course_enrollment_stats",
            Self::CategoryPopularity => "category_popularity",
            Self::StudentPerformance { .. } => "student_performance",
            Self::StudentEnrollments { .. } => "student_enrollments",
            Self::EnrollmentTrends { .. } => "enrollment_trends",
        }
    }

    /// Collection the pipeline starts from.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::StudentPerformance { .. } => Submission::COLLECTION,
            _ => Enrollment::COLLECTION,
        }
    }

    pub fn pipeline(&self) -> Result<Pipeline, PipelineError> {
        match *self {
            Self::CourseEnrollmentStats => course_enrollment_stats(),
            Self::CategoryPopularity => category_popularity(),
            Self::StudentPerformance { student_id } => student_performance(student_id),
            Self::StudentEnrollments { student_id } => student_enrollments(student_id),
            Self::EnrollmentTrends { since } => enrollment_trends(since),
        }
    }

    /// Whole-collection reports may outgrow the working set.
    fn allow_disk_use(&self) -> bool {
        matches!(self, Self::CourseEnrollmentStats)
    }
}

fn join_course(local_field: &str) -> Lookup {
    Lookup::new(Course::COLLECTION, local_field, "courseId", "course")
}

fn course_enrollment_stats() -> Result<Pipeline, PipelineError> {
    let completion_rate = Expr::cond(
        Expr::equals(Expr::field("totalEnrollments"), Expr::literal(0)),
        Expr::literal(0),
        Expr::multiply(vec![
            Expr::divide(
                Expr::field("completedEnrollments"),
                Expr::field("totalEnrollments"),
            ),
            Expr::literal(100),
        ]),
    );

    Pipeline::builder()
        .group(
            Group::by(Expr::field("courseId"))
                .accumulate("totalEnrollments", Accumulator::Count)
                .accumulate(
                    "activeEnrollments",
                    Accumulator::Sum(Expr::one_if_eq("status", EnrollmentStatus::Active.as_str())),
                )
                .accumulate(
                    "completedEnrollments",
                    Accumulator::Sum(Expr::one_if_eq(
                        "status",
                        EnrollmentStatus::Completed.as_str(),
                    )),
                ),
        )
        .lookup(join_course("_id"))
        .unwind("course")
        .project(
            Project::new()
                .computed("courseId", Expr::field("_id"))
                .computed("title", Expr::field("course.title"))
                .computed("category", Expr::field("course.category"))
                .include("totalEnrollments")
                .include("activeEnrollments")
                .include("completedEnrollments")
                .computed("completionRate", completion_rate),
        )
        .sort(Sort::desc("totalEnrollments").then_asc("courseId"))
        .build()
}

fn category_popularity() -> Result<Pipeline, PipelineError> {
    Pipeline::builder()
        .lookup(join_course("courseId"))
        .unwind("course")
        .group(
            Group::by(Expr::field("course.category"))
                .accumulate("totalEnrollments", Accumulator::Count)
                .accumulate("students", Accumulator::AddToSet(Expr::field("userId"))),
        )
        .project(
            Project::new()
                .computed("category", Expr::field("_id"))
                .include("totalEnrollments")
                .computed("uniqueStudents", Expr::size(Expr::field("students"))),
        )
        .sort(Sort::desc("totalEnrollments").then_asc("category"))
        .build()
}

fn student_performance(student_id: &str) -> Result<Pipeline, PipelineError> {
    let grade = || Expr::field("grade");
    Pipeline::builder()
        .matching(Filter::eq("userId", student_id))
        .group(
            Group::by(Expr::field("userId"))
                .accumulate("totalSubmissions", Accumulator::Count)
                .accumulate("averageGrade", Accumulator::Avg(grade()))
                .accumulate("highestGrade", Accumulator::Max(grade()))
                .accumulate("lowestGrade", Accumulator::Min(grade())),
        )
        .build()
}

fn student_enrollments(student_id: &str) -> Result<Pipeline, PipelineError> {
    Pipeline::builder()
        .matching(Filter::eq("userId", student_id))
        .lookup(join_course("courseId"))
        .unwind("course")
        .project(
            Project::new()
                .include("enrollmentId")
                .include("courseId")
                .include("enrolledAt")
                .include("status")
                .include("progress")
                .computed("courseTitle", Expr::field("course.title"))
                .computed("courseCategory", Expr::field("course.category"))
                .computed("courseLevel", Expr::field("course.level")),
        )
        .sort(Sort::desc("enrolledAt").then_asc("enrollmentId"))
        .build()
}

fn enrollment_trends(since: DateTime<Utc>) -> Result<Pipeline, PipelineError> {
    Pipeline::builder()
        .matching(Filter::gte("enrolledAt", timestamp(since)))
        .group(
            Group::by(Expr::object(vec![
                ("year", Expr::year(Expr::field("enrolledAt"))),
                ("month", Expr::month(Expr::field("enrolledAt"))),
            ]))
            .accumulate("count", Accumulator::Count),
        )
        .project(
            Project::new()
                .computed("year", Expr::field("_id.year"))
                .computed("month", Expr::field("_id.month"))
                .include("count"),
        )
        .sort(Sort::asc("year").then_asc("month"))
        .build()
}

// =============================================================================
// Runner
// =============================================================================

/// Runs named reports against a store.
pub struct Analytics<'a, S> {
    store: &'a S,
    options: AggregateOptions,
}

impl<'a, S: DocumentStore> Analytics<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            options: AggregateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    /// Run a report and return its raw rows.
    pub fn run(&self, report: &Report<'_>) -> Result<Vec<Value>, AnalyticsError> {
        let pipeline = report.pipeline()?;
        let options = AggregateOptions {
            allow_disk_use: self.options.allow_disk_use || report.allow_disk_use(),
            ..self.options
        };
        let rows = self
            .store
            .aggregate(report.collection(), &pipeline, &options)?;
        debug!(report = report.name(), rows = rows.len(), "report executed");
        Ok(rows.into_iter().map(Value::Object).collect())
    }

    pub fn course_enrollment_stats(&self) -> Result<Vec<CourseEnrollmentStats>, AnalyticsError> {
        let stats = self.typed(&Report::CourseEnrollmentStats)?;
        info!(courses = stats.len(), "retrieved course enrollment stats");
        Ok(stats)
    }

    pub fn category_popularity(&self) -> Result<Vec<CategoryPopularity>, AnalyticsError> {
        self.typed(&Report::CategoryPopularity)
    }

    /// Grade summary for one student. Ungraded submissions count towards
    /// the total but not the grade figures.
    pub fn student_performance(
        &self,
        student_id: &str,
    ) -> Result<StudentPerformance, AnalyticsError> {
        let rows: Vec<PerformanceRow> = self.typed(&Report::StudentPerformance { student_id })?;
        let no_grades = || AnalyticsError::NoGradedSubmissions {
            student_id: student_id.to_string(),
        };
        let row = rows.into_iter().next().ok_or_else(no_grades)?;
        match (row.average_grade, row.highest_grade, row.lowest_grade) {
            (Some(average_grade), Some(highest_grade), Some(lowest_grade)) => {
                info!(student_id, "retrieved student performance");
                Ok(StudentPerformance {
                    student_id: student_id.to_string(),
                    total_submissions: row.total_submissions,
                    average_grade,
                    highest_grade,
                    lowest_grade,
                })
            }
            _ => Err(no_grades()),
        }
    }

    /// A student's enrollments with course details, newest first.
    pub fn student_enrollments(
        &self,
        student_id: &str,
    ) -> Result<Vec<StudentEnrollment>, AnalyticsError> {
        self.typed(&Report::StudentEnrollments { student_id })
    }

    /// Enrollments per calendar month since `since`, oldest month first.
    pub fn enrollment_trends(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<EnrollmentTrend>, AnalyticsError> {
        self.typed(&Report::EnrollmentTrends { since })
    }

    fn typed<T: DeserializeOwned>(&self, report: &Report<'_>) -> Result<Vec<T>, AnalyticsError> {
        self.run(report)?
            .into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| AnalyticsError::Decode {
                    report: report.name(),
                    message: e.to_string(),
                })
            })
            .collect()
    }
}
