use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::Fields;
use crate::Document;
use crate::schema::{CollectionSchema, FieldRule};
use crate::store::UniqueConstraint;

use super::{default_field, patch, timestamp, Entity};

pub const EMAIL_PATTERN: &str = r"^[\w.-]+@[\w.-]+\.[a-zA-Z]{2,}$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Instructor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Document)]
#[document(collection = "users")]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[document(id)]
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub date_joined: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
    pub is_active: bool,
}

impl User {
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role,
            date_joined: Utc::now(),
            profile: None,
            is_active: true,
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Active students may enroll and submit work.
    pub fn is_eligible_student(&self) -> bool {
        self.role == Role::Student && self.is_active
    }
}

impl Entity for User {
    fn schema() -> CollectionSchema {
        CollectionSchema::new(Self::COLLECTION)
            .field("userId", FieldRule::string().required())
            .field("email", FieldRule::string().required().pattern(EMAIL_PATTERN))
            .field("firstName", FieldRule::string().required())
            .field("lastName", FieldRule::string().required())
            .field(
                "role",
                FieldRule::string()
                    .required()
                    .one_of([Role::Student.as_str(), Role::Instructor.as_str()]),
            )
            .field("dateJoined", FieldRule::date().required())
            .field(
                "profile",
                FieldRule::object()
                    .nullable()
                    .property("bio", FieldRule::string().nullable())
                    .property("avatar", FieldRule::string().nullable())
                    .property("skills", FieldRule::array(FieldRule::string())),
            )
            .field("isActive", FieldRule::bool().required())
    }

    fn unique_constraints() -> Vec<UniqueConstraint> {
        vec![UniqueConstraint::on("userId"), UniqueConstraint::on("email")]
    }

    fn apply_defaults(fields: &mut Fields, now: DateTime<Utc>) {
        default_field(fields, "dateJoined", timestamp(now));
        default_field(fields, "isActive", Value::Bool(true));
    }

    fn soft_delete_patch() -> Option<Fields> {
        Some(patch(&[("isActive", Value::Bool(false))]))
    }
}
