//! Shared fixtures: a configured hub over an in-memory store plus a small
//! catalogue of users and courses.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use eduhub::{
    Assignment, Course, EduHub, InMemoryDocumentStore, Level, Role, StoreConfig, User,
};

pub type Hub = EduHub<InMemoryDocumentStore>;

pub fn hub_with(config: StoreConfig) -> Hub {
    let hub = EduHub::new(InMemoryDocumentStore::with_config(config.clone()), config);
    hub.setup().unwrap();
    hub
}

pub fn hub() -> Hub {
    hub_with(StoreConfig::default())
}

pub fn student(id: &str) -> User {
    User::new(id, format!("{}@students.example.com", id.to_lowercase()), "Stu", id, Role::Student)
}

pub fn instructor(id: &str) -> User {
    User::new(id, format!("{}@staff.example.com", id.to_lowercase()), "Ina", id, Role::Instructor)
}

pub fn course(id: &str, title: &str, category: &str) -> Course {
    Course::new(id, title, "U010", Level::Beginner)
        .with_category(category)
        .with_duration(12)
        .with_price(49.0)
}

pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
}

/// Students U001..U003 (U003 inactive), instructor U010, published courses
/// C001 (Programming) and C002 (Design), draft course C003, and assignment
/// A001 on C001 worth 100 points.
pub fn seeded_hub() -> Hub {
    seed(hub())
}

pub fn seed(hub: Hub) -> Hub {
    hub.create_user(&instructor("U010")).unwrap();
    hub.create_user(&student("U001")).unwrap();
    hub.create_user(&student("U002")).unwrap();
    let mut inactive = student("U003");
    inactive.is_active = false;
    hub.create_user(&inactive).unwrap();

    hub.create_course(
        &course("C001", "Rust Fundamentals", "Programming")
            .with_description("Ownership, borrowing and traits")
            .with_tags(["rust", "systems"])
            .published(),
    )
    .unwrap();
    hub.create_course(
        &course("C002", "Visual Design Basics", "Design")
            .with_price(19.0)
            .published(),
    )
    .unwrap();
    hub.create_course(&course("C003", "Advanced Rust", "Programming").with_price(99.0))
        .unwrap();

    hub.create_assignment(&Assignment::new("A001", "C001", "Borrow checker drills", at(2025, 6, 1)))
        .unwrap();
    hub
}
