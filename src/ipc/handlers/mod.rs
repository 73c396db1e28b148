pub mod announcements;
pub mod core;
pub mod curriculum;
pub mod grades;
pub mod reports;
pub mod students;
