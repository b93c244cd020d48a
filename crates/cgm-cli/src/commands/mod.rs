pub mod areas;
pub mod config;
pub mod report;
pub mod targets;
