pub mod battery_report;
pub mod duration;
pub mod models;
pub mod schema;
