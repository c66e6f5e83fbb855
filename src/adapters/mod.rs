pub mod captured_report;
pub mod management_store;
pub mod report_generator;
pub mod sqlite_store;
