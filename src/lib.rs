//! Descriptor performance reports for SMAIPA diagnostic assessments.
//!
//! Raw student answers are scored against each assessment's answer key and
//! folded into per-descriptor, per-subject and per-date accuracy figures.

pub mod aggregate;
pub mod cache;
pub mod db;
pub mod error;
pub mod joiner;
pub mod models;
pub mod report;
pub mod selector;
pub mod service;
pub mod source;

#[cfg(test)]
mod testing;

pub use error::ReportError;
pub use models::ReportResult;
pub use report::compute_report;
pub use selector::{Catalog, ReportFilter};
pub use service::ReportService;
