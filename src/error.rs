use thiserror::Error;
use uuid::Uuid;

/// Failures surfaced to the caller of the report engine.
///
/// Empty results are never errors; only references to entities that do not
/// exist upstream are.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("school not found: {0}")]
    SchoolNotFound(Uuid),
    #[error("class not found: {0}")]
    ClassNotFound(Uuid),
    #[error("student not found: {0}")]
    StudentNotFound(Uuid),
    #[error("assessment not found: {0}")]
    AssessmentNotFound(Uuid),
    #[error("unknown subject: {0}")]
    UnknownSubject(String),
    #[error("unknown assessment status: {0}")]
    UnknownStatus(String),
}

impl ReportError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ReportError::SchoolNotFound(_)
                | ReportError::ClassNotFound(_)
                | ReportError::StudentNotFound(_)
                | ReportError::AssessmentNotFound(_)
        )
    }
}
