use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Assessment, StudentResponse};
use crate::selector::{Catalog, ReportFilter};

/// Where the report engine reads its input from.
#[async_trait]
pub trait ReportSource: Send + Sync {
    /// Schools, classes and students used to resolve filters.
    async fn fetch_catalog(&self) -> Result<Catalog>;

    /// Candidate assessments with answer keys and descriptors attached.
    async fn fetch_assessments(&self, filter: &ReportFilter) -> Result<Vec<Assessment>>;

    /// All responses recorded for one assessment.
    async fn fetch_responses(&self, assessment_id: Uuid) -> Result<Vec<StudentResponse>>;
}

/// Exported data set, readable without a database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub responses: Vec<StudentResponse>,
}

pub struct SnapshotSource {
    snapshot: Snapshot,
    origin: Option<PathBuf>,
}

impl SnapshotSource {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            origin: None,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&data)
            .with_context(|| format!("invalid snapshot {}", path.display()))?;
        Ok(Self {
            snapshot,
            origin: Some(path.to_path_buf()),
        })
    }

    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }
}

#[async_trait]
impl ReportSource for SnapshotSource {
    async fn fetch_catalog(&self) -> Result<Catalog> {
        Ok(self.snapshot.catalog.clone())
    }

    async fn fetch_assessments(&self, _filter: &ReportFilter) -> Result<Vec<Assessment>> {
        Ok(self.snapshot.assessments.clone())
    }

    async fn fetch_responses(&self, assessment_id: Uuid) -> Result<Vec<StudentResponse>> {
        Ok(self
            .snapshot
            .responses
            .iter()
            .filter(|response| response.assessment_id == assessment_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subject;
    use crate::testing;
    use std::io::Write;

    #[tokio::test]
    async fn responses_are_fetched_per_assessment() {
        let catalog = testing::catalog(1);
        let first = testing::assessment(catalog.schools[0].id, Subject::Portugues, None, vec![]);
        let second = testing::assessment(catalog.schools[0].id, Subject::Portugues, None, vec![]);
        let student = catalog.students[0].id;
        let source = SnapshotSource::new(Snapshot {
            responses: vec![
                testing::response(&first, student, true, &[]),
                testing::response(&second, student, true, &[]),
            ],
            assessments: vec![first.clone(), second],
            catalog,
        });

        let responses = source.fetch_responses(first.id).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].assessment_id, first.id);
        assert_eq!(source.fetch_assessments(&ReportFilter::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn loads_snapshot_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "catalog": {{
                    "schools": [{{"id": "6f1c1a40-1d1e-4c38-9d55-2a1f1e0c9a01", "name": "EMEF Centro"}}]
                }},
                "assessments": [{{
                    "id": "0b6c2b7e-8f0c-4d8e-bb4f-5f5f8e1f1a02",
                    "name": "Diagnóstica 1",
                    "subject": "matematica",
                    "grade": "5",
                    "applicationDate": "2024-03-01",
                    "status": "CONCLUIDA",
                    "schoolId": "6f1c1a40-1d1e-4c38-9d55-2a1f1e0c9a01",
                    "answerKey": {{"items": [{{"question": 1, "correctAnswer": "A"}}]}}
                }}]
            }}"#
        )
        .unwrap();

        let source = SnapshotSource::from_path(file.path()).await.unwrap();
        assert_eq!(source.origin(), Some(file.path()));
        let assessments = source.fetch_assessments(&ReportFilter::default()).await.unwrap();
        assert_eq!(assessments[0].subject, Subject::Matematica);
        assert_eq!(source.fetch_catalog().await.unwrap().schools.len(), 1);
    }

    #[tokio::test]
    async fn invalid_snapshot_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(SnapshotSource::from_path(file.path()).await.is_err());
    }
}
