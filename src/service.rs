use anyhow::Result;
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::cache::ReportCache;
use crate::models::{ReportResult, StudentResponse};
use crate::report::compute_report;
use crate::selector::{select_assessments, ReportFilter};
use crate::source::ReportSource;

/// Results are remembered until `invalidate` is called after a write.
pub struct ReportService<S> {
    source: S,
    cache: ReportCache,
}

impl<S: ReportSource> ReportService<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: ReportCache::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    pub fn invalidate(&self) {
        self.cache.clear();
    }

    pub async fn compute(&self, filter: &ReportFilter) -> Result<ReportResult> {
        if let Some(cached) = self.cache.get(filter) {
            info!(filter = %filter.canonical(), "report cache hit");
            return Ok(cached);
        }
        info!(filter = %filter.canonical(), "report cache miss");

        let catalog = self.source.fetch_catalog().await?;
        let candidates = self.source.fetch_assessments(filter).await?;
        let selected = select_assessments(&catalog, &candidates, filter)?;

        let fetches = selected
            .iter()
            .map(|assessment| self.source.fetch_responses(assessment.id));
        let responses: Vec<StudentResponse> = try_join_all(fetches)
            .await?
            .into_iter()
            .flatten()
            .collect();
        debug!(
            assessments = selected.len(),
            responses = responses.len(),
            "fetched report input"
        );

        let result = compute_report(&catalog, &selected, &responses, filter)?;
        self.cache.insert(filter, result.clone());
        Ok(result)
    }

    /// Filters are computed in order; repeated filters are served from the cache.
    pub async fn compute_batch(&self, filters: &[ReportFilter]) -> Result<Vec<ReportResult>> {
        let mut results = Vec::with_capacity(filters.len());
        for filter in filters {
            results.push(self.compute(filter).await?);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReportError;
    use crate::models::{Assessment, Subject};
    use crate::selector::Catalog;
    use crate::source::{Snapshot, SnapshotSource};
    use crate::testing;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use uuid::Uuid;

    /// In-memory source that accepts writes between reports.
    struct WritableSource {
        data: Mutex<Snapshot>,
    }

    impl WritableSource {
        fn write(&self, update: impl FnOnce(&mut Snapshot)) {
            update(&mut self.data.lock());
        }
    }

    #[async_trait]
    impl ReportSource for WritableSource {
        async fn fetch_catalog(&self) -> Result<Catalog> {
            Ok(self.data.lock().catalog.clone())
        }

        async fn fetch_assessments(&self, _filter: &ReportFilter) -> Result<Vec<Assessment>> {
            Ok(self.data.lock().assessments.clone())
        }

        async fn fetch_responses(&self, assessment_id: Uuid) -> Result<Vec<StudentResponse>> {
            Ok(self
                .data
                .lock()
                .responses
                .iter()
                .filter(|response| response.assessment_id == assessment_id)
                .cloned()
                .collect())
        }
    }

    fn sample() -> Snapshot {
        let catalog = testing::catalog(2);
        let assessment = testing::assessment(
            catalog.schools[0].id,
            Subject::Matematica,
            Some("2024-03-01"),
            vec![
                testing::key_item(1, "A", Some(testing::descriptor("D1", Subject::Matematica))),
                testing::key_item(2, "B", Some(testing::descriptor("D2", Subject::Matematica))),
            ],
        );
        let responses = vec![
            testing::response(&assessment, catalog.students[0].id, true, &[(1, "A"), (2, "C")]),
            testing::response(&assessment, catalog.students[1].id, false, &[]),
        ];
        Snapshot {
            catalog,
            assessments: vec![assessment],
            responses,
        }
    }

    fn service() -> ReportService<SnapshotSource> {
        ReportService::new(SnapshotSource::new(sample()))
    }

    #[tokio::test]
    async fn write_is_hidden_until_invalidate() {
        let service = ReportService::new(WritableSource {
            data: Mutex::new(sample()),
        });
        let filter = ReportFilter::default();

        let before = service.compute(&filter).await.unwrap();
        assert_eq!(before.desempenho_descritores[1].percentual, 0.0);

        service.source().write(|data| {
            let assessment = data.assessments[0].clone();
            let student = data.catalog.students[1].id;
            data.responses.retain(|response| response.student_id != student);
            data.responses
                .push(testing::response(&assessment, student, true, &[(1, "A"), (2, "B")]));
        });

        let stale = service.compute(&filter).await.unwrap();
        assert_eq!(stale, before);
        assert_eq!(service.cache().len(), 1);

        service.invalidate();
        let fresh = service.compute(&filter).await.unwrap();
        assert_eq!(fresh.desempenho_descritores[1].percentual, 50.0);
        assert_eq!(fresh.desempenho_descritores[0].percentual, 100.0);
    }

    #[tokio::test]
    async fn batch_shares_one_cache() {
        let service = service();
        let math = ReportFilter {
            subject: Some(Subject::Matematica),
            ..ReportFilter::default()
        };
        let filters = vec![ReportFilter::default(), math.clone(), ReportFilter::default()];

        let results = service.compute_batch(&filters).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], results[2]);
        assert_eq!(service.cache().len(), 2);
        assert!(service.cache().get(&math).is_some());
    }

    #[tokio::test]
    async fn computes_and_caches_by_filter() {
        let service = service();
        let filter = ReportFilter::default();

        let first = service.compute(&filter).await.unwrap();
        assert_eq!(first.desempenho_descritores[0].percentual, 100.0);
        assert_eq!(first.desempenho_descritores[1].percentual, 0.0);
        assert_eq!(service.cache().len(), 1);

        let second = service.compute(&filter).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(service.cache().len(), 1);

        service.invalidate();
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn not_found_propagates_as_report_error() {
        let service = service();
        let missing = Uuid::new_v4();
        let filter = ReportFilter {
            class_id: Some(missing),
            ..ReportFilter::default()
        };

        let err = service.compute(&filter).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<ReportError>(),
            Some(&ReportError::ClassNotFound(missing))
        );
        assert!(service.cache().is_empty());
    }
}
