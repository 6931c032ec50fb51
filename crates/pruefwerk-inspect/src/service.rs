// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async front for the inspector.
//
// Rasterization and inference are CPU-bound and block, so every job runs on
// tokio's blocking pool. A semaphore caps how many jobs run at once; further
// requests wait for a permit.

use std::sync::Arc;

use pruefwerk_core::error::{InspectError, Result};
use tokio::sync::Semaphore;
use tokio::task;
use tracing::debug;

use crate::assemble::{AnalysisReport, BatchReport};
use crate::inspector::Inspector;

/// Cheaply cloneable handle for running inspection jobs from async code.
#[derive(Clone)]
pub struct InspectionService {
    inspector: Arc<Inspector>,
    permits: Arc<Semaphore>,
}

impl InspectionService {
    /// Wrap `inspector`, allowing at most `max_concurrent_jobs` jobs at once
    /// (at least one).
    pub fn new(inspector: Arc<Inspector>, max_concurrent_jobs: usize) -> Self {
        Self {
            inspector,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    /// Jobs that could start right now without waiting.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run a single-document job.
    pub async fn analyze(&self, file_name: String, bytes: Vec<u8>) -> Result<AnalysisReport> {
        self.run(move |inspector| inspector.analyze(&file_name, &bytes))
            .await
    }

    /// Run a batch job over a ZIP archive.
    pub async fn batch_analyze(&self, file_name: String, bytes: Vec<u8>) -> Result<BatchReport> {
        self.run(move |inspector| inspector.batch_analyze(&file_name, &bytes))
            .await
    }

    async fn run<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inspector) -> Result<T> + Send + 'static,
    {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|err| InspectError::Runtime(format!("job scheduler closed: {err}")))?;
        debug!(available = self.permits.available_permits(), "Job slot acquired");

        let inspector = Arc::clone(&self.inspector);
        task::spawn_blocking(move || {
            let _permit = permit;
            job(&inspector)
        })
        .await
        .map_err(|err| InspectError::Runtime(format!("inspection task did not complete: {err}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::tests::build_zip;
    use crate::inspector::tests::{MARKED_WIDTH_PT, build_pdf, inspector};

    #[tokio::test]
    async fn jobs_run_on_the_blocking_pool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = InspectionService::new(Arc::new(inspector(dir.path())), 2);
        let pdf = build_pdf(&[(MARKED_WIDTH_PT, 300.0)]);

        let report = service.analyze("scan.pdf".into(), pdf).await.expect("analyze");
        assert_eq!(report.statistics.total_detections, 1);
        assert_eq!(service.available_slots(), 2);
    }

    #[tokio::test]
    async fn concurrent_jobs_keep_separate_statistics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = InspectionService::new(Arc::new(inspector(dir.path())), 2);
        let one = build_pdf(&[(MARKED_WIDTH_PT, 300.0)]);
        let three = build_zip(&[
            ("A.pdf", &build_pdf(&[(MARKED_WIDTH_PT, 300.0), (MARKED_WIDTH_PT, 300.0)])),
            ("B.pdf", &build_pdf(&[(MARKED_WIDTH_PT, 300.0)])),
        ]);

        let (single, batch) = tokio::join!(
            service.analyze("one.pdf".into(), one),
            service.batch_analyze("three.zip".into(), three),
        );
        assert_eq!(single.expect("single").statistics.total_detections, 1);

        let batch = batch.expect("batch");
        assert_eq!(batch.statistics.total_detections, 3);
        assert_eq!(batch.files_processed, 2);
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let dir = tempfile::tempdir().expect("tempdir");
        let service = InspectionService::new(Arc::new(inspector(dir.path())), 0);
        assert_eq!(service.available_slots(), 1);

        let err = service
            .analyze("notes.txt".into(), b"hello".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, InspectError::InputFormat(_)));
    }
}
