// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Artifact storage: per-job directories for annotated page images and the
// annotated PDF, plus the URLs under which they are published.

use std::path::{Path, PathBuf};

use image::RgbImage;
use pruefwerk_core::JobId;
use pruefwerk_core::config::ArtifactConfig;
use pruefwerk_core::error::{InspectError, Result};
use pruefwerk_document::ImageProcessor;
use pruefwerk_document::image::processor::DEFAULT_JPEG_QUALITY;
use tracing::{debug, instrument};

/// File name of the combined annotated PDF inside a job directory.
pub const ANNOTATED_PDF_NAME: &str = "annotated.pdf";

/// File name of the annotated image for 1-based page `index`.
pub fn page_file_name(index: u32) -> String {
    format!("page_{index}.jpg")
}

/// Root directory for all job artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    url_prefix: String,
}

impl ArtifactStore {
    pub fn new(config: &ArtifactConfig) -> Self {
        Self {
            root: config.root.clone(),
            url_prefix: config.url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory for `job_id`.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn create_job(&self, job_id: &JobId) -> Result<JobArtifacts> {
        let dir = self.root.join(job_id.to_string());
        std::fs::create_dir_all(&dir).map_err(|err| {
            InspectError::ResultPersistence(format!(
                "failed to create job directory {}: {err}",
                dir.display()
            ))
        })?;
        debug!(dir = %dir.display(), "Job directory created");

        Ok(JobArtifacts {
            dir,
            url_base: format!("{}/{job_id}", self.url_prefix),
        })
    }
}

/// Artifacts of one job.
#[derive(Debug, Clone)]
pub struct JobArtifacts {
    dir: PathBuf,
    url_base: String,
}

impl JobArtifacts {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_url(&self, index: u32) -> String {
        format!("{}/{}", self.url_base, page_file_name(index))
    }

    pub fn pdf_url(&self) -> String {
        format!("{}/{ANNOTATED_PDF_NAME}", self.url_base)
    }

    /// Write an annotated page as JPEG and return its URL.
    pub fn save_page(&self, index: u32, image: &RgbImage) -> Result<String> {
        let path = self.dir.join(page_file_name(index));
        ImageProcessor::new(image).save_jpeg(&path, DEFAULT_JPEG_QUALITY)?;
        Ok(self.page_url(index))
    }

    /// Write the annotated PDF and return its URL.
    pub fn save_pdf(&self, bytes: &[u8]) -> Result<String> {
        let path = self.dir.join(ANNOTATED_PDF_NAME);
        std::fs::write(&path, bytes).map_err(|err| {
            InspectError::ResultPersistence(format!("failed to write {}: {err}", path.display()))
        })?;
        Ok(self.pdf_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path, prefix: &str) -> ArtifactStore {
        ArtifactStore::new(&ArtifactConfig {
            root: root.to_path_buf(),
            url_prefix: prefix.into(),
        })
    }

    #[test]
    fn job_urls_follow_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job_id = JobId::new();
        let job = store(dir.path(), "/static/annotated/")
            .create_job(&job_id)
            .expect("create job");

        assert_eq!(job.dir(), dir.path().join(job_id.to_string()));
        assert_eq!(job.page_url(2), format!("/static/annotated/{job_id}/page_2.jpg"));
        assert_eq!(job.pdf_url(), format!("/static/annotated/{job_id}/annotated.pdf"));
    }

    #[test]
    fn saved_files_land_in_job_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let job = store(dir.path(), "/a")
            .create_job(&JobId::new())
            .expect("create job");

        let url = job.save_page(1, &RgbImage::new(8, 8)).expect("save page");
        assert!(url.ends_with("/page_1.jpg"));
        assert!(job.dir().join("page_1.jpg").is_file());

        job.save_pdf(b"%PDF-1.5").expect("save pdf");
        assert_eq!(
            std::fs::read(job.dir().join("annotated.pdf")).expect("read"),
            b"%PDF-1.5"
        );
    }

    #[test]
    fn unwritable_root_is_persistence_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").expect("write");

        let err = store(&file, "/a").create_job(&JobId::new()).unwrap_err();
        assert!(matches!(err, InspectError::ResultPersistence(_)));
    }
}
