// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Inspector: runs one inspection job end to end. Checks the input,
// rasterizes, detects page by page in document order, writes artifacts and
// assembles the report.
//
// Every job owns its `DetectionStats` and `AnnotationCounter`, so jobs never
// share mutable state and may run concurrently against the same inspector.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;
use pruefwerk_core::config::LimitsConfig;
use pruefwerk_core::error::{InspectError, Result};
use pruefwerk_core::human_errors::batch_entry_message;
use pruefwerk_core::{Detection, DetectionStats, InputKind, InspectorConfig, JobId, PageImage};
use pruefwerk_detect::DetectorEnsemble;
use pruefwerk_document::{ArtifactExporter, PageRenderer, Rasterizer};
use tracing::{debug, info, instrument, warn};

use crate::archive::PdfArchive;
use crate::assemble::{
    AnalysisReport, AnnotationCounter, BatchEntry, BatchReport, DetectionReport,
    DocumentAnnotations, OrderedMap, PageReport,
};
use crate::storage::{ArtifactStore, JobArtifacts};

/// Name used in the `result` section when the upload has no usable name.
pub const FALLBACK_DOCUMENT_NAME: &str = "document.pdf";

/// Display name for an uploaded document: the final path component of
/// `file_name`, or [`FALLBACK_DOCUMENT_NAME`].
pub fn document_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(FALLBACK_DOCUMENT_NAME)
}

/// Long-lived inspection pipeline shared by all jobs.
pub struct Inspector {
    rasterizer: Rasterizer,
    ensemble: Arc<DetectorEnsemble>,
    exporter: ArtifactExporter,
    store: ArtifactStore,
    limits: LimitsConfig,
}

impl Inspector {
    // -- Construction ---------------------------------------------------------

    pub fn new(
        rasterizer: Rasterizer,
        ensemble: Arc<DetectorEnsemble>,
        exporter: ArtifactExporter,
        store: ArtifactStore,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            rasterizer,
            ensemble,
            exporter,
            store,
            limits,
        }
    }

    /// Build an inspector from `config` around an already loaded ensemble.
    pub fn from_config(
        config: &InspectorConfig,
        ensemble: Arc<DetectorEnsemble>,
        renderer: Arc<dyn PageRenderer>,
    ) -> Self {
        Self::new(
            Rasterizer::new(config.raster, renderer),
            ensemble,
            ArtifactExporter::default(),
            ArtifactStore::new(&config.artifacts),
            config.limits,
        )
    }

    fn check_input(&self, file_name: &str, bytes: &[u8], expected: InputKind) -> Result<()> {
        if InputKind::from_file_name(file_name) != Some(expected) {
            let message = match expected {
                InputKind::Pdf => "Uploaded file is not a PDF",
                InputKind::Zip => "Uploaded file is not a ZIP archive",
            };
            return Err(InspectError::InputFormat(message.into()));
        }
        if bytes.len() > self.limits.max_request_bytes {
            return Err(InspectError::InputFormat(format!(
                "Uploaded file is larger than {} bytes",
                self.limits.max_request_bytes
            )));
        }
        Ok(())
    }

    // -- Single document ------------------------------------------------------

    /// Inspect one PDF, write its annotated pages and combined PDF, and
    /// return the report.
    ///
    /// Fails on the first error. Input and parse errors are raised before any
    /// detector runs; a job directory left behind by a later failure is
    /// removed.
    #[instrument(skip_all, fields(file = %file_name, bytes_len = bytes.len()))]
    pub fn analyze(&self, file_name: &str, bytes: &[u8]) -> Result<AnalysisReport> {
        self.check_input(file_name, bytes, InputKind::Pdf)?;
        let pages = self.rasterizer.rasterize(bytes)?;

        let job_id = JobId::new();
        let job = self.store.create_job(&job_id)?;
        info!(job_id = %job_id, pages = pages.len(), "Inspection job started");

        let mut stats = DetectionStats::new();
        stats.reset();
        let (reports, page_detections, pdf_url) = match self.inspect_pages(&pages, &job, &mut stats) {
            Ok(inspected) => inspected,
            Err(err) => {
                discard_job(&job);
                return Err(err);
            }
        };

        info!(
            job_id = %job_id,
            detections = stats.total_detections,
            "Inspection job finished"
        );
        Ok(AnalysisReport::new(
            &job_id,
            document_name(file_name),
            reports,
            &page_detections,
            pdf_url,
            stats.snapshot(),
        ))
    }

    /// Detect, annotate and store every page in order, then export and store
    /// the combined PDF.
    fn inspect_pages(
        &self,
        pages: &[PageImage],
        job: &JobArtifacts,
        stats: &mut DetectionStats,
    ) -> Result<(Vec<PageReport>, Vec<Vec<Detection>>, String)> {
        let mut reports = Vec::with_capacity(pages.len());
        let mut page_detections = Vec::with_capacity(pages.len());
        let mut annotated: Vec<RgbImage> = Vec::with_capacity(pages.len());

        for page in pages {
            let (detections, image) = self.ensemble.detect(page, stats)?;
            let url = job.save_page(page.index(), &image)?;
            debug!(page = page.index(), detections = detections.len(), "Page inspected");

            reports.push(PageReport {
                page_index: page.index(),
                page_size: page.size(),
                detections: detections.iter().map(DetectionReport::from).collect(),
                annotated_image_url: url,
            });
            page_detections.push(detections);
            annotated.push(image);
        }

        let pdf = self.exporter.export(&annotated)?;
        let pdf_url = job.save_pdf(&pdf)?;
        Ok((reports, page_detections, pdf_url))
    }

    // -- Batch ----------------------------------------------------------------

    /// Inspect every PDF in a ZIP archive.
    ///
    /// A document that cannot be read or rasterized is recorded as an error
    /// entry and the batch moves on. A detector failure aborts the whole
    /// batch. Annotation numbers run across all documents. No artifacts are
    /// written.
    #[instrument(skip_all, fields(file = %file_name, bytes_len = bytes.len()))]
    pub fn batch_analyze(&self, file_name: &str, bytes: &[u8]) -> Result<BatchReport> {
        self.check_input(file_name, bytes, InputKind::Zip)?;

        let mut archive = PdfArchive::open(bytes)?;
        let entries = archive.pdf_entries(self.limits.max_archive_entries)?;
        if entries.is_empty() {
            return Err(InspectError::InputFormat("ZIP contains no PDF files".into()));
        }

        let job_id = JobId::new();
        info!(job_id = %job_id, documents = entries.len(), "Batch job started");

        let mut counter = AnnotationCounter::new();
        let mut stats = DetectionStats::new();
        stats.reset();
        let mut result = OrderedMap::new();
        let mut files_processed = 0;

        for entry in &entries {
            let name = entry.display_name.as_str();

            let document = match archive.read(entry, self.limits.max_request_bytes) {
                Ok(document) => document,
                Err(err) => {
                    warn!(document = %name, %err, "Archive entry could not be read");
                    result.insert(name, BatchEntry::Failed {
                        error: err.to_string(),
                    });
                    continue;
                }
            };

            let pages = match self.rasterizer.rasterize(&document) {
                Ok(pages) => pages,
                Err(err @ InspectError::PdfParse { .. }) => {
                    warn!(document = %name, %err, "Document skipped");
                    result.insert(name, BatchEntry::Failed {
                        error: batch_entry_message(&err),
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            let mut annotations = DocumentAnnotations::new();
            for page in &pages {
                let detections = self.ensemble.detect_only(page, &mut stats)?;
                annotations.push_page(page.index(), page.size(), &detections, &mut counter);
            }
            debug!(document = %name, pages = pages.len(), "Document inspected");

            files_processed += 1;
            result.insert(name, BatchEntry::Document(annotations));
        }

        info!(
            job_id = %job_id,
            files_processed,
            annotations = counter.issued(),
            "Batch job finished"
        );
        Ok(BatchReport {
            job_id: job_id.to_string(),
            files_processed,
            result,
            statistics: stats.snapshot(),
        })
    }
}

/// Remove the artifacts of a job that failed part-way.
fn discard_job(job: &JobArtifacts) {
    if let Err(err) = std::fs::remove_dir_all(job.dir()) {
        warn!(dir = %job.dir().display(), %err, "Failed to remove incomplete job directory");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::archive::tests::{build_zip, build_zip_with};
    use image::RgbImage;
    use lopdf::{Document, Object, dictionary};
    use pruefwerk_core::config::{AnnotationConfig, ArtifactConfig, RasterConfig};
    use pruefwerk_core::BBox;
    use pruefwerk_core::human_errors::BATCH_OVERSIZED_MESSAGE;
    use pruefwerk_detect::{
        DEFAULT_INFERENCE_SIZE, Detector, EnsembleMember, PredictError, PredictParams,
        RawDetection,
    };
    use pruefwerk_document::image::LabelFont;
    use pruefwerk_document::{Annotator, PdfReader, ScanPageRenderer};
    use serde_json::json;

    type Predicted = std::result::Result<Vec<RawDetection>, PredictError>;

    /// Pages of this width (in points) render 560 pixels wide.
    pub(crate) const MARKED_WIDTH_PT: f64 = 200.0;
    const MARKED_WIDTH_PX: u32 = 560;

    /// Build an image-free PDF with one page per `(width, height)` in points.
    pub(crate) fn build_pdf(pages: &[(f64, f64)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = pages
            .iter()
            .map(|&(width, height)| {
                let page = dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                };
                Object::from(doc.add_object(page))
            })
            .collect();

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).expect("serialise test PDF");
        out
    }

    /// Reports one QR code on every page rendered from a
    /// [`MARKED_WIDTH_PT`]-wide page.
    pub(crate) fn qr_on_marked_pages() -> Box<dyn Detector> {
        Box::new(|image: &RgbImage, _: &PredictParams| -> Predicted {
            if image.width() == MARKED_WIDTH_PX {
                Ok(vec![RawDetection::new(
                    "qr_code",
                    0.8,
                    BBox::new(10.0, 20.0, 110.0, 70.0),
                )])
            } else {
                Ok(Vec::new())
            }
        })
    }

    pub(crate) fn inspector_with(
        root: &Path,
        detector: Box<dyn Detector>,
        raster: RasterConfig,
    ) -> Inspector {
        let annotator = Annotator::with_font(LabelFont::Unavailable, &AnnotationConfig::default());
        let ensemble = DetectorEnsemble::new(
            vec![EnsembleMember::new("QR Code Detector", 0.65, detector)],
            DEFAULT_INFERENCE_SIZE,
            annotator,
        );
        Inspector::new(
            Rasterizer::new(raster, Arc::new(ScanPageRenderer::new())),
            Arc::new(ensemble),
            ArtifactExporter::default(),
            ArtifactStore::new(&ArtifactConfig {
                root: root.to_path_buf(),
                url_prefix: "/static/annotated".into(),
            }),
            LimitsConfig::default(),
        )
    }

    pub(crate) fn inspector(root: &Path) -> Inspector {
        inspector_with(root, qr_on_marked_pages(), RasterConfig::default())
    }

    #[test]
    fn document_name_uses_final_component() {
        assert_eq!(document_name("scans/2026/invoice.pdf"), "invoice.pdf");
        assert_eq!(document_name("invoice.pdf"), "invoice.pdf");
        assert_eq!(document_name(""), FALLBACK_DOCUMENT_NAME);
        assert_eq!(document_name("scans/"), "scans");
    }

    // -- Single document ------------------------------------------------------

    #[test]
    fn single_document_report() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inspector = inspector(dir.path());
        let pdf = build_pdf(&[(MARKED_WIDTH_PT, 300.0), (300.0, 300.0)]);

        let report = inspector.analyze("scan.pdf", &pdf).expect("analyze");
        let json = serde_json::to_value(&report).expect("serialise");

        assert_eq!(report.pages.len(), 2);
        assert_eq!(report.pages[0].page_index, 1);
        assert_eq!(report.pages[1].page_index, 2);
        assert_eq!(json["pages"][0]["page_size"], json!({ "width": 560, "height": 840 }));
        assert_eq!(
            json["pages"][0]["detections"][0]["bbox"],
            json!({ "x": 10.0, "y": 20.0, "width": 100.0, "height": 50.0 })
        );
        assert_eq!(json["pages"][1]["detections"], json!([]));

        assert_eq!(
            json["result"]["scan.pdf"]["page_1"]["annotations"],
            json!([{
                "annotation_1": {
                    "category": "qr_code",
                    "bbox": { "x": 10.0, "y": 20.0, "width": 100.0, "height": 50.0 },
                    "area": 5000.0
                }
            }])
        );
        assert_eq!(json["result"]["scan.pdf"]["page_2"]["annotations"], json!([]));
        assert_eq!(
            json["statistics"],
            json!({ "total_detections": 1, "class_statistics": { "qr_code": 1 } })
        );
    }

    #[test]
    fn single_document_artifacts_are_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inspector = inspector(dir.path());
        let pdf = build_pdf(&[(MARKED_WIDTH_PT, 300.0), (300.0, 300.0), (300.0, 400.0)]);

        let report = inspector.analyze("scan.pdf", &pdf).expect("analyze");
        let job_dir = dir.path().join(&report.job_id);

        for page in 1..=3 {
            assert!(job_dir.join(format!("page_{page}.jpg")).is_file());
        }
        assert_eq!(
            report.pages[2].annotated_image_url,
            format!("/static/annotated/{}/page_3.jpg", report.job_id)
        );
        assert_eq!(
            report.annotated_pdf_url,
            format!("/static/annotated/{}/annotated.pdf", report.job_id)
        );

        let exported = std::fs::read(job_dir.join("annotated.pdf")).expect("read export");
        let reader = PdfReader::from_bytes(&exported).expect("parse export");
        assert_eq!(reader.page_count(), 3);
    }

    #[test]
    fn wrong_container_is_rejected_before_work() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inspector = inspector(dir.path());
        let pdf = build_pdf(&[(300.0, 300.0)]);

        match inspector.analyze("scan.png", &pdf) {
            Err(InspectError::InputFormat(message)) => {
                assert_eq!(message, "Uploaded file is not a PDF")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            inspector.batch_analyze("scan.pdf", &pdf),
            Err(InspectError::InputFormat(_))
        ));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read root").count(), 0);
    }

    #[test]
    fn corrupt_document_fails_without_job_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inspector = inspector(dir.path());

        let err = inspector.analyze("scan.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, InspectError::PdfParse { .. }));
        assert!(!err.is_oversized());
        assert_eq!(std::fs::read_dir(dir.path()).expect("read root").count(), 0);
    }

    #[test]
    fn detector_failure_discards_job_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let failing = Box::new(|_: &RgbImage, _: &PredictParams| -> Predicted {
            Err(PredictError::Inference("model crashed".into()))
        });
        let inspector = inspector_with(dir.path(), failing, RasterConfig::default());

        let err = inspector
            .analyze("scan.pdf", &build_pdf(&[(300.0, 300.0)]))
            .unwrap_err();
        assert!(matches!(err, InspectError::Detector { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).expect("read root").count(), 0);
    }

    // -- Batch ----------------------------------------------------------------

    #[test]
    fn batch_isolates_parse_failures_and_numbers_globally() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inspector = inspector(dir.path());
        let doc_a = build_pdf(&[(MARKED_WIDTH_PT, 300.0), (MARKED_WIDTH_PT, 300.0)]);
        let doc_c = build_pdf(&[(300.0, 300.0), (MARKED_WIDTH_PT, 300.0)]);
        let archive = build_zip(&[
            ("A.pdf", &doc_a),
            ("B.pdf", b"this is not a pdf"),
            ("C.pdf", &doc_c),
        ]);

        let report = inspector.batch_analyze("docs.zip", &archive).expect("batch");
        assert_eq!(report.files_processed, 2);
        assert_eq!(report.result.keys().collect::<Vec<_>>(), vec!["A.pdf", "B.pdf", "C.pdf"]);

        match report.result.get("B.pdf") {
            Some(BatchEntry::Failed { error }) => {
                assert!(error.starts_with("PDF parsing failed: "), "got {error}")
            }
            other => panic!("unexpected entry: {other:?}"),
        }

        let keys_of = |name: &str| -> Vec<String> {
            match report.result.get(name) {
                Some(BatchEntry::Document(doc)) => doc.annotations().map(|a| a.key.clone()).collect(),
                other => panic!("unexpected entry for {name}: {other:?}"),
            }
        };
        assert_eq!(keys_of("A.pdf"), vec!["annotation_1", "annotation_2"]);
        assert_eq!(keys_of("C.pdf"), vec!["annotation_3"]);

        assert_eq!(report.statistics.total_detections, 3);
        assert_eq!(report.statistics.class_statistics.get("qr_code"), Some(&3));

        let json = serde_json::to_value(&report).expect("serialise");
        assert_eq!(json["result"]["C.pdf"]["page_1"]["annotations"], json!([]));
        assert!(json["result"]["C.pdf"]["page_2"]["annotations"][0]["annotation_3"].is_object());

        // Batch jobs write no artifacts.
        assert_eq!(std::fs::read_dir(dir.path()).expect("read root").count(), 0);
    }

    #[test]
    fn batch_reports_oversized_documents_distinctly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let raster = RasterConfig {
            max_pages: 1,
            ..RasterConfig::default()
        };
        let inspector = inspector_with(dir.path(), qr_on_marked_pages(), raster);
        let archive = build_zip(&[
            ("long.pdf", &build_pdf(&[(300.0, 300.0), (300.0, 300.0)])),
            ("short.pdf", &build_pdf(&[(MARKED_WIDTH_PT, 300.0)])),
        ]);

        let report = inspector.batch_analyze("docs.zip", &archive).expect("batch");
        assert_eq!(report.files_processed, 1);
        assert_eq!(
            report.result.get("long.pdf"),
            Some(&BatchEntry::Failed {
                error: BATCH_OVERSIZED_MESSAGE.into()
            })
        );
    }

    #[test]
    fn unreadable_entry_is_recorded_and_batch_continues() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inspector = Inspector {
            limits: LimitsConfig {
                max_request_bytes: 64 * 1024,
                ..LimitsConfig::default()
            },
            ..inspector(dir.path())
        };
        // Deflates to a few hundred bytes, unpacks past the request limit.
        let mut padded = build_pdf(&[(MARKED_WIDTH_PT, 300.0)]);
        padded.resize(256 * 1024, b' ');
        let archive = build_zip_with(
            &[
                ("A.pdf", &build_pdf(&[(MARKED_WIDTH_PT, 300.0)])),
                ("big.pdf", &padded),
                ("C.pdf", &build_pdf(&[(MARKED_WIDTH_PT, 300.0)])),
            ],
            zip::CompressionMethod::Deflated,
        );
        assert!(archive.len() < inspector.limits.max_request_bytes);

        let report = inspector.batch_analyze("docs.zip", &archive).expect("batch");
        assert_eq!(report.files_processed, 2);
        match report.result.get("big.pdf") {
            Some(BatchEntry::Failed { error }) => {
                assert!(error.contains("big.pdf is larger than 65536 bytes"), "got {error}")
            }
            other => panic!("unexpected entry: {other:?}"),
        }

        let json = serde_json::to_value(&report).expect("serialise");
        assert!(json["result"]["A.pdf"]["page_1"]["annotations"][0]["annotation_1"].is_object());
        assert!(json["result"]["C.pdf"]["page_1"]["annotations"][0]["annotation_2"].is_object());
        assert_eq!(report.statistics.total_detections, 2);
    }

    #[test]
    fn each_batch_starts_from_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inspector = inspector(dir.path());
        let archive = build_zip(&[("A.pdf", &build_pdf(&[(MARKED_WIDTH_PT, 300.0)]))]);

        let first = inspector.batch_analyze("docs.zip", &archive).expect("first");
        let second = inspector.batch_analyze("docs.zip", &archive).expect("second");
        assert_eq!(first.statistics, second.statistics);
        assert_eq!(second.statistics.total_detections, 1);

        let json = serde_json::to_value(&second).expect("serialise");
        assert!(json["result"]["A.pdf"]["page_1"]["annotations"][0]["annotation_1"].is_object());
    }

    #[test]
    fn batch_without_pdfs_is_input_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inspector = inspector(dir.path());
        let archive = build_zip(&[("notes.txt", b"hello"), ("__MACOSX/._A.pdf", b"x")]);

        match inspector.batch_analyze("docs.zip", &archive) {
            Err(InspectError::InputFormat(message)) => {
                assert_eq!(message, "ZIP contains no PDF files")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(matches!(
            inspector.batch_analyze("docs.zip", b"not a zip"),
            Err(InspectError::ArchiveFormat(_))
        ));
    }

    #[test]
    fn detector_failure_aborts_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let failing = Box::new(|_: &RgbImage, _: &PredictParams| -> Predicted {
            Err(PredictError::Inference("model crashed".into()))
        });
        let inspector = inspector_with(dir.path(), failing, RasterConfig::default());
        let archive = build_zip(&[
            ("A.pdf", &build_pdf(&[(300.0, 300.0)])),
            ("B.pdf", &build_pdf(&[(300.0, 300.0)])),
        ]);

        let err = inspector.batch_analyze("docs.zip", &archive).unwrap_err();
        match err {
            InspectError::Detector { detector, .. } => assert_eq!(detector, "QR Code Detector"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn each_job_starts_from_zero() {
        let dir = tempfile::tempdir().expect("tempdir");
        let inspector = inspector(dir.path());
        let pdf = build_pdf(&[(MARKED_WIDTH_PT, 300.0)]);

        let first = inspector.analyze("a.pdf", &pdf).expect("first");
        let second = inspector.analyze("a.pdf", &pdf).expect("second");
        assert_ne!(first.job_id, second.job_id);
        assert_eq!(second.statistics.total_detections, 1);

        let json = serde_json::to_value(&second).expect("serialise");
        assert!(json["result"]["a.pdf"]["page_1"]["annotations"][0]["annotation_1"].is_object());
    }
}
