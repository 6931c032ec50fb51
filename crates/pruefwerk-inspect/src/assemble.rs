// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Result assembly: the JSON reports returned for single-document and batch
// jobs, and the job-scoped annotation numbering they share.
//
// Several parts of the reports are maps whose keys carry meaning
// (`page_3`, `annotation_17`, document names). They are kept as ordered
// vectors and serialised as JSON objects so that key order always follows
// page and archive order.

use pruefwerk_core::{BBox, Detection, DetectionStats, JobId, PageSize};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

// -- Annotation numbering -----------------------------------------------------

/// Issues `annotation_1`, `annotation_2`, ... for one job.
///
/// A batch job uses a single counter across all of its documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationCounter {
    next: u64,
}

impl Default for AnnotationCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationCounter {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_key(&mut self) -> String {
        let key = format!("annotation_{}", self.next);
        self.next += 1;
        key
    }

    /// Number of keys issued so far.
    pub fn issued(&self) -> u64 {
        self.next - 1
    }
}

// -- Shared pieces ------------------------------------------------------------

/// A box as reported to clients: top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoxReport {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<&BBox> for BoxReport {
    fn from(bbox: &BBox) -> Self {
        Self {
            x: bbox.x1,
            y: bbox.y1,
            width: bbox.width(),
            height: bbox.height(),
        }
    }
}

/// Insertion-ordered map serialised as a JSON object. Inserting an existing
/// key replaces its value in place.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// -- Annotations --------------------------------------------------------------

/// A detection under its job-scoped key. Serialised as
/// `{"annotation_<n>": {"category", "bbox", "area"}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEntry {
    pub key: String,
    pub category: String,
    pub bbox: BoxReport,
    /// `bbox.width * bbox.height`.
    pub area: f64,
}

impl AnnotationEntry {
    pub fn new(key: String, detection: &Detection) -> Self {
        let bbox = BoxReport::from(&detection.bbox);
        Self {
            key,
            category: detection.category.clone(),
            area: bbox.width * bbox.height,
            bbox,
        }
    }
}

#[derive(Serialize)]
struct AnnotationBody<'a> {
    category: &'a str,
    bbox: &'a BoxReport,
    area: f64,
}

impl Serialize for AnnotationEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(
            &self.key,
            &AnnotationBody {
                category: &self.category,
                bbox: &self.bbox,
                area: self.area,
            },
        )?;
        map.end()
    }
}

/// Annotations of one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageAnnotations {
    pub annotations: Vec<AnnotationEntry>,
    pub page_size: PageSize,
}

/// Per-page annotations of one document, keyed `page_<index>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DocumentAnnotations {
    pages: OrderedMap<PageAnnotations>,
}

impl DocumentAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page, numbering its detections with `counter`.
    pub fn push_page(
        &mut self,
        index: u32,
        page_size: PageSize,
        detections: &[Detection],
        counter: &mut AnnotationCounter,
    ) {
        let annotations = detections
            .iter()
            .map(|detection| AnnotationEntry::new(counter.next_key(), detection))
            .collect();
        self.pages.insert(
            format!("page_{index}"),
            PageAnnotations {
                annotations,
                page_size,
            },
        );
    }

    pub fn page(&self, index: u32) -> Option<&PageAnnotations> {
        self.pages.get(&format!("page_{index}"))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// All annotation entries in page order.
    pub fn annotations(&self) -> impl Iterator<Item = &AnnotationEntry> {
        self.pages.values().flat_map(|page| page.annotations.iter())
    }
}

// -- Single-document report ---------------------------------------------------

/// A detection as listed in the per-page section of a single-document report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionReport {
    pub category: String,
    pub confidence: f32,
    pub bbox: BoxReport,
}

impl From<&Detection> for DetectionReport {
    fn from(detection: &Detection) -> Self {
        Self {
            category: detection.category.clone(),
            confidence: detection.confidence,
            bbox: BoxReport::from(&detection.bbox),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub page_index: u32,
    pub page_size: PageSize,
    pub detections: Vec<DetectionReport>,
    pub annotated_image_url: String,
}

/// Response for a single-document job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub job_id: String,
    pub pages: Vec<PageReport>,
    pub annotated_pdf_url: String,
    pub result: OrderedMap<DocumentAnnotations>,
    pub statistics: DetectionStats,
}

impl AnalysisReport {
    /// Build the `result` section from already assembled page reports,
    /// numbering annotations from 1 in page order.
    pub fn new(
        job_id: &JobId,
        document_name: &str,
        pages: Vec<PageReport>,
        page_detections: &[Vec<Detection>],
        annotated_pdf_url: String,
        statistics: DetectionStats,
    ) -> Self {
        let mut counter = AnnotationCounter::new();
        let mut document = DocumentAnnotations::new();
        for (page, detections) in pages.iter().zip(page_detections) {
            document.push_page(page.page_index, page.page_size, detections, &mut counter);
        }

        let mut result = OrderedMap::new();
        result.insert(document_name, document);

        Self {
            job_id: job_id.to_string(),
            pages,
            annotated_pdf_url,
            result,
            statistics,
        }
    }
}

// -- Batch report -------------------------------------------------------------

/// Outcome for one archive entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Document(DocumentAnnotations),
    Failed { error: String },
}

/// Response for a batch job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchReport {
    pub job_id: String,
    pub files_processed: usize,
    pub result: OrderedMap<BatchEntry>,
    pub statistics: DetectionStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detection(category: &str, bbox: BBox) -> Detection {
        Detection {
            category: category.into(),
            confidence: 0.9,
            bbox,
            detector: "test".into(),
        }
    }

    #[test]
    fn counter_is_gapless() {
        let mut counter = AnnotationCounter::new();
        let keys: Vec<String> = (0..3).map(|_| counter.next_key()).collect();
        assert_eq!(keys, vec!["annotation_1", "annotation_2", "annotation_3"]);
        assert_eq!(counter.issued(), 3);
    }

    #[test]
    fn annotation_serialises_under_its_key() {
        let entry = AnnotationEntry::new(
            "annotation_1".into(),
            &detection("qr_code", BBox::new(10.0, 20.0, 110.0, 70.0)),
        );
        assert_eq!(entry.area, 5000.0);
        assert_eq!(
            serde_json::to_value(&entry).expect("serialise"),
            json!({
                "annotation_1": {
                    "category": "qr_code",
                    "bbox": { "x": 10.0, "y": 20.0, "width": 100.0, "height": 50.0 },
                    "area": 5000.0
                }
            })
        );
    }

    #[test]
    fn pages_keep_order_and_share_counter() {
        let mut counter = AnnotationCounter::new();
        let mut doc = DocumentAnnotations::new();
        let size = PageSize { width: 100, height: 100 };
        let det = detection("stamp", BBox::new(0.0, 0.0, 2.0, 3.0));

        doc.push_page(1, size, &[det.clone(), det.clone()], &mut counter);
        doc.push_page(2, size, &[], &mut counter);
        doc.push_page(3, size, &[det], &mut counter);

        let keys: Vec<&str> = doc.annotations().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["annotation_1", "annotation_2", "annotation_3"]);

        let json = serde_json::to_string(&doc).expect("serialise");
        let p1 = json.find("page_1").expect("page_1");
        let p2 = json.find("page_2").expect("page_2");
        let p3 = json.find("page_3").expect("page_3");
        assert!(p1 < p2 && p2 < p3);
        assert_eq!(doc.page(2).expect("page 2").annotations.len(), 0);
    }

    #[test]
    fn repeated_name_replaces_in_place() {
        let mut map = OrderedMap::new();
        assert!(map.is_empty());
        map.insert("A.pdf", 1);
        map.insert("B.pdf", 2);
        map.insert("A.pdf", 3);

        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["A.pdf", "B.pdf"]);
        assert_eq!(map.get("A.pdf"), Some(&3));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn batch_error_entry_shape() {
        let mut result = OrderedMap::new();
        result.insert(
            "B.pdf",
            BatchEntry::Failed {
                error: "PDF parsing failed: broken".into(),
            },
        );
        result.insert("C.pdf", BatchEntry::Document(DocumentAnnotations::new()));

        let report = BatchReport {
            job_id: "abc".into(),
            files_processed: 1,
            result,
            statistics: DetectionStats::new(),
        };
        assert_eq!(
            serde_json::to_value(&report).expect("serialise"),
            json!({
                "job_id": "abc",
                "files_processed": 1,
                "result": {
                    "B.pdf": { "error": "PDF parsing failed: broken" },
                    "C.pdf": {}
                },
                "statistics": { "total_detections": 0, "class_statistics": {} }
            })
        );
    }
}
