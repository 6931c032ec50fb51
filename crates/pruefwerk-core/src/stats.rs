// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-job detection statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Detection;

/// Total and per-category detection counts for one job.
///
/// Each job owns its own value and threads it through the page loop by
/// `&mut`, so two jobs running at the same time never see each other's
/// counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionStats {
    pub total_detections: u64,
    pub class_statistics: BTreeMap<String, u64>,
}

impl DetectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero both counters.
    pub fn reset(&mut self) {
        self.total_detections = 0;
        self.class_statistics.clear();
    }

    /// Count a merged detection list.
    pub fn record(&mut self, detections: &[Detection]) {
        self.total_detections += detections.len() as u64;
        for detection in detections {
            *self
                .class_statistics
                .entry(detection.category.clone())
                .or_insert(0) += 1;
        }
    }

    /// Immutable copy of the current counts.
    pub fn snapshot(&self) -> DetectionStats {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BBox;

    fn detection(category: &str) -> Detection {
        Detection {
            category: category.into(),
            confidence: 0.9,
            bbox: BBox::new(0.0, 0.0, 1.0, 1.0),
            detector: "test".into(),
        }
    }

    #[test]
    fn record_counts_total_and_per_category() {
        let mut stats = DetectionStats::new();
        stats.record(&[detection("qr_code"), detection("signature")]);
        stats.record(&[detection("qr_code")]);

        assert_eq!(stats.total_detections, 3);
        assert_eq!(stats.class_statistics["qr_code"], 2);
        assert_eq!(stats.class_statistics["signature"], 1);
    }

    #[test]
    fn reset_then_empty_pages_yields_empty_statistics() {
        let mut stats = DetectionStats::new();
        stats.record(&[detection("stamp")]);
        stats.reset();
        stats.record(&[]);
        stats.record(&[]);

        let json = serde_json::to_value(stats.snapshot()).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({ "total_detections": 0, "class_statistics": {} })
        );
    }

    #[test]
    fn snapshot_is_detached() {
        let mut stats = DetectionStats::new();
        stats.record(&[detection("qr_code")]);
        let snapshot = stats.snapshot();
        stats.record(&[detection("qr_code")]);

        assert_eq!(snapshot.total_detections, 1);
        assert_eq!(stats.total_detections, 2);
    }
}
