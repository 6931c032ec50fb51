// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Detector ensemble: runs every configured detector on a page and merges
// their output in registration order.

use image::RgbImage;
use pruefwerk_core::error::{InspectError, Result};
use pruefwerk_core::{Detection, DetectionStats, PageImage};
use pruefwerk_document::Annotator;
use tracing::{debug, instrument};

use crate::detector::{Detector, PredictParams, RawDetection};

/// Overlap threshold handed to every detector for its own suppression.
pub const IOU_THRESHOLD: f32 = 0.5;

/// Default square model input size.
pub const DEFAULT_INFERENCE_SIZE: u32 = 1280;

/// One registered detector with its display name and confidence threshold.
pub struct EnsembleMember {
    name: String,
    confidence_threshold: f32,
    detector: Box<dyn Detector>,
}

impl EnsembleMember {
    pub fn new(
        name: impl Into<String>,
        confidence_threshold: f32,
        detector: Box<dyn Detector>,
    ) -> Self {
        Self {
            name: name.into(),
            confidence_threshold,
            detector,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }
}

impl std::fmt::Debug for EnsembleMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnsembleMember")
            .field("name", &self.name)
            .field("confidence_threshold", &self.confidence_threshold)
            .finish_non_exhaustive()
    }
}

/// Ordered set of detectors sharing one input size and one annotator.
///
/// There is no suppression across detectors: two detectors reporting the same
/// region both appear in the output.
#[derive(Debug)]
pub struct DetectorEnsemble {
    members: Vec<EnsembleMember>,
    inference_size: u32,
    annotator: Annotator,
}

impl DetectorEnsemble {
    // -- Construction ---------------------------------------------------------

    pub fn new(members: Vec<EnsembleMember>, inference_size: u32, annotator: Annotator) -> Self {
        Self {
            members,
            inference_size,
            annotator,
        }
    }

    /// Load every detector named in `config` with the `rten` YOLO backend.
    #[cfg(feature = "yolo")]
    pub fn from_config(config: &pruefwerk_core::InspectorConfig) -> Result<Self> {
        use crate::yolo::RtenYoloDetector;

        let mut members = Vec::with_capacity(config.detectors.len());
        for detector in &config.detectors {
            let backend =
                RtenYoloDetector::load(detector).map_err(|err| InspectError::Detector {
                    detector: detector.name.clone(),
                    detail: err.to_string(),
                })?;
            members.push(EnsembleMember::new(
                detector.name.clone(),
                detector.confidence_threshold,
                Box::new(backend),
            ));
        }

        tracing::info!(detectors = members.len(), "Detector ensemble loaded");
        Ok(Self::new(
            members,
            config.inference_size,
            Annotator::new(&config.annotation),
        ))
    }

    pub fn members(&self) -> &[EnsembleMember] {
        &self.members
    }

    pub fn inference_size(&self) -> u32 {
        self.inference_size
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    // -- Detection ------------------------------------------------------------

    /// Detect on one page and return the merged detections together with an
    /// annotated copy of the page.
    pub fn detect(
        &self,
        page: &PageImage,
        stats: &mut DetectionStats,
    ) -> Result<(Vec<Detection>, RgbImage)> {
        let detections = self.detect_only(page, stats)?;
        let annotated = self.annotator.annotate(page.image(), &detections);
        Ok((detections, annotated))
    }

    /// Detect on one page without drawing anything.
    ///
    /// `stats` is only updated when every detector succeeded.
    #[instrument(skip_all, fields(page = page.index(), detectors = self.members.len()))]
    pub fn detect_only(
        &self,
        page: &PageImage,
        stats: &mut DetectionStats,
    ) -> Result<Vec<Detection>> {
        let mut merged = Vec::new();

        for member in &self.members {
            let params = PredictParams {
                confidence_threshold: member.confidence_threshold,
                iou_threshold: IOU_THRESHOLD,
                inference_size: self.inference_size,
            };

            let raw = member
                .detector
                .predict(page.image(), &params)
                .map_err(|err| InspectError::Detector {
                    detector: member.name.clone(),
                    detail: err.to_string(),
                })?;

            let before = merged.len();
            for detection in raw {
                if let Some(accepted) = accept(member, detection)? {
                    merged.push(accepted);
                }
            }
            debug!(detector = %member.name, kept = merged.len() - before, "Detector finished");
        }

        stats.record(&merged);
        Ok(merged)
    }
}

/// Validate one raw box and apply the member's threshold.
fn accept(member: &EnsembleMember, raw: RawDetection) -> Result<Option<Detection>> {
    if !(0.0..=1.0).contains(&raw.confidence) {
        return Err(InspectError::Detector {
            detector: member.name.clone(),
            detail: format!("confidence {} is outside [0, 1]", raw.confidence),
        });
    }
    let bbox = raw.bbox;
    if ![bbox.x1, bbox.y1, bbox.x2, bbox.y2].iter().all(|v| v.is_finite()) {
        return Err(InspectError::Detector {
            detector: member.name.clone(),
            detail: "bounding box has non-finite coordinates".into(),
        });
    }
    if raw.confidence < member.confidence_threshold {
        return Ok(None);
    }

    Ok(Some(Detection {
        category: raw.category,
        confidence: raw.confidence,
        bbox,
        detector: member.name.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::PredictError;
    use pruefwerk_core::BBox;
    use pruefwerk_core::config::AnnotationConfig;
    use pruefwerk_document::image::LabelFont;
    use std::sync::{Arc, Mutex};

    type Predicted = std::result::Result<Vec<RawDetection>, PredictError>;

    fn annotator() -> Annotator {
        Annotator::with_font(LabelFont::Unavailable, &AnnotationConfig::default())
    }

    fn fixed(detections: Vec<RawDetection>) -> Box<dyn Detector> {
        Box::new(move |_: &RgbImage, _: &PredictParams| -> Predicted { Ok(detections.clone()) })
    }

    fn page() -> PageImage {
        PageImage::new(1, RgbImage::new(200, 200))
    }

    #[test]
    fn outputs_are_concatenated_in_registration_order() {
        let qr = RawDetection::new("qr_code", 0.9, BBox::new(10.0, 20.0, 110.0, 70.0));
        let sig = RawDetection::new("signature", 0.5, BBox::new(10.0, 20.0, 110.0, 70.0));
        let ensemble = DetectorEnsemble::new(
            vec![
                EnsembleMember::new("QR", 0.65, fixed(vec![qr])),
                EnsembleMember::new("Sig", 0.25, fixed(vec![sig])),
            ],
            DEFAULT_INFERENCE_SIZE,
            annotator(),
        );

        let mut stats = DetectionStats::new();
        let detections = ensemble.detect_only(&page(), &mut stats).expect("detect");

        // Identical boxes from different detectors are both kept.
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].category, "qr_code");
        assert_eq!(detections[0].detector, "QR");
        assert_eq!(detections[1].category, "signature");
        assert_eq!(detections[1].detector, "Sig");
        assert_eq!(stats.total_detections, 2);
    }

    #[test]
    fn member_threshold_and_params_are_applied() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in_detector = Arc::clone(&seen);
        let detector = move |_: &RgbImage, params: &PredictParams| -> Predicted {
            *seen_in_detector.lock().expect("lock") = Some(*params);
            Ok(vec![
                RawDetection::new("qr_code", 0.64, BBox::new(0.0, 0.0, 5.0, 5.0)),
                RawDetection::new("qr_code", 0.65, BBox::new(0.0, 0.0, 5.0, 5.0)),
            ])
        };
        let ensemble = DetectorEnsemble::new(
            vec![EnsembleMember::new("QR", 0.65, Box::new(detector))],
            640,
            annotator(),
        );

        let detections = ensemble
            .detect_only(&page(), &mut DetectionStats::new())
            .expect("detect");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 0.65);

        let params = seen.lock().expect("lock").expect("detector was called");
        assert_eq!(params.confidence_threshold, 0.65);
        assert_eq!(params.iou_threshold, IOU_THRESHOLD);
        assert_eq!(params.inference_size, 640);
    }

    #[test]
    fn failing_detector_fails_the_call_and_leaves_stats_alone() {
        let ok = RawDetection::new("qr_code", 0.9, BBox::new(0.0, 0.0, 5.0, 5.0));
        let failing = |_: &RgbImage, _: &PredictParams| -> Predicted {
            Err(PredictError::Inference("out of memory".into()))
        };
        let ensemble = DetectorEnsemble::new(
            vec![
                EnsembleMember::new("QR", 0.5, fixed(vec![ok])),
                EnsembleMember::new("Sig", 0.5, Box::new(failing)),
            ],
            DEFAULT_INFERENCE_SIZE,
            annotator(),
        );

        let mut stats = DetectionStats::new();
        let err = ensemble.detect_only(&page(), &mut stats).unwrap_err();
        match err {
            InspectError::Detector { detector, detail } => {
                assert_eq!(detector, "Sig");
                assert!(detail.contains("out of memory"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stats, DetectionStats::new());
    }

    #[test]
    fn invalid_confidence_is_rejected() {
        for confidence in [f32::NAN, 1.5, -0.1] {
            let raw = RawDetection::new("stamp", confidence, BBox::new(0.0, 0.0, 1.0, 1.0));
            let ensemble = DetectorEnsemble::new(
                vec![EnsembleMember::new("Stamp", 0.0, fixed(vec![raw]))],
                DEFAULT_INFERENCE_SIZE,
                annotator(),
            );
            let result = ensemble.detect_only(&page(), &mut DetectionStats::new());
            assert!(matches!(result, Err(InspectError::Detector { .. })));
        }
    }

    #[test]
    fn detect_returns_annotated_copy() {
        let raw = RawDetection::new("qr_code", 0.9, BBox::new(50.0, 60.0, 150.0, 160.0));
        let ensemble = DetectorEnsemble::new(
            vec![EnsembleMember::new("QR", 0.5, fixed(vec![raw]))],
            DEFAULT_INFERENCE_SIZE,
            annotator(),
        );
        let page = page();

        let (detections, annotated) = ensemble
            .detect(&page, &mut DetectionStats::new())
            .expect("detect");
        assert_eq!(detections.len(), 1);
        assert_eq!(annotated.dimensions(), page.image().dimensions());
        assert_ne!(&annotated, page.image());
    }
}
