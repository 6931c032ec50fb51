// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Detector contract shared by every backend.

use image::RgbImage;
use pruefwerk_core::BBox;
use thiserror::Error;

/// Parameters passed to a detector for one prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictParams {
    /// Minimum confidence for a box to be reported.
    pub confidence_threshold: f32,
    /// Overlap above which same-class boxes are suppressed.
    pub iou_threshold: f32,
    /// Square model input size in pixels.
    pub inference_size: u32,
}

/// One box as reported by a backend, in the input image's pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub category: String,
    pub confidence: f32,
    pub bbox: BBox,
}

impl RawDetection {
    pub fn new(category: impl Into<String>, confidence: f32, bbox: BBox) -> Self {
        Self {
            category: category.into(),
            confidence,
            bbox,
        }
    }
}

/// Why a backend could not produce detections.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("model could not be loaded: {0}")]
    ModelLoad(String),

    #[error("invalid model input: {0}")]
    Input(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unexpected model output: {0}")]
    Output(String),
}

/// An object detector.
///
/// Implementations are built once and shared between jobs, so they must be
/// usable from several threads at the same time.
pub trait Detector: Send + Sync {
    /// Detect objects in `image`. Boxes are in `image` pixel coordinates.
    fn predict(
        &self,
        image: &RgbImage,
        params: &PredictParams,
    ) -> Result<Vec<RawDetection>, PredictError>;
}

impl<F> Detector for F
where
    F: Fn(&RgbImage, &PredictParams) -> Result<Vec<RawDetection>, PredictError> + Send + Sync,
{
    fn predict(
        &self,
        image: &RgbImage,
        params: &PredictParams,
    ) -> Result<Vec<RawDetection>, PredictError> {
        self(image, params)
    }
}
