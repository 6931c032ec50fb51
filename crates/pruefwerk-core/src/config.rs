// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Inspector configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{InspectError, Result};

/// One detector backend: where its weights live, how confident a box must
/// be to be reported, and the name shown in logs and errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub name: String,
    pub model_path: PathBuf,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Category names indexed by the model's class id.
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_confidence_threshold() -> f32 {
    0.25
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(InspectError::Config("detector name must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(InspectError::Config(format!(
                "detector '{}': confidence_threshold {} is outside [0, 1]",
                self.name, self.confidence_threshold
            )));
        }
        Ok(())
    }
}

/// Bounds applied while turning document pages into images.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterConfig {
    /// Longest allowed side of a rendered page, in pixels.
    pub max_dimension: u32,
    /// Upper bound on the render scale relative to 72 DPI (2.8 ≈ 200 DPI).
    pub max_scale: f32,
    /// Largest embedded or rendered image, in pixels, before the size guard
    /// rejects the document.
    pub max_image_pixels: u64,
    /// Largest page count accepted per document.
    pub max_pages: usize,
}

impl Default for RasterConfig {
    fn default() -> Self {
        Self {
            max_dimension: 2048,
            max_scale: 2.8,
            max_image_pixels: 500_000_000,
            max_pages: 1000,
        }
    }
}

/// How detections are drawn onto page copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Font files tried in order; the first one that loads is used.
    pub font_paths: Vec<PathBuf>,
    pub font_size: f32,
    pub line_width: u32,
    /// Distance between a box's top edge and its label, in pixels.
    pub label_offset: i32,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            font_paths: [
                "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
                "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
                "/Library/Fonts/Arial Bold.ttf",
                "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
                "C:\\Windows\\Fonts\\arialbd.ttf",
                "C:\\Windows\\Fonts\\arial.ttf",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            font_size: 32.0,
            line_width: 5,
            label_offset: 40,
        }
    }
}

/// Where per-job artifacts are written and how they are addressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub root: PathBuf,
    pub url_prefix: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("static/annotated"),
            url_prefix: "/static/annotated".into(),
        }
    }
}

/// Request-level resource bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted upload (document or archive), in bytes.
    pub max_request_bytes: usize,
    /// Largest number of PDF entries inspected from one archive.
    pub max_archive_entries: usize,
    /// Jobs allowed to run at the same time in the async service.
    pub max_concurrent_jobs: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: 256 * 1024 * 1024,
            max_archive_entries: 500,
            max_concurrent_jobs: 2,
        }
    }
}

/// Complete inspector settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorConfig {
    pub detectors: Vec<DetectorConfig>,
    /// Square input size shared by every detector.
    pub inference_size: u32,
    pub raster: RasterConfig,
    pub annotation: AnnotationConfig,
    pub artifacts: ArtifactConfig,
    pub limits: LimitsConfig,
    /// Explicit pdfium shared library; the system library is used when unset.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            detectors: vec![
                DetectorConfig {
                    name: "QR Code Detector".into(),
                    model_path: PathBuf::from("./models/qrcode.rten"),
                    confidence_threshold: 0.65,
                    labels: vec!["qr_code".into()],
                },
                DetectorConfig {
                    name: "Signature Detector".into(),
                    model_path: PathBuf::from("./models/signature_stamp.rten"),
                    confidence_threshold: 0.25,
                    labels: vec!["signature".into(), "stamp".into()],
                },
            ],
            inference_size: 1280,
            raster: RasterConfig::default(),
            annotation: AnnotationConfig::default(),
            artifacts: ArtifactConfig::default(),
            limits: LimitsConfig::default(),
            pdfium_library_path: None,
        }
    }
}

impl InspectorConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field that would otherwise fail deep inside a job.
    pub fn validate(&self) -> Result<()> {
        if self.detectors.is_empty() {
            return Err(InspectError::Config("at least one detector is required".into()));
        }

        let mut names = HashSet::new();
        for detector in &self.detectors {
            detector.validate()?;
            if !names.insert(detector.name.as_str()) {
                return Err(InspectError::Config(format!(
                    "duplicate detector name '{}'",
                    detector.name
                )));
            }
        }

        if self.inference_size == 0 || self.inference_size % 32 != 0 {
            return Err(InspectError::Config(format!(
                "inference_size {} must be a positive multiple of 32",
                self.inference_size
            )));
        }
        if self.raster.max_dimension == 0 {
            return Err(InspectError::Config("raster.max_dimension must be positive".into()));
        }
        if !(self.raster.max_scale > 0.0) {
            return Err(InspectError::Config("raster.max_scale must be positive".into()));
        }
        if self.raster.max_pages == 0 || self.limits.max_archive_entries == 0 {
            return Err(InspectError::Config("page and archive entry limits must be positive".into()));
        }
        if self.limits.max_concurrent_jobs == 0 {
            return Err(InspectError::Config("limits.max_concurrent_jobs must be positive".into()));
        }
        if self.annotation.font_size <= 0.0 || self.annotation.line_width == 0 {
            return Err(InspectError::Config("annotation font_size and line_width must be positive".into()));
        }
        Ok(())
    }
}
