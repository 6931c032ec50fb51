// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Pruefwerk document inspector.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an inspection job.
///
/// Rendered as 32 lowercase hex digits, which doubles as the name of the
/// job's artifact directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Supported upload containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    Pdf,
    Zip,
}

impl InputKind {
    /// Infer the container type from a file name's extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }
}

/// Pixel dimensions of a rasterized page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: u32,
    pub height: u32,
}

/// Axis-aligned bounding box in page pixel coordinates (x1, y1, x2, y2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    /// `width * height`, computed from the same values that are reported.
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Intersection over union with another box. Zero for disjoint or
    /// degenerate boxes.
    pub fn iou(&self, other: &BBox) -> f64 {
        let x_min = self.x1.max(other.x1);
        let y_min = self.y1.max(other.y1);
        let x_max = self.x2.min(other.x2);
        let y_max = self.y2.min(other.y2);

        if x_max <= x_min || y_max <= y_min {
            return 0.0;
        }

        let intersection = (x_max - x_min) * (y_max - y_min);
        let union = self.area() + other.area() - intersection;
        if union > 0.0 { intersection / union } else { 0.0 }
    }
}

/// One rasterized page of a document. Immutable once created.
#[derive(Debug, Clone)]
pub struct PageImage {
    index: u32,
    image: RgbImage,
}

impl PageImage {
    /// Wrap a rendered page. `index` is 1-based.
    pub fn new(index: u32, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// 1-based page number within its document.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> PageSize {
        PageSize {
            width: self.width(),
            height: self.height(),
        }
    }

    /// Borrow the pixel buffer.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

/// A single detection reported by one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub category: String,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    pub bbox: BBox,
    /// Display name of the detector that produced this box.
    pub detector: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_hex_without_dashes() {
        let id = JobId::new().to_string();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn input_kind_from_extension() {
        assert_eq!(InputKind::from_file_name("scan.PDF"), Some(InputKind::Pdf));
        assert_eq!(InputKind::from_file_name("batch.zip"), Some(InputKind::Zip));
        assert_eq!(InputKind::from_file_name("notes.txt"), None);
        assert_eq!(InputKind::from_file_name("pdf"), None);
    }

    #[test]
    fn bbox_area_is_width_times_height() {
        let bbox = BBox::new(10.0, 20.0, 110.0, 70.0);
        assert_eq!(bbox.width(), 100.0);
        assert_eq!(bbox.height(), 50.0);
        assert_eq!(bbox.area(), 5000.0);
    }

    #[test]
    fn iou_identical_and_disjoint() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);

        let half = BBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-9);
    }
}
