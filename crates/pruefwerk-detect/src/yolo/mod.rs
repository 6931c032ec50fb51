// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// YOLO pre- and post-processing.
//
// The model sees a square letterboxed copy of the page and produces a
// `[1, 4 + classes, anchors]` tensor: box centre, width and height in
// letterbox pixels, followed by one score per class. Decoding picks the best
// class per anchor, drops low scores, suppresses same-class overlaps and maps
// the survivors back to page pixels.

#[cfg(feature = "yolo")]
mod rten_backend;

#[cfg(feature = "yolo")]
pub use rten_backend::RtenYoloDetector;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use pruefwerk_core::BBox;

use crate::detector::{PredictError, RawDetection};

/// Grey used for letterbox padding.
pub const PAD_VALUE: u8 = 114;

/// How a page was fitted into the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    /// Model pixels per page pixel.
    pub ratio: f64,
    pub pad_x: f64,
    pub pad_y: f64,
    /// Original page size.
    pub source_width: u32,
    pub source_height: u32,
}

impl Letterbox {
    /// Map a box from letterbox pixels back to page pixels, clamped to the page.
    pub fn restore(&self, bbox: BBox) -> BBox {
        let w = f64::from(self.source_width);
        let h = f64::from(self.source_height);
        let x = |v: f64| ((v - self.pad_x) / self.ratio).clamp(0.0, w);
        let y = |v: f64| ((v - self.pad_y) / self.ratio).clamp(0.0, h);
        BBox::new(x(bbox.x1), y(bbox.y1), x(bbox.x2), y(bbox.y2))
    }
}

/// Resize `image` to fit a `size` x `size` square, keeping its aspect ratio,
/// and centre it on a grey canvas.
pub fn letterbox(image: &RgbImage, size: u32) -> Result<(RgbImage, Letterbox), PredictError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || size == 0 {
        return Err(PredictError::Input(format!(
            "cannot letterbox a {width}x{height} image into {size}x{size}"
        )));
    }

    let ratio = (f64::from(size) / f64::from(width)).min(f64::from(size) / f64::from(height));
    let new_w = ((f64::from(width) * ratio).round() as u32).clamp(1, size);
    let new_h = ((f64::from(height) * ratio).round() as u32).clamp(1, size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::replace(&mut canvas, &resized, i64::from(pad_x), i64::from(pad_y));

    Ok((
        canvas,
        Letterbox {
            ratio,
            pad_x: f64::from(pad_x),
            pad_y: f64::from(pad_y),
            source_width: width,
            source_height: height,
        },
    ))
}

/// Planar RGB samples scaled to `[0, 1]`, laid out as `[3, height, width]`.
pub fn to_chw(image: &RgbImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let plane = width as usize * height as usize;
    let mut data = vec![0.0f32; plane * 3];
    for (i, pixel) in image.pixels().enumerate() {
        for (channel, value) in pixel.0.iter().enumerate() {
            data[channel * plane + i] = f32::from(*value) / 255.0;
        }
    }
    data
}

/// A decoded box still in letterbox coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub score: f32,
    pub bbox: BBox,
}

/// Decode a `[1, 4 + classes, anchors]` output tensor given as its shape and
/// row-major data. Anchors whose best score is below `threshold` are dropped.
pub fn decode_output(
    shape: &[usize],
    data: &[f32],
    threshold: f32,
) -> Result<Vec<Candidate>, PredictError> {
    let [batch, rows, anchors] = *shape else {
        return Err(PredictError::Output(format!("expected a rank-3 tensor, got shape {shape:?}")));
    };
    if batch != 1 || rows < 5 {
        return Err(PredictError::Output(format!(
            "expected shape [1, 4 + classes, anchors], got {shape:?}"
        )));
    }
    if data.len() != rows * anchors {
        return Err(PredictError::Output(format!(
            "tensor holds {} values but shape {shape:?} needs {}",
            data.len(),
            rows * anchors
        )));
    }

    let at = |row: usize, anchor: usize| data[row * anchors + anchor];
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let Some((class_id, score)) = (4..rows)
            .map(|row| (row - 4, at(row, anchor)))
            .filter(|(_, score)| score.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        if score < threshold {
            continue;
        }

        let cx = f64::from(at(0, anchor));
        let cy = f64::from(at(1, anchor));
        let w = f64::from(at(2, anchor));
        let h = f64::from(at(3, anchor));
        candidates.push(Candidate {
            class_id,
            score: score.clamp(0.0, 1.0),
            bbox: BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
        });
    }
    Ok(candidates)
}

/// Class-aware non-maximum suppression: within a class, keep the highest
/// score and drop every box overlapping it by more than `iou_threshold`.
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        let suppressed = keep.iter().any(|kept| {
            kept.class_id == candidate.class_id
                && kept.bbox.iou(&candidate.bbox) > f64::from(iou_threshold)
        });
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

/// Full post-processing: decode, suppress, restore to page pixels and name
/// each class from `labels`.
pub fn postprocess(
    shape: &[usize],
    data: &[f32],
    letterbox: &Letterbox,
    labels: &[String],
    confidence_threshold: f32,
    iou_threshold: f32,
) -> Result<Vec<RawDetection>, PredictError> {
    let candidates = decode_output(shape, data, confidence_threshold)?;
    let kept = non_max_suppression(candidates, iou_threshold);

    Ok(kept
        .into_iter()
        .map(|candidate| {
            let category = labels
                .get(candidate.class_id)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", candidate.class_id));
            RawDetection::new(category, candidate.score, letterbox.restore(candidate.bbox))
        })
        .filter(|detection| detection.bbox.width() > 0.0 && detection.bbox.height() > 0.0)
        .collect())
}
