// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Annotator: draws detection boxes and confidence labels onto a copy of a
// page image using `imageproc` and `ab_glyph`.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use pruefwerk_core::Detection;
use pruefwerk_core::config::AnnotationConfig;
use tracing::{debug, instrument};

use crate::image::font::LabelFont;

const QR_CODE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const SIGNATURE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const STAMP_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const DEFAULT_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Outline colour for a detection category.
pub fn category_color(category: &str) -> Rgb<u8> {
    match category {
        "qr_code" => QR_CODE_COLOR,
        "signature" => SIGNATURE_COLOR,
        "stamp" => STAMP_COLOR,
        _ => DEFAULT_COLOR,
    }
}

/// Label text, e.g. `"qr_code 95%"`.
pub fn label_text(detection: &Detection) -> String {
    format!("{} {:.0}%", detection.category, f64::from(detection.confidence) * 100.0)
}

/// Top-left corner of a `label_w` x `label_h` label for a box whose top-left
/// corner is (`x1`, `y1`), kept inside a `width` x `height` image.
pub fn label_origin(
    x1: i32,
    y1: i32,
    label_w: u32,
    label_h: u32,
    offset: i32,
    width: u32,
    height: u32,
) -> (i32, i32) {
    let max_x = (width as i32 - label_w as i32).max(0);
    let max_y = (height as i32 - label_h as i32).max(0);
    let x = x1.clamp(0, max_x);
    let y = (y1 - offset).clamp(0, max_y);
    (x, y)
}

/// Draws detections onto page copies.
#[derive(Debug)]
pub struct Annotator {
    font: LabelFont,
    font_size: f32,
    line_width: u32,
    label_offset: i32,
}

impl Annotator {
    // -- Construction ---------------------------------------------------------

    /// Build an annotator, loading the first usable font from the config.
    pub fn new(config: &AnnotationConfig) -> Self {
        Self::with_font(LabelFont::load(&config.font_paths), config)
    }

    pub fn with_font(font: LabelFont, config: &AnnotationConfig) -> Self {
        Self {
            font,
            font_size: config.font_size,
            line_width: config.line_width,
            label_offset: config.label_offset,
        }
    }

    pub fn font(&self) -> &LabelFont {
        &self.font
    }

    // -- Drawing --------------------------------------------------------------

    /// Return a copy of `image` with every detection drawn on it. The input is
    /// left untouched.
    #[instrument(skip_all, fields(detections = detections.len()))]
    pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        for detection in detections {
            self.draw_detection(&mut canvas, detection);
        }
        debug!("Annotations drawn");
        canvas
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &Detection) {
        let color = category_color(&detection.category);
        let bbox = &detection.bbox;

        let margin = f64::from(self.line_width);
        let clamp = |value: f64, limit: u32| -> i32 {
            value.round().clamp(-margin, f64::from(limit) + margin) as i32
        };
        let (width, height) = canvas.dimensions();
        let x1 = clamp(bbox.x1, width);
        let y1 = clamp(bbox.y1, height);
        let x2 = clamp(bbox.x2, width);
        let y2 = clamp(bbox.y2, height);

        // Outline grows inward, one pixel per ring.
        for ring in 0..self.line_width as i32 {
            let w = x2 - x1 - 2 * ring + 1;
            let h = y2 - y1 - 2 * ring + 1;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + ring, y1 + ring).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(canvas, rect, color);
        }

        let text = label_text(detection);
        let (text_w, text_h) = self.font.measure(&text, self.font_size);
        let (label_w, label_h) = (text_w.max(1), text_h.max(1));
        let (x, y) = label_origin(
            x1,
            y1,
            label_w,
            label_h,
            self.label_offset,
            canvas.width(),
            canvas.height(),
        );

        draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(label_w, label_h), color);
        if let LabelFont::Loaded { font, .. } = &self.font {
            draw_text_mut(canvas, TEXT_COLOR, x, y, self.font_size, font, &text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pruefwerk_core::BBox;

    fn detection(category: &str, confidence: f32, bbox: BBox) -> Detection {
        Detection {
            category: category.into(),
            confidence,
            bbox,
            detector: "test".into(),
        }
    }

    fn annotator() -> Annotator {
        Annotator::with_font(LabelFont::Unavailable, &AnnotationConfig::default())
    }

    #[test]
    fn colors_by_category() {
        assert_eq!(category_color("qr_code"), Rgb([0, 0, 255]));
        assert_eq!(category_color("signature"), Rgb([255, 0, 0]));
        assert_eq!(category_color("stamp"), Rgb([0, 255, 0]));
        assert_eq!(category_color("barcode"), Rgb([255, 165, 0]));
    }

    #[test]
    fn label_rounds_percentage() {
        let bbox = BBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(label_text(&detection("qr_code", 0.95, bbox)), "qr_code 95%");
        assert_eq!(label_text(&detection("stamp", 0.256, bbox)), "stamp 26%");
    }

    #[test]
    fn label_near_top_edge_is_clamped() {
        assert_eq!(label_origin(10, 20, 100, 32, 40, 500, 500), (10, 0));
        assert_eq!(label_origin(10, 100, 100, 32, 40, 500, 500), (10, 60));
        assert_eq!(label_origin(450, 100, 100, 32, 40, 500, 500), (400, 60));
        assert_eq!(label_origin(-5, 100, 100, 32, 40, 50, 500), (0, 60));
    }

    #[test]
    fn original_is_unmodified_and_box_is_drawn() {
        let page = RgbImage::from_pixel(300, 300, Rgb([255, 255, 255]));
        let detections = [detection("qr_code", 0.9, BBox::new(100.0, 150.0, 200.0, 250.0))];

        let annotated = annotator().annotate(&page, &detections);

        assert!(page.pixels().all(|p| *p == Rgb([255, 255, 255])));
        assert_eq!(annotated.dimensions(), page.dimensions());
        // Outline, including the innermost of the five rings.
        assert_eq!(annotated.get_pixel(100, 200), &QR_CODE_COLOR);
        assert_eq!(annotated.get_pixel(104, 200), &QR_CODE_COLOR);
        assert_eq!(annotated.get_pixel(105, 200), &Rgb([255, 255, 255]));
        // Label background sits 40px above the box.
        assert_eq!(annotated.get_pixel(101, 111), &QR_CODE_COLOR);
    }

    #[test]
    fn degenerate_and_offscreen_boxes_do_not_panic() {
        let page = RgbImage::new(50, 50);
        let detections = [
            detection("signature", 0.5, BBox::new(10.0, 10.0, 10.0, 10.0)),
            detection("stamp", 0.5, BBox::new(-100.0, -100.0, 500.0, 500.0)),
        ];
        let annotated = annotator().annotate(&page, &detections);
        assert_eq!(annotated.dimensions(), (50, 50));
    }

    #[test]
    fn huge_finite_boxes_are_clipped_to_the_page() {
        let page = RgbImage::from_pixel(100, 100, Rgb([255, 255, 255]));
        let white = Rgb([255, 255, 255]);

        let wide = [detection("stamp", 0.5, BBox::new(-1e10, 60.0, 1e10, 70.0))];
        let annotated = annotator().annotate(&page, &wide);
        // Top edge of the box runs across the whole page.
        assert_eq!(annotated.get_pixel(0, 60), &STAMP_COLOR);
        assert_eq!(annotated.get_pixel(99, 60), &STAMP_COLOR);
        assert_eq!(annotated.get_pixel(50, 65), &white);

        let tall = [detection("qr_code", 0.5, BBox::new(0.0, -1e300, 10.0, 1e300))];
        let annotated = annotator().annotate(&page, &tall);
        assert_eq!(annotated.get_pixel(0, 80), &QR_CODE_COLOR);
        assert_eq!(annotated.get_pixel(5, 80), &white);
    }
}
