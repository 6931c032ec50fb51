// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Rasterizer: turns a PDF into an ordered list of page images with a
// bounded resolution. Geometry, scale selection and size guards live here;
// the actual pixel production is delegated to a `PageRenderer`.

use std::sync::Arc;

use image::DynamicImage;
use pruefwerk_core::config::RasterConfig;
use pruefwerk_core::error::{InspectError, Result};
use pruefwerk_core::PageImage;
use tracing::{debug, info, instrument};

use crate::pdf::reader::{PageGeometry, PdfReader};

/// Resolution chosen for one page before rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTarget {
    /// 1-based page number.
    pub page_index: u32,
    /// Pixels per PDF point.
    pub scale: f32,
    pub width: u32,
    pub height: u32,
}

/// Produces pixels for already-planned pages.
///
/// Implementations receive the raw document and the targets in page order,
/// and must return exactly one image per target, in the same order.
pub trait PageRenderer: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn render(&self, document: &[u8], targets: &[RenderTarget]) -> Result<Vec<DynamicImage>>;
}

/// Render scale for a page of `width_pt` x `height_pt` points.
///
/// The longest side never exceeds `max_dimension` pixels and the scale never
/// exceeds `max_scale`.
pub fn compute_scale(width_pt: f64, height_pt: f64, config: &RasterConfig) -> f32 {
    let max_dim = f64::from(config.max_dimension);
    let scale = (max_dim / width_pt)
        .min(max_dim / height_pt)
        .min(f64::from(config.max_scale));
    scale as f32
}

/// Pixel size of a page rendered at `scale`, clamped to `[1, max_dimension]`.
pub fn target_size(width_pt: f64, height_pt: f64, scale: f32, config: &RasterConfig) -> (u32, u32) {
    let clamp = |points: f64| -> u32 {
        let pixels = (points * f64::from(scale)).round();
        (pixels.max(1.0) as u32).min(config.max_dimension)
    };
    (clamp(width_pt), clamp(height_pt))
}

/// Bounded-resolution PDF rasterizer.
#[derive(Clone)]
pub struct Rasterizer {
    config: RasterConfig,
    renderer: Arc<dyn PageRenderer>,
}

impl Rasterizer {
    // -- Construction ---------------------------------------------------------

    pub fn new(config: RasterConfig, renderer: Arc<dyn PageRenderer>) -> Self {
        Self { config, renderer }
    }

    pub fn config(&self) -> &RasterConfig {
        &self.config
    }

    pub fn renderer_name(&self) -> &str {
        self.renderer.name()
    }

    // -- Planning -------------------------------------------------------------

    /// Parse the document, apply the size guards and compute one render
    /// target per page.
    #[instrument(skip_all, fields(bytes_len = document.len()))]
    pub fn plan(&self, document: &[u8]) -> Result<Vec<RenderTarget>> {
        let reader = PdfReader::from_bytes(document)?;

        let page_count = reader.page_count();
        if page_count == 0 {
            return Err(InspectError::corrupt_pdf("document has no pages"));
        }
        if page_count > self.config.max_pages {
            return Err(InspectError::oversized_pdf(format!(
                "document has {page_count} pages (limit {})",
                self.config.max_pages
            )));
        }

        reader.check_image_sizes(self.config.max_image_pixels)?;

        reader
            .page_geometries()?
            .iter()
            .map(|geometry| self.target_for(geometry))
            .collect()
    }

    fn target_for(&self, geometry: &PageGeometry) -> Result<RenderTarget> {
        let scale = compute_scale(geometry.width_pt, geometry.height_pt, &self.config);
        if !(scale.is_finite() && scale > 0.0) {
            return Err(InspectError::corrupt_pdf(format!(
                "page {} has an unusable size",
                geometry.number
            )));
        }

        let (width, height) = target_size(geometry.width_pt, geometry.height_pt, scale, &self.config);
        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.config.max_image_pixels {
            return Err(InspectError::oversized_pdf(format!(
                "page {} would render to {width}x{height} pixels",
                geometry.number
            )));
        }

        Ok(RenderTarget {
            page_index: geometry.number,
            scale,
            width,
            height,
        })
    }

    // -- Rendering ------------------------------------------------------------

    /// Rasterize every page, in document order.
    #[instrument(skip_all, fields(bytes_len = document.len(), renderer = self.renderer.name()))]
    pub fn rasterize(&self, document: &[u8]) -> Result<Vec<PageImage>> {
        let targets = self.plan(document)?;
        debug!(pages = targets.len(), "Render targets planned");

        let images = self.renderer.render(document, &targets)?;
        if images.len() != targets.len() {
            return Err(InspectError::corrupt_pdf(format!(
                "renderer produced {} images for {} pages",
                images.len(),
                targets.len()
            )));
        }

        let pages: Vec<PageImage> = targets
            .iter()
            .zip(images)
            .map(|(target, image)| PageImage::new(target.page_index, image.into_rgb8()))
            .collect();

        info!(pages = pages.len(), "Document rasterized");
        Ok(pages)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pdf::reader::tests::build_pdf;
    use image::RgbImage;

    /// Renders blank pages of exactly the requested size.
    pub(crate) struct BlankRenderer;

    impl PageRenderer for BlankRenderer {
        fn name(&self) -> &str {
            "blank"
        }

        fn render(&self, _document: &[u8], targets: &[RenderTarget]) -> Result<Vec<DynamicImage>> {
            Ok(targets
                .iter()
                .map(|t| DynamicImage::ImageRgb8(RgbImage::new(t.width, t.height)))
                .collect())
        }
    }

    fn rasterizer(config: RasterConfig) -> Rasterizer {
        Rasterizer::new(config, Arc::new(BlankRenderer))
    }

    #[test]
    fn letter_page_is_limited_by_max_scale() {
        let config = RasterConfig::default();
        let scale = compute_scale(612.0, 792.0, &config);
        assert!((scale - 2.5858586).abs() < 1e-4, "got {scale}");

        let (w, h) = target_size(612.0, 792.0, scale, &config);
        assert_eq!(h, 2048);
        assert_eq!(w, 1583);
    }

    #[test]
    fn small_page_uses_max_scale() {
        let config = RasterConfig::default();
        let scale = compute_scale(100.0, 50.0, &config);
        assert_eq!(scale, 2.8);
        assert_eq!(target_size(100.0, 50.0, scale, &config), (280, 140));
    }

    #[test]
    fn every_page_is_rendered_in_order_within_bounds() {
        let bytes = build_pdf(&[
            (612.0, 792.0, 0, None),
            (2000.0, 300.0, 0, None),
            (612.0, 792.0, 270, None),
        ]);
        let pages = rasterizer(RasterConfig::default())
            .rasterize(&bytes)
            .expect("rasterize");

        assert_eq!(pages.len(), 3);
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.index(), i as u32 + 1);
            assert!(page.width() <= 2048 && page.height() <= 2048);
        }
        assert_eq!(pages[1].width(), 2048);
        assert!(pages[2].width() > pages[2].height());
    }

    #[test]
    fn too_many_pages_is_oversized() {
        let bytes = build_pdf(&[(100.0, 100.0, 0, None), (100.0, 100.0, 0, None)]);
        let config = RasterConfig {
            max_pages: 1,
            ..RasterConfig::default()
        };
        let err = rasterizer(config).rasterize(&bytes).unwrap_err();
        assert!(err.is_oversized());
    }

    #[test]
    fn huge_embedded_image_is_oversized() {
        let bytes = build_pdf(&[(100.0, 100.0, 0, Some((20, 20)))]);
        let config = RasterConfig {
            max_image_pixels: 100,
            ..RasterConfig::default()
        };
        let err = rasterizer(config).rasterize(&bytes).unwrap_err();
        assert!(err.is_oversized());
    }

    #[test]
    fn malformed_document_is_corrupt() {
        let err = rasterizer(RasterConfig::default())
            .rasterize(b"%PDF-1.4 truncated")
            .unwrap_err();
        assert!(!err.is_oversized());
        assert!(matches!(err, InspectError::PdfParse { .. }));
    }
}
