// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF writer: combine annotated page images into a single multi-page PDF
// using `printpdf` 0.8.
//
// printpdf 0.8 uses a data-oriented API: documents are built by constructing
// `PdfPage` structs containing `Vec<Op>` operation lists, then serialised via
// `PdfDocument::save()`.

use std::path::Path;

use image::RgbImage;
use printpdf::{
    Mm, Op, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg, Pt, RawImage, RawImageData,
    RawImageFormat, XObjectTransform,
};
use pruefwerk_core::error::{InspectError, Result};
use tracing::{debug, info, instrument};

/// Resolution at which one image pixel maps to one PDF point.
const POINTS_PER_INCH: f32 = 72.0;
const MM_PER_INCH: f32 = 25.4;

/// Exports annotated page images as one PDF, one page per image.
///
/// Each page is exactly the size of its image at 72 DPI, so re-rasterizing
/// the export yields the same page count and aspect ratios.
pub struct ArtifactExporter {
    /// Title metadata embedded in the PDF /Info dictionary.
    title: String,
}

impl Default for ArtifactExporter {
    fn default() -> Self {
        Self::new("Annotated document")
    }
}

impl ArtifactExporter {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// Page size in printpdf's Mm units for an image of `width` x `height`.
    fn page_dimensions(width: u32, height: u32) -> (Mm, Mm) {
        let to_mm = |pixels: u32| Mm(pixels as f32 / POINTS_PER_INCH * MM_PER_INCH);
        (to_mm(width), to_mm(height))
    }

    // -- Export ---------------------------------------------------------------

    /// Build a PDF containing `images` in order. Fails on an empty list.
    #[instrument(skip_all, fields(pages = images.len()))]
    pub fn export(&self, images: &[RgbImage]) -> Result<Vec<u8>> {
        if images.is_empty() {
            return Err(InspectError::ResultPersistence(
                "cannot export a PDF without pages".into(),
            ));
        }

        let mut doc = PdfDocument::new(&self.title);
        let mut pages: Vec<PdfPage> = Vec::with_capacity(images.len());

        for image in images {
            let (width, height) = image.dimensions();
            let raw = RawImage {
                pixels: RawImageData::U8(image.as_raw().clone()),
                width: width as usize,
                height: height as usize,
                data_format: RawImageFormat::RGB8,
                tag: Vec::new(),
            };
            let xobject_id = doc.add_image(&raw);

            let ops = vec![Op::UseXobject {
                id: xobject_id,
                transform: XObjectTransform {
                    translate_x: Some(Pt(0.0)),
                    translate_y: Some(Pt(0.0)),
                    scale_x: Some(1.0),
                    scale_y: Some(1.0),
                    dpi: Some(POINTS_PER_INCH),
                    rotate: None,
                },
            }];

            let (page_w, page_h) = Self::page_dimensions(width, height);
            pages.push(PdfPage::new(page_w, page_h, ops));
        }

        doc.with_pages(pages);

        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let output = doc.save(&PdfSaveOptions::default(), &mut warnings);

        debug!(
            output_bytes = output.len(),
            warnings = warnings.len(),
            "Annotated PDF serialised"
        );
        Ok(output)
    }

    // -- File output convenience ----------------------------------------------

    /// Export and write the PDF to `path`.
    pub fn export_to_file(&self, images: &[RgbImage], path: impl AsRef<Path>) -> Result<()> {
        let bytes = self.export(images)?;
        std::fs::write(path.as_ref(), &bytes).map_err(|err| {
            InspectError::ResultPersistence(format!(
                "failed to write {}: {err}",
                path.as_ref().display()
            ))
        })?;
        info!("Wrote annotated PDF to {}", path.as_ref().display());
        Ok(())
    }
}
