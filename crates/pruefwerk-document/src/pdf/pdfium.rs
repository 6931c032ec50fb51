// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pdfium renderer: full-fidelity page rendering through `pdfium-render`.
//
// Only compiled when the `pdfium` feature is enabled. The shared library is
// bound per call, so no pdfium state outlives a render.

use std::path::PathBuf;

use image::DynamicImage;
use pdfium_render::prelude::*;
use pruefwerk_core::error::{InspectError, Result};
use tracing::{debug, info, instrument, warn};

use crate::pdf::raster::{PageRenderer, RenderTarget};

/// Renders pages with the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRenderer {
    /// Directory holding the pdfium shared library. When unset, or when
    /// binding from it fails, the system library is used.
    library_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    /// Bind the configured library, falling back to the system one.
    fn bind(&self) -> Result<Pdfium> {
        let bindings = match &self.library_path {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                .or_else(|err| {
                    warn!(path = %dir.display(), %err, "Binding pdfium failed, trying system library");
                    Pdfium::bind_to_system_library()
                }),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|err| InspectError::Runtime(format!("pdfium library unavailable: {err}")))?;

        debug!("pdfium bound");
        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn name(&self) -> &str {
        "pdfium"
    }

    #[instrument(skip_all, fields(pages = targets.len()))]
    fn render(&self, document: &[u8], targets: &[RenderTarget]) -> Result<Vec<DynamicImage>> {
        let pdfium = self.bind()?;
        let pdf = pdfium
            .load_pdf_from_byte_slice(document, None)
            .map_err(|err| InspectError::corrupt_pdf(format!("pdfium could not open document: {err}")))?;

        let mut images = Vec::with_capacity(targets.len());
        for target in targets {
            let index = u16::try_from(target.page_index.saturating_sub(1)).map_err(|_| {
                InspectError::oversized_pdf(format!("page {} is out of range", target.page_index))
            })?;
            let page = pdf.pages().get(index).map_err(|err| {
                InspectError::corrupt_pdf(format!("cannot load page {}: {err}", target.page_index))
            })?;

            let config = PdfRenderConfig::new()
                .set_target_size(target.width as i32, target.height as i32);
            let bitmap = page.render_with_config(&config).map_err(|err| {
                InspectError::corrupt_pdf(format!("cannot render page {}: {err}", target.page_index))
            })?;

            images.push(bitmap.as_image());
        }

        info!(pages = images.len(), "Pages rendered with pdfium");
        Ok(images)
    }
}
