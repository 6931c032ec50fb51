// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: geometry inspection, bounded rasterization, page renderers and
// annotated-PDF export.

pub mod raster;
pub mod reader;
pub mod scan_renderer;
pub mod writer;

#[cfg(feature = "pdfium")]
pub mod pdfium;

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumRenderer;
pub use raster::{PageRenderer, Rasterizer, RenderTarget};
pub use reader::PdfReader;
pub use scan_renderer::ScanPageRenderer;
pub use writer::ArtifactExporter;
