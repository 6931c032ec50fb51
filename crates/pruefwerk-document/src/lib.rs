// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// pruefwerk-document: Document processing for the Pruefwerk inspector.
//
// Provides PDF operations (geometry inspection, bounded rasterization through
// pluggable page renderers, annotated-PDF export) and image operations
// (detection annotation, JPEG encoding).

pub mod image;
pub mod pdf;

// Re-export the primary structs so callers can use `pruefwerk_document::Rasterizer` etc.
pub use image::annotate::Annotator;
pub use image::processor::ImageProcessor;
pub use pdf::raster::{PageRenderer, Rasterizer, RenderTarget};
pub use pdf::reader::PdfReader;
pub use pdf::scan_renderer::ScanPageRenderer;
pub use pdf::writer::ArtifactExporter;

#[cfg(feature = "pdfium")]
pub use pdf::pdfium::PdfiumRenderer;
