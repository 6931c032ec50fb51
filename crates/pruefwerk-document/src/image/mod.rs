// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image module: detection annotation and page image encoding.

pub mod annotate;
pub mod font;
pub mod processor;

pub use annotate::Annotator;
pub use font::LabelFont;
pub use processor::ImageProcessor;
