// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor: encoding of page images for the artifact store, using
// the `image` crate.

use std::path::Path;

use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use pruefwerk_core::error::{InspectError, Result};
use tracing::{debug, instrument};

/// JPEG quality used for per-page artifacts.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Encodes a single in-memory page image.
pub struct ImageProcessor<'a> {
    image: &'a RgbImage,
}

impl<'a> ImageProcessor<'a> {
    pub fn new(image: &'a RgbImage) -> Self {
        Self { image }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the image as JPEG bytes with the given quality (1-100).
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        self.image.write_with_encoder(encoder).map_err(|err| {
            InspectError::ResultPersistence(format!("JPEG encoding failed: {err}"))
        })?;
        Ok(buffer)
    }

    /// Encode as JPEG and write the result to `path`.
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn save_jpeg(&self, path: impl AsRef<Path>, quality: u8) -> Result<()> {
        let bytes = self.to_jpeg_bytes(quality)?;
        std::fs::write(path.as_ref(), &bytes).map_err(|err| {
            InspectError::ResultPersistence(format!(
                "failed to save image to {}: {err}",
                path.as_ref().display()
            ))
        })?;
        debug!(bytes = bytes.len(), "JPEG written");
        Ok(())
    }
}
