// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Label font loading with an ordered list of candidate files.

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use imageproc::drawing::text_size;
use tracing::{debug, info};

/// Average glyph advance as a fraction of the font size, used to size label
/// backgrounds when no font could be loaded.
const FALLBACK_ADVANCE: f32 = 0.6;

/// Font used for detection labels.
pub enum LabelFont {
    /// A parsed font file.
    Loaded { font: FontVec, path: PathBuf },
    /// No candidate could be loaded. Labels keep their background but carry
    /// no glyphs.
    Unavailable,
}

impl std::fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded { path, .. } => f.debug_struct("Loaded").field("path", path).finish(),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}

impl LabelFont {
    /// Try each candidate in order; the first file that reads and parses wins.
    pub fn load(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            match Self::from_path(path) {
                Some(font) => {
                    info!("Loaded label font: {}", path.display());
                    return font;
                }
                None => debug!("Font candidate unusable: {}", path.display()),
            }
        }

        debug!("No label font found, labels will be drawn without text");
        Self::Unavailable
    }

    fn from_path(path: &Path) -> Option<Self> {
        let data = std::fs::read(path).ok()?;
        let font = FontVec::try_from_vec(data).ok()?;
        Some(Self::Loaded {
            font,
            path: path.to_path_buf(),
        })
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }

    /// Rendered size of `text` in pixels at `size`.
    pub fn measure(&self, text: &str, size: f32) -> (u32, u32) {
        match self {
            Self::Loaded { font, .. } => text_size(size, font, text),
            Self::Unavailable => {
                let width = text.chars().count() as f32 * size * FALLBACK_ADVANCE;
                (width.ceil() as u32, size.ceil() as u32)
            }
        }
    }
}
