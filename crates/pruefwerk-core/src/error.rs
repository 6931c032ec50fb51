// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Pruefwerk.

use std::fmt;

use thiserror::Error;

/// Why a document could not be rasterized.
///
/// A corrupt file is a server side parse failure. Oversized and unsupported
/// documents are something the user can fix, by lowering the resolution or
/// by re-saving the scan in a simpler format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// The document is malformed or has no usable pages.
    Corrupt,
    /// Decoded pixel dimensions or page count exceed a safety limit.
    Oversized,
    /// The document is valid but uses content the active renderer cannot draw.
    Unsupported,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt => f.write_str("corrupt document"),
            Self::Oversized => f.write_str("size limit exceeded"),
            Self::Unsupported => f.write_str("unsupported content"),
        }
    }
}

/// Top-level error type for all Pruefwerk operations.
#[derive(Debug, Error)]
pub enum InspectError {
    // -- Input errors --
    #[error("unsupported input: {0}")]
    InputFormat(String),

    #[error("PDF parsing error ({kind}): {detail}")]
    PdfParse { kind: ParseFailure, detail: String },

    #[error("invalid ZIP archive: {0}")]
    ArchiveFormat(String),

    // -- Pipeline errors --
    #[error("detector '{detector}' failed: {detail}")]
    Detector { detector: String, detail: String },

    #[error("failed to write inspection artifacts: {0}")]
    ResultPersistence(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("inspection task failed: {0}")]
    Runtime(String),

    // -- Ambient --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl InspectError {
    /// A malformed-document parse error.
    pub fn corrupt_pdf(detail: impl Into<String>) -> Self {
        Self::PdfParse {
            kind: ParseFailure::Corrupt,
            detail: detail.into(),
        }
    }

    /// A size-guard parse error.
    pub fn oversized_pdf(detail: impl Into<String>) -> Self {
        Self::PdfParse {
            kind: ParseFailure::Oversized,
            detail: detail.into(),
        }
    }

    /// A parse error for well-formed content the renderer cannot draw.
    pub fn unsupported_pdf(detail: impl Into<String>) -> Self {
        Self::PdfParse {
            kind: ParseFailure::Unsupported,
            detail: detail.into(),
        }
    }

    /// True when this error was raised by the oversized-image guard.
    pub fn is_oversized(&self) -> bool {
        matches!(
            self,
            Self::PdfParse {
                kind: ParseFailure::Oversized,
                ..
            }
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, InspectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_and_corrupt_are_distinguishable() {
        let big = InspectError::oversized_pdf("image 30000x30000 exceeds limit");
        let bad = InspectError::corrupt_pdf("invalid file header");

        assert!(big.is_oversized());
        assert!(!bad.is_oversized());
        assert!(big.to_string().contains("size limit exceeded"));
        assert!(bad.to_string().contains("corrupt document"));
    }

    #[test]
    fn unsupported_content_is_its_own_kind() {
        let err = InspectError::unsupported_pdf("image filter JBIG2Decode");
        assert!(!err.is_oversized());
        assert_eq!(
            err.to_string(),
            "PDF parsing error (unsupported content): image filter JBIG2Decode"
        );
    }

    #[test]
    fn detector_error_names_the_detector() {
        let err = InspectError::Detector {
            detector: "QR Code Detector".into(),
            detail: "model returned no output".into(),
        };
        assert_eq!(
            err.to_string(),
            "detector 'QR Code Detector' failed: model returned no output"
        );
    }
}
