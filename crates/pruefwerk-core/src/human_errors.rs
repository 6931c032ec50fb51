// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// User-facing error messages.
//
// Every technical error is mapped to a plain message plus a suggestion, and to
// a category that tells the calling layer whether the client or the server is
// at fault.

use crate::error::{InspectError, ParseFailure};

/// Who is responsible for an error, from the caller's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is unusable (wrong file type, document too large).
    Client,
    /// Something went wrong while processing a valid request.
    Server,
}

impl ErrorCategory {
    /// HTTP-style status code for this category.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Client => 400,
            Self::Server => 500,
        }
    }
}

/// A human-readable error with a plain message and an actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Summary shown to the user.
    pub message: String,
    /// What the user should try next.
    pub suggestion: String,
    /// Client or server fault.
    pub category: ErrorCategory,
}

impl HumanError {
    pub fn status_code(&self) -> u16 {
        self.category.status_code()
    }
}

/// Message recorded for a batch entry whose document tripped the size guard.
pub const BATCH_OVERSIZED_MESSAGE: &str = "PDF contains very large images and cannot be processed";

/// Convert an `InspectError` into a `HumanError`.
pub fn humanize_error(err: &InspectError) -> HumanError {
    match err {
        InspectError::InputFormat(detail) => HumanError {
            message: detail.clone(),
            suggestion: "Upload a PDF document, or a ZIP archive of PDF documents for batch inspection.".into(),
            category: ErrorCategory::Client,
        },

        InspectError::PdfParse {
            kind: ParseFailure::Oversized,
            ..
        } => HumanError {
            message: "PDF contains very large images.".into(),
            suggestion: "Please try a lower resolution PDF or split it into smaller files.".into(),
            category: ErrorCategory::Client,
        },

        InspectError::PdfParse {
            kind: ParseFailure::Unsupported,
            detail,
        } => HumanError {
            message: format!("PDF content cannot be rendered: {detail}"),
            suggestion: "Re-scan or export the document as a plain image PDF (JPEG or grayscale pages), or use a build with full PDF rendering.".into(),
            category: ErrorCategory::Client,
        },

        InspectError::PdfParse {
            kind: ParseFailure::Corrupt,
            detail,
        } => HumanError {
            message: format!("PDF parsing error: {detail}"),
            suggestion: "The file may be damaged. Try opening it on a computer first to check it works, or try a different file.".into(),
            category: ErrorCategory::Server,
        },

        InspectError::ArchiveFormat(detail) => HumanError {
            message: format!("Invalid ZIP file: {detail}"),
            suggestion: "Re-create the archive with a standard ZIP tool and upload it again.".into(),
            category: ErrorCategory::Client,
        },

        InspectError::Detector { detector, .. } => HumanError {
            message: format!("The {detector} could not process this document."),
            suggestion: "Try again later. If this keeps happening, the detection models may need to be reloaded.".into(),
            category: ErrorCategory::Server,
        },

        InspectError::ResultPersistence(_) | InspectError::Io(_) => HumanError {
            message: "The inspection results could not be saved.".into(),
            suggestion: "Check that the artifact directory is writable and has free space, then try again.".into(),
            category: ErrorCategory::Server,
        },

        InspectError::Config(detail) => HumanError {
            message: "The inspector is misconfigured.".into(),
            suggestion: format!("Fix the configuration file and restart. ({detail})"),
            category: ErrorCategory::Server,
        },

        InspectError::Runtime(_) | InspectError::Serialization(_) => HumanError {
            message: "The inspection failed unexpectedly.".into(),
            suggestion: "Try again. If this keeps happening, please report it.".into(),
            category: ErrorCategory::Server,
        },
    }
}

/// Message stored in a batch result entry for a document that failed to
/// rasterize.
pub fn batch_entry_message(err: &InspectError) -> String {
    match err {
        InspectError::PdfParse {
            kind: ParseFailure::Oversized,
            ..
        } => BATCH_OVERSIZED_MESSAGE.to_string(),
        InspectError::PdfParse {
            kind: ParseFailure::Unsupported,
            detail,
        } => format!("PDF content not supported: {detail}"),
        InspectError::PdfParse { detail, .. } => format!("PDF parsing failed: {detail}"),
        other => format!("PDF parsing failed: {other}"),
    }
}
