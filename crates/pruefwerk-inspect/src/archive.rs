// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// ZIP archive reading for batch jobs: PDF entry selection and display name
// decoding.

use std::io::{Cursor, Read};

use pruefwerk_core::error::{InspectError, Result};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Directory macOS adds to archives for resource forks.
const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Decode an entry name for display.
///
/// Strategies, in order: the raw name bytes as strict UTF-8 (recovers UTF-8
/// names written without the UTF-8 flag), then the name as decoded by the
/// archive reader (CP437 for legacy entries).
pub fn decode_entry_name(raw: &[u8], archive_decoded: &str) -> String {
    match std::str::from_utf8(raw) {
        Ok(name) => name.to_string(),
        Err(_) => archive_decoded.to_string(),
    }
}

/// Whether an entry name refers to a PDF worth inspecting.
///
/// Skips macOS metadata, hidden files (including `._` AppleDouble files) and
/// anything without a `.pdf` extension.
pub fn is_pdf_candidate(name: &str) -> bool {
    if name.split('/').any(|part| part == MACOS_METADATA_DIR) {
        return false;
    }
    let base = name.rsplit('/').next().unwrap_or(name);
    if base.is_empty() || base.starts_with('.') {
        return false;
    }
    base.to_ascii_lowercase().ends_with(".pdf")
}

/// A PDF entry selected for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfEntry {
    /// Position in the archive's central directory.
    pub index: usize,
    pub display_name: String,
}

/// Read-only view over an uploaded archive.
pub struct PdfArchive<'a> {
    archive: ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> PdfArchive<'a> {
    /// Open an archive held in memory.
    pub fn open(bytes: &'a [u8]) -> Result<Self> {
        let archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|err| InspectError::ArchiveFormat(err.to_string()))?;
        Ok(Self { archive })
    }

    /// PDF entries in archive order. Fails when more than `max_entries`
    /// qualify.
    pub fn pdf_entries(&mut self, max_entries: usize) -> Result<Vec<PdfEntry>> {
        let mut entries = Vec::new();

        for index in 0..self.archive.len() {
            let file = match self.archive.by_index(index) {
                Ok(file) => file,
                Err(err) => {
                    warn!(index, %err, "Unreadable archive entry, skipping");
                    continue;
                }
            };
            if file.is_dir() {
                continue;
            }

            let display_name = decode_entry_name(file.name_raw(), file.name());
            if !is_pdf_candidate(&display_name) {
                debug!(name = %display_name, "Skipping non-PDF entry");
                continue;
            }

            entries.push(PdfEntry {
                index,
                display_name,
            });
            if entries.len() > max_entries {
                return Err(InspectError::ArchiveFormat(format!(
                    "archive contains more than {max_entries} PDF files"
                )));
            }
        }
        Ok(entries)
    }

    /// Read one entry's bytes, refusing entries that decompress to more than
    /// `max_bytes`.
    pub fn read(&mut self, entry: &PdfEntry, max_bytes: usize) -> Result<Vec<u8>> {
        let file = self
            .archive
            .by_index(entry.index)
            .map_err(|err| InspectError::ArchiveFormat(err.to_string()))?;

        let mut buffer = Vec::with_capacity((file.size() as usize).min(max_bytes));
        file.take(max_bytes as u64 + 1)
            .read_to_end(&mut buffer)
            .map_err(|err| InspectError::ArchiveFormat(format!("{}: {err}", entry.display_name)))?;

        if buffer.len() > max_bytes {
            return Err(InspectError::ArchiveFormat(format!(
                "{} is larger than {max_bytes} bytes",
                entry.display_name
            )));
        }
        Ok(buffer)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        build_zip_with(entries, zip::CompressionMethod::Stored)
    }

    pub(crate) fn build_zip_with(
        entries: &[(&str, &[u8])],
        method: zip::CompressionMethod,
    ) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(method);
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).expect("add dir");
            } else {
                writer.start_file(*name, options).expect("start file");
                writer.write_all(data).expect("write entry");
            }
        }
        writer.finish().expect("finish zip").into_inner()
    }

    #[test]
    fn candidate_filter() {
        assert!(is_pdf_candidate("A.pdf"));
        assert!(is_pdf_candidate("nested/dir/Report.PDF"));
        assert!(!is_pdf_candidate("__MACOSX/._A.pdf"));
        assert!(!is_pdf_candidate("docs/__MACOSX/A.pdf"));
        assert!(!is_pdf_candidate("._A.pdf"));
        assert!(!is_pdf_candidate("docs/.hidden.pdf"));
        assert!(!is_pdf_candidate(".DS_Store"));
        assert!(!is_pdf_candidate("notes.txt"));
        assert!(!is_pdf_candidate("folder/"));
    }

    #[test]
    fn name_decoding_prefers_strict_utf8() {
        assert_eq!(decode_entry_name("Prüfung.pdf".as_bytes(), "PrÃ¼fung.pdf"), "Prüfung.pdf");
        // 0x81 is `ü` in CP437 but not valid UTF-8.
        assert_eq!(decode_entry_name(b"Pr\x81fung.pdf", "Prüfung.pdf"), "Prüfung.pdf");
    }

    #[test]
    fn entries_keep_archive_order_and_skip_noise() {
        let bytes = build_zip(&[
            ("B.pdf", b"b"),
            ("docs/", b""),
            ("__MACOSX/._B.pdf", b"x"),
            ("readme.txt", b"r"),
            ("A.pdf", b"a"),
        ]);
        let mut archive = PdfArchive::open(&bytes).expect("open");
        let entries = archive.pdf_entries(10).expect("entries");

        let names: Vec<&str> = entries.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["B.pdf", "A.pdf"]);
        assert_eq!(archive.read(&entries[1], 1024).expect("read"), b"a");
    }

    #[test]
    fn entry_limits_are_enforced() {
        let bytes = build_zip(&[("A.pdf", b"0123456789"), ("B.pdf", b"b")]);
        let mut archive = PdfArchive::open(&bytes).expect("open");

        assert!(matches!(archive.pdf_entries(1), Err(InspectError::ArchiveFormat(_))));

        let entries = archive.pdf_entries(2).expect("entries");
        assert!(archive.read(&entries[0], 5).is_err());
    }

    #[test]
    fn garbage_is_archive_format_error() {
        assert!(matches!(
            PdfArchive::open(b"not a zip"),
            Err(InspectError::ArchiveFormat(_))
        ));
    }
}
