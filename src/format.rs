//! Document format detection for uploaded blobs.
//!
//! The declared media type decides the preview strategy. Only when the
//! declaration carries no information (empty or `application/octet-stream`)
//! do we fall back to the file extension and then to the first bytes of the
//! blob. A specific but unsupported declaration such as `text/plain` is never
//! second-guessed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::Path;

pub const PDF_MEDIA_TYPE: &str = "application/pdf";
pub const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const PPTX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const GENERIC_MEDIA_TYPE: &str = "application/octet-stream";

/// The three document formats a slot can preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentFormat {
    Pdf,
    WordDocument,
    Presentation,
}

impl DocumentFormat {
    /// Map a declared media type. Parameters (`; charset=...`) and case are ignored.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        let essence = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            PDF_MEDIA_TYPE => Some(DocumentFormat::Pdf),
            DOCX_MEDIA_TYPE => Some(DocumentFormat::WordDocument),
            PPTX_MEDIA_TYPE => Some(DocumentFormat::Presentation),
            _ => None,
        }
    }

    pub fn from_extension(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::WordDocument),
            "pptx" => Some(DocumentFormat::Presentation),
            _ => None,
        }
    }

    /// Inspect the content itself: `%PDF` magic or a zip package with a
    /// recognisable main part.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            return Some(DocumentFormat::Pdf);
        }
        if !bytes.starts_with(b"PK\x03\x04") {
            return None;
        }
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;
        if archive.index_for_name("word/document.xml").is_some() {
            return Some(DocumentFormat::WordDocument);
        }
        if archive.index_for_name("ppt/presentation.xml").is_some() {
            return Some(DocumentFormat::Presentation);
        }
        None
    }

    /// Resolve the format of an upload: declaration first, then extension,
    /// then content, the last two only for generic declarations.
    pub fn detect(media_type: &str, file_name: &str, bytes: &[u8]) -> Option<Self> {
        if let Some(format) = Self::from_media_type(media_type) {
            return Some(format);
        }
        if !is_generic_media_type(media_type) {
            return None;
        }
        Self::from_extension(file_name).or_else(|| Self::sniff(bytes))
    }

    pub fn media_type(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => PDF_MEDIA_TYPE,
            DocumentFormat::WordDocument => DOCX_MEDIA_TYPE,
            DocumentFormat::Presentation => PPTX_MEDIA_TYPE,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::WordDocument => "Word document",
            DocumentFormat::Presentation => "Presentation",
        };
        f.write_str(s)
    }
}

/// True for declarations that say nothing about the content.
pub fn is_generic_media_type(media_type: &str) -> bool {
    let t = media_type.trim();
    t.is_empty() || t.eq_ignore_ascii_case(GENERIC_MEDIA_TYPE)
}

/// Media type to declare for a file picked from disk.
pub fn guess_media_type(path: impl AsRef<Path>) -> &'static str {
    DocumentFormat::from_extension(path)
        .map(DocumentFormat::media_type)
        .unwrap_or(GENERIC_MEDIA_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn package_with(part: &str) -> Vec<u8> {
        let mut w = zip::ZipWriter::new(Cursor::new(Vec::new()));
        w.start_file(part, SimpleFileOptions::default()).unwrap();
        w.write_all(b"<x/>").unwrap();
        w.finish().unwrap().into_inner()
    }

    #[test]
    fn declared_types_map_directly() {
        assert_eq!(
            DocumentFormat::from_media_type("application/pdf"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_media_type(&DOCX_MEDIA_TYPE.to_uppercase()),
            Some(DocumentFormat::WordDocument)
        );
        assert_eq!(
            DocumentFormat::from_media_type("application/pdf; name=cv.pdf"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(DocumentFormat::from_media_type("text/plain"), None);
    }

    #[test]
    fn specific_unsupported_declaration_is_not_overridden() {
        assert_eq!(DocumentFormat::detect("text/plain", "cv.pdf", b"%PDF-1.7"), None);
    }

    #[test]
    fn generic_declaration_falls_back_to_extension_then_content() {
        assert_eq!(
            DocumentFormat::detect("", "deck.PPTX", b""),
            Some(DocumentFormat::Presentation)
        );
        assert_eq!(
            DocumentFormat::detect(GENERIC_MEDIA_TYPE, "upload", b"%PDF-1.4\n"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::detect("", "blob", &package_with("word/document.xml")),
            Some(DocumentFormat::WordDocument)
        );
        assert_eq!(
            DocumentFormat::detect("", "blob", &package_with("ppt/presentation.xml")),
            Some(DocumentFormat::Presentation)
        );
        assert_eq!(DocumentFormat::detect("", "notes.txt", b"hello"), None);
    }

    #[test]
    fn guess_media_type_from_path() {
        assert_eq!(guess_media_type("/tmp/cv.docx"), DOCX_MEDIA_TYPE);
        assert_eq!(guess_media_type("cv.txt"), GENERIC_MEDIA_TYPE);
    }
}
