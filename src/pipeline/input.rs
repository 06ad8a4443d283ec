//! Input discovery: find supported invoice files and read them.
//!
//! Format detection is extension-based and case-insensitive — `invoice.PDF`
//! and `scan.JPG` are routine in folders synced from scanners and phones.
//! Content sniffing is deliberately left to the decoder in the normalize
//! stage: a mislabelled file surfaces there as `DocumentCorrupt` with the
//! decoder's own diagnosis, which beats guessing from magic bytes here.

use crate::error::{DocumentError, ExtractError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supported input formats, detected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl DocumentFormat {
    /// Extensions matched during folder discovery (lowercase).
    pub const EXTENSIONS: [&'static str; 6] = ["pdf", "png", "jpg", "jpeg", "gif", "webp"];

    /// Detect the format from a path's extension, case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "png" => Some(DocumentFormat::Png),
            "jpg" | "jpeg" => Some(DocumentFormat::Jpeg),
            "gif" => Some(DocumentFormat::Gif),
            "webp" => Some(DocumentFormat::Webp),
            _ => None,
        }
    }

    /// Media type of the normalized still image for this input.
    ///
    /// PDFs are rasterised to PNG, so they report `image/png`; raster
    /// inputs keep their own type. PNG is the default wherever the
    /// representation is ambiguous.
    pub fn normalized_media_type(self) -> &'static str {
        match self {
            DocumentFormat::Pdf | DocumentFormat::Png => "image/png",
            DocumentFormat::Jpeg => "image/jpeg",
            DocumentFormat::Gif => "image/gif",
            DocumentFormat::Webp => "image/webp",
        }
    }

    pub fn is_pdf(self) -> bool {
        matches!(self, DocumentFormat::Pdf)
    }
}

/// One invoice file, read into memory. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub format: DocumentFormat,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    /// Read a file, detecting its format from the extension.
    pub fn read(path: &Path) -> Result<Self, DocumentError> {
        let format =
            DocumentFormat::from_path(path).ok_or_else(|| DocumentError::UnsupportedFormat {
                file: file_label(path),
                extension: path
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            })?;

        let bytes = std::fs::read(path).map_err(|e| DocumentError::Io {
            file: file_label(path),
            detail: e.to_string(),
        })?;

        debug!("Read {} ({} bytes, {:?})", path.display(), bytes.len(), format);

        Ok(Self {
            path: path.to_path_buf(),
            format,
            bytes,
        })
    }
}

/// Scan a folder (non-recursively) for supported invoice files.
///
/// Results are sorted by path so a batch always processes — and reports —
/// in a stable order regardless of directory-entry ordering.
pub fn discover_documents(folder: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let meta = std::fs::metadata(folder).map_err(|_| ExtractError::FolderNotFound {
        path: folder.to_path_buf(),
    })?;
    if !meta.is_dir() {
        return Err(ExtractError::FolderNotFound {
            path: folder.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(folder).map_err(|e| ExtractError::Internal(format!(
        "Failed to list '{}': {e}",
        folder.display()
    )))?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && DocumentFormat::from_path(p).is_some())
        .collect();
    files.sort();

    debug!("Discovered {} invoice file(s) in {}", files.len(), folder.display());
    Ok(files)
}

/// File name (not full path) for error and log context.
pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_detection_is_case_insensitive() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("invoice.PDF")),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("scan.JPG")),
            Some(DocumentFormat::Jpeg)
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("x.WebP")),
            Some(DocumentFormat::Webp)
        );
        assert_eq!(DocumentFormat::from_path(Path::new("notes.txt")), None);
        assert_eq!(DocumentFormat::from_path(Path::new("no_extension")), None);
    }

    #[test]
    fn media_types_follow_normalized_representation() {
        assert_eq!(DocumentFormat::Pdf.normalized_media_type(), "image/png");
        assert_eq!(DocumentFormat::Jpeg.normalized_media_type(), "image/jpeg");
        assert_eq!(DocumentFormat::Png.normalized_media_type(), "image/png");
        assert_eq!(DocumentFormat::Gif.normalized_media_type(), "image/gif");
        assert_eq!(DocumentFormat::Webp.normalized_media_type(), "image/webp");
    }

    #[test]
    fn read_unsupported_extension_fails_typed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.bmp");
        std::fs::write(&path, b"not an invoice").unwrap();

        let err = SourceDocument::read(&path).unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat { .. }));
    }

    #[test]
    fn read_missing_file_is_io_error() {
        let err = SourceDocument::read(Path::new("/no/such/invoice.pdf")).unwrap_err();
        assert!(matches!(err, DocumentError::Io { .. }));
    }

    #[test]
    fn discovery_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PNG", "skip.txt", "c.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.pdf")).unwrap(); // dir, not file

        let found = discover_documents(dir.path()).unwrap();
        let names: Vec<String> = found.iter().map(|p| file_label(p)).collect();
        assert_eq!(names, vec!["a.PNG", "b.pdf", "c.jpeg"]);
    }

    #[test]
    fn discovery_of_missing_folder_fails() {
        let err = discover_documents(Path::new("/no/such/folder")).unwrap_err();
        assert!(matches!(err, ExtractError::FolderNotFound { .. }));
    }
}
