//! Read plain-text, Markdown, and PDF documents from disk.

use super::types::DocumentSource;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];
const PDF_EXTENSION: &str = "pdf";

/// Errors raised while loading documents.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The file or directory could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// The file extension is not one of the supported document types.
    #[error("Unsupported document type: {0}")]
    UnsupportedFileType(PathBuf),
    /// A text document is not valid UTF-8.
    #[error("Document {path} is not valid UTF-8: {source}")]
    InvalidUtf8 {
        /// Offending path.
        path: PathBuf,
        /// Decoding failure.
        #[source]
        source: std::string::FromUtf8Error,
    },
    /// Text could not be extracted from a PDF.
    #[error("Failed to extract text from PDF {path}: {message}")]
    Pdf {
        /// Offending path.
        path: PathBuf,
        /// Extraction failure.
        message: String,
    },
    /// The document holds no text.
    #[error("Document contains no text: {0}")]
    Empty(PathBuf),
}

/// Text read from a document plus provenance derived from its path.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    /// Location the text was read from.
    pub path: PathBuf,
    /// Extracted text.
    pub text: String,
    /// Provenance: file name as source id, file stem as title.
    pub source: DocumentSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Text,
    Pdf,
}

fn document_kind(path: &Path) -> Option<DocumentKind> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    if TEXT_EXTENSIONS.contains(&extension.as_str()) {
        Some(DocumentKind::Text)
    } else if extension == PDF_EXTENSION {
        Some(DocumentKind::Pdf)
    } else {
        None
    }
}

/// List the supported documents under `path` in a stable order.
///
/// A file path yields itself; a directory is walked recursively and unsupported files are
/// skipped.
pub fn discover(path: &Path) -> Result<Vec<PathBuf>, LoaderError> {
    let metadata = std::fs::metadata(path).map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if metadata.is_file() {
        return match document_kind(path) {
            Some(_) => Ok(vec![path.to_path_buf()]),
            None => Err(LoaderError::UnsupportedFileType(path.to_path_buf())),
        };
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|error| LoaderError::Io {
            path: error
                .path()
                .map_or_else(|| path.to_path_buf(), Path::to_path_buf),
            source: error.into(),
        })?;
        if entry.file_type().is_file() && document_kind(entry.path()).is_some() {
            files.push(entry.into_path());
        } else if entry.file_type().is_file() {
            tracing::debug!(path = %entry.path().display(), "Skipping unsupported file");
        }
    }
    Ok(files)
}

/// Read the text of a single document.
pub async fn load_document(path: &Path) -> Result<LoadedDocument, LoaderError> {
    let kind = document_kind(path).ok_or_else(|| LoaderError::UnsupportedFileType(path.to_path_buf()))?;
    let bytes = tokio::fs::read(path).await.map_err(|source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let text = match kind {
        DocumentKind::Text => String::from_utf8(bytes).map_err(|source| LoaderError::InvalidUtf8 {
            path: path.to_path_buf(),
            source,
        })?,
        DocumentKind::Pdf => {
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                .await
                .map_err(|error| LoaderError::Pdf {
                    path: owned.clone(),
                    message: error.to_string(),
                })?
                .map_err(|error| LoaderError::Pdf {
                    path: owned,
                    message: error.to_string(),
                })?
        }
    };

    if text.trim().is_empty() {
        return Err(LoaderError::Empty(path.to_path_buf()));
    }

    tracing::debug!(
        path = %path.display(),
        kind = ?kind,
        chars = text.chars().count(),
        "Loaded document"
    );

    Ok(LoadedDocument {
        path: path.to_path_buf(),
        text,
        source: DocumentSource {
            source_id: path.file_name().map(|name| name.to_string_lossy().into_owned()),
            title: path.file_stem().map(|stem| stem.to_string_lossy().into_owned()),
            url: None,
            published_at: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn loads_text_with_path_provenance() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("alpha-notes.md");
        fs::write(&path, "# Alpha\nAlpha methods are fast.").expect("write");

        let document = load_document(&path).await.expect("document");
        assert_eq!(document.text, "# Alpha\nAlpha methods are fast.");
        assert_eq!(document.source.source_id.as_deref(), Some("alpha-notes.md"));
        assert_eq!(document.source.title.as_deref(), Some("alpha-notes"));
    }

    #[tokio::test]
    async fn rejects_unsupported_and_empty_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let binary = dir.path().join("image.png");
        fs::write(&binary, [0u8, 1, 2]).expect("write");
        assert!(matches!(
            load_document(&binary).await,
            Err(LoaderError::UnsupportedFileType(_))
        ));

        let blank = dir.path().join("blank.txt");
        fs::write(&blank, "  \n ").expect("write");
        assert!(matches!(load_document(&blank).await, Err(LoaderError::Empty(_))));
    }

    #[tokio::test]
    async fn invalid_utf8_text_is_rejected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("latin1.txt");
        fs::write(&path, [b'c', b'a', b'f', 0xe9]).expect("write");
        assert!(matches!(
            load_document(&path).await,
            Err(LoaderError::InvalidUtf8 { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_pdf_is_reported() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"this is not a pdf").expect("write");
        assert!(matches!(load_document(&path).await, Err(LoaderError::Pdf { .. })));
    }

    #[test]
    fn discover_walks_directories_in_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        fs::write(dir.path().join("b.txt"), "b").expect("write");
        fs::write(dir.path().join("a.md"), "a").expect("write");
        fs::write(dir.path().join("skip.json"), "{}").expect("write");
        fs::write(dir.path().join("nested").join("c.PDF"), "c").expect("write");

        let files = discover(dir.path()).expect("files");
        let names: Vec<String> = files
            .iter()
            .map(|path| {
                path.strip_prefix(dir.path())
                    .expect("relative")
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(
            names,
            vec![
                "a.md".to_string(),
                "b.txt".to_string(),
                format!("nested{}c.PDF", std::path::MAIN_SEPARATOR)
            ]
        );

        assert!(matches!(
            discover(&dir.path().join("skip.json")),
            Err(LoaderError::UnsupportedFileType(_))
        ));
        assert!(matches!(
            discover(&dir.path().join("missing")),
            Err(LoaderError::Io { .. })
        ));
    }
}
