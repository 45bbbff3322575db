use crate::error::{ChatDocsError, Result};
use crate::types::{Document, DocumentId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
    Txt,
    Markdown,
}

impl DocumentKind {
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Ok(DocumentKind::Pdf),
            "docx" => Ok(DocumentKind::Docx),
            "txt" | "text" => Ok(DocumentKind::Txt),
            "md" | "markdown" => Ok(DocumentKind::Markdown),
            other => Err(ChatDocsError::UnsupportedFormat(format!(
                "unrecognized file extension '{}'",
                other
            ))),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => Self::from_extension(ext),
            None => Err(ChatDocsError::UnsupportedFormat(format!(
                "{} has no file extension",
                path.display()
            ))),
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Pdf => write!(f, "pdf"),
            DocumentKind::Docx => write!(f, "docx"),
            DocumentKind::Txt => write!(f, "txt"),
            DocumentKind::Markdown => write!(f, "markdown"),
        }
    }
}

/// Turns raw file bytes into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8], kind: DocumentKind) -> Result<String>;

    fn name(&self) -> &str;
}

/// Reads UTF-8 text and markdown. Binary formats need a dedicated extractor.
#[derive(Debug, Default, Clone)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract_text(&self, bytes: &[u8], kind: DocumentKind) -> Result<String> {
        match kind {
            DocumentKind::Txt | DocumentKind::Markdown => {
                let text = std::str::from_utf8(bytes).map_err(|e| ChatDocsError::Extraction {
                    document: kind.to_string(),
                    message: format!("invalid UTF-8 at byte {}", e.valid_up_to()),
                })?;
                Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
            }
            DocumentKind::Pdf | DocumentKind::Docx => Err(ChatDocsError::UnsupportedFormat(
                format!("no {} reader is available", kind),
            )),
        }
    }

    fn name(&self) -> &str {
        "plain-text"
    }
}

/// One file handed to extraction.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub kind: Option<DocumentKind>,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    /// Kind is derived from the name's extension.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let kind = DocumentKind::from_path(Path::new(&name)).ok();
        Self { name, kind, bytes }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self::new(path.display().to_string(), bytes))
    }
}

#[derive(Debug, Clone)]
pub struct SkippedDocument {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedDocument>,
}

/// Extract every file, isolating per-file failures. Files without any
/// non-whitespace text are skipped too.
pub fn extract_documents(extractor: &dyn TextExtractor, files: &[SourceFile]) -> ExtractionOutcome {
    let mut outcome = ExtractionOutcome::default();

    for file in files {
        let result = file
            .kind
            .ok_or_else(|| {
                ChatDocsError::UnsupportedFormat(format!("cannot determine the type of {}", file.name))
            })
            .and_then(|kind| extractor.extract_text(&file.bytes, kind));

        match result {
            Ok(text) if text.trim().is_empty() => {
                warn!("Skipping {}: no text content", file.name);
                outcome.skipped.push(SkippedDocument {
                    name: file.name.clone(),
                    reason: "no text content".to_string(),
                });
            }
            Ok(text) => {
                debug!("Extracted {} chars from {}", text.chars().count(), file.name);
                outcome.documents.push(Document {
                    id: DocumentId(file.name.clone()),
                    text,
                });
            }
            Err(err) => {
                let err = match err {
                    ChatDocsError::Extraction { message, .. } => ChatDocsError::Extraction {
                        document: file.name.clone(),
                        message,
                    },
                    other => other,
                };
                warn!("Skipping {}: {}", file.name, err);
                outcome.skipped.push(SkippedDocument {
                    name: file.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }

    outcome
}

/// Read and extract files from disk. A path that cannot be read is skipped
/// and reported like any other per-file failure.
pub fn extract_paths<P: AsRef<Path>>(
    extractor: &dyn TextExtractor,
    paths: &[P],
) -> ExtractionOutcome {
    let mut sources = Vec::with_capacity(paths.len());
    let mut unreadable = Vec::new();
    for path in paths {
        let path = path.as_ref();
        match SourceFile::read(path) {
            Ok(file) => sources.push(file),
            Err(err) => {
                warn!("Skipping {}: {}", path.display(), err);
                unreadable.push(SkippedDocument {
                    name: path.display().to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    let mut outcome = extract_documents(extractor, &sources);
    unreadable.append(&mut outcome.skipped);
    outcome.skipped = unreadable;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_extension_is_case_insensitive() {
        assert_eq!(DocumentKind::from_extension("PDF").unwrap(), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_extension(".Md").unwrap(), DocumentKind::Markdown);
        assert!(matches!(
            DocumentKind::from_extension("exe"),
            Err(ChatDocsError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn plain_text_rejects_invalid_utf8() {
        let err = PlainTextExtractor
            .extract_text(&[0x66, 0xff, 0x6f], DocumentKind::Txt)
            .unwrap_err();
        assert!(matches!(err, ChatDocsError::Extraction { .. }));
    }

    #[test]
    fn failures_are_isolated_per_file() {
        let files = vec![
            SourceFile::new("notes.txt", b"Paris is the capital of France.".to_vec()),
            SourceFile::new("scan.pdf", vec![0x25, 0x50, 0x44, 0x46]),
            SourceFile::new("blank.md", b"   \n".to_vec()),
            SourceFile::new("binary.txt", vec![0xff, 0xfe, 0x00]),
            SourceFile::new("archive.zip", vec![1, 2, 3]),
        ];

        let outcome = extract_documents(&PlainTextExtractor, &files);

        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.documents[0].id.as_str(), "notes.txt");
        let skipped: Vec<_> = outcome.skipped.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(skipped, vec!["scan.pdf", "blank.md", "binary.txt", "archive.zip"]);
        assert!(outcome.skipped[2].reason.contains("binary.txt"));
    }

    #[test]
    fn unreadable_paths_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("notes.md");
        std::fs::write(&good, "# Notes\nParis is the capital of France.").unwrap();
        let missing = dir.path().join("missing.txt");

        let outcome = extract_paths(&PlainTextExtractor, &[missing.clone(), good.clone()]);

        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.documents[0].id.as_str(), good.display().to_string());
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].name, missing.display().to_string());
    }
}
