//! Corpus loading: files on disk to normalized documents

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::{Document, FileKind, PAGE_KEY};

/// Seconds allowed for whole-document PDF extraction before giving up
const PDF_EXTRACT_TIMEOUT_SECS: u64 = 60;

/// Ligature and typographic glyphs mapped to plain text
const GLYPH_REPLACEMENTS: &[(char, &str)] = &[
    ('\u{2010}', "-"),
    ('\u{2011}', "-"),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201C}', "\""),
    ('\u{201D}', "\""),
    ('\u{2022}', "* "),
    ('\u{2026}', "..."),
    ('\u{00A0}', " "),
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
];

/// Clean up PDF text: normalize glyphs, drop NULs and blank lines
fn cleanup_pdf_text(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\0' {
            continue;
        }
        match GLYPH_REPLACEMENTS.iter().find(|(glyph, _)| *glyph == c) {
            Some((_, replacement)) => result.push_str(replacement),
            None => result.push(c),
        }
    }

    result
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A corpus file that was not loaded
#[derive(Debug, Clone)]
pub struct SkippedFile {
    /// Path of the skipped file
    pub path: PathBuf,
    /// Why it was skipped
    pub reason: String,
}

/// Outcome of scanning a corpus folder
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Documents in file-name order (PDF pages in page order)
    pub documents: Vec<Document>,
    /// Number of files that produced documents
    pub files_loaded: usize,
    /// Files skipped with a diagnostic
    pub skipped: Vec<SkippedFile>,
}

/// Multi-format document loader
pub struct DocumentLoader;

impl DocumentLoader {
    /// Load every supported file in `dir`
    ///
    /// Unsupported or unreadable files are skipped with a warning. A missing
    /// corpus folder, or an error that is not scoped to one file, is returned.
    pub fn load_directory(dir: &Path, recursive: bool) -> Result<LoadReport> {
        if !dir.is_dir() {
            return Err(Error::config(format!(
                "Corpus folder '{}' does not exist or is not a directory",
                dir.display()
            )));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut report = LoadReport::default();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e.file_name()))
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable corpus entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            match Self::load_file(path) {
                Ok(documents) => {
                    tracing::debug!(
                        file = %path.display(),
                        documents = documents.len(),
                        "Loaded file"
                    );
                    report.files_loaded += 1;
                    report.documents.extend(documents);
                }
                Err(e) if e.is_file_scoped() => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    report.skipped.push(SkippedFile {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Load a single file based on its extension
    pub fn load_file(path: &Path) -> Result<Vec<Document>> {
        let kind = FileKind::from_path(path);
        if let FileKind::Unsupported(ext) = &kind {
            let ext = if ext.is_empty() { "<none>" } else { ext.as_str() };
            return Err(Error::UnsupportedFormat(format!(
                "{} (extension: {})",
                path.display(),
                ext
            )));
        }

        let data = std::fs::read(path)?;
        let source = path.display().to_string();
        Self::parse(&kind, &source, &data)
    }

    /// Parse raw bytes of a known kind
    pub fn parse(kind: &FileKind, source: &str, data: &[u8]) -> Result<Vec<Document>> {
        match kind {
            FileKind::Pdf => Self::parse_pdf(source, data),
            FileKind::Docx => Self::parse_docx(source, data).map(|doc| vec![doc]),
            FileKind::PlainText | FileKind::Markdown => {
                Self::parse_text(source, data).map(|doc| vec![doc])
            }
            FileKind::Unsupported(ext) => Err(Error::UnsupportedFormat(ext.clone())),
        }
    }

    /// Parse plain text or markdown
    fn parse_text(source: &str, data: &[u8]) -> Result<Document> {
        let content = std::str::from_utf8(data)
            .map_err(|e| Error::file_parse(source, format!("Invalid UTF-8: {}", e)))?;
        Ok(Document::new(content, source))
    }

    /// Parse DOCX document: non-empty paragraphs joined by newlines
    fn parse_docx(source: &str, data: &[u8]) -> Result<Document> {
        let doc = docx_rs::read_docx(data).map_err(|e| Error::file_parse(source, e.to_string()))?;

        let mut paragraphs = Vec::new();
        for child in doc.document.children {
            if let docx_rs::DocumentChild::Paragraph(p) = child {
                let mut text = String::new();
                for child in p.children {
                    if let docx_rs::ParagraphChild::Run(run) = child {
                        for child in run.children {
                            if let docx_rs::RunChild::Text(t) = child {
                                text.push_str(&t.text);
                            }
                        }
                    }
                }
                if !text.trim().is_empty() {
                    paragraphs.push(text);
                }
            }
        }

        Ok(Document::new(paragraphs.join("\n"), source))
    }

    /// Parse PDF document into one Document per page
    fn parse_pdf(source: &str, data: &[u8]) -> Result<Vec<Document>> {
        let pages = match Self::extract_pdf_pages(source, data) {
            Ok(pages) if pages.iter().any(|p| !p.is_empty()) => pages,
            Ok(_) => {
                tracing::warn!("{}: per-page extraction found no text, trying fallback", source);
                Self::extract_pdf_with_timeout(source, data)?
            }
            Err(e) => {
                tracing::warn!("{}: per-page extraction failed ({}), trying fallback", source, e);
                Self::extract_pdf_with_timeout(source, data)?
            }
        };

        let documents: Vec<Document> = pages
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.is_empty())
            .map(|(index, text)| {
                Document::new(text, source).with_metadata(PAGE_KEY, index.to_string())
            })
            .collect();

        if documents.is_empty() {
            return Err(Error::file_parse(
                source,
                "PDF appears to be image-based or has no extractable text",
            ));
        }

        Ok(documents)
    }

    /// Extract cleaned text for every page, in page order
    fn extract_pdf_pages(source: &str, data: &[u8]) -> Result<Vec<String>> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::file_parse(source, format!("Failed to load PDF: {}", e)))?;

        let mut pages = Vec::new();
        for page_num in doc.get_pages().keys() {
            match doc.extract_text(&[*page_num]) {
                Ok(text) => pages.push(cleanup_pdf_text(&text)),
                Err(e) => {
                    tracing::debug!("Could not extract text for page {}: {}", page_num, e);
                    pages.push(String::new());
                }
            }
        }

        Ok(pages)
    }

    /// Whole-document extraction with a timeout, split on form feeds
    ///
    /// pdf-extract can hang on fonts it does not understand, so it runs on a
    /// helper thread.
    fn extract_pdf_with_timeout(source: &str, data: &[u8]) -> Result<Vec<String>> {
        use std::sync::mpsc;
        use std::thread;
        use std::time::Duration;

        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem(&data_vec);
            let _ = tx.send(result);
        });

        let text = match rx.recv_timeout(Duration::from_secs(PDF_EXTRACT_TIMEOUT_SECS)) {
            Ok(Ok(text)) => {
                let _ = handle.join();
                text
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(Error::file_parse(source, e.to_string()));
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                return Err(Error::file_parse(
                    source,
                    format!("PDF extraction timed out after {}s", PDF_EXTRACT_TIMEOUT_SECS),
                ));
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(Error::file_parse(source, "PDF extraction thread crashed"));
            }
        };

        Ok(text.split('\u{000C}').map(cleanup_pdf_text).collect())
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}
