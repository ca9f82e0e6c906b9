//! Reading source files into per-page documents

use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::debug;

use charter_core::{Document, Error, Result};

const PAGE_BREAK: char = '\x0C';

/// Largest source accepted by ingestion
pub const MAX_SOURCE_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Text,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => Ok(SourceKind::Pdf),
            "txt" | "md" | "markdown" => Ok(SourceKind::Text),
            other => Err(Error::Ingestion(format!(
                "unsupported source type '{}' for {} (expected .pdf, .txt or .md)",
                other,
                path.display()
            ))),
        }
    }
}

/// Raw bytes of a source document, read once so the fingerprint and the
/// extracted text come from the same snapshot
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub bytes: Vec<u8>,
}

impl SourceFile {
    pub async fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let kind = SourceKind::from_path(&path)?;

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Error::Ingestion(format!("cannot open {}: {}", path.display(), e)))?;
        if meta.len() > MAX_SOURCE_BYTES {
            return Err(Error::Ingestion(format!(
                "{} is {} bytes; the limit is {}",
                path.display(),
                meta.len(),
                MAX_SOURCE_BYTES
            )));
        }

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| Error::Ingestion(format!("cannot read {}: {}", path.display(), e)))?;

        Ok(Self { path, kind, bytes })
    }

    /// File name without extension, used when the text has no page breaks
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string())
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Extract the text and cut it into one document per page
    pub async fn documents(&self, title: &str) -> Result<Vec<Document>> {
        let documents = match self.kind {
            SourceKind::Text => {
                let text = String::from_utf8(self.bytes.clone()).map_err(|e| {
                    Error::Ingestion(format!("{} is not valid UTF-8: {}", self.path.display(), e))
                })?;
                split_pages(&text, &self.stem(), title, &self.file_name())
            }
            SourceKind::Pdf => {
                let bytes = self.bytes.clone();
                let pages = tokio::task::spawn_blocking(move || {
                    pdf_extract::extract_text_from_mem_by_pages(&bytes)
                        .map_err(|e| Error::Ingestion(format!("PDF extraction failed: {}", e)))
                })
                .await
                .map_err(|e| Error::Ingestion(format!("PDF extraction task failed: {}", e)))??;
                page_documents(pages.iter().map(String::as_str), title, &self.file_name())
            }
        };

        if documents.is_empty() {
            return Err(Error::Ingestion(format!(
                "{} contains no extractable text",
                self.path.display()
            )));
        }

        debug!(pages = documents.len(), source = %self.path.display(), "extracted documents");
        Ok(documents)
    }
}

/// One document per form-feed separated page (`Page-1`, `Page-2`, ...), or a
/// single document named `stem` when the text has no page breaks
pub fn split_pages(text: &str, stem: &str, title: &str, file: &str) -> Vec<Document> {
    if !text.contains(PAGE_BREAK) {
        if text.trim().is_empty() {
            return Vec::new();
        }
        return vec![Document {
            id: stem.to_string(),
            title: title.to_string(),
            content: text.to_string(),
            metadata: json!({"source": stem, "file": file}),
        }];
    }

    page_documents(text.split(PAGE_BREAK), title, file)
}

/// Number pages from 1. Blank pages are dropped but keep their number.
fn page_documents<'a>(
    pages: impl IntoIterator<Item = &'a str>,
    title: &str,
    file: &str,
) -> Vec<Document> {
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| {
            let id = format!("Page-{}", i + 1);
            Document {
                id: id.clone(),
                title: title.to_string(),
                content: page.to_string(),
                metadata: json!({"source": id, "page": i + 1, "file": file}),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_form_feed() {
        let docs = split_pages("first page\x0Csecond page", "c", "Constitution", "c.txt");
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "Page-1");
        assert_eq!(docs[1].id, "Page-2");
        assert_eq!(docs[1].content, "second page");
        assert_eq!(docs[1].metadata["page"], 2);
    }

    #[test]
    fn test_blank_pages_keep_numbering() {
        let docs = split_pages("one\x0C  \n\x0Cthree", "c", "t", "c.pdf");
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["Page-1", "Page-3"]);
    }

    #[test]
    fn test_no_page_breaks_uses_stem() {
        let docs = split_pages("whole text", "constitution", "t", "constitution.txt");
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "constitution");
        assert_eq!(docs[0].metadata["source"], "constitution");
    }

    #[test]
    fn test_whitespace_only_is_empty() {
        assert!(split_pages(" \n ", "c", "t", "c.txt").is_empty());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            SourceKind::from_path(Path::new("notes.docx")),
            Err(Error::Ingestion(_))
        ));
        assert_eq!(
            SourceKind::from_path(Path::new("C.PDF")).unwrap(),
            SourceKind::Pdf
        );
    }

    #[tokio::test]
    async fn test_read_text_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("constitution.txt");
        std::fs::write(&path, "Article 1\x0CArticle 2").unwrap();

        let source = SourceFile::read(&path).await.unwrap();
        let docs = source.documents("Constitution").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].title, "Constitution");
        assert_eq!(docs[0].metadata["file"], "constitution.txt");
    }

    #[tokio::test]
    async fn test_missing_file_is_ingestion_error() {
        let result = SourceFile::read("/definitely/not/here.txt").await;
        assert!(matches!(result, Err(Error::Ingestion(_))));
    }

    #[tokio::test]
    async fn test_empty_file_is_ingestion_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.md");
        std::fs::write(&path, "").unwrap();

        let source = SourceFile::read(&path).await.unwrap();
        assert!(matches!(
            source.documents("t").await,
            Err(Error::Ingestion(_))
        ));
    }

    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{Document as PdfDocument, Object, Stream, dictionary};

        let mut doc = PdfDocument::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let operations = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "MediaBox" => vec![Object::from(0), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_pdf_pages_become_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("constitution.pdf");
        std::fs::write(
            &path,
            pdf_with_pages(&["Article one text", "", "Article three text"]),
        )
        .unwrap();

        let source = SourceFile::read(&path).await.unwrap();
        let docs = source.documents("Constitution").await.unwrap();

        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["Page-1", "Page-3"]);
        assert!(docs[0].content.contains("Article one text"));
        assert!(!docs[0].content.contains("three"));
        assert!(docs[1].content.contains("Article three text"));
        assert_eq!(docs[1].metadata["source"], "Page-3");
        assert_eq!(docs[1].metadata["file"], "constitution.pdf");
    }
}
