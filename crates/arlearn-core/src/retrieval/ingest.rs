//! Passage ingestion
//!
//! Plain text is split into paragraphs on blank lines, whitespace is
//! collapsed, and each paragraph is packed sentence by sentence into chunks
//! of roughly `min_chars..=max_chars`, with a short tail of the previous chunk
//! prepended for continuity.
//!
//! PDFs are read page by page with `lopdf`; each passage remembers its page.

use std::path::Path;

use lopdf::{Dictionary, Document, Object};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::llm::Embedder;

use super::types::{Metadata, PassageRecord};

/// Metadata key holding a passage's position within its source
pub const CHUNK_INDEX_KEY: &str = "chunk_index";
pub const TITLE_KEY: &str = "title";
pub const SUBJECT_KEY: &str = "subject";
/// 1-based PDF page number
pub const PAGE_KEY: &str = "page";

const EMBED_BATCH_SIZE: usize = 64;

/// Chunk sizing, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkOptions {
    pub max_chars: usize,
    /// A chunk is only closed once it reaches this size
    pub min_chars: usize,
    /// Tail of the previous chunk carried into the next one
    pub overlap: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self {
            max_chars: 1200,
            min_chars: 600,
            overlap: 150,
        }
    }
}

/// One page of extracted text; plain text files are a single unnumbered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePage {
    pub number: Option<u32>,
    pub text: String,
}

/// A document ready for chunking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub title: String,
    pub subject: Option<String>,
    pub pages: Vec<SourcePage>,
}

impl SourceDocument {
    pub fn from_text(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subject: None,
            pages: vec![SourcePage {
                number: None,
                text: text.into(),
            }],
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Read `path` as a PDF when its extension says so, otherwise as UTF-8 text.
    ///
    /// The title defaults to the PDF's `/Title`, then to the file stem.
    pub fn load(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Untitled".to_string());

        let is_pdf = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if !is_pdf {
            let text = std::fs::read_to_string(path)?;
            return Ok(Self::from_text(stem, text));
        }

        let doc = Document::load(path).map_err(|e| {
            Error::InvalidInput(format!("Failed to read PDF {}: {}", path.display(), e))
        })?;

        let mut pages = Vec::new();
        for number in doc.get_pages().keys().copied() {
            match doc.extract_text(&[number]) {
                Ok(text) if !text.trim().is_empty() => pages.push(SourcePage {
                    number: Some(number),
                    text,
                }),
                Ok(_) => {}
                Err(e) => warn!(page = number, error = %e, "Skipping unreadable PDF page"),
            }
        }

        Ok(Self {
            title: pdf_title(&doc).unwrap_or(stem),
            subject: None,
            pages,
        })
    }
}

fn pdf_title(doc: &Document) -> Option<String> {
    let info = doc.trailer.get(b"Info").ok()?;
    let info: &Dictionary = match info.as_reference() {
        Ok(id) => doc.get_dictionary(id).ok()?,
        Err(_) => info.as_dict().ok()?,
    };
    let title = decode_pdf_string(info.get(b"Title").ok()?)?;
    let title = title.trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// PDF text strings are UTF-16BE with a BOM or single-byte otherwise
fn decode_pdf_string(object: &Object) -> Option<String> {
    let bytes = object.as_str().ok()?;
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            Some(
                char::decode_utf16(units)
                    .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                    .collect(),
            )
        }
        _ => Some(bytes.iter().map(|&b| char::from(b)).collect()),
    }
}

/// Split a document into cleaned, chunked passages
pub fn split_passages(document: &str, options: &ChunkOptions) -> Vec<String> {
    split_paragraphs(document)
        .iter()
        .flat_map(|paragraph| chunk_text(&clean(paragraph), options))
        .collect()
}

/// Paragraphs separated by one or more blank lines
pub fn split_paragraphs(document: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in document.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n"));
    }

    paragraphs
}

/// Collapse all whitespace runs to single spaces
pub fn clean(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sentences ending in `.`, `!` or `?` followed by whitespace
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_idx, next)) = chars.peek() {
            if next.is_whitespace() {
                let sentence = text[start..idx + c.len_utf8()].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = next_idx;
            }
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Pack sentences into chunks, then prepend each chunk with the previous
/// chunk's last `overlap` characters.
pub fn chunk_text(text: &str, options: &ChunkOptions) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        let fits =
            current.chars().count() + sentence.chars().count() + 1 <= options.max_chars;
        if !fits && !current.is_empty() && current.chars().count() >= options.min_chars {
            chunks.push(std::mem::take(&mut current));
            current.push_str(sentence);
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    if options.overlap == 0 || chunks.len() < 2 {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    overlapped.push(chunks[0].clone());
    for pair in chunks.windows(2) {
        let tail = last_chars(&pair[0], options.overlap);
        overlapped.push(format!("{} {}", tail, pair[1]).trim().to_string());
    }
    overlapped
}

fn last_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    match text.char_indices().nth(count - n) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Embed `chunks` in batches and wrap them as records sharing `metadata`.
///
/// Each record gets a fresh UUID and its position under [`CHUNK_INDEX_KEY`].
pub async fn embed_passages(
    embedder: &dyn Embedder,
    chunks: Vec<String>,
    metadata: &Metadata,
) -> Result<Vec<PassageRecord>> {
    let mut records = Vec::with_capacity(chunks.len());

    for batch in chunks.chunks(EMBED_BATCH_SIZE) {
        let vectors = embedder.embed_batch(batch).await?;
        if vectors.len() != batch.len() {
            return Err(Error::EmbeddingFailed(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                vectors.len()
            )));
        }

        for (text, embedding) in batch.iter().zip(vectors) {
            let mut record = PassageRecord::new(Uuid::new_v4().to_string(), text.clone(), embedding);
            record.metadata = metadata.clone();
            record
                .metadata
                .insert(CHUNK_INDEX_KEY.to_string(), records.len().to_string());
            records.push(record);
        }
    }

    debug!(passages = records.len(), "Embedded passages");
    Ok(records)
}

/// Chunk and embed every page of `document`.
///
/// Records carry `metadata` plus the document title, its subject and, for
/// PDFs, the page number; `chunk_index` counts within a page.
pub async fn embed_document(
    embedder: &dyn Embedder,
    document: &SourceDocument,
    options: &ChunkOptions,
    metadata: &Metadata,
) -> Result<Vec<PassageRecord>> {
    let mut base = metadata.clone();
    base.insert(TITLE_KEY.to_string(), document.title.clone());
    if let Some(subject) = &document.subject {
        base.insert(SUBJECT_KEY.to_string(), subject.clone());
    }

    let mut records = Vec::new();
    for page in &document.pages {
        let chunks = split_passages(&page.text, options);
        if chunks.is_empty() {
            continue;
        }
        let mut page_metadata = base.clone();
        if let Some(number) = page.number {
            page_metadata.insert(PAGE_KEY.to_string(), number.to_string());
        }
        records.extend(embed_passages(embedder, chunks, &page_metadata).await?);
    }

    debug!(title = %document.title, passages = records.len(), "Embedded document");
    Ok(records)
}
