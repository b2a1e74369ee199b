//! Chunk emission.
//!
//! Every parsed source file becomes one `code_file` chunk and every
//! non-empty documentation paragraph one `doc_paragraph` chunk. Each chunk
//! is recorded in the index whether or not embedding succeeds.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::EmbedError;
use crate::parser::EngineTag;
use crate::report::AnalysisStats;

mod embed;

pub use embed::{DisabledEmbedder, Embedder, HttpEmbedder, HttpVectorStore, VectorStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    CodeFile,
    DocParagraph,
}

/// One entry of the chunk index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkSummary {
    pub file_path: String,
    pub kind: ChunkKind,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub engine: Option<EngineTag>,
    pub embedded: bool,
}

/// Metadata persisted alongside a vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkMetadata {
    pub file_path: String,
    pub kind: ChunkKind,
    pub start: Option<usize>,
    pub end: Option<usize>,
    pub engine: Option<EngineTag>,
}

/// A chunk about to be indexed.
#[derive(Debug, Clone)]
pub struct ChunkDraft<'a> {
    pub file_path: &'a str,
    pub kind: ChunkKind,
    pub text: &'a str,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub engine: Option<EngineTag>,
}

impl<'a> ChunkDraft<'a> {
    /// Whole-file chunk spanning lines `1..=line_count`.
    pub fn code_file(file_path: &'a str, text: &'a str, line_count: usize, engine: EngineTag) -> Self {
        Self {
            file_path,
            kind: ChunkKind::CodeFile,
            text,
            start_line: Some(1),
            end_line: Some(line_count),
            engine: Some(engine),
        }
    }

    pub fn doc_paragraph(file_path: &'a str, text: &'a str) -> Self {
        Self {
            file_path,
            kind: ChunkKind::DocParagraph,
            text,
            start_line: None,
            end_line: None,
            engine: None,
        }
    }
}

/// Builds the chunk index for one analysis.
pub struct ChunkIndexer {
    embedder: Arc<dyn Embedder>,
    store: Option<Arc<dyn VectorStore>>,
    embed_timeout: Duration,
    chunks: Vec<ChunkSummary>,
}

impl ChunkIndexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Option<Arc<dyn VectorStore>>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            store,
            embed_timeout,
            chunks: Vec::new(),
        }
    }

    pub fn vector_store_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Embed, optionally persist, and record one chunk. Never fails.
    pub async fn add_chunk(&mut self, stats: &mut AnalysisStats, draft: ChunkDraft<'_>) {
        let embedded = match self.embed(draft.text).await {
            Ok(vector) => {
                stats.record_embedding(draft.kind);
                if let Some(store) = &self.store {
                    let metadata = ChunkMetadata {
                        file_path: draft.file_path.to_string(),
                        kind: draft.kind,
                        start: draft.start_line,
                        end: draft.end_line,
                        engine: draft.engine,
                    };
                    if let Err(e) = store.store(draft.text, &metadata, &vector).await {
                        warn!(file = draft.file_path, error = %e, "failed to persist embedding");
                    }
                }
                true
            }
            Err(EmbedError::Disabled) => false,
            Err(e) => {
                debug!(file = draft.file_path, error = %e, "embedding failed");
                false
            }
        };

        self.chunks.push(ChunkSummary {
            file_path: draft.file_path.to_string(),
            kind: draft.kind,
            start_line: draft.start_line,
            end_line: draft.end_line,
            engine: draft.engine,
            embedded,
        });
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        match tokio::time::timeout(self.embed_timeout, self.embedder.embed(text)).await {
            Ok(Ok(vector)) if vector.is_empty() => {
                Err(EmbedError::BadResponse("empty embedding".to_string()))
            }
            Ok(result) => result,
            Err(_) => Err(EmbedError::Timeout(self.embed_timeout.as_secs())),
        }
    }

    pub fn chunks(&self) -> &[ChunkSummary] {
        &self.chunks
    }

    pub fn into_chunks(self) -> Vec<ChunkSummary> {
        self.chunks
    }
}

/// Whether a file (by name) is documentation to be split into paragraphs.
pub fn is_doc_file(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    lower.starts_with("readme") || lower.ends_with(".md") || lower.ends_with(".markdown")
}

/// Split text into trimmed, non-empty paragraphs separated by blank
/// (whitespace-only) lines.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut paragraphs);

    paragraphs
}

fn flush_paragraph(current: &mut Vec<&str>, paragraphs: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let paragraph = current.join("\n").trim().to_string();
    current.clear();
    if !paragraph.is_empty() {
        paragraphs.push(paragraph);
    }
}
