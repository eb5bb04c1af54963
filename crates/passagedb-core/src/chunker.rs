//! Sentence-window chunking.
//!
//! Text is split at `.`/`!`/`?` followed by whitespace; sentences are packed
//! greedily into windows of at most `chunk_size` characters. Each new window
//! is seeded with a sentence-aligned suffix of the previous one that fits in
//! `chunk_overlap` characters. A sentence longer than `chunk_size` is never
//! cut; it becomes an oversized chunk of its own.
//!
//! Chunk text is always an exact substring of the source, so offsets can be
//! used to map a hit back into the document.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Chunk, Document, DocumentSection, Meta};

/// Rough characters-per-token ratio used for every size estimate.
pub const CHARS_PER_TOKEN: usize = 4;
const SECTION_TITLE_MAX_CHARS: usize = 100;

static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("sentence boundary regex"));

static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?:\d+\.?[ \t]+)?(?:abstract|introduction|related work|background|method|results|discussion|conclusion|references)",
    )
    .expect("section header regex")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size_tokens: usize,
    pub chunk_overlap_tokens: usize,
    /// Minimum chunk length in characters.
    pub min_chunk_length: usize,
    pub by_sections: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size_tokens: 512, chunk_overlap_tokens: 50, min_chunk_length: 100, by_sections: false }
    }
}

impl ChunkingConfig {
    /// Window size in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size_tokens * CHARS_PER_TOKEN
    }

    /// Overlap budget in characters.
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap_tokens * CHARS_PER_TOKEN
    }
}

#[derive(Debug, Clone, Copy)]
struct Sentence {
    start: usize,
    end: usize,
    char_start: usize,
    char_end: usize,
}

#[derive(Debug)]
struct Window<'a> {
    text: &'a str,
    char_start: usize,
    char_end: usize,
}

#[derive(Debug)]
struct SectionBound<'a> {
    start: usize,
    end: usize,
    title: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        if config.chunk_size() == 0 {
            return Err(Error::InvalidConfig("chunk_size_tokens must be positive".into()));
        }
        if config.chunk_overlap() >= config.chunk_size() {
            return Err(Error::InvalidConfig(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                config.chunk_overlap(),
                config.chunk_size()
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Sliding-window chunking. Ids are `{doc_id}_chunk_{i}`.
    pub fn chunk(&self, doc_id: &str, text: &str, metadata: &Meta) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for window in self.windows(text) {
            let chunk_id = format!("{doc_id}_chunk_{}", chunks.len());
            let chunk = self.make_chunk(chunk_id, doc_id, &window, 0, metadata.clone());
            self.keep(chunk, &mut chunks);
        }
        chunks
    }

    /// Section-aware chunking using detected academic section headers.
    pub fn chunk_by_sections(&self, doc_id: &str, text: &str, metadata: &Meta) -> Vec<Chunk> {
        self.chunk_sections(doc_id, text, metadata, &[])
    }

    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        let metadata = doc.chunk_metadata();
        if self.config.by_sections {
            self.chunk_sections(&doc.doc_id, &doc.body, &metadata, &doc.sections)
        } else {
            self.chunk(&doc.doc_id, &doc.body, &metadata)
        }
    }

    pub fn chunk_batch(&self, docs: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = docs.iter().flat_map(|d| self.chunk_document(d)).collect();
        info!(documents = docs.len(), chunks = chunks.len(), "chunked batch");
        chunks
    }

    fn chunk_sections(&self, doc_id: &str, text: &str, metadata: &Meta, provided: &[DocumentSection]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for (idx, bound) in section_bounds(text, provided).into_iter().enumerate() {
            let raw = &text[bound.start..bound.end];
            let lead = raw.len() - raw.trim_start().len();
            let section = raw.trim();
            let len = section.chars().count();
            if len < self.config.min_chunk_length {
                debug!(doc_id, section = idx, len, "skipping short section");
                continue;
            }
            let base = text[..bound.start + lead].chars().count();
            let title: String = match bound.title {
                Some(title) => title.chars().take(SECTION_TITLE_MAX_CHARS).collect(),
                None => section.lines().next().unwrap_or_default().trim().chars().take(SECTION_TITLE_MAX_CHARS).collect(),
            };
            let mut meta = metadata.clone();
            meta.insert("section".to_string(), title);

            if len > self.config.chunk_size() {
                let mut emitted = 0;
                for window in self.windows(section) {
                    let chunk_id = format!("{doc_id}_sec{idx}_chunk_{emitted}");
                    let chunk = self.make_chunk(chunk_id, doc_id, &window, base, meta.clone());
                    if self.keep(chunk, &mut chunks) {
                        emitted += 1;
                    }
                }
            } else {
                let window = Window { text: section, char_start: 0, char_end: len };
                let chunk = self.make_chunk(format!("{doc_id}_sec{idx}"), doc_id, &window, base, meta);
                self.keep(chunk, &mut chunks);
            }
        }
        chunks
    }

    fn windows<'a>(&self, text: &'a str) -> Vec<Window<'a>> {
        let sentences = split_sentences(text);
        let mut out = Vec::new();
        if sentences.is_empty() {
            return out;
        }
        // Buffer is sentences[first..i]; it is never empty at the check.
        let mut first = 0;
        for i in 1..sentences.len() {
            let candidate = sentences[i].char_end - sentences[first].char_start;
            if candidate > self.config.chunk_size() {
                out.push(window(text, &sentences[first..i]));
                first = self.overlap_start(&sentences, first, i);
            }
        }
        out.push(window(text, &sentences[first..]));
        out
    }

    /// First sentence of the suffix of `sentences[first..next]` carried into
    /// the next window. Returns `next` when nothing is carried. The suffix
    /// never spans the whole closed window and, together with
    /// `sentences[next]`, never exceeds `chunk_size`.
    fn overlap_start(&self, sentences: &[Sentence], first: usize, next: usize) -> usize {
        let closed_end = sentences[next - 1].char_end;
        let mut start = next;
        while start - 1 > first {
            let candidate = start - 1;
            let overlap = closed_end - sentences[candidate].char_start;
            let reseeded = sentences[next].char_end - sentences[candidate].char_start;
            if overlap > self.config.chunk_overlap() || reseeded > self.config.chunk_size() {
                break;
            }
            start = candidate;
        }
        start
    }

    fn make_chunk(&self, chunk_id: String, doc_id: &str, window: &Window<'_>, base: usize, metadata: Meta) -> Chunk {
        Chunk {
            chunk_id,
            doc_id: doc_id.to_string(),
            text: window.text.to_string(),
            start_offset: base + window.char_start,
            end_offset: base + window.char_end,
            token_estimate: (window.char_end - window.char_start) / CHARS_PER_TOKEN,
            metadata,
        }
    }

    fn keep(&self, chunk: Chunk, out: &mut Vec<Chunk>) -> bool {
        match chunk.validate(self.config.min_chunk_length) {
            Ok(()) => {
                out.push(chunk);
                true
            }
            Err(err) => {
                debug!(error = %err, "dropping chunk");
                false
            }
        }
    }
}

fn window<'a>(text: &'a str, sentences: &[Sentence]) -> Window<'a> {
    let (first, last) = (sentences[0], sentences[sentences.len() - 1]);
    Window { text: &text[first.start..last.end], char_start: first.char_start, char_end: last.char_end }
}

fn split_sentences(text: &str) -> Vec<Sentence> {
    let mut bounds = Vec::new();
    let mut cursor = 0;
    for m in SENTENCE_BOUNDARY.find_iter(text) {
        // the boundary punctuation is ASCII, so +1 stays on a char boundary
        push_trimmed(text, cursor, m.start() + 1, &mut bounds);
        cursor = m.end();
    }
    push_trimmed(text, cursor, text.len(), &mut bounds);

    let mut sentences = Vec::with_capacity(bounds.len());
    let (mut byte_pos, mut char_pos) = (0usize, 0usize);
    for (start, end) in bounds {
        char_pos += text[byte_pos..start].chars().count();
        let char_start = char_pos;
        char_pos += text[start..end].chars().count();
        byte_pos = end;
        sentences.push(Sentence { start, end, char_start, char_end: char_pos });
    }
    sentences
}

fn push_trimmed(text: &str, start: usize, end: usize, out: &mut Vec<(usize, usize)>) {
    let piece = &text[start..end];
    let without_lead = piece.trim_start();
    let lead = piece.len() - without_lead.len();
    let trimmed = without_lead.trim_end();
    if !trimmed.is_empty() {
        out.push((start + lead, start + lead + trimmed.len()));
    }
}

fn section_bounds<'a>(text: &str, provided: &'a [DocumentSection]) -> Vec<SectionBound<'a>> {
    let mut starts: Vec<(usize, Option<&'a str>)> = if provided.is_empty() {
        SECTION_HEADER.find_iter(text).map(|m| (m.start(), None)).collect()
    } else {
        provided
            .iter()
            .filter(|s| s.offset <= text.len() && text.is_char_boundary(s.offset))
            .map(|s| (s.offset, Some(s.title.as_str())))
            .collect()
    };
    starts.sort_by_key(|(offset, _)| *offset);
    starts.dedup_by_key(|(offset, _)| *offset);
    if starts.first().map_or(true, |(offset, _)| *offset > 0) {
        starts.insert(0, (0, None));
    }
    starts
        .iter()
        .enumerate()
        .map(|(i, &(start, title))| SectionBound {
            start,
            end: starts.get(i + 1).map_or(text.len(), |next| next.0),
            title,
        })
        .collect()
}
