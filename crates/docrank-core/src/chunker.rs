//! Heading-aware markdown chunker.
//!
//! A document is cut into sections at every level 1-3 heading. Sections that
//! fit within `chunk_size` characters become one chunk; larger ones are split
//! on blank lines and greedily packed, seeding each new chunk with the last
//! block of the previous one so context carries across the boundary.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::ChunkerSettings;
use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkMetadata};

const BLOCK_SEPARATOR: &str = "\n\n";

const KEY_TERM_STOP_WORDS: &[&str] = &[
    "the", "and", "but", "for", "with", "from", "are", "was", "were", "been", "being", "have", "has",
    "had", "does", "did", "will", "would", "should", "could", "may", "might", "must", "can", "this",
    "that", "these", "those", "its", "then", "than",
];

#[derive(Debug, Clone)]
pub struct MarkdownChunker {
    settings: ChunkerSettings,
}

impl Default for MarkdownChunker {
    fn default() -> Self {
        Self::new(ChunkerSettings::default())
    }
}

/// A run of lines under one heading, with the heading path active at that point.
#[derive(Debug, Default)]
struct Section<'a> {
    h1: Option<String>,
    h2: Option<String>,
    h3: Option<String>,
    heading: Option<&'a str>,
    body: Vec<&'a str>,
}

impl Section<'_> {
    fn has_body(&self) -> bool {
        self.body.iter().any(|l| !l.trim().is_empty())
    }

    fn text(&self) -> String {
        let mut lines: Vec<&str> = Vec::with_capacity(self.body.len() + 1);
        lines.extend(self.heading);
        lines.extend(self.body.iter().copied());
        lines.join("\n").trim().to_string()
    }

    fn path(&self, title: &str) -> String {
        let parts: Vec<&str> = [&self.h1, &self.h2, &self.h3].into_iter().flatten().map(String::as_str).collect();
        if parts.is_empty() { title.to_string() } else { parts.join(" > ") }
    }
}

impl MarkdownChunker {
    pub fn new(settings: ChunkerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ChunkerSettings {
        &self.settings
    }

    /// Chunk one document. Ids use one counter across the whole document.
    pub fn chunk_document(&self, content: &str, source: &str) -> Result<Vec<Chunk>> {
        if content.trim().is_empty() {
            return Err(Error::NoContent(format!("{source} is empty")));
        }
        let sections = split_sections(content);
        if !sections.iter().any(|s| s.heading.is_some()) {
            return Err(Error::NoContent(format!("{source} has no headings")));
        }
        let title = document_title(content).unwrap_or_else(|| source.to_string());

        let mut chunks = Vec::new();
        for section in sections.iter().filter(|s| s.has_body()) {
            let path = section.path(&title);
            for (chunk_num, text) in self.split_section(&section.text()).into_iter().enumerate() {
                let metadata = ChunkMetadata {
                    source: source.to_string(),
                    document: title.clone(),
                    section: path.clone(),
                    h1: section.h1.clone(),
                    h2: section.h2.clone(),
                    h3: section.h3.clone(),
                    chunk_num,
                    char_count: char_len(&text),
                    key_terms: key_terms(&text, self.settings.key_terms),
                    extra: BTreeMap::new(),
                };
                chunks.push(Chunk::new(chunks.len(), text, metadata));
            }
        }
        if chunks.is_empty() {
            return Err(Error::NoContent(format!("{source} has headings but no section text")));
        }
        debug!(source, chunks = chunks.len(), "chunked document");
        Ok(chunks)
    }

    /// Split one section's text into chunk texts.
    fn split_section(&self, text: &str) -> Vec<String> {
        let limit = self.settings.chunk_size;
        if char_len(text) <= limit {
            return vec![text.to_string()];
        }

        let sep = char_len(BLOCK_SEPARATOR);
        let mut out: Vec<String> = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut size = 0usize;
        for block in split_blocks(text) {
            let block_size = char_len(&block);
            let grown = if current.is_empty() { block_size } else { size + sep + block_size };
            // A heading never forms a chunk of its own; it rides with the next block.
            let heading_only = current.len() == 1 && parse_heading(&current[0]).is_some();
            if grown <= limit || current.is_empty() || heading_only {
                current.push(block);
                size = grown;
                continue;
            }
            out.push(current.join(BLOCK_SEPARATOR));
            // One-block lookback, as long as the seeded chunk still fits.
            let last = current.pop().unwrap_or_default();
            let seeded = char_len(&last) + sep + block_size;
            if seeded <= limit {
                current = vec![last, block];
                size = seeded;
            } else {
                current = vec![block];
                size = block_size;
            }
        }
        if !current.is_empty() {
            let tail = current.join(BLOCK_SEPARATOR);
            if char_len(&tail) >= self.settings.min_chunk_size || out.is_empty() {
                out.push(tail);
            } else {
                debug!(chars = char_len(&tail), "dropping short trailing chunk");
            }
        }
        out
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Returns `(level, text)` for `#`, `##` and `###` headings.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_end();
    let level = trimmed.bytes().take_while(|b| *b == b'#').count();
    if !(1..=3).contains(&level) {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with([' ', '\t']) {
        return None;
    }
    let text = rest.trim();
    (!text.is_empty()).then_some((level, text))
}

fn document_title(content: &str) -> Option<String> {
    content.lines().find_map(|l| match parse_heading(l) {
        Some((1, text)) => Some(text.to_string()),
        _ => None,
    })
}

fn split_sections(content: &str) -> Vec<Section<'_>> {
    let mut sections = Vec::new();
    let mut current = Section::default();
    for line in content.lines() {
        let Some((level, text)) = parse_heading(line) else {
            current.body.push(line);
            continue;
        };
        let (h1, h2, h3) = match level {
            1 => (Some(text.to_string()), None, None),
            2 => (current.h1.clone(), Some(text.to_string()), None),
            _ => (current.h1.clone(), current.h2.clone(), Some(text.to_string())),
        };
        let next = Section { h1, h2, h3, heading: Some(line.trim_end()), body: Vec::new() };
        sections.push(std::mem::replace(&mut current, next));
    }
    sections.push(current);
    sections
}

/// Paragraph-like blocks separated by blank lines.
fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut lines: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !lines.is_empty() {
                blocks.push(lines.join("\n").trim().to_string());
                lines.clear();
            }
        } else {
            lines.push(line);
        }
    }
    if !lines.is_empty() {
        blocks.push(lines.join("\n").trim().to_string());
    }
    blocks
}

/// Most frequent words of three or more letters, ties broken alphabetically.
fn key_terms(text: &str, top_n: usize) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut freq: BTreeMap<&str, usize> = BTreeMap::new();
    for word in lower.split(|c: char| !c.is_alphanumeric()) {
        if word.chars().count() >= 3
            && word.chars().all(|c| c.is_ascii_lowercase())
            && !KEY_TERM_STOP_WORDS.contains(&word)
        {
            *freq.entry(word).or_default() += 1;
        }
    }
    let mut ranked: Vec<(&str, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked.into_iter().take(top_n).map(|(w, _)| w.to_string()).collect()
}

/// Size profile of a chunk set, for monitoring ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkStatistics {
    pub total_chunks: usize,
    pub avg_chunk_size: f64,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub total_characters: usize,
    pub documents_processed: usize,
}

impl ChunkStatistics {
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        if chunks.is_empty() {
            return Self::default();
        }
        let sizes: Vec<usize> = chunks.iter().map(|c| char_len(&c.content)).collect();
        let total: usize = sizes.iter().sum();
        let sources: BTreeSet<&str> = chunks.iter().map(|c| c.metadata.source.as_str()).collect();
        Self {
            total_chunks: chunks.len(),
            avg_chunk_size: total as f64 / chunks.len() as f64,
            min_chunk_size: sizes.iter().copied().min().unwrap_or(0),
            max_chunk_size: sizes.iter().copied().max().unwrap_or(0),
            total_characters: total,
            documents_processed: sources.len(),
        }
    }
}
