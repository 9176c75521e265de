use crate::error::IngestError;
use crate::models::{Chunk, IngestionOptions};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Separators tried in order when looking for a natural chunk boundary.
const SEPARATORS: [&str; 3] = ["\n\n", "\n", " "];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
            overlap_chars: value.chunk_overlap_chars,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// Collapses horizontal whitespace runs and runs of blank lines, keeping
/// paragraph and line breaks so the splitter can still find them.
pub fn normalize_page_text(text: &str) -> Result<String, IngestError> {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    let horizontal = Regex::new(r"[ \t\u{a0}\u{000c}]+")?;
    let padded_newline = Regex::new(r" ?\n ?")?;
    let blank_lines = Regex::new(r"\n{3,}")?;

    let collapsed = horizontal.replace_all(&unified, " ");
    let collapsed = padded_newline.replace_all(&collapsed, "\n");
    let collapsed = blank_lines.replace_all(&collapsed, "\n\n");

    Ok(collapsed.trim().to_string())
}

/// Splits `text` into pieces of at most `max_chars` characters. Consecutive
/// pieces share exactly `overlap_chars` characters.
pub fn split_with_overlap(text: &str, config: ChunkingConfig) -> Result<Vec<String>, IngestError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let mut pieces = Vec::new();
    if chars.is_empty() {
        return Ok(pieces);
    }

    let mut start = 0usize;
    loop {
        if chars.len() - start <= config.max_chars {
            pieces.push(chars[start..].iter().collect());
            break;
        }

        let hard_end = start + config.max_chars;
        // The cut must land past the overlap so the next start moves forward.
        let earliest = (start + config.overlap_chars + 1).max(start + config.max_chars / 2);
        let end = find_break(&chars, earliest, hard_end).unwrap_or(hard_end);

        pieces.push(chars[start..end].iter().collect());
        start = end - config.overlap_chars;
    }

    Ok(pieces)
}

/// Returns the furthest cut position in `earliest..=latest` that falls right
/// after a separator, trying stronger separators first.
fn find_break(chars: &[char], earliest: usize, latest: usize) -> Option<usize> {
    for separator in SEPARATORS {
        let pattern: Vec<char> = separator.chars().collect();
        let mut end = latest;
        while end >= earliest && end >= pattern.len() {
            if chars[end - pattern.len()..end] == pattern[..] {
                return Some(end);
            }
            end -= 1;
        }
    }
    None
}

pub fn build_chunks(
    source: &str,
    page: u32,
    page_text: &str,
    options: &IngestionOptions,
    global_index: u64,
) -> Result<(Vec<Chunk>, u64), IngestError> {
    let config = ChunkingConfig::from(options);
    let normalized = normalize_page_text(page_text)?;

    let mut chunks = Vec::new();
    let mut cursor = global_index;

    for piece in split_with_overlap(&normalized, config)? {
        if piece.trim().is_empty() {
            continue;
        }

        chunks.push(Chunk {
            chunk_id: make_chunk_id(source, page, cursor, &piece),
            source: source.to_string(),
            page,
            chunk_index: cursor,
            text: piece,
        });

        cursor = cursor.saturating_add(1);
    }

    Ok((chunks, cursor))
}

fn make_chunk_id(source: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
