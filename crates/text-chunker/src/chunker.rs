use crate::config::ChunkerConfig;
use crate::error::Result;

/// Splits plain text into bounded, overlapping chunks
#[derive(Debug, Clone)]
pub struct TextChunker {
    config: ChunkerConfig,
    levels: Vec<Vec<Vec<char>>>,
}

impl TextChunker {
    /// Create a new chunker, rejecting invalid configuration up front
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        let levels = config
            .separators
            .iter()
            .map(|level| {
                level
                    .patterns
                    .iter()
                    .map(|pattern| pattern.chars().collect())
                    .collect()
            })
            .collect();
        Ok(Self { config, levels })
    }

    #[must_use]
    pub const fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `raw_text` into ordered chunks.
    ///
    /// Empty input yields no chunks. Input no longer than `chunk_size` yields exactly one.
    #[must_use]
    pub fn split(&self, raw_text: &str) -> Vec<String> {
        let chars: Vec<char> = raw_text.chars().collect();
        if chars.is_empty() {
            return Vec::new();
        }

        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            if chars.len() - start <= size {
                chunks.push(chars[start..].iter().collect());
                break;
            }

            let end = self.find_cut(&chars, start, start + size);
            chunks.push(chars[start..end].iter().collect());

            // end - start > overlap, so every window advances
            start = end - overlap;
        }

        log::debug!(
            "Split {} chars into {} chunks (size {}, overlap {})",
            chars.len(),
            chunks.len(),
            size,
            overlap
        );
        chunks
    }

    /// Pick the cut position for the window `[start, window_end)`.
    ///
    /// Walks the separator hierarchy coarsest first and takes the last boundary of the first
    /// level that leaves the chunk longer than the overlap. Falls back to a hard cut.
    fn find_cut(&self, chars: &[char], start: usize, window_end: usize) -> usize {
        let min_end = start + self.config.chunk_overlap + 1;
        for patterns in &self.levels {
            if let Some(cut) = last_boundary(chars, patterns, min_end, window_end) {
                return cut;
            }
        }
        window_end
    }
}

/// Last position `cut` in `[min_end, window_end]` that directly follows one of `patterns`.
fn last_boundary(
    chars: &[char],
    patterns: &[Vec<char>],
    min_end: usize,
    window_end: usize,
) -> Option<usize> {
    let mut cut = window_end;
    while cut >= min_end {
        let matched = patterns.iter().any(|pattern| {
            cut >= pattern.len() && chars[cut - pattern.len()..cut] == pattern[..]
        });
        if matched {
            return Some(cut);
        }
        cut -= 1;
    }
    None
}

/// Split with explicit size and overlap using the default separator hierarchy.
pub fn split(raw_text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    let chunker = TextChunker::new(ChunkerConfig::new(chunk_size, overlap))?;
    Ok(chunker.split(raw_text))
}

/// Rebuild the original text from chunks by dropping each chunk's leading overlap.
#[must_use]
pub fn reassemble(chunks: &[String], overlap: usize) -> String {
    let mut out = String::new();
    for (idx, chunk) in chunks.iter().enumerate() {
        if idx == 0 {
            out.push_str(chunk);
        } else {
            out.extend(chunk.chars().skip(overlap));
        }
    }
    out
}
