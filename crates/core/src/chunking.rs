const SENTENCE_ENDERS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub target_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_chars: 1_500,
            overlap_chars: 200,
        }
    }
}

/// Splits text into overlapping segments of roughly `target_chars`
/// characters. Split points prefer paragraph breaks, then sentence
/// boundaries, then whitespace; a hard cut is the last resort. The same
/// input and config always produce the same sequence.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.iter().all(|c| c.is_whitespace()) {
        return Vec::new();
    }

    let target = config.target_chars.max(1);
    if chars.len() <= target {
        return vec![text.to_string()];
    }

    // Overlap above half the target would stall the cursor.
    let overlap = config.overlap_chars.min(target / 2);

    let mut chunks = Vec::new();
    let mut start = 0usize;

    while start < chars.len() {
        let window_end = (start + target).min(chars.len());
        let end = if window_end == chars.len() {
            window_end
        } else {
            find_break(&chars, start + overlap + 1, window_end)
        };

        let piece: String = chars[start..end].iter().collect();
        if !piece.trim().is_empty() {
            chunks.push(piece);
        }

        if end == chars.len() {
            break;
        }
        start = end - overlap;
    }

    chunks
}

/// Best split position in `(floor, limit]`, searched backward so the cut
/// lands as late in the window as a natural boundary allows.
fn find_break(chars: &[char], floor: usize, limit: usize) -> usize {
    if floor >= limit {
        return limit;
    }

    let mut index = limit;
    while index > floor + 1 {
        if chars[index - 1] == '\n' && chars[index - 2] == '\n' {
            return index;
        }
        index -= 1;
    }

    for index in (floor..limit).rev() {
        if SENTENCE_ENDERS.contains(&chars[index]) {
            return index + 1;
        }
    }

    for index in (floor..limit).rev() {
        if chars[index].is_whitespace() {
            return index + 1;
        }
    }

    limit
}
