//! Streaming sentence segmentation.
//!
//! Text arrives in arbitrary increments (a model stream may deliver one
//! character at a time). The [`Segmenter`] keeps a rolling buffer and hands
//! out a segment as soon as its terminal punctuation run is known to be
//! complete, i.e. once a non-terminal character follows the run. A run that
//! touches the end of the buffer is held back because the next chunk may
//! extend it (`"？"` then `"！"`).
//!
//! Concatenating every pushed segment plus the [`Segmenter::finish`]
//! remainder reproduces the input byte-for-byte.

/// Characters that end a sentence.
///
/// The ideographic comma (`、`) and ASCII `.` are deliberately absent: the
/// former is a pause, not a boundary, and the latter shows up in numbers.
const TERMINALS: &[char] = &['。', '！', '？', '!', '?', '．'];

/// Whether `c` terminates a sentence.
pub fn is_terminal(c: char) -> bool {
    TERMINALS.contains(&c)
}

/// Incremental sentence splitter.
#[derive(Debug, Default, Clone)]
pub struct Segmenter {
    buffer: String,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every segment that is now complete.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);

        let mut segments = Vec::new();
        while let Some(end) = complete_boundary(&self.buffer) {
            let rest = self.buffer.split_off(end);
            segments.push(std::mem::replace(&mut self.buffer, rest));
        }
        segments
    }

    /// Text retained so far (not yet handed out).
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// End of input: return the retained remainder, which may be empty.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

/// Split a complete text in one go.
///
/// The last element is always the remainder and may be empty.
pub fn split_all(text: &str) -> Vec<String> {
    let mut segmenter = Segmenter::new();
    let mut segments = segmenter.push(text);
    segments.push(segmenter.finish());
    segments
}

/// Byte offset just past the first terminal run that is followed by a
/// non-terminal character.
fn complete_boundary(text: &str) -> Option<usize> {
    let mut in_run = false;
    for (idx, c) in text.char_indices() {
        if is_terminal(c) {
            in_run = true;
        } else if in_run {
            return Some(idx);
        }
    }
    None
}
