//! Sentence-based text segmentation.
//!
//! Knowledge documents are split into retrieval units before embedding.
//! The segmenter cuts text at sentence terminators and greedily packs
//! consecutive sentences into segments up to a maximum character length,
//! so that each stored segment stays small enough to embed while keeping
//! adjacent sentences together.

/// Default sentence terminator for Chinese prose.
pub const SENTENCE_TERMINATOR: char = '。';

/// Greedy sentence packer.
///
/// Splits text on a terminator character and accumulates sentences into
/// segments of at most `max_chars` characters (Unicode scalar values, not
/// bytes). A single sentence longer than `max_chars` is emitted as its own
/// segment rather than truncated.
#[derive(Debug, Clone)]
pub struct Segmenter {
    max_chars: usize,
    terminator: char,
}

impl Segmenter {
    /// Create a segmenter with the default `。` terminator.
    pub fn new(max_chars: usize) -> Self {
        Self::with_terminator(max_chars, SENTENCE_TERMINATOR)
    }

    /// Create a segmenter that splits on a custom terminator.
    pub fn with_terminator(max_chars: usize, terminator: char) -> Self {
        Self {
            max_chars,
            terminator,
        }
    }

    /// Split `text` into segments.
    ///
    /// Each sentence is trimmed of surrounding whitespace and gets the
    /// terminator re-appended, including a trailing fragment that had none.
    /// Sentences are then packed greedily: a sentence that would push the
    /// current segment past `max_chars` starts a new segment instead.
    ///
    /// # Returns
    /// Segments in document order. Empty or whitespace-only input yields
    /// an empty vector.
    pub fn segment(&self, text: &str) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut current_chars = 0usize;

        for piece in text.split(self.terminator) {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }

            let sentence_chars = piece.chars().count() + 1;
            if current_chars + sentence_chars > self.max_chars && !current.is_empty() {
                segments.push(std::mem::take(&mut current));
                current_chars = 0;
            }

            current.push_str(piece);
            current.push(self.terminator);
            current_chars += sentence_chars;
        }

        if !current.is_empty() {
            segments.push(current);
        }

        segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_yields_no_segments() {
        let segmenter = Segmenter::new(500);
        assert!(segmenter.segment("").is_empty());
        assert!(segmenter.segment("   \n  ").is_empty());
    }

    #[test]
    fn test_short_sentences_merge_into_one_segment() {
        let segmenter = Segmenter::new(500);
        let segments = segmenter.segment("七天无理由退货。运费由卖家承担。");
        assert_eq!(segments, vec!["七天无理由退货。运费由卖家承担。"]);
    }

    #[test]
    fn test_max_length_starts_a_new_segment() {
        // Each sentence is 8 chars with its terminator; a 10-char limit
        // fits exactly one per segment.
        let segmenter = Segmenter::new(10);
        let segments = segmenter.segment("七天无理由退货。运费由卖家承担。");
        assert_eq!(segments, vec!["七天无理由退货。", "运费由卖家承担。"]);
    }

    #[test]
    fn test_oversized_sentence_is_kept_whole() {
        let segmenter = Segmenter::new(5);
        let segments = segmenter.segment("这是一句很长很长的话。短句。");
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0], "这是一句很长很长的话。");
        assert_eq!(segments[1], "短句。");
    }

    #[test]
    fn test_missing_terminator_is_appended() {
        let segmenter = Segmenter::new(500);
        assert_eq!(segmenter.segment("你好"), vec!["你好。"]);
        assert_eq!(
            segmenter.segment("第一句。结尾没有句号"),
            vec!["第一句。结尾没有句号。"]
        );
    }

    #[test]
    fn test_blank_sentences_are_skipped() {
        let segmenter = Segmenter::new(500);
        let segments = segmenter.segment("第一句。。  。第二句。");
        assert_eq!(segments, vec!["第一句。第二句。"]);
    }

    #[test]
    fn test_whitespace_around_sentences_is_trimmed() {
        let segmenter = Segmenter::new(500);
        let segments = segmenter.segment("  第一句。\n  第二句。\n");
        assert_eq!(segments, vec!["第一句。第二句。"]);
    }

    #[test]
    fn test_custom_terminator() {
        let segmenter = Segmenter::with_terminator(4, '.');
        let segments = segmenter.segment("ab. cd. ef.");
        assert_eq!(segments, vec!["ab.", "cd.", "ef."]);
    }
}
