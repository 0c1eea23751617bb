pub mod base;
pub mod segmenter;
pub mod similarity;

pub use base::{KnowledgeBase, KnowledgeEntry};
pub use segmenter::{Segmenter, SENTENCE_TERMINATOR};
