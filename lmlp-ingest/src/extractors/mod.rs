//! Extraction of candidate mentions from raw summary markdown

pub mod summary_extractor;

pub use summary_extractor::extract_mentions;
