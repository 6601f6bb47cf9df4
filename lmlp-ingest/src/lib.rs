//! Literary mention ingest pipeline
//!
//! Turns LLM-generated markdown summaries of a book-review radio show into
//! deduplicated canonical authors, books and critics, in three stages:
//!
//! 1. **Extraction** — parse the summary's review tables into [`types::Mention`]s
//! 2. **Resolution** — bind each mention to a canonical entity through an
//!    ordered phase chain ([`resolver::MatchResolver`])
//! 3. **Validation & promotion** — track per-mention state in a durable
//!    cache ([`services::ValidationCache`]) and promote verified entries
//!    into canonical storage ([`services::PromotionCoordinator`])
//!
//! Every stage is idempotent: re-ingesting an unchanged summary is a no-op.

pub mod db;
pub mod extractors;
pub mod resolver;
pub mod services;
pub mod types;

pub use services::{PromotionCoordinator, PromotionError, PromotionReport, SummaryResolver, ValidationCache};
pub use types::{
    BiblioSuggestion, BibliographicVerifier, CacheEntry, CacheStatus, MatchPhase, MatchResult,
    Mention, NoopVerifier, Section,
};
