//! Summary resolution orchestration
//!
//! Drives one extraction batch end to end: load a single reference index
//! snapshot, extract the mention list, resolve each mention through the phase
//! chain (threading one batch-scoped claimed set), and upsert the cache
//! entries. Re-running on an unchanged `(episode, summary)` pair reproduces
//! the same entry set without duplicates.

use crate::db::cache;
use crate::extractors::extract_mentions;
use crate::resolver::{MatchResolver, ReferenceIndex};
use crate::types::{CacheEntry, MatchPhase, MatchResult};
use lmlp_common::{MatchingConfig, Result};
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

/// Summary resolution service
pub struct SummaryResolver {
    db: SqlitePool,
    resolver: MatchResolver,
}

impl SummaryResolver {
    pub fn new(db: SqlitePool, policy: MatchingConfig) -> Self {
        Self {
            db,
            resolver: MatchResolver::new(policy),
        }
    }

    /// Resolve a summary into cache entries, in source row order.
    ///
    /// Idempotent: the upsert keys on `(episode_id, natural_key)`, so a
    /// repeat call returns the already-stored entries unchanged.
    pub async fn resolve_summary(
        &self,
        episode_id: Uuid,
        avis_critique_id: Uuid,
        summary: &str,
    ) -> Result<Vec<CacheEntry>> {
        let index = ReferenceIndex::load(&self.db).await?;
        let mentions = extract_mentions(episode_id, summary);
        debug!(
            episode_id = %episode_id,
            mention_count = mentions.len(),
            "Resolving extraction batch"
        );

        let mut claimed: HashSet<Uuid> = HashSet::new();
        let mut entries = Vec::with_capacity(mentions.len());

        for mention in &mentions {
            let result = self.resolver.resolve(mention, &index, &mut claimed);
            let (suggested_author, suggested_title) = self.suggestions(&result, &index);

            let candidate = CacheEntry::from_mention(
                mention,
                avis_critique_id,
                result.initial_status(),
                suggested_author,
                suggested_title,
                result.phase,
            );
            let stored = cache::upsert(&self.db, &candidate).await?;
            entries.push(stored);
        }

        info!(
            episode_id = %episode_id,
            entry_count = entries.len(),
            "Summary resolution complete"
        );

        Ok(entries)
    }

    /// Suggestion text shown to the reviewer, taken from the matched
    /// canonical entity. Critic matches carry no book suggestion.
    fn suggestions(
        &self,
        result: &MatchResult,
        index: &ReferenceIndex,
    ) -> (Option<String>, Option<String>) {
        match (result.phase, result.matched_entity_id) {
            (Some(MatchPhase::Critic), _) | (None, _) | (_, None) => (None, None),
            (Some(_), Some(book_id)) => match index.book(book_id) {
                Some(book) => (Some(book.author_name.clone()), Some(book.title.clone())),
                None => (None, None),
            },
        }
    }
}
