//! Promotion into canonical storage
//!
//! Moves a `verified` cache entry into the canonical author/book tables and
//! stamps the entry `mongo` with its back-references. Every promotion runs
//! inside one transaction; the terminal write is guarded so concurrent or
//! repeated invocations land at most once, and the losing call rolls back
//! whole.
//!
//! Canonical mutations are strictly additive: get-or-create on normalized
//! keys plus set-union reference merges, with the single exception of the
//! verifier-driven publisher/url corrective updates.

use crate::db::{authors, books, cache};
use crate::types::{BiblioSuggestion, BibliographicVerifier, CacheEntry, CacheStatus};
use chrono::Utc;
use lmlp_common::{normalize, MatchingConfig};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("Cache entry not found: {0}")]
    EntryNotFound(Uuid),

    #[error("Cache entry already promoted: {0}")]
    AlreadyPromoted(Uuid),

    #[error("Cache entry {id} not eligible for promotion: {reason}")]
    NotEligible { id: Uuid, reason: String },

    #[error("Cache entry {id} missing corrected text: {field}")]
    MissingCorrectedText { id: Uuid, field: &'static str },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Common(#[from] lmlp_common::Error),
}

/// Outcome of an [`PromotionCoordinator::auto_promote_all`] sweep
#[derive(Debug, Default)]
pub struct PromotionReport {
    pub promoted: Vec<Uuid>,
    /// Entries that failed, with the failure rendered for the report
    pub failed: Vec<(Uuid, String)>,
}

/// Promotion service
pub struct PromotionCoordinator {
    db: SqlitePool,
    verifier: Option<Arc<dyn BibliographicVerifier>>,
    policy: MatchingConfig,
}

impl PromotionCoordinator {
    pub fn new(db: SqlitePool, policy: MatchingConfig) -> Self {
        Self {
            db,
            verifier: None,
            policy,
        }
    }

    /// Attach an external bibliographic verifier consulted at promotion time
    pub fn with_verifier(mut self, verifier: Arc<dyn BibliographicVerifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Promote one verified entry into canonical storage.
    ///
    /// Author and book are created (or found) by normalized key, the entry's
    /// episode/avis ids are merged into the book's reference sets, and the
    /// entry is stamped `mongo`. The whole sequence commits or rolls back as
    /// one unit.
    pub async fn promote(&self, entry_id: Uuid) -> Result<CacheEntry, PromotionError> {
        let entry = cache::get(&self.db, entry_id)
            .await?
            .ok_or(PromotionError::EntryNotFound(entry_id))?;

        self.check_eligible(&entry)?;

        let author_name = entry.effective_author().to_string();
        let title = entry.effective_title().to_string();

        // Verifier lookup happens before the transaction opens; a degraded
        // or failing lookup must not hold the write path.
        let suggestion = self.consult_verifier(&title, &author_name).await;

        let mut tx = self.db.begin().await?;

        let author = authors::get_or_create(&mut tx, &author_name).await?;
        let book = books::get_or_create(&mut tx, &title, author.id, &entry.publisher_text).await?;
        books::add_references(&mut tx, book.id, entry.episode_id, entry.avis_critique_id).await?;

        if let Some(s) = suggestion {
            if s.confidence >= self.policy.publisher_correction_threshold {
                if let Some(publisher) = s.suggested_publisher.as_deref() {
                    if !publisher.trim().is_empty()
                        && normalize(publisher) != normalize(&book.publisher)
                    {
                        books::set_publisher(&mut tx, book.id, publisher).await?;
                        info!(
                            book_id = %book.id,
                            publisher = publisher,
                            confidence = s.confidence,
                            "Publisher corrected from verifier suggestion"
                        );
                    }
                }
                if let Some(url) = s.external_ref_url.as_deref() {
                    books::set_external_url(&mut tx, book.id, url).await?;
                }
            }
        }

        let landed = cache::mark_promoted(&mut tx, entry.id, author.id, book.id, Utc::now()).await?;
        if !landed {
            // Another promotion won the race; leave its writes untouched.
            tx.rollback().await?;
            return Err(PromotionError::AlreadyPromoted(entry.id));
        }

        tx.commit().await?;

        info!(
            entry_id = %entry.id,
            author_id = %author.id,
            book_id = %book.id,
            "Cache entry promoted"
        );

        cache::get(&self.db, entry.id)
            .await?
            .ok_or(PromotionError::EntryNotFound(entry.id))
    }

    /// Sweep every `verified` entry, promoting each in turn.
    ///
    /// Per-entry failures are logged and reported without aborting the rest
    /// of the batch.
    pub async fn auto_promote_all(&self) -> Result<PromotionReport, PromotionError> {
        let pending = cache::list(&self.db, None, Some("verified")).await?;
        let mut report = PromotionReport::default();

        for entry in pending {
            match self.promote(entry.id).await {
                Ok(_) => report.promoted.push(entry.id),
                Err(e) => {
                    warn!(entry_id = %entry.id, error = %e, "Promotion failed, continuing sweep");
                    report.failed.push((entry.id, e.to_string()));
                }
            }
        }

        info!(
            promoted = report.promoted.len(),
            failed = report.failed.len(),
            "Auto-promotion sweep complete"
        );

        Ok(report)
    }

    fn check_eligible(&self, entry: &CacheEntry) -> Result<(), PromotionError> {
        if matches!(entry.status, CacheStatus::Mongo { .. }) {
            return Err(PromotionError::AlreadyPromoted(entry.id));
        }
        if entry.natural_key.starts_with("critic:") {
            return Err(PromotionError::NotEligible {
                id: entry.id,
                reason: "critic-only entry has no book to promote".to_string(),
            });
        }
        if entry.status != CacheStatus::Verified {
            return Err(PromotionError::NotEligible {
                id: entry.id,
                reason: format!("status is {}, expected verified", entry.status.as_str()),
            });
        }
        if entry.effective_author().trim().is_empty() {
            return Err(PromotionError::MissingCorrectedText {
                id: entry.id,
                field: "author",
            });
        }
        if entry.effective_title().trim().is_empty() {
            return Err(PromotionError::MissingCorrectedText {
                id: entry.id,
                field: "title",
            });
        }
        Ok(())
    }

    async fn consult_verifier(&self, title: &str, author: &str) -> Option<BiblioSuggestion> {
        let verifier = self.verifier.as_ref()?;
        match verifier.verify(title, author).await {
            Ok(suggestion) => suggestion,
            Err(e) => {
                warn!(
                    verifier = verifier.name(),
                    error = %e,
                    "Bibliographic lookup failed, promoting without correction"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::{Mention, Section};
    use async_trait::async_trait;

    fn mention(author: &str, title: &str, critic: &str) -> Mention {
        Mention {
            episode_id: Uuid::new_v4(),
            section: Section::Programme,
            author_text: author.to_string(),
            title_text: title.to_string(),
            publisher_text: "Grasset".to_string(),
            critic_text: critic.to_string(),
            note: None,
            row_index: 0,
        }
    }

    async fn seeded_entry(pool: &SqlitePool, m: &Mention, status: CacheStatus) -> CacheEntry {
        let entry = CacheEntry::from_mention(m, Uuid::new_v4(), status, None, None, None);
        cache::upsert(pool, &entry).await.unwrap()
    }

    #[tokio::test]
    async fn test_promote_creates_canonical_records() {
        let pool = test_pool().await;
        let m = mention("Claude McKay", "Harlem", "");
        let entry = seeded_entry(&pool, &m, CacheStatus::Verified).await;

        let service = PromotionCoordinator::new(pool.clone(), MatchingConfig::default());
        let promoted = service.promote(entry.id).await.unwrap();

        let (author_id, book_id) = match promoted.status {
            CacheStatus::Mongo { author_id, book_id, .. } => (author_id, book_id),
            other => panic!("expected mongo, got {:?}", other),
        };

        let book = books::get(&pool, book_id).await.unwrap().unwrap();
        assert_eq!(book.title, "Harlem");
        assert_eq!(book.author_id, author_id);
        assert_eq!(book.publisher, "Grasset");
        assert_eq!(book.episodes, vec![m.episode_id]);
        assert_eq!(book.avis, vec![entry.avis_critique_id]);
    }

    #[tokio::test]
    async fn test_promote_twice_is_rejected_without_mutation() {
        let pool = test_pool().await;
        let entry = seeded_entry(&pool, &mention("A B", "Titre", ""), CacheStatus::Verified).await;
        let service = PromotionCoordinator::new(pool.clone(), MatchingConfig::default());

        service.promote(entry.id).await.unwrap();
        let err = service.promote(entry.id).await.unwrap_err();
        assert!(matches!(err, PromotionError::AlreadyPromoted(id) if id == entry.id));

        // Reference sets were not double-appended
        let all = books::list_all(&pool).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].episodes.len(), 1);
        assert_eq!(all[0].avis.len(), 1);
    }

    #[tokio::test]
    async fn test_promote_requires_verified_status() {
        let pool = test_pool().await;
        let entry = seeded_entry(&pool, &mention("A B", "Titre", ""), CacheStatus::Suggested).await;
        let service = PromotionCoordinator::new(pool, MatchingConfig::default());

        let err = service.promote(entry.id).await.unwrap_err();
        assert!(matches!(err, PromotionError::NotEligible { .. }));
    }

    #[tokio::test]
    async fn test_critic_only_entry_not_eligible() {
        let pool = test_pool().await;
        let entry = seeded_entry(&pool, &mention("", "", "Hubert Arthus"), CacheStatus::Verified).await;
        let service = PromotionCoordinator::new(pool, MatchingConfig::default());

        let err = service.promote(entry.id).await.unwrap_err();
        assert!(matches!(err, PromotionError::NotEligible { .. }));
    }

    struct PublisherFixVerifier {
        confidence: f64,
    }

    #[async_trait]
    impl BibliographicVerifier for PublisherFixVerifier {
        fn name(&self) -> &'static str {
            "PublisherFix"
        }

        async fn verify(
            &self,
            _title: &str,
            _author: &str,
        ) -> anyhow::Result<Option<BiblioSuggestion>> {
            Ok(Some(BiblioSuggestion {
                suggested_publisher: Some("Gallimard".to_string()),
                external_ref_url: Some("https://catalog.example/livre/42".to_string()),
                confidence: self.confidence,
                ..Default::default()
            }))
        }
    }

    #[tokio::test]
    async fn test_verifier_correction_applied_above_threshold() {
        let pool = test_pool().await;
        let entry = seeded_entry(&pool, &mention("A B", "Titre", ""), CacheStatus::Verified).await;
        let service = PromotionCoordinator::new(pool.clone(), MatchingConfig::default())
            .with_verifier(Arc::new(PublisherFixVerifier { confidence: 0.95 }));

        let promoted = service.promote(entry.id).await.unwrap();
        let book_id = match promoted.status {
            CacheStatus::Mongo { book_id, .. } => book_id,
            other => panic!("expected mongo, got {:?}", other),
        };

        let book = books::get(&pool, book_id).await.unwrap().unwrap();
        assert_eq!(book.publisher, "Gallimard");
        assert_eq!(
            book.external_url.as_deref(),
            Some("https://catalog.example/livre/42")
        );
    }

    #[tokio::test]
    async fn test_verifier_correction_ignored_below_threshold() {
        let pool = test_pool().await;
        let entry = seeded_entry(&pool, &mention("A B", "Titre", ""), CacheStatus::Verified).await;
        let service = PromotionCoordinator::new(pool.clone(), MatchingConfig::default())
            .with_verifier(Arc::new(PublisherFixVerifier { confidence: 0.5 }));

        let promoted = service.promote(entry.id).await.unwrap();
        let book_id = match promoted.status {
            CacheStatus::Mongo { book_id, .. } => book_id,
            other => panic!("expected mongo, got {:?}", other),
        };

        let book = books::get(&pool, book_id).await.unwrap().unwrap();
        assert_eq!(book.publisher, "Grasset");
        assert!(book.external_url.is_none());
    }

    #[tokio::test]
    async fn test_auto_promote_all_reports_failures() {
        let pool = test_pool().await;
        let good = seeded_entry(&pool, &mention("A B", "Un titre", ""), CacheStatus::Verified).await;
        // Critic-only entry forced to verified: eligible by status, rejected by kind
        let bad = seeded_entry(&pool, &mention("", "", "Critique X"), CacheStatus::Verified).await;

        let service = PromotionCoordinator::new(pool, MatchingConfig::default());
        let report = service.auto_promote_all().await.unwrap();

        assert_eq!(report.promoted, vec![good.id]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, bad.id);
    }
}
