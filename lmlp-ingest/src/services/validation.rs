//! Human validation service
//!
//! Thin service over the cache store: review-queue listing and the
//! validation operation that applies a reviewer's corrections. Input is
//! checked here so the store layer only ever sees well-formed corrections.

use crate::db::cache;
use crate::types::CacheEntry;
use lmlp_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

const KNOWN_STATUSES: &[&str] = &["not_found", "suggested", "verified", "mongo"];

/// Validation cache service
pub struct ValidationCache {
    db: SqlitePool,
}

impl ValidationCache {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// List cache entries, optionally filtered by episode and/or status.
    ///
    /// `status = Some("suggested")` and `Some("not_found")` are the two
    /// review queues; `Some("verified")` is the promotion backlog.
    pub async fn list_cache_entries(
        &self,
        episode_id: Option<Uuid>,
        status: Option<&str>,
    ) -> Result<Vec<CacheEntry>> {
        if let Some(st) = status {
            if !KNOWN_STATUSES.contains(&st) {
                return Err(Error::InvalidInput(format!("Unknown status filter: {}", st)));
            }
        }
        cache::list(&self.db, episode_id, status).await
    }

    /// Apply a reviewer's corrections and move the entry to `verified`.
    ///
    /// Author and title are mandatory; the publisher correction is optional
    /// and leaves the extracted publisher in place when absent.
    pub async fn validate(
        &self,
        entry_id: Uuid,
        corrected_author: &str,
        corrected_title: &str,
        corrected_publisher: Option<&str>,
    ) -> Result<CacheEntry> {
        if corrected_author.trim().is_empty() {
            return Err(Error::InvalidInput(
                "corrected_author must not be empty".to_string(),
            ));
        }
        if corrected_title.trim().is_empty() {
            return Err(Error::InvalidInput(
                "corrected_title must not be empty".to_string(),
            ));
        }
        if let Some(p) = corrected_publisher {
            if p.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "corrected_publisher must not be empty when provided".to_string(),
                ));
            }
        }

        let entry = cache::set_validated(
            &self.db,
            entry_id,
            corrected_author,
            corrected_title,
            corrected_publisher,
        )
        .await?;

        info!(
            entry_id = %entry_id,
            corrected_author = corrected_author,
            corrected_title = corrected_title,
            "Cache entry validated"
        );

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::{CacheEntry, CacheStatus, Mention, Section};

    async fn seeded_entry(pool: &SqlitePool) -> CacheEntry {
        let mention = Mention {
            episode_id: Uuid::new_v4(),
            section: Section::Programme,
            author_text: "Pascal Quignard".to_string(),
            title_text: "Trésor caché".to_string(),
            publisher_text: "Albin Michel".to_string(),
            critic_text: String::new(),
            note: None,
            row_index: 0,
        };
        let entry =
            CacheEntry::from_mention(&mention, Uuid::new_v4(), CacheStatus::NotFound, None, None, None);
        cache::upsert(pool, &entry).await.unwrap()
    }

    #[tokio::test]
    async fn test_validate_applies_corrections() {
        let pool = test_pool().await;
        let entry = seeded_entry(&pool).await;
        let service = ValidationCache::new(pool);

        let updated = service
            .validate(entry.id, "Pascal Quignard", "Trésors cachés", None)
            .await
            .unwrap();

        assert_eq!(updated.status, CacheStatus::Verified);
        assert_eq!(updated.suggested_title.as_deref(), Some("Trésors cachés"));
        assert_eq!(updated.publisher_text, "Albin Michel");
    }

    #[tokio::test]
    async fn test_validate_rejects_empty_fields() {
        let pool = test_pool().await;
        let entry = seeded_entry(&pool).await;
        let service = ValidationCache::new(pool);

        let err = service.validate(entry.id, "  ", "Titre", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("corrected_author")));

        let err = service.validate(entry.id, "Auteur", "", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("corrected_title")));

        let err = service
            .validate(entry.id, "Auteur", "Titre", Some("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(ref m) if m.contains("corrected_publisher")));
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_status() {
        let pool = test_pool().await;
        let service = ValidationCache::new(pool);

        let err = service
            .list_cache_entries(None, Some("promoted"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
