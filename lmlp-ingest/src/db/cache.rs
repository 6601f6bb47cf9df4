//! Validation cache store
//!
//! One durable row per `(episode_id, natural_key)`. The upsert is
//! `DO NOTHING` on conflict: re-extraction of an unchanged summary is a
//! no-op and never regresses an entry a human has already corrected.
//!
//! Status invariants enforced here:
//! - `author_id` / `book_id` / `processed_at` are written together with
//!   `status = 'mongo'` and never otherwise, never cleared
//! - transitions are monotonic; the promotion write is guarded by
//!   `WHERE status != 'mongo'` so it lands at most once

use crate::types::{CacheEntry, CacheStatus, MatchPhase, Section};
use chrono::{DateTime, Utc};
use lmlp_common::{uuid_utils, Error, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

const COLUMNS: &str = "id, episode_id, avis_critique_id, natural_key, section, \
     author_text, title_text, publisher_text, critic_text, note, row_index, \
     status, suggested_author, suggested_title, match_phase, \
     author_id, book_id, processed_at, created_at, updated_at";

/// Insert the entry unless its natural key already exists; return the stored
/// row either way.
pub async fn upsert(pool: &SqlitePool, entry: &CacheEntry) -> Result<CacheEntry> {
    sqlx::query(
        r#"
        INSERT INTO cache_entries (
            id, episode_id, avis_critique_id, natural_key, section,
            author_text, title_text, publisher_text, critic_text, note, row_index,
            status, suggested_author, suggested_title, match_phase,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(episode_id, natural_key) DO NOTHING
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.episode_id.to_string())
    .bind(entry.avis_critique_id.to_string())
    .bind(&entry.natural_key)
    .bind(entry.section.as_str())
    .bind(&entry.author_text)
    .bind(&entry.title_text)
    .bind(&entry.publisher_text)
    .bind(&entry.critic_text)
    .bind(entry.note)
    .bind(entry.row_index)
    .bind(entry.status.as_str())
    .bind(&entry.suggested_author)
    .bind(&entry.suggested_title)
    .bind(entry.match_phase.map(|p| p.as_str()))
    .execute(pool)
    .await?;

    find_by_natural_key(pool, entry.episode_id, &entry.natural_key)
        .await?
        .ok_or_else(|| Error::Internal(format!("Cache upsert lost its row: {}", entry.natural_key)))
}

/// Load an entry by id
pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<CacheEntry>> {
    let sql = format!("SELECT {} FROM cache_entries WHERE id = ?", COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|r| from_row(&r)).transpose()
}

/// Load an entry by its natural key within an episode
pub async fn find_by_natural_key(
    pool: &SqlitePool,
    episode_id: Uuid,
    natural_key: &str,
) -> Result<Option<CacheEntry>> {
    let sql = format!(
        "SELECT {} FROM cache_entries WHERE episode_id = ? AND natural_key = ?",
        COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(episode_id.to_string())
        .bind(natural_key)
        .fetch_optional(pool)
        .await?;

    row.map(|r| from_row(&r)).transpose()
}

/// List entries, optionally filtered by episode and/or status.
///
/// Drives the review queues (`status = suggested`/`not_found`) and the batch
/// auto-promotion sweep (`status = verified`). Ordered by episode then source
/// row order.
pub async fn list(
    pool: &SqlitePool,
    episode_id: Option<Uuid>,
    status: Option<&str>,
) -> Result<Vec<CacheEntry>> {
    let mut sql = format!("SELECT {} FROM cache_entries WHERE 1=1", COLUMNS);
    if episode_id.is_some() {
        sql.push_str(" AND episode_id = ?");
    }
    if status.is_some() {
        sql.push_str(" AND status = ?");
    }
    sql.push_str(" ORDER BY episode_id, row_index");

    let mut query = sqlx::query(&sql);
    if let Some(ep) = episode_id {
        query = query.bind(ep.to_string());
    }
    if let Some(st) = status {
        query = query.bind(st.to_string());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(from_row).collect()
}

/// Apply a human validation: overwrite the suggestion text with the user's
/// corrections and move the entry to `verified`.
///
/// Rejected with `Error::Conflict` when the entry is already promoted, since
/// `mongo` is terminal. The UPDATE itself carries the same
/// `status != 'mongo'` guard as the promotion write, so a promotion landing
/// between the status read and the write cannot be rolled back to
/// `verified`.
pub async fn set_validated(
    pool: &SqlitePool,
    id: Uuid,
    corrected_author: &str,
    corrected_title: &str,
    corrected_publisher: Option<&str>,
) -> Result<CacheEntry> {
    let entry = get(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Cache entry not found: {}", id)))?;

    if !entry.status.can_transition_to(&CacheStatus::Verified) {
        return Err(Error::Conflict(format!(
            "Cache entry {} is {} and cannot be re-validated",
            id,
            entry.status.as_str()
        )));
    }

    let rows = apply_validation(pool, id, corrected_author, corrected_title, corrected_publisher)
        .await?;
    if rows == 0 {
        return Err(Error::Conflict(format!(
            "Cache entry {} was promoted concurrently and cannot be re-validated",
            id
        )));
    }

    get(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("Cache entry vanished during validation: {}", id)))
}

/// Guarded validation write; returns the number of rows updated (zero when
/// the entry is already `mongo`).
async fn apply_validation(
    pool: &SqlitePool,
    id: Uuid,
    corrected_author: &str,
    corrected_title: &str,
    corrected_publisher: Option<&str>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE cache_entries
        SET status = 'verified',
            suggested_author = ?,
            suggested_title = ?,
            publisher_text = COALESCE(?, publisher_text),
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND status != 'mongo'
        "#,
    )
    .bind(corrected_author.trim())
    .bind(corrected_title.trim())
    .bind(corrected_publisher.map(str::trim))
    .bind(id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Terminal promotion write: set `status = 'mongo'` together with the
/// canonical back-references.
///
/// Guarded by `status != 'mongo'`: returns `false` (zero rows) when another
/// promotion already landed, which the caller treats as a conflict and rolls
/// back on.
pub async fn mark_promoted(
    conn: &mut SqliteConnection,
    id: Uuid,
    author_id: Uuid,
    book_id: Uuid,
    processed_at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE cache_entries
        SET status = 'mongo',
            author_id = ?,
            book_id = ?,
            processed_at = ?,
            updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND status != 'mongo'
        "#,
    )
    .bind(author_id.to_string())
    .bind(book_id.to_string())
    .bind(processed_at.to_rfc3339())
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CacheEntry> {
    let id_str: String = row.get("id");
    let episode_str: String = row.get("episode_id");
    let avis_str: String = row.get("avis_critique_id");
    let section_str: String = row.get("section");
    let status_str: String = row.get("status");
    let phase_str: Option<String> = row.get("match_phase");

    let section = Section::parse(&section_str)
        .ok_or_else(|| Error::Internal(format!("Invalid section in database: {}", section_str)))?;

    let status = match status_str.as_str() {
        "not_found" => CacheStatus::NotFound,
        "suggested" => CacheStatus::Suggested,
        "verified" => CacheStatus::Verified,
        "mongo" => {
            let author_id: Option<String> = row.get("author_id");
            let book_id: Option<String> = row.get("book_id");
            let processed_at: Option<String> = row.get("processed_at");
            match (author_id, book_id, processed_at) {
                (Some(a), Some(b), Some(p)) => CacheStatus::Mongo {
                    author_id: uuid_utils::parse_db(&a)?,
                    book_id: uuid_utils::parse_db(&b)?,
                    processed_at: DateTime::parse_from_rfc3339(&p)
                        .map_err(|e| Error::Internal(format!("Invalid processed_at: {}", e)))?
                        .with_timezone(&Utc),
                },
                _ => {
                    return Err(Error::Internal(format!(
                        "Promoted cache entry {} missing canonical back-references",
                        id_str
                    )))
                }
            }
        }
        other => {
            return Err(Error::Internal(format!("Invalid status in database: {}", other)));
        }
    };

    Ok(CacheEntry {
        id: uuid_utils::parse_db(&id_str)?,
        episode_id: uuid_utils::parse_db(&episode_str)?,
        avis_critique_id: uuid_utils::parse_db(&avis_str)?,
        natural_key: row.get("natural_key"),
        section,
        author_text: row.get("author_text"),
        title_text: row.get("title_text"),
        publisher_text: row.get("publisher_text"),
        critic_text: row.get("critic_text"),
        note: row.get("note"),
        row_index: row.get("row_index"),
        status,
        suggested_author: row.get("suggested_author"),
        suggested_title: row.get("suggested_title"),
        match_phase: phase_str.as_deref().and_then(MatchPhase::parse),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::Mention;

    fn sample_entry(episode_id: Uuid, status: CacheStatus) -> CacheEntry {
        let mention = Mention {
            episode_id,
            section: Section::Programme,
            author_text: "Pascal Quignard".to_string(),
            title_text: "Trésors Cachés".to_string(),
            publisher_text: "Albin Michel".to_string(),
            critic_text: "Arnaud Viviant".to_string(),
            note: Some(7.0),
            row_index: 0,
        };
        CacheEntry::from_mention(&mention, Uuid::new_v4(), status, None, None, None)
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let pool = test_pool().await;
        let episode = Uuid::new_v4();

        let first = upsert(&pool, &sample_entry(episode, CacheStatus::NotFound)).await.unwrap();
        // Second extraction of the same row: different candidate id, same key
        let second = upsert(&pool, &sample_entry(episode, CacheStatus::Suggested)).await.unwrap();

        assert_eq!(first.id, second.id);
        // DO NOTHING keeps the original row untouched
        assert_eq!(second.status, CacheStatus::NotFound);

        let all = list(&pool, Some(episode), None).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let pool = test_pool().await;
        let ep1 = Uuid::new_v4();
        let ep2 = Uuid::new_v4();

        upsert(&pool, &sample_entry(ep1, CacheStatus::NotFound)).await.unwrap();
        upsert(&pool, &sample_entry(ep2, CacheStatus::Verified)).await.unwrap();

        assert_eq!(list(&pool, Some(ep1), None).await.unwrap().len(), 1);
        assert_eq!(list(&pool, None, Some("verified")).await.unwrap().len(), 1);
        assert_eq!(list(&pool, Some(ep1), Some("verified")).await.unwrap().len(), 0);
        assert_eq!(list(&pool, None, None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_validated_moves_to_verified() {
        let pool = test_pool().await;
        let entry = upsert(&pool, &sample_entry(Uuid::new_v4(), CacheStatus::NotFound))
            .await
            .unwrap();

        let updated = set_validated(&pool, entry.id, "Pascal Quignard", "Trésor caché", Some("Albin Michel"))
            .await
            .unwrap();

        assert_eq!(updated.status, CacheStatus::Verified);
        assert_eq!(updated.suggested_author.as_deref(), Some("Pascal Quignard"));
        assert_eq!(updated.suggested_title.as_deref(), Some("Trésor caché"));
        assert_eq!(updated.publisher_text, "Albin Michel");
    }

    #[tokio::test]
    async fn test_mark_promoted_at_most_once() {
        let pool = test_pool().await;
        let entry = upsert(&pool, &sample_entry(Uuid::new_v4(), CacheStatus::Verified))
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let author_id = Uuid::new_v4();
        let book_id = Uuid::new_v4();

        let first = mark_promoted(&mut conn, entry.id, author_id, book_id, Utc::now())
            .await
            .unwrap();
        assert!(first);

        let second = mark_promoted(&mut conn, entry.id, author_id, book_id, Utc::now())
            .await
            .unwrap();
        assert!(!second, "second promotion write must not land");

        let loaded = get(&pool, entry.id).await.unwrap().unwrap();
        match loaded.status {
            CacheStatus::Mongo { author_id: a, book_id: b, .. } => {
                assert_eq!(a, author_id);
                assert_eq!(b, book_id);
            }
            other => panic!("expected mongo status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_validation_write_skips_promoted_row() {
        // Simulates a promotion landing after set_validated's status read:
        // the guarded write itself must refuse to touch a mongo row.
        let pool = test_pool().await;
        let entry = upsert(&pool, &sample_entry(Uuid::new_v4(), CacheStatus::Verified))
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        mark_promoted(&mut conn, entry.id, Uuid::new_v4(), Uuid::new_v4(), Utc::now())
            .await
            .unwrap();

        let rows = apply_validation(&pool, entry.id, "Pascal Quignard", "Trésor caché", None)
            .await
            .unwrap();
        assert_eq!(rows, 0, "guarded update must not touch a promoted row");

        let loaded = get(&pool, entry.id).await.unwrap().unwrap();
        assert!(matches!(loaded.status, CacheStatus::Mongo { .. }));
    }

    #[tokio::test]
    async fn test_validate_promoted_entry_rejected() {
        let pool = test_pool().await;
        let entry = upsert(&pool, &sample_entry(Uuid::new_v4(), CacheStatus::Verified))
            .await
            .unwrap();
        let mut conn = pool.acquire().await.unwrap();
        mark_promoted(&mut conn, entry.id, Uuid::new_v4(), Uuid::new_v4(), Utc::now())
            .await
            .unwrap();

        let result = set_validated(&pool, entry.id, "A", "B", None).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }
}
