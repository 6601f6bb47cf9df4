//! Canonical author store

use lmlp_common::{normalize, uuid_utils, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Canonical author record
#[derive(Debug, Clone)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
    pub name_key: String,
}

/// Get or create an author by display name, keyed on the normalized name.
///
/// Idempotent: repeated calls with spelling variants of the same normalized
/// name return the same record. Safe under concurrent callers thanks to the
/// `ON CONFLICT DO NOTHING` insert followed by a re-read.
pub async fn get_or_create(conn: &mut SqliteConnection, name: &str) -> Result<Author> {
    let name_key = normalize(name);

    if let Some(existing) = find_by_key(conn, &name_key).await? {
        return Ok(existing);
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO authors (id, name, name_key, created_at, updated_at)
        VALUES (?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(name_key) DO NOTHING
        "#,
    )
    .bind(id.to_string())
    .bind(name.trim())
    .bind(&name_key)
    .execute(&mut *conn)
    .await?;

    // Re-read: either our row or the one a concurrent writer won with
    find_by_key(conn, &name_key).await?.ok_or_else(|| {
        lmlp_common::Error::Internal(format!("Author upsert lost its row: {}", name_key))
    })
}

/// Find an author by normalized name key
pub async fn find_by_key(conn: &mut SqliteConnection, name_key: &str) -> Result<Option<Author>> {
    let row = sqlx::query("SELECT id, name, name_key FROM authors WHERE name_key = ?")
        .bind(name_key)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|r| from_row(&r)).transpose()
}

/// Load all authors (reference index snapshot)
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Author>> {
    let rows = sqlx::query("SELECT id, name, name_key FROM authors ORDER BY name_key")
        .fetch_all(pool)
        .await?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Author> {
    let id_str: String = row.get("id");
    Ok(Author {
        id: uuid_utils::parse_db(&id_str)?,
        name: row.get("name"),
        name_key: row.get("name_key"),
    })
}
