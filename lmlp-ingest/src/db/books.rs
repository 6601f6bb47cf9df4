//! Canonical book store
//!
//! Books carry two reference sets (episode ids and avis-critique ids) stored
//! as JSON arrays in TEXT columns. All mutations of those sets go through
//! [`add_references`], which performs a deduplicating set-union; nothing ever
//! overwrites references added by an unrelated merge.

use lmlp_common::{normalize, uuid_utils, Error, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Canonical book record
#[derive(Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub title_key: String,
    pub author_id: Uuid,
    pub publisher: String,
    pub external_url: Option<String>,
    /// Episode ids referencing this book (deduplicated)
    pub episodes: Vec<Uuid>,
    /// Avis-critique ids referencing this book (deduplicated)
    pub avis: Vec<Uuid>,
}

/// Get or create a book by `(normalized title, author_id)`.
///
/// Idempotent; the publisher is only written on first creation and is never
/// clobbered by a later get-or-create with different publisher text
/// (corrections go through [`set_publisher`]).
pub async fn get_or_create(
    conn: &mut SqliteConnection,
    title: &str,
    author_id: Uuid,
    publisher: &str,
) -> Result<Book> {
    let title_key = normalize(title);

    if let Some(existing) = find_by_key(conn, &title_key, author_id).await? {
        return Ok(existing);
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO books (id, title, title_key, author_id, publisher, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(title_key, author_id) DO NOTHING
        "#,
    )
    .bind(id.to_string())
    .bind(title.trim())
    .bind(&title_key)
    .bind(author_id.to_string())
    .bind(publisher.trim())
    .execute(&mut *conn)
    .await?;

    find_by_key(conn, &title_key, author_id).await?.ok_or_else(|| {
        Error::Internal(format!("Book upsert lost its row: {}", title_key))
    })
}

/// Find a book by normalized title key and author
pub async fn find_by_key(
    conn: &mut SqliteConnection,
    title_key: &str,
    author_id: Uuid,
) -> Result<Option<Book>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, title_key, author_id, publisher, external_url, episodes, avis
        FROM books
        WHERE title_key = ? AND author_id = ?
        "#,
    )
    .bind(title_key)
    .bind(author_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| from_row(&r)).transpose()
}

/// Load a book by id
pub async fn get(pool: &SqlitePool, id: Uuid) -> Result<Option<Book>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, title_key, author_id, publisher, external_url, episodes, avis
        FROM books
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|r| from_row(&r)).transpose()
}

/// Load all books (reference index snapshot)
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Book>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, title_key, author_id, publisher, external_url, episodes, avis
        FROM books
        ORDER BY title_key
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Merge an episode/avis reference pair into the book's sets (set-union).
///
/// Idempotent: already-present ids are not appended again, and ids added by
/// other callers are preserved. The row is only written when the union
/// actually grew.
pub async fn add_references(
    conn: &mut SqliteConnection,
    book_id: Uuid,
    episode_id: Uuid,
    avis_critique_id: Uuid,
) -> Result<()> {
    let row = sqlx::query("SELECT episodes, avis FROM books WHERE id = ?")
        .bind(book_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Book not found: {}", book_id)))?;

    let mut episodes = parse_id_set(row.get("episodes"))?;
    let mut avis = parse_id_set(row.get("avis"))?;

    let mut grew = false;
    if !episodes.contains(&episode_id) {
        episodes.push(episode_id);
        grew = true;
    }
    if !avis.contains(&avis_critique_id) {
        avis.push(avis_critique_id);
        grew = true;
    }

    if !grew {
        return Ok(());
    }

    sqlx::query(
        "UPDATE books SET episodes = ?, avis = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
    )
    .bind(serialize_id_set(&episodes))
    .bind(serialize_id_set(&avis))
    .bind(book_id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Corrective single-field update of the canonical publisher
pub async fn set_publisher(
    conn: &mut SqliteConnection,
    book_id: Uuid,
    publisher: &str,
) -> Result<()> {
    sqlx::query("UPDATE books SET publisher = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(publisher.trim())
        .bind(book_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Corrective single-field update of the external reference URL
pub async fn set_external_url(
    conn: &mut SqliteConnection,
    book_id: Uuid,
    url: &str,
) -> Result<()> {
    sqlx::query("UPDATE books SET external_url = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(url)
        .bind(book_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Book> {
    let id_str: String = row.get("id");
    let author_id_str: String = row.get("author_id");
    Ok(Book {
        id: uuid_utils::parse_db(&id_str)?,
        title: row.get("title"),
        title_key: row.get("title_key"),
        author_id: uuid_utils::parse_db(&author_id_str)?,
        publisher: row.get("publisher"),
        external_url: row.get("external_url"),
        episodes: parse_id_set(row.get("episodes"))?,
        avis: parse_id_set(row.get("avis"))?,
    })
}

fn parse_id_set(json: String) -> Result<Vec<Uuid>> {
    let raw: Vec<String> = serde_json::from_str(&json)
        .map_err(|e| Error::Internal(format!("Invalid id set in database: {}", e)))?;
    raw.iter().map(|s| uuid_utils::parse_db(s)).collect()
}

fn serialize_id_set(ids: &[Uuid]) -> String {
    let raw: Vec<String> = ids.iter().map(Uuid::to_string).collect();
    serde_json::to_string(&raw).unwrap_or_else(|_| "[]".to_string())
}
