//! Canonical critic store
//!
//! Critics carry a list of accepted name variants (JSON TEXT column) so the
//! critic-fallback phase can match alternative spellings heard on air.

use lmlp_common::{normalize, uuid_utils, Error, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

/// Canonical critic record
#[derive(Debug, Clone)]
pub struct Critic {
    pub id: Uuid,
    pub name: String,
    pub name_key: String,
    /// Accepted alternative spellings (raw text; matched via normalization)
    pub variants: Vec<String>,
}

/// Get or create a critic by display name, keyed on the normalized name
pub async fn get_or_create(conn: &mut SqliteConnection, name: &str) -> Result<Critic> {
    let name_key = normalize(name);

    if let Some(existing) = find_by_key(conn, &name_key).await? {
        return Ok(existing);
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO critics (id, name, name_key, variants, created_at, updated_at)
        VALUES (?, ?, ?, '[]', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(name_key) DO NOTHING
        "#,
    )
    .bind(id.to_string())
    .bind(name.trim())
    .bind(&name_key)
    .execute(&mut *conn)
    .await?;

    find_by_key(conn, &name_key).await?.ok_or_else(|| {
        Error::Internal(format!("Critic upsert lost its row: {}", name_key))
    })
}

/// Register an accepted name variant (set-union, no duplicates)
pub async fn add_variant(conn: &mut SqliteConnection, critic_id: Uuid, variant: &str) -> Result<()> {
    let row = sqlx::query("SELECT variants FROM critics WHERE id = ?")
        .bind(critic_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Critic not found: {}", critic_id)))?;

    let mut variants: Vec<String> = serde_json::from_str(row.get::<String, _>("variants").as_str())
        .map_err(|e| Error::Internal(format!("Invalid variants in database: {}", e)))?;

    let variant_key = normalize(variant);
    if variants.iter().any(|v| normalize(v) == variant_key) {
        return Ok(());
    }
    variants.push(variant.trim().to_string());

    sqlx::query("UPDATE critics SET variants = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
        .bind(serde_json::to_string(&variants).unwrap_or_else(|_| "[]".to_string()))
        .bind(critic_id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Find a critic by normalized name key
pub async fn find_by_key(conn: &mut SqliteConnection, name_key: &str) -> Result<Option<Critic>> {
    let row = sqlx::query("SELECT id, name, name_key, variants FROM critics WHERE name_key = ?")
        .bind(name_key)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(|r| from_row(&r)).transpose()
}

/// Load all critics (reference index snapshot)
pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Critic>> {
    let rows = sqlx::query("SELECT id, name, name_key, variants FROM critics ORDER BY name_key")
        .fetch_all(pool)
        .await?;

    rows.iter().map(from_row).collect()
}

fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Critic> {
    let id_str: String = row.get("id");
    let variants: Vec<String> = serde_json::from_str(row.get::<String, _>("variants").as_str())
        .map_err(|e| Error::Internal(format!("Invalid variants in database: {}", e)))?;
    Ok(Critic {
        id: uuid_utils::parse_db(&id_str)?,
        name: row.get("name"),
        name_key: row.get("name_key"),
        variants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn test_get_or_create_and_variants() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let critic = get_or_create(&mut conn, "Hubert Arthus").await.unwrap();
        add_variant(&mut conn, critic.id, "H. Arthus").await.unwrap();
        // Normalized duplicate is not appended
        add_variant(&mut conn, critic.id, "h. arthus").await.unwrap();

        let loaded = find_by_key(&mut conn, "hubert arthus").await.unwrap().unwrap();
        assert_eq!(loaded.id, critic.id);
        assert_eq!(loaded.variants, vec!["H. Arthus".to_string()]);
    }

    #[tokio::test]
    async fn test_variant_on_missing_critic_rejected() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let result = add_variant(&mut conn, Uuid::new_v4(), "X").await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
