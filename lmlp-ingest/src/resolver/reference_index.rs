//! Reference index snapshot
//!
//! A per-batch, read-only snapshot of the canonical store with every
//! comparison key precomputed. One snapshot is loaded per `resolve_summary`
//! call and shared by all mentions of that batch, so the claimed-set
//! tie-break is computed against a single consistent view.

use crate::db::{authors, books, critics};
use lmlp_common::{normalize, Result};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Canonical book with precomputed matching keys
#[derive(Debug, Clone)]
pub struct IndexedBook {
    pub id: Uuid,
    pub title: String,
    pub title_key: String,
    pub author_id: Uuid,
    pub author_name: String,
    pub author_key: String,
    pub publisher: String,
    pub publisher_key: String,
}

/// Canonical critic with precomputed matching keys
#[derive(Debug, Clone)]
pub struct IndexedCritic {
    pub id: Uuid,
    pub name: String,
    pub name_key: String,
    pub variant_keys: Vec<String>,
}

/// Snapshot of canonical authors/books/critics usable for lookup.
///
/// Pure after construction; [`ReferenceIndex::load`] is the only I/O.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    books: Vec<IndexedBook>,
    critics: Vec<IndexedCritic>,
    author_names: HashMap<Uuid, String>,
}

impl ReferenceIndex {
    /// Build an index from already-loaded canonical records (test seam)
    pub fn from_records(
        author_list: Vec<authors::Author>,
        book_list: Vec<books::Book>,
        critic_list: Vec<critics::Critic>,
    ) -> Self {
        let author_names: HashMap<Uuid, String> =
            author_list.iter().map(|a| (a.id, a.name.clone())).collect();
        let author_keys: HashMap<Uuid, String> =
            author_list.into_iter().map(|a| (a.id, a.name_key)).collect();

        let books = book_list
            .into_iter()
            .map(|b| IndexedBook {
                id: b.id,
                title_key: b.title_key.clone(),
                author_name: author_names.get(&b.author_id).cloned().unwrap_or_default(),
                author_key: author_keys.get(&b.author_id).cloned().unwrap_or_default(),
                publisher_key: normalize(&b.publisher),
                title: b.title,
                author_id: b.author_id,
                publisher: b.publisher,
            })
            .collect();

        let critics = critic_list
            .into_iter()
            .map(|c| IndexedCritic {
                id: c.id,
                name_key: c.name_key.clone(),
                variant_keys: c.variants.iter().map(|v| normalize(v)).collect(),
                name: c.name,
            })
            .collect();

        Self {
            books,
            critics,
            author_names,
        }
    }

    /// Load a fresh snapshot from the canonical store
    pub async fn load(pool: &SqlitePool) -> Result<Self> {
        let author_list = authors::list_all(pool).await?;
        let book_list = books::list_all(pool).await?;
        let critic_list = critics::list_all(pool).await?;

        debug!(
            authors = author_list.len(),
            books = book_list.len(),
            critics = critic_list.len(),
            "Reference index snapshot loaded"
        );

        Ok(Self::from_records(author_list, book_list, critic_list))
    }

    pub fn books(&self) -> &[IndexedBook] {
        &self.books
    }

    pub fn critics(&self) -> &[IndexedCritic] {
        &self.critics
    }

    /// Canonical display name for an author id
    pub fn author_name(&self, author_id: Uuid) -> Option<&str> {
        self.author_names.get(&author_id).map(String::as_str)
    }

    /// Look up an indexed book by id
    pub fn book(&self, book_id: Uuid) -> Option<&IndexedBook> {
        self.books.iter().find(|b| b.id == book_id)
    }

    /// Look up an indexed critic by id
    pub fn critic(&self, critic_id: Uuid) -> Option<&IndexedCritic> {
        self.critics.iter().find(|c| c.id == critic_id)
    }
}
