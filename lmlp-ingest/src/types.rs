//! Core types for the LMLP ingest pipeline
//!
//! Defines the data flowing through the three stages:
//! - **Extraction:** `Mention` (one table row of a summary)
//! - **Resolution:** `MatchPhase` / `MatchResult` (phase chain output)
//! - **Validation:** `CacheStatus` / `CacheEntry` (durable per-mention state)
//!
//! `CacheStatus` is a closed tagged variant: the canonical `author_id` /
//! `book_id` / `processed_at` fields are structurally reachable only in the
//! `Mongo` state, so callers cannot read them without having checked the
//! status first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lmlp_common::normalize;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Mention (ephemeral extraction output)
// ============================================================================

/// Summary section a mention was extracted from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Books discussed in the programme proper
    Programme,
    /// Critics' personal picks ("coups de cœur")
    CoupDeCoeur,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Programme => "programme",
            Section::CoupDeCoeur => "coup_de_coeur",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "programme" => Some(Section::Programme),
            "coup_de_coeur" => Some(Section::CoupDeCoeur),
            _ => None,
        }
    }
}

/// One book/author/critic reference extracted from a single table row.
///
/// Ephemeral: carries no identity of its own. Its natural key pairs with the
/// episode id to locate the corresponding [`CacheEntry`].
#[derive(Debug, Clone, PartialEq)]
pub struct Mention {
    pub episode_id: Uuid,
    pub section: Section,
    pub author_text: String,
    pub title_text: String,
    pub publisher_text: String,
    pub critic_text: String,
    /// Review score in [0, 10], when one was present in the row
    pub note: Option<f64>,
    /// Source row order within the summary (ascending)
    pub row_index: i64,
}

impl Mention {
    /// Whether the row carries a usable book reference (author or title text)
    pub fn has_book_text(&self) -> bool {
        !self.author_text.is_empty() || !self.title_text.is_empty()
    }

    /// Whether the row carries critic text
    pub fn has_critic_text(&self) -> bool {
        !self.critic_text.is_empty()
    }

    /// Natural key identifying this mention within its episode.
    ///
    /// Book rows key on normalized author + title; critic-only rows key on
    /// the critic name. Re-extraction of an unchanged summary reproduces the
    /// same key, which is what makes the cache upsert idempotent.
    pub fn natural_key(&self) -> String {
        if self.has_book_text() {
            format!("{}|{}", normalize(&self.author_text), normalize(&self.title_text))
        } else {
            format!("critic:{}", normalize(&self.critic_text))
        }
    }
}

// ============================================================================
// Match result (ephemeral resolution output)
// ============================================================================

/// One strategy in the ordered resolution chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    /// Phase 1: normalized title and author both equal canonical values
    Exact,
    /// Phase 2: title containment (subtitle truncation), author exact
    Containment,
    /// Phase 3: fuzzy title with mandatory secondary-attribute corroboration
    Fuzzy,
    /// Phase 4: critic matched by exact name or declared variant
    Critic,
}

impl MatchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPhase::Exact => "exact",
            MatchPhase::Containment => "containment",
            MatchPhase::Fuzzy => "fuzzy",
            MatchPhase::Critic => "critic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(MatchPhase::Exact),
            "containment" => Some(MatchPhase::Containment),
            "fuzzy" => Some(MatchPhase::Fuzzy),
            "critic" => Some(MatchPhase::Critic),
            _ => None,
        }
    }

    /// Phase ordinal (1-4) for logs and diagnostics
    pub fn number(&self) -> u8 {
        match self {
            MatchPhase::Exact => 1,
            MatchPhase::Containment => 2,
            MatchPhase::Fuzzy => 3,
            MatchPhase::Critic => 4,
        }
    }
}

/// Resolution outcome for one mention
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Canonical entity bound by the accepting phase (book for phases 1-3,
    /// critic for phase 4); None when every phase fell through
    pub matched_entity_id: Option<Uuid>,
    /// Accepting phase; None means unmatched
    pub phase: Option<MatchPhase>,
    /// Confidence in [0, 1]; 0.0 when unmatched
    pub confidence: f64,
}

impl MatchResult {
    pub fn unmatched() -> Self {
        Self {
            matched_entity_id: None,
            phase: None,
            confidence: 0.0,
        }
    }

    /// Initial cache status derived from the accepting phase.
    ///
    /// Exact matches are trusted enough to skip human review; every other
    /// phase produces a suggestion; unmatched mentions wait for corrected
    /// text.
    pub fn initial_status(&self) -> CacheStatus {
        match self.phase {
            Some(MatchPhase::Exact) => CacheStatus::Verified,
            Some(_) => CacheStatus::Suggested,
            None => CacheStatus::NotFound,
        }
    }
}

// ============================================================================
// Cache entry (durable validation state)
// ============================================================================

/// Validation state of a cache entry.
///
/// Transitions are monotonic: `{NotFound | Suggested | Verified} → Mongo`,
/// never backward. `Mongo` is terminal and the only state carrying canonical
/// back-references.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheStatus {
    /// No phase matched and no human correction yet
    NotFound,
    /// A resolver phase produced a suggestion awaiting human review
    Suggested,
    /// Accepted (exact match or human validation); eligible for promotion
    Verified,
    /// Promoted into canonical storage (terminal)
    Mongo {
        author_id: Uuid,
        book_id: Uuid,
        processed_at: DateTime<Utc>,
    },
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::NotFound => "not_found",
            CacheStatus::Suggested => "suggested",
            CacheStatus::Verified => "verified",
            CacheStatus::Mongo { .. } => "mongo",
        }
    }

    /// Ordering rank used for the monotonicity check
    pub fn rank(&self) -> u8 {
        match self {
            CacheStatus::NotFound => 0,
            CacheStatus::Suggested => 1,
            CacheStatus::Verified => 2,
            CacheStatus::Mongo { .. } => 3,
        }
    }

    /// Whether a transition to `next` is permitted.
    ///
    /// Same-rank rewrites are allowed for the pre-promotion states (a human
    /// may re-correct a verified entry); `Mongo` accepts nothing.
    pub fn can_transition_to(&self, next: &CacheStatus) -> bool {
        match self {
            CacheStatus::Mongo { .. } => false,
            _ => next.rank() >= self.rank(),
        }
    }
}

/// Durable record tracking one mention's resolution and validation status.
///
/// Exactly one entry exists per `(episode_id, natural_key)`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub id: Uuid,
    pub episode_id: Uuid,
    pub avis_critique_id: Uuid,
    pub natural_key: String,
    pub section: Section,
    pub author_text: String,
    pub title_text: String,
    pub publisher_text: String,
    pub critic_text: String,
    pub note: Option<f64>,
    pub row_index: i64,
    pub status: CacheStatus,
    /// Resolver- or human-supplied author correction
    pub suggested_author: Option<String>,
    /// Resolver- or human-supplied title correction
    pub suggested_title: Option<String>,
    /// Phase that produced the initial suggestion, if any
    pub match_phase: Option<MatchPhase>,
    pub created_at: String,
    pub updated_at: String,
}

impl CacheEntry {
    /// Build the initial entry for a freshly extracted mention
    pub fn from_mention(
        mention: &Mention,
        avis_critique_id: Uuid,
        status: CacheStatus,
        suggested_author: Option<String>,
        suggested_title: Option<String>,
        match_phase: Option<MatchPhase>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            episode_id: mention.episode_id,
            avis_critique_id,
            natural_key: mention.natural_key(),
            section: mention.section,
            author_text: mention.author_text.clone(),
            title_text: mention.title_text.clone(),
            publisher_text: mention.publisher_text.clone(),
            critic_text: mention.critic_text.clone(),
            note: mention.note,
            row_index: mention.row_index,
            status,
            suggested_author,
            suggested_title,
            match_phase,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    /// Author name to use at promotion time: human/resolver correction first,
    /// extracted text as fallback
    pub fn effective_author(&self) -> &str {
        match self.suggested_author.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => &self.author_text,
        }
    }

    /// Title to use at promotion time
    pub fn effective_title(&self) -> &str {
        match self.suggested_title.as_deref() {
            Some(s) if !s.trim().is_empty() => s,
            _ => &self.title_text,
        }
    }
}

// ============================================================================
// Bibliographic verification seam
// ============================================================================

/// Suggestion returned by an external bibliographic verifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BiblioSuggestion {
    pub suggested_title: Option<String>,
    pub suggested_author: Option<String>,
    pub suggested_publisher: Option<String>,
    pub external_ref_url: Option<String>,
    /// Verifier confidence (0.0-1.0)
    pub confidence: f64,
}

/// External bibliographic verification.
///
/// Network implementations (catalog lookups, scraping, rate limiting) live
/// outside this crate; promotion consumes suggestions through this seam only.
#[async_trait]
pub trait BibliographicVerifier: Send + Sync {
    /// Verifier name for provenance logging
    fn name(&self) -> &'static str;

    /// Look up a title/author pair.
    ///
    /// `Ok(None)` means "nothing found"; errors are treated by the caller as
    /// a degraded lookup, never as a promotion failure.
    async fn verify(&self, title: &str, author: &str) -> anyhow::Result<Option<BiblioSuggestion>>;
}

/// Verifier that never suggests anything (default wiring)
pub struct NoopVerifier;

#[async_trait]
impl BibliographicVerifier for NoopVerifier {
    fn name(&self) -> &'static str {
        "Noop"
    }

    async fn verify(&self, _title: &str, _author: &str) -> anyhow::Result<Option<BiblioSuggestion>> {
        Ok(None)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn mention(author: &str, title: &str, critic: &str) -> Mention {
        Mention {
            episode_id: Uuid::new_v4(),
            section: Section::Programme,
            author_text: author.to_string(),
            title_text: title.to_string(),
            publisher_text: String::new(),
            critic_text: critic.to_string(),
            note: None,
            row_index: 0,
        }
    }

    #[test]
    fn test_natural_key_book_row() {
        let m = mention("Pascal Quignard", "Trésors Cachés", "");
        assert_eq!(m.natural_key(), "pascal quignard|tresors caches");
    }

    #[test]
    fn test_natural_key_critic_only_row() {
        let m = mention("", "", "Hubert Arthus");
        assert_eq!(m.natural_key(), "critic:hubert arthus");
    }

    #[test]
    fn test_natural_key_stable_across_decoration() {
        let a = mention("Pascal Quignard", "Trésors Cachés", "");
        let b = mention("  pascal QUIGNARD ", "trésors   cachés", "");
        assert_eq!(a.natural_key(), b.natural_key());
    }

    #[test]
    fn test_initial_status_from_phase() {
        let exact = MatchResult {
            matched_entity_id: Some(Uuid::new_v4()),
            phase: Some(MatchPhase::Exact),
            confidence: 1.0,
        };
        assert_eq!(exact.initial_status(), CacheStatus::Verified);

        let fuzzy = MatchResult {
            phase: Some(MatchPhase::Fuzzy),
            ..exact.clone()
        };
        assert_eq!(fuzzy.initial_status(), CacheStatus::Suggested);

        assert_eq!(MatchResult::unmatched().initial_status(), CacheStatus::NotFound);
    }

    #[test]
    fn test_status_monotonicity() {
        let mongo = CacheStatus::Mongo {
            author_id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            processed_at: Utc::now(),
        };

        assert!(CacheStatus::NotFound.can_transition_to(&CacheStatus::Verified));
        assert!(CacheStatus::Suggested.can_transition_to(&CacheStatus::Verified));
        assert!(CacheStatus::Verified.can_transition_to(&mongo));
        // Re-correction of a verified entry stays allowed
        assert!(CacheStatus::Verified.can_transition_to(&CacheStatus::Verified));

        // Never backward
        assert!(!CacheStatus::Verified.can_transition_to(&CacheStatus::Suggested));
        assert!(!mongo.can_transition_to(&CacheStatus::Verified));
        assert!(!mongo.can_transition_to(&CacheStatus::NotFound));
    }

    #[test]
    fn test_effective_text_prefers_correction() {
        let m = mention("Claud McKai", "Harlem", "");
        let mut entry = CacheEntry::from_mention(
            &m,
            Uuid::new_v4(),
            CacheStatus::Suggested,
            Some("Claude McKay".to_string()),
            None,
            Some(MatchPhase::Fuzzy),
        );
        assert_eq!(entry.effective_author(), "Claude McKay");
        assert_eq!(entry.effective_title(), "Harlem");

        entry.suggested_author = Some("   ".to_string());
        assert_eq!(entry.effective_author(), "Claud McKai");
    }
}
