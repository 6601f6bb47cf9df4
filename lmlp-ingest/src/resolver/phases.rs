//! Resolution phases
//!
//! Each phase implements [`ResolutionPhase`] so the chain stays an explicit,
//! ordered, reorderable list and every heuristic is unit-testable on its own.
//! Phases 1-3 bind book/author pairs; phase 4 binds critics.

use crate::resolver::reference_index::{IndexedBook, ReferenceIndex};
use crate::types::{MatchPhase, Mention};
use lmlp_common::{normalize, MatchingConfig, SecondaryAttribute};
use std::collections::HashSet;
use uuid::Uuid;

/// Accepted candidate from one phase
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseMatch {
    pub entity_id: Uuid,
    pub confidence: f64,
}

/// One strategy in the ordered resolution chain
pub trait ResolutionPhase: Send + Sync {
    /// Phase name for logs
    fn name(&self) -> &'static str;

    /// Which chain slot this phase reports as
    fn phase(&self) -> MatchPhase;

    /// Attempt to bind `mention` to a canonical entity.
    ///
    /// `claimed` holds book ids already bound by earlier mentions of the
    /// same batch; phases use it as an availability tie-break, never as a
    /// hard filter.
    fn attempt(
        &self,
        mention: &Mention,
        index: &ReferenceIndex,
        claimed: &HashSet<Uuid>,
        policy: &MatchingConfig,
    ) -> Option<PhaseMatch>;
}

// ============================================================================
// Phase 1: exact title + author
// ============================================================================

/// Normalized title AND normalized author both equal the canonical values
pub struct ExactPhase;

impl ResolutionPhase for ExactPhase {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn phase(&self) -> MatchPhase {
        MatchPhase::Exact
    }

    fn attempt(
        &self,
        mention: &Mention,
        index: &ReferenceIndex,
        claimed: &HashSet<Uuid>,
        _policy: &MatchingConfig,
    ) -> Option<PhaseMatch> {
        let title_key = normalize(&mention.title_text);
        let author_key = normalize(&mention.author_text);
        if title_key.is_empty() || author_key.is_empty() {
            return None;
        }

        let mut candidates: Vec<&IndexedBook> = index
            .books()
            .iter()
            .filter(|b| b.title_key == title_key && b.author_key == author_key)
            .collect();

        candidates.sort_by_key(|b| claimed.contains(&b.id));
        candidates.first().map(|b| PhaseMatch {
            entity_id: b.id,
            confidence: 1.0,
        })
    }
}

// ============================================================================
// Phase 2: title containment
// ============================================================================

/// Mention title is a substring (or superset) of the canonical title and the
/// author matches exactly. Handles subtitle truncation such as
/// "Les Particules" → "Les Particules élémentaires".
pub struct ContainmentPhase;

impl ResolutionPhase for ContainmentPhase {
    fn name(&self) -> &'static str {
        "containment"
    }

    fn phase(&self) -> MatchPhase {
        MatchPhase::Containment
    }

    fn attempt(
        &self,
        mention: &Mention,
        index: &ReferenceIndex,
        claimed: &HashSet<Uuid>,
        policy: &MatchingConfig,
    ) -> Option<PhaseMatch> {
        let title_key = normalize(&mention.title_text);
        let author_key = normalize(&mention.author_text);
        if author_key.is_empty() || title_key.chars().count() < policy.min_containment_chars {
            return None;
        }

        let mut candidates: Vec<&IndexedBook> = index
            .books()
            .iter()
            .filter(|b| {
                b.author_key == author_key
                    && b.title_key.chars().count() >= policy.min_containment_chars
                    && (b.title_key.contains(&title_key) || title_key.contains(&b.title_key))
            })
            .collect();

        // Prefer unclaimed candidates, then the largest title overlap
        candidates.sort_by(|a, b| {
            claimed
                .contains(&a.id)
                .cmp(&claimed.contains(&b.id))
                .then_with(|| {
                    overlap(&b.title_key, &title_key).cmp(&overlap(&a.title_key, &title_key))
                })
        });

        candidates.first().map(|b| PhaseMatch {
            entity_id: b.id,
            confidence: 0.9,
        })
    }
}

fn overlap(a: &str, b: &str) -> usize {
    a.chars().count().min(b.chars().count())
}

// ============================================================================
// Phase 3: fuzzy title with cross-validation
// ============================================================================

/// Jaro-Winkler (or relaxed-equality) title match that MUST be corroborated
/// by at least one secondary attribute.
///
/// The corroboration requirement is the guard against collisions between
/// similarly spelled but unrelated works: a title-only hit whose author and
/// publisher both fail the secondary threshold falls through instead of
/// binding.
pub struct FuzzyPhase;

struct FuzzyCandidate {
    entity_id: Uuid,
    score: f64,
    author_exact: bool,
    publisher_exact: bool,
}

impl ResolutionPhase for FuzzyPhase {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    fn phase(&self) -> MatchPhase {
        MatchPhase::Fuzzy
    }

    fn attempt(
        &self,
        mention: &Mention,
        index: &ReferenceIndex,
        claimed: &HashSet<Uuid>,
        policy: &MatchingConfig,
    ) -> Option<PhaseMatch> {
        let title_key = normalize(&mention.title_text);
        let author_key = normalize(&mention.author_text);
        let publisher_key = normalize(&mention.publisher_text);
        if title_key.is_empty() {
            return None;
        }

        let mut candidates: Vec<FuzzyCandidate> = Vec::new();

        for book in index.books() {
            let title_sim = strsim::jaro_winkler(&title_key, &book.title_key);
            let title_ok =
                title_sim >= policy.title_threshold || relaxed_eq(&title_key, &book.title_key);
            if !title_ok {
                continue;
            }

            let author_exact = !author_key.is_empty() && author_key == book.author_key;
            let author_sim = if author_key.is_empty() || book.author_key.is_empty() {
                0.0
            } else {
                strsim::jaro_winkler(&author_key, &book.author_key)
            };
            let author_ok = author_exact || author_sim >= policy.secondary_threshold;

            let publisher_exact = !publisher_key.is_empty() && publisher_key == book.publisher_key;
            let publisher_sim = if publisher_key.is_empty() || book.publisher_key.is_empty() {
                0.0
            } else {
                strsim::jaro_winkler(&publisher_key, &book.publisher_key)
            };
            let publisher_ok = publisher_exact || publisher_sim >= policy.secondary_threshold;

            // Cross-validation: at least one secondary attribute must back
            // the title hit, otherwise the candidate is rejected outright.
            if !author_ok && !publisher_ok {
                continue;
            }

            let score = title_sim * 0.5 + author_sim * 0.3 + publisher_sim * 0.2;
            candidates.push(FuzzyCandidate {
                entity_id: book.id,
                score,
                author_exact,
                publisher_exact,
            });
        }

        // Tie-break order: exact hit on the authoritative secondary first,
        // then availability (not yet claimed in this batch), then score.
        candidates.sort_by(|a, b| {
            let (a_auth, b_auth) = match policy.authoritative_secondary {
                SecondaryAttribute::Author => (a.author_exact, b.author_exact),
                SecondaryAttribute::Publisher => (a.publisher_exact, b.publisher_exact),
            };
            b_auth
                .cmp(&a_auth)
                .then_with(|| claimed.contains(&a.entity_id).cmp(&claimed.contains(&b.entity_id)))
                .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
        });

        candidates.first().map(|c| PhaseMatch {
            entity_id: c.entity_id,
            confidence: c.score.clamp(0.0, 1.0),
        })
    }
}

/// Relaxed title equality: ignore punctuation and trailing plural 's' on
/// tokens of three letters or more.
fn relaxed_eq(a: &str, b: &str) -> bool {
    simplify(a) == simplify(b)
}

fn simplify(key: &str) -> String {
    let alnum: String = key
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    alnum
        .split_whitespace()
        .map(|token| {
            if token.len() > 3 {
                token.strip_suffix('s').unwrap_or(token)
            } else {
                token
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// Phase 4: critic fallback
// ============================================================================

/// Critics are matched independently by exact normalized name or any
/// declared variant; runs only when the book phases all fell through.
pub struct CriticPhase;

impl ResolutionPhase for CriticPhase {
    fn name(&self) -> &'static str {
        "critic"
    }

    fn phase(&self) -> MatchPhase {
        MatchPhase::Critic
    }

    fn attempt(
        &self,
        mention: &Mention,
        index: &ReferenceIndex,
        _claimed: &HashSet<Uuid>,
        _policy: &MatchingConfig,
    ) -> Option<PhaseMatch> {
        if !mention.has_critic_text() {
            return None;
        }
        let critic_key = normalize(&mention.critic_text);

        index
            .critics()
            .iter()
            .find(|c| c.name_key == critic_key || c.variant_keys.contains(&critic_key))
            .map(|c| PhaseMatch {
                entity_id: c.id,
                confidence: 0.8,
            })
    }
}
