//! Multi-phase mention resolution
//!
//! Pairs each extracted [`Mention`](crate::types::Mention) with a canonical
//! entity (or "unmatched") by running an ordered chain of increasingly
//! permissive phases; the first phase that accepts wins. The resolver does
//! no I/O and mutates nothing outside the batch-scoped claimed set.

pub mod phases;
pub mod reference_index;

pub use phases::{ContainmentPhase, CriticPhase, ExactPhase, FuzzyPhase, PhaseMatch, ResolutionPhase};
pub use reference_index::{IndexedBook, IndexedCritic, ReferenceIndex};

use crate::types::{MatchPhase, MatchResult, Mention};
use lmlp_common::MatchingConfig;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

/// Ordered phase chain with its matching policy
pub struct MatchResolver {
    phases: Vec<Box<dyn ResolutionPhase>>,
    policy: MatchingConfig,
}

impl MatchResolver {
    /// Standard chain: exact → containment → fuzzy+cross-check → critic
    pub fn new(policy: MatchingConfig) -> Self {
        Self {
            phases: vec![
                Box::new(ExactPhase),
                Box::new(ContainmentPhase),
                Box::new(FuzzyPhase),
                Box::new(CriticPhase),
            ],
            policy,
        }
    }

    /// Custom chain (tests, experimentation with phase order)
    pub fn with_phases(phases: Vec<Box<dyn ResolutionPhase>>, policy: MatchingConfig) -> Self {
        Self { phases, policy }
    }

    pub fn policy(&self) -> &MatchingConfig {
        &self.policy
    }

    /// Resolve one mention against the index snapshot.
    ///
    /// `claimed` is threaded through an entire extraction batch: each
    /// accepted book id is recorded so later mentions of the same batch
    /// deprioritize it during tie-breaks.
    pub fn resolve(
        &self,
        mention: &Mention,
        index: &ReferenceIndex,
        claimed: &mut HashSet<Uuid>,
    ) -> MatchResult {
        for phase in &self.phases {
            if let Some(hit) = phase.attempt(mention, index, claimed, &self.policy) {
                if phase.phase() != MatchPhase::Critic {
                    claimed.insert(hit.entity_id);
                }
                debug!(
                    phase = phase.name(),
                    entity_id = %hit.entity_id,
                    confidence = hit.confidence,
                    row_index = mention.row_index,
                    "Mention resolved"
                );
                return MatchResult {
                    matched_entity_id: Some(hit.entity_id),
                    phase: Some(phase.phase()),
                    confidence: hit.confidence,
                };
            }
        }

        debug!(row_index = mention.row_index, "Mention unmatched in every phase");
        MatchResult::unmatched()
    }
}
