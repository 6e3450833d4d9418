use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::entity::{NamedEntityData, SuggestedEntity};

/// How a resolution was reached, cheapest first.
///
/// Used for cost accounting and tuning only; it never changes an outcome.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionLevel {
    ExactMatch,
    HeuristicMatch,
    EmbeddingMatch,
    LlmVerification,
    LlmBakeoff,
    NoMatch,
}

impl ResolutionLevel {
    /// Get the level name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionLevel::ExactMatch => "EXACT_MATCH",
            ResolutionLevel::HeuristicMatch => "HEURISTIC_MATCH",
            ResolutionLevel::EmbeddingMatch => "EMBEDDING_MATCH",
            ResolutionLevel::LlmVerification => "LLM_VERIFICATION",
            ResolutionLevel::LlmBakeoff => "LLM_BAKEOFF",
            ResolutionLevel::NoMatch => "NO_MATCH",
        }
    }
}

impl std::fmt::Display for ResolutionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of resolving one suggested entity.
///
/// `recommended()` is `None` exactly when the variant is `Vetoed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityResolution {
    /// Nothing matched and the schema allows creation.
    New {
        suggested: SuggestedEntity,
        recommended: NamedEntityData,
    },
    /// Matched a stored entity; `recommended` is `existing` merged with
    /// `suggested`.
    Existing {
        suggested: SuggestedEntity,
        existing: NamedEntityData,
        recommended: NamedEntityData,
        level: ResolutionLevel,
    },
    /// Nothing matched and the schema forbids creating this type.
    Vetoed { suggested: SuggestedEntity },
    /// Matched a stored entity whose type is reference-only; it may be
    /// linked to but is never rewritten.
    ReferenceOnly {
        suggested: SuggestedEntity,
        existing: NamedEntityData,
        level: ResolutionLevel,
    },
}

impl EntityResolution {
    /// A brand-new entity built from the suggestion.
    pub fn new_entity(suggested: SuggestedEntity) -> Self {
        let recommended = NamedEntityData::from_suggested(&suggested);
        EntityResolution::New {
            suggested,
            recommended,
        }
    }

    /// A match against `existing`, recommending a fresh merge.
    pub fn existing(
        suggested: SuggestedEntity,
        existing: NamedEntityData,
        level: ResolutionLevel,
    ) -> Self {
        let recommended = existing.merge_with(&suggested);
        EntityResolution::Existing {
            suggested,
            existing,
            recommended,
            level,
        }
    }

    /// A suggestion rejected by the creation policy.
    pub fn vetoed(suggested: SuggestedEntity) -> Self {
        EntityResolution::Vetoed { suggested }
    }

    /// A match against a reference-only entity.
    pub fn reference_only(
        suggested: SuggestedEntity,
        existing: NamedEntityData,
        level: ResolutionLevel,
    ) -> Self {
        EntityResolution::ReferenceOnly {
            suggested,
            existing,
            level,
        }
    }

    pub fn suggested(&self) -> &SuggestedEntity {
        match self {
            EntityResolution::New { suggested, .. }
            | EntityResolution::Existing { suggested, .. }
            | EntityResolution::Vetoed { suggested }
            | EntityResolution::ReferenceOnly { suggested, .. } => suggested,
        }
    }

    pub fn existing_entity(&self) -> Option<&NamedEntityData> {
        match self {
            EntityResolution::Existing { existing, .. }
            | EntityResolution::ReferenceOnly { existing, .. } => Some(existing),
            EntityResolution::New { .. } | EntityResolution::Vetoed { .. } => None,
        }
    }

    pub fn recommended(&self) -> Option<&NamedEntityData> {
        match self {
            EntityResolution::New { recommended, .. }
            | EntityResolution::Existing { recommended, .. } => Some(recommended),
            EntityResolution::ReferenceOnly { existing, .. } => Some(existing),
            EntityResolution::Vetoed { .. } => None,
        }
    }

    pub fn level(&self) -> ResolutionLevel {
        match self {
            EntityResolution::Existing { level, .. }
            | EntityResolution::ReferenceOnly { level, .. } => *level,
            EntityResolution::New { .. } | EntityResolution::Vetoed { .. } => {
                ResolutionLevel::NoMatch
            }
        }
    }

    /// Short variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EntityResolution::New { .. } => "new",
            EntityResolution::Existing { .. } => "existing",
            EntityResolution::Vetoed { .. } => "vetoed",
            EntityResolution::ReferenceOnly { .. } => "reference_only",
        }
    }
}

/// A batch of resolutions tagged with the chunks it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolutions<R> {
    pub chunk_ids: BTreeSet<String>,
    pub resolutions: Vec<R>,
}

impl<R> Resolutions<R> {
    pub fn new(chunk_ids: BTreeSet<String>, resolutions: Vec<R>) -> Self {
        Self {
            chunk_ids,
            resolutions,
        }
    }

    pub fn len(&self) -> usize {
        self.resolutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolutions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.resolutions.iter()
    }
}

impl<R> IntoIterator for Resolutions<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.resolutions.into_iter()
    }
}

impl Resolutions<EntityResolution> {
    /// Count resolutions per level.
    pub fn level_counts(&self) -> ResolutionLevelCounts {
        let mut counts = ResolutionLevelCounts::default();
        for resolution in &self.resolutions {
            counts.record(resolution.level());
        }
        counts
    }
}

/// Per-level tallies for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionLevelCounts(BTreeMap<ResolutionLevel, usize>);

impl ResolutionLevelCounts {
    pub fn record(&mut self, level: ResolutionLevel) {
        *self.0.entry(level).or_insert(0) += 1;
    }

    pub fn get(&self, level: ResolutionLevel) -> usize {
        self.0.get(&level).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }
}

impl std::fmt::Display for ResolutionLevelCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(level, count)| format!("{}={}", level, count))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}
