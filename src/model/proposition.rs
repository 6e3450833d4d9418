//! Propositions: atomic natural-language claims held with a confidence and
//! a decay rate.
//!
//! Revision never mutates a stored proposition; [`Proposition::merged_with`],
//! [`Proposition::reinforced_with`] and [`Proposition::contradicted`] each
//! return a new value carrying the original id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Lowest confidence a revision will leave behind.
pub const MIN_CONFIDENCE: f64 = 0.05;
/// Ceiling on confidence after a merge.
pub const MERGE_CONFIDENCE_CAP: f64 = 0.99;
/// Ceiling on confidence after reinforcement.
pub const REINFORCE_CONFIDENCE_CAP: f64 = 0.95;

/// Grammatical role of a mention inside its proposition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MentionRole {
    Subject,
    Object,
    #[default]
    #[serde(other)]
    Other,
}

/// A span inside a proposition that names an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub span: String,
    #[serde(rename = "type", default)]
    pub mention_type: String,
    #[serde(default)]
    pub role: MentionRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_id: Option<String>,
}

impl EntityMention {
    pub fn new(span: impl Into<String>, mention_type: impl Into<String>, role: MentionRole) -> Self {
        Self {
            span: span.into(),
            mention_type: mention_type.into(),
            role,
            resolved_id: None,
        }
    }

    pub fn resolved_to(mut self, id: impl Into<String>) -> Self {
        self.resolved_id = Some(id.into());
        self
    }
}

/// Lifecycle state of a proposition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropositionStatus {
    #[default]
    Active,
    Contradicted,
    Retracted,
}

impl PropositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropositionStatus::Active => "ACTIVE",
            PropositionStatus::Contradicted => "CONTRADICTED",
            PropositionStatus::Retracted => "RETRACTED",
        }
    }
}

impl std::fmt::Display for PropositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PropositionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(PropositionStatus::Active),
            "CONTRADICTED" => Ok(PropositionStatus::Contradicted),
            "RETRACTED" => Ok(PropositionStatus::Retracted),
            _ => Err(format!("Unknown proposition status: {}", s)),
        }
    }
}

/// An atomic claim held in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposition {
    pub id: String,
    /// Tenant or session scope.
    pub context_id: String,
    pub text: String,
    #[serde(default)]
    pub mentions: Vec<EntityMention>,
    pub confidence: f64,
    pub decay: f64,
    #[serde(default)]
    pub status: PropositionStatus,
    /// Chunk ids this proposition was derived from.
    #[serde(default)]
    pub grounding: Vec<String>,
    #[serde(default)]
    pub reinforce_count: u32,
    /// 0 for raw claims, 1+ for summaries.
    #[serde(default)]
    pub level: u32,
    pub created: DateTime<Utc>,
    pub revised: DateTime<Utc>,
}

impl Proposition {
    /// Create an active proposition; confidence and decay are clamped to [0, 1].
    pub fn new(
        context_id: impl Into<String>,
        text: impl Into<String>,
        confidence: f64,
        decay: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            context_id: context_id.into(),
            text: text.into(),
            mentions: Vec::new(),
            confidence: clamp_unit(confidence),
            decay: clamp_unit(decay),
            status: PropositionStatus::Active,
            grounding: Vec::new(),
            reinforce_count: 0,
            level: 0,
            created: now,
            revised: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_mentions(mut self, mentions: Vec<EntityMention>) -> Self {
        self.mentions = mentions;
        self
    }

    pub fn with_grounding<I, S>(mut self, chunk_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.grounding = union_grounding(&[], &chunk_ids.into_iter().map(Into::into).collect::<Vec<_>>());
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_status(mut self, status: PropositionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == PropositionStatus::Active
    }

    /// Lowercased, punctuation-free form used for exact-duplicate lookup.
    pub fn canonical_text(&self) -> String {
        canonical_text(&self.text)
    }

    /// Entity ids bound to this proposition's mentions.
    pub fn resolved_entity_ids(&self) -> BTreeSet<&str> {
        self.mentions
            .iter()
            .filter_map(|m| m.resolved_id.as_deref())
            .collect()
    }

    /// Absorb an identical restatement.
    ///
    /// `confidence' = min(0.99, c + new.c × 0.3)`, `decay' = decay × 0.7`,
    /// reinforce count +1, grounding unioned.
    pub fn merged_with(&self, new: &Proposition) -> Proposition {
        let mut merged = self.clone();
        merged.confidence =
            clamp_unit((self.confidence + new.confidence * 0.3).min(MERGE_CONFIDENCE_CAP));
        merged.decay = clamp_unit(self.decay * 0.7);
        merged.reinforce_count = self.reinforce_count.saturating_add(1);
        merged.grounding = union_grounding(&self.grounding, &new.grounding);
        merged.revised = Utc::now();
        merged
    }

    /// Absorb a supporting, non-identical claim.
    ///
    /// `confidence' = min(0.95, c + new.c × 0.1)`, `decay' = decay × 0.85`,
    /// reinforce count +1.
    pub fn reinforced_with(&self, new: &Proposition) -> Proposition {
        let mut reinforced = self.clone();
        reinforced.confidence =
            clamp_unit((self.confidence + new.confidence * 0.1).min(REINFORCE_CONFIDENCE_CAP));
        reinforced.decay = clamp_unit(self.decay * 0.85);
        reinforced.reinforce_count = self.reinforce_count.saturating_add(1);
        reinforced.grounding = union_grounding(&self.grounding, &new.grounding);
        reinforced.revised = Utc::now();
        reinforced
    }

    /// Mark as contradicted by newer evidence.
    ///
    /// `confidence' = max(0.05, c × 0.3)`, `decay' = min(1.0, decay + 0.15)`.
    pub fn contradicted(&self) -> Proposition {
        let mut contradicted = self.clone();
        contradicted.confidence = clamp_unit((self.confidence * 0.3).max(MIN_CONFIDENCE));
        contradicted.decay = clamp_unit((self.decay + 0.15).min(1.0));
        contradicted.status = PropositionStatus::Contradicted;
        contradicted.revised = Utc::now();
        contradicted
    }
}

/// Lowercase, strip punctuation, collapse whitespace.
pub fn canonical_text(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn union_grounding(existing: &[String], extra: &[String]) -> Vec<String> {
    let mut out = existing.to_vec();
    for chunk_id in extra {
        if !out.contains(chunk_id) {
            out.push(chunk_id.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(confidence: f64, decay: f64) -> Proposition {
        Proposition::new("ctx", "Alice is a software engineer", confidence, decay)
    }

    #[test]
    fn test_new_clamps() {
        let p = prop(1.7, -0.2);
        assert_eq!(p.confidence, 1.0);
        assert_eq!(p.decay, 0.0);
        assert_eq!(p.status, PropositionStatus::Active);
        assert_eq!(p.reinforce_count, 0);
    }

    #[test]
    fn test_canonical_text() {
        assert_eq!(
            canonical_text("Alice is a software engineer."),
            "alice is a software engineer"
        );
        assert_eq!(canonical_text("  Alice,   is a  ENGINEER! "), "alice is a engineer");
    }

    #[test]
    fn test_merge_rules() {
        let existing = prop(0.6, 0.2).with_grounding(["c1"]);
        let new = prop(0.5, 0.3).with_grounding(["c2", "c1"]);
        let merged = existing.merged_with(&new);
        assert_eq!(merged.id, existing.id);
        assert!((merged.confidence - 0.75).abs() < 1e-9);
        assert!((merged.decay - 0.14).abs() < 1e-9);
        assert_eq!(merged.reinforce_count, 1);
        assert_eq!(merged.grounding, vec!["c1", "c2"]);
    }

    #[test]
    fn test_merge_confidence_bounded() {
        let steps = [0.0, 0.05, 0.3, 0.5, 0.9, 0.99];
        for &existing_c in &steps {
            for &new_c in &[0.0, 0.2, 0.5, 0.8, 1.0] {
                let merged = prop(existing_c, 0.1).merged_with(&prop(new_c, 0.1));
                assert!(merged.confidence >= existing_c - 1e-12);
                assert!(merged.confidence <= MERGE_CONFIDENCE_CAP + 1e-12);
            }
        }
    }

    #[test]
    fn test_reinforce_rules() {
        let existing = prop(0.9, 0.4);
        let reinforced = existing.reinforced_with(&prop(0.8, 0.1));
        assert!((reinforced.confidence - 0.95).abs() < 1e-9);
        assert!((reinforced.decay - 0.34).abs() < 1e-9);
        assert_eq!(reinforced.reinforce_count, 1);
    }

    #[test]
    fn test_reinforce_count_saturates() {
        let mut existing = prop(0.6, 0.2);
        existing.reinforce_count = u32::MAX;
        assert_eq!(existing.merged_with(&prop(0.5, 0.1)).reinforce_count, u32::MAX);
        assert_eq!(existing.reinforced_with(&prop(0.5, 0.1)).reinforce_count, u32::MAX);
    }

    #[test]
    fn test_contradict_rules() {
        let contradicted = prop(0.1, 0.0).contradicted();
        assert!((contradicted.confidence - 0.05).abs() < 1e-9);
        assert!((contradicted.decay - 0.15).abs() < 1e-9);
        assert_eq!(contradicted.status, PropositionStatus::Contradicted);
        assert_eq!(contradicted.reinforce_count, 0);

        let contradicted = prop(0.8, 0.95).contradicted();
        assert!((contradicted.confidence - 0.24).abs() < 1e-9);
        assert_eq!(contradicted.decay, 1.0);
    }

    #[test]
    fn test_status_round_trip_and_unknown_role() {
        assert_eq!("contradicted".parse::<PropositionStatus>().unwrap(), PropositionStatus::Contradicted);
        assert!("gone".parse::<PropositionStatus>().is_err());

        let mention: EntityMention =
            serde_json::from_str(r#"{"span":"Alice","type":"Person","role":"INSTRUMENT"}"#).unwrap();
        assert_eq!(mention.role, MentionRole::Other);
    }
}
