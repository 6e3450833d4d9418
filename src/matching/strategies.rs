use strsim::levenshtein;

use super::text::normalize_name;
use super::{MatchResult, MatchStrategy};
use crate::model::{NamedEntityData, SuggestedEntity};
use crate::schema::{meaningful_labels, DataDictionary};

/// Case-insensitive full-name equality. Never vetoes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactNameMatch;

impl MatchStrategy for ExactNameMatch {
    fn name(&self) -> &'static str {
        "exact_name"
    }

    fn evaluate(
        &self,
        suggested: &SuggestedEntity,
        candidate: &NamedEntityData,
        _schema: &DataDictionary,
    ) -> MatchResult {
        let name = suggested.name.trim();
        if !name.is_empty() && name.to_lowercase() == candidate.name.trim().to_lowercase() {
            MatchResult::Match
        } else {
            MatchResult::Inconclusive
        }
    }
}

/// Equality after [`normalize_name`]. Never vetoes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedNameMatch;

impl MatchStrategy for NormalizedNameMatch {
    fn name(&self) -> &'static str {
        "normalized_name"
    }

    fn evaluate(
        &self,
        suggested: &SuggestedEntity,
        candidate: &NamedEntityData,
        _schema: &DataDictionary,
    ) -> MatchResult {
        let left = normalize_name(&suggested.name);
        if left.is_empty() {
            return MatchResult::Inconclusive;
        }
        let matched = std::iter::once(candidate.name.clone())
            .chain(candidate.aliases())
            .any(|name| normalize_name(&name) == left);
        if matched {
            MatchResult::Match
        } else {
            MatchResult::Inconclusive
        }
    }
}

/// Edit-distance match on normalized names.
///
/// Matches when `distance <= floor(min(len) * max_distance_ratio)` and both
/// names are at least `min_length` chars long. Never vetoes.
#[derive(Debug, Clone, Copy)]
pub struct FuzzyNameMatch {
    pub max_distance_ratio: f64,
    pub min_length: usize,
}

impl Default for FuzzyNameMatch {
    fn default() -> Self {
        Self {
            max_distance_ratio: 0.2,
            min_length: 4,
        }
    }
}

impl FuzzyNameMatch {
    pub fn new(max_distance_ratio: f64, min_length: usize) -> Self {
        Self {
            max_distance_ratio,
            min_length,
        }
    }

    /// Whether two raw names are within the allowed distance.
    pub fn names_match(&self, a: &str, b: &str) -> bool {
        let a = normalize_name(a);
        let b = normalize_name(b);
        let (len_a, len_b) = (a.chars().count(), b.chars().count());
        if len_a < self.min_length || len_b < self.min_length {
            return false;
        }
        let allowed = (len_a.min(len_b) as f64 * self.max_distance_ratio).floor() as usize;
        levenshtein(&a, &b) <= allowed
    }
}

impl MatchStrategy for FuzzyNameMatch {
    fn name(&self) -> &'static str {
        "fuzzy_name"
    }

    fn evaluate(
        &self,
        suggested: &SuggestedEntity,
        candidate: &NamedEntityData,
        _schema: &DataDictionary,
    ) -> MatchResult {
        if self.names_match(&suggested.name, &candidate.name) {
            MatchResult::Match
        } else {
            MatchResult::Inconclusive
        }
    }
}

/// Vetoes candidates whose types cannot describe the same thing.
///
/// NoMatch only when the label sets share nothing, neither type descends
/// from the other, and they have no common ancestor besides a generic root.
/// Otherwise Inconclusive; this strategy never confirms.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelCompatibilityMatch;

impl LabelCompatibilityMatch {
    /// Whether the two label sets could describe the same entity.
    pub fn compatible(
        suggested_labels: &[String],
        candidate_labels: &[String],
        schema: &DataDictionary,
    ) -> bool {
        let left = meaningful_labels(suggested_labels);
        let right = meaningful_labels(candidate_labels);
        if left.is_empty() || right.is_empty() {
            return true;
        }
        if left.iter().any(|l| right.contains(l)) {
            return true;
        }

        let left_types: Vec<_> = left.iter().filter_map(|l| schema.find(l)).map(|t| t.id).collect();
        let right_types: Vec<_> = right.iter().filter_map(|l| schema.find(l)).map(|t| t.id).collect();

        left_types.iter().any(|&a| {
            right_types.iter().any(|&b| {
                schema.is_ancestor(a, b)
                    || schema.is_ancestor(b, a)
                    || schema.meaningful_common_ancestor(a, b).is_some()
            })
        })
    }
}

impl MatchStrategy for LabelCompatibilityMatch {
    fn name(&self) -> &'static str {
        "label_compatibility"
    }

    fn evaluate(
        &self,
        suggested: &SuggestedEntity,
        candidate: &NamedEntityData,
        schema: &DataDictionary,
    ) -> MatchResult {
        if Self::compatible(&suggested.labels, &candidate.labels, schema) {
            MatchResult::Inconclusive
        } else {
            MatchResult::NoMatch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TypeSpec;

    fn schema() -> DataDictionary {
        DataDictionary::builder()
            .add_type(TypeSpec::new("NamedEntity"))
            .add_type(TypeSpec::new("Person").with_parents(["NamedEntity"]))
            .add_type(TypeSpec::new("Detective").with_parents(["Person"]))
            .add_type(TypeSpec::new("Doctor").with_parents(["Person"]))
            .add_type(TypeSpec::new("Place").with_parents(["NamedEntity"]))
            .build()
            .unwrap()
    }

    fn candidate(name: &str, labels: &[&str]) -> NamedEntityData {
        NamedEntityData::new("e1", name, labels.iter().copied())
    }

    #[test]
    fn test_exact_name_is_case_insensitive_and_never_vetoes() {
        let s = SuggestedEntity::new(["Person"], "sherlock holmes");
        let schema = schema();
        assert_eq!(
            ExactNameMatch.evaluate(&s, &candidate("Sherlock Holmes", &["Person"]), &schema),
            MatchResult::Match
        );
        assert_eq!(
            ExactNameMatch.evaluate(&s, &candidate("Mycroft Holmes", &["Person"]), &schema),
            MatchResult::Inconclusive
        );
    }

    #[test]
    fn test_normalized_name_strips_titles() {
        let s = SuggestedEntity::new(["Person"], "Watson");
        assert_eq!(
            NormalizedNameMatch.evaluate(&s, &candidate("Dr. Watson", &["Person"]), &schema()),
            MatchResult::Match
        );
    }

    #[test]
    fn test_normalized_name_checks_aliases() {
        let s = SuggestedEntity::new(["Person"], "Mr. Holmes");
        let c = candidate("Sherlock Holmes", &["Person"])
            .with_property("aliases", serde_json::json!(["Holmes"]));
        assert_eq!(NormalizedNameMatch.evaluate(&s, &c, &schema()), MatchResult::Match);
    }

    #[test]
    fn test_fuzzy_bound() {
        let fuzzy = FuzzyNameMatch::new(0.2, 4);
        assert!(fuzzy.names_match("Jon Smith", "John Smith"));
        assert!(!fuzzy.names_match("Al", "Bob"));
        assert!(!fuzzy.names_match("Al", "Al"));
        assert!(!fuzzy.names_match("Jane Smith", "John Smyth"));
        // two edits allowed on fourteen chars
        assert!(fuzzy.names_match("Jonathan Smyth", "Jonathon Smith"));
        assert!(!fuzzy.names_match("Jonathan Smyth", "Jonatho Smiths"));
        assert_eq!(levenshtein("jon smith", "john smith"), 1);
        let s = SuggestedEntity::new(["Person"], "Al");
        assert_eq!(
            fuzzy.evaluate(&s, &candidate("Bob", &["Person"]), &schema()),
            MatchResult::Inconclusive
        );
    }

    #[test]
    fn test_label_compatibility() {
        let schema = schema();
        let person = |labels: &[&str]| SuggestedEntity::new(labels.iter().copied(), "X");

        // shared label after namespace stripping
        assert_eq!(
            LabelCompatibilityMatch.evaluate(&person(&["schema:Person"]), &candidate("X", &["Person"]), &schema),
            MatchResult::Inconclusive
        );
        // descendant
        assert_eq!(
            LabelCompatibilityMatch.evaluate(&person(&["Detective"]), &candidate("X", &["Person"]), &schema),
            MatchResult::Inconclusive
        );
        // siblings under a meaningful parent
        assert_eq!(
            LabelCompatibilityMatch.evaluate(&person(&["Detective"]), &candidate("X", &["Doctor"]), &schema),
            MatchResult::Inconclusive
        );
        // only a generic root in common
        assert_eq!(
            LabelCompatibilityMatch.evaluate(&person(&["Person"]), &candidate("X", &["Place"]), &schema),
            MatchResult::NoMatch
        );
        // reserved labels never count as overlap
        assert_eq!(
            LabelCompatibilityMatch.evaluate(
                &person(&["Person", "Entity"]),
                &candidate("X", &["Place", "Entity"]),
                &schema
            ),
            MatchResult::NoMatch
        );
    }
}
