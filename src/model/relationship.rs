use serde::{Deserialize, Serialize};

use super::entity::Properties;

/// A relationship proposed by the extractor, naming its endpoints the way
/// the chunk did (entity name or pre-known id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Properties,
}

impl SuggestedRelationship {
    pub fn new(
        source: impl Into<String>,
        relationship_type: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relationship_type: relationship_type.into(),
            description: String::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A persisted, typed edge between two entity ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipInstance {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub properties: Properties,
}

impl RelationshipInstance {
    /// Materialize a suggestion once both endpoints are resolved.
    pub fn from_suggested(
        suggested: &SuggestedRelationship,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type: normalize_relationship_type(&suggested.relationship_type),
            description: suggested.description.trim().to_string(),
            properties: suggested.properties.clone(),
        }
    }

    /// New value combining this edge with another sighting of it.
    pub fn merge_with(&self, suggested: &SuggestedRelationship) -> Self {
        let mut properties = self.properties.clone();
        for (key, value) in &suggested.properties {
            properties.insert(key.clone(), value.clone());
        }
        Self {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            relationship_type: self.relationship_type.clone(),
            description: if suggested.description.trim().is_empty() {
                self.description.clone()
            } else {
                suggested.description.trim().to_string()
            },
            properties,
        }
    }

    /// (source, type, target) identity of the edge.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.source_id, &self.relationship_type, &self.target_id)
    }
}

/// Relationship types are stored upper snake case: "works for" → "WORKS_FOR".
pub fn normalize_relationship_type(raw: &str) -> String {
    raw.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Outcome of resolving one suggested relationship.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipResolution {
    New {
        suggested: SuggestedRelationship,
        recommended: RelationshipInstance,
    },
    Existing {
        suggested: SuggestedRelationship,
        existing: RelationshipInstance,
        recommended: RelationshipInstance,
    },
    /// An endpoint was vetoed or never resolved.
    Vetoed {
        suggested: SuggestedRelationship,
        reason: String,
    },
}

impl RelationshipResolution {
    pub fn suggested(&self) -> &SuggestedRelationship {
        match self {
            RelationshipResolution::New { suggested, .. }
            | RelationshipResolution::Existing { suggested, .. }
            | RelationshipResolution::Vetoed { suggested, .. } => suggested,
        }
    }

    pub fn recommended(&self) -> Option<&RelationshipInstance> {
        match self {
            RelationshipResolution::New { recommended, .. }
            | RelationshipResolution::Existing { recommended, .. } => Some(recommended),
            RelationshipResolution::Vetoed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_relationship_type() {
        assert_eq!(normalize_relationship_type("works for"), "WORKS_FOR");
        assert_eq!(normalize_relationship_type("LIVES_AT"), "LIVES_AT");
        assert_eq!(normalize_relationship_type(" friend-of "), "FRIEND_OF");
    }

    #[test]
    fn test_merge_keeps_endpoints() {
        let suggested = SuggestedRelationship::new("Holmes", "lives at", "221B")
            .with_description("Shares rooms with Watson");
        let edge = RelationshipInstance::from_suggested(&suggested, "e1", "e2");
        assert_eq!(edge.key(), ("e1", "LIVES_AT", "e2"));

        let mut again = SuggestedRelationship::new("Sherlock", "lives at", "Baker Street");
        again.properties.insert("since".to_string(), json!(1881));
        let merged = edge.merge_with(&again);
        assert_eq!(merged.key(), edge.key());
        assert_eq!(merged.description, "Shares rooms with Watson");
        assert_eq!(merged.properties["since"], json!(1881));
    }
}
