use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form entity properties.
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Property key under which alternative names are accumulated.
pub const ALIASES_PROPERTY: &str = "aliases";

/// An entity mention proposed by the extractor for one chunk.
///
/// Suggestions live only until they have been resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedEntity {
    /// Type tags, most specific first.
    pub labels: Vec<String>,
    /// Name as it appeared in the text.
    pub name: String,
    /// Short description drawn from the text.
    #[serde(default)]
    pub summary: String,
    /// Identifier already known to the extractor, if any.
    #[serde(default)]
    pub id: Option<String>,
    /// Arbitrary extracted properties.
    #[serde(default)]
    pub properties: Properties,
    /// Chunk the mention came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

impl SuggestedEntity {
    /// Create a suggestion with labels and a name.
    pub fn new<L, S>(labels: L, name: impl Into<String>) -> Self
    where
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            name: name.into(),
            summary: String::new(),
            id: None,
            properties: Properties::new(),
            chunk_id: None,
        }
    }

    /// Set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Set a pre-known identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a property.
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Record the originating chunk.
    pub fn with_chunk_id(mut self, chunk_id: impl Into<String>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }

    /// The most specific label, if any.
    pub fn primary_label(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    /// Query text for vector search, shaped like
    /// [`NamedEntityData::embedding_text`].
    pub fn embedding_text(&self) -> String {
        describe(&self.name, &self.labels, self.summary.trim())
    }
}

fn describe(name: &str, labels: &[String], description: &str) -> String {
    if description.is_empty() {
        format!("{} ({})", name, labels.join(", "))
    } else {
        format!("{} ({}): {}", name, labels.join(", "), description)
    }
}

/// A persisted entity.
///
/// The id never changes once assigned and labels only ever accumulate.
/// Every update produces a new value; nothing here mutates in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedEntityData {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl NamedEntityData {
    /// Create an entity with explicit id, name and labels.
    pub fn new<L, S>(id: impl Into<String>, name: impl Into<String>, labels: L) -> Self
    where
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            labels: union_labels(&[], &labels),
            properties: Properties::new(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a property.
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Build a brand-new entity from a suggestion.
    ///
    /// Uses the suggestion's id when it carries one, else a fresh UUID.
    pub fn from_suggested(suggested: &SuggestedEntity) -> Self {
        Self {
            id: suggested
                .id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            name: suggested.name.trim().to_string(),
            description: suggested.summary.trim().to_string(),
            labels: union_labels(&[], &suggested.labels),
            properties: suggested.properties.clone(),
        }
    }

    /// Combine this entity with a suggestion that resolved to it.
    pub fn merge_with(&self, suggested: &SuggestedEntity) -> Self {
        let mut properties = self.properties.clone();
        for (key, value) in &suggested.properties {
            if key != ALIASES_PROPERTY {
                properties.insert(key.clone(), value.clone());
            }
        }

        let mut merged = Self {
            id: self.id.clone(),
            name: self.name.clone(),
            description: if suggested.summary.trim().is_empty() {
                self.description.clone()
            } else {
                suggested.summary.trim().to_string()
            },
            labels: union_labels(&self.labels, &suggested.labels),
            properties,
        };

        let alias = suggested.name.trim();
        if !alias.is_empty() && !alias.eq_ignore_ascii_case(&self.name) {
            merged.add_alias(alias);
        }
        merged
    }

    /// Fold a later copy of the same entity into this one.
    ///
    /// Labels and aliases are unioned, `later` wins on description and
    /// other properties. Used when one batch merges several suggestions
    /// into the same stored entity.
    pub fn absorb(&self, later: &NamedEntityData) -> Self {
        let mut properties = self.properties.clone();
        for (key, value) in &later.properties {
            if key != ALIASES_PROPERTY {
                properties.insert(key.clone(), value.clone());
            }
        }

        let mut folded = Self {
            id: self.id.clone(),
            name: self.name.clone(),
            description: if later.description.trim().is_empty() {
                self.description.clone()
            } else {
                later.description.clone()
            },
            labels: union_labels(&self.labels, &later.labels),
            properties,
        };
        for alias in later.aliases() {
            if !alias.eq_ignore_ascii_case(&folded.name) {
                folded.add_alias(&alias);
            }
        }
        folded
    }

    /// Case-insensitive label membership.
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
    }

    /// Alternative names collected from earlier merges.
    pub fn aliases(&self) -> Vec<String> {
        self.properties
            .get(ALIASES_PROPERTY)
            .and_then(|v| v.as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn add_alias(&mut self, alias: &str) {
        let mut aliases = self.aliases();
        if aliases.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
            return;
        }
        aliases.push(alias.to_string());
        self.properties
            .insert(ALIASES_PROPERTY.to_string(), serde_json::json!(aliases));
    }

    /// Text used when embedding this entity.
    pub fn embedding_text(&self) -> String {
        describe(&self.name, &self.labels, &self.description)
    }
}

/// Union two label lists, keeping first-seen order and dropping
/// case-insensitive duplicates.
pub fn union_labels(existing: &[String], extra: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(existing.len() + extra.len());
    for label in existing.iter().chain(extra) {
        let label = label.trim();
        if label.is_empty() || out.iter().any(|l| l.eq_ignore_ascii_case(label)) {
            continue;
        }
        out.push(label.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absorb_keeps_labels_and_aliases_from_both_copies() {
        let stored = NamedEntityData::new("e1", "John Smith", ["Person"]);
        let first = stored.merge_with(
            &SuggestedEntity::new(["Person", "Detective"], "J. Smith").with_summary("Investigator"),
        );
        let second = stored.merge_with(&SuggestedEntity::new(["Person", "Author"], "Jon Smith"));

        let folded = first.absorb(&second);
        assert_eq!(folded.id, "e1");
        assert_eq!(folded.labels, vec!["Person", "Detective", "Author"]);
        assert_eq!(folded.aliases(), vec!["J. Smith", "Jon Smith"]);
        assert_eq!(folded.description, "Investigator");
    }

    #[test]
    fn test_from_suggested_uses_known_id() {
        let suggested = SuggestedEntity::new(["Person"], "Sherlock Holmes").with_id("e-1");
        let entity = NamedEntityData::from_suggested(&suggested);
        assert_eq!(entity.id, "e-1");
        assert_eq!(entity.labels, vec!["Person"]);
    }

    #[test]
    fn test_from_suggested_generates_uuid() {
        let suggested = SuggestedEntity::new(["Person"], "Irene Adler");
        let a = NamedEntityData::from_suggested(&suggested);
        let b = NamedEntityData::from_suggested(&suggested);
        assert_ne!(a.id, b.id);
        assert!(Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn test_merge_keeps_id_and_name_and_unions_labels() {
        let existing = NamedEntityData::new("e-1", "Sherlock Holmes", ["Person"])
            .with_description("A man");
        let suggested = SuggestedEntity::new(["Detective"], "Holmes")
            .with_summary("Consulting detective of Baker Street");

        let merged = existing.merge_with(&suggested);
        assert_eq!(merged.id, "e-1");
        assert_eq!(merged.name, "Sherlock Holmes");
        assert_eq!(merged.labels, vec!["Person", "Detective"]);
        assert_eq!(merged.description, "Consulting detective of Baker Street");
        assert_eq!(merged.aliases(), vec!["Holmes"]);
        // the stored value is untouched
        assert_eq!(existing.labels, vec!["Person"]);
    }

    #[test]
    fn test_merge_keeps_description_when_summary_blank() {
        let existing = NamedEntityData::new("e-1", "Watson", ["Person"]).with_description("Doctor");
        let merged = existing.merge_with(&SuggestedEntity::new(["Person"], "watson"));
        assert_eq!(merged.description, "Doctor");
        assert!(merged.aliases().is_empty());
    }

    #[test]
    fn test_merge_overlays_properties() {
        let existing = NamedEntityData::new("e-1", "221B", ["Place"])
            .with_property("city", json!("London"))
            .with_property("floor", json!(1));
        let suggested = SuggestedEntity::new(["Place"], "221B").with_property("floor", json!(2));
        let merged = existing.merge_with(&suggested);
        assert_eq!(merged.properties["city"], json!("London"));
        assert_eq!(merged.properties["floor"], json!(2));
    }

    #[test]
    fn test_union_labels_is_case_insensitive() {
        let labels = union_labels(
            &["Person".to_string()],
            &["person".to_string(), "Detective".to_string(), " ".to_string()],
        );
        assert_eq!(labels, vec!["Person", "Detective"]);
    }

    #[test]
    fn test_repeated_merges_never_drop_labels() {
        let mut entity = NamedEntityData::new("e-1", "Holmes", ["Person"]);
        for labels in [vec!["Detective"], vec!["Person"], vec!["Violinist", "Person"], vec![]] {
            let before = entity.labels.clone();
            entity = entity.merge_with(&SuggestedEntity::new(labels, "Holmes"));
            for label in &before {
                assert!(entity.has_label(label));
            }
        }
        assert_eq!(entity.labels, vec!["Person", "Detective", "Violinist"]);
    }
}
