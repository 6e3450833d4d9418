//! Domain schema: which entity types exist, how they nest, and whether new
//! instances of each may be created.
//!
//! Types live in an arena ([`DataDictionary`]) and point at their parents by
//! [`DomainTypeId`]. Hierarchy walks are breadth-first with a visited set and
//! a depth bound, so a cyclic schema degrades to a finite walk.

use serde::Deserialize;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{SchemaError, SchemaResult};

/// Upper bound on hierarchy depth explored by any walk.
pub const MAX_HIERARCHY_DEPTH: usize = 32;

/// Labels added by the framework rather than describing a domain type.
pub const RESERVED_LABELS: &[&str] = &["entity", "reference"];

/// Roots every type descends from; sharing one says nothing about identity.
pub const GENERIC_ROOTS: &[&str] = &["namedentity", "object", "thing"];

/// Index of a type inside its dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DomainTypeId(usize);

/// One entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainType {
    pub id: DomainTypeId,
    pub name: String,
    pub description: String,
    pub parents: Vec<DomainTypeId>,
    /// New instances may be created during ingestion.
    pub creation_permitted: bool,
    /// Instances may be linked to but never rewritten.
    pub reference_only: bool,
}

/// Strip namespace qualifiers and lowercase: `schema:Person`, `com.acme.Person`
/// and `Person` all become `person`.
pub fn normalize_label(label: &str) -> String {
    label
        .rsplit(|c: char| matches!(c, ':' | '.' | '/' | '#'))
        .next()
        .unwrap_or(label)
        .trim()
        .to_lowercase()
}

pub fn is_reserved_label(label: &str) -> bool {
    RESERVED_LABELS.contains(&normalize_label(label).as_str())
}

pub fn is_generic_root(label: &str) -> bool {
    GENERIC_ROOTS.contains(&normalize_label(label).as_str())
}

/// Normalized, de-duplicated labels with reserved ones removed.
pub fn meaningful_labels(labels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        let normalized = normalize_label(label);
        if normalized.is_empty() || RESERVED_LABELS.contains(&normalized.as_str()) {
            continue;
        }
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

/// The schema consulted by matching, searching and the creation policy.
#[derive(Debug, Clone, Default)]
pub struct DataDictionary {
    types: Vec<DomainType>,
    by_name: HashMap<String, DomainTypeId>,
    open_world: bool,
}

impl DataDictionary {
    pub fn builder() -> DataDictionaryBuilder {
        DataDictionaryBuilder::default()
    }

    /// A dictionary with no types that permits creating anything.
    pub fn open_world() -> Self {
        Self {
            open_world: true,
            ..Self::default()
        }
    }

    /// Load the JSON document form.
    pub fn from_json(json: &str) -> SchemaResult<Self> {
        let document: SchemaDocument = serde_json::from_str(json)?;
        let mut builder = DataDictionaryBuilder::default().open_world(document.open_world);
        for spec in document.types {
            builder = builder.add_type(spec);
        }
        builder.build()
    }

    pub fn is_open_world(&self) -> bool {
        self.open_world
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: DomainTypeId) -> Option<&DomainType> {
        self.types.get(id.0)
    }

    /// Look a type up by (possibly qualified) name.
    pub fn find(&self, name: &str) -> Option<&DomainType> {
        self.by_name
            .get(&normalize_label(name))
            .and_then(|id| self.get(*id))
    }

    pub fn type_names(&self) -> Vec<&str> {
        self.types.iter().map(|t| t.name.as_str()).collect()
    }

    /// The most specific known type among `labels` (labels are ordered most
    /// specific first). Reserved labels are ignored.
    pub fn domain_type_for_labels(&self, labels: &[String]) -> Option<&DomainType> {
        labels
            .iter()
            .filter(|l| !is_reserved_label(l))
            .find_map(|l| self.find(l))
    }

    pub fn parents(&self, id: DomainTypeId) -> Vec<&DomainType> {
        self.get(id)
            .map(|t| t.parents.iter().filter_map(|p| self.get(*p)).collect())
            .unwrap_or_default()
    }

    /// Every strict ancestor of `id`, nearest first.
    pub fn ancestors(&self, id: DomainTypeId) -> Vec<DomainTypeId> {
        let mut out = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut queue: VecDeque<(DomainTypeId, usize)> = VecDeque::from([(id, 0)]);

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= MAX_HIERARCHY_DEPTH {
                continue;
            }
            let Some(domain_type) = self.get(current) else {
                continue;
            };
            for parent in &domain_type.parents {
                if visited.insert(*parent) {
                    out.push(*parent);
                    queue.push_back((*parent, depth + 1));
                }
            }
        }
        out
    }

    pub fn is_ancestor(&self, ancestor: DomainTypeId, descendant: DomainTypeId) -> bool {
        self.ancestors(descendant).contains(&ancestor)
    }

    /// A shared ancestor (or self) of both types that is not a generic root.
    pub fn meaningful_common_ancestor(
        &self,
        a: DomainTypeId,
        b: DomainTypeId,
    ) -> Option<DomainTypeId> {
        let mut lineage_b: HashSet<DomainTypeId> = self.ancestors(b).into_iter().collect();
        lineage_b.insert(b);

        std::iter::once(a)
            .chain(self.ancestors(a))
            .filter(|id| lineage_b.contains(id))
            .find(|id| {
                self.get(*id)
                    .map(|t| !is_generic_root(&t.name))
                    .unwrap_or(false)
            })
    }

    /// Whether a new entity carrying `labels` may be created.
    ///
    /// Unknown labels are allowed only in an open-world dictionary.
    pub fn creation_permitted(&self, labels: &[String]) -> bool {
        match self.domain_type_for_labels(labels) {
            Some(domain_type) => domain_type.creation_permitted,
            None => self.open_world,
        }
    }

    pub fn is_reference_only(&self, labels: &[String]) -> bool {
        self.domain_type_for_labels(labels)
            .map(|t| t.reference_only)
            .unwrap_or(false)
    }
}

/// Declarative description of one type, used by the builder and the JSON form.
#[derive(Debug, Clone, Deserialize)]
pub struct TypeSpec {
    pub name: String,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default = "default_true")]
    pub creation_permitted: bool,
    #[serde(default)]
    pub reference_only: bool,
    #[serde(default)]
    pub description: String,
}

fn default_true() -> bool {
    true
}

impl TypeSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parents: Vec::new(),
            creation_permitted: true,
            reference_only: false,
            description: String::new(),
        }
    }

    pub fn with_parents<I, S>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Instances of this type must already exist.
    pub fn forbid_creation(mut self) -> Self {
        self.creation_permitted = false;
        self
    }

    /// Instances of this type are never rewritten by merges.
    pub fn as_reference_only(mut self) -> Self {
        self.reference_only = true;
        self
    }
}

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    #[serde(default)]
    open_world: bool,
    types: Vec<TypeSpec>,
}

/// Collects [`TypeSpec`]s and resolves parent names to ids on `build`.
#[derive(Debug, Clone, Default)]
pub struct DataDictionaryBuilder {
    specs: Vec<TypeSpec>,
    open_world: bool,
}

impl DataDictionaryBuilder {
    pub fn open_world(mut self, open_world: bool) -> Self {
        self.open_world = open_world;
        self
    }

    pub fn add_type(mut self, spec: TypeSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn build(self) -> SchemaResult<DataDictionary> {
        let mut by_name = HashMap::new();
        for (index, spec) in self.specs.iter().enumerate() {
            if by_name
                .insert(normalize_label(&spec.name), DomainTypeId(index))
                .is_some()
            {
                return Err(SchemaError::DuplicateType {
                    name: spec.name.clone(),
                });
            }
        }

        let mut types = Vec::with_capacity(self.specs.len());
        for (index, spec) in self.specs.into_iter().enumerate() {
            let mut parents = Vec::with_capacity(spec.parents.len());
            for parent in &spec.parents {
                let id = by_name.get(&normalize_label(parent)).copied().ok_or_else(|| {
                    SchemaError::UnknownParent {
                        name: spec.name.clone(),
                        parent: parent.clone(),
                    }
                })?;
                parents.push(id);
            }
            types.push(DomainType {
                id: DomainTypeId(index),
                name: spec.name,
                description: spec.description,
                parents,
                creation_permitted: spec.creation_permitted,
                reference_only: spec.reference_only,
            });
        }

        Ok(DataDictionary {
            types,
            by_name,
            open_world: self.open_world,
        })
    }
}
