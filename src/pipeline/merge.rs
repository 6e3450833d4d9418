use crate::model::{EntityResolution, NamedEntityData};

/// Chooses the convergence target for a resolution: what actually gets
/// written, or `None` when nothing should be.
pub trait MergePolicy: Send + Sync {
    fn converge(&self, resolution: &EntityResolution) -> Option<NamedEntityData>;
}

/// Writes the resolver's recommendation, except that reference-only
/// entities converge on the stored value untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMergePolicy;

impl MergePolicy for DefaultMergePolicy {
    fn converge(&self, resolution: &EntityResolution) -> Option<NamedEntityData> {
        match resolution {
            EntityResolution::New { recommended, .. }
            | EntityResolution::Existing { recommended, .. } => Some(recommended.clone()),
            EntityResolution::ReferenceOnly { existing, .. } => Some(existing.clone()),
            EntityResolution::Vetoed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResolutionLevel, SuggestedEntity};

    #[test]
    fn test_default_policy() {
        let policy = DefaultMergePolicy;
        let existing = NamedEntityData::new("e1", "Sherlock Holmes", ["Person"]);
        let suggested = SuggestedEntity::new(["Detective"], "Holmes");

        let merged = policy
            .converge(&EntityResolution::existing(
                suggested.clone(),
                existing.clone(),
                ResolutionLevel::ExactMatch,
            ))
            .unwrap();
        assert_eq!(merged.labels, vec!["Person", "Detective"]);

        let reference = policy
            .converge(&EntityResolution::reference_only(
                suggested.clone(),
                existing.clone(),
                ResolutionLevel::ExactMatch,
            ))
            .unwrap();
        assert_eq!(reference, existing);

        assert!(policy.converge(&EntityResolution::vetoed(suggested)).is_none());
    }
}
