use crate::matching::normalize_name;
use crate::model::{union_labels, SuggestedEntity};
use crate::schema::meaningful_labels;

/// Fold suggestions from one chunk that name the same thing.
///
/// Two suggestions fold when their normalized names are equal and their
/// meaningful labels overlap (or either has none). The first suggestion
/// keeps its name and position; labels are unioned, distinct summaries
/// joined, properties from later suggestions fill gaps, and the first
/// pre-known id wins.
pub fn consolidate(suggested: Vec<SuggestedEntity>) -> Vec<SuggestedEntity> {
    let mut out: Vec<SuggestedEntity> = Vec::with_capacity(suggested.len());

    for incoming in suggested {
        let key = normalize_name(&incoming.name);
        let existing = out.iter_mut().find(|kept| {
            !key.is_empty() && normalize_name(&kept.name) == key && labels_overlap(kept, &incoming)
        });
        match existing {
            Some(kept) => fold(kept, incoming),
            None => out.push(incoming),
        }
    }
    out
}

fn labels_overlap(a: &SuggestedEntity, b: &SuggestedEntity) -> bool {
    let a = meaningful_labels(&a.labels);
    let b = meaningful_labels(&b.labels);
    a.is_empty() || b.is_empty() || a.iter().any(|label| b.contains(label))
}

fn fold(kept: &mut SuggestedEntity, other: SuggestedEntity) {
    kept.labels = union_labels(&kept.labels, &other.labels);

    let summary = other.summary.trim();
    if !summary.is_empty() && !kept.summary.contains(summary) {
        kept.summary = if kept.summary.trim().is_empty() {
            summary.to_string()
        } else {
            format!("{} {}", kept.summary.trim(), summary)
        };
    }

    for (key, value) in other.properties {
        kept.properties.entry(key).or_insert(value);
    }
    if kept.id.is_none() {
        kept.id = other.id;
    }
}
