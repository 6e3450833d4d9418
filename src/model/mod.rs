//! Value types flowing through resolution and revision.
//!
//! - [`SuggestedEntity`] / [`NamedEntityData`]: extracted mentions and stored entities
//! - [`EntityResolution`] / [`Resolutions`]: what was decided per mention
//! - [`Merge`] / [`KnowledgeGraphDelta`]: what is written for those decisions
//! - [`Proposition`]: claims with confidence and decay

mod delta;
mod entity;
mod proposition;
mod relationship;
mod resolution;

pub use delta::*;
pub use entity::*;
pub use proposition::*;
pub use relationship::*;
pub use resolution::*;
