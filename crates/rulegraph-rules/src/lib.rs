//! Presentation ruleset model.
//!
//! This crate holds the read-only ruleset fragment the rulegraph compiler
//! consumes: content rules and their specifications, related properties
//! specifications, content modifiers, instance label overrides and grouping
//! rules. Everything deserializes from the JSON ruleset format with serde.
//!
//! # Modules
//!
//! - [`content`] - Content rules and content specifications
//! - [`related`] - Related properties specifications and property overrides
//! - [`customization`] - Content modifiers, label overrides, grouping
//! - [`ruleset`] - The ruleset fragment and its loaders
//! - [`error`] - Ruleset error types

pub mod content;
pub mod customization;
pub mod error;
pub mod related;
pub mod ruleset;

pub use error::Error;

pub use content::{ContentRule, ContentSpecification, ContentSpecificationKind};
pub use customization::{
    ContentModifier, GroupSpecification, GroupingRule, InstanceLabelOverride, PropertyRange,
};
pub use related::{
    PropertyNames, PropertySpecification, RelatedPropertiesSpecification,
    RequiredRelationDirection, ALL_PROPERTIES_KEYWORD, NO_PROPERTIES_KEYWORD,
};
pub use ruleset::Ruleset;
