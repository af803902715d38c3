//! Rulegraph Core - Schema catalog, relationship path resolution and content compilation.
//!
//! This crate resolves class names and relationship paths against loaded
//! schemas, compiles presentation content rules into content sources and
//! renders them as query trees.
//!
//! # Modules
//!
//! - [`catalog`] - Schema model, class-list filters and the schema catalog
//! - [`query`] - Relationship paths, caches, fields, contracts and the query tree
//! - [`content`] - Content sources, rule matching and the content builder
//! - [`config`] - Catalog and content configuration
//! - [`error`] - Error types

pub mod catalog;
pub mod config;
pub mod content;
pub mod error;
pub mod query;

pub use catalog::{
    ClassDef, ClassId, ClassListFilter, Connection, MemoryConnection, PropertyDef,
    RelationshipPathOptions, SchemaCatalog, SchemaDef, SchemaSet,
};
pub use config::{CatalogConfig, ContentConfig};
pub use content::{
    build_content_query, build_grouping_queries, build_instance_nodes_query, CompiledContent,
    CompiledSource, ContentBuilder, ContentSource, CustomizationRuleMatcher, RulesetMatcher,
};
pub use error::{Error, Result};
pub use query::{
    Contract, Query, RelatedClassPath, RelatedClassStep, RelationUseCounter, RelationshipDirection,
    SelectClass,
};

/// Re-export the ruleset model.
pub use rulegraph_rules as rules;
