//! Schema metadata and the catalog that resolves names and relationship paths.
//!
//! Schemas are loaded once into an immutable [`SchemaSet`]; a [`SchemaCatalog`]
//! wraps a [`Connection`] and memoizes path resolutions over it.

mod catalog;
mod class_list;
mod connection;
mod def;
mod schema;

pub use catalog::{RelationshipPathOptions, SchemaCatalog};
pub use class_list::{most_base_entity_classes, ClassListFilter, SchemaList, Token};
pub use connection::{Connection, MemoryConnection};
pub use def::{
    ClassDef, ClassKind, ConstraintDef, Multiplicity, NavigationDirection, PrimitiveType,
    PropertyDef, PropertyKind, RelationshipDef, SchemaDef,
};
pub use schema::{Class, ClassId, Constraint, Relationship, Schema, SchemaId, SchemaSet};
