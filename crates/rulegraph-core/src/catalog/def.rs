//! Schema definition documents.
//!
//! These are the serializable inputs a [`SchemaSet`](super::SchemaSet) is
//! built from. Class references inside a schema may be bare names (same
//! schema) or full names (`Schema:Class` or `Schema.Class`).

use serde::{Deserialize, Serialize};

/// Kind of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClassKind {
    /// An entity type.
    #[default]
    Entity,
    /// A relationship (association) type.
    Relationship,
    /// A struct type, only usable as a property type.
    Struct,
    /// A mixin, applied to entity classes.
    Mixin,
}

/// Primitive property types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Boolean,
    Integer,
    Long,
    Double,
    String,
    DateTime,
    Point2d,
    Point3d,
    Guid,
    Binary,
    Geometry,
}

/// Direction a navigation property points along its relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NavigationDirection {
    /// The property lives on the source end.
    #[default]
    Forward,
    /// The property lives on the target end.
    Backward,
}

/// Kind of a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum PropertyKind {
    /// A single primitive value.
    Primitive {
        /// The value type.
        primitive_type: PrimitiveType,
    },
    /// A struct value.
    Struct {
        /// Name of the struct class.
        struct_class: String,
    },
    /// An array of primitives.
    PrimitiveArray {
        /// The element type.
        primitive_type: PrimitiveType,
    },
    /// An array of structs.
    StructArray {
        /// Name of the struct class.
        struct_class: String,
    },
    /// A reference to a related instance through a relationship.
    Navigation {
        /// Name of the relationship class.
        relationship: String,
        /// Which end of the relationship the property is on.
        #[serde(default)]
        direction: NavigationDirection,
    },
}

/// A property definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    /// Property name (unique within its class).
    pub name: String,
    /// Property kind and type.
    #[serde(flatten)]
    pub kind: PropertyKind,
    /// Hidden properties are not displayed by default.
    #[serde(default)]
    pub is_hidden: bool,
    /// Category name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PropertyDef {
    /// Create a primitive property.
    pub fn primitive(name: impl Into<String>, primitive_type: PrimitiveType) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Primitive { primitive_type },
            is_hidden: false,
            category: None,
        }
    }

    /// Create a string property.
    pub fn string(name: impl Into<String>) -> Self {
        Self::primitive(name, PrimitiveType::String)
    }

    /// Create a navigation property.
    pub fn navigation(
        name: impl Into<String>,
        relationship: impl Into<String>,
        direction: NavigationDirection,
    ) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Navigation {
                relationship: relationship.into(),
                direction,
            },
            is_hidden: false,
            category: None,
        }
    }

    /// Create a struct property.
    pub fn structure(name: impl Into<String>, struct_class: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Struct {
                struct_class: struct_class.into(),
            },
            is_hidden: false,
            category: None,
        }
    }

    /// Mark the property hidden.
    pub fn hidden(mut self) -> Self {
        self.is_hidden = true;
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Check if this is a navigation property.
    pub fn is_navigation(&self) -> bool {
        matches!(self.kind, PropertyKind::Navigation { .. })
    }
}

/// Multiplicity of a relationship end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Multiplicity {
    /// Lower bound.
    pub lower: u32,
    /// Upper bound; `None` means unbounded.
    #[serde(default)]
    pub upper: Option<u32>,
}

impl Default for Multiplicity {
    fn default() -> Self {
        Self::zero_many()
    }
}

impl Multiplicity {
    /// `(0..1)`
    pub fn zero_one() -> Self {
        Self { lower: 0, upper: Some(1) }
    }

    /// `(0..*)`
    pub fn zero_many() -> Self {
        Self { lower: 0, upper: None }
    }

    /// `(1..1)`
    pub fn one_one() -> Self {
        Self { lower: 1, upper: Some(1) }
    }

    /// `(1..*)`
    pub fn one_many() -> Self {
        Self { lower: 1, upper: None }
    }

    /// Check whether the end may be absent.
    pub fn is_optional(&self) -> bool {
        self.lower == 0
    }
}

fn default_polymorphic() -> bool {
    true
}

/// One end of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDef {
    /// Classes allowed at this end.
    pub classes: Vec<String>,
    /// Whether subclasses of the listed classes are allowed too.
    #[serde(default = "default_polymorphic")]
    pub polymorphic: bool,
    /// Multiplicity of this end.
    #[serde(default)]
    pub multiplicity: Multiplicity,
}

impl ConstraintDef {
    /// Create a polymorphic `(0..*)` constraint.
    pub fn new<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: classes.into_iter().map(Into::into).collect(),
            polymorphic: true,
            multiplicity: Multiplicity::default(),
        }
    }

    /// Set the multiplicity.
    pub fn with_multiplicity(mut self, multiplicity: Multiplicity) -> Self {
        self.multiplicity = multiplicity;
        self
    }

    /// Make the constraint exact (non-polymorphic).
    pub fn exact(mut self) -> Self {
        self.polymorphic = false;
        self
    }
}

/// Relationship-specific part of a class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDef {
    /// Source end.
    pub source: ConstraintDef,
    /// Target end.
    pub target: ConstraintDef,
}

/// A class definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDef {
    /// Class name (unique within its schema).
    pub name: String,
    /// Class kind.
    #[serde(default)]
    pub kind: ClassKind,
    /// Base class references.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub base_classes: Vec<String>,
    /// Abstract classes have no instances of their own.
    #[serde(default)]
    pub is_abstract: bool,
    /// Properties declared on this class.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<PropertyDef>,
    /// Relationship ends, for relationship classes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<RelationshipDef>,
}

impl ClassDef {
    /// Create an entity class.
    pub fn entity(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Entity,
            base_classes: Vec::new(),
            is_abstract: false,
            properties: Vec::new(),
            relationship: None,
        }
    }

    /// Create a relationship class.
    pub fn relationship(name: impl Into<String>, source: ConstraintDef, target: ConstraintDef) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Relationship,
            base_classes: Vec::new(),
            is_abstract: false,
            properties: Vec::new(),
            relationship: Some(RelationshipDef { source, target }),
        }
    }

    /// Create a struct class.
    pub fn structure(name: impl Into<String>) -> Self {
        Self {
            kind: ClassKind::Struct,
            ..Self::entity(name)
        }
    }

    /// Add a base class.
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base_classes.push(base.into());
        self
    }

    /// Add a property.
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Mark the class abstract.
    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }
}

/// A schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDef {
    /// Schema name.
    pub name: String,
    /// Short alias used when generating names. Defaults to the schema name.
    #[serde(default)]
    pub alias: String,
    /// Classes of the schema.
    #[serde(default)]
    pub classes: Vec<ClassDef>,
}

impl SchemaDef {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: alias.into(),
            classes: Vec::new(),
        }
    }

    /// Add a class.
    pub fn with_class(mut self, class: ClassDef) -> Self {
        self.classes.push(class);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schema_json() {
        let json = r#"{
            "name": "Test",
            "alias": "t",
            "classes": [
                { "name": "Widget", "properties": [
                    { "name": "MyID", "type": "Primitive", "primitiveType": "String" }
                ]},
                { "name": "Gadget", "properties": [
                    { "name": "Widget", "type": "Navigation", "relationship": "WidgetHasGadget", "direction": "Backward" }
                ]},
                { "name": "WidgetHasGadget", "kind": "Relationship", "relationship": {
                    "source": { "classes": ["Widget"], "multiplicity": { "lower": 0, "upper": 1 } },
                    "target": { "classes": ["Gadget"], "polymorphic": false }
                }}
            ]
        }"#;
        let schema: SchemaDef = serde_json::from_str(json).unwrap();
        assert_eq!(schema.classes.len(), 3);
        assert!(schema.classes[1].properties[0].is_navigation());

        let rel = schema.classes[2].relationship.as_ref().unwrap();
        assert!(rel.source.polymorphic);
        assert!(!rel.target.polymorphic);
        assert_eq!(rel.source.multiplicity, Multiplicity::zero_one());
        assert_eq!(rel.target.multiplicity, Multiplicity::zero_many());
    }

    #[test]
    fn test_multiplicity_optional() {
        assert!(Multiplicity::zero_one().is_optional());
        assert!(!Multiplicity::one_one().is_optional());
    }
}
