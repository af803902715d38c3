//! Related properties specifications.
//!
//! A related properties specification tells the content compiler to join a
//! class related to the one being selected and to pull some (or all) of its
//! properties into the content. Specifications nest: each nested entry is
//! resolved relative to the class joined by its parent.

use serde::{Deserialize, Serialize};

/// Keyword meaning "join the related class but select none of its properties".
pub const NO_PROPERTIES_KEYWORD: &str = "_none_";

/// Keyword meaning "select every property of the related class".
pub const ALL_PROPERTIES_KEYWORD: &str = "*";

/// Direction a relationship must be followed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RequiredRelationDirection {
    /// Follow the relationship from its source to its target.
    Forward,
    /// Follow the relationship from its target to its source.
    Backward,
    /// Either way.
    #[default]
    Both,
}

impl RequiredRelationDirection {
    /// Check whether forward traversal is allowed.
    pub fn allows_forward(&self) -> bool {
        matches!(self, Self::Forward | Self::Both)
    }

    /// Check whether backward traversal is allowed.
    pub fn allows_backward(&self) -> bool {
        matches!(self, Self::Backward | Self::Both)
    }
}

/// Which properties of a related class get selected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "PropertyNamesRepr", into = "PropertyNamesRepr")]
pub enum PropertyNames {
    /// Every property of the related class.
    #[default]
    All,
    /// No properties; the relationship is joined only.
    None,
    /// Only the listed properties.
    Named(Vec<String>),
}

impl PropertyNames {
    /// Create a named property list.
    pub fn named<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Named(names.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum PropertyNamesRepr {
    Keyword(String),
    List(Vec<String>),
}

impl From<PropertyNamesRepr> for PropertyNames {
    fn from(repr: PropertyNamesRepr) -> Self {
        match repr {
            PropertyNamesRepr::Keyword(keyword) => match keyword.trim() {
                NO_PROPERTIES_KEYWORD => PropertyNames::None,
                "" | ALL_PROPERTIES_KEYWORD => PropertyNames::All,
                name => PropertyNames::Named(vec![name.to_string()]),
            },
            PropertyNamesRepr::List(list) => {
                if list.is_empty() || list.iter().any(|n| n == ALL_PROPERTIES_KEYWORD) {
                    PropertyNames::All
                } else if list.len() == 1 && list[0] == NO_PROPERTIES_KEYWORD {
                    PropertyNames::None
                } else {
                    PropertyNames::Named(list)
                }
            }
        }
    }
}

impl From<PropertyNames> for PropertyNamesRepr {
    fn from(names: PropertyNames) -> Self {
        match names {
            PropertyNames::All => PropertyNamesRepr::Keyword(ALL_PROPERTIES_KEYWORD.to_string()),
            PropertyNames::None => PropertyNamesRepr::Keyword(NO_PROPERTIES_KEYWORD.to_string()),
            PropertyNames::Named(list) => PropertyNamesRepr::List(list),
        }
    }
}

/// Per-property display overrides.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySpecification {
    /// Name of the property the override applies to.
    pub name: String,
    /// Force the property to be displayed (or hidden).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_displayed: Option<bool>,
    /// Label to show instead of the property's own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_override: Option<String>,
    /// Display priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Category the property is moved to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PropertySpecification {
    /// Create an override for the named property.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the displayed flag.
    pub fn with_displayed(mut self, displayed: bool) -> Self {
        self.is_displayed = Some(displayed);
        self
    }

    /// Set the label override.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label_override = Some(label.into());
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// A request to include properties of related instances.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedPropertiesSpecification {
    /// Class-list filter of relationships to follow. Empty means any.
    #[serde(default)]
    pub relationships: String,
    /// Class-list filter of related classes. Empty means any.
    #[serde(default)]
    pub related_classes: String,
    /// Direction to follow the relationships in.
    #[serde(default)]
    pub required_direction: RequiredRelationDirection,
    /// Properties to select from the related class.
    #[serde(default)]
    pub properties: PropertyNames,
    /// Resolve related classes polymorphically, restricted to those with data.
    #[serde(default)]
    pub is_polymorphic: bool,
    /// Categories the selected properties are restricted to. Empty means any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Overrides for the related class's properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub property_overrides: Vec<PropertySpecification>,
    /// Specifications resolved relative to the related class.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<RelatedPropertiesSpecification>,
}

impl RelatedPropertiesSpecification {
    /// Create a specification following the given relationships to the given classes.
    pub fn new(relationships: impl Into<String>, related_classes: impl Into<String>) -> Self {
        Self {
            relationships: relationships.into(),
            related_classes: related_classes.into(),
            ..Default::default()
        }
    }

    /// Set the required direction.
    pub fn with_direction(mut self, direction: RequiredRelationDirection) -> Self {
        self.required_direction = direction;
        self
    }

    /// Set the selected properties.
    pub fn with_properties(mut self, properties: PropertyNames) -> Self {
        self.properties = properties;
        self
    }

    /// Mark the specification polymorphic.
    pub fn polymorphic(mut self) -> Self {
        self.is_polymorphic = true;
        self
    }

    /// Restrict selected properties to the given categories.
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    /// Add a property override.
    pub fn with_override(mut self, spec: PropertySpecification) -> Self {
        self.property_overrides.push(spec);
        self
    }

    /// Add a nested specification.
    pub fn with_nested(mut self, nested: RelatedPropertiesSpecification) -> Self {
        self.nested.push(nested);
        self
    }
}
