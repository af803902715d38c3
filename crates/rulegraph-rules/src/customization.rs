//! Customization rules: content modifiers, label overrides and grouping.

use serde::{Deserialize, Serialize};

use crate::related::{PropertySpecification, RelatedPropertiesSpecification};

/// Extra content applied whenever a class (or a subclass of it) is the root of a content specification.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentModifier {
    /// Schema of the modified class.
    pub schema_name: String,
    /// Name of the modified class.
    pub class_name: String,
    /// Related properties added to the class's content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_properties: Vec<RelatedPropertiesSpecification>,
    /// Overrides for the class's properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub property_overrides: Vec<PropertySpecification>,
}

impl ContentModifier {
    /// Create a modifier for `schema:class`.
    pub fn new(schema_name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            class_name: class_name.into(),
            ..Default::default()
        }
    }

    /// Add a related properties specification.
    pub fn with_related_properties(mut self, spec: RelatedPropertiesSpecification) -> Self {
        self.related_properties.push(spec);
        self
    }

    /// Add a property override.
    pub fn with_override(mut self, spec: PropertySpecification) -> Self {
        self.property_overrides.push(spec);
        self
    }
}

/// Instance label override: labels come from the first non-empty listed property.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceLabelOverride {
    /// Full name of the class (`Schema:Class`).
    pub class_name: String,
    /// Properties tried in order.
    pub property_names: Vec<String>,
}

impl InstanceLabelOverride {
    /// Create a label override.
    pub fn new<I, S>(class_name: impl Into<String>, property_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            class_name: class_name.into(),
            property_names: property_names.into_iter().map(Into::into).collect(),
        }
    }
}

/// A value range of a property group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRange {
    /// Lower bound (inclusive).
    pub from: String,
    /// Upper bound (inclusive).
    pub to: String,
    /// Label of the range group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// How instances of a class get grouped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "specType", rename_all_fields = "camelCase")]
pub enum GroupSpecification {
    /// Group by the instance's class, optionally below a base class.
    ClassGroup {
        /// Full name of the base class to group under.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_class: Option<String>,
    },
    /// Group by a property's value or by value ranges.
    PropertyGroup {
        /// Name of the grouping property.
        property_name: String,
        /// Ranges; empty groups by distinct value.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        ranges: Vec<PropertyRange>,
    },
    /// Group instances that share a display label.
    SameLabelInstanceGroup,
    /// Group related instances by the relationship they were reached through.
    RelationshipGroup,
}

/// Grouping rule for a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupingRule {
    /// Full name of the grouped class.
    pub class_name: String,
    /// Groups applied, outermost first.
    pub groups: Vec<GroupSpecification>,
}

impl GroupingRule {
    /// Create a grouping rule for the class named `Schema:Class`.
    pub fn new(class_name: impl Into<String>, groups: Vec<GroupSpecification>) -> Self {
        Self {
            class_name: class_name.into(),
            groups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_modifier() {
        let json = r#"{
            "schemaName": "Test",
            "className": "Gadget",
            "relatedProperties": [{ "relationships": "Test:WidgetHasGadget", "properties": ["MyID"] }]
        }"#;
        let modifier: ContentModifier = serde_json::from_str(json).unwrap();
        assert_eq!(modifier.schema_name, "Test");
        assert_eq!(modifier.class_name, "Gadget");
        assert_eq!(modifier.related_properties.len(), 1);
    }

    #[test]
    fn test_parse_groups() {
        let json = r#"{
            "className": "Test:Widget",
            "groups": [
                { "specType": "ClassGroup", "baseClass": "Test:Base" },
                { "specType": "PropertyGroup", "propertyName": "Size",
                  "ranges": [{ "from": "0", "to": "10", "label": "Small" }] },
                { "specType": "SameLabelInstanceGroup" },
                { "specType": "RelationshipGroup" }
            ]
        }"#;
        let rule: GroupingRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.groups.len(), 4);
        assert_eq!(rule.groups[3], GroupSpecification::RelationshipGroup);
        assert_eq!(
            rule.groups[0],
            GroupSpecification::ClassGroup {
                base_class: Some("Test:Base".into())
            }
        );
        match &rule.groups[1] {
            GroupSpecification::PropertyGroup { property_name, ranges } => {
                assert_eq!(property_name, "Size");
                assert_eq!(ranges[0].label.as_deref(), Some("Small"));
            }
            other => panic!("unexpected group: {:?}", other),
        }
    }
}
