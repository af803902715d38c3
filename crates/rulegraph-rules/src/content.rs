//! Content rules and specifications.

use serde::{Deserialize, Serialize};

use crate::related::{PropertySpecification, RelatedPropertiesSpecification, RequiredRelationDirection};

/// What a content specification selects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "specType", rename_all_fields = "camelCase")]
pub enum ContentSpecificationKind {
    /// Content of the input (selected) instances themselves.
    SelectedNodeInstances {
        /// Schemas the input class must belong to. Empty accepts any.
        #[serde(default)]
        accepted_schema_names: Vec<String>,
        /// Full names of classes the input class must match. Empty accepts any.
        #[serde(default)]
        accepted_class_names: Vec<String>,
        /// Match accepted classes polymorphically.
        #[serde(default)]
        accept_polymorphically: bool,
    },
    /// Content of every instance of the listed classes.
    ContentInstancesOfSpecificClasses {
        /// Class-list filter naming the classes.
        classes: String,
        /// Select the classes polymorphically.
        #[serde(default)]
        are_polymorphic: bool,
        /// Filter expression passed through to the query.
        #[serde(default)]
        instance_filter: String,
    },
    /// Content of instances related to the input instances.
    ContentRelatedInstances {
        /// Class-list filter of relationships to follow. Empty means any.
        #[serde(default)]
        relationships: String,
        /// Class-list filter of related classes. Empty means any.
        #[serde(default)]
        related_classes: String,
        /// Direction to follow relationships in.
        #[serde(default)]
        required_direction: RequiredRelationDirection,
        /// Number of relationship levels to skip before selecting.
        #[serde(default)]
        skip_related_level: i32,
        /// Follow relationships recursively.
        #[serde(default)]
        is_recursive: bool,
        /// Filter expression passed through to the query.
        #[serde(default)]
        instance_filter: String,
    },
}

/// A content specification with the settings shared by every kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSpecification {
    /// Kind-specific settings.
    #[serde(flatten)]
    pub kind: ContentSpecificationKind,
    /// Higher priority specifications are compiled first.
    #[serde(default)]
    pub priority: i32,
    /// Related properties to include.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_properties: Vec<RelatedPropertiesSpecification>,
    /// Overrides for the selected class's properties.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub property_overrides: Vec<PropertySpecification>,
}

impl ContentSpecification {
    /// Create a specification of the given kind.
    pub fn new(kind: ContentSpecificationKind) -> Self {
        Self {
            kind,
            priority: 0,
            related_properties: Vec::new(),
            property_overrides: Vec::new(),
        }
    }

    /// Selected node instances, accepting any input class.
    pub fn selected_node_instances() -> Self {
        Self::new(ContentSpecificationKind::SelectedNodeInstances {
            accepted_schema_names: Vec::new(),
            accepted_class_names: Vec::new(),
            accept_polymorphically: false,
        })
    }

    /// Instances of the classes named by the class-list filter.
    pub fn instances_of(classes: impl Into<String>, polymorphic: bool) -> Self {
        Self::new(ContentSpecificationKind::ContentInstancesOfSpecificClasses {
            classes: classes.into(),
            are_polymorphic: polymorphic,
            instance_filter: String::new(),
        })
    }

    /// Instances related to the input through the given relationships.
    pub fn related_instances(
        relationships: impl Into<String>,
        related_classes: impl Into<String>,
        direction: RequiredRelationDirection,
    ) -> Self {
        Self::new(ContentSpecificationKind::ContentRelatedInstances {
            relationships: relationships.into(),
            related_classes: related_classes.into(),
            required_direction: direction,
            skip_related_level: 0,
            is_recursive: false,
            instance_filter: String::new(),
        })
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
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

    /// Set the instance filter, if the kind has one.
    pub fn with_instance_filter(mut self, filter: impl Into<String>) -> Self {
        match &mut self.kind {
            ContentSpecificationKind::ContentInstancesOfSpecificClasses { instance_filter, .. }
            | ContentSpecificationKind::ContentRelatedInstances { instance_filter, .. } => {
                *instance_filter = filter.into();
            }
            ContentSpecificationKind::SelectedNodeInstances { .. } => {}
        }
        self
    }

    /// Instance filter expression, empty when the kind has none.
    pub fn instance_filter(&self) -> &str {
        match &self.kind {
            ContentSpecificationKind::ContentInstancesOfSpecificClasses { instance_filter, .. }
            | ContentSpecificationKind::ContentRelatedInstances { instance_filter, .. } => instance_filter,
            ContentSpecificationKind::SelectedNodeInstances { .. } => "",
        }
    }
}

/// A content rule: a list of specifications applied together.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRule {
    /// Opaque condition expression, evaluated by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Rule priority.
    #[serde(default)]
    pub priority: i32,
    /// Specifications of this rule.
    #[serde(default)]
    pub specifications: Vec<ContentSpecification>,
}

impl ContentRule {
    /// Create an empty rule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a specification.
    pub fn with_specification(mut self, spec: ContentSpecification) -> Self {
        self.specifications.push(spec);
        self
    }

    /// Specifications ordered by descending priority. Equal priorities keep declaration order.
    pub fn ordered_specifications(&self) -> Vec<&ContentSpecification> {
        let mut specs: Vec<&ContentSpecification> = self.specifications.iter().collect();
        specs.sort_by(|a, b| b.priority.cmp(&a.priority));
        specs
    }
}
