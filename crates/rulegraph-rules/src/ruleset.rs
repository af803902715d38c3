//! Ruleset fragments.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::content::ContentRule;
use crate::customization::{ContentModifier, GroupingRule, InstanceLabelOverride};
use crate::error::Error;

/// The read-only slice of a presentation ruleset the compiler consumes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ruleset {
    /// Ruleset identifier.
    pub id: String,
    /// Comma-separated schema names the ruleset applies to; `E:` prefix excludes.
    #[serde(default)]
    pub supported_schemas: String,
    /// Content rules.
    #[serde(default)]
    pub content_rules: Vec<ContentRule>,
    /// Content modifiers.
    #[serde(default)]
    pub content_modifiers: Vec<ContentModifier>,
    /// Instance label overrides.
    #[serde(default)]
    pub instance_label_overrides: Vec<InstanceLabelOverride>,
    /// Grouping rules.
    #[serde(default)]
    pub grouping_rules: Vec<GroupingRule>,
}

impl Ruleset {
    /// Create an empty ruleset.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Parse and validate a ruleset from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let ruleset: Ruleset = serde_json::from_str(json)?;
        ruleset.validate()?;
        Ok(ruleset)
    }

    /// Read, parse and validate a ruleset file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check the ruleset for problems the compiler can't recover from.
    pub fn validate(&self) -> Result<(), Error> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidRuleset("ruleset id is empty".into()));
        }
        for modifier in &self.content_modifiers {
            if modifier.schema_name.is_empty() || modifier.class_name.is_empty() {
                return Err(Error::InvalidRuleset(format!(
                    "content modifier '{}:{}' must name a schema and a class",
                    modifier.schema_name, modifier.class_name
                )));
            }
        }
        for label_override in &self.instance_label_overrides {
            if label_override.property_names.is_empty() {
                return Err(Error::InvalidRuleset(format!(
                    "label override for '{}' lists no properties",
                    label_override.class_name
                )));
            }
        }
        Ok(())
    }

    /// Set the supported schemas.
    pub fn with_supported_schemas(mut self, schemas: impl Into<String>) -> Self {
        self.supported_schemas = schemas.into();
        self
    }

    /// Add a content rule.
    pub fn with_content_rule(mut self, rule: ContentRule) -> Self {
        self.content_rules.push(rule);
        self
    }

    /// Add a content modifier.
    pub fn with_content_modifier(mut self, modifier: ContentModifier) -> Self {
        self.content_modifiers.push(modifier);
        self
    }

    /// Add an instance label override.
    pub fn with_label_override(mut self, label_override: InstanceLabelOverride) -> Self {
        self.instance_label_overrides.push(label_override);
        self
    }

    /// Add a grouping rule.
    pub fn with_grouping_rule(mut self, rule: GroupingRule) -> Self {
        self.grouping_rules.push(rule);
        self
    }
}
