//! Property appenders decide which properties of a class reach the content.

use rulegraph_rules::PropertySpecification;
use serde::Serialize;

use crate::catalog::{ClassId, PrimitiveType, PropertyDef, PropertyKind};

/// A property selected into content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendedProperty {
    /// Class the property was read from.
    pub class: ClassId,
    pub property: String,
    /// Alias of the class occurrence the property is read from.
    pub alias: String,
    /// Unique field name within the compiled content.
    pub field_name: String,
    /// Number of relationship hops from the select class.
    pub path_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Visibility and override policy for appending properties.
pub trait PropertyAppender {
    /// Check whether `property` would be appended under `overrides`.
    fn supports(&self, property: &PropertyDef, overrides: &[PropertySpecification]) -> bool;

    /// Append `property` read from the class occurrence `alias`. Returns false when skipped.
    fn append(&mut self, property: &PropertyDef, alias: &str, overrides: &[PropertySpecification]) -> bool;

    /// Take the properties appended so far.
    fn take_appended(&mut self) -> Vec<AppendedProperty>;
}

/// What an appender is created for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppenderScope {
    /// Class whose properties get appended.
    pub class: ClassId,
    /// Hops between the select class and `class`.
    pub path_len: usize,
    /// Categories properties are restricted to; empty means any.
    pub categories: Vec<String>,
}

/// Creates an appender per class occurrence.
pub type AppenderFactory = Box<dyn Fn(AppenderScope) -> Box<dyn PropertyAppender> + Send + Sync>;

fn find_override<'a>(property: &PropertyDef, overrides: &'a [PropertySpecification]) -> Option<&'a PropertySpecification> {
    overrides
        .iter()
        .rev()
        .find(|o| o.name.eq_ignore_ascii_case(&property.name))
}

/// Appends displayable primitive and navigation properties.
///
/// Hidden properties need an override displaying them; binary, geometry,
/// array and struct properties are never appended.
#[derive(Debug)]
pub struct DefaultPropertyAppender {
    scope: AppenderScope,
    appended: Vec<AppendedProperty>,
}

impl DefaultPropertyAppender {
    pub fn new(scope: AppenderScope) -> Self {
        Self {
            scope,
            appended: Vec::new(),
        }
    }

    /// Factory creating default appenders.
    pub fn factory() -> AppenderFactory {
        Box::new(|scope| Box::new(DefaultPropertyAppender::new(scope)))
    }
}

impl PropertyAppender for DefaultPropertyAppender {
    fn supports(&self, property: &PropertyDef, overrides: &[PropertySpecification]) -> bool {
        match &property.kind {
            PropertyKind::Primitive {
                primitive_type: PrimitiveType::Binary | PrimitiveType::Geometry,
            }
            | PropertyKind::Struct { .. }
            | PropertyKind::PrimitiveArray { .. }
            | PropertyKind::StructArray { .. } => return false,
            PropertyKind::Primitive { .. } | PropertyKind::Navigation { .. } => {}
        }

        let spec = find_override(property, overrides);
        let displayed = spec
            .and_then(|s| s.is_displayed)
            .unwrap_or(!property.is_hidden);
        if !displayed {
            return false;
        }

        if self.scope.categories.is_empty() {
            return true;
        }
        let category = spec
            .and_then(|s| s.category.as_deref())
            .or(property.category.as_deref());
        category.is_some_and(|c| self.scope.categories.iter().any(|s| s.eq_ignore_ascii_case(c)))
    }

    fn append(&mut self, property: &PropertyDef, alias: &str, overrides: &[PropertySpecification]) -> bool {
        if !self.supports(property, overrides) {
            return false;
        }
        let spec = find_override(property, overrides);
        let field_name = format!("{}_{}", alias, property.name);
        if self.appended.iter().any(|p| p.field_name == field_name) {
            return false;
        }
        self.appended.push(AppendedProperty {
            class: self.scope.class,
            property: property.name.clone(),
            alias: alias.to_string(),
            field_name,
            path_len: self.scope.path_len,
            category: spec
                .and_then(|s| s.category.clone())
                .or_else(|| property.category.clone()),
            label: spec.and_then(|s| s.label_override.clone()),
        });
        true
    }

    fn take_appended(&mut self) -> Vec<AppendedProperty> {
        std::mem::take(&mut self.appended)
    }
}
