//! Content sources: what to select and how it reaches the input.

use serde::Serialize;

use crate::catalog::ClassId;
use crate::query::{RelatedClassPath, SelectClass};

/// One selected class of compiled content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentSource {
    /// Class whose instances are selected.
    pub select_class: SelectClass,
    /// Class supplying the displayed properties, when not the select class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties_source: Option<ClassId>,
    /// Path from the select class to the input class, ready to be joined.
    /// Empty when the select class is the input itself.
    pub input_path: RelatedClassPath,
}

impl ContentSource {
    pub fn new(select_class: SelectClass) -> Self {
        Self {
            select_class,
            properties_source: None,
            input_path: RelatedClassPath::new(),
        }
    }

    pub fn with_properties_source(mut self, class: Option<ClassId>) -> Self {
        self.properties_source = class;
        self
    }

    pub fn with_input_path(mut self, path: RelatedClassPath) -> Self {
        self.input_path = path;
        self
    }

    /// Class whose properties are displayed.
    pub fn properties_class(&self) -> ClassId {
        self.properties_source.unwrap_or(self.select_class.class)
    }
}
