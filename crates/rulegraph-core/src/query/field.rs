//! Selectable fields of a generated query.
//!
//! Fields are immutable once built and shared between contracts and query
//! nodes through [`Arc`].

use std::fmt;
use std::sync::Arc;

/// Where a field is visible when a query is nested inside another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldVisibility {
    /// Only selected by the inner query.
    Inner,
    /// Only selected by the outer query.
    Outer,
    /// Selected at both levels.
    #[default]
    Both,
}

impl FieldVisibility {
    /// Check whether the inner query selects the field.
    pub fn includes_inner(&self) -> bool {
        matches!(self, FieldVisibility::Inner | FieldVisibility::Both)
    }

    /// Check whether the outer query selects the field.
    pub fn includes_outer(&self) -> bool {
        matches!(self, FieldVisibility::Outer | FieldVisibility::Both)
    }
}

/// Callback producing a select clause for an optional prefix.
pub type DynamicClause = Arc<dyn Fn(Option<&str>) -> String + Send + Sync>;

/// Variant payload of a field.
#[derive(Clone)]
pub enum FieldKind {
    /// Literal select-clause text.
    Simple { clause: String },
    /// A function call over sub-fields.
    Function {
        name: String,
        params: Vec<Arc<Field>>,
    },
    /// Clause computed from the prefix at render time.
    Dynamic(DynamicClause),
    /// A field merged across rows, with a literal for divergent values.
    Merge { field: Arc<Field>, fallback: String },
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Simple { clause } => f.debug_struct("Simple").field("clause", clause).finish(),
            FieldKind::Function { name, params } => f
                .debug_struct("Function")
                .field("name", name)
                .field("params", params)
                .finish(),
            FieldKind::Dynamic(_) => f.write_str("Dynamic"),
            FieldKind::Merge { field, fallback } => f
                .debug_struct("Merge")
                .field("field", field)
                .field("fallback", fallback)
                .finish(),
        }
    }
}

/// A named, selectable field.
#[derive(Debug, Clone)]
pub struct Field {
    default_name: String,
    name_override: Option<String>,
    group_clause: Option<String>,
    allows_prefix: bool,
    is_aggregate: bool,
    visibility: FieldVisibility,
    prefix_override: Option<String>,
    kind: FieldKind,
}

impl Field {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            default_name: name.into(),
            name_override: None,
            group_clause: None,
            allows_prefix: true,
            is_aggregate: false,
            visibility: FieldVisibility::Both,
            prefix_override: None,
            kind,
        }
    }

    /// A field selecting literal clause text.
    pub fn simple(name: impl Into<String>, clause: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Simple { clause: clause.into() })
    }

    /// A field calling `function` with the given parameters.
    pub fn function(name: impl Into<String>, function: impl Into<String>, params: Vec<Arc<Field>>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Function {
                name: function.into(),
                params,
            },
        )
    }

    /// A field whose clause is computed from the prefix.
    pub fn dynamic<F>(name: impl Into<String>, clause: F) -> Self
    where
        F: Fn(Option<&str>) -> String + Send + Sync + 'static,
    {
        Self::with_kind(name, FieldKind::Dynamic(Arc::new(clause)))
    }

    /// Merge `field` across rows; divergent values render as `fallback`.
    ///
    /// Merge fields are aggregates and keep the wrapped field's name.
    pub fn merge(field: Arc<Field>, fallback: impl Into<String>) -> Self {
        let mut merged = Self::with_kind(
            field.name().to_string(),
            FieldKind::Merge {
                fallback: fallback.into(),
                field: Arc::clone(&field),
            },
        );
        merged.is_aggregate = true;
        merged.visibility = field.visibility;
        merged
    }

    /// A constant literal that must never be prefixed.
    pub fn constant(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::simple(name, value).without_prefix()
    }

    /// Override the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name_override = Some(name.into());
        self
    }

    /// Set the grouping clause.
    pub fn with_group_clause(mut self, clause: impl Into<String>) -> Self {
        self.group_clause = Some(clause.into());
        self
    }

    /// Disallow prefixing the clause.
    pub fn without_prefix(mut self) -> Self {
        self.allows_prefix = false;
        self
    }

    /// Mark the field as an aggregate.
    pub fn aggregate(mut self) -> Self {
        self.is_aggregate = true;
        self
    }

    /// Set the visibility.
    pub fn with_visibility(mut self, visibility: FieldVisibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Use `prefix` instead of the caller's prefix.
    pub fn with_prefix_override(mut self, prefix: impl Into<String>) -> Self {
        self.prefix_override = Some(prefix.into());
        self
    }

    /// Finish building and share.
    pub fn into_shared(self) -> Arc<Field> {
        Arc::new(self)
    }

    /// Effective name.
    pub fn name(&self) -> &str {
        self.name_override.as_deref().unwrap_or(&self.default_name)
    }

    /// Name given at construction.
    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    /// Clause used in `GROUP BY`; the name unless overridden.
    pub fn group_clause(&self) -> &str {
        self.group_clause.as_deref().unwrap_or_else(|| self.name())
    }

    pub fn allows_prefix(&self) -> bool {
        self.allows_prefix
    }

    pub fn is_aggregate(&self) -> bool {
        self.is_aggregate
    }

    pub fn visibility(&self) -> FieldVisibility {
        self.visibility
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    fn effective_prefix<'a>(&'a self, prefix: Option<&'a str>) -> Option<&'a str> {
        if !self.allows_prefix {
            return None;
        }
        self.prefix_override.as_deref().or(prefix).filter(|p| !p.is_empty())
    }

    /// Render the select clause.
    ///
    /// With `use_field_names` the field is referenced by name, as an outer
    /// query selecting from a nested one does.
    pub fn select_clause(&self, prefix: Option<&str>, use_field_names: bool) -> String {
        let prefix = self.effective_prefix(prefix);
        if use_field_names {
            return match prefix {
                Some(prefix) => format!("[{}].[{}]", prefix, self.name()),
                None => format!("[{}]", self.name()),
            };
        }
        match &self.kind {
            FieldKind::Simple { clause } => match prefix {
                Some(prefix) => format!("[{}].{}", prefix, clause),
                None => clause.clone(),
            },
            FieldKind::Function { name, params } => {
                let params: Vec<String> = params
                    .iter()
                    .map(|p| p.select_clause(prefix, false))
                    .collect();
                format!("{}({})", name, params.join(", "))
            }
            FieldKind::Dynamic(clause) => clause(prefix),
            FieldKind::Merge { field, fallback } => {
                let inner = field.select_clause(prefix, false);
                format!(
                    "CASE WHEN COUNT(DISTINCT {inner}) = 1 THEN MAX({inner}) ELSE '{}' END",
                    fallback.replace('\'', "''")
                )
            }
        }
    }
}
