//! Catalog and content compilation configuration.

use crate::query::{RELATED_ALIAS, SELECT_ALIAS};

/// Default hop limit for unbounded (`depth = -1`) traversals.
pub const DEFAULT_MAX_TRAVERSAL_DEPTH: usize = 16;

/// Configuration for a [`SchemaCatalog`](crate::catalog::SchemaCatalog).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Maximum number of hops an unbounded traversal may take.
    pub max_traversal_depth: usize,

    /// Maximum number of path cache entries. None means unbounded.
    pub path_cache_capacity: Option<usize>,

    /// Maximum number of polymorphic relation cache entries. None means unbounded.
    pub polymorphic_cache_capacity: Option<usize>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            max_traversal_depth: DEFAULT_MAX_TRAVERSAL_DEPTH,
            path_cache_capacity: None,
            polymorphic_cache_capacity: None,
        }
    }
}

impl CatalogConfig {
    /// Configuration with unbounded caches.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Configuration with both caches bounded to `capacity` entries.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            path_cache_capacity: Some(capacity),
            polymorphic_cache_capacity: Some(capacity),
            ..Default::default()
        }
    }

    /// Set the traversal hop limit.
    pub fn max_traversal_depth(mut self, depth: usize) -> Self {
        self.max_traversal_depth = depth.max(1);
        self
    }

    /// Set the path cache capacity.
    pub fn path_cache_capacity(mut self, capacity: usize) -> Self {
        self.path_cache_capacity = Some(capacity);
        self
    }

    /// Set the polymorphic relation cache capacity.
    pub fn polymorphic_cache_capacity(mut self, capacity: usize) -> Self {
        self.polymorphic_cache_capacity = Some(capacity);
        self
    }
}

/// Aliases and row shape of compiled content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentConfig {
    /// Alias of the input instance in related-instance content.
    pub related_instance_alias: String,
    /// Alias of the selected class.
    pub select_alias: String,
    /// Merge all content rows into one, showing differing values as varies.
    pub merge_rows: bool,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            related_instance_alias: RELATED_ALIAS.to_string(),
            select_alias: SELECT_ALIAS.to_string(),
            merge_rows: false,
        }
    }
}

impl ContentConfig {
    /// Set whether content rows get merged.
    pub fn merge_rows(mut self, merge: bool) -> Self {
        self.merge_rows = merge;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unbounded() {
        let config = CatalogConfig::default();
        assert_eq!(config.max_traversal_depth, DEFAULT_MAX_TRAVERSAL_DEPTH);
        assert_eq!(config.path_cache_capacity, None);
        assert_eq!(config, CatalogConfig::unbounded());
    }

    #[test]
    fn test_builder() {
        let config = CatalogConfig::bounded(8)
            .max_traversal_depth(0)
            .polymorphic_cache_capacity(2);
        assert_eq!(config.max_traversal_depth, 1);
        assert_eq!(config.path_cache_capacity, Some(8));
        assert_eq!(config.polymorphic_cache_capacity, Some(2));
    }

    #[test]
    fn test_content_config_defaults() {
        let config = ContentConfig::default();
        assert_eq!(config.select_alias, "this");
        assert_eq!(config.related_instance_alias, "related");
        assert!(!config.merge_rows);
        assert!(config.merge_rows(true).merge_rows);
    }
}
