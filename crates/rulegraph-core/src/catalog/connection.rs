//! Read-only access to schemas and instance data.

use std::sync::Arc;

use dashmap::DashMap;

use super::schema::{ClassId, SchemaSet};

/// A connection to a data source: schema metadata plus instance existence checks.
///
/// Implementations must be shareable between threads since one catalog
/// may serve concurrent compilations.
pub trait Connection: Send + Sync {
    /// Schema metadata of the data source.
    fn schemas(&self) -> &SchemaSet;

    /// Check whether instances of `class` exist.
    ///
    /// With `polymorphic`, instances of subclasses count too. `filter` is an
    /// opaque instance filter expression; implementations that can't evaluate
    /// it should ignore it.
    fn has_instances(&self, class: ClassId, polymorphic: bool, filter: Option<&str>) -> bool;
}

/// In-memory connection with per-class instance counts.
pub struct MemoryConnection {
    schemas: Arc<SchemaSet>,
    counts: DashMap<ClassId, u64>,
    filtered_counts: DashMap<(ClassId, String), u64>,
}

impl MemoryConnection {
    /// Create a connection with no instances.
    pub fn new(schemas: impl Into<Arc<SchemaSet>>) -> Self {
        Self {
            schemas: schemas.into(),
            counts: DashMap::new(),
            filtered_counts: DashMap::new(),
        }
    }

    /// Set the number of instances of exactly `class`.
    pub fn set_instance_count(&self, class: ClassId, count: u64) {
        self.counts.insert(class, count);
    }

    /// Set the number of instances of exactly `class` matching `filter`.
    pub fn set_filtered_instance_count(&self, class: ClassId, filter: impl Into<String>, count: u64) {
        self.filtered_counts.insert((class, filter.into()), count);
    }

    /// Number of instances of exactly `class`.
    pub fn instance_count(&self, class: ClassId) -> u64 {
        self.counts.get(&class).map(|c| *c).unwrap_or(0)
    }

    fn count_for(&self, class: ClassId, filter: Option<&str>) -> u64 {
        match filter {
            Some(filter) if !filter.is_empty() => {
                let key = (class, filter.to_string());
                match self.filtered_counts.get(&key) {
                    Some(count) => *count,
                    None => self.instance_count(class),
                }
            }
            _ => self.instance_count(class),
        }
    }
}

impl Connection for MemoryConnection {
    fn schemas(&self) -> &SchemaSet {
        &self.schemas
    }

    fn has_instances(&self, class: ClassId, polymorphic: bool, filter: Option<&str>) -> bool {
        if self.count_for(class, filter) > 0 {
            return true;
        }
        polymorphic
            && self
                .schemas
                .all_derived_classes(class)
                .into_iter()
                .any(|derived| self.count_for(derived, filter) > 0)
    }
}
