//! Schema generation for benchmarks.
//!
//! Schemas are generated deterministically so runs are comparable.

use std::sync::Arc;

use rulegraph_core::catalog::{
    ClassDef, ClassId, ConstraintDef, MemoryConnection, Multiplicity, NavigationDirection,
    PropertyDef, SchemaDef, SchemaSet,
};
use rulegraph_core::{CatalogConfig, Result, SchemaCatalog};

/// Scale factor for generated schemas.
#[derive(Clone, Copy, Debug, Default)]
pub enum Scale {
    /// A handful of classes, for quick iteration.
    Tiny,
    /// Tens of classes.
    #[default]
    Small,
    /// Hundreds of classes.
    Medium,
}

impl Scale {
    /// Number of entity classes in the relationship chain.
    pub fn classes(&self) -> usize {
        match self {
            Scale::Tiny => 4,
            Scale::Small => 32,
            Scale::Medium => 256,
        }
    }

    /// Number of derived classes per chain class.
    pub fn derived_per_class(&self) -> usize {
        match self {
            Scale::Tiny => 1,
            Scale::Small => 3,
            Scale::Medium => 4,
        }
    }
}

/// Name of the `i`th chain class.
pub fn node_name(i: usize) -> String {
    format!("Node{}", i)
}

/// Generate a schema of chained classes.
///
/// `Node{i}` relates to `Node{i+1}` through `Node{i}HasNext`, the last node
/// refers back to the first one, and every node has derived classes and a
/// navigation property to its predecessor.
pub fn generate_schema(scale: Scale) -> Result<SchemaSet> {
    let count = scale.classes();
    let mut schema = SchemaDef::new("Bench", "b");
    for i in 0..count {
        let mut class = ClassDef::entity(node_name(i))
            .with_property(PropertyDef::string("Name"))
            .with_property(PropertyDef::string("Code").with_category("General"));
        if i > 0 {
            class = class.with_property(PropertyDef::navigation(
                "Previous",
                format!("{}HasNext", node_name(i - 1)),
                NavigationDirection::Backward,
            ));
        }
        schema = schema.with_class(class);
        for d in 0..scale.derived_per_class() {
            schema = schema.with_class(
                ClassDef::entity(format!("{}Kind{}", node_name(i), d))
                    .with_base(node_name(i))
                    .with_property(PropertyDef::string(format!("Extra{}", d))),
            );
        }
    }
    for i in 0..count {
        let next = (i + 1) % count;
        let name = if next == 0 {
            format!("{}RefersToFirst", node_name(i))
        } else {
            format!("{}HasNext", node_name(i))
        };
        schema = schema.with_class(ClassDef::relationship(
            name,
            ConstraintDef::new([node_name(i)]).with_multiplicity(Multiplicity::zero_one()),
            ConstraintDef::new([node_name(next)]),
        ));
    }

    SchemaSet::from_defs(vec![schema])
}

/// Shared state for benchmarks.
pub struct BenchContext {
    pub catalog: SchemaCatalog,
    pub connection: Arc<MemoryConnection>,
    pub scale: Scale,
}

impl BenchContext {
    /// Create a context with a specific scale.
    pub fn with_scale(scale: Scale) -> Result<Self> {
        Self::with_config(scale, CatalogConfig::default())
    }

    /// Create a context with a specific scale and catalog configuration.
    ///
    /// The first derived class of every node gets instances.
    pub fn with_config(scale: Scale, config: CatalogConfig) -> Result<Self> {
        let connection = Arc::new(MemoryConnection::new(generate_schema(scale)?));
        let catalog = SchemaCatalog::with_config(connection.clone(), config);
        let ctx = Self {
            catalog,
            connection,
            scale,
        };
        for i in 0..scale.classes() {
            if let Some(kind) = ctx.catalog.resolve_class("Bench", &format!("{}Kind0", node_name(i))) {
                ctx.connection.set_instance_count(kind, 10);
            }
        }
        Ok(ctx)
    }

    /// Id of the `i`th chain class.
    pub fn node(&self, i: usize) -> Option<ClassId> {
        self.catalog.resolve_class("Bench", &node_name(i))
    }
}
