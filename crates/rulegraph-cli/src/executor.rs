//! Command execution.

use std::path::PathBuf;
use std::sync::Arc;

use rulegraph_core::catalog::{MemoryConnection, SchemaSet};
use rulegraph_core::content::{
    build_content_query, build_grouping_queries, build_instance_nodes_query, CompiledContent, ContentBuilder,
    ContentConfig, RulesetMatcher,
};
use rulegraph_core::query::{RelationUseCounter, SelectClass};
use rulegraph_core::{CatalogConfig, RelationshipPathOptions, SchemaCatalog};
use rulegraph_rules::Ruleset;
use thiserror::Error;
use tracing::info;

use crate::formatter::Formatter;
use crate::{CompileArgs, PathsArgs};

/// Execution errors.
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// Schema loading error.
    #[error("{0}")]
    Core(#[from] rulegraph_core::Error),

    /// Ruleset loading error.
    #[error("{0}")]
    Rules(#[from] rulegraph_rules::Error),

    /// A class name did not resolve.
    #[error("unknown class: {0}")]
    UnknownClass(String),

    /// An `--instances` argument is malformed.
    #[error("invalid instance count '{0}', expected Schema:Class=count")]
    InvalidInstances(String),
}

fn load_catalog(paths: &[PathBuf], config: CatalogConfig) -> Result<(SchemaCatalog, Arc<MemoryConnection>), ExecuteError> {
    let schemas = SchemaSet::from_json_files(paths)?;
    info!(
        schemas = schemas.schemas().len(),
        classes = schemas.classes().len(),
        "Loaded schemas"
    );
    let connection = Arc::new(MemoryConnection::new(schemas));
    let catalog = SchemaCatalog::with_config(connection.clone(), config);
    Ok((catalog, connection))
}

fn resolve_select(catalog: &SchemaCatalog, name: &str, polymorphic: bool) -> Result<SelectClass, ExecuteError> {
    catalog
        .resolve_class_by_full_name(name)
        .map(|class| SelectClass::new(class, polymorphic))
        .ok_or_else(|| ExecuteError::UnknownClass(name.to_string()))
}

/// Apply a `Schema:Class=count` argument to the connection.
fn apply_instances(catalog: &SchemaCatalog, connection: &MemoryConnection, arg: &str) -> Result<(), ExecuteError> {
    let (name, count) = arg
        .split_once('=')
        .ok_or_else(|| ExecuteError::InvalidInstances(arg.to_string()))?;
    let count: u64 = count
        .trim()
        .parse()
        .map_err(|_| ExecuteError::InvalidInstances(arg.to_string()))?;
    let class = catalog
        .resolve_class_by_full_name(name.trim())
        .ok_or_else(|| ExecuteError::UnknownClass(name.trim().to_string()))?;
    connection.set_instance_count(class, count);
    Ok(())
}

/// Compile every content rule of the ruleset and format the result.
pub fn compile(args: &CompileArgs, formatter: &dyn Formatter) -> Result<String, ExecuteError> {
    let (catalog, connection) = load_catalog(&args.schemas, CatalogConfig::default())?;
    for instances in &args.instances {
        apply_instances(&catalog, &connection, instances)?;
    }
    let ruleset = Ruleset::from_json_file(&args.ruleset)?;
    ruleset.validate()?;

    let input = args
        .classes
        .iter()
        .map(|name| resolve_select(&catalog, name, args.polymorphic))
        .collect::<Result<Vec<_>, _>>()?;

    let matcher = RulesetMatcher::new(catalog.schemas(), &ruleset);
    let mut builder =
        ContentBuilder::new(&catalog, &matcher).with_config(ContentConfig::default().merge_rows(args.merge));
    let compiled: Vec<_> = ruleset
        .content_rules
        .iter()
        .flat_map(|rule| builder.compile_rule(rule, &input))
        .collect();
    info!(
        rules = ruleset.content_rules.len(),
        specifications = compiled.len(),
        "Compiled ruleset {}",
        ruleset.id
    );

    let mut output = formatter.format_content(catalog.schemas(), &compiled);
    if args.query {
        let queries = render_queries(catalog.schemas(), &compiled);
        output.push_str("\n\n");
        output.push_str(&formatter.format_queries(&queries));
    }
    Ok(output)
}

/// Render each compiled specification's content query, followed by its
/// instance node query and grouping queries.
fn render_queries(schemas: &SchemaSet, compiled: &[CompiledContent]) -> Vec<String> {
    compiled
        .iter()
        .flat_map(|content| {
            build_content_query(content)
                .into_iter()
                .chain(build_instance_nodes_query(content))
                .chain(build_grouping_queries(schemas, content))
        })
        .map(|query| query.to_query_string(schemas))
        .collect()
}

/// Resolve relationship paths from one class and format them.
pub fn paths(args: &PathsArgs, formatter: &dyn Formatter) -> Result<String, ExecuteError> {
    let mut config = CatalogConfig::default();
    if let Some(max_depth) = args.max_depth {
        config = config.max_traversal_depth(max_depth);
    }
    let (catalog, _) = load_catalog(&args.schemas, config)?;
    let source = catalog
        .resolve_class_by_full_name(&args.class)
        .ok_or_else(|| ExecuteError::UnknownClass(args.class.clone()))?;

    let options = RelationshipPathOptions::new(source, args.direction.into())
        .depth(args.depth)
        .classes(&args.classes)
        .relationships(&args.relationships);
    let mut counter = RelationUseCounter::new();
    let paths = catalog.resolve_relationship_paths(&options, &mut counter);
    Ok(formatter.format_paths(catalog.schemas(), &paths))
}
