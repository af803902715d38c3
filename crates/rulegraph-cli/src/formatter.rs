//! Output formatters for compiled content and resolved paths.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use rulegraph_core::catalog::SchemaSet;
use rulegraph_core::content::{CompiledContent, CompiledSource};
use rulegraph_core::query::RelatedClassPath;
use serde_json::json;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format compiled content, one entry per specification.
    fn format_content(&self, schemas: &SchemaSet, contents: &[CompiledContent]) -> String;

    /// Format resolved relationship paths with their include flags.
    fn format_paths(&self, schemas: &SchemaSet, paths: &[(RelatedClassPath, bool)]) -> String;

    /// Format rendered query text.
    fn format_queries(&self, queries: &[String]) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

fn describe_paths(schemas: &SchemaSet, paths: &[RelatedClassPath]) -> Vec<String> {
    paths.iter().map(|p| p.describe(schemas)).collect()
}

fn select_label(schemas: &SchemaSet, source: &CompiledSource) -> String {
    let select = &source.source.select_class;
    let name = &schemas.class(select.class).full_name;
    if select.polymorphic {
        name.clone()
    } else {
        format!("={}", name)
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_content(&self, schemas: &SchemaSet, contents: &[CompiledContent]) -> String {
        if contents.iter().all(CompiledContent::is_empty) {
            return "No content".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["Spec", "Select class", "Input path", "Related paths", "Properties"]);

        for (i, content) in contents.iter().enumerate() {
            for source in &content.sources {
                let mut select = select_label(schemas, source);
                for excluded in &source.excluded {
                    select.push_str(&format!("\n- {}", schemas.class(excluded.select_class.class).full_name));
                }
                let related: Vec<String> = describe_paths(schemas, &source.related_property_paths)
                    .into_iter()
                    .chain(describe_paths(schemas, &source.navigation_paths))
                    .collect();
                let properties: Vec<&str> = source.properties.iter().map(|p| p.field_name.as_str()).collect();
                table.add_row(vec![
                    Cell::new(i),
                    Cell::new(select),
                    Cell::new(source.source.input_path.describe(schemas)),
                    Cell::new(related.join("\n")),
                    Cell::new(properties.join("\n")),
                ]);
            }
        }

        table.to_string()
    }

    fn format_paths(&self, schemas: &SchemaSet, paths: &[(RelatedClassPath, bool)]) -> String {
        if paths.is_empty() {
            return "No paths".to_string();
        }
        let mut table = Table::new();
        table.set_header(vec!["Path", "Include", "Aliases"]);
        for (path, include) in paths {
            let aliases: Vec<&str> = path.steps().iter().map(|s| s.target_alias.as_str()).collect();
            table.add_row(vec![
                Cell::new(path.describe(schemas)),
                Cell::new(if *include { "yes" } else { "no" }),
                Cell::new(aliases.join(", ")),
            ]);
        }
        table.to_string()
    }

    fn format_queries(&self, queries: &[String]) -> String {
        queries.join("\n\n")
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_content(&self, schemas: &SchemaSet, contents: &[CompiledContent]) -> String {
        let specs: Vec<serde_json::Value> = contents
            .iter()
            .map(|content| {
                let sources: Vec<serde_json::Value> = content
                    .sources
                    .iter()
                    .map(|source| {
                        json!({
                            "selectClass": select_label(schemas, source),
                            "inputPath": source.source.input_path.describe(schemas),
                            "relatedPropertyPaths": describe_paths(schemas, &source.related_property_paths),
                            "navigationPaths": describe_paths(schemas, &source.navigation_paths),
                            "compiled": source,
                        })
                    })
                    .collect();
                json!({ "selectAlias": content.select_alias, "sources": sources })
            })
            .collect();
        serde_json::to_string_pretty(&specs).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_paths(&self, schemas: &SchemaSet, paths: &[(RelatedClassPath, bool)]) -> String {
        let paths: Vec<serde_json::Value> = paths
            .iter()
            .map(|(path, include)| {
                json!({
                    "path": path.describe(schemas),
                    "include": include,
                    "steps": path,
                })
            })
            .collect();
        serde_json::to_string_pretty(&paths).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_queries(&self, queries: &[String]) -> String {
        serde_json::to_string_pretty(&json!({ "queries": queries })).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rulegraph_core::catalog::{ClassDef, ConstraintDef, SchemaDef};
    use rulegraph_core::query::RelatedClassStep;

    fn schemas() -> SchemaSet {
        SchemaSet::from_defs(vec![SchemaDef::new("Test", "t")
            .with_class(ClassDef::entity("Widget"))
            .with_class(ClassDef::entity("Gadget"))
            .with_class(ClassDef::relationship(
                "WidgetHasGadget",
                ConstraintDef::new(["Widget"]),
                ConstraintDef::new(["Gadget"]),
            ))])
        .unwrap()
    }

    fn path(schemas: &SchemaSet) -> RelatedClassPath {
        let class = |name| schemas.find_class("Test", name).unwrap();
        RelatedClassPath::single(
            RelatedClassStep::new(class("Widget"), class("WidgetHasGadget"), class("Gadget"), true)
                .with_aliases("this", "rel_t_WidgetHasGadget_0", "rel_t_Gadget_0"),
        )
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Table.to_string(), "table");
        assert_eq!(OutputFormat::Json.to_string(), "json");
    }

    #[test]
    fn test_table_paths() {
        let schemas = schemas();
        let output = TableFormatter.format_paths(&schemas, &[(path(&schemas), true)]);
        assert!(output.contains("Test:Widget"));
        assert!(output.contains("rel_t_Gadget_0"));
        assert_eq!(TableFormatter.format_paths(&schemas, &[]), "No paths");
        assert_eq!(TableFormatter.format_content(&schemas, &[]), "No content");
    }

    #[test]
    fn test_json_paths() {
        let schemas = schemas();
        let output = JsonFormatter.format_paths(&schemas, &[(path(&schemas), false)]);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value[0]["include"], json!(false));
        assert_eq!(value[0]["steps"][0]["target_alias"], json!("rel_t_Gadget_0"));
    }
}
