//! Integration tests for path resolution and content compilation.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use rulegraph_core::catalog::{
    ClassDef, ClassId, ConstraintDef, MemoryConnection, Multiplicity, NavigationDirection,
    PropertyDef, SchemaDef, SchemaSet,
};
use rulegraph_core::content::{
    build_content_query, build_grouping_queries, build_instance_nodes_query, CompiledContent, ContentBuilder,
    RulesetMatcher,
};
use rulegraph_core::query::{Query, RelationUseCounter, RelationshipDirection, SelectClass};
use rulegraph_core::{RelationshipPathOptions, SchemaCatalog};
use rulegraph_rules::{
    ContentModifier, ContentSpecification, PropertyNames, RelatedPropertiesSpecification,
    RequiredRelationDirection, Ruleset,
};

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct TestContext {
    catalog: SchemaCatalog,
    connection: Arc<MemoryConnection>,
    _schema_dir: tempfile::TempDir,
}

impl TestContext {
    /// Write the schemas to files and load them back, the way a host would.
    fn new(defs: Vec<SchemaDef>) -> Self {
        init_test_logging();
        let schema_dir = tempfile::tempdir().unwrap();
        let paths: Vec<_> = defs
            .iter()
            .map(|def| {
                let path = schema_dir.path().join(format!("{}.json", def.name));
                std::fs::write(&path, serde_json::to_string_pretty(def).unwrap()).unwrap();
                path
            })
            .collect();
        let schemas = SchemaSet::from_json_files(&paths).unwrap();
        let connection = Arc::new(MemoryConnection::new(schemas));
        Self {
            catalog: SchemaCatalog::new(connection.clone()),
            connection,
            _schema_dir: schema_dir,
        }
    }

    fn class(&self, full_name: &str) -> ClassId {
        self.catalog.resolve_class_by_full_name(full_name).unwrap()
    }

    fn compile(&self, matcher: &RulesetMatcher, spec: &ContentSpecification, input: &[SelectClass]) -> CompiledContent {
        ContentBuilder::new(&self.catalog, matcher).compile_specification(spec, input)
    }
}

fn setup_store_schema() -> Vec<SchemaDef> {
    vec![SchemaDef::new("Store", "s")
        .with_class(ClassDef::entity("Widget").with_property(PropertyDef::string("Code")))
        .with_class(ClassDef::entity("Gadget").with_property(PropertyDef::string("Label")))
        .with_class(ClassDef::relationship(
            "WidgetHasGadget",
            ConstraintDef::new(["Gadget"]),
            ConstraintDef::new(["Widget"]),
        ))]
}

fn setup_catalog_schemas() -> Vec<SchemaDef> {
    vec![
        SchemaDef::new("Base", "b")
            .with_class(ClassDef::entity("Element").with_property(PropertyDef::string("Name")))
            .with_class(ClassDef::entity("Part").with_base("Element")),
        SchemaDef::new("Extra", "x")
            .with_class(ClassDef::entity("Hub"))
            .with_class(ClassDef::entity("Note").with_property(PropertyDef::string("Text")))
            .with_class(ClassDef::entity("Memo").with_base("Note"))
            .with_class(ClassDef::entity("Tag"))
            .with_class(ClassDef::relationship(
                "HubHasElement",
                ConstraintDef::new(["Hub"]),
                ConstraintDef::new(["Base:Element"]),
            ))
            .with_class(ClassDef::relationship(
                "HubHasNote",
                ConstraintDef::new(["Hub"]),
                ConstraintDef::new(["Note"]),
            ))
            .with_class(ClassDef::relationship(
                "HubHasTag",
                ConstraintDef::new(["Hub"]),
                ConstraintDef::new(["Tag"]),
            )),
    ]
}

fn setup_workshop_schema() -> Vec<SchemaDef> {
    vec![SchemaDef::new("Shop", "w")
        .with_class(ClassDef::entity("Person").with_property(PropertyDef::string("Name")))
        .with_class(
            ClassDef::entity("Tool")
                .with_property(PropertyDef::string("Serial"))
                .with_property(PropertyDef::navigation("Owner", "PersonOwnsTool", NavigationDirection::Backward))
                .with_property(PropertyDef::navigation("Maker", "PersonMadeTool", NavigationDirection::Backward)),
        )
        .with_class(ClassDef::entity("Hammer").with_base("Tool"))
        .with_class(ClassDef::entity("Drill").with_base("Tool"))
        .with_class(ClassDef::entity("Bit").with_property(PropertyDef::string("Size")))
        .with_class(ClassDef::relationship(
            "PersonOwnsTool",
            ConstraintDef::new(["Person"]).with_multiplicity(Multiplicity::zero_one()),
            ConstraintDef::new(["Tool"]),
        ))
        .with_class(ClassDef::relationship(
            "PersonMadeTool",
            ConstraintDef::new(["Person"]).with_multiplicity(Multiplicity::zero_one()),
            ConstraintDef::new(["Tool"]),
        ))
        .with_class(ClassDef::relationship(
            "ToolHasBit",
            ConstraintDef::new(["Tool"]),
            ConstraintDef::new(["Bit"]),
        ))]
}

fn tool_bits() -> RelatedPropertiesSpecification {
    RelatedPropertiesSpecification::new("Shop:ToolHasBit", "Shop:Bit").with_direction(RequiredRelationDirection::Forward)
}

#[test]
fn test_related_instances_from_gadget() {
    let ctx = TestContext::new(setup_store_schema());
    let gadget = ctx.class("Store:Gadget");
    let widget = ctx.class("Store:Widget");
    let relationship = ctx.class("Store:WidgetHasGadget");
    let matcher = RulesetMatcher::default();

    let spec = ContentSpecification::related_instances("Store:WidgetHasGadget", "", RequiredRelationDirection::Forward)
        .with_instance_filter("[related].ECInstanceId = 0x1");
    let content = ctx.compile(&matcher, &spec, &[SelectClass::new(gadget, false)]);

    assert_eq!(content.sources.len(), 1);
    let source = &content.sources[0];
    assert_eq!(source.source.select_class.class, widget);
    let steps = source.source.input_path.steps();
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].relationship, relationship);
    assert_eq!(steps[0].target, gadget);
    assert_eq!(steps[0].target_alias, "related");
    assert!(source.navigation_paths.is_empty());
    assert_eq!(source.instance_filter.as_deref(), Some("[related].ECInstanceId = 0x1"));

    let query = build_content_query(&content).unwrap().to_query_string(ctx.catalog.schemas());
    assert!(query.ends_with("WHERE ([related].ECInstanceId = 0x1)"));
}

#[test]
fn test_instances_of_subtracts_two_subclasses() {
    let ctx = TestContext::new(setup_workshop_schema());
    let tool = ctx.class("Shop:Tool");
    let hammer = ctx.class("Shop:Hammer");
    let drill = ctx.class("Shop:Drill");
    let matcher = RulesetMatcher::default();

    let spec = ContentSpecification::instances_of("Shop:Tool;E:Shop:Hammer,Drill", true);
    let content = ctx.compile(&matcher, &spec, &[]);

    assert_eq!(content.sources.len(), 1);
    let source = &content.sources[0];
    assert_eq!(source.source.select_class.class, tool);
    let excluded: Vec<ClassId> = source.excluded.iter().map(|c| c.select_class.class).collect();
    assert_eq!(excluded, vec![hammer, drill]);

    let query = build_content_query(&content).unwrap();
    assert!(matches!(query, Query::Except(..)));
    let text = query.to_query_string(ctx.catalog.schemas());
    let except_at = text.find(" EXCEPT (SELECT ").expect("subtracted operand is parenthesized");
    assert!(text.ends_with(')'));
    let tail = &text[except_at..];
    assert!(tail.contains(" UNION ALL "));
    assert!(tail.contains("FROM ONLY [Shop].[Hammer]"));
    assert!(tail.contains("FROM ONLY [Shop].[Drill]"));
    assert!(!text[..except_at].contains("UNION ALL"));
}

#[test]
fn test_instance_nodes_and_groupings_for_related_tools() {
    let ctx = TestContext::new(setup_workshop_schema());
    let person = ctx.class("Shop:Person");
    let matcher = RulesetMatcher::default();
    let spec = ContentSpecification::related_instances("Shop:PersonOwnsTool", "Shop:Tool", RequiredRelationDirection::Forward);

    let content = ctx.compile(&matcher, &spec, &[SelectClass::new(person, false)]);
    let nodes = build_instance_nodes_query(&content).unwrap().to_query_string(ctx.catalog.schemas());
    assert!(nodes.contains("AS [ParentInstanceNodeId]"));
    assert!(!nodes.contains("[Serial]"));

    let groupings = build_grouping_queries(ctx.catalog.schemas(), &content);
    assert!(groupings.is_empty());
}

#[test]
fn test_two_schema_class_list() {
    let ctx = TestContext::new(setup_catalog_schemas());
    let hub = ctx.class("Extra:Hub");
    let element = ctx.class("Base:Element");
    let note = ctx.class("Extra:Note");
    let filter_text = "Base:*;Extra:=Note";

    let filter = ctx.catalog.parse_class_list(filter_text, false);
    assert_eq!(
        filter.entries().iter().map(|e| (e.class, e.polymorphic)).collect::<Vec<_>>(),
        vec![(element, true), (note, false)]
    );

    let mut counter = RelationUseCounter::new();
    let options = RelationshipPathOptions::new(hub, RelationshipDirection::FORWARD).classes(filter_text);
    let paths = ctx.catalog.resolve_relationship_paths(&options, &mut counter);
    let targets: Vec<ClassId> = paths.iter().map(|(p, _)| p.steps()[0].target).collect();
    assert_eq!(targets, vec![element, note]);
    assert!(!paths[1].0.steps()[0].is_target_polymorphic);
}

#[test]
fn test_modifiers_apply_only_at_root() {
    let ctx = TestContext::new(setup_workshop_schema());
    let person = ctx.class("Shop:Person");
    let tool = ctx.class("Shop:Tool");
    let ruleset = Ruleset::new("shop").with_content_modifier(ContentModifier::new("Shop", "Tool").with_related_properties(tool_bits()));
    let matcher = RulesetMatcher::new(ctx.catalog.schemas(), &ruleset);

    let root = ctx.compile(
        &matcher,
        &ContentSpecification::selected_node_instances(),
        &[SelectClass::new(tool, false)],
    );
    assert!(root.properties().any(|p| p.property == "Size"));

    let nested = ContentSpecification::selected_node_instances().with_related_properties(
        RelatedPropertiesSpecification::new("Shop:PersonOwnsTool", "Shop:Tool")
            .with_direction(RequiredRelationDirection::Forward)
            .with_properties(PropertyNames::named(["Serial"])),
    );
    let nested = ctx.compile(&matcher, &nested, &[SelectClass::new(person, false)]);
    assert!(nested.properties().any(|p| p.property == "Serial"));
    assert!(nested.properties().all(|p| p.property != "Size"));
    assert_eq!(nested.sources[0].related_property_paths.len(), 1);
}

#[test]
fn test_polymorphic_short_circuit() {
    let ctx = TestContext::new(setup_workshop_schema());
    let person = ctx.class("Shop:Person");
    let matcher = RulesetMatcher::default();
    let spec = ContentSpecification::selected_node_instances().with_related_properties(
        RelatedPropertiesSpecification::new("Shop:PersonOwnsTool", "Shop:Tool")
            .with_direction(RequiredRelationDirection::Forward)
            .polymorphic(),
    );

    let content = ctx.compile(&matcher, &spec, &[SelectClass::new(person, false)]);
    assert!(content.sources[0].related_property_paths.is_empty());
    let query = build_content_query(&content).unwrap().to_query_string(ctx.catalog.schemas());
    assert!(!query.contains("JOIN"));

    let drill = ctx.class("Shop:Drill");
    ctx.connection.set_instance_count(drill, 4);
    ctx.catalog.clear_caches();
    let content = ctx.compile(&matcher, &spec, &[SelectClass::new(person, false)]);
    let paths = &content.sources[0].related_property_paths;
    assert!(!paths.is_empty());
    assert_eq!(paths[0].steps()[0].target, drill);
}

#[test]
fn test_navigation_aliases_are_distinct_and_stable() {
    let ctx = TestContext::new(setup_workshop_schema());
    let tool = ctx.class("Shop:Tool");
    let person = ctx.class("Shop:Person");
    let matcher = RulesetMatcher::default();
    let spec = ContentSpecification::selected_node_instances();
    let input = [SelectClass::new(tool, false)];

    let aliases = |content: &CompiledContent| -> Vec<String> {
        content.sources[0]
            .navigation_paths
            .iter()
            .map(|p| p.steps()[0].target_alias.clone())
            .collect()
    };
    let first = ctx.compile(&matcher, &spec, &input);
    assert_eq!(first.sources[0].navigation_paths.len(), 2);
    assert!(first.sources[0].navigation_paths.iter().all(|p| p.steps()[0].target == person));
    let first_aliases = aliases(&first);
    assert_ne!(first_aliases[0], first_aliases[1]);

    let second = ctx.compile(&matcher, &spec, &input);
    assert_eq!(first_aliases, aliases(&second));
}

#[test]
fn test_compile_is_idempotent_with_unique_aliases() {
    let ctx = TestContext::new(setup_workshop_schema());
    let person = ctx.class("Shop:Person");
    let matcher = RulesetMatcher::default();
    let spec = ContentSpecification::related_instances("Shop:PersonOwnsTool", "Shop:Tool", RequiredRelationDirection::Forward)
        .with_related_properties(tool_bits());
    let input = [SelectClass::new(person, true)];

    let mut builder = ContentBuilder::new(&ctx.catalog, &matcher);
    let first = builder.compile_specification(&spec, &input);
    let second = builder.compile_specification(&spec, &input);
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
    assert_eq!(
        build_content_query(&first).unwrap().to_query_string(ctx.catalog.schemas()),
        build_content_query(&second).unwrap().to_query_string(ctx.catalog.schemas())
    );

    let mut seen: HashMap<String, (ClassId, ClassId, ClassId, bool)> = HashMap::new();
    for source in &first.sources {
        let steps = source
            .source
            .input_path
            .steps()
            .iter()
            .chain(source.related_property_paths.iter().flat_map(|p| p.steps()))
            .chain(source.navigation_paths.iter().flat_map(|p| p.steps()));
        for step in steps {
            for alias in [&step.relationship_alias, &step.target_alias] {
                let key = step.key();
                let previous = seen.entry(alias.clone()).or_insert(key);
                assert_eq!(*previous, key, "alias {} names two different steps", alias);
            }
        }
    }
}

#[test]
fn test_path_cache_shared_across_threads() {
    let ctx = TestContext::new(setup_catalog_schemas());
    let hub = ctx.class("Extra:Hub");
    let catalog = Arc::new(ctx.catalog);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let catalog = Arc::clone(&catalog);
            thread::spawn(move || {
                let mut counter = RelationUseCounter::new();
                let options = RelationshipPathOptions::new(hub, RelationshipDirection::FORWARD).classes("Extra:Note,Tag");
                catalog.resolve_relationship_paths(&options, &mut counter)
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(results.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(results[0].len(), 2);
    assert_eq!(catalog.path_cache().len(), 1);
}
