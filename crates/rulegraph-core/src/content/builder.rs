//! Content compilation: content sources, properties and related property paths.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rulegraph_rules::{
    ContentRule, ContentSpecification, ContentSpecificationKind, PropertyNames,
    PropertySpecification, RelatedPropertiesSpecification,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use super::appender::{AppendedProperty, AppenderFactory, AppenderScope, DefaultPropertyAppender};
use super::matcher::CustomizationRuleMatcher;
use super::source::ContentSource;
use crate::catalog::{
    ClassId, ClassListFilter, PropertyDef, RelationshipPathOptions, SchemaCatalog, SchemaSet,
};
use crate::config::ContentConfig;
use crate::query::{
    ComplexQuery, ContentField, ContentRowContract, Contract, InstanceNodesContract, Query,
    RelatedClassPath, RelationUseCounter, RelationshipDirection, SelectClass, StepKey,
};

/// Compiled content of one selected class.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledSource {
    pub source: ContentSource,
    /// Paths joined for related properties, relative to the select class.
    pub related_property_paths: Vec<RelatedClassPath>,
    /// Paths joined for the select class's own navigation properties.
    pub navigation_paths: Vec<RelatedClassPath>,
    /// Rows of these sources are subtracted from this source's rows.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<ContentSource>,
    pub properties: Vec<AppendedProperty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_filter: Option<String>,
    /// Properties labelling the selected instances; empty for default labels.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub label_properties: Vec<String>,
    /// Content row fields.
    #[serde(skip)]
    pub contract: Arc<Contract>,
    /// Instance node fields.
    #[serde(skip)]
    pub instance_contract: Arc<Contract>,
    /// Grouping node fields, outermost group first.
    #[serde(skip)]
    pub grouping_contracts: Vec<Arc<Contract>>,
}

/// Result of compiling one content specification.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledContent {
    /// Alias of the selected class in every source.
    pub select_alias: String,
    pub sources: Vec<CompiledSource>,
}

impl CompiledContent {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Properties of every source, in source order.
    pub fn properties(&self) -> impl Iterator<Item = &AppendedProperty> {
        self.sources.iter().flat_map(|s| s.properties.iter())
    }
}

/// Compiles content specifications against a catalog.
///
/// A builder holds the state of one compile at a time: the alias counter,
/// the handled sources and the navigation paths. Every top-level compile
/// call resets it, so aliases restart per query.
pub struct ContentBuilder<'a> {
    catalog: &'a SchemaCatalog,
    matcher: &'a dyn CustomizationRuleMatcher,
    config: ContentConfig,
    appender_factory: AppenderFactory,
    counter: RelationUseCounter,
    handled: HashSet<(ClassId, Vec<StepKey>)>,
    navigation: HashMap<(ClassId, String, String), RelatedClassPath>,
    appended: Vec<AppendedProperty>,
}

impl<'a> ContentBuilder<'a> {
    pub fn new(catalog: &'a SchemaCatalog, matcher: &'a dyn CustomizationRuleMatcher) -> Self {
        Self {
            catalog,
            matcher,
            config: ContentConfig::default(),
            appender_factory: DefaultPropertyAppender::factory(),
            counter: RelationUseCounter::new(),
            handled: HashSet::new(),
            navigation: HashMap::new(),
            appended: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ContentConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom property appender policy.
    pub fn with_appender_factory(mut self, factory: AppenderFactory) -> Self {
        self.appender_factory = factory;
        self
    }

    fn schemas(&self) -> &'a SchemaSet {
        self.catalog.schemas()
    }

    /// Alias counter of the current compile.
    pub fn counter(&self) -> &RelationUseCounter {
        &self.counter
    }

    /// Drop all per-compile state.
    pub fn reset(&mut self) {
        self.counter = RelationUseCounter::new();
        self.handled.clear();
        self.navigation.clear();
        self.appended.clear();
    }

    /// Navigation paths created so far for properties of `class`.
    pub fn navigation_paths_for(&self, class: ClassId) -> Vec<&RelatedClassPath> {
        let mut paths: Vec<(&(ClassId, String, String), &RelatedClassPath)> =
            self.navigation.iter().filter(|((c, _, _), _)| *c == class).collect();
        paths.sort_by(|a, b| a.0.cmp(b.0));
        paths.into_iter().map(|(_, path)| path).collect()
    }

    /// Compile every specification of a rule, highest priority first.
    pub fn compile_rule(&mut self, rule: &ContentRule, input: &[SelectClass]) -> Vec<CompiledContent> {
        rule.ordered_specifications()
            .into_iter()
            .map(|spec| self.compile_specification(spec, input))
            .collect()
    }

    /// Compile one content specification for the given input classes.
    #[instrument(skip_all, fields(inputs = input.len()))]
    pub fn compile_specification(&mut self, spec: &ContentSpecification, input: &[SelectClass]) -> CompiledContent {
        self.reset();
        let planned = match &spec.kind {
            ContentSpecificationKind::SelectedNodeInstances {
                accepted_schema_names,
                accepted_class_names,
                accept_polymorphically,
            } => {
                let accepted: Vec<SelectClass> = input
                    .iter()
                    .copied()
                    .filter(|select| {
                        self.accepts_input(select.class, accepted_schema_names, accepted_class_names, *accept_polymorphically)
                    })
                    .collect();
                self.build_content_sources_from_classes(&accepted)
                    .into_iter()
                    .map(|source| (source, Vec::new()))
                    .collect()
            }
            ContentSpecificationKind::ContentInstancesOfSpecificClasses {
                classes,
                are_polymorphic,
                ..
            } => self.plan_instances_of(classes, *are_polymorphic),
            ContentSpecificationKind::ContentRelatedInstances {
                relationships,
                related_classes,
                required_direction,
                skip_related_level,
                is_recursive,
                ..
            } => {
                let depth = if *is_recursive { -1 } else { (*skip_related_level).max(0) };
                let direction = RelationshipDirection::from(*required_direction);
                let mut planned = Vec::new();
                for select in input {
                    planned.extend(self.plan_related_instances(select, relationships, related_classes, direction, depth));
                }
                planned
            }
        };

        let instance_filter = Some(spec.instance_filter()).filter(|f| !f.trim().is_empty());
        let mut sources = Vec::new();
        for (source, excluded) in planned {
            if let Some(mut compiled) = self.append_content(&source, spec, instance_filter) {
                compiled.excluded = excluded;
                compiled.instance_filter = instance_filter.map(str::to_string);
                sources.push(compiled);
            }
        }
        debug!(sources = sources.len(), "Compiled content specification");
        CompiledContent {
            select_alias: self.config.select_alias.clone(),
            sources,
        }
    }

    fn accepts_input(&self, class: ClassId, schema_names: &[String], class_names: &[String], polymorphic: bool) -> bool {
        let schemas = self.schemas();
        let entry = schemas.class(class);
        let schema = schemas.schema(entry.schema);
        if !schema_names.is_empty()
            && !schema_names
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&schema.name) || n.eq_ignore_ascii_case(&schema.alias))
        {
            return false;
        }
        if class_names.is_empty() {
            return true;
        }
        class_names.iter().any(|name| match schemas.find_class_by_full_name(name) {
            Some(accepted) if polymorphic => schemas.is(class, accepted),
            Some(accepted) => class == accepted,
            None => {
                debug!(class = %name, "Unknown accepted class name");
                false
            }
        })
    }

    fn plan_instances_of(&self, classes: &str, are_polymorphic: bool) -> Vec<(ContentSource, Vec<ContentSource>)> {
        let schemas = self.schemas();
        let filter = self.catalog.parse_class_list(classes, true);
        let includes: Vec<SelectClass> = filter
            .includes()
            .filter(|entry| !filter.is_excluded(schemas, entry.class))
            .map(|entry| SelectClass::new(entry.class, are_polymorphic && entry.polymorphic))
            .collect();
        let excluded: Vec<ContentSource> = filter
            .excludes()
            .map(|entry| ContentSource::new(SelectClass::new(entry.class, entry.polymorphic)))
            .collect();
        self.build_content_sources_from_classes(&includes)
            .into_iter()
            .map(|source| {
                let subtracted = excluded
                    .iter()
                    .filter(|x| subtracts(schemas, &source, x))
                    .cloned()
                    .collect();
                (source, subtracted)
            })
            .collect()
    }

    fn plan_related_instances(
        &mut self,
        input: &SelectClass,
        relationships: &str,
        related_classes: &str,
        direction: RelationshipDirection,
        depth: i32,
    ) -> Vec<(ContentSource, Vec<ContentSource>)> {
        let schemas = self.schemas();
        let related_alias = self.config.related_instance_alias.clone();
        let options = RelationshipPathOptions::new(input.class, direction)
            .depth(depth)
            .relationships(relationships)
            .classes(related_classes)
            .source_alias(&related_alias);
        let resolved = self.catalog.resolve_relationship_paths(&options, &mut self.counter);

        let included: Vec<RelatedClassPath> = resolved
            .iter()
            .filter(|(_, include)| *include)
            .map(|(path, _)| path.clone())
            .collect();
        let excluded: Vec<ContentSource> = resolved
            .iter()
            .filter(|(_, include)| !*include)
            .filter_map(|(path, _)| self.reversed_source(path, input.polymorphic))
            .collect();

        self.build_content_sources_from_paths(&included, input.polymorphic)
            .into_iter()
            .map(|source| {
                let subtracted: Vec<ContentSource> = excluded
                    .iter()
                    .filter(|x| subtracts(schemas, &source, x))
                    .cloned()
                    .collect();
                (source, subtracted)
            })
            .collect()
    }

    /// Content sources of directly selected classes, split per customization rules.
    pub fn build_content_sources_from_classes(&self, selects: &[SelectClass]) -> Vec<ContentSource> {
        let schemas = self.schemas();
        selects
            .iter()
            .flat_map(|select| self.matcher.split_select_class(schemas, select))
            .map(|(select, properties)| ContentSource::new(select).with_properties_source(properties))
            .collect()
    }

    /// Content sources of classes reached from the input through `paths`.
    ///
    /// Each path runs from the input class to the selected class; the source
    /// gets the reversed path so the input is joined under the related alias.
    pub fn build_content_sources_from_paths(&self, paths: &[RelatedClassPath], input_polymorphic: bool) -> Vec<ContentSource> {
        let schemas = self.schemas();
        let mut sources = Vec::new();
        for path in paths {
            let Some(reversed) = self.reversed_source(path, input_polymorphic) else {
                continue;
            };
            for (select, properties) in self.matcher.split_select_class(schemas, &reversed.select_class) {
                let mut input_path = reversed.input_path.clone();
                if let Some(first) = input_path.steps_mut().first_mut() {
                    first.source = select.class;
                }
                sources.push(
                    ContentSource::new(select)
                        .with_properties_source(properties)
                        .with_input_path(input_path),
                );
            }
        }
        sources
    }

    fn reversed_source(&self, path: &RelatedClassPath, input_polymorphic: bool) -> Option<ContentSource> {
        let last = path.last()?;
        let select = SelectClass::new(last.target, last.is_target_polymorphic);
        let reversed = path.reversed(
            &self.config.select_alias,
            &self.config.related_instance_alias,
            input_polymorphic,
        );
        Some(ContentSource::new(select).with_input_path(reversed))
    }

    /// Append the properties and related properties of a source.
    ///
    /// Returns `None` when the same source was already handled in this compile.
    pub fn append_content(
        &mut self,
        source: &ContentSource,
        spec: &ContentSpecification,
        instance_filter: Option<&str>,
    ) -> Option<CompiledSource> {
        let schemas = self.schemas();
        let select_class = source.select_class.class;
        if !self.handled.insert((select_class, source.input_path.keys())) {
            debug!(class = %schemas.class(select_class).full_name, "Source already handled");
            return None;
        }

        let select_alias = self.config.select_alias.clone();
        let properties_class = source.properties_class();
        let matcher = self.matcher;

        // spec overrides come last so they win over modifier overrides
        let mut overrides: Vec<PropertySpecification> = matcher
            .content_modifiers(schemas, select_class)
            .into_iter()
            .flat_map(|m| m.property_overrides.iter().cloned())
            .collect();
        overrides.extend(spec.property_overrides.iter().cloned());

        let mut appender = (self.appender_factory)(AppenderScope {
            class: properties_class,
            path_len: 0,
            categories: Vec::new(),
        });
        let mut navigation_paths = Vec::new();
        for property in schemas.properties(properties_class, true) {
            if !appender.append(property, &select_alias, &overrides) {
                continue;
            }
            if property.is_navigation() {
                if let Some(path) = self.navigation_path(properties_class, property, &select_alias) {
                    navigation_paths.push(path);
                }
            }
        }
        self.appended.extend(appender.take_appended());

        let related_property_paths = self.append_related_properties(
            &RelatedClassPath::new(),
            select_class,
            &select_alias,
            &spec.related_properties,
            instance_filter,
            &[],
            false,
        );

        let properties = std::mem::take(&mut self.appended);
        let fields = properties
            .iter()
            .map(|p| ContentField {
                name: p.field_name.clone(),
                property: p.property.clone(),
                alias: p.alias.clone(),
            })
            .collect();
        let mut row = ContentRowContract::new(select_alias.as_str(), fields);
        if self.config.merge_rows {
            row = row.merged();
        }

        let label_properties = matcher.label_properties(schemas, select_class);
        let mut instances = InstanceNodesContract::new(label_properties.clone());
        if let Some(parent) = source.input_path.last() {
            instances = instances.with_parent_alias(parent.target_alias.as_str());
        }
        // the input path runs from the select class, so its first hop is the one reaching it
        let via_relationship = source.input_path.first().map(|step| step.relationship);
        let grouping_contracts = matcher
            .grouping_specifications(schemas, select_class)
            .into_iter()
            .filter_map(|group| Contract::for_group(schemas, group, &label_properties, via_relationship))
            .map(Arc::new)
            .collect();

        Some(CompiledSource {
            source: source.clone(),
            related_property_paths,
            navigation_paths,
            excluded: Vec::new(),
            properties,
            instance_filter: None,
            label_properties,
            contract: Arc::new(Contract::ContentRow(row)),
            instance_contract: Arc::new(Contract::InstanceNodes(instances)),
            grouping_contracts,
        })
    }

    /// The navigation hop of `property`, aliased once per class occurrence and reused afterwards.
    fn navigation_path(&mut self, class: ClassId, property: &PropertyDef, source_alias: &str) -> Option<RelatedClassPath> {
        let key = (class, property.name.clone(), source_alias.to_string());
        if let Some(path) = self.navigation.get(&key) {
            return Some(path.clone());
        }
        let schemas = self.schemas();
        let Some(mut step) = self.catalog.foreign_key_step(class, property) else {
            debug!(class = %schemas.class(class).full_name, property = %property.name, "Navigation property has no relationship hop");
            return None;
        };
        step.source_alias = source_alias.to_string();
        step.relationship_alias = self.counter.navigation_alias(schemas, step.relationship);
        step.target_alias = self.counter.navigation_alias(schemas, step.target);
        let path = RelatedClassPath::single(step);
        self.navigation.insert(key, path.clone());
        Some(path)
    }

    /// Resolve related properties specifications from `source_class`.
    ///
    /// Returned paths are relative to `source_class`. Content modifiers of the
    /// source class apply only when `nested` is false.
    #[allow(clippy::too_many_arguments)]
    #[instrument(level = "debug", skip_all, fields(source = %source_class, nested = nested))]
    pub fn append_related_properties(
        &mut self,
        path_from_root: &RelatedClassPath,
        source_class: ClassId,
        source_alias: &str,
        specs: &[RelatedPropertiesSpecification],
        instance_filter: Option<&str>,
        scope_categories: &[String],
        nested: bool,
    ) -> Vec<RelatedClassPath> {
        let mut result: Vec<RelatedClassPath> = Vec::new();
        let push_all = |result: &mut Vec<RelatedClassPath>, paths: Vec<RelatedClassPath>| {
            for path in paths {
                if !result.contains(&path) {
                    result.push(path);
                }
            }
        };

        for spec in specs {
            let paths = self.append_related_spec(path_from_root, source_class, source_alias, spec, instance_filter, scope_categories);
            push_all(&mut result, paths);
        }

        if !nested {
            let schemas = self.schemas();
            let matcher = self.matcher;
            for modifier in matcher.content_modifiers(schemas, source_class) {
                for spec in &modifier.related_properties {
                    let paths = self.append_related_spec(path_from_root, source_class, source_alias, spec, instance_filter, scope_categories);
                    push_all(&mut result, paths);
                }
            }
        }
        result
    }

    fn append_related_spec(
        &mut self,
        path_from_root: &RelatedClassPath,
        source_class: ClassId,
        source_alias: &str,
        spec: &RelatedPropertiesSpecification,
        instance_filter: Option<&str>,
        scope_categories: &[String],
    ) -> Vec<RelatedClassPath> {
        let schemas = self.schemas();
        let direction = RelationshipDirection::from(spec.required_direction);

        let class_filter = if spec.is_polymorphic {
            let with_data = self.catalog.resolve_polymorphic_related_classes_with_data(
                source_class,
                &spec.relationships,
                direction,
                &spec.related_classes,
                &RelatedClassPath::new(),
                instance_filter,
            );
            if with_data.is_empty() {
                debug!(
                    source = %schemas.class(source_class).full_name,
                    classes = %spec.related_classes,
                    "No related classes with data"
                );
                return Vec::new();
            }
            let concrete = with_data
                .iter()
                .filter_map(RelatedClassPath::last)
                .map(|step| SelectClass::new(step.target, false));
            ClassListFilter::from_includes(concrete).to_filter_string(schemas)
        } else {
            spec.related_classes.clone()
        };

        let options = RelationshipPathOptions::new(source_class, direction)
            .relationships(&spec.relationships)
            .classes(&class_filter)
            .polymorphic(!spec.is_polymorphic)
            .source_alias(source_alias);
        let paths = self.catalog.resolve_relationship_paths(&options, &mut self.counter);

        let categories: Vec<String> = if spec.categories.is_empty() {
            scope_categories.to_vec()
        } else {
            spec.categories.clone()
        };

        let mut result = Vec::new();
        for (path, include) in paths {
            if !include {
                continue;
            }
            if path.len() != 1 {
                warn!(
                    source = %schemas.class(source_class).full_name,
                    len = path.len(),
                    "Related properties path is not a single hop, skipping"
                );
                debug_assert!(path.len() == 1, "related properties paths must be single hops");
                continue;
            }
            let Some(step) = path.first().cloned() else {
                continue;
            };
            let full_path = path_from_root.extended(step.clone());

            let mut appender = (self.appender_factory)(AppenderScope {
                class: step.target,
                path_len: full_path.len(),
                categories: categories.clone(),
            });
            let properties: Vec<&PropertyDef> = match &spec.properties {
                PropertyNames::All => schemas.properties(step.target, true),
                PropertyNames::None => Vec::new(),
                PropertyNames::Named(names) => names
                    .iter()
                    .filter_map(|name| {
                        let property = schemas.find_property(step.target, name);
                        if property.is_none() {
                            debug!(class = %schemas.class(step.target).full_name, property = %name, "Unknown related property");
                        }
                        property
                    })
                    .collect(),
            };

            let hop = RelatedClassPath::single(step.clone());
            let mut appended_any = false;
            let mut navigation = Vec::new();
            for property in properties {
                if !appender.append(property, &step.target_alias, &spec.property_overrides) {
                    continue;
                }
                appended_any = true;
                if property.is_navigation() {
                    if let Some(nav) = self.navigation_path(step.target, property, &step.target_alias) {
                        navigation.push(hop.combine(&nav));
                    }
                }
            }
            self.appended.extend(appender.take_appended());

            let nested = self.append_related_properties(
                &full_path,
                step.target,
                &step.target_alias,
                &spec.nested,
                instance_filter,
                &categories,
                true,
            );

            if appended_any || !nested.is_empty() || !navigation.is_empty() {
                result.push(hop.clone());
                result.extend(nested.iter().map(|tail| hop.combine(tail)));
                result.extend(navigation);
            }
        }
        result
    }
}

/// Check whether `excluded` names rows to subtract from `source`: a strict
/// subclass reached through the same relationships.
fn subtracts(schemas: &SchemaSet, source: &ContentSource, excluded: &ContentSource) -> bool {
    let (class, excluded_class) = (source.select_class.class, excluded.select_class.class);
    let (steps, excluded_steps) = (source.input_path.steps(), excluded.input_path.steps());
    source.select_class.polymorphic
        && class != excluded_class
        && schemas.is(excluded_class, class)
        && steps.len() == excluded_steps.len()
        && steps.iter().zip(excluded_steps).enumerate().all(|(i, (a, b))| {
            if i == 0 {
                a.relationship == b.relationship && a.is_forward == b.is_forward && a.target == b.target
            } else {
                a.key() == b.key()
            }
        })
}

fn source_query(
    compiled: &CompiledContent,
    compiled_source: &CompiledSource,
    content: &ContentSource,
    contract: &Arc<Contract>,
    property_joins: bool,
) -> ComplexQuery {
    let mut query = ComplexQuery::new(Arc::clone(contract))
        .from_class(
            content.select_class.class,
            content.select_class.polymorphic,
            compiled.select_alias.as_str(),
        )
        .join(content.input_path.clone(), false);
    if property_joins {
        for path in compiled_source
            .navigation_paths
            .iter()
            .chain(&compiled_source.related_property_paths)
        {
            query = query.join(path.clone(), true);
        }
    }
    if let Some(filter) = &compiled_source.instance_filter {
        query = query.where_clause(filter.as_str());
    }
    query
}

/// Union of every source's rows minus the rows of its excluded sources.
fn union_sources(
    compiled: &CompiledContent,
    contract_of: impl Fn(&CompiledSource) -> &Arc<Contract>,
    property_joins: bool,
) -> Option<Query> {
    let queries = compiled
        .sources
        .iter()
        .map(|source| {
            let contract = contract_of(source);
            let base: Query = source_query(compiled, source, &source.source, contract, property_joins).into();
            let subtracted: Vec<Query> = source
                .excluded
                .iter()
                .map(|excluded| source_query(compiled, source, excluded, contract, property_joins).into())
                .collect();
            match Query::union(subtracted) {
                Some(subtracted) => Query::except(base, subtracted),
                None => base,
            }
        })
        .collect();
    Query::union(queries)
}

/// Assemble the query tree of compiled content.
///
/// Sources are unioned; excluded sources are subtracted from the source they
/// narrow. Returns `None` for empty content.
pub fn build_content_query(compiled: &CompiledContent) -> Option<Query> {
    union_sources(compiled, |source| &source.contract, true)
}

/// Assemble the query selecting one instance node per selected instance.
///
/// Labels follow the sources' label overrides; related instances take
/// their parent node id from the input instance.
pub fn build_instance_nodes_query(compiled: &CompiledContent) -> Option<Query> {
    union_sources(compiled, |source| &source.instance_contract, false)
}

/// Assemble one grouping query per source and grouping rule group, in
/// source order and outermost group first.
///
/// Excluded sources are filtered out by class since aggregated rows can't
/// be subtracted.
pub fn build_grouping_queries(schemas: &SchemaSet, compiled: &CompiledContent) -> Vec<Query> {
    let mut queries = Vec::new();
    for source in &compiled.sources {
        let mut excluded_classes: Vec<ClassId> = Vec::new();
        for excluded in &source.excluded {
            let select = excluded.select_class;
            excluded_classes.push(select.class);
            if select.polymorphic {
                excluded_classes.extend(schemas.all_derived_classes(select.class));
            }
        }
        for contract in &source.grouping_contracts {
            let mut query = source_query(compiled, source, &source.source, contract, false);
            if !excluded_classes.is_empty() {
                let ids: Vec<String> = excluded_classes.iter().map(ClassId::to_string).collect();
                query = query.where_clause(format!("[{}].ECClassId NOT IN ({})", compiled.select_alias, ids.join(", ")));
            }
            queries.push(query.into());
        }
    }
    queries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ClassDef, ConstraintDef, MemoryConnection, Multiplicity, NavigationDirection, SchemaDef};
    use crate::content::RulesetMatcher;
    use pretty_assertions::assert_eq;
    use rulegraph_rules::{
        ContentModifier, GroupSpecification, GroupingRule, InstanceLabelOverride, RequiredRelationDirection, Ruleset,
    };

    fn fixture() -> (SchemaCatalog, Arc<MemoryConnection>) {
        let set = SchemaSet::from_defs(vec![SchemaDef::new("Test", "t")
            .with_class(ClassDef::entity("Widget").with_property(PropertyDef::string("MyID")))
            .with_class(
                ClassDef::entity("Gadget")
                    .with_property(PropertyDef::string("Description"))
                    .with_property(PropertyDef::navigation("Widget", "WidgetHasGadget", NavigationDirection::Backward)),
            )
            .with_class(ClassDef::entity("SpecialGadget").with_base("Gadget"))
            .with_class(ClassDef::entity("Sprocket").with_property(PropertyDef::string("Size")))
            .with_class(ClassDef::relationship(
                "WidgetHasGadget",
                ConstraintDef::new(["Widget"]).with_multiplicity(Multiplicity::zero_one()),
                ConstraintDef::new(["Gadget"]),
            ))
            .with_class(ClassDef::relationship(
                "GadgetHasSprocket",
                ConstraintDef::new(["Gadget"]),
                ConstraintDef::new(["Sprocket"]),
            ))])
        .unwrap();
        let conn = Arc::new(MemoryConnection::new(set));
        (SchemaCatalog::new(conn.clone()), conn)
    }

    fn class(catalog: &SchemaCatalog, name: &str) -> ClassId {
        catalog.resolve_class("Test", name).unwrap()
    }

    fn gadget_description() -> RelatedPropertiesSpecification {
        RelatedPropertiesSpecification::new("Test:WidgetHasGadget", "Test:Gadget")
            .with_direction(RequiredRelationDirection::Forward)
            .with_properties(PropertyNames::named(["Description"]))
    }

    fn field_names(content: &CompiledContent) -> Vec<&str> {
        content.properties().map(|p| p.field_name.as_str()).collect()
    }

    #[test]
    fn test_selected_node_instances() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let mut builder = ContentBuilder::new(&catalog, &matcher);

        let content = builder.compile_specification(
            &ContentSpecification::selected_node_instances(),
            &[SelectClass::new(widget, false)],
        );
        assert_eq!(content.select_alias, "this");
        assert_eq!(content.sources.len(), 1);
        let source = &content.sources[0];
        assert_eq!(source.source.select_class, SelectClass::new(widget, false));
        assert!(source.source.input_path.is_empty());
        assert!(source.related_property_paths.is_empty());
        assert_eq!(field_names(&content), vec!["this_MyID"]);
    }

    #[test]
    fn test_selected_node_instances_accepts_classes() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let special = class(&catalog, "SpecialGadget");
        let mut builder = ContentBuilder::new(&catalog, &matcher);
        let input = [SelectClass::new(widget, false), SelectClass::new(special, false)];

        let exact = ContentSpecification::new(ContentSpecificationKind::SelectedNodeInstances {
            accepted_schema_names: vec!["t".to_string()],
            accepted_class_names: vec!["Test:Gadget".to_string()],
            accept_polymorphically: false,
        });
        assert!(builder.compile_specification(&exact, &input).is_empty());

        let polymorphic = ContentSpecification::new(ContentSpecificationKind::SelectedNodeInstances {
            accepted_schema_names: Vec::new(),
            accepted_class_names: vec!["Test:Gadget".to_string()],
            accept_polymorphically: true,
        });
        let content = builder.compile_specification(&polymorphic, &input);
        assert_eq!(content.sources.len(), 1);
        assert_eq!(content.sources[0].source.select_class.class, special);
    }

    #[test]
    fn test_related_instances_reverse_to_input() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let gadget = class(&catalog, "Gadget");
        let mut builder = ContentBuilder::new(&catalog, &matcher);

        let spec = ContentSpecification::related_instances(
            "Test:WidgetHasGadget",
            "Test:Gadget",
            RequiredRelationDirection::Forward,
        );
        let content = builder.compile_specification(&spec, &[SelectClass::new(widget, false)]);
        assert_eq!(content.sources.len(), 1);
        let source = &content.sources[0];
        assert_eq!(source.source.select_class, SelectClass::new(gadget, true));

        let steps = source.source.input_path.steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].source, gadget);
        assert_eq!(steps[0].target, widget);
        assert!(!steps[0].is_forward);
        assert!(!steps[0].is_target_polymorphic);
        assert_eq!(steps[0].source_alias, "this");
        assert_eq!(steps[0].target_alias, "related");

        assert_eq!(field_names(&content), vec!["this_Description", "this_Widget"]);
        assert_eq!(source.navigation_paths.len(), 1);
        let nav = &source.navigation_paths[0].steps()[0];
        assert_eq!(nav.source_alias, "this");
        assert_eq!(nav.target, widget);
        assert_eq!(nav.target_alias, "nav_t_Widget_0");

        let query = build_content_query(&content).unwrap().to_query_string(catalog.schemas());
        assert!(query.contains("FROM [Test].[Gadget] [this]"));
        assert!(query.contains("INNER JOIN ONLY [Test].[Widget] [related]"));
        assert!(query.contains("LEFT JOIN [Test].[Widget] [nav_t_Widget_0]"));
    }

    #[test]
    fn test_instances_of_subtracts_excluded_subclass() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let special = class(&catalog, "SpecialGadget");
        let mut builder = ContentBuilder::new(&catalog, &matcher);

        let spec = ContentSpecification::instances_of("Test:Gadget;E:Test:SpecialGadget", true);
        let content = builder.compile_specification(&spec, &[]);
        assert_eq!(content.sources.len(), 1);
        let source = &content.sources[0];
        assert_eq!(source.excluded.len(), 1);
        assert_eq!(source.excluded[0].select_class.class, special);

        let query = build_content_query(&content).unwrap();
        assert!(matches!(query, Query::Except(..)));
        let text = query.to_query_string(catalog.schemas());
        assert!(text.contains(" EXCEPT SELECT [this].ECClassId AS [ECClassId]"));
        assert!(text.contains("FROM ONLY [Test].[SpecialGadget] [this]"));
    }

    #[test]
    fn test_related_properties_single_hop() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let gadget = class(&catalog, "Gadget");
        let mut builder = ContentBuilder::new(&catalog, &matcher);

        let spec = ContentSpecification::selected_node_instances().with_related_properties(gadget_description());
        let content = builder.compile_specification(&spec, &[SelectClass::new(widget, false)]);
        let source = &content.sources[0];
        assert_eq!(source.related_property_paths.len(), 1);
        let step = &source.related_property_paths[0].steps()[0];
        assert_eq!(step.target, gadget);
        assert_eq!(step.source_alias, "this");
        assert_eq!(field_names(&content), vec!["this_MyID", "rel_t_Gadget_0_Description"]);
        assert_eq!(source.properties[1].path_len, 1);
    }

    #[test]
    fn test_nested_related_properties() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let sprocket = class(&catalog, "Sprocket");
        let mut builder = ContentBuilder::new(&catalog, &matcher);

        let nested = RelatedPropertiesSpecification::new("Test:GadgetHasSprocket", "Test:Sprocket")
            .with_direction(RequiredRelationDirection::Forward);
        let spec = ContentSpecification::selected_node_instances()
            .with_related_properties(gadget_description().with_nested(nested));
        let content = builder.compile_specification(&spec, &[SelectClass::new(widget, false)]);
        let paths = &content.sources[0].related_property_paths;
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[1].len(), 2);
        assert_eq!(paths[1].steps()[1].target, sprocket);
        assert_eq!(paths[1].steps()[1].source_alias, paths[0].steps()[0].target_alias);

        let size = content.properties().find(|p| p.property == "Size").unwrap();
        assert_eq!(size.path_len, 2);
    }

    #[test]
    fn test_related_properties_without_properties_are_dropped() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let mut builder = ContentBuilder::new(&catalog, &matcher);

        let spec = ContentSpecification::selected_node_instances()
            .with_related_properties(gadget_description().with_properties(PropertyNames::None));
        let content = builder.compile_specification(&spec, &[SelectClass::new(widget, false)]);
        assert!(content.sources[0].related_property_paths.is_empty());
    }

    #[test]
    fn test_polymorphic_related_properties_need_data() {
        let (catalog, conn) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let special = class(&catalog, "SpecialGadget");
        let spec = ContentSpecification::selected_node_instances()
            .with_related_properties(gadget_description().polymorphic());
        let input = [SelectClass::new(widget, false)];

        let mut builder = ContentBuilder::new(&catalog, &matcher);
        let content = builder.compile_specification(&spec, &input);
        assert!(content.sources[0].related_property_paths.is_empty());

        conn.set_instance_count(special, 3);
        catalog.clear_caches();
        let content = builder.compile_specification(&spec, &input);
        let paths = &content.sources[0].related_property_paths;
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].steps()[0].target, special);
        assert!(!paths[0].steps()[0].is_target_polymorphic);
    }

    #[test]
    fn test_modifiers_apply_to_root_only() {
        let (catalog, _) = fixture();
        let widget = class(&catalog, "Widget");
        let nested = RelatedPropertiesSpecification::new("Test:GadgetHasSprocket", "Test:Sprocket")
            .with_direction(RequiredRelationDirection::Forward);
        let ruleset = Ruleset::new("r")
            .with_content_modifier(ContentModifier::new("Test", "Widget").with_related_properties(gadget_description()))
            .with_content_modifier(ContentModifier::new("Test", "Gadget").with_related_properties(nested));
        let matcher = RulesetMatcher::new(catalog.schemas(), &ruleset);
        let mut builder = ContentBuilder::new(&catalog, &matcher);

        let content = builder.compile_specification(
            &ContentSpecification::selected_node_instances(),
            &[SelectClass::new(widget, false)],
        );
        let paths = &content.sources[0].related_property_paths;
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].len(), 1);
        assert!(content.properties().all(|p| p.property != "Size"));
    }

    #[test]
    fn test_handled_source_is_skipped() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let mut builder = ContentBuilder::new(&catalog, &matcher);
        let spec = ContentSpecification::selected_node_instances();
        let source = ContentSource::new(SelectClass::new(widget, false));

        assert!(builder.append_content(&source, &spec, None).is_some());
        assert!(builder.append_content(&source, &spec, None).is_none());
        builder.reset();
        assert!(builder.append_content(&source, &spec, None).is_some());
    }

    #[test]
    fn test_compile_is_repeatable() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let mut builder = ContentBuilder::new(&catalog, &matcher);
        let spec = ContentSpecification::related_instances("", "Test:Gadget", RequiredRelationDirection::Both)
            .with_related_properties(
                RelatedPropertiesSpecification::new("Test:GadgetHasSprocket", "Test:Sprocket")
                    .with_direction(RequiredRelationDirection::Forward),
            );
        let input = [SelectClass::new(widget, false)];

        let first = serde_json::to_string(&builder.compile_specification(&spec, &input)).unwrap();
        let second = serde_json::to_string(&builder.compile_specification(&spec, &input)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_compile_rule_orders_by_priority() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let gadget = class(&catalog, "Gadget");
        let mut builder = ContentBuilder::new(&catalog, &matcher);
        let rule = ContentRule::new()
            .with_specification(ContentSpecification::selected_node_instances())
            .with_specification(ContentSpecification::instances_of("Test:Gadget", false).with_priority(10));

        let compiled = builder.compile_rule(&rule, &[SelectClass::new(widget, false)]);
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[0].sources[0].source.select_class, SelectClass::new(gadget, false));
        assert_eq!(compiled[1].sources[0].source.select_class.class, widget);
    }

    #[test]
    fn test_label_overrides_and_groupings_compile() {
        let (catalog, _) = fixture();
        let widget = class(&catalog, "Widget");
        let ruleset = Ruleset::new("r")
            .with_label_override(InstanceLabelOverride::new("Test:Gadget", ["Description"]))
            .with_grouping_rule(GroupingRule::new(
                "Test:Gadget",
                vec![
                    GroupSpecification::ClassGroup { base_class: None },
                    GroupSpecification::RelationshipGroup,
                    GroupSpecification::SameLabelInstanceGroup,
                ],
            ));
        let matcher = RulesetMatcher::new(catalog.schemas(), &ruleset);
        let mut builder = ContentBuilder::new(&catalog, &matcher);
        let spec = ContentSpecification::related_instances(
            "Test:WidgetHasGadget",
            "Test:Gadget",
            RequiredRelationDirection::Forward,
        );

        let content = builder.compile_specification(&spec, &[SelectClass::new(widget, false)]);
        assert_eq!(content.sources.len(), 1);
        let source = &content.sources[0];
        assert_eq!(source.label_properties, vec!["Description".to_string()]);
        assert_eq!(source.instance_contract.kind_name(), "InstanceNodes");
        let kinds: Vec<&str> = source.grouping_contracts.iter().map(|c| c.kind_name()).collect();
        assert_eq!(kinds, vec!["ClassGrouping", "RelationshipGrouping", "DisplayLabelGrouping"]);

        let nodes = build_instance_nodes_query(&content).unwrap().to_query_string(catalog.schemas());
        assert!(nodes.contains(
            "COALESCE(NULLIF([this].[Description], ''), GetInstanceLabel([this].ECClassId, [this].ECInstanceId)) AS [DisplayLabel]"
        ));
        assert!(nodes.contains("[related].ECInstanceId AS [ParentInstanceNodeId]"));
        assert!(nodes.contains("[Test].[Widget] [related]"));
        assert!(!nodes.contains("nav_t_Widget_0"));

        let groupings: Vec<String> = build_grouping_queries(catalog.schemas(), &content)
            .iter()
            .map(|q| q.to_query_string(catalog.schemas()))
            .collect();
        assert_eq!(groupings.len(), 3);
        assert!(groupings[0].ends_with("GROUP BY ECClassId, DisplayLabel"));
        assert!(groupings[1].contains("'WidgetHasGadget' AS [DisplayLabel]"));
        assert!(groupings[2].contains("GROUP_CONCAT([this].ECInstanceId) AS [GroupedInstanceIds]"));
    }

    #[test]
    fn test_groupings_without_rules_or_relationship() {
        let (catalog, _) = fixture();
        let widget = class(&catalog, "Widget");
        let ruleset = Ruleset::new("r").with_grouping_rule(GroupingRule::new(
            "Test:Widget",
            vec![GroupSpecification::RelationshipGroup],
        ));
        let matcher = RulesetMatcher::new(catalog.schemas(), &ruleset);
        let mut builder = ContentBuilder::new(&catalog, &matcher);

        // selected instances are not reached through a relationship
        let content = builder.compile_specification(
            &ContentSpecification::selected_node_instances(),
            &[SelectClass::new(widget, false)],
        );
        let source = &content.sources[0];
        assert!(source.label_properties.is_empty());
        assert!(source.grouping_contracts.is_empty());
        assert!(build_grouping_queries(catalog.schemas(), &content).is_empty());

        let nodes = build_instance_nodes_query(&content).unwrap().to_query_string(catalog.schemas());
        assert_eq!(
            nodes,
            "SELECT [this].ECInstanceId AS [ECInstanceId], [this].ECClassId AS [ECClassId], \
             GetInstanceLabel([this].ECClassId, [this].ECInstanceId) AS [DisplayLabel], \
             NULL AS [ParentInstanceNodeId] FROM ONLY [Test].[Widget] [this]"
        );
    }

    #[test]
    fn test_grouping_skips_excluded_classes() {
        let (catalog, _) = fixture();
        let special = class(&catalog, "SpecialGadget");
        let ruleset = Ruleset::new("r").with_grouping_rule(GroupingRule::new(
            "Test:Gadget",
            vec![GroupSpecification::ClassGroup { base_class: None }],
        ));
        let matcher = RulesetMatcher::new(catalog.schemas(), &ruleset);
        let mut builder = ContentBuilder::new(&catalog, &matcher);

        let spec = ContentSpecification::instances_of("Test:Gadget;E:Test:SpecialGadget", true);
        let content = builder.compile_specification(&spec, &[]);
        let groupings = build_grouping_queries(catalog.schemas(), &content);
        assert_eq!(groupings.len(), 1);
        let text = groupings[0].to_query_string(catalog.schemas());
        assert!(text.contains(&format!("WHERE ([this].ECClassId NOT IN ({}))", special)));
    }

    #[test]
    fn test_merged_rows() {
        let (catalog, _) = fixture();
        let matcher = RulesetMatcher::default();
        let widget = class(&catalog, "Widget");
        let mut builder = ContentBuilder::new(&catalog, &matcher).with_config(ContentConfig::default().merge_rows(true));

        let content = builder.compile_specification(
            &ContentSpecification::selected_node_instances(),
            &[SelectClass::new(widget, false)],
        );
        assert!(content.sources[0].contract.is_aggregating());
        let query = build_content_query(&content).unwrap().to_query_string(catalog.schemas());
        assert_eq!(
            query,
            "SELECT MAX([this].ECClassId) AS [ECClassId], MAX([this].ECInstanceId) AS [ECInstanceId], \
             CASE WHEN COUNT(DISTINCT [this].[MyID]) = 1 THEN MAX([this].[MyID]) ELSE 'Varies' END AS [this_MyID] \
             FROM ONLY [Test].[Widget] [this]"
        );
    }
}
