//! Schema catalog: name resolution and relationship path traversal.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, instrument, trace};

use super::class_list::{ClassListFilter, SchemaList};
use super::connection::Connection;
use super::def::{NavigationDirection, PropertyDef, PropertyKind};
use super::schema::{Class, ClassId, Constraint, Schema, SchemaSet};
use crate::config::CatalogConfig;
use crate::query::cache::{
    PathCache, PathCacheKey, PathCacheResult, PolymorphicRelationCache, PolymorphicRelationKey,
};
use crate::query::{
    RelatedClassPath, RelatedClassStep, RelationUseCounter, RelationshipDirection, StepKey,
    SELECT_ALIAS,
};

/// Options of a relationship path resolution.
#[derive(Debug, Clone)]
pub struct RelationshipPathOptions<'a> {
    /// Class the paths start at.
    pub source_class: ClassId,
    /// Allowed directions.
    pub direction: RelationshipDirection,
    /// `-1` unbounded, `0` immediate hops only, `N` exactly `N + 1` hops.
    pub depth: i32,
    /// Supported-schemas filter.
    pub supported_schemas: &'a str,
    /// Class-list filter of relationships.
    pub supported_relationships: &'a str,
    /// Class-list filter of related classes.
    pub supported_classes: &'a str,
    /// Only return paths ending at this class (or its subclasses).
    pub target_class: Option<ClassId>,
    /// Treat related classes polymorphically.
    pub polymorphic: bool,
    /// Alias of the source class in the resulting paths.
    pub source_alias: &'a str,
}

impl<'a> RelationshipPathOptions<'a> {
    /// Immediate hops from `source_class` in `direction`, with no filters.
    pub fn new(source_class: ClassId, direction: RelationshipDirection) -> Self {
        Self {
            source_class,
            direction,
            depth: 0,
            supported_schemas: "",
            supported_relationships: "",
            supported_classes: "",
            target_class: None,
            polymorphic: true,
            source_alias: SELECT_ALIAS,
        }
    }

    /// Set the depth.
    pub fn depth(mut self, depth: i32) -> Self {
        self.depth = depth;
        self
    }

    /// Set the supported-schemas filter.
    pub fn supported_schemas(mut self, filter: &'a str) -> Self {
        self.supported_schemas = filter;
        self
    }

    /// Set the relationships filter.
    pub fn relationships(mut self, filter: &'a str) -> Self {
        self.supported_relationships = filter;
        self
    }

    /// Set the related classes filter.
    pub fn classes(mut self, filter: &'a str) -> Self {
        self.supported_classes = filter;
        self
    }

    /// Set the required target class.
    pub fn target_class(mut self, target: ClassId) -> Self {
        self.target_class = Some(target);
        self
    }

    /// Set related class polymorphism.
    pub fn polymorphic(mut self, polymorphic: bool) -> Self {
        self.polymorphic = polymorphic;
        self
    }

    /// Set the source alias.
    pub fn source_alias(mut self, alias: &'a str) -> Self {
        self.source_alias = alias;
        self
    }

    fn cache_key(&self) -> PathCacheKey {
        PathCacheKey {
            source: self.source_class,
            direction: self.direction,
            depth: self.depth,
            polymorphic: self.polymorphic,
            supported_schemas: self.supported_schemas.to_string(),
            supported_relationships: self.supported_relationships.to_string(),
            supported_classes: self.supported_classes.to_string(),
            target_class: self.target_class,
        }
    }
}

/// Parsed filters of one traversal.
struct Traversal<'a> {
    schemas: &'a SchemaSet,
    schema_list: SchemaList,
    relationships: ClassListFilter,
    classes: ClassListFilter,
    target_class: Option<ClassId>,
    polymorphic: bool,
}

impl Traversal<'_> {
    /// Steps leaving `class` that pass the direction and filters.
    fn candidate_steps(&self, class: ClassId, direction: RelationshipDirection) -> Vec<RelatedClassStep> {
        let mut steps = Vec::new();
        for relationship in self.schemas.relationships() {
            if !self.accepts_schema(relationship) {
                continue;
            }
            if self.relationships.has_includes() && !self.relationships.accepts(self.schemas, relationship.id) {
                continue;
            }
            let Some(ends) = &relationship.relationship else {
                continue;
            };
            if direction.has_forward() && ends.source.supports(self.schemas, class) {
                self.push_targets(&mut steps, class, relationship.id, &ends.target, true);
            }
            if direction.has_backward() && ends.target.supports(self.schemas, class) {
                self.push_targets(&mut steps, class, relationship.id, &ends.source, false);
            }
        }
        steps
    }

    fn push_targets(
        &self,
        steps: &mut Vec<RelatedClassStep>,
        source: ClassId,
        relationship: ClassId,
        opposite: &Constraint,
        is_forward: bool,
    ) {
        let optional = opposite.multiplicity.is_optional();
        for (target, polymorphic) in self.target_candidates(opposite) {
            if !self.accepts_schema(self.schemas.class(target)) {
                continue;
            }
            let step = RelatedClassStep::new(source, relationship, target, is_forward)
                .with_target_polymorphic(polymorphic && self.polymorphic)
                .with_target_optional(optional);
            if !steps.iter().any(|s| s.key() == step.key()) {
                steps.push(step);
            }
        }
    }

    /// Classes a hop may land on at the given relationship end.
    fn target_candidates(&self, constraint: &Constraint) -> Vec<(ClassId, bool)> {
        if !self.classes.has_includes() {
            return constraint
                .classes
                .iter()
                .map(|&c| (c, constraint.polymorphic))
                .collect();
        }
        let mut candidates = Vec::new();
        for include in self.classes.includes() {
            for &constraint_class in &constraint.classes {
                let fits = if constraint.polymorphic {
                    self.schemas.is(include.class, constraint_class)
                } else {
                    include.class == constraint_class
                };
                let candidate = if fits {
                    Some((include.class, include.polymorphic))
                } else if include.polymorphic
                    && constraint.polymorphic
                    && self.schemas.is(constraint_class, include.class)
                {
                    Some((constraint_class, true))
                } else {
                    None
                };
                if let Some(candidate) = candidate {
                    if !candidates.iter().any(|(c, _)| *c == candidate.0) {
                        candidates.push(candidate);
                    }
                }
            }
        }
        candidates
    }

    fn accepts_schema(&self, class: &Class) -> bool {
        self.schema_list
            .accepts(&self.schemas.schema(class.schema).name)
    }

    /// Whether a step ends at a class the caller asked for.
    fn matches_request(&self, step: &RelatedClassStep) -> bool {
        !self.classes.has_includes() || self.classes.accepts(self.schemas, step.target)
            || self.classes.is_excluded(self.schemas, step.target)
    }

    /// Narrow a result step to the requested target class.
    fn accept_target(&self, mut step: RelatedClassStep) -> Option<RelatedClassStep> {
        let Some(target) = self.target_class else {
            return Some(step);
        };
        if self.schemas.is(step.target, target) {
            return Some(step);
        }
        if step.is_target_polymorphic && self.schemas.is(target, step.target) {
            step.target = target;
            return Some(step);
        }
        trace!(class = %step.target, requested = %target, "Skipping class that is not the requested target");
        None
    }

    /// Check whether `container` covers `path`: same hops, each class of `path` is-a class of `container`.
    fn contains_path(&self, container: &RelatedClassPath, path: &RelatedClassPath) -> bool {
        container.len() == path.len()
            && container.steps().iter().zip(path.steps()).all(|(c, p)| {
                let target_ok = if c.is_target_polymorphic {
                    self.schemas.is(p.target, c.target)
                } else {
                    p.target == c.target && !p.is_target_polymorphic
                };
                c.relationship == p.relationship
                    && c.is_forward == p.is_forward
                    && self.schemas.is(p.source, c.source)
                    && target_ok
            })
    }

    /// Add a path unless an existing one covers it; drop existing paths it covers.
    fn append_path(&self, paths: &mut Vec<RelatedClassPath>, path: RelatedClassPath) {
        if paths
            .iter()
            .any(|existing| existing.keys() == path.keys() || self.contains_path(existing, &path))
        {
            return;
        }
        paths.retain(|existing| !self.contains_path(&path, existing));
        paths.push(path);
    }
}

/// Resolves names and relationship paths against a connection's schemas.
///
/// One catalog serves one connection and may be shared between threads; its
/// caches are internally synchronized.
pub struct SchemaCatalog {
    connection: Arc<dyn Connection>,
    config: CatalogConfig,
    path_cache: PathCache,
    polymorphic_cache: PolymorphicRelationCache,
}

impl SchemaCatalog {
    /// Create a catalog with the default configuration.
    pub fn new(connection: Arc<dyn Connection>) -> Self {
        Self::with_config(connection, CatalogConfig::default())
    }

    /// Create a catalog with the given configuration.
    pub fn with_config(connection: Arc<dyn Connection>, config: CatalogConfig) -> Self {
        Self {
            path_cache: PathCache::new(config.path_cache_capacity),
            polymorphic_cache: PolymorphicRelationCache::new(config.polymorphic_cache_capacity),
            connection,
            config,
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &dyn Connection {
        self.connection.as_ref()
    }

    /// Schema metadata.
    pub fn schemas(&self) -> &SchemaSet {
        self.connection.schemas()
    }

    /// Configuration.
    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Path cache.
    pub fn path_cache(&self) -> &PathCache {
        &self.path_cache
    }

    /// Polymorphic relation cache.
    pub fn polymorphic_cache(&self) -> &PolymorphicRelationCache {
        &self.polymorphic_cache
    }

    /// Drop all cached resolutions.
    pub fn clear_caches(&self) {
        self.path_cache.clear();
        self.polymorphic_cache.clear();
    }

    /// Resolve a schema by name or alias.
    pub fn resolve_schema(&self, name: &str) -> Option<&Schema> {
        let schemas = self.schemas();
        schemas.schema_id(name).map(|id| schemas.schema(id))
    }

    /// Resolve a class by schema and class name.
    pub fn resolve_class(&self, schema: &str, name: &str) -> Option<ClassId> {
        self.schemas().find_class(schema, name)
    }

    /// Resolve a class by full name.
    pub fn resolve_class_by_full_name(&self, full_name: &str) -> Option<ClassId> {
        self.schemas().find_class_by_full_name(full_name)
    }

    /// Resolve a class by its numeric id.
    pub fn resolve_class_by_id(&self, index: usize) -> Option<&Class> {
        self.schemas().class_at(index)
    }

    /// Parse a class-list filter.
    pub fn parse_class_list(&self, text: &str, support_exclusion: bool) -> ClassListFilter {
        ClassListFilter::parse(self.schemas(), text, support_exclusion)
    }

    /// Resolve relationship paths from a class.
    ///
    /// Each entry carries an include flag: `false` entries name excluded
    /// classes that should be subtracted from the included ones. Aliases are
    /// assigned from `counter`, so results are unique within one compile.
    #[instrument(skip_all, fields(source = %options.source_class, depth = options.depth))]
    pub fn resolve_relationship_paths(
        &self,
        options: &RelationshipPathOptions<'_>,
        counter: &mut RelationUseCounter,
    ) -> Vec<(RelatedClassPath, bool)> {
        let key = options.cache_key();
        let resolved = match self.path_cache.get(&key) {
            Some(cached) => {
                debug!("Path cache hit");
                cached
            }
            None => {
                let paths = self.traverse(options);
                self.path_cache.put(key, paths)
            }
        };

        resolved
            .iter()
            .map(|(path, include)| {
                (
                    self.assign_aliases(path, options.source_alias, counter),
                    *include,
                )
            })
            .collect()
    }

    fn traversal(&self, options: &RelationshipPathOptions<'_>) -> Traversal<'_> {
        let schemas = self.schemas();
        Traversal {
            schemas,
            schema_list: SchemaList::parse(options.supported_schemas),
            relationships: ClassListFilter::parse(schemas, options.supported_relationships, false),
            classes: ClassListFilter::parse(schemas, options.supported_classes, true),
            target_class: options.target_class,
            polymorphic: options.polymorphic,
        }
    }

    fn traverse(&self, options: &RelationshipPathOptions<'_>) -> PathCacheResult {
        let traversal = self.traversal(options);
        let depth = options.depth;
        let max_hops = self.config.max_traversal_depth;

        let mut used: HashSet<StepKey> = HashSet::new();
        let mut paths: Vec<RelatedClassPath> = Vec::new();
        let mut frontier: Vec<(RelatedClassPath, ClassId)> =
            vec![(RelatedClassPath::new(), options.source_class)];
        let mut level: usize = 0;

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for (prefix, class) in &frontier {
                for step in traversal.candidate_steps(*class, options.direction) {
                    // each step is expanded once per traversal, which also breaks relationship loops
                    if !used.insert(step.key()) {
                        continue;
                    }
                    let recursive_match = depth < 0 && traversal.matches_request(&step);
                    if depth == level as i32 || recursive_match {
                        if let Some(result_step) = traversal.accept_target(step.clone()) {
                            traversal.append_path(&mut paths, prefix.extended(result_step));
                        }
                    }
                    let descend = if depth < 0 {
                        recursive_match && level + 1 < max_hops
                    } else {
                        (level as i32) < depth
                    };
                    if descend {
                        next.push((prefix.extended(step.clone()), step.target));
                    } else if depth < 0 && recursive_match {
                        debug!(level, max_hops, "Traversal depth limit reached");
                    }
                }
            }
            frontier = next;
            level += 1;
        }

        self.apply_exclusions(&traversal, paths)
    }

    /// Flag excluded targets and add subtraction entries for excluded subclasses.
    fn apply_exclusions(&self, traversal: &Traversal<'_>, paths: Vec<RelatedClassPath>) -> PathCacheResult {
        let schemas = self.schemas();
        let excludes: Vec<_> = traversal.classes.excludes().copied().collect();
        let mut result: PathCacheResult = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(last) = path.last() else {
                continue;
            };
            if traversal.classes.is_excluded(schemas, last.target) {
                result.push((path, false));
                continue;
            }
            let mut subtracted = Vec::new();
            if last.is_target_polymorphic {
                for exclude in &excludes {
                    if exclude.class != last.target && schemas.is(exclude.class, last.target) {
                        let mut excluded_path = path.clone();
                        if let Some(step) = excluded_path.last_mut() {
                            step.target = exclude.class;
                            step.is_target_polymorphic = exclude.polymorphic;
                            step.is_target_only = true;
                        }
                        subtracted.push((excluded_path, false));
                    }
                }
            }
            result.push((path, true));
            result.extend(subtracted);
        }
        result
    }

    fn assign_aliases(
        &self,
        path: &RelatedClassPath,
        source_alias: &str,
        counter: &mut RelationUseCounter,
    ) -> RelatedClassPath {
        let schemas = self.schemas();
        let mut aliased = path.clone();
        let mut previous = source_alias.to_string();
        for step in aliased.steps_mut() {
            step.source_alias = previous;
            step.relationship_alias = counter.related_alias(schemas, step.relationship);
            step.target_alias = counter.related_alias(schemas, step.target);
            previous = step.target_alias.clone();
        }
        aliased
    }

    /// Resolve single-hop paths to related classes that actually have instances.
    ///
    /// Related classes are expanded into their concrete subclasses; only those
    /// with data are kept, each as a non-polymorphic hop appended to
    /// `path_prefix`. The appended hops carry no aliases. Results without an
    /// instance filter are cached.
    #[instrument(skip_all, fields(source = %source_class))]
    pub fn resolve_polymorphic_related_classes_with_data(
        &self,
        source_class: ClassId,
        relationships: &str,
        direction: RelationshipDirection,
        base_classes: &str,
        path_prefix: &RelatedClassPath,
        instance_filter: Option<&str>,
    ) -> Vec<RelatedClassPath> {
        let filter = instance_filter.filter(|f| !f.trim().is_empty());
        let key = PolymorphicRelationKey {
            source: source_class,
            direction,
            relationships: relationships.to_string(),
            base_classes: base_classes.to_string(),
        };

        let tails = match filter {
            None => match self.polymorphic_cache.get(&key) {
                Some(cached) => cached,
                None => {
                    let tails = self.related_classes_with_data(source_class, relationships, direction, base_classes, None);
                    self.polymorphic_cache.put(key, tails)
                }
            },
            Some(filter) => Arc::new(self.related_classes_with_data(
                source_class,
                relationships,
                direction,
                base_classes,
                Some(filter),
            )),
        };

        tails.iter().map(|tail| path_prefix.combine(tail)).collect()
    }

    fn related_classes_with_data(
        &self,
        source_class: ClassId,
        relationships: &str,
        direction: RelationshipDirection,
        base_classes: &str,
        filter: Option<&str>,
    ) -> Vec<RelatedClassPath> {
        let schemas = self.schemas();
        let options = RelationshipPathOptions::new(source_class, direction)
            .relationships(relationships)
            .classes(base_classes);
        let mut result: Vec<RelatedClassPath> = Vec::new();
        for (path, include) in self.traverse(&options) {
            if !include || path.len() != 1 {
                continue;
            }
            let Some(step) = path.first() else {
                continue;
            };
            let mut candidates = vec![step.target];
            if step.is_target_polymorphic {
                candidates.extend(schemas.all_derived_classes(step.target));
            }
            for class in candidates {
                if schemas.class(class).is_abstract || !self.connection.has_instances(class, false, filter) {
                    continue;
                }
                let mut concrete = step.clone();
                concrete.target = class;
                concrete.is_target_polymorphic = false;
                if !result.iter().any(|p| p.first().map(|s| s.key()) == Some(concrete.key())) {
                    result.push(RelatedClassPath::single(concrete));
                }
            }
        }
        debug!(count = result.len(), "Resolved related classes with data");
        result
    }

    /// The implicit relationship hop a navigation property represents.
    ///
    /// Returns `None` for other properties. The hop carries no aliases.
    pub fn foreign_key_step(&self, owner: ClassId, property: &PropertyDef) -> Option<RelatedClassStep> {
        let PropertyKind::Navigation { direction, .. } = &property.kind else {
            return None;
        };
        let schemas = self.schemas();
        let relationship = schemas.navigation_relationship(owner, property)?;
        let ends = schemas.class(relationship).relationship.as_ref()?;
        let is_forward = *direction == NavigationDirection::Forward;
        let target_end = if is_forward { &ends.target } else { &ends.source };
        let Some(&target) = target_end.classes.first() else {
            debug!(class = %schemas.class(owner).full_name, property = %property.name, "Navigation property has no target constraint class");
            return None;
        };
        Some(
            RelatedClassStep::new(owner, relationship, target, is_forward)
                .with_target_polymorphic(target_end.polymorphic)
                .with_target_optional(target_end.multiplicity.is_optional()),
        )
    }
}
