//! Resolved schema metadata.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::def::{ClassKind, ConstraintDef, Multiplicity, PropertyDef, PropertyKind, SchemaDef};
use crate::error::{Error, Result};

/// Identifier of a schema within a [`SchemaSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SchemaId(u32);

impl SchemaId {
    /// Position of the schema in its set.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a class within a [`SchemaSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ClassId(u32);

impl ClassId {
    /// Position of the class in its set.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A loaded schema.
#[derive(Debug, Clone)]
pub struct Schema {
    pub id: SchemaId,
    pub name: String,
    pub alias: String,
    pub classes: Vec<ClassId>,
}

/// A resolved relationship end.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub classes: Vec<ClassId>,
    pub polymorphic: bool,
    pub multiplicity: Multiplicity,
}

impl Constraint {
    /// Check whether `class` may appear at this end.
    pub fn supports(&self, schemas: &SchemaSet, class: ClassId) -> bool {
        self.classes.iter().any(|&c| {
            if self.polymorphic {
                schemas.is(class, c)
            } else {
                class == c
            }
        })
    }
}

/// Resolved relationship ends.
#[derive(Debug, Clone)]
pub struct Relationship {
    pub source: Constraint,
    pub target: Constraint,
}

/// A loaded class.
#[derive(Debug, Clone)]
pub struct Class {
    pub id: ClassId,
    pub schema: SchemaId,
    pub name: String,
    /// `Schema:Class`
    pub full_name: String,
    pub kind: ClassKind,
    pub is_abstract: bool,
    pub base_classes: Vec<ClassId>,
    pub derived_classes: Vec<ClassId>,
    /// Properties declared on this class only.
    pub properties: Vec<PropertyDef>,
    pub relationship: Option<Relationship>,
}

impl Class {
    /// Check if this is an entity class.
    pub fn is_entity(&self) -> bool {
        self.kind == ClassKind::Entity
    }

    /// Check if this is a relationship class.
    pub fn is_relationship(&self) -> bool {
        self.kind == ClassKind::Relationship
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SchemaDocument {
    Many(Vec<SchemaDef>),
    One(SchemaDef),
}

/// An immutable, fully resolved set of schemas.
///
/// Class references are resolved to [`ClassId`]s when the set is built, so
/// every id handed out by a set is valid for that set.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    schemas: Vec<Schema>,
    classes: Vec<Class>,
    /// Lowercased schema name and alias to id.
    schema_index: HashMap<String, SchemaId>,
    /// (schema, lowercased class name) to id.
    class_index: HashMap<(SchemaId, String), ClassId>,
    /// Every class a class "is", itself included.
    ancestors: Vec<HashSet<ClassId>>,
}

impl SchemaSet {
    /// Build a schema set from definitions.
    pub fn from_defs(defs: Vec<SchemaDef>) -> Result<Self> {
        let mut set = SchemaSet::default();

        // Pass 1: register schemas and classes.
        for def in &defs {
            let id = SchemaId(set.schemas.len() as u32);
            let alias = if def.alias.is_empty() {
                def.name.clone()
            } else {
                def.alias.clone()
            };
            for key in [def.name.to_lowercase(), alias.to_lowercase()] {
                if let Some(existing) = set.schema_index.get(&key) {
                    if *existing != id {
                        return Err(Error::DuplicateSchema(def.name.clone()));
                    }
                }
                set.schema_index.insert(key, id);
            }
            let mut schema = Schema {
                id,
                name: def.name.clone(),
                alias,
                classes: Vec::new(),
            };
            for class_def in &def.classes {
                let class_id = ClassId(set.classes.len() as u32);
                let full_name = format!("{}:{}", def.name, class_def.name);
                let key = (id, class_def.name.to_lowercase());
                if set.class_index.insert(key, class_id).is_some() {
                    return Err(Error::DuplicateClass(full_name));
                }
                if class_def.kind == ClassKind::Relationship && class_def.relationship.is_none() {
                    return Err(Error::InvalidSchema(format!(
                        "relationship class {} has no constraints",
                        full_name
                    )));
                }
                set.classes.push(Class {
                    id: class_id,
                    schema: id,
                    name: class_def.name.clone(),
                    full_name,
                    kind: class_def.kind,
                    is_abstract: class_def.is_abstract,
                    base_classes: Vec::new(),
                    derived_classes: Vec::new(),
                    properties: class_def.properties.clone(),
                    relationship: None,
                });
                schema.classes.push(class_id);
            }
            set.schemas.push(schema);
        }

        // Pass 2: resolve references.
        let mut next = 0usize;
        for def in &defs {
            let schema_id = set
                .schema_id(&def.name)
                .ok_or_else(|| Error::InvalidSchema(def.name.clone()))?;
            for class_def in &def.classes {
                let class_id = ClassId(next as u32);
                next += 1;
                let full_name = set.classes[class_id.index()].full_name.clone();

                let mut bases = Vec::with_capacity(class_def.base_classes.len());
                for base in &class_def.base_classes {
                    let base_id = set.resolve_ref(schema_id, base).ok_or_else(|| {
                        Error::UnknownBaseClass {
                            class: full_name.clone(),
                            base: base.clone(),
                        }
                    })?;
                    bases.push(base_id);
                }
                for base_id in &bases {
                    set.classes[base_id.index()].derived_classes.push(class_id);
                }
                set.classes[class_id.index()].base_classes = bases;

                if let Some(rel) = &class_def.relationship {
                    let source = set.resolve_constraint(schema_id, &full_name, &rel.source)?;
                    let target = set.resolve_constraint(schema_id, &full_name, &rel.target)?;
                    set.classes[class_id.index()].relationship = Some(Relationship { source, target });
                }
            }
        }

        // Pass 3: navigation properties must point at relationships.
        for class in &set.classes {
            for property in &class.properties {
                if let PropertyKind::Navigation { relationship, .. } = &property.kind {
                    let resolved = set
                        .resolve_ref(class.schema, relationship)
                        .filter(|id| set.classes[id.index()].is_relationship());
                    if resolved.is_none() {
                        return Err(Error::UnknownRelationship {
                            class: class.full_name.clone(),
                            property: property.name.clone(),
                            relationship: relationship.clone(),
                        });
                    }
                }
            }
        }

        set.check_inheritance_cycles()?;
        set.ancestors = (0..set.classes.len())
            .map(|i| set.collect_ancestors(ClassId(i as u32)))
            .collect();
        Ok(set)
    }

    /// Parse a JSON document holding one schema or an array of schemas.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let defs = match serde_json::from_str::<SchemaDocument>(json)? {
            SchemaDocument::Many(defs) => defs,
            SchemaDocument::One(def) => vec![def],
        };
        Self::from_defs(defs)
    }

    /// Read schema documents from files and build one set out of all of them.
    pub fn from_json_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut defs = Vec::new();
        for path in paths {
            let text = std::fs::read_to_string(path)?;
            match serde_json::from_str::<SchemaDocument>(&text)? {
                SchemaDocument::Many(many) => defs.extend(many),
                SchemaDocument::One(def) => defs.push(def),
            }
        }
        Self::from_defs(defs)
    }

    fn resolve_constraint(
        &self,
        schema: SchemaId,
        relationship: &str,
        def: &ConstraintDef,
    ) -> Result<Constraint> {
        let mut classes = Vec::with_capacity(def.classes.len());
        for name in &def.classes {
            let id = self
                .resolve_ref(schema, name)
                .ok_or_else(|| Error::UnknownConstraintClass {
                    relationship: relationship.to_string(),
                    class: name.clone(),
                })?;
            classes.push(id);
        }
        Ok(Constraint {
            classes,
            polymorphic: def.polymorphic,
            multiplicity: def.multiplicity,
        })
    }

    /// Resolve a class reference relative to a schema.
    pub(crate) fn resolve_ref(&self, schema: SchemaId, reference: &str) -> Option<ClassId> {
        match split_full_name(reference) {
            Some((schema_name, class_name)) => self.find_class(schema_name, class_name),
            None => self
                .class_index
                .get(&(schema, reference.trim().to_lowercase()))
                .copied(),
        }
    }

    fn check_inheritance_cycles(&self) -> Result<()> {
        // 0 = unvisited, 1 = on stack, 2 = done
        let mut state = vec![0u8; self.classes.len()];
        for start in 0..self.classes.len() {
            if state[start] != 0 {
                continue;
            }
            let mut stack = vec![(start, 0usize)];
            state[start] = 1;
            while let Some((node, edge)) = stack.pop() {
                let bases = &self.classes[node].base_classes;
                if edge < bases.len() {
                    stack.push((node, edge + 1));
                    let base = bases[edge].index();
                    match state[base] {
                        0 => {
                            state[base] = 1;
                            stack.push((base, 0));
                        }
                        1 => return Err(Error::InheritanceCycle(self.classes[base].full_name.clone())),
                        _ => {}
                    }
                } else {
                    state[node] = 2;
                }
            }
        }
        Ok(())
    }

    fn collect_ancestors(&self, id: ClassId) -> HashSet<ClassId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if seen.insert(current) {
                queue.extend(self.classes[current.index()].base_classes.iter().copied());
            }
        }
        seen
    }

    /// All schemas.
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas
    }

    /// All classes.
    pub fn classes(&self) -> &[Class] {
        &self.classes
    }

    /// Get a schema by id.
    pub fn schema(&self, id: SchemaId) -> &Schema {
        &self.schemas[id.index()]
    }

    /// Look up a schema id by name or alias (case-insensitive).
    pub fn schema_id(&self, name: &str) -> Option<SchemaId> {
        self.schema_index.get(&name.trim().to_lowercase()).copied()
    }

    /// Get a class by id.
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    /// Get a class by raw index, if it exists.
    pub fn class_at(&self, index: usize) -> Option<&Class> {
        self.classes.get(index)
    }

    /// Look up a class by schema and class name (case-insensitive).
    pub fn find_class(&self, schema_name: &str, class_name: &str) -> Option<ClassId> {
        let schema = self.schema_id(schema_name)?;
        self.class_index
            .get(&(schema, class_name.trim().to_lowercase()))
            .copied()
    }

    /// Look up a class by full name (`Schema:Class` or `Schema.Class`).
    pub fn find_class_by_full_name(&self, full_name: &str) -> Option<ClassId> {
        let (schema_name, class_name) = split_full_name(full_name)?;
        self.find_class(schema_name, class_name)
    }

    /// Check whether `class` is `base` or derives from it.
    pub fn is(&self, class: ClassId, base: ClassId) -> bool {
        self.ancestors
            .get(class.index())
            .is_some_and(|ancestors| ancestors.contains(&base))
    }

    /// Direct subclasses.
    pub fn derived_classes(&self, id: ClassId) -> &[ClassId] {
        &self.classes[id.index()].derived_classes
    }

    /// Every subclass, direct or not, in breadth-first order.
    pub fn all_derived_classes(&self, id: ClassId) -> Vec<ClassId> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<ClassId> = self.derived_classes(id).iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            if seen.insert(current) {
                result.push(current);
                queue.extend(self.derived_classes(current).iter().copied());
            }
        }
        result
    }

    /// Relationship classes.
    pub fn relationships(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter().filter(|c| c.is_relationship())
    }

    /// Properties of a class, base classes first. Derived declarations shadow base ones.
    pub fn properties(&self, id: ClassId, include_inherited: bool) -> Vec<&PropertyDef> {
        if !include_inherited {
            return self.class(id).properties.iter().collect();
        }
        let mut ordered: Vec<&PropertyDef> = Vec::new();
        let mut visited = HashSet::new();
        self.collect_properties(id, &mut ordered, &mut visited);
        ordered
    }

    fn collect_properties<'a>(
        &'a self,
        id: ClassId,
        out: &mut Vec<&'a PropertyDef>,
        visited: &mut HashSet<ClassId>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let class = self.class(id);
        for base in &class.base_classes {
            self.collect_properties(*base, out, visited);
        }
        for property in &class.properties {
            match out.iter().position(|p| p.name.eq_ignore_ascii_case(&property.name)) {
                Some(index) => out[index] = property,
                None => out.push(property),
            }
        }
    }

    /// Find a property by name, searching base classes too.
    pub fn find_property(&self, id: ClassId, name: &str) -> Option<&PropertyDef> {
        self.properties(id, true)
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Relationship class referenced by a navigation property of `owner`.
    pub fn navigation_relationship(&self, owner: ClassId, property: &PropertyDef) -> Option<ClassId> {
        match &property.kind {
            PropertyKind::Navigation { relationship, .. } => self
                .resolve_ref(self.class(owner).schema, relationship)
                .filter(|id| self.class(*id).is_relationship()),
            _ => None,
        }
    }
}

/// Split `Schema:Class` or `Schema.Class`.
pub(crate) fn split_full_name(full_name: &str) -> Option<(&str, &str)> {
    let full_name = full_name.trim();
    let index = full_name.find([':', '.'])?;
    let (schema, rest) = full_name.split_at(index);
    let class = &rest[1..];
    if schema.is_empty() || class.is_empty() {
        return None;
    }
    Some((schema, class))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::def::{ClassDef, PrimitiveType};

    fn test_set() -> SchemaSet {
        SchemaSet::from_defs(vec![SchemaDef::new("Test", "t")
            .with_class(
                ClassDef::entity("Base")
                    .abstract_class()
                    .with_property(PropertyDef::string("Label"))
                    .with_property(PropertyDef::string("Code")),
            )
            .with_class(
                ClassDef::entity("Widget")
                    .with_base("Base")
                    .with_property(PropertyDef::primitive("Code", PrimitiveType::Integer)),
            )
            .with_class(ClassDef::entity("SpecialWidget").with_base("Test:Widget"))
            .with_class(ClassDef::entity("Gadget"))
            .with_class(ClassDef::relationship(
                "WidgetHasGadget",
                ConstraintDef::new(["Widget"]),
                ConstraintDef::new(["Gadget"]),
            ))])
        .unwrap()
    }

    #[test]
    fn test_lookup_by_names() {
        let set = test_set();
        let widget = set.find_class("Test", "Widget").unwrap();
        assert_eq!(set.find_class_by_full_name("Test:Widget"), Some(widget));
        assert_eq!(set.find_class_by_full_name("t.widget"), Some(widget));
        assert_eq!(set.find_class("Test", "Missing"), None);
        assert_eq!(set.find_class_by_full_name("Widget"), None);
        assert_eq!(set.class(widget).full_name, "Test:Widget");
    }

    #[test]
    fn test_is_and_derived() {
        let set = test_set();
        let base = set.find_class("Test", "Base").unwrap();
        let widget = set.find_class("Test", "Widget").unwrap();
        let special = set.find_class("Test", "SpecialWidget").unwrap();

        assert!(set.is(special, base));
        assert!(set.is(widget, widget));
        assert!(!set.is(base, widget));
        assert_eq!(set.derived_classes(base), &[widget]);
        assert_eq!(set.all_derived_classes(base), vec![widget, special]);
    }

    #[test]
    fn test_properties_shadowing() {
        let set = test_set();
        let special = set.find_class("Test", "SpecialWidget").unwrap();
        let props = set.properties(special, true);
        let names: Vec<&str> = props.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Label", "Code"]);
        assert_eq!(
            props[1].kind,
            PropertyKind::Primitive {
                primitive_type: PrimitiveType::Integer
            }
        );
        assert!(set.properties(special, false).is_empty());
    }

    #[test]
    fn test_unknown_base_rejected() {
        let result = SchemaSet::from_defs(vec![
            SchemaDef::new("Test", "").with_class(ClassDef::entity("A").with_base("Nope"))
        ]);
        assert!(matches!(result, Err(Error::UnknownBaseClass { .. })));
    }

    #[test]
    fn test_inheritance_cycle_rejected() {
        let result = SchemaSet::from_defs(vec![SchemaDef::new("Test", "")
            .with_class(ClassDef::entity("A").with_base("B"))
            .with_class(ClassDef::entity("B").with_base("A"))]);
        assert!(matches!(result, Err(Error::InheritanceCycle(_))));
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let result = SchemaSet::from_defs(vec![SchemaDef::new("Test", "")
            .with_class(ClassDef::entity("A"))
            .with_class(ClassDef::entity("a"))]);
        assert!(matches!(result, Err(Error::DuplicateClass(_))));
    }

    #[test]
    fn test_constraint_supports() {
        let set = test_set();
        let rel = set.find_class("Test", "WidgetHasGadget").unwrap();
        let special = set.find_class("Test", "SpecialWidget").unwrap();
        let gadget = set.find_class("Test", "Gadget").unwrap();
        let ends = set.class(rel).relationship.as_ref().unwrap();
        assert!(ends.source.supports(&set, special));
        assert!(!ends.source.supports(&set, gadget));
    }

    #[test]
    fn test_split_full_name() {
        assert_eq!(split_full_name("A:B"), Some(("A", "B")));
        assert_eq!(split_full_name("A.B"), Some(("A", "B")));
        assert_eq!(split_full_name(":B"), None);
        assert_eq!(split_full_name("AB"), None);
    }
}
