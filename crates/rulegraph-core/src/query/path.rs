//! Relationship paths, select classes and alias counters.

use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;

use serde::Serialize;

use crate::catalog::{ClassId, SchemaSet};

/// Alias of the class selected by a query.
pub const SELECT_ALIAS: &str = "this";

/// Alias of the input class at the end of a reversed related-instances path.
pub const RELATED_ALIAS: &str = "related";

/// Directions a relationship may be followed in. Combinable with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RelationshipDirection(u8);

impl RelationshipDirection {
    pub const FORWARD: Self = Self(0b01);
    pub const BACKWARD: Self = Self(0b10);
    pub const BOTH: Self = Self(0b11);

    /// Check whether all directions in `other` are allowed.
    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether forward traversal is allowed.
    pub fn has_forward(&self) -> bool {
        self.contains(Self::FORWARD)
    }

    /// Check whether backward traversal is allowed.
    pub fn has_backward(&self) -> bool {
        self.contains(Self::BACKWARD)
    }
}

impl BitOr for RelationshipDirection {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl From<rulegraph_rules::RequiredRelationDirection> for RelationshipDirection {
    fn from(direction: rulegraph_rules::RequiredRelationDirection) -> Self {
        use rulegraph_rules::RequiredRelationDirection as Required;
        match direction {
            Required::Forward => Self::FORWARD,
            Required::Backward => Self::BACKWARD,
            Required::Both => Self::BOTH,
        }
    }
}

/// Include/exclude/polymorphic flags of a class-list filter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct SupportedClassFlags(u8);

impl SupportedClassFlags {
    pub const INCLUDE: Self = Self(0b001);
    pub const EXCLUDE: Self = Self(0b010);
    pub const POLYMORPHIC: Self = Self(0b100);

    /// Check whether the entry includes its class.
    pub fn is_include(&self) -> bool {
        self.0 & Self::INCLUDE.0 != 0
    }

    /// Check whether the entry excludes its class.
    pub fn is_exclude(&self) -> bool {
        self.0 & Self::EXCLUDE.0 != 0
    }

    /// Check whether the entry applies to subclasses too.
    pub fn is_polymorphic(&self) -> bool {
        self.0 & Self::POLYMORPHIC.0 != 0
    }
}

impl BitOr for SupportedClassFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A class to select, with its polymorphism and optional filter flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SelectClass {
    pub class: ClassId,
    pub polymorphic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<SupportedClassFlags>,
}

impl SelectClass {
    /// Create a select class without filter flags.
    pub fn new(class: ClassId, polymorphic: bool) -> Self {
        Self {
            class,
            polymorphic,
            flags: None,
        }
    }

    /// Create a select class from a filter entry.
    pub fn with_flags(class: ClassId, flags: SupportedClassFlags) -> Self {
        Self {
            class,
            polymorphic: flags.is_polymorphic(),
            flags: Some(flags),
        }
    }

    /// Check whether this is an exclusion entry.
    pub fn is_exclude(&self) -> bool {
        self.flags.is_some_and(|f| f.is_exclude())
    }
}

/// One relationship hop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RelatedClassStep {
    pub source: ClassId,
    pub source_alias: String,
    pub relationship: ClassId,
    pub relationship_alias: String,
    pub target: ClassId,
    pub target_alias: String,
    /// Followed from the relationship's source end to its target end.
    pub is_forward: bool,
    pub is_target_polymorphic: bool,
    pub is_target_optional: bool,
    /// Marks an excluded target: subtracted, never joined for data.
    pub is_target_only: bool,
}

/// Structural identity of a step, ignoring aliases and flags.
pub type StepKey = (ClassId, ClassId, ClassId, bool);

impl RelatedClassStep {
    /// Create a step with empty aliases.
    pub fn new(source: ClassId, relationship: ClassId, target: ClassId, is_forward: bool) -> Self {
        Self {
            source,
            source_alias: String::new(),
            relationship,
            relationship_alias: String::new(),
            target,
            target_alias: String::new(),
            is_forward,
            is_target_polymorphic: true,
            is_target_optional: false,
            is_target_only: false,
        }
    }

    /// `(source, relationship, target, is_forward)`
    pub fn key(&self) -> StepKey {
        (self.source, self.relationship, self.target, self.is_forward)
    }

    /// Set the target polymorphism.
    pub fn with_target_polymorphic(mut self, polymorphic: bool) -> Self {
        self.is_target_polymorphic = polymorphic;
        self
    }

    /// Set whether the target is optional (outer-joinable).
    pub fn with_target_optional(mut self, optional: bool) -> Self {
        self.is_target_optional = optional;
        self
    }

    /// Set the aliases.
    pub fn with_aliases(
        mut self,
        source_alias: impl Into<String>,
        relationship_alias: impl Into<String>,
        target_alias: impl Into<String>,
    ) -> Self {
        self.source_alias = source_alias.into();
        self.relationship_alias = relationship_alias.into();
        self.target_alias = target_alias.into();
        self
    }
}

/// An ordered sequence of hops. Empty means "no join".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct RelatedClassPath(Vec<RelatedClassStep>);

impl RelatedClassPath {
    /// Create an empty path.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create a path from steps.
    pub fn from_steps(steps: Vec<RelatedClassStep>) -> Self {
        Self(steps)
    }

    /// Create a single-hop path.
    pub fn single(step: RelatedClassStep) -> Self {
        Self(vec![step])
    }

    /// The steps.
    pub fn steps(&self) -> &[RelatedClassStep] {
        &self.0
    }

    /// Mutable steps.
    pub fn steps_mut(&mut self) -> &mut [RelatedClassStep] {
        &mut self.0
    }

    /// Number of hops.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the path has no hops.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First hop.
    pub fn first(&self) -> Option<&RelatedClassStep> {
        self.0.first()
    }

    /// Last hop.
    pub fn last(&self) -> Option<&RelatedClassStep> {
        self.0.last()
    }

    /// Last hop, mutable.
    pub fn last_mut(&mut self) -> Option<&mut RelatedClassStep> {
        self.0.last_mut()
    }

    /// Append a hop.
    pub fn push(&mut self, step: RelatedClassStep) {
        self.0.push(step);
    }

    /// Concatenate two paths.
    pub fn combine(&self, tail: &RelatedClassPath) -> RelatedClassPath {
        let mut steps = self.0.clone();
        steps.extend(tail.0.iter().cloned());
        Self(steps)
    }

    /// Copy of this path extended by one hop.
    pub fn extended(&self, step: RelatedClassStep) -> RelatedClassPath {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }

    /// Structural keys of every step.
    pub fn keys(&self) -> Vec<StepKey> {
        self.0.iter().map(RelatedClassStep::key).collect()
    }

    /// Reverse the path so its last target becomes the source.
    ///
    /// The new source gets `select_alias`, the new final target (the old
    /// source) gets `input_alias` and `input_polymorphic`.
    pub fn reversed(&self, select_alias: &str, input_alias: &str, input_polymorphic: bool) -> RelatedClassPath {
        let count = self.0.len();
        let mut steps = Vec::with_capacity(count);
        for (i, step) in self.0.iter().enumerate().rev() {
            let target_polymorphic = if i == 0 {
                input_polymorphic
            } else {
                self.0[i - 1].is_target_polymorphic
            };
            let source_alias = if i == count - 1 {
                select_alias.to_string()
            } else {
                step.target_alias.clone()
            };
            let target_alias = if i == 0 {
                input_alias.to_string()
            } else {
                step.source_alias.clone()
            };
            steps.push(RelatedClassStep {
                source: step.target,
                source_alias,
                relationship: step.relationship,
                relationship_alias: step.relationship_alias.clone(),
                target: step.source,
                target_alias,
                is_forward: !step.is_forward,
                is_target_polymorphic: target_polymorphic,
                is_target_optional: false,
                is_target_only: false,
            });
        }
        Self(steps)
    }

    /// Human readable form, e.g. `Test:Gadget -(Test:WidgetHasGadget)-> Test:Widget`.
    pub fn describe(&self, schemas: &SchemaSet) -> String {
        let mut out = String::new();
        for (i, step) in self.0.iter().enumerate() {
            if i == 0 {
                out.push_str(&schemas.class(step.source).full_name);
            }
            let arrow = if step.is_forward { "->" } else { "<-" };
            out.push_str(&format!(
                " -({}){} {}",
                schemas.class(step.relationship).full_name,
                arrow,
                schemas.class(step.target).full_name
            ));
        }
        out
    }
}

impl From<Vec<RelatedClassStep>> for RelatedClassPath {
    fn from(steps: Vec<RelatedClassStep>) -> Self {
        Self(steps)
    }
}

impl fmt::Display for RelatedClassPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let aliases: Vec<&str> = self.0.iter().map(|s| s.target_alias.as_str()).collect();
        write!(f, "[{}]", aliases.join(" > "))
    }
}

/// Per-compile counter of class uses, used to make aliases unique.
///
/// Owned by a single compile call; never shared between concurrent compiles.
#[derive(Debug, Clone, Default)]
pub struct RelationUseCounter {
    counts: HashMap<ClassId, u32>,
}

impl RelationUseCounter {
    /// Create an empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the count for `class` and return the previous count.
    pub fn increment(&mut self, class: ClassId) -> u32 {
        let count = self.counts.entry(class).or_insert(0);
        let previous = *count;
        *count += 1;
        previous
    }

    /// Current count for `class`.
    pub fn get(&self, class: ClassId) -> u32 {
        self.counts.get(&class).copied().unwrap_or(0)
    }

    /// Raise every count to at least the other counter's.
    pub fn merge(&mut self, other: &RelationUseCounter) {
        for (class, count) in &other.counts {
            let entry = self.counts.entry(*class).or_insert(0);
            *entry = (*entry).max(*count);
        }
    }

    /// Allocate the next related-class alias for `class`.
    pub fn related_alias(&mut self, schemas: &SchemaSet, class: ClassId) -> String {
        let n = self.increment(class);
        class_alias("rel", schemas, class, n)
    }

    /// Allocate the next navigation alias for `class`.
    pub fn navigation_alias(&mut self, schemas: &SchemaSet, class: ClassId) -> String {
        let n = self.increment(class);
        class_alias("nav", schemas, class, n)
    }
}

/// `<prefix>_<schemaAlias>_<className>_<n>`
pub fn class_alias(prefix: &str, schemas: &SchemaSet, class: ClassId, n: u32) -> String {
    let class = schemas.class(class);
    format!("{}_{}_{}_{}", prefix, schemas.schema(class.schema).alias, class.name, n)
}
