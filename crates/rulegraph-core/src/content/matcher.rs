//! Customization rule lookup for content compilation.

use rulegraph_rules::{ContentModifier, GroupSpecification, Ruleset};
use tracing::debug;

use crate::catalog::{ClassId, SchemaSet};
use crate::query::SelectClass;

/// Answers which customization rules target a class.
pub trait CustomizationRuleMatcher: Send + Sync {
    /// Check whether any rule targets exactly `class`.
    fn has_rules_for(&self, class: ClassId) -> bool;

    /// Split a select class so that every class targeted by a rule gets its own source.
    ///
    /// Each entry carries the class whose properties should be shown, when that
    /// differs from the selected class.
    fn split_select_class(&self, schemas: &SchemaSet, select: &SelectClass) -> Vec<(SelectClass, Option<ClassId>)>;

    /// Content modifiers applying to `class` or one of its base classes.
    fn content_modifiers(&self, schemas: &SchemaSet, class: ClassId) -> Vec<&ContentModifier>;

    /// Label override properties for `class`; empty when none apply.
    fn label_properties(&self, schemas: &SchemaSet, class: ClassId) -> Vec<String>;

    /// Groups applied to instances of `class`, outermost first; empty when none apply.
    fn grouping_specifications(&self, schemas: &SchemaSet, class: ClassId) -> Vec<&GroupSpecification>;
}

/// Rule matcher backed by a ruleset's content modifiers and label overrides.
#[derive(Debug, Clone, Default)]
pub struct RulesetMatcher {
    modifiers: Vec<(ClassId, ContentModifier)>,
    label_overrides: Vec<(ClassId, Vec<String>)>,
    groupings: Vec<(ClassId, Vec<GroupSpecification>)>,
}

impl RulesetMatcher {
    /// Resolve the ruleset's rule targets. Rules naming unknown classes are skipped.
    pub fn new(schemas: &SchemaSet, ruleset: &Ruleset) -> Self {
        let mut matcher = Self::default();
        for modifier in &ruleset.content_modifiers {
            match schemas.find_class(&modifier.schema_name, &modifier.class_name) {
                Some(class) => matcher.modifiers.push((class, modifier.clone())),
                None => debug!(
                    schema = %modifier.schema_name,
                    class = %modifier.class_name,
                    "Skipping content modifier for unknown class"
                ),
            }
        }
        for label_override in &ruleset.instance_label_overrides {
            match schemas.find_class_by_full_name(&label_override.class_name) {
                Some(class) => matcher
                    .label_overrides
                    .push((class, label_override.property_names.clone())),
                None => debug!(class = %label_override.class_name, "Skipping label override for unknown class"),
            }
        }
        for rule in &ruleset.grouping_rules {
            match schemas.find_class_by_full_name(&rule.class_name) {
                Some(class) => matcher.groupings.push((class, rule.groups.clone())),
                None => debug!(class = %rule.class_name, "Skipping grouping rule for unknown class"),
            }
        }
        matcher
    }

    fn rule_targets(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.modifiers
            .iter()
            .map(|(class, _)| *class)
            .chain(self.label_overrides.iter().map(|(class, _)| *class))
    }

    /// Check whether a rule targets `class` or any of its subclasses.
    fn has_rules_below(&self, schemas: &SchemaSet, class: ClassId) -> bool {
        self.has_rules_for(class) || self.rule_targets().any(|target| schemas.is(target, class))
    }
}

impl CustomizationRuleMatcher for RulesetMatcher {
    fn has_rules_for(&self, class: ClassId) -> bool {
        self.rule_targets().any(|target| target == class)
    }

    fn split_select_class(&self, schemas: &SchemaSet, select: &SelectClass) -> Vec<(SelectClass, Option<ClassId>)> {
        let targets_derived = self
            .rule_targets()
            .any(|target| target != select.class && schemas.is(target, select.class));
        if !select.polymorphic || !targets_derived {
            return vec![(*select, None)];
        }

        let mut result = vec![(SelectClass::new(select.class, false), None)];
        for &derived in schemas.derived_classes(select.class) {
            if self.has_rules_below(schemas, derived) {
                result.extend(self.split_select_class(schemas, &SelectClass::new(derived, true)));
            } else {
                result.push((SelectClass::new(derived, true), Some(select.class)));
            }
        }
        result
    }

    fn content_modifiers(&self, schemas: &SchemaSet, class: ClassId) -> Vec<&ContentModifier> {
        self.modifiers
            .iter()
            .filter(|(target, _)| schemas.is(class, *target))
            .map(|(_, modifier)| modifier)
            .collect()
    }

    fn label_properties(&self, schemas: &SchemaSet, class: ClassId) -> Vec<String> {
        self.label_overrides
            .iter()
            .find(|(target, _)| schemas.is(class, *target))
            .map(|(_, properties)| properties.clone())
            .unwrap_or_default()
    }

    fn grouping_specifications(&self, schemas: &SchemaSet, class: ClassId) -> Vec<&GroupSpecification> {
        self.groupings
            .iter()
            .find(|(target, _)| schemas.is(class, *target))
            .map(|(_, groups)| groups.iter().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ClassDef, SchemaDef};
    use rulegraph_rules::{GroupingRule, InstanceLabelOverride};

    fn schemas() -> SchemaSet {
        SchemaSet::from_defs(vec![SchemaDef::new("Test", "t")
            .with_class(ClassDef::entity("Element"))
            .with_class(ClassDef::entity("Part").with_base("Element"))
            .with_class(ClassDef::entity("Bolt").with_base("Part"))
            .with_class(ClassDef::entity("Assembly").with_base("Element"))])
        .unwrap()
    }

    #[test]
    fn test_unknown_rule_targets_are_skipped() {
        let schemas = schemas();
        let ruleset = Ruleset::new("r")
            .with_content_modifier(ContentModifier::new("Test", "Missing"))
            .with_label_override(InstanceLabelOverride::new("Test:Missing", ["Code"]));
        let matcher = RulesetMatcher::new(&schemas, &ruleset);
        assert_eq!(matcher.rule_targets().count(), 0);
    }

    #[test]
    fn test_split_without_rules_keeps_select() {
        let schemas = schemas();
        let element = schemas.find_class("Test", "Element").unwrap();
        let matcher = RulesetMatcher::new(&schemas, &Ruleset::new("r"));
        let select = SelectClass::new(element, true);
        assert_eq!(matcher.split_select_class(&schemas, &select), vec![(select, None)]);
    }

    #[test]
    fn test_split_by_derived_rule_target() {
        let schemas = schemas();
        let element = schemas.find_class("Test", "Element").unwrap();
        let part = schemas.find_class("Test", "Part").unwrap();
        let bolt = schemas.find_class("Test", "Bolt").unwrap();
        let assembly = schemas.find_class("Test", "Assembly").unwrap();
        let ruleset = Ruleset::new("r").with_content_modifier(ContentModifier::new("Test", "Bolt"));
        let matcher = RulesetMatcher::new(&schemas, &ruleset);

        assert!(matcher.has_rules_for(bolt));
        assert!(!matcher.has_rules_for(part));

        let split = matcher.split_select_class(&schemas, &SelectClass::new(element, true));
        assert_eq!(
            split,
            vec![
                (SelectClass::new(element, false), None),
                (SelectClass::new(part, false), None),
                (SelectClass::new(bolt, true), None),
                (SelectClass::new(assembly, true), Some(element)),
            ]
        );

        // exact selects are never split
        let exact = SelectClass::new(element, false);
        assert_eq!(matcher.split_select_class(&schemas, &exact), vec![(exact, None)]);
    }

    #[test]
    fn test_modifiers_and_labels_apply_to_subclasses() {
        let schemas = schemas();
        let element = schemas.find_class("Test", "Element").unwrap();
        let bolt = schemas.find_class("Test", "Bolt").unwrap();
        let ruleset = Ruleset::new("r")
            .with_content_modifier(ContentModifier::new("Test", "Part"))
            .with_label_override(InstanceLabelOverride::new("Test:Part", ["Code"]));
        let matcher = RulesetMatcher::new(&schemas, &ruleset);

        assert_eq!(matcher.content_modifiers(&schemas, bolt).len(), 1);
        assert!(matcher.content_modifiers(&schemas, element).is_empty());
        assert_eq!(matcher.label_properties(&schemas, bolt), vec!["Code".to_string()]);
        assert!(matcher.label_properties(&schemas, element).is_empty());
    }

    #[test]
    fn test_grouping_rules_apply_to_subclasses() {
        let schemas = schemas();
        let element = schemas.find_class("Test", "Element").unwrap();
        let bolt = schemas.find_class("Test", "Bolt").unwrap();
        let ruleset = Ruleset::new("r")
            .with_grouping_rule(GroupingRule::new(
                "Test:Part",
                vec![GroupSpecification::ClassGroup { base_class: None }, GroupSpecification::SameLabelInstanceGroup],
            ))
            .with_grouping_rule(GroupingRule::new("Test:Missing", vec![GroupSpecification::RelationshipGroup]));
        let matcher = RulesetMatcher::new(&schemas, &ruleset);

        assert_eq!(
            matcher.grouping_specifications(&schemas, bolt),
            vec![
                &GroupSpecification::ClassGroup { base_class: None },
                &GroupSpecification::SameLabelInstanceGroup,
            ]
        );
        assert!(matcher.grouping_specifications(&schemas, element).is_empty());
        // grouping rules don't split select classes
        assert_eq!(matcher.rule_targets().count(), 0);
    }
}
