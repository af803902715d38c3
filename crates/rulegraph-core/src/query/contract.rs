//! Query contracts: the ordered, named field sets a query selects.
//!
//! Each contract kind is a fixed strategy computing its fields from the
//! inputs given at construction. Fields are computed on first access and
//! never change afterwards.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use rulegraph_rules::{GroupSpecification, PropertyRange};
use tracing::debug;

use super::field::Field;
use crate::catalog::{ClassId, SchemaSet};

/// Default name of the class id field.
pub const CLASS_ID_FIELD_NAME: &str = "ECClassId";
/// Default name of the instance id field.
pub const INSTANCE_ID_FIELD_NAME: &str = "ECInstanceId";
pub const DISPLAY_LABEL_FIELD_NAME: &str = "DisplayLabel";
pub const GROUPED_INSTANCES_COUNT_FIELD_NAME: &str = "GroupedInstancesCount";
pub const PARENT_INSTANCE_NODE_ID_FIELD_NAME: &str = "ParentInstanceNodeId";

/// Label rendered for merged values that differ.
pub const VARIES_LABEL: &str = "Varies";

static NEXT_CONTRACT_ID: AtomicU64 = AtomicU64::new(1);

/// State shared by every contract kind.
#[derive(Debug, Clone)]
pub struct ContractBase {
    id: u64,
    class_id_field_name: String,
    instance_id_field_name: String,
}

impl ContractBase {
    fn new() -> Self {
        Self {
            id: NEXT_CONTRACT_ID.fetch_add(1, Ordering::Relaxed),
            class_id_field_name: CLASS_ID_FIELD_NAME.to_string(),
            instance_id_field_name: INSTANCE_ID_FIELD_NAME.to_string(),
        }
    }

    /// Process-unique contract id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn class_id_field_name(&self) -> &str {
        &self.class_id_field_name
    }

    pub fn instance_id_field_name(&self) -> &str {
        &self.instance_id_field_name
    }

    fn class_id_field(&self) -> Arc<Field> {
        Field::simple(self.class_id_field_name.as_str(), "ECClassId").into_shared()
    }

    fn instance_id_field(&self) -> Arc<Field> {
        Field::simple(self.instance_id_field_name.as_str(), "ECInstanceId").into_shared()
    }
}

fn count_field() -> Arc<Field> {
    Field::simple(GROUPED_INSTANCES_COUNT_FIELD_NAME, "COUNT(1)")
        .without_prefix()
        .aggregate()
        .into_shared()
}

fn quoted(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Display label of an instance, honouring label override properties.
fn instance_label_field(label_properties: &[String]) -> Arc<Field> {
    let default_label = Field::function(
        DISPLAY_LABEL_FIELD_NAME,
        "GetInstanceLabel",
        vec![
            Field::simple("ClassId", "ECClassId").into_shared(),
            Field::simple("InstanceId", "ECInstanceId").into_shared(),
        ],
    );
    if label_properties.is_empty() {
        return default_label.into_shared();
    }
    let mut params: Vec<Arc<Field>> = label_properties
        .iter()
        .map(|property| {
            Field::function(
                property.as_str(),
                "NULLIF",
                vec![
                    Field::simple(property.as_str(), format!("[{}]", property)).into_shared(),
                    Field::constant("Empty", "''").into_shared(),
                ],
            )
            .into_shared()
        })
        .collect();
    params.push(default_label.into_shared());
    Field::function(DISPLAY_LABEL_FIELD_NAME, "COALESCE", params).into_shared()
}

/// Fields of instance node rows.
#[derive(Debug, Clone)]
pub struct InstanceNodesContract {
    base: ContractBase,
    label_properties: Vec<String>,
    parent_alias: Option<String>,
    fields: OnceLock<Vec<Arc<Field>>>,
}

impl InstanceNodesContract {
    /// Create a contract labelling instances by the given properties, if any.
    pub fn new(label_properties: Vec<String>) -> Self {
        Self {
            base: ContractBase::new(),
            label_properties,
            parent_alias: None,
            fields: OnceLock::new(),
        }
    }

    /// Take the parent node id from the instance selected under `alias`.
    pub fn with_parent_alias(mut self, alias: impl Into<String>) -> Self {
        self.parent_alias = Some(alias.into());
        self.fields = OnceLock::new();
        self
    }

    fn compute(&self) -> Vec<Arc<Field>> {
        let parent = match &self.parent_alias {
            Some(alias) => Field::simple(PARENT_INSTANCE_NODE_ID_FIELD_NAME, "ECInstanceId").with_prefix_override(alias.as_str()),
            None => Field::constant(PARENT_INSTANCE_NODE_ID_FIELD_NAME, "NULL"),
        };
        vec![
            self.base.instance_id_field(),
            self.base.class_id_field(),
            instance_label_field(&self.label_properties),
            parent.into_shared(),
        ]
    }
}

/// Fields of class grouping nodes.
#[derive(Debug, Clone)]
pub struct ClassGroupingContract {
    base: ContractBase,
    fields: OnceLock<Vec<Arc<Field>>>,
}

impl ClassGroupingContract {
    pub fn new() -> Self {
        Self {
            base: ContractBase::new(),
            fields: OnceLock::new(),
        }
    }

    fn compute(&self) -> Vec<Arc<Field>> {
        let class_id = self.base.class_id_field();
        vec![
            Arc::clone(&class_id),
            Field::function(DISPLAY_LABEL_FIELD_NAME, "GetClassLabel", vec![class_id]).into_shared(),
            count_field(),
        ]
    }
}

impl Default for ClassGroupingContract {
    fn default() -> Self {
        Self::new()
    }
}

/// Fields of relationship grouping nodes.
#[derive(Debug, Clone)]
pub struct RelationshipGroupingContract {
    base: ContractBase,
    relationship: ClassId,
    label: String,
    fields: OnceLock<Vec<Arc<Field>>>,
}

impl RelationshipGroupingContract {
    pub fn new(relationship: ClassId, label: impl Into<String>) -> Self {
        Self {
            base: ContractBase::new(),
            relationship,
            label: label.into(),
            fields: OnceLock::new(),
        }
    }

    fn compute(&self) -> Vec<Arc<Field>> {
        vec![
            Field::constant("RelationshipClassId", self.relationship.to_string()).into_shared(),
            Field::constant(DISPLAY_LABEL_FIELD_NAME, quoted(&self.label)).into_shared(),
            count_field(),
        ]
    }
}

/// Fields of same-label grouping nodes.
#[derive(Debug, Clone)]
pub struct DisplayLabelGroupingContract {
    base: ContractBase,
    label_properties: Vec<String>,
    fields: OnceLock<Vec<Arc<Field>>>,
}

impl DisplayLabelGroupingContract {
    pub fn new(label_properties: Vec<String>) -> Self {
        Self {
            base: ContractBase::new(),
            label_properties,
            fields: OnceLock::new(),
        }
    }

    fn compute(&self) -> Vec<Arc<Field>> {
        let instance_id = Field::simple("InstanceId", "ECInstanceId").into_shared();
        vec![
            instance_label_field(&self.label_properties),
            Field::function("GroupedInstanceIds", "GROUP_CONCAT", vec![instance_id])
                .aggregate()
                .into_shared(),
            count_field(),
        ]
    }
}

/// Fields of base class grouping nodes.
#[derive(Debug, Clone)]
pub struct BaseClassGroupingContract {
    base: ContractBase,
    base_class: ClassId,
    label: String,
    fields: OnceLock<Vec<Arc<Field>>>,
}

impl BaseClassGroupingContract {
    pub fn new(base_class: ClassId, label: impl Into<String>) -> Self {
        Self {
            base: ContractBase::new(),
            base_class,
            label: label.into(),
            fields: OnceLock::new(),
        }
    }

    fn compute(&self) -> Vec<Arc<Field>> {
        vec![
            Field::constant("BaseClassId", self.base_class.to_string()).into_shared(),
            Field::constant(DISPLAY_LABEL_FIELD_NAME, quoted(&self.label)).into_shared(),
            count_field(),
        ]
    }
}

/// Fields of property grouping nodes.
#[derive(Debug, Clone)]
pub struct PropertyGroupingContract {
    base: ContractBase,
    property_name: String,
    ranges: Vec<PropertyRange>,
    fields: OnceLock<Vec<Arc<Field>>>,
}

impl PropertyGroupingContract {
    pub fn new(property_name: impl Into<String>, ranges: Vec<PropertyRange>) -> Self {
        Self {
            base: ContractBase::new(),
            property_name: property_name.into(),
            ranges,
            fields: OnceLock::new(),
        }
    }

    fn compute(&self) -> Vec<Arc<Field>> {
        let column = format!("[{}]", self.property_name);
        if self.ranges.is_empty() {
            let value = Field::simple("PropertyValue", column.as_str()).into_shared();
            return vec![
                Arc::clone(&value),
                Field::function(
                    DISPLAY_LABEL_FIELD_NAME,
                    "GetPropertyDisplayValue",
                    vec![
                        Field::constant("PropertyName", quoted(&self.property_name)).into_shared(),
                        value,
                    ],
                )
                .into_shared(),
                count_field(),
            ];
        }

        let ranges = self.ranges.clone();
        let range_column = column.clone();
        let grouping_value = Field::dynamic("GroupingValue", move |prefix| {
            let column = prefixed(prefix, &range_column);
            let mut clause = String::from("CASE");
            for (i, range) in ranges.iter().enumerate() {
                clause.push_str(&format!(
                    " WHEN {} BETWEEN {} AND {} THEN {}",
                    column,
                    range_bound(&range.from),
                    range_bound(&range.to),
                    i
                ));
            }
            clause.push_str(" ELSE -1 END");
            clause
        });
        let ranges = self.ranges.clone();
        let label = Field::dynamic(DISPLAY_LABEL_FIELD_NAME, move |prefix| {
            let column = prefixed(prefix, &column);
            let mut clause = String::from("CASE");
            for range in &ranges {
                let label = range
                    .label
                    .clone()
                    .unwrap_or_else(|| format!("{} - {}", range.from, range.to));
                clause.push_str(&format!(
                    " WHEN {} BETWEEN {} AND {} THEN {}",
                    column,
                    range_bound(&range.from),
                    range_bound(&range.to),
                    quoted(&label)
                ));
            }
            clause.push_str(" ELSE 'Other' END");
            clause
        });
        vec![grouping_value.into_shared(), label.into_shared(), count_field()]
    }
}

/// Numeric bounds are inlined; anything else becomes a string literal.
fn range_bound(bound: &str) -> String {
    let trimmed = bound.trim();
    if trimmed.parse::<f64>().is_ok_and(f64::is_finite) {
        trimmed.to_string()
    } else {
        quoted(bound)
    }
}

fn prefixed(prefix: Option<&str>, column: &str) -> String {
    match prefix {
        Some(prefix) => format!("[{}].{}", prefix, column),
        None => column.to_string(),
    }
}

/// One property column of a content row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentField {
    /// Unique field name within the row.
    pub name: String,
    /// Property selected.
    pub property: String,
    /// Alias of the class occurrence the property is read from.
    pub alias: String,
}

/// Fields of content rows.
#[derive(Debug, Clone)]
pub struct ContentRowContract {
    base: ContractBase,
    select_alias: String,
    properties: Vec<ContentField>,
    merging: bool,
    fields: OnceLock<Vec<Arc<Field>>>,
}

impl ContentRowContract {
    /// Create a contract selecting the given property columns.
    pub fn new(select_alias: impl Into<String>, properties: Vec<ContentField>) -> Self {
        Self {
            base: ContractBase::new(),
            select_alias: select_alias.into(),
            properties,
            merging: false,
            fields: OnceLock::new(),
        }
    }

    /// Merge all rows into one, rendering divergent values as [`VARIES_LABEL`].
    pub fn merged(mut self) -> Self {
        self.merging = true;
        self.fields = OnceLock::new();
        self
    }

    pub fn properties(&self) -> &[ContentField] {
        &self.properties
    }

    pub fn is_merging(&self) -> bool {
        self.merging
    }

    fn compute(&self) -> Vec<Arc<Field>> {
        let mut fields = Vec::with_capacity(self.properties.len() + 2);
        if self.merging {
            for (name, clause) in [
                (self.base.class_id_field_name.as_str(), "ECClassId"),
                (self.base.instance_id_field_name.as_str(), "ECInstanceId"),
            ] {
                let column = Field::simple(name, clause)
                    .with_prefix_override(self.select_alias.as_str())
                    .into_shared();
                fields.push(Field::function(name, "MAX", vec![column]).aggregate().into_shared());
            }
        } else {
            fields.push(
                Field::simple(self.base.class_id_field_name.as_str(), "ECClassId")
                    .with_prefix_override(self.select_alias.as_str())
                    .into_shared(),
            );
            fields.push(
                Field::simple(self.base.instance_id_field_name.as_str(), "ECInstanceId")
                    .with_prefix_override(self.select_alias.as_str())
                    .into_shared(),
            );
        }
        for property in &self.properties {
            let column = Field::simple(property.name.as_str(), format!("[{}]", property.property))
                .with_prefix_override(property.alias.as_str())
                .into_shared();
            if self.merging {
                fields.push(Field::merge(column, VARIES_LABEL).into_shared());
            } else {
                fields.push(column);
            }
        }
        fields
    }
}

/// A caller-supplied field list.
#[derive(Debug, Clone)]
pub struct SimpleContract {
    base: ContractBase,
    fields: Vec<Arc<Field>>,
}

impl SimpleContract {
    pub fn new(fields: Vec<Arc<Field>>) -> Self {
        Self {
            base: ContractBase::new(),
            fields,
        }
    }
}

/// Selects the row count only.
#[derive(Debug, Clone)]
pub struct CountContract {
    base: ContractBase,
    fields: OnceLock<Vec<Arc<Field>>>,
}

impl CountContract {
    pub fn new() -> Self {
        Self {
            base: ContractBase::new(),
            fields: OnceLock::new(),
        }
    }
}

impl Default for CountContract {
    fn default() -> Self {
        Self::new()
    }
}

/// A contract of any node kind.
#[derive(Debug, Clone)]
pub enum Contract {
    InstanceNodes(InstanceNodesContract),
    ClassGrouping(ClassGroupingContract),
    RelationshipGrouping(RelationshipGroupingContract),
    DisplayLabelGrouping(DisplayLabelGroupingContract),
    BaseClassGrouping(BaseClassGroupingContract),
    PropertyGrouping(PropertyGroupingContract),
    ContentRow(ContentRowContract),
    Simple(SimpleContract),
    Count(CountContract),
}

impl Contract {
    /// Contract of the grouping nodes a group specification produces.
    ///
    /// `via_relationship` is the relationship the grouped instances were
    /// reached through; relationship groups need one and yield `None` without.
    pub fn for_group(
        schemas: &SchemaSet,
        spec: &GroupSpecification,
        label_properties: &[String],
        via_relationship: Option<ClassId>,
    ) -> Option<Contract> {
        let contract = match spec {
            GroupSpecification::ClassGroup { base_class: None } => Contract::ClassGrouping(ClassGroupingContract::new()),
            GroupSpecification::ClassGroup {
                base_class: Some(base_class),
            } => match schemas.find_class_by_full_name(base_class) {
                Some(id) => {
                    let label = schemas.class(id).name.clone();
                    Contract::BaseClassGrouping(BaseClassGroupingContract::new(id, label))
                }
                None => {
                    debug!(base_class = %base_class, "Unknown grouping base class, grouping by class");
                    Contract::ClassGrouping(ClassGroupingContract::new())
                }
            },
            GroupSpecification::PropertyGroup { property_name, ranges } => {
                Contract::PropertyGrouping(PropertyGroupingContract::new(property_name.as_str(), ranges.clone()))
            }
            GroupSpecification::SameLabelInstanceGroup => {
                Contract::DisplayLabelGrouping(DisplayLabelGroupingContract::new(label_properties.to_vec()))
            }
            GroupSpecification::RelationshipGroup => {
                let Some(relationship) = via_relationship else {
                    debug!("Relationship group without a relationship, skipping");
                    return None;
                };
                let label = schemas.class(relationship).name.clone();
                Contract::RelationshipGrouping(RelationshipGroupingContract::new(relationship, label))
            }
        };
        Some(contract)
    }

    /// Short name of the node kind.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Contract::InstanceNodes(_) => "InstanceNodes",
            Contract::ClassGrouping(_) => "ClassGrouping",
            Contract::RelationshipGrouping(_) => "RelationshipGrouping",
            Contract::DisplayLabelGrouping(_) => "DisplayLabelGrouping",
            Contract::BaseClassGrouping(_) => "BaseClassGrouping",
            Contract::PropertyGrouping(_) => "PropertyGrouping",
            Contract::ContentRow(_) => "ContentRow",
            Contract::Simple(_) => "Simple",
            Contract::Count(_) => "Count",
        }
    }

    pub fn base(&self) -> &ContractBase {
        match self {
            Contract::InstanceNodes(c) => &c.base,
            Contract::ClassGrouping(c) => &c.base,
            Contract::RelationshipGrouping(c) => &c.base,
            Contract::DisplayLabelGrouping(c) => &c.base,
            Contract::BaseClassGrouping(c) => &c.base,
            Contract::PropertyGrouping(c) => &c.base,
            Contract::ContentRow(c) => &c.base,
            Contract::Simple(c) => &c.base,
            Contract::Count(c) => &c.base,
        }
    }

    pub fn id(&self) -> u64 {
        self.base().id()
    }

    /// Rename the class and instance id fields so outer queries can reference them.
    pub fn with_id_field_names(mut self, class_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        let class_id = class_id.into();
        let instance_id = instance_id.into();
        let (base, fields) = match &mut self {
            Contract::InstanceNodes(c) => (&mut c.base, Some(&mut c.fields)),
            Contract::ClassGrouping(c) => (&mut c.base, Some(&mut c.fields)),
            Contract::RelationshipGrouping(c) => (&mut c.base, Some(&mut c.fields)),
            Contract::DisplayLabelGrouping(c) => (&mut c.base, Some(&mut c.fields)),
            Contract::BaseClassGrouping(c) => (&mut c.base, Some(&mut c.fields)),
            Contract::PropertyGrouping(c) => (&mut c.base, Some(&mut c.fields)),
            Contract::ContentRow(c) => (&mut c.base, Some(&mut c.fields)),
            Contract::Simple(c) => (&mut c.base, None),
            Contract::Count(c) => (&mut c.base, Some(&mut c.fields)),
        };
        base.class_id_field_name = class_id;
        base.instance_id_field_name = instance_id;
        if let Some(fields) = fields {
            *fields = OnceLock::new();
        }
        self
    }

    /// Ordered fields.
    pub fn fields(&self) -> &[Arc<Field>] {
        match self {
            Contract::InstanceNodes(c) => c.fields.get_or_init(|| c.compute()),
            Contract::ClassGrouping(c) => c.fields.get_or_init(|| c.compute()),
            Contract::RelationshipGrouping(c) => c.fields.get_or_init(|| c.compute()),
            Contract::DisplayLabelGrouping(c) => c.fields.get_or_init(|| c.compute()),
            Contract::BaseClassGrouping(c) => c.fields.get_or_init(|| c.compute()),
            Contract::PropertyGrouping(c) => c.fields.get_or_init(|| c.compute()),
            Contract::ContentRow(c) => c.fields.get_or_init(|| c.compute()),
            Contract::Simple(c) => &c.fields,
            Contract::Count(c) => c.fields.get_or_init(|| {
                vec![Field::simple("Count", "COUNT(1)").without_prefix().aggregate().into_shared()]
            }),
        }
    }

    /// Field by name.
    pub fn field(&self, name: &str) -> Option<Arc<Field>> {
        self.fields().iter().find(|f| f.name() == name).cloned()
    }

    /// Position of a field by name.
    pub fn index(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|f| f.name() == name)
    }

    /// Check if any field is an aggregate.
    pub fn is_aggregating(&self) -> bool {
        self.fields().iter().any(|f| f.is_aggregate())
    }

    /// Check if any field is selected by an inner query.
    pub fn has_inner_fields(&self) -> bool {
        self.fields().iter().any(|f| f.visibility().includes_inner())
    }

    /// Grouping clauses of the non-aggregate fields; empty unless aggregating.
    pub fn grouping_aliases(&self) -> Vec<String> {
        if !self.is_aggregating() {
            return Vec::new();
        }
        self.fields()
            .iter()
            .filter(|f| !f.is_aggregate())
            .map(|f| f.group_clause().to_string())
            .collect()
    }
}
