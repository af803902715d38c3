//! Query building blocks: relationship paths, caches, fields, contracts and the query tree.

pub mod cache;
mod contract;
mod field;
mod path;
mod tree;

pub use cache::{
    CacheStats, KeyedCache, PathCache, PathCacheKey, PathCacheResult, PolymorphicRelationCache,
    PolymorphicRelationKey,
};
pub use contract::{
    BaseClassGroupingContract, ClassGroupingContract, ContentField, ContentRowContract, Contract,
    ContractBase, CountContract, DisplayLabelGroupingContract, InstanceNodesContract,
    PropertyGroupingContract, RelationshipGroupingContract, SimpleContract, CLASS_ID_FIELD_NAME,
    DISPLAY_LABEL_FIELD_NAME, GROUPED_INSTANCES_COUNT_FIELD_NAME, INSTANCE_ID_FIELD_NAME,
    PARENT_INSTANCE_NODE_ID_FIELD_NAME, VARIES_LABEL,
};
pub use field::{DynamicClause, Field, FieldKind, FieldVisibility};
pub use path::{
    class_alias, RelatedClassPath, RelatedClassStep, RelationUseCounter, RelationshipDirection,
    SelectClass, StepKey, SupportedClassFlags, RELATED_ALIAS, SELECT_ALIAS,
};
pub use tree::{ComplexQuery, FromClause, Join, Query};
