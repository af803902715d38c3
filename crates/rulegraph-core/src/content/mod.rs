//! Content compilation.
//!
//! Turns content specifications into [`CompiledContent`]: the selected
//! classes, the paths joining them to the input, related property paths and
//! the properties to display. [`build_content_query`] assembles the final
//! query tree; [`build_instance_nodes_query`] and [`build_grouping_queries`]
//! select the labelled instance nodes and the grouping nodes of the same content.

mod appender;
mod builder;
mod matcher;
mod source;

pub use crate::config::ContentConfig;
pub use appender::{AppendedProperty, AppenderFactory, AppenderScope, DefaultPropertyAppender, PropertyAppender};
pub use builder::{
    build_content_query, build_grouping_queries, build_instance_nodes_query, CompiledContent,
    CompiledSource, ContentBuilder,
};
pub use matcher::{CustomizationRuleMatcher, RulesetMatcher};
pub use source::ContentSource;
