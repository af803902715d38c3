//! Composable query tree.
//!
//! The tree is handed to a downstream emitter. [`Query::to_query_string`]
//! renders a deterministic ECSQL-like text for inspection and tests.

use std::sync::Arc;

use super::contract::Contract;
use super::path::{RelatedClassPath, RelatedClassStep};
use crate::catalog::{ClassId, SchemaSet};

/// Source of a complex query's rows.
#[derive(Debug, Clone)]
pub enum FromClause {
    /// Rows of a class, optionally including subclasses.
    Class {
        class: ClassId,
        polymorphic: bool,
        alias: String,
    },
    /// Rows of a nested query.
    Query { query: Box<Query>, alias: String },
}

/// A relationship path joined into a query.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub path: RelatedClassPath,
    /// Left-join every hop instead of inner joining.
    pub outer: bool,
}

/// A select over one source with joins, filters, grouping and ordering.
#[derive(Debug, Clone)]
pub struct ComplexQuery {
    contract: Arc<Contract>,
    from: Option<FromClause>,
    joins: Vec<Join>,
    where_clauses: Vec<String>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u64>,
}

impl ComplexQuery {
    /// Create a query selecting `contract`'s fields.
    ///
    /// Aggregating contracts group by their non-aggregate fields.
    pub fn new(contract: Arc<Contract>) -> Self {
        let group_by = contract.grouping_aliases();
        Self {
            contract,
            from: None,
            joins: Vec::new(),
            where_clauses: Vec::new(),
            group_by,
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Select from a class.
    pub fn from_class(mut self, class: ClassId, polymorphic: bool, alias: impl Into<String>) -> Self {
        self.from = Some(FromClause::Class {
            class,
            polymorphic,
            alias: alias.into(),
        });
        self
    }

    /// Select from a nested query.
    pub fn from_query(mut self, query: Query, alias: impl Into<String>) -> Self {
        self.from = Some(FromClause::Query {
            query: Box::new(query),
            alias: alias.into(),
        });
        self
    }

    /// Join a relationship path. Empty paths are ignored.
    pub fn join(mut self, path: RelatedClassPath, outer: bool) -> Self {
        if !path.is_empty() && !self.joins.iter().any(|j| j.path == path) {
            self.joins.push(Join { path, outer });
        }
        self
    }

    /// Add a `WHERE` condition; conditions are `AND`ed.
    pub fn where_clause(mut self, clause: impl Into<String>) -> Self {
        let clause = clause.into();
        if !clause.trim().is_empty() {
            self.where_clauses.push(clause);
        }
        self
    }

    pub fn group_by(mut self, clause: impl Into<String>) -> Self {
        self.group_by.push(clause.into());
        self
    }

    pub fn order_by(mut self, clause: impl Into<String>) -> Self {
        self.order_by.push(clause.into());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn contract(&self) -> &Arc<Contract> {
        &self.contract
    }

    pub fn source(&self) -> Option<&FromClause> {
        self.from.as_ref()
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn where_clauses(&self) -> &[String] {
        &self.where_clauses
    }

    fn render(&self, schemas: &SchemaSet) -> String {
        let (prefix, use_field_names) = match &self.from {
            Some(FromClause::Class { alias, .. }) => (Some(alias.as_str()), false),
            Some(FromClause::Query { .. }) | None => (None, true),
        };
        let fields: Vec<String> = self
            .contract
            .fields()
            .iter()
            .map(|f| {
                // aggregates are computed at this level, not read from the nested rows
                let by_name = use_field_names && !f.is_aggregate();
                format!("{} AS [{}]", f.select_clause(prefix, by_name), f.name())
            })
            .collect();

        let mut out = format!("SELECT {}", fields.join(", "));
        match &self.from {
            Some(FromClause::Class {
                class,
                polymorphic,
                alias,
            }) => {
                out.push_str(&format!(
                    " FROM {}{} [{}]",
                    only(*polymorphic),
                    class_ref(schemas, *class),
                    alias
                ));
            }
            Some(FromClause::Query { query, alias }) => {
                out.push_str(&format!(" FROM ({}) [{}]", query.to_query_string(schemas), alias));
            }
            None => {}
        }
        for join in &self.joins {
            for step in join.path.steps() {
                render_step(&mut out, schemas, step, join.outer);
            }
        }
        if !self.where_clauses.is_empty() {
            let clauses: Vec<String> = self.where_clauses.iter().map(|c| format!("({})", c)).collect();
            out.push_str(&format!(" WHERE {}", clauses.join(" AND ")));
        }
        if !self.group_by.is_empty() {
            out.push_str(&format!(" GROUP BY {}", self.group_by.join(", ")));
        }
        if !self.order_by.is_empty() {
            out.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
        }
        if let Some(limit) = self.limit {
            out.push_str(&format!(" LIMIT {}", limit));
        }
        out
    }
}

fn only(polymorphic: bool) -> &'static str {
    if polymorphic {
        ""
    } else {
        "ONLY "
    }
}

fn class_ref(schemas: &SchemaSet, class: ClassId) -> String {
    let class = schemas.class(class);
    format!("[{}].[{}]", schemas.schema(class.schema).name, class.name)
}

/// Render the two joins of one hop: the relationship row, then the target row.
fn render_step(out: &mut String, schemas: &SchemaSet, step: &RelatedClassStep, outer: bool) {
    let join = if outer || step.is_target_optional {
        "LEFT JOIN"
    } else {
        "INNER JOIN"
    };
    let (near_end, far_end) = if step.is_forward {
        ("SourceECInstanceId", "TargetECInstanceId")
    } else {
        ("TargetECInstanceId", "SourceECInstanceId")
    };
    out.push_str(&format!(
        " {join} {} [{}] ON [{}].{near_end} = [{}].ECInstanceId",
        class_ref(schemas, step.relationship),
        step.relationship_alias,
        step.relationship_alias,
        step.source_alias,
    ));
    out.push_str(&format!(
        " {join} {}{} [{}] ON [{}].ECInstanceId = [{}].{far_end}",
        only(step.is_target_polymorphic),
        class_ref(schemas, step.target),
        step.target_alias,
        step.target_alias,
        step.relationship_alias,
    ));
}

/// A query tree node.
#[derive(Debug, Clone)]
pub enum Query {
    Complex(ComplexQuery),
    Union(Vec<Query>),
    /// Rows of the first query that are not in the second.
    Except(Box<Query>, Box<Query>),
}

impl Query {
    /// Union of `queries`; a single query is returned as is.
    pub fn union(mut queries: Vec<Query>) -> Option<Query> {
        match queries.len() {
            0 => None,
            1 => queries.pop(),
            _ => Some(Query::Union(queries)),
        }
    }

    pub fn except(base: Query, subtracted: Query) -> Query {
        Query::Except(Box::new(base), Box::new(subtracted))
    }

    /// Contract of the rows the query returns.
    pub fn contract(&self) -> Option<&Arc<Contract>> {
        match self {
            Query::Complex(query) => Some(query.contract()),
            Query::Union(queries) => queries.first().and_then(Query::contract),
            Query::Except(base, _) => base.contract(),
        }
    }

    /// Render as ECSQL-like text.
    pub fn to_query_string(&self, schemas: &SchemaSet) -> String {
        match self {
            Query::Complex(query) => query.render(schemas),
            Query::Union(queries) => queries
                .iter()
                .map(|q| q.render_operand(schemas))
                .collect::<Vec<_>>()
                .join(" UNION ALL "),
            Query::Except(base, subtracted) => format!(
                "{} EXCEPT {}",
                base.render_operand(schemas),
                subtracted.render_operand(schemas)
            ),
        }
    }

    // Compound operands are parenthesized; UNION ALL and EXCEPT bind equally.
    fn render_operand(&self, schemas: &SchemaSet) -> String {
        match self {
            Query::Complex(query) => query.render(schemas),
            Query::Union(_) | Query::Except(..) => format!("({})", self.to_query_string(schemas)),
        }
    }
}

impl From<ComplexQuery> for Query {
    fn from(query: ComplexQuery) -> Self {
        Query::Complex(query)
    }
}
