use std::sync::Arc;

use serde_json::Value;

use super::condition::Condition;
use super::helpers::quote_ident;
use super::selector::{ColumnPath, Selector};
use crate::error::Result;

/// MySQL has no OFFSET without LIMIT; this is its documented "no limit".
const UNBOUNDED_LIMIT: u64 = u64::MAX;

pub trait SelectExt: Sized {
    fn select(&self, cols: impl IntoIterator<Item = Selector>) -> Self;
    fn filter(&self, conditions: impl IntoIterator<Item = Condition>) -> Self;
    fn group_by(&self, cols: impl IntoIterator<Item = ColumnPath>) -> Self;
    fn order_by(&self, col: ColumnPath, asc: bool) -> Self;
    fn limit(&self, count: u64) -> Self;
    fn offset(&self, count: u64) -> Self;
    fn source(&self) -> &Source;
}

/// What a SELECT reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    /// A physical table under an alias.
    Table {
        schema: Option<Arc<str>>,
        name: Arc<str>,
        alias: Arc<str>,
    },
    /// A named sub-relation (CTE) defined earlier in the same statement.
    Relation { name: Arc<str> },
}

impl Source {
    pub fn table(schema: Option<&str>, name: &str, alias: &str) -> Self {
        Source::Table {
            schema: schema.map(Arc::from),
            name: Arc::from(name),
            alias: Arc::from(alias),
        }
    }

    pub fn relation(name: &str) -> Self {
        Source::Relation {
            name: Arc::from(name),
        }
    }

    /// Name columns of this source are qualified with.
    pub fn alias(&self) -> &str {
        match self {
            Source::Table { alias, .. } => alias,
            Source::Relation { name } => name,
        }
    }

    fn to_sql(&self) -> Result<String> {
        match self {
            Source::Table { schema, name, alias } => {
                let table = match schema {
                    Some(s) => format!("{}.{}", quote_ident(s)?, quote_ident(name)?),
                    None => quote_ident(name)?,
                };
                Ok(format!("{table} AS {}", quote_ident(alias)?))
            }
            Source::Relation { name } => quote_ident(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    LeftOuter,
}

impl JoinKind {
    fn keyword(&self) -> &'static str {
        match self {
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: Source,
    pub on: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub column: ColumnPath,
    pub ascending: bool,
}

/// A copy-on-write SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    source: Source,
    select: Arc<Vec<Arc<Selector>>>,
    joins: Arc<Vec<Join>>,
    filters: Arc<Vec<Condition>>,
    group_by: Arc<Vec<ColumnPath>>,
    order_by: Arc<Vec<OrderTerm>>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    /// Creates an empty select over `source`.
    pub fn new(source: Source) -> Self {
        Select {
            source,
            select: Default::default(),
            joins: Default::default(),
            filters: Default::default(),
            group_by: Default::default(),
            order_by: Default::default(),
            limit: None,
            offset: None,
        }
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Append an already validated join.
    pub fn with_join(&self, join: Join) -> Self {
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.joins).push(join);
        rv
    }

    /// Render to SQL, pushing bound values onto `binds` in textual order.
    pub fn to_sql(&self, binds: &mut Vec<Value>) -> Result<String> {
        let select = if self.select.is_empty() {
            "*".to_string()
        } else {
            self.select
                .iter()
                .map(|c| c.to_sql())
                .collect::<Result<Vec<_>>>()?
                .join(", ")
        };

        let mut sql = format!("SELECT {select} FROM {}", self.source.to_sql()?);

        for j in self.joins.iter() {
            let on = j
                .on
                .iter()
                .map(|clause| clause.to_sql(binds))
                .collect::<Result<Vec<_>>>()?
                .join(" AND ");
            sql.push_str(&format!(" {} {} ON {on}", j.kind.keyword(), j.table.to_sql()?));
        }

        if !self.filters.is_empty() {
            let clauses = self
                .filters
                .iter()
                .map(|c| c.to_sql(binds))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.group_by.is_empty() {
            let cols = self
                .group_by
                .iter()
                .map(|c| c.to_sql())
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols.join(", "));
        }

        if !self.order_by.is_empty() {
            let terms = self
                .order_by
                .iter()
                .map(|t| {
                    t.column
                        .to_sql()
                        .map(|c| format!("{c} {}", if t.ascending { "ASC" } else { "DESC" }))
                })
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" ORDER BY ");
            sql.push_str(&terms.join(", "));
        }

        match (self.limit, self.offset) {
            (Some(l), o) => {
                sql.push_str(" LIMIT ?");
                binds.push(Value::from(l));
                if let Some(o) = o {
                    sql.push_str(" OFFSET ?");
                    binds.push(Value::from(o));
                }
            }
            (None, Some(o)) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                binds.push(Value::from(UNBOUNDED_LIMIT));
                binds.push(Value::from(o));
            }
            (None, None) => {}
        }

        Ok(sql)
    }
}

impl SelectExt for Select {
    fn source(&self) -> &Source {
        &self.source
    }

    fn select(&self, cols: impl IntoIterator<Item = Selector>) -> Self {
        let mut rv = self.clone();
        rv.select = Arc::new(cols.into_iter().map(Arc::new).collect());
        rv
    }

    /// Appends conditions; all conditions are combined with AND.
    fn filter(&self, conditions: impl IntoIterator<Item = Condition>) -> Self {
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.filters).extend(conditions);
        rv
    }

    fn group_by(&self, cols: impl IntoIterator<Item = ColumnPath>) -> Self {
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.group_by).extend(cols);
        rv
    }

    /// Appends an ordering term after any existing ones.
    fn order_by(&self, col: ColumnPath, asc: bool) -> Self {
        let mut rv = self.clone();
        Arc::make_mut(&mut rv.order_by).push(OrderTerm {
            column: col,
            ascending: asc,
        });
        rv
    }

    /// Limits the query to `count` rows.
    fn limit(&self, count: u64) -> Self {
        let mut rv = self.clone();
        rv.limit = Some(count);
        rv
    }

    /// Offsets the query by `count` rows.
    fn offset(&self, count: u64) -> Self {
        let mut rv = self.clone();
        rv.offset = Some(count);
        rv
    }
}

impl std::fmt::Display for Select {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut binds = Vec::new();
        match self.to_sql(&mut binds) {
            Ok(sql) => write!(f, "{sql}"),
            Err(e) => write!(f, "<error: {e}>"),
        }
    }
}
