use std::sync::Arc;

use serde_json::Value;

use super::selector::ColumnPath;
use crate::error::{RelqError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnPath),
    Null,
    /// Rendered as a `?` placeholder and bound at execution.
    Param(Value),
}

/// `left <op> right`, used both for join ON clauses and WHERE filters.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    left: ColumnPath,
    operator: Arc<str>, // normalized (UPPERCASE, single spaces)
    right: Operand,
}

impl Condition {
    pub fn new(left: ColumnPath, operator: &str, right: Operand) -> Result<Self> {
        let op = normalize_op(operator)?;
        validate_operand(&op, &right)?;
        Ok(Self {
            left,
            operator: Arc::from(op.as_str()),
            right,
        })
    }

    /// `left = right` between two columns.
    pub fn columns_eq(left: ColumnPath, right: ColumnPath) -> Self {
        Self {
            left,
            operator: Arc::from("="),
            right: Operand::Column(right),
        }
    }

    /// Compare a column against a bound value. A JSON `null` turns into
    /// `IS NULL` / `IS NOT NULL` for `=` and `!=`/`<>`.
    pub fn compare(left: ColumnPath, operator: &str, value: Value) -> Result<Self> {
        let op = normalize_op(operator)?;
        if value.is_null() {
            let op = match op.as_str() {
                "=" | "IS" => "IS",
                "!=" | "<>" | "IS NOT" => "IS NOT",
                other => {
                    return Err(RelqError::InvalidCondition(format!(
                        "operator `{other}` not valid with NULL"
                    )))
                }
            };
            return Self::new(left, op, Operand::Null);
        }
        Self::new(left, &op, Operand::Param(value))
    }

    pub fn left(&self) -> &ColumnPath {
        &self.left
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn right(&self) -> &Operand {
        &self.right
    }

    /// Same condition with its column(s) read from `source`.
    pub fn requalify(&self, source: &str) -> Self {
        let right = match &self.right {
            Operand::Column(c) => Operand::Column(ColumnPath::qualified(source, c.column())),
            other => other.clone(),
        };
        Self {
            left: ColumnPath::qualified(source, self.left.column()),
            operator: Arc::clone(&self.operator),
            right,
        }
    }

    /// Render to SQL, pushing bound values onto `binds`.
    pub fn to_sql(&self, binds: &mut Vec<Value>) -> Result<String> {
        let op = &*self.operator;
        let lq = self.left.to_sql()?;
        match &self.right {
            Operand::Null => match op {
                "IS" => Ok(format!("{lq} IS NULL")),
                "IS NOT" => Ok(format!("{lq} IS NOT NULL")),
                _ => Err(RelqError::InvalidCondition(format!(
                    "operator `{op}` not valid with NULL"
                ))),
            },
            Operand::Column(p) => Ok(format!("{lq} {op} {}", p.to_sql()?)),
            Operand::Param(v) => {
                binds.push(v.clone());
                Ok(format!("{lq} {op} ?"))
            }
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut binds = Vec::new();
        match self.to_sql(&mut binds) {
            Ok(s) => write!(f, "{s}"),
            Err(_) => Err(std::fmt::Error),
        }
    }
}

fn normalize_op(op: &str) -> Result<String> {
    let up = op.trim().to_ascii_uppercase();
    let norm = up.split_whitespace().collect::<Vec<_>>().join(" ");
    match norm.as_str() {
        "=" | "!=" | "<>" | "<" | "<=" | ">" | ">=" | "IS" | "IS NOT" | "LIKE" | "NOT LIKE" => {
            Ok(norm)
        }
        _ => Err(RelqError::InvalidCondition(format!("unsupported operator `{op}`"))),
    }
}

fn validate_operand(op: &str, right: &Operand) -> Result<()> {
    match right {
        Operand::Null => match op {
            "IS" | "IS NOT" => Ok(()),
            _ => Err(RelqError::InvalidCondition(
                "only IS / IS NOT allowed with NULL".into(),
            )),
        },
        _ if matches!(op, "IS" | "IS NOT") => Err(RelqError::InvalidCondition(format!(
            "operator `{op}` requires NULL"
        ))),
        _ => Ok(()),
    }
}
