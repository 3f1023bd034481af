//! Row filter expressions attached to authorization profiles.
//!
//! Filters are written in configuration as JSON:
//!
//! ```json
//! {"and": [{"user_id": {"eq": "$user_id"}}, {"deleted_at": {"is_null": true}}]}
//! ```
//!
//! A string value starting with `$` references a request variable and is
//! rendered as a `{{name}}` placeholder.

use std::fmt::Write as _;

use serde_json::{Map, Value as JsonValue};

use crate::error::{Error, Result};
use crate::statement::template;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    IsNull,
    Like,
}

impl CompareOp {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => CompareOp::Eq,
            "neq" => CompareOp::Neq,
            "gt" => CompareOp::Gt,
            "gte" => CompareOp::Gte,
            "lt" => CompareOp::Lt,
            "lte" => CompareOp::Lte,
            "in" => CompareOp::In,
            "nin" => CompareOp::Nin,
            "is_null" => CompareOp::IsNull,
            "like" => CompareOp::Like,
            _ => return None,
        })
    }

    fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::In => "IN",
            CompareOp::Nin => "NOT IN",
            CompareOp::IsNull => "IS",
            CompareOp::Like => "LIKE",
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(JsonValue),
    Variable(String),
}

impl Operand {
    fn parse(value: &JsonValue) -> Self {
        match value {
            JsonValue::String(s) if s.len() > 1 && s.starts_with('$') => {
                Operand::Variable(s[1..].to_string())
            }
            other => Operand::Literal(other.clone()),
        }
    }
}

/// Boolean row filter.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    True,
    False,
    Compare {
        column: String,
        op: CompareOp,
        value: Operand,
    },
    And(Vec<RowFilter>),
    Or(Vec<RowFilter>),
    Not(Box<RowFilter>),
}

impl RowFilter {
    /// Parse one filter from its configuration form.
    pub fn parse(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Bool(true) => Ok(RowFilter::True),
            JsonValue::Bool(false) => Ok(RowFilter::False),
            JsonValue::Object(map) => Self::parse_object(map),
            other => Err(Error::Config(format!("invalid filter: {}", other))),
        }
    }

    /// Parse a list of filters combined with AND. An empty list is no filter.
    pub fn parse_all(values: &[JsonValue]) -> Result<Option<Self>> {
        let mut filters = values.iter().map(Self::parse).collect::<Result<Vec<_>>>()?;
        Ok(match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(RowFilter::And(filters)),
        })
    }

    fn parse_object(map: &Map<String, JsonValue>) -> Result<Self> {
        let mut terms = Vec::with_capacity(map.len());

        for (key, value) in map {
            let term = match key.as_str() {
                "and" | "or" => {
                    let list = value.as_array().ok_or_else(|| {
                        Error::Config(format!("filter '{}' expects a list", key))
                    })?;
                    let list = list.iter().map(Self::parse).collect::<Result<Vec<_>>>()?;
                    if key == "and" {
                        RowFilter::And(list)
                    } else {
                        RowFilter::Or(list)
                    }
                }
                "not" => RowFilter::Not(Box::new(Self::parse(value)?)),
                column => Self::parse_column(column, value)?,
            };
            terms.push(term);
        }

        Ok(match terms.len() {
            0 => RowFilter::True,
            1 => terms.remove(0),
            _ => RowFilter::And(terms),
        })
    }

    fn parse_column(column: &str, value: &JsonValue) -> Result<Self> {
        let ops = value.as_object().ok_or_else(|| {
            Error::Config(format!("filter on '{}' expects an operator object", column))
        })?;

        let mut terms = Vec::with_capacity(ops.len());
        for (name, operand) in ops {
            let op = CompareOp::parse(name)
                .ok_or_else(|| Error::Config(format!("unknown filter operator: {}", name)))?;
            terms.push(RowFilter::Compare {
                column: column.to_lowercase(),
                op,
                value: Operand::parse(operand),
            });
        }

        Ok(match terms.len() {
            1 => terms.remove(0),
            _ => RowFilter::And(terms),
        })
    }

    /// True when the filter depends on request variables, so it can only
    /// be applied when those variables are present.
    pub fn requires_not_null(&self) -> bool {
        !self.variables().is_empty()
    }

    /// Variables referenced by the filter, in order of appearance.
    pub fn variables(&self) -> Vec<&str> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables<'a>(&'a self, vars: &mut Vec<&'a str>) {
        match self {
            RowFilter::Compare {
                value: Operand::Variable(name),
                ..
            } => vars.push(name),
            RowFilter::And(list) | RowFilter::Or(list) => {
                list.iter().for_each(|f| f.collect_variables(vars))
            }
            RowFilter::Not(inner) => inner.collect_variables(vars),
            _ => {}
        }
    }

    /// Render as a SQL boolean expression. Variables become `{{name}}`
    /// placeholders for later binding.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        self.write_sql(&mut out);
        out
    }

    fn write_sql(&self, out: &mut String) {
        match self {
            RowFilter::True => out.push_str("true"),
            RowFilter::False => out.push_str("false"),
            RowFilter::Not(inner) => {
                out.push_str("NOT (");
                inner.write_sql(out);
                out.push(')');
            }
            RowFilter::And(list) | RowFilter::Or(list) => {
                let joiner = if matches!(self, RowFilter::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                if list.is_empty() {
                    out.push_str(if matches!(self, RowFilter::And(_)) { "true" } else { "false" });
                    return;
                }
                out.push('(');
                for (i, f) in list.iter().enumerate() {
                    if i != 0 {
                        out.push_str(joiner);
                    }
                    f.write_sql(out);
                }
                out.push(')');
            }
            RowFilter::Compare { column, op, value } => {
                let _ = write!(out, "\"{}\" ", column.replace('"', "\"\""));
                match (op, value) {
                    (CompareOp::IsNull, Operand::Literal(JsonValue::Bool(false))) => {
                        out.push_str("IS NOT NULL")
                    }
                    (CompareOp::IsNull, _) => out.push_str("IS NULL"),
                    (op, value) => {
                        out.push_str(op.sql());
                        out.push(' ');
                        write_operand(out, value);
                    }
                }
            }
        }
    }
}

fn write_operand(out: &mut String, value: &Operand) {
    match value {
        Operand::Variable(name) => template::write_placeholder(out, name),
        Operand::Literal(JsonValue::Array(items)) => {
            out.push('(');
            for (i, item) in items.iter().enumerate() {
                if i != 0 {
                    out.push_str(", ");
                }
                write_literal(out, item);
            }
            out.push(')');
        }
        Operand::Literal(v) => write_literal(out, v),
    }
}

fn write_literal(out: &mut String, value: &JsonValue) {
    match value {
        JsonValue::Null => out.push_str("NULL"),
        JsonValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        JsonValue::Number(n) => {
            let _ = write!(out, "{}", n);
        }
        JsonValue::String(s) => {
            out.push('\'');
            out.push_str(&template::escape_quotes(s));
            out.push('\'');
        }
        other => {
            out.push('\'');
            out.push_str(&template::escape_quotes(&other.to_string()));
            out.push('\'');
        }
    }
}
