//! Filter predicates over entity fields, the `key=op:value` parameter grammar that
//! produces them, and their rendering to SQL against a [`SchemaDescription`].
//!
//! A condition path is a list of field names; every name but the last crosses a
//! foreign key, so `office__region__id__in=[1,2]` on `Employee` reads "employees
//! whose office's region id is 1 or 2".

use std::{collections::BTreeMap, fmt};

use rusqlite::types::Value as SqlValue;
use serde_json::Value;

use crate::{
    errors::SchemaRouteError,
    schema::{ID_FIELD, Relation, SchemaDescription},
};

pub const PATH_SEPARATOR: &str = "__";
const IGNORED_PARAM: &str = "table";

/// Raw request parameters, `field -> "op:value"` or `field -> value`.
pub type FilterParams = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    Contains,
    StartsWith,
    EndsWith,
    Lt,
    Gt,
    Gte,
    Lte,
    In,
    IsNull,
}

impl Lookup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Exact => "exact",
            Lookup::Contains => "icontains",
            Lookup::StartsWith => "istartswith",
            Lookup::EndsWith => "iendswith",
            Lookup::Lt => "lt",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::Lte => "lte",
            Lookup::In => "in",
            Lookup::IsNull => "isnull",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub path: Vec<String>,
    pub lookup: Lookup,
    pub value: Value,
}

impl Condition {
    pub fn new<P: AsRef<str>>(path: P, lookup: Lookup, value: Value) -> Self {
        Self {
            path: split_path(path.as_ref()),
            lookup,
            value,
        }
    }

    pub fn equals<P: AsRef<str>>(path: P, value: Value) -> Self {
        Self::new(path, Lookup::Exact, value)
    }

    /// `path__id__in=[ids]`; an empty `path` filters on the entity's own id.
    pub fn ids_in(path: &[String], ids: &[i64]) -> Self {
        let mut full = path.to_vec();
        full.push(ID_FIELD.to_string());
        Self {
            path: full,
            lookup: Lookup::In,
            value: Value::from(ids.to_vec()),
        }
    }

    /// `field__in=[ids]` on a column that stores ids.
    pub fn field_in(field: &str, ids: &[i64]) -> Self {
        Self {
            path: vec![field.to_string()],
            lookup: Lookup::In,
            value: Value::from(ids.to_vec()),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{PATH_SEPARATOR}{}={}",
            self.path.join(PATH_SEPARATOR),
            self.lookup.as_str(),
            self.value
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub include: Vec<Condition>,
    pub exclude: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_ids(ids: &[i64]) -> Self {
        Self::all().include(Condition::ids_in(&[], ids))
    }

    pub fn include(mut self, condition: Condition) -> Self {
        self.include.push(condition);
        self
    }

    pub fn exclude(mut self, condition: Condition) -> Self {
        self.exclude.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Parses request parameters: `op:raw` selects a lookup, anything else is equality.
    /// The text before the first `:` must name a lookup, so a value that itself
    /// contains `:` is written `exact:<value>`.
    pub fn from_params(params: &FilterParams) -> Result<Self, SchemaRouteError> {
        let mut filter = Filter::all();
        for (key, value) in params {
            if key == IGNORED_PARAM {
                continue;
            }
            if split_path(key).is_empty() {
                return Err(SchemaRouteError::invalid_input(format!(
                    "empty filter field {key:?}"
                )));
            }
            let Some((op, raw)) = value.split_once(':') else {
                filter = filter.include(Condition::equals(key, plain_value(value)));
                continue;
            };
            let condition = |lookup, value| Condition::new(key, lookup, value);
            filter = match op {
                "exact" => filter.include(condition(Lookup::Exact, scalar(raw))),
                "contains" => filter.include(condition(Lookup::Contains, Value::from(raw))),
                "startswith" => filter.include(condition(Lookup::StartsWith, Value::from(raw))),
                "endswith" => filter.include(condition(Lookup::EndsWith, Value::from(raw))),
                "below" => filter.include(condition(Lookup::Lt, scalar(raw))),
                "over" => filter.include(condition(Lookup::Gt, scalar(raw))),
                "at_least" => filter.include(condition(Lookup::Gte, scalar(raw))),
                "at_most" => filter.include(condition(Lookup::Lte, scalar(raw))),
                "in" => filter.include(condition(Lookup::In, list(raw))),
                "null" => filter.include(condition(Lookup::IsNull, Value::Bool(raw == "true"))),
                "except" => filter.exclude(condition(Lookup::Exact, scalar(raw))),
                "notin" => filter.exclude(condition(Lookup::In, list(raw))),
                other => {
                    return Err(SchemaRouteError::invalid_input(format!(
                        "unknown filter operator {other:?} on {key}; use exact:<value> for values containing ':'"
                    )));
                }
            };
        }
        Ok(filter)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.include.iter().map(ToString::to_string).collect();
        parts.extend(self.exclude.iter().map(|c| format!("!{c}")));
        write!(f, "{}", parts.join(" & "))
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split(PATH_SEPARATOR)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn plain_value(raw: &str) -> Value {
    if raw == "true" {
        return Value::Bool(true);
    }
    scalar(raw)
}

fn scalar(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = raw.parse::<f64>() {
        return Value::from(float);
    }
    Value::from(raw)
}

fn list(raw: &str) -> Value {
    Value::Array(raw.split(',').map(|item| scalar(item.trim())).collect())
}

/// A WHERE clause body and its positional parameters.
#[derive(Debug, Default)]
pub(crate) struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

pub(crate) fn render_where(
    description: &SchemaDescription,
    entity: &str,
    filter: &Filter,
) -> Result<SqlFragment, SchemaRouteError> {
    let mut params = Vec::new();
    let mut clauses = Vec::new();
    for condition in &filter.include {
        clauses.push(render_condition(
            description,
            entity,
            &condition.path,
            condition,
            &mut params,
        )?);
    }
    if !filter.exclude.is_empty() {
        let mut excluded = Vec::new();
        for condition in &filter.exclude {
            excluded.push(render_condition(
                description,
                entity,
                &condition.path,
                condition,
                &mut params,
            )?);
        }
        clauses.push(format!("NOT ({})", excluded.join(" AND ")));
    }
    let sql = if clauses.is_empty() {
        "1=1".to_string()
    } else {
        clauses.join(" AND ")
    };
    Ok(SqlFragment { sql, params })
}

fn render_condition(
    description: &SchemaDescription,
    entity: &str,
    path: &[String],
    condition: &Condition,
    params: &mut Vec<SqlValue>,
) -> Result<String, SchemaRouteError> {
    let config = description.entity(entity)?;
    let (field, rest) = match path.split_first() {
        Some(split) => split,
        None => return Err(SchemaRouteError::invalid_input("empty condition path")),
    };
    if rest.is_empty() {
        if !config.has_column(field) {
            return Err(SchemaRouteError::invalid_input(format!(
                "{entity} has no field {field}"
            )));
        }
        return render_lookup(field, condition, params);
    }
    let inner = |neighbour: &str, params: &mut Vec<SqlValue>| {
        render_condition(description, neighbour, rest, condition, params)
    };
    match description.relation(entity, field)? {
        Relation::Forward { neighbour } => {
            let table = description.entity(neighbour)?.table_name(neighbour);
            let nested = inner(neighbour, params)?;
            Ok(format!(
                "\"{field}\" IN (SELECT \"{ID_FIELD}\" FROM \"{table}\" WHERE {nested})"
            ))
        }
        Relation::Reverse { neighbour, column } => {
            let table = description.entity(neighbour)?.table_name(neighbour);
            let nested = inner(neighbour, params)?;
            Ok(format!(
                "\"{ID_FIELD}\" IN (SELECT \"{column}\" FROM \"{table}\" WHERE {nested})"
            ))
        }
    }
}

fn render_lookup(
    field: &str,
    condition: &Condition,
    params: &mut Vec<SqlValue>,
) -> Result<String, SchemaRouteError> {
    let column = format!("\"{field}\"");
    let value = &condition.value;
    let sql = match condition.lookup {
        Lookup::Exact if value.is_null() => format!("{column} IS NULL"),
        Lookup::Exact => binary(&column, "=", value, params)?,
        Lookup::Lt => binary(&column, "<", value, params)?,
        Lookup::Gt => binary(&column, ">", value, params)?,
        Lookup::Gte => binary(&column, ">=", value, params)?,
        Lookup::Lte => binary(&column, "<=", value, params)?,
        Lookup::Contains => like(&column, value, "%", "%", params)?,
        Lookup::StartsWith => like(&column, value, "", "%", params)?,
        Lookup::EndsWith => like(&column, value, "%", "", params)?,
        Lookup::IsNull => match value.as_bool() {
            Some(false) => format!("{column} IS NOT NULL"),
            _ => format!("{column} IS NULL"),
        },
        Lookup::In => {
            let items = match value {
                Value::Array(items) => items.as_slice(),
                other => std::slice::from_ref(other),
            };
            if items.is_empty() {
                return Ok("0".to_string());
            }
            for item in items {
                params.push(to_sql_value(item)?);
            }
            let placeholders = vec!["?"; items.len()].join(", ");
            format!("{column} IN ({placeholders})")
        }
    };
    Ok(sql)
}

fn binary(
    column: &str,
    op: &str,
    value: &Value,
    params: &mut Vec<SqlValue>,
) -> Result<String, SchemaRouteError> {
    params.push(to_sql_value(value)?);
    Ok(format!("{column} {op} ?"))
}

fn like(
    column: &str,
    value: &Value,
    prefix: &str,
    suffix: &str,
    params: &mut Vec<SqlValue>,
) -> Result<String, SchemaRouteError> {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let escaped = text
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    params.push(SqlValue::Text(format!("{prefix}{escaped}{suffix}")));
    Ok(format!("{column} LIKE ? ESCAPE '\\'"))
}

pub(crate) fn to_sql_value(value: &Value) -> Result<SqlValue, SchemaRouteError> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(int) => SqlValue::Integer(int),
            None => SqlValue::Real(n.as_f64().ok_or_else(|| {
                SchemaRouteError::invalid_input(format!("unsupported number {n}"))
            })?),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    })
}
