//! Storage adapter trait and its SQLite implementation. The adapter is the only
//! place that touches the database; everything above it speaks in entity names,
//! [`Filter`]s and [`ResultSet`]s.

use std::{path::Path, sync::Arc};

use parking_lot::Mutex;
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};
use serde_json::{Map, Value};

use crate::{
    errors::SchemaRouteError,
    filter::{Filter, render_where, to_sql_value},
    record::{Record, ResultSet},
    schema::{EntityConfig, ID_FIELD, SchemaDescription, ensure_tables},
};

pub trait StorageAdapter: Send + Sync {
    fn description(&self) -> &SchemaDescription;
    fn insert(&self, entity: &str, fields: &Map<String, Value>) -> Result<i64, SchemaRouteError>;
    fn fetch(&self, entity: &str, filter: &Filter) -> Result<ResultSet, SchemaRouteError>;
    fn update(
        &self,
        entity: &str,
        ids: &[i64],
        fields: &Map<String, Value>,
    ) -> Result<usize, SchemaRouteError>;
    fn delete(&self, entity: &str, ids: &[i64]) -> Result<usize, SchemaRouteError>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    description: Arc<SchemaDescription>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(
        path: P,
        description: Arc<SchemaDescription>,
    ) -> Result<Self, SchemaRouteError> {
        let conn = Connection::open(path).map_err(|e| SchemaRouteError::storage(e.to_string()))?;
        ensure_tables(&conn, &description)?;
        Ok(Self::from_connection(conn, description))
    }

    pub fn open_in_memory(description: Arc<SchemaDescription>) -> Result<Self, SchemaRouteError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SchemaRouteError::storage(e.to_string()))?;
        ensure_tables(&conn, &description)?;
        Ok(Self::from_connection(conn, description))
    }

    fn from_connection(conn: Connection, description: Arc<SchemaDescription>) -> Self {
        Self {
            conn: Mutex::new(conn),
            description,
        }
    }

    fn layout(&self, entity: &str) -> Result<(&EntityConfig, String), SchemaRouteError> {
        let config = self.description.entity(entity)?;
        Ok((config, config.table_name(entity)))
    }
}

impl StorageAdapter for SqliteStore {
    fn description(&self) -> &SchemaDescription {
        &self.description
    }

    fn insert(&self, entity: &str, fields: &Map<String, Value>) -> Result<i64, SchemaRouteError> {
        let (config, table) = self.layout(entity)?;
        validate_fields(entity, config, fields)?;
        let conn = self.conn.lock();
        if fields.is_empty() {
            conn.execute(&format!("INSERT INTO \"{table}\" DEFAULT VALUES"), [])
                .map_err(|e| SchemaRouteError::storage(e.to_string()))?;
            return Ok(conn.last_insert_rowid());
        }
        let columns: Vec<String> = fields.keys().map(|k| format!("\"{k}\"")).collect();
        let placeholders = vec!["?"; fields.len()].join(", ");
        let values = fields
            .values()
            .map(to_sql_value)
            .collect::<Result<Vec<_>, _>>()?;
        conn.execute(
            &format!(
                "INSERT INTO \"{table}\"({}) VALUES({placeholders})",
                columns.join(", ")
            ),
            params_from_iter(values.iter()),
        )
        .map_err(|e| SchemaRouteError::storage(e.to_string()))?;
        Ok(conn.last_insert_rowid())
    }

    fn fetch(&self, entity: &str, filter: &Filter) -> Result<ResultSet, SchemaRouteError> {
        let (config, table) = self.layout(entity)?;
        let clause = render_where(&self.description, entity, filter)?;
        let columns: Vec<&str> = config
            .fields
            .iter()
            .map(String::as_str)
            .filter(|f| *f != ID_FIELD)
            .collect();
        let mut select = vec![format!("\"{ID_FIELD}\"")];
        select.extend(columns.iter().map(|c| format!("\"{c}\"")));
        let sql = format!(
            "SELECT DISTINCT {} FROM \"{table}\" WHERE {} ORDER BY \"{ID_FIELD}\"",
            select.join(", "),
            clause.sql
        );
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| SchemaRouteError::storage(e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(clause.params.iter()), |row| {
                let id: i64 = row.get(0)?;
                let mut fields = Map::new();
                for (idx, column) in columns.iter().enumerate() {
                    let value: SqlValue = row.get(idx + 1)?;
                    fields.insert((*column).to_string(), from_sql_value(value));
                }
                Ok(Record { id, fields })
            })
            .map_err(|e| SchemaRouteError::storage(e.to_string()))?;
        let mut records = Vec::new();
        for record in rows {
            records.push(record.map_err(|e| SchemaRouteError::storage(e.to_string()))?);
        }
        Ok(ResultSet::new(entity, records))
    }

    fn update(
        &self,
        entity: &str,
        ids: &[i64],
        fields: &Map<String, Value>,
    ) -> Result<usize, SchemaRouteError> {
        let (config, table) = self.layout(entity)?;
        validate_fields(entity, config, fields)?;
        if ids.is_empty() || fields.is_empty() {
            return Ok(0);
        }
        let assignments: Vec<String> = fields.keys().map(|k| format!("\"{k}\" = ?")).collect();
        let mut values = fields
            .values()
            .map(to_sql_value)
            .collect::<Result<Vec<_>, _>>()?;
        values.extend(ids.iter().map(|id| SqlValue::Integer(*id)));
        let sql = format!(
            "UPDATE \"{table}\" SET {} WHERE \"{ID_FIELD}\" IN ({})",
            assignments.join(", "),
            vec!["?"; ids.len()].join(", ")
        );
        self.conn
            .lock()
            .execute(&sql, params_from_iter(values.iter()))
            .map_err(|e| SchemaRouteError::storage(e.to_string()))
    }

    fn delete(&self, entity: &str, ids: &[i64]) -> Result<usize, SchemaRouteError> {
        let (_, table) = self.layout(entity)?;
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM \"{table}\" WHERE \"{ID_FIELD}\" IN ({})",
            vec!["?"; ids.len()].join(", ")
        );
        self.conn
            .lock()
            .execute(&sql, params_from_iter(ids.iter()))
            .map_err(|e| SchemaRouteError::storage(e.to_string()))
    }
}

fn validate_fields(
    entity: &str,
    config: &EntityConfig,
    fields: &Map<String, Value>,
) -> Result<(), SchemaRouteError> {
    for key in fields.keys() {
        if key == ID_FIELD {
            return Err(SchemaRouteError::invalid_input(format!(
                "{entity}.{ID_FIELD} is assigned by storage"
            )));
        }
        if !config.has_column(key) {
            return Err(SchemaRouteError::invalid_input(format!(
                "{entity} has no field {key}"
            )));
        }
    }
    Ok(())
}

fn from_sql_value(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(int) => Value::from(int),
        SqlValue::Real(real) => serde_json::Number::from_f64(real)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(text) => Value::String(text),
        SqlValue::Blob(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}
