//! Declarative schema description: one [`EntityConfig`] per entity type, read once at
//! startup, plus the DDL that materialises each entity as a SQLite table.

use std::{collections::BTreeMap, fs, path::Path};

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::errors::SchemaRouteError;

pub const ID_FIELD: &str = "id";
const DEFAULT_TYPE_FIELD: &str = "entity_type";
const DEFAULT_ID_FIELD: &str = "entity_id";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Plain,
    Intermediate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighbourConfig {
    pub name: String,
    pub distance: u32,
}

/// Column names carrying the `(discriminator, id)` pair of a junction row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolymorphicFields {
    #[serde(default = "default_type_field")]
    pub type_field: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

impl Default for PolymorphicFields {
    fn default() -> Self {
        Self {
            type_field: default_type_field(),
            id_field: default_id_field(),
        }
    }
}

fn default_type_field() -> String {
    DEFAULT_TYPE_FIELD.to_string()
}

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    pub foreign_keys: BTreeMap<String, String>,
    pub height: u32,
    pub neighbours: Vec<NeighbourConfig>,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    #[serde(default)]
    pub dependent_table: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub polymorphic: Option<PolymorphicFields>,
}

impl EntityConfig {
    pub fn from_value(name: &str, value: &serde_json::Value) -> Result<Self, SchemaRouteError> {
        serde_json::from_value(value.clone())
            .map_err(|e| SchemaRouteError::schema(format!("entity {name}: {e}")))
    }

    pub fn is_intermediate(&self) -> bool {
        self.kind == EntityKind::Intermediate
    }

    pub fn table_name(&self, name: &str) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| name.to_ascii_lowercase())
    }

    pub fn model_name(&self, name: &str) -> String {
        self.model.clone().unwrap_or_else(|| name.to_string())
    }

    pub fn polymorphic_fields(&self) -> Option<PolymorphicFields> {
        if !self.is_intermediate() {
            return None;
        }
        Some(self.polymorphic.clone().unwrap_or_default())
    }

    pub fn has_column(&self, field: &str) -> bool {
        field == ID_FIELD || self.fields.iter().any(|f| f == field)
    }

    /// Neighbour reached through `field`, if `field` is one of this entity's foreign keys.
    pub fn neighbour_for_field(&self, field: &str) -> Option<&str> {
        self.foreign_keys
            .iter()
            .find(|(_, fk)| fk.as_str() == field)
            .map(|(neighbour, _)| neighbour.as_str())
    }
}

/// How a foreign-key field on one entity is stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation<'a> {
    /// The field is a column on this entity holding the neighbour's id.
    Forward { neighbour: &'a str },
    /// The neighbour owns `column`, which holds this entity's id.
    Reverse { neighbour: &'a str, column: &'a str },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub entities: BTreeMap<String, EntityConfig>,
}

impl SchemaDescription {
    pub fn from_json_str(input: &str) -> Result<Self, SchemaRouteError> {
        let description: SchemaDescription =
            serde_json::from_str(input).map_err(|e| SchemaRouteError::schema(e.to_string()))?;
        description.validate()?;
        Ok(description)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SchemaRouteError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| SchemaRouteError::schema(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn entity(&self, name: &str) -> Result<&EntityConfig, SchemaRouteError> {
        self.entities
            .get(name)
            .ok_or_else(|| SchemaRouteError::not_found(format!("entity type {name}")))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Resolves a foreign-key field of `entity` to the way it is stored.
    pub fn relation(&self, entity: &str, field: &str) -> Result<Relation<'_>, SchemaRouteError> {
        let config = self.entity(entity)?;
        let neighbour = config.neighbour_for_field(field).ok_or_else(|| {
            SchemaRouteError::invalid_input(format!("{entity} has no relation named {field}"))
        })?;
        if config.has_column(field) {
            return Ok(Relation::Forward { neighbour });
        }
        let other = self.entity(neighbour)?;
        match other.foreign_keys.get(entity) {
            Some(column) if other.has_column(column) => Ok(Relation::Reverse {
                neighbour,
                column: column.as_str(),
            }),
            _ => Err(SchemaRouteError::schema(format!(
                "{entity}.{field} is neither a column nor a reverse key of {neighbour}"
            ))),
        }
    }

    pub fn validate(&self) -> Result<(), SchemaRouteError> {
        for (name, config) in &self.entities {
            check_identifier(name)?;
            check_identifier(&config.table_name(name))?;
            for field in &config.fields {
                check_identifier(field)?;
            }
            for neighbour in &config.neighbours {
                if !self.entities.contains_key(&neighbour.name) {
                    return Err(SchemaRouteError::schema(format!(
                        "{name} lists unknown neighbour {}",
                        neighbour.name
                    )));
                }
            }
            if let Some(unknown) = config
                .foreign_keys
                .keys()
                .filter(|neighbour| config.dependent_table.as_ref() != Some(*neighbour))
                .find(|neighbour| !self.entities.contains_key(*neighbour))
            {
                return Err(SchemaRouteError::schema(format!(
                    "{name} has a foreign key to unknown entity {unknown}"
                )));
            }
            if config.is_intermediate() {
                self.validate_junction(name, config)?;
                continue;
            }
            for (neighbour, field) in &config.foreign_keys {
                check_identifier(field)?;
                let polymorphic = self
                    .entities
                    .get(neighbour)
                    .is_some_and(EntityConfig::is_intermediate);
                if !polymorphic {
                    self.relation(name, field)?;
                }
            }
        }
        Ok(())
    }

    fn validate_junction(&self, name: &str, config: &EntityConfig) -> Result<(), SchemaRouteError> {
        let dependent = config.dependent_table.as_deref().ok_or_else(|| {
            SchemaRouteError::schema(format!("intermediate {name} has no dependent_table"))
        })?;
        let owner = config.foreign_keys.get(dependent).ok_or_else(|| {
            SchemaRouteError::schema(format!(
                "intermediate {name} has no foreign key to its dependent table {dependent}"
            ))
        })?;
        let poly = config.polymorphic_fields().unwrap_or_default();
        for column in [owner, &poly.type_field, &poly.id_field] {
            check_identifier(column)?;
            if !config.has_column(column) {
                return Err(SchemaRouteError::schema(format!(
                    "intermediate {name} does not declare field {column}"
                )));
            }
        }
        Ok(())
    }
}

pub fn check_identifier(ident: &str) -> Result<(), SchemaRouteError> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(SchemaRouteError::schema(format!(
            "invalid identifier {ident:?}"
        )));
    }
    Ok(())
}

pub fn ensure_tables(
    conn: &Connection,
    description: &SchemaDescription,
) -> Result<(), SchemaRouteError> {
    let mut ddl = String::from("PRAGMA foreign_keys = OFF;\n");
    for (name, config) in &description.entities {
        let mut columns = vec![format!("\"{ID_FIELD}\" INTEGER PRIMARY KEY AUTOINCREMENT")];
        for field in config.fields.iter().filter(|f| f.as_str() != ID_FIELD) {
            columns.push(format!("\"{field}\""));
        }
        ddl.push_str(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({});\n",
            config.table_name(name),
            columns.join(", ")
        ));
    }
    conn.execute_batch(&ddl)
        .map_err(|e| SchemaRouteError::schema(e.to_string()))?;
    Ok(())
}
