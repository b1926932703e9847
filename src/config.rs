use std::{env, path::PathBuf, sync::Arc};

use crate::{
    errors::SchemaRouteError,
    path::SearchStrategy,
    schema::SchemaDescription,
    storage::{SqliteStore, StorageAdapter},
};

pub const SCHEMA_ENV: &str = "SCHEMAROUTE_SCHEMA";
pub const DATABASE_ENV: &str = "SCHEMAROUTE_DATABASE";
pub const SEARCH_ENV: &str = "SCHEMAROUTE_SEARCH";

const MEMORY: &str = "memory";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum StorageKind {
    #[default]
    SqliteMemory,
    SqliteFile(PathBuf),
}

impl StorageKind {
    /// `memory` (or nothing) selects an in-memory database, anything else a file path.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | MEMORY => StorageKind::SqliteMemory,
            path => StorageKind::SqliteFile(PathBuf::from(path)),
        }
    }

    pub fn from_env() -> Self {
        match env::var(DATABASE_ENV) {
            Ok(value) => Self::parse(&value),
            Err(_) => StorageKind::SqliteMemory,
        }
    }

    pub fn open(
        &self,
        description: Arc<SchemaDescription>,
    ) -> Result<Arc<dyn StorageAdapter>, SchemaRouteError> {
        let store = match self {
            StorageKind::SqliteMemory => SqliteStore::open_in_memory(description)?,
            StorageKind::SqliteFile(path) => SqliteStore::open(path, description)?,
        };
        Ok(Arc::new(store))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouterConfig {
    pub schema_path: Option<PathBuf>,
    pub storage: StorageKind,
    pub search: SearchStrategy,
}

impl RouterConfig {
    pub fn new<P: Into<PathBuf>>(schema_path: P) -> Self {
        Self {
            schema_path: Some(schema_path.into()),
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, SchemaRouteError> {
        let search = match env::var(SEARCH_ENV) {
            Ok(value) => value.parse()?,
            Err(_) => SearchStrategy::default(),
        };
        Ok(Self {
            schema_path: env::var_os(SCHEMA_ENV).map(PathBuf::from),
            storage: StorageKind::from_env(),
            search,
        })
    }

    pub fn load_schema(&self) -> Result<SchemaDescription, SchemaRouteError> {
        let path = self
            .schema_path
            .as_ref()
            .ok_or_else(|| SchemaRouteError::schema(format!("no schema file configured ({SCHEMA_ENV})")))?;
        SchemaDescription::load(path)
    }

    pub fn open_store(
        &self,
        description: Arc<SchemaDescription>,
    ) -> Result<Arc<dyn StorageAdapter>, SchemaRouteError> {
        self.storage.open(description)
    }
}
