use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaRouteError {
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("no route from {from} to {to}")]
    NoRoute { from: String, to: String },
    #[error("multiple results: {0}")]
    MultipleResults(String),
    #[error("storage error: {0}")]
    StorageError(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SchemaRouteError {
    pub fn schema<T: Into<String>>(msg: T) -> Self {
        SchemaRouteError::SchemaError(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        SchemaRouteError::NotFound(msg.into())
    }

    pub fn no_route<S: Into<String>, T: Into<String>>(from: S, to: T) -> Self {
        SchemaRouteError::NoRoute {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn multiple_results<T: Into<String>>(msg: T) -> Self {
        SchemaRouteError::MultipleResults(msg.into())
    }

    pub fn storage<T: Into<String>>(msg: T) -> Self {
        SchemaRouteError::StorageError(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        SchemaRouteError::InvalidInput(msg.into())
    }
}
