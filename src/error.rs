//! Error handling for ui-datasource
//!
//! Each concern has its own error enum (tags, paths, schemas, resolution,
//! registry). [`DatasourceError`] wraps them for code that crosses concerns,
//! such as loading a project file and validating its bindings.

use crate::binding::ResolutionError;
use crate::path::PathError;
use crate::registry::RegistryError;
use crate::schema::SchemaError;
use crate::tag::TagError;
use thiserror::Error;

/// Main error type for ui-datasource operations
#[derive(Error, Debug)]
pub enum DatasourceError {
    #[error("Tag error: {0}")]
    Tag(#[from] TagError),

    #[error("Path error: {0}")]
    Path(#[from] PathError),

    /// Broken host reflection data; the type is unusable
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<DatasourceError>,
    },
}

impl DatasourceError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        DatasourceError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any added context
    pub fn root_cause(&self) -> &DatasourceError {
        match self {
            DatasourceError::WithContext { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Result type alias for ui-datasource operations
pub type Result<T> = std::result::Result<T, DatasourceError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<DatasourceError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
