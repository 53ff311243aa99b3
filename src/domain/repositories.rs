//! Domain capability traits - Boundaries the host plugs into

use crate::domain::entities::ResourceTables;
use crate::domain::errors::{FatalError, MpalError};
use crate::domain::value_objects::{Expression, ItemId, VariableName};
use async_trait::async_trait;

/// Source of already-parsed resource tables
///
/// Parsing the compiled resource file is outside the runtime; implementations
/// hand over finished tables from wherever they live.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Load the full set of tables
    async fn load_tables(&self) -> Result<ResourceTables, RepositoryError>;
}

/// Read access to the variable store, as seen by an evaluator
pub trait VariableReader {
    fn read(&self, name: &VariableName) -> Option<i32>;
}

/// Evaluator for precondition and assignment expressions
///
/// Evaluation may read variables but never writes them. For preconditions,
/// `0` is false and anything else is true.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expr: &Expression, vars: &dyn VariableReader) -> Result<i32, MpalError>;
}

/// Host notification for item appearance changes
///
/// Called after a write to `Pattern.<item>` or `Status.<item>` commits.
pub trait ItemObserver: Send + Sync {
    fn pattern_changed(&self, item: ItemId, pattern: i32);

    fn status_changed(&self, item: ItemId, status: i32);
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("resource file not found: {path}")]
    NotFound {
        path: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("IO error: {message}")]
    IoError { message: String },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    /// Well-formed document whose tables do not fit the schema, such as an unknown command type
    #[error("Malformed tables: {message}")]
    Malformed { message: String },
}

impl RepositoryError {
    /// Create a not found error with an optional source
    pub fn not_found(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::NotFound {
            path: path.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<RepositoryError> for MpalError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { path, .. } => MpalError::not_found(path),
            RepositoryError::Malformed { message } => {
                MpalError::Fatal(FatalError::MalformedCommand(message))
            }
            _ => MpalError::consistency(error.to_string()),
        }
    }
}
