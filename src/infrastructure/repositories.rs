//! Infrastructure repository implementations

use crate::domain::entities::ResourceTables;
use crate::domain::repositories::{RepositoryError, ResourceRepository};
use async_trait::async_trait;
use serde_json::error::Category;
use std::path::PathBuf;

/// Loads resource tables from a JSON document on disk
#[derive(Debug, Clone)]
pub struct JsonResourceRepository {
    path: PathBuf,
}

impl JsonResourceRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl ResourceRepository for JsonResourceRepository {
    async fn load_tables(&self) -> Result<ResourceTables, RepositoryError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    RepositoryError::not_found(self.path.display().to_string(), e)
                }
                _ => RepositoryError::IoError {
                    message: e.to_string(),
                },
            })?;

        let tables: ResourceTables = serde_json::from_str(&content).map_err(|e| {
            let message = e.to_string();
            match e.classify() {
                Category::Data => RepositoryError::Malformed { message },
                _ => RepositoryError::InvalidFormat { message },
            }
        })?;

        log::info!(
            "loaded resource tables from {} ({} items)",
            self.path.display(),
            tables.items.len()
        );
        Ok(tables)
    }
}

/// Tables already held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryResourceRepository {
    tables: ResourceTables,
}

impl InMemoryResourceRepository {
    pub fn new(tables: ResourceTables) -> Self {
        Self { tables }
    }
}

#[async_trait]
impl ResourceRepository for InMemoryResourceRepository {
    async fn load_tables(&self) -> Result<ResourceTables, RepositoryError> {
        Ok(self.tables.clone())
    }
}
