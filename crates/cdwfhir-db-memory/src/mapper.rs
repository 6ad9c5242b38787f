//! `ResourceMapper` implementation over [`InMemoryStore`].

use std::sync::Arc;

use async_trait::async_trait;
use cdwfhir_storage::{ReferencePath, ResourceMapper, StorageError};
use serde_json::Value;

use crate::storage::InMemoryStore;

/// Serves one resource type out of a shared [`InMemoryStore`].
#[derive(Debug, Clone)]
pub struct InMemoryMapper {
    store: Arc<InMemoryStore>,
    resource_type: String,
    reference_paths: Vec<ReferencePath>,
}

impl InMemoryMapper {
    pub fn new(
        store: Arc<InMemoryStore>,
        resource_type: String,
        reference_paths: Vec<ReferencePath>,
    ) -> Self {
        Self {
            store,
            resource_type,
            reference_paths,
        }
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<InMemoryStore> {
        &self.store
    }
}

#[async_trait]
impl ResourceMapper for InMemoryMapper {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn reference_paths(&self) -> &[ReferencePath] {
        &self.reference_paths
    }

    async fn read(&self, id: &str) -> Result<Value, StorageError> {
        self.store.get(&self.resource_type, id).await
    }

    async fn write(
        &self,
        resource: &Value,
        existing_id: Option<&str>,
    ) -> Result<String, StorageError> {
        self.store.put(&self.resource_type, resource, existing_id).await
    }

    async fn delete(&self, id: &str) -> Result<String, StorageError> {
        self.store.remove(&self.resource_type, id).await
    }
}
