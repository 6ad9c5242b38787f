//! The resource mapper contract.
//!
//! A mapper owns one resource type: it knows how warehouse rows become a
//! resource and back, and which of the resource's fields are references.
//! The bundle processor never looks behind this trait.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::reference_path::ReferencePath;

/// Read/write/delete access to one resource type.
///
/// Implementations must be thread-safe (`Send + Sync`) and must provide
/// read-your-own-writes consistency: a `write` followed by a `read` of the
/// returned id observes the written resource.
///
/// # Example
///
/// ```ignore
/// use cdwfhir_storage::{ResourceMapper, StorageError};
///
/// async fn rename(mapper: &dyn ResourceMapper, id: &str) -> Result<String, StorageError> {
///     let mut patient = mapper.read(id).await?;
///     patient["name"] = serde_json::json!([{"family": "Renamed"}]);
///     mapper.write(&patient, Some(id)).await
/// }
/// ```
#[async_trait]
pub trait ResourceMapper: Send + Sync {
    /// The resource type name this mapper serves (e.g. "Patient").
    fn resource_type(&self) -> &str;

    /// Fields of this resource type that hold references needing resolution.
    fn reference_paths(&self) -> &[ReferencePath] {
        &[]
    }

    /// Reads the current resource for `id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing is stored under `id`.
    async fn read(&self, id: &str) -> Result<Value, StorageError>;

    /// Writes a resource and returns its stable id.
    ///
    /// With `existing_id = None` a new row is created and a new id assigned.
    /// With `Some(id)` the resource is stored under that id, replacing any
    /// current content (re-creating it if it had been deleted).
    async fn write(&self, resource: &Value, existing_id: Option<&str>)
    -> Result<String, StorageError>;

    /// Deletes the resource stored under `id` and returns that id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if nothing is stored under `id`.
    async fn delete(&self, id: &str) -> Result<String, StorageError>;
}
