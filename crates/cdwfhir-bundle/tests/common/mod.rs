//! Shared fixtures for bundle processor integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdwfhir_bundle::{BundleProcessor, BundleResponse, OutcomeStatus, ProcessorConfig};
use cdwfhir_db_memory::{InMemoryMapper, InMemoryStore, JournalEntry, StoreOp};
use cdwfhir_storage::{MapperRegistry, ReferencePath, ResourceMapper, StorageError};
use serde_json::Value;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("cdwfhir_bundle=debug")
        .with_test_writer()
        .try_init();
}

fn paths(paths: &[&str]) -> Vec<ReferencePath> {
    paths
        .iter()
        .map(|p| ReferencePath::parse(p).expect("valid reference path"))
        .collect()
}

/// Reference fields of the resource types registered by [`Fixture::new`].
pub fn reference_paths_for(resource_type: &str) -> Vec<ReferencePath> {
    match resource_type {
        "Patient" => paths(&["generalPractitioner", "link.other"]),
        "Observation" => paths(&["subject", "performer", "encounter"]),
        "Encounter" => paths(&["subject", "participant.individual", "partOf"]),
        _ => Vec::new(),
    }
}

/// An in-memory warehouse with Patient, Practitioner, Observation and
/// Encounter mappers.
pub struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub registry: MapperRegistry,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let store = InMemoryStore::new_shared();
        let mut registry = MapperRegistry::new();
        for resource_type in ["Patient", "Practitioner", "Observation", "Encounter"] {
            registry.register(Arc::new(
                store.mapper(resource_type, reference_paths_for(resource_type)),
            ));
        }
        Self { store, registry }
    }

    /// The plain in-memory mapper for `resource_type`.
    pub fn mapper(&self, resource_type: &str) -> InMemoryMapper {
        self.store
            .mapper(resource_type, reference_paths_for(resource_type))
    }

    /// Replaces the mapper registered for its type.
    pub fn with_mapper(mut self, mapper: impl ResourceMapper + 'static) -> Self {
        self.registry.register(Arc::new(mapper));
        self
    }

    pub fn processor(&self) -> BundleProcessor {
        BundleProcessor::new(Arc::new(self.registry.clone()))
    }

    pub fn processor_with(&self, config: ProcessorConfig) -> BundleProcessor {
        BundleProcessor::with_config(Arc::new(self.registry.clone()), config)
            .expect("valid processor config")
    }

    /// Seeds resources and forgets the seeding calls.
    pub async fn seed(&self, resources: &[Value]) -> Vec<String> {
        let keys = self.store.seed(resources).await.expect("seed");
        self.store.clear_journal().await;
        keys
    }

    /// Journal as `(op, type, id)` triples of successful calls.
    pub async fn calls(&self) -> Vec<(StoreOp, String, String)> {
        self.store
            .journal()
            .await
            .into_iter()
            .filter(|e| e.ok)
            .map(|JournalEntry { op, resource_type, id, .. }| {
                (op, resource_type, id.unwrap_or_default())
            })
            .collect()
    }

    pub async fn writes_of(&self, resource_type: &str) -> usize {
        self.store
            .journal()
            .await
            .iter()
            .filter(|e| e.op == StoreOp::Write && e.resource_type == resource_type)
            .count()
    }
}

pub fn call(op: StoreOp, resource_type: &str, id: &str) -> (StoreOp, String, String) {
    (op, resource_type.to_string(), id.to_string())
}

pub fn statuses(response: &BundleResponse) -> Vec<OutcomeStatus> {
    response.entries.iter().map(|e| e.status).collect()
}

/// Wraps an in-memory mapper and makes chosen calls misbehave.
pub struct FaultInjectingMapper {
    inner: InMemoryMapper,
    fail_writes: bool,
    fail_deletes: bool,
    write_delay: Option<Duration>,
}

impl FaultInjectingMapper {
    pub fn new(inner: InMemoryMapper) -> Self {
        Self {
            inner,
            fail_writes: false,
            fail_deletes: false,
            write_delay: None,
        }
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn slow_writes(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }
}

#[async_trait]
impl ResourceMapper for FaultInjectingMapper {
    fn resource_type(&self) -> &str {
        self.inner.resource_type()
    }

    fn reference_paths(&self) -> &[ReferencePath] {
        self.inner.reference_paths()
    }

    async fn read(&self, id: &str) -> Result<Value, StorageError> {
        self.inner.read(id).await
    }

    async fn write(&self, resource: &Value, existing_id: Option<&str>) -> Result<String, StorageError> {
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes {
            return Err(StorageError::internal("injected write failure"));
        }
        self.inner.write(resource, existing_id).await
    }

    async fn delete(&self, id: &str) -> Result<String, StorageError> {
        if self.fail_deletes {
            return Err(StorageError::internal("injected delete failure"));
        }
        self.inner.delete(id).await
    }
}
