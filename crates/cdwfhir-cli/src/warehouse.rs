//! Wiring of the in-memory warehouse the CLI processes bundles against.

use std::sync::Arc;

use anyhow::{Result, bail};
use cdwfhir_db_memory::InMemoryStore;
use cdwfhir_storage::MapperRegistry;
use serde_json::Value;

use crate::config::StoreConfig;

/// One mapper per configured type, all backed by `store`.
pub fn build_registry(store: &Arc<InMemoryStore>, config: &StoreConfig) -> MapperRegistry {
    config.types.iter().fold(MapperRegistry::new(), |registry, declared| {
        registry.with_mapper(Arc::new(
            store.mapper(declared.name.clone(), declared.reference_paths.clone()),
        ))
    })
}

/// Extracts seed resources from a document: a single resource, an array of
/// resources, or a Bundle whose entries carry resources.
pub fn seed_resources(document: Value) -> Result<Vec<Value>> {
    let resources = match document {
        Value::Array(items) => items,
        Value::Object(fields) => {
            if fields.get("resourceType").and_then(Value::as_str) == Some("Bundle") {
                fields
                    .get("entry")
                    .and_then(Value::as_array)
                    .map(|entries| {
                        entries
                            .iter()
                            .filter_map(|entry| entry.get("resource").cloned())
                            .collect()
                    })
                    .unwrap_or_default()
            } else {
                vec![Value::Object(fields)]
            }
        }
        _ => bail!("seed file must contain a resource, an array of resources or a Bundle"),
    };
    if let Some(position) = resources.iter().position(|r| r.get("resourceType").is_none()) {
        bail!("seed resource #{position} has no resourceType");
    }
    Ok(resources)
}
