use cdwfhir_core::parse_numeric_id;
use cdwfhir_storage::{ReferencePath, StorageError, StorageResult};
use papaya::HashMap as PapayaHashMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

use crate::mapper::InMemoryMapper;

pub type StorageKey = String; // Format: "ResourceType/id"

pub(crate) fn make_storage_key(resource_type: &str, id: &str) -> StorageKey {
    format!("{resource_type}/{id}")
}

/// Kind of call recorded in the store journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreOp {
    Read,
    Write,
    Delete,
}

/// One call made against the store, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    /// Monotonically increasing call number, starting at 1.
    pub seq: u64,
    pub op: StoreOp,
    pub resource_type: String,
    /// Target id (`None` for a write that allocated a new id and failed).
    pub id: Option<String>,
    pub ok: bool,
}

/// In-memory warehouse shared by all resource types.
///
/// This store provides:
/// - Lock-free concurrent access via papaya::HashMap
/// - Numeric id allocation from a single sequence
/// - Upsert semantics for writes with an explicit id
/// - An ordered journal of every read/write/delete
#[derive(Debug)]
pub struct InMemoryStore {
    /// Main storage keyed by "Type/id"
    pub(crate) data: PapayaHashMap<StorageKey, Value>,
    /// Next id to hand out for creates
    id_counter: AtomicU64,
    /// Call journal
    journal: Mutex<Vec<JournalEntry>>,
    journal_seq: AtomicU64,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self {
            data: PapayaHashMap::new(),
            id_counter: AtomicU64::new(1),
            journal: Mutex::new(Vec::new()),
            journal_seq: AtomicU64::new(1),
        }
    }

    /// Creates a new shared empty store.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Returns a mapper for `resource_type` backed by this store.
    pub fn mapper(
        self: &Arc<Self>,
        resource_type: impl Into<String>,
        reference_paths: Vec<ReferencePath>,
    ) -> InMemoryMapper {
        InMemoryMapper::new(Arc::clone(self), resource_type.into(), reference_paths)
    }

    fn allocate_id(&self) -> String {
        self.id_counter.fetch_add(1, Ordering::SeqCst).to_string()
    }

    /// Keeps the sequence ahead of any explicitly written numeric id.
    fn observe_id(&self, id: u64) {
        self.id_counter
            .fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }

    async fn record(&self, op: StoreOp, resource_type: &str, id: Option<&str>, ok: bool) {
        let seq = self.journal_seq.fetch_add(1, Ordering::SeqCst);
        self.journal.lock().await.push(JournalEntry {
            seq,
            op,
            resource_type: resource_type.to_string(),
            id: id.map(str::to_string),
            ok,
        });
    }

    /// Reads the resource stored under `resource_type/id`.
    pub async fn get(&self, resource_type: &str, id: &str) -> StorageResult<Value> {
        let found = {
            let guard = self.data.pin();
            guard.get(&make_storage_key(resource_type, id)).cloned()
        };
        self.record(StoreOp::Read, resource_type, Some(id), found.is_some())
            .await;
        found.ok_or_else(|| StorageError::not_found(resource_type, id))
    }

    /// Stores a resource, allocating an id when `existing_id` is `None`.
    ///
    /// The stored copy always carries `resourceType` and `id`.
    pub async fn put(
        &self,
        resource_type: &str,
        resource: &Value,
        existing_id: Option<&str>,
    ) -> StorageResult<String> {
        let result = self.put_inner(resource_type, resource, existing_id);
        let recorded_id = match (&result, existing_id) {
            (Ok(id), _) => Some(id.as_str()),
            (Err(_), id) => id,
        };
        self.record(StoreOp::Write, resource_type, recorded_id, result.is_ok())
            .await;
        result
    }

    fn put_inner(
        &self,
        resource_type: &str,
        resource: &Value,
        existing_id: Option<&str>,
    ) -> StorageResult<String> {
        let Value::Object(fields) = resource else {
            return Err(StorageError::invalid_resource("resource must be a JSON object"));
        };
        if let Some(declared) = fields.get("resourceType").and_then(Value::as_str) {
            if declared != resource_type {
                return Err(StorageError::invalid_resource(format!(
                    "resourceType '{declared}' does not match '{resource_type}'"
                )));
            }
        }

        let id = match existing_id {
            Some(id) => {
                let numeric = parse_numeric_id(id)
                    .map_err(|e| StorageError::invalid_resource(e.to_string()))?;
                self.observe_id(numeric);
                id.to_string()
            }
            None => self.allocate_id(),
        };

        let mut stored = fields.clone();
        stored.insert(
            "resourceType".to_string(),
            Value::String(resource_type.to_string()),
        );
        stored.insert("id".to_string(), Value::String(id.clone()));

        let guard = self.data.pin();
        guard.insert(make_storage_key(resource_type, &id), Value::Object(stored));
        Ok(id)
    }

    /// Removes the resource stored under `resource_type/id`.
    pub async fn remove(&self, resource_type: &str, id: &str) -> StorageResult<String> {
        let removed = {
            let guard = self.data.pin();
            guard.remove(&make_storage_key(resource_type, id)).is_some()
        };
        self.record(StoreOp::Delete, resource_type, Some(id), removed)
            .await;
        if removed {
            Ok(id.to_string())
        } else {
            Err(StorageError::not_found(resource_type, id))
        }
    }

    /// Returns whether `resource_type/id` is stored. Not journaled.
    pub fn contains(&self, resource_type: &str, id: &str) -> bool {
        let guard = self.data.pin();
        guard.contains_key(&make_storage_key(resource_type, id))
    }

    /// Returns the stored resource without journaling the access.
    pub fn peek(&self, resource_type: &str, id: &str) -> Option<Value> {
        let guard = self.data.pin();
        guard.get(&make_storage_key(resource_type, id)).cloned()
    }

    /// Number of stored resources.
    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored resources ordered by type then numeric id.
    pub fn snapshot(&self) -> Vec<Value> {
        let guard = self.data.pin();
        let mut entries: Vec<(String, u64, Value)> = guard
            .iter()
            .map(|(key, value)| {
                let (resource_type, id) = key.split_once('/').unwrap_or((key.as_str(), ""));
                let numeric = id.parse::<u64>().unwrap_or(u64::MAX);
                (resource_type.to_string(), numeric, value.clone())
            })
            .collect();
        entries.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
        entries.into_iter().map(|(_, _, value)| value).collect()
    }

    /// Copy of the call journal.
    pub async fn journal(&self) -> Vec<JournalEntry> {
        self.journal.lock().await.clone()
    }

    /// Forgets all journaled calls (seeding, for instance).
    pub async fn clear_journal(&self) {
        self.journal.lock().await.clear();
    }

    /// Loads resources into the store.
    ///
    /// Each resource must carry `resourceType`; a numeric `id` is kept,
    /// anything else gets a freshly allocated id. Returns `Type/id` for each.
    pub async fn seed(&self, resources: &[Value]) -> StorageResult<Vec<String>> {
        let mut keys = Vec::with_capacity(resources.len());
        for resource in resources {
            let resource_type = resource
                .get("resourceType")
                .and_then(Value::as_str)
                .ok_or_else(|| StorageError::invalid_resource("seed resource without resourceType"))?;
            let id = resource
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| parse_numeric_id(id).is_ok());
            let id = self.put(resource_type, resource, id).await?;
            keys.push(make_storage_key(resource_type, &id));
        }
        Ok(keys)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}
