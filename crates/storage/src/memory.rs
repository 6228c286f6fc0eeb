use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::error::{InvariantViolationSnafu, StorageResult};
use super::{DurableStore, decode_payload, encode_payload, validate_namespace};

/// Process-local store that keeps each namespace as serialized JSON text.
///
/// Records go through the same encode/decode path as the persistent backends,
/// so anything that survives here survives a reload elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    namespaces: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the raw payload of a namespace, bypassing encoding.
    pub fn put_raw(&self, namespace: &str, payload: impl Into<String>) -> StorageResult<()> {
        validate_namespace(namespace, "memory-put-raw")?;
        self.lock("memory-put-raw")?
            .insert(namespace.to_string(), payload.into());
        Ok(())
    }

    fn lock(&self, stage: &'static str) -> StorageResult<MutexGuard<'_, HashMap<String, String>>> {
        match self.namespaces.lock() {
            Ok(guard) => Ok(guard),
            Err(_) => InvariantViolationSnafu {
                stage,
                details: "memory store lock was poisoned".to_string(),
            }
            .fail(),
        }
    }
}

impl DurableStore for MemoryStore {
    fn read_all(&self, namespace: &str) -> StorageResult<Vec<Value>> {
        validate_namespace(namespace, "memory-read-all")?;
        let payload = self.lock("memory-read-all")?.get(namespace).cloned();
        match payload {
            Some(payload) => decode_payload(namespace, &payload),
            None => Ok(Vec::new()),
        }
    }

    fn write_all(&self, namespace: &str, records: &[Value]) -> StorageResult<()> {
        validate_namespace(namespace, "memory-write-all")?;
        let payload = encode_payload(namespace, records)?;
        self.lock("memory-write-all")?
            .insert(namespace.to_string(), payload);
        Ok(())
    }
}
