use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use sitechat_storage::{DurableStore, MemoryStore, StorageError, StorageResult};

/// Memory store whose reads can be switched to fail with an I/O error.
pub(crate) struct FailingReadStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FailingReadStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
        }
    }

    pub(crate) fn fail_reads(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl DurableStore for FailingReadStore {
    fn read_all(&self, namespace: &str) -> StorageResult<Vec<Value>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::ReadStoreFile {
                stage: "failing-read",
                path: format!("{namespace}.json"),
                source: std::io::Error::other("device unavailable"),
            });
        }
        self.inner.read_all(namespace)
    }

    fn write_all(&self, namespace: &str, records: &[Value]) -> StorageResult<()> {
        self.inner.write_all(namespace, records)
    }
}
