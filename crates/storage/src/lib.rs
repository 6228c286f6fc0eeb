pub mod error;
pub mod file;
pub mod ids;
pub mod memory;
pub mod sqlite;

use serde_json::Value;
use snafu::{ResultExt, ensure};

pub use error::{StorageError, StorageResult};
pub use file::JsonFileStore;
pub use ids::{ConversationId, SiteId};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use error::{InvalidNamespaceSnafu, MalformedPayloadSnafu, NotAnArraySnafu, SerializePayloadSnafu};

/// Namespaced record persistence.
///
/// Every namespace holds one ordered list of JSON records that is read and
/// replaced as a whole. A namespace that was never written reads as empty.
pub trait DurableStore: Send + Sync {
    fn read_all(&self, namespace: &str) -> StorageResult<Vec<Value>>;
    fn write_all(&self, namespace: &str, records: &[Value]) -> StorageResult<()>;
}

/// Rejects namespaces that cannot double as file names or table keys.
pub fn validate_namespace(namespace: &str, stage: &'static str) -> StorageResult<()> {
    ensure!(
        !namespace.is_empty(),
        InvalidNamespaceSnafu {
            stage,
            namespace,
            details: "namespace is empty",
        }
    );
    ensure!(
        namespace
            .chars()
            .all(|character| character.is_ascii_alphanumeric() || matches!(character, '_' | '-')),
        InvalidNamespaceSnafu {
            stage,
            namespace,
            details: "namespace may only contain ASCII letters, digits, '_' and '-'",
        }
    );
    Ok(())
}

pub(crate) fn decode_payload(namespace: &str, payload: &str) -> StorageResult<Vec<Value>> {
    if payload.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: Value = serde_json::from_str(payload).context(MalformedPayloadSnafu {
        stage: "decode-payload",
        namespace,
    })?;

    match value {
        Value::Array(records) => Ok(records),
        _ => NotAnArraySnafu {
            stage: "decode-payload-shape",
            namespace,
        }
        .fail(),
    }
}

pub(crate) fn encode_payload(namespace: &str, records: &[Value]) -> StorageResult<String> {
    serde_json::to_string(records).context(SerializePayloadSnafu {
        stage: "encode-payload",
        namespace,
    })
}
