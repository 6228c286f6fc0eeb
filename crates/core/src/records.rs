use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sitechat_storage::DurableStore;
use snafu::ResultExt;

use super::error::{CoreResult, LoadSnafu, PersistSnafu, SerializationFailureSnafu};

pub const SITES_NAMESPACE: &str = "sites";
pub const CONVERSATIONS_NAMESPACE: &str = "conversations";
pub const ACTIVE_SITE_NAMESPACE: &str = "active_site";

/// Loads every record of a namespace for a caller that will write it back.
///
/// A payload that was read but cannot be decoded comes back empty, and the next
/// write replaces it. A failed read is an error, so the caller never writes a
/// partial collection over records it could not see.
pub(crate) fn load_namespace_checked<T>(
    store: &dyn DurableStore,
    namespace: &'static str,
) -> CoreResult<Vec<T>>
where
    T: DeserializeOwned,
{
    let values = match store.read_all(namespace) {
        Ok(values) => values,
        Err(error) if error.is_malformed_payload() => {
            tracing::warn!(
                namespace,
                error = %error,
                "namespace payload is malformed; falling back to an empty collection"
            );
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(source).context(LoadSnafu {
                stage: "read-namespace",
                namespace,
            });
        }
    };

    match decode_records(namespace, values) {
        Ok(records) => Ok(records),
        Err(error) => {
            tracing::warn!(
                namespace,
                error = %error,
                "namespace holds malformed records; falling back to an empty collection"
            );
            Ok(Vec::new())
        }
    }
}

/// Loads every record of a namespace for display, reading empty on any failure.
pub(crate) fn load_namespace<T>(store: &dyn DurableStore, namespace: &'static str) -> Vec<T>
where
    T: DeserializeOwned,
{
    load_namespace_checked(store, namespace).unwrap_or_else(|error| {
        tracing::warn!(
            namespace,
            error = %error,
            "failed to read namespace; showing an empty collection"
        );
        Vec::new()
    })
}

pub(crate) fn decode_records<T>(namespace: &'static str, values: Vec<Value>) -> CoreResult<Vec<T>>
where
    T: DeserializeOwned,
{
    values
        .into_iter()
        .map(|value| {
            serde_json::from_value(value).context(SerializationFailureSnafu {
                stage: "decode-record",
                namespace,
            })
        })
        .collect()
}

pub(crate) fn save_namespace<T>(
    store: &dyn DurableStore,
    namespace: &'static str,
    records: &[T],
) -> CoreResult<()>
where
    T: Serialize,
{
    let values = records
        .iter()
        .map(|record| {
            serde_json::to_value(record).context(SerializationFailureSnafu {
                stage: "encode-record",
                namespace,
            })
        })
        .collect::<CoreResult<Vec<_>>>()?;

    store.write_all(namespace, &values).context(PersistSnafu {
        stage: "write-namespace",
        namespace,
    })
}

pub(crate) fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

/// Trims a free-text field and drops it when nothing is left.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
