use std::path::{Path, PathBuf};

use serde_json::Value;
use snafu::ResultExt;

use super::error::{
    CreateStoreDirectorySnafu, ReadStoreFileSnafu, RenameStoreFileSnafu, StorageResult,
    WriteStoreFileSnafu,
};
use super::{DurableStore, decode_payload, encode_payload, validate_namespace};

const NAMESPACE_FILE_EXTENSION: &str = "json";

/// Directory-backed store with one `<namespace>.json` file per namespace.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.root
            .join(namespace)
            .with_extension(NAMESPACE_FILE_EXTENSION)
    }
}

impl DurableStore for JsonFileStore {
    fn read_all(&self, namespace: &str) -> StorageResult<Vec<Value>> {
        validate_namespace(namespace, "file-read-all")?;
        let path = self.namespace_path(namespace);

        let payload = match std::fs::read_to_string(&path) {
            Ok(payload) => payload,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(source).context(ReadStoreFileSnafu {
                    stage: "file-read-all",
                    path: display_path(&path),
                });
            }
        };

        decode_payload(namespace, &payload)
    }

    fn write_all(&self, namespace: &str, records: &[Value]) -> StorageResult<()> {
        validate_namespace(namespace, "file-write-all")?;
        std::fs::create_dir_all(&self.root).context(CreateStoreDirectorySnafu {
            stage: "file-create-root",
            path: display_path(&self.root),
        })?;

        let payload = encode_payload(namespace, records)?;
        let path = self.namespace_path(namespace);
        let temp_path = path.with_extension("json.tmp");

        // Readers only ever observe a complete previous or next payload.
        std::fs::write(&temp_path, payload).context(WriteStoreFileSnafu {
            stage: "file-write-temporary",
            path: display_path(&temp_path),
        })?;
        std::fs::rename(&temp_path, &path).context(RenameStoreFileSnafu {
            stage: "file-rename-temporary",
            from: display_path(&temp_path),
            to: display_path(&path),
        })?;

        tracing::debug!(
            namespace,
            record_count = records.len(),
            path = %path.display(),
            "wrote namespace file"
        );
        Ok(())
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
