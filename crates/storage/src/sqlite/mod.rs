use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use snafu::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Connection, SqliteConnection};

use super::error::{
    CreateSqliteDirectorySnafu, InvariantViolationSnafu, SqliteConnectOptionsSnafu,
    SqliteConnectSnafu, SqliteMigrateSnafu, SqlitePragmaSnafu, SqliteQuerySnafu,
    SqliteRuntimeInitSnafu, SqliteThreadSpawnSnafu, StorageResult,
};
use super::{DurableStore, decode_payload, encode_payload, validate_namespace};

/// SQLite-backed store keeping one row per namespace.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    database_url: String,
}

impl SqliteStore {
    pub async fn open(database_location: &str) -> StorageResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "sqlite-open-migrate",
            })?;
        pool.close().await;

        tracing::info!(database_url = %database_url, "opened sqlite store");
        Ok(Self { database_url })
    }

    fn run_db_call<T, F>(&self, stage: &'static str, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: Future<Output = StorageResult<T>> + Send + 'static,
    {
        // Store traits are sync, so each call executes on a dedicated worker thread
        // with its own current-thread runtime to avoid nested-runtime blocking panics.
        let worker = std::thread::Builder::new()
            .name(format!("sqlite-store-{stage}"))
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .context(SqliteRuntimeInitSnafu {
                        stage: "sqlite-store-runtime-build",
                    })?;
                runtime.block_on(op)
            })
            .context(SqliteThreadSpawnSnafu {
                stage: "sqlite-store-spawn-worker",
            })?;

        match worker.join() {
            Ok(result) => result,
            Err(_) => InvariantViolationSnafu {
                stage,
                details: "sqlite storage worker thread panicked".to_string(),
            }
            .fail(),
        }
    }
}

impl DurableStore for SqliteStore {
    fn read_all(&self, namespace: &str) -> StorageResult<Vec<Value>> {
        validate_namespace(namespace, "sqlite-read-all")?;
        let database_url = self.database_url.clone();
        let key = namespace.to_string();
        let payload = self.run_db_call("namespace-read", async move {
            let mut connection =
                connect_store_connection(&database_url, "namespace-read-connect").await?;
            sqlx::query_scalar::<_, String>(
                "SELECT payload FROM kv_namespaces WHERE namespace = ?",
            )
            .bind(key)
            .fetch_optional(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "namespace-read-query",
            })
        })?;

        match payload {
            Some(payload) => decode_payload(namespace, &payload),
            None => Ok(Vec::new()),
        }
    }

    fn write_all(&self, namespace: &str, records: &[Value]) -> StorageResult<()> {
        validate_namespace(namespace, "sqlite-write-all")?;
        let payload = encode_payload(namespace, records)?;
        let database_url = self.database_url.clone();
        let key = namespace.to_string();
        self.run_db_call("namespace-write", async move {
            let mut connection =
                connect_store_connection(&database_url, "namespace-write-connect").await?;
            sqlx::query(
                "INSERT INTO kv_namespaces (namespace, payload, updated_at) VALUES (?, ?, ?) \
                 ON CONFLICT(namespace) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(payload)
            .bind(unix_timestamp_seconds())
            .execute(&mut connection)
            .await
            .context(SqliteQuerySnafu {
                stage: "namespace-write-upsert",
            })?;
            Ok(())
        })
    }
}

async fn connect_store_connection(
    database_url: &str,
    stage: &'static str,
) -> StorageResult<SqliteConnection> {
    let mut connection =
        SqliteConnection::connect(database_url)
            .await
            .context(SqliteConnectSnafu {
                stage,
                database_url: database_url.to_string(),
            })?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(&mut connection)
        .await
        .context(SqlitePragmaSnafu {
            stage: "sqlite-store-pragma-busy-timeout",
            pragma: "busy_timeout",
        })?;

    Ok(connection)
}

fn unix_timestamp_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0_i64, |duration| duration.as_secs() as i64)
}

fn ensure_database_directory(database_location: &str) -> StorageResult<()> {
    if database_location.starts_with("sqlite:") {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

// In-memory sqlite is not offered: every store call opens its own connection.
fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    format!("sqlite://{database_location}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn namespaces_round_trip_through_sqlite() {
        let directory = tempfile::tempdir().expect("tempdir");
        let location = directory.path().join("sitechat.db");
        let store = SqliteStore::open(&location.display().to_string())
            .await
            .expect("open sqlite store");

        assert!(store.read_all("sites").expect("read").is_empty());

        let first = vec![json!({ "id": "a", "design": { "colorScheme": "ocean" } })];
        store.write_all("sites", &first).expect("first write");
        let second = vec![json!({ "id": "a" }), json!({ "id": "b" })];
        store.write_all("sites", &second).expect("second write");

        assert_eq!(store.read_all("sites").expect("read"), second);
        assert!(store.read_all("conversations").expect("read").is_empty());
    }

    #[tokio::test]
    async fn reopening_runs_migrations_idempotently() {
        let directory = tempfile::tempdir().expect("tempdir");
        let location = directory.path().join("data").join("sitechat.db");
        let location = location.display().to_string();

        let store = SqliteStore::open(&location).await.expect("first open");
        store
            .write_all("active_site", &[json!("site-1")])
            .expect("write pointer");

        let reopened = SqliteStore::open(&location).await.expect("second open");
        assert_eq!(
            reopened.read_all("active_site").expect("read"),
            vec![json!("site-1")]
        );
    }

    #[test]
    fn database_urls_are_normalized() {
        assert_eq!(normalize_database_url("sqlite://x.db"), "sqlite://x.db");
        assert_eq!(normalize_database_url("/tmp/x.db"), "sqlite:///tmp/x.db");
    }
}
