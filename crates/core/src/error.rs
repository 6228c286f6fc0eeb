use snafu::Snafu;
use sitechat_storage::StorageError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CoreError {
    #[snafu(display("{entity} '{id}' was not found"))]
    NotFound {
        stage: &'static str,
        entity: &'static str,
        id: String,
    },
    #[snafu(display("conflict for {entity}: {details}"))]
    Conflict {
        stage: &'static str,
        entity: &'static str,
        details: String,
    },
    #[snafu(display("records in namespace '{namespace}' failed to (de)serialize on `{stage}`: {source}"))]
    SerializationFailure {
        stage: &'static str,
        namespace: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to read namespace '{namespace}' on `{stage}`: {source}"))]
    Load {
        stage: &'static str,
        namespace: &'static str,
        source: StorageError,
    },
    #[snafu(display("failed to persist namespace '{namespace}' on `{stage}`: {source}"))]
    Persist {
        stage: &'static str,
        namespace: &'static str,
        source: StorageError,
    },
}

impl CoreError {
    /// Unknown ids and refused deletions are expected outcomes, not faults.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Conflict { .. })
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Turns the recoverable outcomes of a checked operation into `fallback`.
pub(crate) fn recover<T>(result: CoreResult<T>, fallback: T) -> CoreResult<T> {
    match result {
        Err(error) if error.is_recoverable() => {
            tracing::debug!(error = %error, "operation refused");
            Ok(fallback)
        }
        other => other,
    }
}
