use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use uuid::Uuid;

use super::error::{InvalidIdSnafu, StorageError, StorageResult};

// Macro keeps all ID wrappers structurally identical, so future migrations stay predictable.
macro_rules! define_storage_id {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(raw: Uuid) -> Self {
                Self(raw)
            }

            pub fn new_v7() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn parse(raw: &str) -> StorageResult<Self> {
                let parsed = Uuid::parse_str(raw).context(InvalidIdSnafu {
                    stage: "parse-storage-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = StorageError;

            fn from_str(raw: &str) -> StorageResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_storage_id!(SiteId, "site-id");
define_storage_id!(ConversationId, "conversation-id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_display_output() {
        let id = SiteId::new_v7();
        let parsed = SiteId::parse(&id.to_string()).expect("display output should parse");
        assert_eq!(parsed, id);
    }

    #[test]
    fn parse_rejects_garbage_with_id_type() {
        let error = ConversationId::parse("not-a-uuid").expect_err("garbage must not parse");
        match error {
            StorageError::InvalidId { id_type, raw, .. } => {
                assert_eq!(id_type, "conversation-id");
                assert_eq!(raw, "not-a-uuid");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = SiteId::new_v7();
        let value = serde_json::to_value(id).expect("id serializes");
        assert_eq!(value, serde_json::Value::String(id.to_string()));
    }
}
