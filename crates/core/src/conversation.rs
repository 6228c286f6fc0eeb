use std::fmt;

use serde::{Deserialize, Serialize};
use sitechat_storage::{ConversationId, SiteId};

/// Lead-funnel classification of a conversation, ordered by escalation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Conversation,
    Lead,
    Booking,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversation => "conversation",
            Self::Lead => "lead",
            Self::Booking => "booking",
        }
    }

    pub fn rank(&self) -> u8 {
        match self {
            Self::Conversation => 0,
            Self::Lead => 1,
            Self::Booking => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    Visitor,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn visitor(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Visitor,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Best-effort visitor identity gathered from hints and message text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VisitorInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl VisitorInfo {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }

    /// Fills fields that are still unknown; known fields are kept.
    pub fn fill_missing(&mut self, other: VisitorInfo) {
        if self.name.is_none() {
            self.name = other.name;
        }
        if self.email.is_none() {
            self.email = other.email;
        }
    }

    /// Takes every field `other` knows, keeping ours where it does not.
    pub fn override_with(&mut self, other: VisitorInfo) {
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.email.is_some() {
            self.email = other.email;
        }
    }
}

/// One visitor chat thread bound to a site by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: ConversationId,
    pub site_id: SiteId,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub visitor_info: VisitorInfo,
    #[serde(default)]
    pub stage: Stage,
    pub created_at_unix_millis: u64,
    pub updated_at_unix_millis: u64,
}

impl Conversation {
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}
