use std::cmp::Ordering;
use std::sync::Arc;

use sitechat_storage::{ConversationId, DurableStore, SiteId};
use snafu::OptionExt;

use super::classifier::classify;
use super::conversation::{ChatMessage, Conversation, MessageRole, Stage, VisitorInfo};
use super::error::{CoreResult, NotFoundSnafu, recover};
use super::events::{EventBroadcaster, Topic};
use super::records::{
    CONVERSATIONS_NAMESPACE, load_namespace, load_namespace_checked, now_unix_millis,
    save_namespace,
};
use super::visitor::extract_visitor_info;

/// Visitor conversations, each bound to one site by id.
#[derive(Clone)]
pub struct ChatSessionStore {
    store: Arc<dyn DurableStore>,
    events: EventBroadcaster,
}

impl ChatSessionStore {
    pub fn new(store: Arc<dyn DurableStore>, events: EventBroadcaster) -> Self {
        Self { store, events }
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Every conversation, newest first.
    pub fn list(&self) -> Vec<Conversation> {
        let mut conversations: Vec<Conversation> =
            load_namespace(self.store.as_ref(), CONVERSATIONS_NAMESPACE);
        conversations.sort_by(sort_by_recent_desc);
        conversations
    }

    pub fn list_by_site(&self, site_id: SiteId) -> Vec<Conversation> {
        self.list()
            .into_iter()
            .filter(|conversation| conversation.site_id == site_id)
            .collect()
    }

    pub fn list_by_stage(&self, site_id: SiteId, stage: Stage) -> Vec<Conversation> {
        self.list_by_site(site_id)
            .into_iter()
            .filter(|conversation| conversation.stage == stage)
            .collect()
    }

    pub fn get(&self, conversation_id: ConversationId) -> Option<Conversation> {
        load_namespace::<Conversation>(self.store.as_ref(), CONVERSATIONS_NAMESPACE)
            .into_iter()
            .find(|conversation| conversation.id == conversation_id)
    }

    /// Appends one message, creating the conversation on first use.
    ///
    /// `site_id` only binds a new conversation; an existing one keeps its site.
    /// Hint fields replace what is known about the visitor, while names and
    /// emails found in visitor text only fill gaps.
    pub fn append(
        &self,
        conversation_id: ConversationId,
        site_id: SiteId,
        message: ChatMessage,
        visitor_hint: Option<VisitorInfo>,
    ) -> CoreResult<Conversation> {
        let mut conversations: Vec<Conversation> =
            load_namespace_checked(self.store.as_ref(), CONVERSATIONS_NAMESPACE)?;
        let now = now_unix_millis();

        let index = match conversations
            .iter()
            .position(|conversation| conversation.id == conversation_id)
        {
            Some(index) => index,
            None => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    site_id = %site_id,
                    "starting conversation"
                );
                conversations.push(Conversation {
                    id: conversation_id,
                    site_id,
                    messages: Vec::new(),
                    visitor_info: VisitorInfo::default(),
                    stage: Stage::Conversation,
                    created_at_unix_millis: now,
                    updated_at_unix_millis: now,
                });
                conversations.len() - 1
            }
        };

        let conversation = &mut conversations[index];
        if conversation.site_id != site_id {
            tracing::debug!(
                conversation_id = %conversation_id,
                bound_site_id = %conversation.site_id,
                requested_site_id = %site_id,
                "conversation keeps its original site"
            );
        }

        if let Some(hint) = visitor_hint {
            conversation.visitor_info.override_with(hint);
        }
        if message.role == MessageRole::Visitor {
            conversation
                .visitor_info
                .fill_missing(extract_visitor_info(&message.content));
        }

        conversation.messages.push(message);
        let previous_stage = conversation.stage;
        conversation.stage = classify(&conversation.messages);
        conversation.updated_at_unix_millis = now.max(conversation.updated_at_unix_millis);
        let snapshot = conversation.clone();

        save_namespace(self.store.as_ref(), CONVERSATIONS_NAMESPACE, &conversations)?;
        if snapshot.stage != previous_stage {
            tracing::info!(
                conversation_id = %conversation_id,
                site_id = %snapshot.site_id,
                from = %previous_stage,
                to = %snapshot.stage,
                "conversation stage changed"
            );
        }
        self.events.publish(Topic::ConversationChanged);
        Ok(snapshot)
    }

    /// Removes a conversation. Returns `false` for an unknown id.
    pub fn delete(&self, conversation_id: ConversationId) -> CoreResult<bool> {
        recover(self.delete_checked(conversation_id).map(|()| true), false)
    }

    pub fn delete_checked(&self, conversation_id: ConversationId) -> CoreResult<()> {
        let mut conversations: Vec<Conversation> =
            load_namespace_checked(self.store.as_ref(), CONVERSATIONS_NAMESPACE)?;
        let index = conversations
            .iter()
            .position(|conversation| conversation.id == conversation_id)
            .context(NotFoundSnafu {
                stage: "conversation-delete-find",
                entity: "conversation",
                id: conversation_id.to_string(),
            })?;

        conversations.remove(index);
        save_namespace(self.store.as_ref(), CONVERSATIONS_NAMESPACE, &conversations)?;
        tracing::info!(conversation_id = %conversation_id, "deleted conversation");
        self.events.publish(Topic::ConversationChanged);
        Ok(())
    }
}

fn sort_by_recent_desc(left: &Conversation, right: &Conversation) -> Ordering {
    right
        .updated_at_unix_millis
        .cmp(&left.updated_at_unix_millis)
        .then_with(|| right.id.cmp(&left.id))
}
