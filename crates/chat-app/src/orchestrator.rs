use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sitechat_core::{
    ChatMessage, ChatSessionStore, Conversation, CoreError, MessageRole, SiteContent,
    SiteRegistry, synthesize,
};
use sitechat_llm::{CompletionProvider, CompletionRequest, ProviderError, ProviderMessage, Role};
use sitechat_storage::{ConversationId, SiteId};
use snafu::{ResultExt, Snafu};

use crate::settings::{DEFAULT_COMPLETION_TIMEOUT_SECS, DEFAULT_FALLBACK_REPLY, Settings};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum OrchestratorError {
    #[snafu(display("conversation store failed on `{stage}`: {source}"))]
    Core {
        stage: &'static str,
        source: CoreError,
    },
    #[snafu(display("completion unavailable on `{stage}`: {source}"))]
    CompletionUnavailable {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("completion timed out after {timeout_secs}s on `{stage}`"))]
    CompletionTimedOut {
        stage: &'static str,
        timeout_secs: u64,
    },
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Knobs for one assistant turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub model_id: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u64>,
    pub timeout: Duration,
    pub fallback_reply: String,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            model_id: String::new(),
            temperature: None,
            max_tokens: None,
            timeout: Duration::from_secs(DEFAULT_COMPLETION_TIMEOUT_SECS),
            fallback_reply: DEFAULT_FALLBACK_REPLY.to_string(),
        }
    }
}

impl ChatOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model_id: settings.provider.model_name.clone(),
            temperature: settings.provider.temperature,
            max_tokens: settings.provider.max_tokens,
            timeout: settings.chat.completion_timeout(),
            fallback_reply: settings.chat.fallback_reply.clone(),
        }
    }
}

#[derive(Debug)]
pub enum ReplyOutcome {
    Answered,
    /// The configured fallback was appended instead of a completion.
    Fallback { reason: OrchestratorError },
    /// Nothing was appended after the visitor message.
    Cancelled,
}

#[derive(Debug)]
pub struct Reply {
    pub conversation: Conversation,
    pub outcome: ReplyOutcome,
}

/// Turns visitor input into an assistant turn for one site.
pub struct ChatOrchestrator {
    registry: SiteRegistry,
    sessions: ChatSessionStore,
    provider: Arc<dyn CompletionProvider>,
    options: ChatOptions,
}

impl ChatOrchestrator {
    pub fn new(
        registry: SiteRegistry,
        sessions: ChatSessionStore,
        provider: Arc<dyn CompletionProvider>,
        mut options: ChatOptions,
    ) -> Self {
        if options.model_id.trim().is_empty() {
            options.model_id = provider.default_model().to_string();
        }

        Self {
            registry,
            sessions,
            provider,
            options,
        }
    }

    pub fn registry(&self) -> &SiteRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &ChatSessionStore {
        &self.sessions
    }

    pub fn options(&self) -> &ChatOptions {
        &self.options
    }

    /// Allocates an id for a conversation on `site_id`; the record itself is
    /// created by the first message.
    pub fn start_conversation(&self, site_id: SiteId) -> ConversationId {
        let conversation_id = ConversationId::new_v7();
        tracing::debug!(
            conversation_id = %conversation_id,
            site_id = %site_id,
            "allocated conversation id"
        );
        conversation_id
    }

    pub async fn send(
        &self,
        conversation_id: ConversationId,
        site_id: SiteId,
        text: &str,
    ) -> OrchestratorResult<Reply> {
        self.send_with_cancel(conversation_id, site_id, text, std::future::pending())
            .await
    }

    /// Like [`Self::send`], but gives up on the completion once `cancel`
    /// resolves.
    pub async fn send_with_cancel<C>(
        &self,
        conversation_id: ConversationId,
        site_id: SiteId,
        text: &str,
        cancel: C,
    ) -> OrchestratorResult<Reply>
    where
        C: Future<Output = ()>,
    {
        let conversation = self
            .sessions
            .append(conversation_id, site_id, ChatMessage::visitor(text), None)
            .context(CoreSnafu {
                stage: "append-visitor-message",
            })?;

        let request = self.build_request(&conversation);
        let completion = tokio::time::timeout(self.options.timeout, self.provider.complete(request));

        let result = tokio::select! {
            biased;
            () = cancel => {
                tracing::info!(
                    conversation_id = %conversation_id,
                    "completion cancelled, conversation left unchanged"
                );
                return Ok(Reply {
                    conversation,
                    outcome: ReplyOutcome::Cancelled,
                });
            }
            result = completion => result,
        };

        let (reply_text, outcome) = match result {
            Ok(Ok(text)) => (text, ReplyOutcome::Answered),
            Ok(Err(source)) => {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    provider = self.provider.id(),
                    "completion failed, sending fallback reply: {source}"
                );
                let reason = OrchestratorError::CompletionUnavailable {
                    stage: "complete-reply",
                    source,
                };
                (self.options.fallback_reply.clone(), ReplyOutcome::Fallback { reason })
            }
            Err(_elapsed) => {
                let timeout_secs = self.options.timeout.as_secs();
                tracing::warn!(
                    conversation_id = %conversation_id,
                    timeout_secs,
                    "completion timed out, sending fallback reply"
                );
                let reason = OrchestratorError::CompletionTimedOut {
                    stage: "complete-reply",
                    timeout_secs,
                };
                (self.options.fallback_reply.clone(), ReplyOutcome::Fallback { reason })
            }
        };

        let conversation = self
            .sessions
            .append(
                conversation_id,
                conversation.site_id,
                ChatMessage::assistant(reply_text),
                None,
            )
            .context(CoreSnafu {
                stage: "append-assistant-message",
            })?;

        Ok(Reply {
            conversation,
            outcome,
        })
    }

    fn build_request(&self, conversation: &Conversation) -> CompletionRequest {
        let preamble = match self.registry.get(conversation.site_id) {
            Some(site) => synthesize(&site.content, &site.services),
            None => {
                tracing::warn!(
                    conversation_id = %conversation.id,
                    site_id = %conversation.site_id,
                    "conversation site is gone, using a bare system prompt"
                );
                synthesize(&SiteContent::default(), &[])
            }
        };

        let messages = conversation
            .messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    MessageRole::Visitor => Role::User,
                    MessageRole::Assistant => Role::Assistant,
                };
                ProviderMessage::new(role, message.content.clone())
            })
            .collect();

        let mut request =
            CompletionRequest::new(self.options.model_id.clone(), messages).with_preamble(preamble);
        if let Some(temperature) = self.options.temperature {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.options.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }
        request
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use sitechat_core::{EventBroadcaster, HeroContent, NewSite, Service, Stage};
    use sitechat_llm::{BoxFuture, ProviderResult};
    use sitechat_storage::{DurableStore, MemoryStore};

    use super::*;

    /// Replays queued replies in order; an empty queue answers `MissingApiKey`.
    pub(crate) struct ScriptedProvider {
        replies: Mutex<VecDeque<String>>,
        delay: Option<Duration>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedProvider {
        pub(crate) fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|reply| reply.to_string()).collect()),
                delay: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn failing() -> Self {
            Self::new(&[])
        }

        pub(crate) fn delayed(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    impl CompletionProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "Scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        fn complete<'a>(
            &'a self,
            request: CompletionRequest,
        ) -> BoxFuture<'a, ProviderResult<String>> {
            Box::pin(async move {
                self.requests.lock().expect("requests lock").push(request);
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                let next = self.replies.lock().expect("replies lock").pop_front();
                next.ok_or(ProviderError::MissingApiKey {
                    stage: "scripted-complete",
                    provider_id: "scripted".to_string(),
                })
            })
        }
    }

    fn orchestrator(
        provider: Arc<ScriptedProvider>,
        timeout: Duration,
    ) -> (ChatOrchestrator, SiteId) {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        let events = EventBroadcaster::new();
        let registry = SiteRegistry::new(Arc::clone(&store), events.clone());
        let sessions = ChatSessionStore::new(store, events);
        let site = registry
            .create(
                NewSite::named("Acme Plumbing")
                    .with_content(SiteContent {
                        hero: HeroContent {
                            title: Some("Acme Plumbing".to_string()),
                            ..HeroContent::default()
                        },
                        ..SiteContent::default()
                    })
                    .with_services(vec![Service::new("Leak repair", "Same-day fixes")]),
            )
            .expect("create site");

        let options = ChatOptions {
            timeout,
            fallback_reply: "We'll get back to you shortly.".to_string(),
            ..ChatOptions::default()
        };
        (
            ChatOrchestrator::new(registry, sessions, provider, options),
            site.id,
        )
    }

    #[tokio::test]
    async fn answered_turn_appends_both_messages() {
        let provider = Arc::new(ScriptedProvider::new(&["Hello! How can I help?"]));
        let (orchestrator, site_id) = orchestrator(Arc::clone(&provider), Duration::from_secs(5));
        let conversation_id = orchestrator.start_conversation(site_id);

        let reply = orchestrator
            .send(conversation_id, site_id, "Hi there")
            .await
            .expect("send");

        assert!(matches!(reply.outcome, ReplyOutcome::Answered));
        let contents: Vec<_> = reply
            .conversation
            .messages
            .iter()
            .map(|message| (message.role, message.content.as_str()))
            .collect();
        assert_eq!(
            contents,
            vec![
                (MessageRole::Visitor, "Hi there"),
                (MessageRole::Assistant, "Hello! How can I help?"),
            ]
        );

        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model_id, "scripted-model");
        let preamble = requests[0].preamble.as_deref().expect("preamble");
        assert!(preamble.contains("Acme Plumbing"));
        assert!(preamble.contains("Leak repair"));
        assert_eq!(requests[0].messages.len(), 1);
        assert_eq!(requests[0].messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn provider_failure_appends_single_fallback() {
        let provider = Arc::new(ScriptedProvider::failing());
        let (orchestrator, site_id) = orchestrator(provider, Duration::from_secs(5));
        let conversation_id = orchestrator.start_conversation(site_id);

        let reply = orchestrator
            .send(conversation_id, site_id, "I'd like to book an appointment")
            .await
            .expect("send");

        assert!(matches!(
            reply.outcome,
            ReplyOutcome::Fallback {
                reason: OrchestratorError::CompletionUnavailable { .. }
            }
        ));
        assert_eq!(reply.conversation.messages.len(), 2);
        assert_eq!(
            reply.conversation.last_message().map(|m| m.content.as_str()),
            Some("We'll get back to you shortly.")
        );
        assert_eq!(reply.conversation.stage, Stage::Booking);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_into_fallback() {
        let provider =
            Arc::new(ScriptedProvider::new(&["too late"]).delayed(Duration::from_secs(60)));
        let (orchestrator, site_id) = orchestrator(provider, Duration::from_secs(2));
        let conversation_id = orchestrator.start_conversation(site_id);

        let reply = orchestrator
            .send(conversation_id, site_id, "Hello")
            .await
            .expect("send");

        assert!(matches!(
            reply.outcome,
            ReplyOutcome::Fallback {
                reason: OrchestratorError::CompletionTimedOut { timeout_secs: 2, .. }
            }
        ));
        let stored = orchestrator
            .sessions()
            .get(conversation_id)
            .expect("stored conversation");
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.messages[1].content, "We'll get back to you shortly.");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_appends_no_assistant_message() {
        let provider =
            Arc::new(ScriptedProvider::new(&["never seen"]).delayed(Duration::from_secs(10)));
        let (orchestrator, site_id) = orchestrator(provider, Duration::from_secs(30));
        let conversation_id = orchestrator.start_conversation(site_id);

        let reply = orchestrator
            .send_with_cancel(
                conversation_id,
                site_id,
                "Are you open on Sunday?",
                tokio::time::sleep(Duration::from_secs(1)),
            )
            .await
            .expect("send");

        assert!(matches!(reply.outcome, ReplyOutcome::Cancelled));
        let stored = orchestrator
            .sessions()
            .get(conversation_id)
            .expect("stored conversation");
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].role, MessageRole::Visitor);
    }

    #[tokio::test]
    async fn follow_up_turn_sends_full_history() {
        let provider = Arc::new(ScriptedProvider::new(&["First answer", "Second answer"]));
        let (orchestrator, site_id) = orchestrator(Arc::clone(&provider), Duration::from_secs(5));
        let conversation_id = orchestrator.start_conversation(site_id);

        orchestrator
            .send(conversation_id, site_id, "Question one")
            .await
            .expect("first send");
        orchestrator
            .send(conversation_id, site_id, "Question two")
            .await
            .expect("second send");

        let requests = provider.requests();
        let roles: Vec<_> = requests[1].messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    }

    #[tokio::test]
    async fn orphaned_conversation_still_gets_a_reply() {
        let provider = Arc::new(ScriptedProvider::new(&["Still here"]));
        let (orchestrator, _site_id) = orchestrator(Arc::clone(&provider), Duration::from_secs(5));
        let missing_site = SiteId::new_v7();
        let conversation_id = orchestrator.start_conversation(missing_site);

        let reply = orchestrator
            .send(conversation_id, missing_site, "Hello?")
            .await
            .expect("send");

        assert!(matches!(reply.outcome, ReplyOutcome::Answered));
        let preamble = provider.requests()[0].preamble.clone().expect("preamble");
        assert!(!preamble.contains("Acme Plumbing"));
    }
}
