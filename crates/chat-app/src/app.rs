use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sitechat_core::{
    ChatSessionStore, CoreError, EventBroadcaster, NewSite, SiteRegistry, Subscription, Topic,
};
use sitechat_llm::{
    BoxFuture, CompletionProvider, CompletionRequest, ProviderError, ProviderResult,
    create_provider,
};
use sitechat_storage::{
    ConversationId, DurableStore, JsonFileStore, MemoryStore, SqliteStore, StorageError,
};
use snafu::{ResultExt, Snafu};

use crate::orchestrator::{ChatOptions, ChatOrchestrator, OrchestratorError, ReplyOutcome};
use crate::settings::{Settings, StorageBackend, StorageSettings};

pub const DEFAULT_SITE_NAME: &str = "My Business";
const SQLITE_FILE_NAME: &str = "sitechat.db";

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to open {backend} store on `{stage}`: {source}"))]
    OpenStore {
        stage: &'static str,
        backend: &'static str,
        source: StorageError,
    },
    #[snafu(display("failed to create provider on `{stage}`: {source}"))]
    CreateProvider {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("site registry failed on `{stage}`: {source}"))]
    Registry {
        stage: &'static str,
        source: CoreError,
    },
    #[snafu(display("chat turn failed on `{stage}`: {source}"))]
    Chat {
        stage: &'static str,
        source: OrchestratorError,
    },
}

pub type AppResult<T> = Result<T, AppError>;

pub async fn open_store(settings: &StorageSettings) -> AppResult<Arc<dyn DurableStore>> {
    let store: Arc<dyn DurableStore> = match settings.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Json => Arc::new(JsonFileStore::new(settings.resolved_data_dir())),
        StorageBackend::Sqlite => {
            let path = settings.resolved_data_dir().join(SQLITE_FILE_NAME);
            let store = SqliteStore::open(&path.to_string_lossy())
                .await
                .context(OpenStoreSnafu {
                    stage: "open-sqlite-store",
                    backend: "sqlite",
                })?;
            Arc::new(store)
        }
    };

    tracing::info!(backend = ?settings.backend, "opened durable store");
    Ok(store)
}

/// Stands in when no API key is configured, so every turn falls back.
pub struct UnavailableProvider {
    provider_id: String,
}

impl UnavailableProvider {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
        }
    }
}

impl CompletionProvider for UnavailableProvider {
    fn id(&self) -> &str {
        &self.provider_id
    }

    fn name(&self) -> &str {
        "Unavailable"
    }

    fn default_model(&self) -> &str {
        ""
    }

    fn complete<'a>(&'a self, _request: CompletionRequest) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            Err(ProviderError::MissingApiKey {
                stage: "unavailable-provider",
                provider_id: self.provider_id.clone(),
            })
        })
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ShellOutput {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl ShellOutput {
    fn line(line: impl Into<String>) -> Self {
        Self {
            lines: vec![line.into()],
            quit: false,
        }
    }
}

/// Line-oriented front end serving the active site's chat.
pub struct ChatShell {
    orchestrator: ChatOrchestrator,
    conversation_id: Option<ConversationId>,
    active_site_changed: Arc<AtomicBool>,
    _subscriptions: Vec<Subscription>,
}

impl ChatShell {
    pub async fn bootstrap(settings: &Settings) -> AppResult<Self> {
        let store = open_store(&settings.storage).await?;
        let provider: Arc<dyn CompletionProvider> = match settings.provider.to_provider_config() {
            Some(config) => create_provider(config).context(CreateProviderSnafu {
                stage: "bootstrap-provider",
            })?,
            None => {
                tracing::warn!("no API key configured, every reply will use the fallback text");
                Arc::new(UnavailableProvider::new(settings.provider.provider_id.clone()))
            }
        };

        Self::new(store, provider, ChatOptions::from_settings(settings))
    }

    pub fn new(
        store: Arc<dyn DurableStore>,
        provider: Arc<dyn CompletionProvider>,
        options: ChatOptions,
    ) -> AppResult<Self> {
        let events = EventBroadcaster::new();
        let registry = SiteRegistry::new(Arc::clone(&store), events.clone());
        let sessions = ChatSessionStore::new(store, events.clone());

        let mut subscriptions: Vec<Subscription> = Topic::ALL
            .into_iter()
            .map(|topic| {
                events.subscribe(topic, |topic| {
                    tracing::debug!(topic = %topic, "state changed");
                })
            })
            .collect();

        let active_site_changed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&active_site_changed);
        subscriptions.push(events.subscribe(Topic::ActiveSiteChanged, move |_| {
            flag.store(true, Ordering::SeqCst);
        }));

        if registry.list().is_empty() {
            let site = registry
                .create(NewSite::named(DEFAULT_SITE_NAME))
                .context(RegistrySnafu {
                    stage: "create-default-site",
                })?;
            tracing::info!(site_id = %site.id, url_path = %site.url_path, "created default site");
        }

        Ok(Self {
            orchestrator: ChatOrchestrator::new(registry, sessions, provider, options),
            conversation_id: None,
            active_site_changed,
            _subscriptions: subscriptions,
        })
    }

    pub fn orchestrator(&self) -> &ChatOrchestrator {
        &self.orchestrator
    }

    pub fn banner(&self) -> String {
        match self.orchestrator.registry().get_active() {
            Some(site) => format!(
                "Chatting as the assistant of \"{}\" ({}). Type /quit to leave.",
                site.name, site.url_path
            ),
            None => "No site available.".to_string(),
        }
    }

    pub async fn handle_line<C>(&mut self, line: &str, cancel: C) -> AppResult<ShellOutput>
    where
        C: Future<Output = ()>,
    {
        if self.active_site_changed.swap(false, Ordering::SeqCst) {
            self.conversation_id = None;
        }

        let line = line.trim();
        if line.is_empty() {
            return Ok(ShellOutput::default());
        }

        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, argument)) => (command, argument.trim()),
            None => (line, ""),
        };

        match command {
            "/quit" | "/exit" => Ok(ShellOutput {
                lines: Vec::new(),
                quit: true,
            }),
            "/sites" => Ok(self.list_sites()),
            "/use" => self.use_site(argument),
            "/new" => self.new_site(argument),
            "/delete" => self.delete_site(argument),
            "/conversations" => Ok(self.list_conversations()),
            _ if command.starts_with('/') => Ok(ShellOutput::line(format!(
                "unknown command {command}; try /sites, /use, /new, /delete, /conversations or /quit"
            ))),
            _ => self.chat(line, cancel).await,
        }
    }

    fn list_sites(&self) -> ShellOutput {
        let registry = self.orchestrator.registry();
        let active_id = registry.get_active().map(|site| site.id);
        let lines = registry
            .list()
            .into_iter()
            .map(|site| {
                let marker = if Some(site.id) == active_id { '*' } else { ' ' };
                format!("{marker} {} {}", site.url_path, site.name)
            })
            .collect();

        ShellOutput { lines, quit: false }
    }

    fn use_site(&mut self, url_path: &str) -> AppResult<ShellOutput> {
        let registry = self.orchestrator.registry();
        let Some(site) = registry.get_by_path(url_path) else {
            return Ok(ShellOutput::line(format!("no site at {url_path}")));
        };

        registry.set_active(site.id).context(RegistrySnafu {
            stage: "select-active-site",
        })?;
        self.conversation_id = None;
        Ok(ShellOutput::line(format!("now serving {}", site.name)))
    }

    fn new_site(&mut self, name: &str) -> AppResult<ShellOutput> {
        if name.is_empty() {
            return Ok(ShellOutput::line("usage: /new <name>"));
        }

        let site = self
            .orchestrator
            .registry()
            .create(NewSite::named(name))
            .context(RegistrySnafu {
                stage: "create-site",
            })?;
        self.conversation_id = None;
        Ok(ShellOutput::line(format!(
            "created {} at {}",
            site.name, site.url_path
        )))
    }

    fn delete_site(&mut self, url_path: &str) -> AppResult<ShellOutput> {
        let registry = self.orchestrator.registry();
        let Some(site) = registry.get_by_path(url_path) else {
            return Ok(ShellOutput::line(format!("no site at {url_path}")));
        };

        match registry.delete_checked(site.id) {
            Ok(()) => Ok(ShellOutput::line(format!("deleted {}", site.name))),
            Err(CoreError::Conflict { .. }) => {
                Ok(ShellOutput::line("the last site cannot be deleted"))
            }
            Err(source) => Err(AppError::Registry {
                stage: "delete-site",
                source,
            }),
        }
    }

    fn list_conversations(&self) -> ShellOutput {
        let Some(site) = self.orchestrator.registry().get_active() else {
            return ShellOutput::line("no active site");
        };

        let lines: Vec<String> = self
            .orchestrator
            .sessions()
            .list_by_site(site.id)
            .into_iter()
            .map(|conversation| {
                let visitor = [
                    conversation.visitor_info.name.as_deref(),
                    conversation.visitor_info.email.as_deref(),
                ]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ");
                format!(
                    "{} [{}] {} messages {}",
                    conversation.id,
                    conversation.stage,
                    conversation.messages.len(),
                    visitor
                )
                .trim_end()
                .to_string()
            })
            .collect();

        if lines.is_empty() {
            return ShellOutput::line("no conversations yet");
        }
        ShellOutput { lines, quit: false }
    }

    async fn chat<C>(&mut self, text: &str, cancel: C) -> AppResult<ShellOutput>
    where
        C: Future<Output = ()>,
    {
        let Some(site) = self.orchestrator.registry().get_active() else {
            return Ok(ShellOutput::line("no active site"));
        };

        let conversation_id = match self.conversation_id {
            Some(conversation_id) => conversation_id,
            None => {
                let conversation_id = self.orchestrator.start_conversation(site.id);
                self.conversation_id = Some(conversation_id);
                conversation_id
            }
        };

        let reply = self
            .orchestrator
            .send_with_cancel(conversation_id, site.id, text, cancel)
            .await
            .context(ChatSnafu { stage: "send-message" })?;

        let output = match reply.outcome {
            ReplyOutcome::Cancelled => ShellOutput::line("(cancelled)"),
            ReplyOutcome::Answered | ReplyOutcome::Fallback { .. } => ShellOutput::line(
                reply
                    .conversation
                    .last_message()
                    .map(|message| message.content.clone())
                    .unwrap_or_default(),
            ),
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::future::pending;
    use std::time::Duration;

    use sitechat_core::Stage;

    use super::*;
    use crate::orchestrator::tests::ScriptedProvider;

    fn shell(replies: &[&str]) -> (ChatShell, Arc<dyn DurableStore>) {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        let options = ChatOptions {
            timeout: Duration::from_secs(5),
            fallback_reply: "Please leave your email.".to_string(),
            ..ChatOptions::default()
        };
        let shell = ChatShell::new(
            Arc::clone(&store),
            Arc::new(ScriptedProvider::new(replies)),
            options,
        )
        .expect("shell");
        (shell, store)
    }

    #[test]
    fn empty_registry_gets_default_site() {
        let (shell, _store) = shell(&[]);
        let sites = shell.orchestrator().registry().list();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].name, DEFAULT_SITE_NAME);
        assert!(shell.banner().contains(DEFAULT_SITE_NAME));
    }

    #[test]
    fn existing_registry_is_left_alone() {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        let first = ChatShell::new(
            Arc::clone(&store),
            Arc::new(ScriptedProvider::new(&[])),
            ChatOptions::default(),
        )
        .expect("first shell");
        drop(first);

        let second = ChatShell::new(
            store,
            Arc::new(ScriptedProvider::new(&[])),
            ChatOptions::default(),
        )
        .expect("second shell");
        assert_eq!(second.orchestrator().registry().list().len(), 1);
    }

    #[tokio::test]
    async fn site_commands_create_select_and_delete() {
        let (mut shell, _store) = shell(&[]);

        let created = shell
            .handle_line("/new Acme Plumbing", pending())
            .await
            .expect("new");
        assert_eq!(created.lines, vec!["created Acme Plumbing at /acme-plumbing"]);

        let listed = shell.handle_line("/sites", pending()).await.expect("sites");
        assert_eq!(listed.lines.len(), 2);
        assert!(listed.lines.iter().any(|line| line.starts_with("* /acme-plumbing")));

        let switched = shell
            .handle_line("/use /my-business", pending())
            .await
            .expect("use");
        assert_eq!(switched.lines, vec!["now serving My Business"]);

        let deleted = shell
            .handle_line("/delete /my-business", pending())
            .await
            .expect("delete");
        assert_eq!(deleted.lines, vec!["deleted My Business"]);

        let refused = shell
            .handle_line("/delete /acme-plumbing", pending())
            .await
            .expect("delete last");
        assert_eq!(refused.lines, vec!["the last site cannot be deleted"]);
        assert_eq!(
            shell.orchestrator().registry().get_active().map(|site| site.name),
            Some("Acme Plumbing".to_string())
        );
    }

    #[tokio::test]
    async fn messages_share_one_conversation_until_site_changes() {
        let (mut shell, _store) = shell(&["Hi!", "Sure, when suits you?", "Welcome"]);

        let first = shell.handle_line("Hello", pending()).await.expect("first");
        assert_eq!(first.lines, vec!["Hi!"]);
        shell
            .handle_line("Can I book an appointment?", pending())
            .await
            .expect("second");

        let site_id = shell
            .orchestrator()
            .registry()
            .get_active()
            .map(|site| site.id)
            .expect("active site");
        let conversations = shell.orchestrator().sessions().list_by_site(site_id);
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].messages.len(), 4);
        assert_eq!(conversations[0].stage, Stage::Booking);

        let listed = shell
            .handle_line("/conversations", pending())
            .await
            .expect("conversations");
        assert_eq!(listed.lines.len(), 1);
        assert!(listed.lines[0].contains("[booking] 4 messages"));

        shell.handle_line("/new Other", pending()).await.expect("new");
        shell.handle_line("Hello again", pending()).await.expect("third");
        assert_eq!(shell.orchestrator().sessions().list().len(), 2);
    }

    #[tokio::test]
    async fn provider_failure_prints_fallback() {
        let (mut shell, _store) = shell(&[]);
        let output = shell.handle_line("Anyone there?", pending()).await.expect("chat");
        assert_eq!(output.lines, vec!["Please leave your email."]);
    }

    #[tokio::test]
    async fn unknown_command_and_quit() {
        let (mut shell, _store) = shell(&[]);
        let unknown = shell.handle_line("/frobnicate", pending()).await.expect("unknown");
        assert!(unknown.lines[0].starts_with("unknown command /frobnicate"));
        assert!(!unknown.quit);

        let quit = shell.handle_line("/quit", pending()).await.expect("quit");
        assert!(quit.quit);
    }

    #[tokio::test]
    async fn memory_backend_opens_without_touching_disk() {
        let settings = StorageSettings {
            backend: StorageBackend::Memory,
            data_dir: None,
        };
        let store = open_store(&settings).await.expect("memory store");
        assert!(store.read_all("sites").expect("read").is_empty());
    }

    #[tokio::test]
    async fn sqlite_backend_creates_database_in_data_dir() {
        let directory = tempfile::tempdir().expect("tempdir");
        let settings = StorageSettings {
            backend: StorageBackend::Sqlite,
            data_dir: Some(directory.path().to_path_buf()),
        };
        let store = open_store(&settings).await.expect("sqlite store");
        store
            .write_all("sites", &[serde_json::json!({ "id": 1 })])
            .expect("write");
        assert_eq!(store.read_all("sites").expect("read").len(), 1);
        assert!(directory.path().join(SQLITE_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn missing_api_key_uses_unavailable_provider() {
        let directory = tempfile::tempdir().expect("tempdir");
        let mut settings = Settings::default();
        settings.storage.data_dir = Some(directory.path().to_path_buf());
        let mut shell = ChatShell::bootstrap(&settings).await.expect("bootstrap");

        let output = shell.handle_line("Hello", pending()).await.expect("chat");
        assert_eq!(output.lines, vec![settings.chat.fallback_reply.clone()]);
        assert!(directory.path().join("sites.json").exists());
    }
}
