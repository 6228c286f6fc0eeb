//! Headless chat front end for sitechat sites: settings, the orchestrator
//! that turns visitor lines into assistant turns, and the line shell.

pub mod app;
pub mod orchestrator;
pub mod settings;

pub use app::{AppError, ChatShell, ShellOutput, UnavailableProvider, open_store};
pub use orchestrator::{
    ChatOptions, ChatOrchestrator, OrchestratorError, Reply, ReplyOutcome,
};
pub use settings::{Settings, SettingsError, SettingsStore, StorageBackend};
