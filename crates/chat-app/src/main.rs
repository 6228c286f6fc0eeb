use std::process::ExitCode;

use sitechat::{ChatShell, SettingsStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

async fn interrupted() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {error}");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let settings_store = SettingsStore::load();
    match settings_store.write_defaults_if_missing() {
        Ok(true) => tracing::info!(
            "wrote starter settings to {:?}",
            settings_store.config_path()
        ),
        Ok(false) => {}
        Err(error) => tracing::warn!("failed to write starter settings: {error}"),
    }
    tracing::info!("loaded settings from {:?}", settings_store.config_path());
    let settings = settings_store.settings();

    let mut shell = match ChatShell::bootstrap(&settings).await {
        Ok(shell) => shell,
        Err(error) => {
            tracing::error!("failed to start: {error}");
            return ExitCode::FAILURE;
        }
    };

    println!("{}", shell.banner());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            () = interrupted() => break,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::error!("failed to read stdin: {error}");
                return ExitCode::FAILURE;
            }
        };

        // ctrl-c while a reply is pending drops that reply only
        match shell.handle_line(&line, interrupted()).await {
            Ok(output) => {
                for line in &output.lines {
                    println!("{line}");
                }
                if output.quit {
                    break;
                }
            }
            Err(error) => tracing::error!("{error}"),
        }
    }

    ExitCode::SUCCESS
}
