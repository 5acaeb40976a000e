//! fzm: terminal client for factorio.zone.
//!
//! Connects the push socket, logs in, waits for the first mods and saves
//! snapshots and then reads commands from the `fzm>` prompt.

mod app;
mod commands;
mod config;
mod progress;
mod sources;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use fzm_connection::Transport;
use fzm_gateway::HttpGateway;
use fzm_protocol::Endpoint;
use fzm_settings::{FileStore, MemoryStore, Pref, PreferenceStore, RecallList};
use fzm_sync::{ClientError, ZoneClient};

use crate::app::{App, Flow, alert_text, prompt_line};
use crate::config::ClientConfig;

#[derive(Parser)]
#[command(name = "fzm", version, about = "Manage factorio.zone game servers")]
struct Cli {
    /// User token to log in with; defaults to the stored one
    #[arg(long, conflicts_with = "new_token")]
    token: Option<String>,

    /// Ask the service for a fresh user token
    #[arg(long)]
    new_token: bool,

    /// Service host (host or host:port)
    #[arg(long, env = "FZM_ENDPOINT")]
    endpoint: Option<String>,

    /// Configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    block_on_and_abandon(session(cli))?
}

/// Runs `fut` on a fresh runtime, then shuts the runtime down without
/// joining blocking tasks. A prompt parked in `read_line` would otherwise
/// keep the process alive after the session has ended.
fn block_on_and_abandon<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(fut);
    runtime.shutdown_background();
    Ok(output)
}

async fn session(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.clone().or_else(config::default_config_path);
    let loaded = config_path.as_deref().map(ClientConfig::read).transpose();
    let config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => ClientConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    if let Err(e) = &loaded {
        warn!(error = %e, "failed to load client config, using defaults");
    }

    let store = open_store(&config);
    let user_token = if cli.new_token {
        None
    } else {
        cli.token.clone().or_else(|| store.get(Pref::UserToken))
    };

    let endpoint = Endpoint::new(cli.endpoint.unwrap_or(config.endpoint));
    info!(host = endpoint.host(), "connecting");
    let gateway = HttpGateway::new(endpoint.clone())?;
    let client = Arc::new(ZoneClient::new(Arc::new(gateway), user_token));

    let (transport, events) = Transport::connect(&endpoint.socket_url())
        .await
        .with_context(|| format!("cannot connect to {}", endpoint.host()))?;
    let mut runner: JoinHandle<Result<(), ClientError>> = {
        let client = client.clone();
        tokio::spawn(async move { client.run(events).await })
    };

    println!("connecting to {}...", endpoint.host());
    tokio::select! {
        _ = client.wait_sync() => {}
        ended = &mut runner => return Err(run_ended(ended)),
    }
    remember_token(&client, store.as_ref());
    println!("connected, type 'help' for commands");

    let app = App::new(client.clone(), store);
    loop {
        let line = tokio::select! {
            line = prompt_line("fzm> ") => line?,
            ended = &mut runner => return Err(run_ended(ended)),
        };
        let Some(line) = line else { break };

        let command = match commands::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("{msg}");
                continue;
            }
        };

        let outcome = tokio::select! {
            outcome = app.execute(command) => outcome,
            ended = &mut runner => return Err(run_ended(ended)),
        };
        match outcome {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break,
            Err(e) => eprintln!("error: {}", alert_text(&e)),
        }
    }

    transport.close().await;
    Ok(())
}

/// Opens the preference file, falling back to memory so a broken file
/// never blocks a session.
fn open_store(config: &ClientConfig) -> Arc<dyn PreferenceStore> {
    let Some(path) = config.store_path() else {
        warn!("no config directory, preferences will not be kept");
        return Arc::new(MemoryStore::default());
    };
    match FileStore::open(path.clone()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot open preference store, using memory");
            Arc::new(MemoryStore::default())
        }
    }
}

/// Stores the token the service confirmed, recording newly issued ones.
fn remember_token(client: &ZoneClient, store: &dyn PreferenceStore) {
    let Some(token) = client.session().user_token else {
        return;
    };
    if store.get(Pref::UserToken).as_deref() == Some(token.as_str()) {
        return;
    }
    let saved = store
        .put(Pref::UserToken, &token)
        .and_then(|()| store.append_recall(RecallList::Tokens, &token));
    if let Err(e) = saved {
        warn!(error = %e, "failed to store user token");
    }
}

fn run_ended(ended: Result<Result<(), ClientError>, tokio::task::JoinError>) -> anyhow::Error {
    match ended {
        Ok(Ok(())) => anyhow::anyhow!("connection ended"),
        Ok(Err(e)) => anyhow::anyhow!(e.user_message()),
        Err(e) => anyhow::Error::from(e).context("event loop failed"),
    }
}
