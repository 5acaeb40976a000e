//! Executes prompt commands against a connected [`ZoneClient`].

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::warn;

use fzm_gateway::UploadSource;
use fzm_protocol::{OptionSet, SaveSlot};
use fzm_settings::{Pref, PreferenceStore, RecallList};
use fzm_shell::RemoteShell;
use fzm_sync::{ClientError, ZoneClient};

use crate::commands::{Command, HELP};
use crate::progress::ProgressPrinter;
use crate::sources;

/// Whether the prompt loop keeps going.
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Reads one line from stdin after printing `prompt`. `None` on EOF.
pub async fn prompt_line(prompt: &str) -> anyhow::Result<Option<String>> {
    let prompt = prompt.to_string();
    let line = tokio::task::spawn_blocking(move || -> std::io::Result<Option<String>> {
        let mut out = std::io::stdout();
        write!(out, "{prompt}")?;
        out.flush()?;
        let mut line = String::new();
        let read = std::io::stdin().read_line(&mut line)?;
        Ok((read > 0).then_some(line))
    })
    .await??;
    Ok(line)
}

/// Text for an alert raised by a failed command.
pub fn alert_text(err: &anyhow::Error) -> String {
    match err.downcast_ref::<ClientError>() {
        Some(e) => e.user_message(),
        None => format!("{err:#}"),
    }
}

pub struct App {
    client: Arc<ZoneClient>,
    store: Arc<dyn PreferenceStore>,
}

impl App {
    pub fn new(client: Arc<ZoneClient>, store: Arc<dyn PreferenceStore>) -> Self {
        Self { client, store }
    }

    pub async fn execute(&self, command: Command) -> anyhow::Result<Flow> {
        match command {
            Command::Status => self.print_status(),
            Command::Mods => self.print_mods(),
            Command::Toggle { mod_id, enabled } => {
                self.client.toggle_mod(mod_id, enabled).await?;
                println!("mod {mod_id} {}", if enabled { "enabled" } else { "disabled" });
            }
            Command::DeleteMod { mod_id } => {
                self.client.delete_mod(mod_id).await?;
                println!("mod {mod_id} deleted");
            }
            Command::UploadMods { dir, mod_list } => self.upload_mods(&dir, mod_list).await?,
            Command::Saves => self.print_saves(),
            Command::UploadSave { path, slot } => self.upload_save(&path, &slot).await?,
            Command::DeleteSave { slot } => {
                self.client.delete_save_slot(&slot).await?;
                println!("{slot} emptied");
            }
            Command::DownloadSave { slot, dir } => self.download_saves(slot, &dir).await?,
            Command::Start {
                region,
                version,
                slot,
            } => self.start(region, version, slot).await?,
            Command::Stop => self.stop().await?,
            Command::Attach => self.attach().await?,
            Command::Help => println!("{HELP}"),
            Command::Exit => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }

    fn remember(&self, list: RecallList, value: &str) {
        if let Err(e) = self.store.append_recall(list, value) {
            warn!(list = list.key(), error = %e, "failed to record recall entry");
        }
    }

    fn print_status(&self) {
        let session = self.client.session();
        let token = session.user_token.as_deref().map_or("-".into(), mask_token);
        println!("user token:  {token}");
        if let Some(code) = &session.referral_code {
            println!("referral:    {code}");
        }
        match (&session.launch_id, &session.server_address) {
            (Some(id), Some(addr)) => println!("instance:    {} (launch {id}) at {addr}", session.run_state),
            (Some(id), None) => println!("instance:    {} (launch {id})", session.run_state),
            _ => println!("instance:    {}", session.run_state),
        }
        let mods = self.client.mods();
        let enabled = mods.iter().filter(|m| m.enabled).count();
        println!("mods:        {} ({enabled} enabled)", mods.len());
        println!(
            "saves:       {} of {} slots used",
            self.client.get_remote_slots().len(),
            self.client.slots().len()
        );
    }

    fn print_mods(&self) {
        let mods = self.client.mods();
        if mods.is_empty() {
            println!("no mods uploaded");
            return;
        }
        for m in mods {
            println!("{:>8}  [{}] {}", m.id, if m.enabled { 'x' } else { ' ' }, m.text);
        }
    }

    fn print_saves(&self) {
        for slot in self.client.slots() {
            println!("{}", slot.label);
        }
    }

    async fn upload_mods(&self, dir: &Path, mod_list: bool) -> anyhow::Result<()> {
        let mut archives = sources::scan_mod_archives(dir)
            .with_context(|| format!("cannot read {}", dir.display()))?;
        if mod_list {
            archives = sources::filter_by_mod_list(dir, archives)
                .with_context(|| format!("cannot use mod-list.json in {}", dir.display()))?;
        }
        if archives.is_empty() {
            println!("nothing to upload in {}", dir.display());
            return Ok(());
        }
        self.remember(RecallList::ModsPaths, &dir.display().to_string());

        for source in &archives {
            let printer = ProgressPrinter::new(&source.name, Some(source.size_bytes));
            let result = self
                .client
                .upload_mod(source, Some(printer.callback()))
                .await;
            printer.finish();
            result.with_context(|| format!("uploading {}", source.name))?;
        }
        println!("{} mod(s) uploaded", archives.len());
        Ok(())
    }

    async fn upload_save(&self, path: &Path, slot: &str) -> anyhow::Result<()> {
        let source = UploadSource::from_path(path)
            .with_context(|| format!("cannot read {}", path.display()))?;

        let occupied = self
            .client
            .get_remote_slots()
            .into_iter()
            .any(|s| s.key == slot);
        if occupied {
            let answer = prompt_line(&format!("{slot} already holds a save, replace it? [y/N] ")).await?;
            if !is_yes(answer.as_deref()) {
                println!("upload cancelled");
                return Ok(());
            }
            self.client.delete_save_slot(slot).await?;
        }
        if let Some(parent) = path.parent() {
            self.remember(RecallList::SavesPaths, &parent.display().to_string());
        }

        let printer = ProgressPrinter::new(&source.name, Some(source.size_bytes));
        let result = self
            .client
            .upload_save(&source, slot, Some(printer.callback()))
            .await;
        printer.finish();
        result?;
        println!("{} uploaded to {slot}", source.name);
        Ok(())
    }

    async fn download_saves(&self, slot: Option<String>, dir: &Path) -> anyhow::Result<()> {
        let occupied = self.client.get_remote_slots();
        let targets: Vec<SaveSlot> = match slot {
            Some(key) => match occupied.into_iter().find(|s| s.key == key) {
                Some(s) => vec![s],
                None => bail!("{key} is empty"),
            },
            None => occupied,
        };
        if targets.is_empty() {
            println!("no saves to download");
            return Ok(());
        }

        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("cannot create {}", dir.display()))?;
        for slot in targets {
            let dest = dir.join(format!("{}.zip", slot.key));
            let printer = ProgressPrinter::new(&slot.key, slot.size_bytes());
            let result = self
                .client
                .download_save_slot(&slot.key, &dest, Some(printer.callback()))
                .await;
            printer.finish();
            let written = result?;
            println!("{} saved to {} ({written} bytes)", slot.key, dest.display());
        }
        Ok(())
    }

    async fn start(
        &self,
        region: Option<String>,
        version: Option<String>,
        slot: Option<String>,
    ) -> anyhow::Result<()> {
        let region = pick(
            region,
            self.store.get(Pref::Region),
            &self.client.regions(),
            "region",
        )?;
        let version = pick(
            version,
            self.store.get(Pref::Version),
            &self.client.versions(),
            "version",
        )?;
        let slot = slot
            .or_else(|| self.store.get(Pref::Slot))
            .unwrap_or_else(|| SaveSlot::key_for(1));

        for (pref, value) in [
            (Pref::Region, &region),
            (Pref::Version, &version),
            (Pref::Slot, &slot),
        ] {
            if let Err(e) = self.store.put(pref, value) {
                warn!(key = pref.key(), error = %e, "failed to store preference");
            }
        }

        println!("starting {version} in {region} from {slot}");
        let echo = self.echo_log();
        let result = self
            .client
            .start_instance(&region, &version, &slot, print_tick)
            .await;
        echo.abort();
        println!();
        result?;

        match self.client.session().server_address {
            Some(addr) => println!("server running at {addr}"),
            None => println!("server running"),
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if !self.client.session().running() {
            println!("no instance running");
            return Ok(());
        }
        println!("stopping instance");
        let echo = self.echo_log();
        let result = self.client.stop_instance(print_tick).await;
        echo.abort();
        println!();
        result?;
        println!("instance stopped");
        Ok(())
    }

    /// Prints new log entries until the returned task is aborted.
    fn echo_log(&self) -> tokio::task::JoinHandle<()> {
        let mut feed = self.client.log().subscribe();
        tokio::spawn(async move {
            while let Some(entry) = feed.recv().await {
                println!("\r{}", entry.text);
            }
        })
    }

    async fn attach(&self) -> anyhow::Result<()> {
        if !self.client.session().running() {
            println!("no instance running, use 'start' first");
            return Ok(());
        }
        let history = self.store.recall(RecallList::Commands);
        let seeded = history.len();
        let mut shell = RemoteShell::new(
            self.client.clone(),
            self.client.log().clone(),
            history,
        );
        fzm_shell::terminal::attach(&mut shell).await?;

        for line in &shell.editor().history()[seeded..] {
            self.remember(RecallList::Commands, line);
        }
        Ok(())
    }
}

fn print_tick() {
    let mut out = std::io::stdout();
    let _ = write!(out, ".");
    let _ = out.flush();
}

/// Chooses a start option: an explicit choice must be offered, a stored
/// one is used while still offered, otherwise the first offered entry.
fn pick(
    explicit: Option<String>,
    stored: Option<String>,
    offered: &OptionSet,
    what: &str,
) -> anyhow::Result<String> {
    if let Some(choice) = explicit {
        if offered.is_empty() || offered.contains_key(&choice) {
            return Ok(choice);
        }
        let known: Vec<&str> = offered.keys().collect();
        bail!("unknown {what} '{choice}', offered: {}", known.join(", "));
    }
    if let Some(stored) = stored.filter(|s| offered.contains_key(s)) {
        return Ok(stored);
    }
    offered
        .keys()
        .next()
        .map(str::to_string)
        .with_context(|| format!("the service has not offered any {what} yet"))
}

fn is_yes(answer: Option<&str>) -> bool {
    matches!(
        answer.map(|a| a.trim().to_ascii_lowercase()).as_deref(),
        Some("y" | "yes")
    )
}

/// Shows enough of a token to tell tokens apart.
fn mask_token(token: &str) -> String {
    let shown: String = token.chars().take(6).collect();
    if shown.len() < token.len() {
        format!("{shown}…")
    } else {
        shown
    }
}
