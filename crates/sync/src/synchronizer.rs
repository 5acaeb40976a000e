use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{debug, info};

use fzm_console_log::{LogEntry, LogMultiplexer};
use fzm_gateway::LoginResponse;
use fzm_protocol::{ModEntry, OptionSet, OptionsKind, RunState, SaveSlot, ServerEvent};

use crate::session::Session;

/// Aggregates whose changes are confirmed by a snapshot event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aggregate {
    Mods,
    Saves,
}

#[derive(Debug, Default)]
struct State {
    session: Session,
    regions: OptionSet,
    versions: OptionSet,
    saves: OptionSet,
    mods: Vec<ModEntry>,
    slots: HashMap<String, serde_json::Value>,
}

/// Folds push events into local state.
///
/// Only [`Synchronizer::apply`] and the `record_*` hooks mutate state, all
/// under one lock. Settlement flags and the run state are published on
/// watch channels so waiters are woken instead of polling.
pub struct Synchronizer {
    state: RwLock<State>,
    mods_settled: watch::Sender<bool>,
    saves_settled: watch::Sender<bool>,
    run_state: watch::Sender<RunState>,
    log: Arc<LogMultiplexer>,
}

impl Synchronizer {
    pub fn new(user_token: Option<String>, log: Arc<LogMultiplexer>) -> Self {
        Self {
            state: RwLock::new(State {
                session: Session::new(user_token),
                ..State::default()
            }),
            mods_settled: watch::Sender::new(false),
            saves_settled: watch::Sender::new(false),
            run_state: watch::Sender::new(RunState::Idle),
            log,
        }
    }

    /// Applies one event. Never fails; unknown kinds are ignored.
    pub fn apply(&self, event: &ServerEvent) {
        debug!(kind = event.kind(), "applying event");
        match event {
            ServerEvent::Visit { secret } => {
                self.state.write().unwrap().session.visit_secret = Some(secret.clone());
            }
            ServerEvent::Options { name, options } => {
                let mut state = self.state.write().unwrap();
                match name {
                    OptionsKind::Regions => state.regions = options.clone(),
                    OptionsKind::Versions => state.versions = options.clone(),
                    OptionsKind::Saves => {
                        state.saves = options.clone();
                        drop(state);
                        self.saves_settled.send_replace(true);
                    }
                    OptionsKind::Other => debug!("ignoring unknown option set"),
                }
            }
            ServerEvent::Mods { mods } => {
                self.state.write().unwrap().mods = mods.clone();
                self.mods_settled.send_replace(true);
            }
            ServerEvent::Idle => {
                self.transition(RunState::Idle, None, None);
            }
            ServerEvent::Starting { launch_id } => {
                self.transition(RunState::Starting, launch_id.as_deref(), None);
            }
            ServerEvent::Stopping { launch_id } => {
                self.transition(RunState::Stopping, launch_id.as_deref(), None);
            }
            ServerEvent::Running { launch_id, socket } => {
                self.transition(RunState::Running, launch_id.as_deref(), socket.as_deref());
            }
            ServerEvent::Slot { slot, data } => {
                self.state
                    .write()
                    .unwrap()
                    .slots
                    .insert(slot.clone(), data.clone());
            }
            ServerEvent::Log { num, line } => {
                self.log.append(LogEntry::remote(*num, line.clone()));
            }
            ServerEvent::Info { line } => {
                self.log.append(LogEntry::info(format!("info {line}")));
            }
            ServerEvent::Warn { line } => {
                self.log.append(LogEntry::warn(format!("warn {line}")));
            }
            ServerEvent::Error { line } => {
                self.log.append(LogEntry::error(format!("error {line}")));
            }
            ServerEvent::Unknown => {}
        }
    }

    fn transition(&self, next: RunState, launch_id: Option<&str>, address: Option<&str>) {
        {
            let mut state = self.state.write().unwrap();
            let session = &mut state.session;
            session.run_state = next;
            if next == RunState::Idle {
                session.launch_id = None;
                session.server_address = None;
            } else if let Some(id) = launch_id {
                session.launch_id = Some(id.to_string());
            }
            if let Some(addr) = address {
                session.server_address = Some(addr.to_string());
            }
        }
        let prev = self.run_state.send_replace(next);
        if prev != next {
            info!(from = %prev, to = %next, "instance state changed");
        }
    }

    /// Stores the outcome of a successful login.
    pub fn record_login(&self, login: &LoginResponse) {
        self.state.write().unwrap().session.apply_login(login);
    }

    /// Stores the launch id returned by a start request.
    pub fn record_launch(&self, launch_id: &str) {
        if launch_id.is_empty() {
            return;
        }
        self.state.write().unwrap().session.launch_id = Some(launch_id.to_string());
    }

    // --- settlement -----------------------------------------------------

    fn settled(&self, aggregate: Aggregate) -> &watch::Sender<bool> {
        match aggregate {
            Aggregate::Mods => &self.mods_settled,
            Aggregate::Saves => &self.saves_settled,
        }
    }

    pub fn is_settled(&self, aggregate: Aggregate) -> bool {
        *self.settled(aggregate).borrow()
    }

    /// Marks `aggregate` unsettled ahead of a mutating call.
    pub fn begin_mutation(&self, aggregate: Aggregate) {
        self.settled(aggregate).send_replace(false);
    }

    /// Restores `aggregate` after a call the service rejected; no snapshot
    /// will follow it.
    pub fn abort_mutation(&self, aggregate: Aggregate) {
        self.settled(aggregate).send_replace(true);
    }

    /// Waits until `aggregate` has received a snapshot since it was last
    /// marked unsettled.
    pub async fn wait_settled(&self, aggregate: Aggregate) {
        let mut rx = self.settled(aggregate).subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|settled| *settled).await;
    }

    /// Waits until both mods and saves are settled.
    pub async fn wait_sync(&self) {
        self.wait_settled(Aggregate::Mods).await;
        self.wait_settled(Aggregate::Saves).await;
    }

    /// Live view of the instance state.
    pub fn watch_run_state(&self) -> watch::Receiver<RunState> {
        self.run_state.subscribe()
    }

    // --- accessors ------------------------------------------------------

    pub fn session(&self) -> Session {
        self.state.read().unwrap().session.clone()
    }

    pub fn visit_secret(&self) -> Option<String> {
        self.state.read().unwrap().session.visit_secret.clone()
    }

    pub fn user_token(&self) -> Option<String> {
        self.state.read().unwrap().session.user_token.clone()
    }

    pub fn launch_id(&self) -> Option<String> {
        self.state.read().unwrap().session.launch_id.clone()
    }

    pub fn run_state(&self) -> RunState {
        *self.run_state.borrow()
    }

    pub fn running(&self) -> bool {
        self.run_state().is_running()
    }

    pub fn regions(&self) -> OptionSet {
        self.state.read().unwrap().regions.clone()
    }

    pub fn versions(&self) -> OptionSet {
        self.state.read().unwrap().versions.clone()
    }

    /// Raw `saves` option set, empty slots included.
    pub fn saves(&self) -> OptionSet {
        self.state.read().unwrap().saves.clone()
    }

    pub fn mods(&self) -> Vec<ModEntry> {
        self.state.read().unwrap().mods.clone()
    }

    /// All save slots in service order.
    pub fn slots(&self) -> Vec<SaveSlot> {
        self.state
            .read()
            .unwrap()
            .saves
            .iter()
            .filter_map(|(key, label)| SaveSlot::from_option(key, label))
            .collect()
    }

    /// Slots holding a save; the only ones that can be deleted or
    /// downloaded.
    pub fn remote_slots(&self) -> Vec<SaveSlot> {
        self.slots().into_iter().filter(|s| !s.is_empty()).collect()
    }

    /// Detail record last pushed for `slot`.
    pub fn slot_detail(&self, slot: &str) -> Option<serde_json::Value> {
        self.state.read().unwrap().slots.get(slot).cloned()
    }

    pub fn log(&self) -> &Arc<LogMultiplexer> {
        &self.log
    }
}
