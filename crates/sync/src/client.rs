//! Client facade: event loop plus settled gateway calls.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use fzm_connection::{EventStream, TransportError};
use fzm_console_log::LogMultiplexer;
use fzm_gateway::{ActionGateway, GatewayError, ProgressFn, UploadSource};
use fzm_protocol::{ModEntry, OptionSet, RunState, SaveSlot, ServerEvent};

use crate::error::ClientError;
use crate::session::Session;
use crate::synchronizer::{Aggregate, Synchronizer};

/// How often start/stop waits report liveness.
pub const LIVENESS_TICK: Duration = Duration::from_secs(1);

/// One run against the hosting service.
///
/// [`ZoneClient::run`] consumes the push socket; every other method may be
/// called concurrently from other tasks.
pub struct ZoneClient {
    gateway: Arc<dyn ActionGateway>,
    sync: Synchronizer,
}

impl ZoneClient {
    /// Creates a client presenting `user_token` at login (`None` asks the
    /// service for a new one).
    pub fn new(gateway: Arc<dyn ActionGateway>, user_token: Option<String>) -> Self {
        Self {
            gateway,
            sync: Synchronizer::new(user_token, LogMultiplexer::new()),
        }
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn log(&self) -> &Arc<LogMultiplexer> {
        self.sync.log()
    }

    /// Processes events in arrival order until the connection fails.
    ///
    /// A `visit` event triggers login before the next event is looked at;
    /// a rejected login ends the run.
    pub async fn run(&self, mut events: EventStream) -> Result<(), ClientError> {
        while let Some(item) = events.recv().await {
            let event = item?;
            self.sync.apply(&event);
            if let ServerEvent::Visit { secret } = &event {
                self.login(secret).await?;
            }
        }
        Err(ClientError::Connection(TransportError::Closed))
    }

    async fn login(&self, visit_secret: &str) -> Result<(), ClientError> {
        let token = self.sync.user_token();
        let login = self.gateway.login(token.as_deref(), visit_secret).await?;
        self.sync.record_login(&login);
        debug!("session authenticated");
        Ok(())
    }

    fn secret(&self) -> Result<String, ClientError> {
        self.sync.visit_secret().ok_or(ClientError::NotConnected)
    }

    /// Finishes a mutating call: restores the flag on failure, otherwise
    /// waits for the confirming snapshot.
    async fn settle<T>(
        &self,
        aggregate: Aggregate,
        result: Result<T, GatewayError>,
    ) -> Result<T, ClientError> {
        match result {
            Ok(value) => {
                self.sync.wait_settled(aggregate).await;
                Ok(value)
            }
            Err(e) => {
                warn!(?aggregate, "mutation rejected: {e}");
                self.sync.abort_mutation(aggregate);
                Err(e.into())
            }
        }
    }

    /// Waits for the first mods and saves snapshots.
    pub async fn wait_sync(&self) {
        self.sync.wait_sync().await;
    }

    // --- mods -----------------------------------------------------------

    pub async fn toggle_mod(&self, mod_id: i64, enabled: bool) -> Result<(), ClientError> {
        let secret = self.secret()?;
        self.sync.begin_mutation(Aggregate::Mods);
        let result = self.gateway.toggle_mod(&secret, mod_id, enabled).await;
        self.settle(Aggregate::Mods, result).await
    }

    pub async fn delete_mod(&self, mod_id: i64) -> Result<(), ClientError> {
        let secret = self.secret()?;
        self.sync.begin_mutation(Aggregate::Mods);
        let result = self.gateway.delete_mod(&secret, mod_id).await;
        self.settle(Aggregate::Mods, result).await
    }

    pub async fn upload_mod(
        &self,
        source: &UploadSource,
        progress: Option<ProgressFn>,
    ) -> Result<(), ClientError> {
        let secret = self.secret()?;
        self.sync.begin_mutation(Aggregate::Mods);
        let result = self.gateway.upload_mod(&secret, source, progress).await;
        self.settle(Aggregate::Mods, result).await
    }

    // --- saves ----------------------------------------------------------

    pub async fn upload_save(
        &self,
        source: &UploadSource,
        slot: &str,
        progress: Option<ProgressFn>,
    ) -> Result<(), ClientError> {
        let secret = self.secret()?;
        self.sync.begin_mutation(Aggregate::Saves);
        let result = self
            .gateway
            .upload_save(&secret, source, slot, progress)
            .await;
        self.settle(Aggregate::Saves, result).await
    }

    pub async fn delete_save_slot(&self, slot: &str) -> Result<(), ClientError> {
        let secret = self.secret()?;
        self.sync.begin_mutation(Aggregate::Saves);
        let result = self.gateway.delete_save(&secret, slot).await;
        self.settle(Aggregate::Saves, result).await
    }

    /// Downloads `slot` to `dest`. Saves are not changed by a download, so
    /// no snapshot is awaited.
    pub async fn download_save_slot(
        &self,
        slot: &str,
        dest: &Path,
        progress: Option<ProgressFn>,
    ) -> Result<u64, ClientError> {
        let secret = self.secret()?;
        Ok(self
            .gateway
            .download_save(&secret, slot, dest, progress)
            .await?)
    }

    // --- instance -------------------------------------------------------

    /// Sends a console line to the running instance.
    pub async fn send_command(&self, input: &str) -> Result<(), ClientError> {
        let secret = self.secret()?;
        let launch_id = self.sync.launch_id();
        self.gateway
            .send_command(&secret, launch_id.as_deref(), input)
            .await?;
        Ok(())
    }

    /// Starts an instance and waits until it reports running, calling
    /// `on_tick` every [`LIVENESS_TICK`] meanwhile.
    ///
    /// An instance that is starting or running is only waited for; no
    /// request is made. One that is stopping is first waited down to idle
    /// and then started again.
    pub async fn start_instance(
        &self,
        region: &str,
        version: &str,
        slot: &str,
        mut on_tick: impl FnMut(),
    ) -> Result<(), ClientError> {
        if self.sync.run_state() == RunState::Stopping {
            debug!("instance still stopping, waiting for idle before starting");
            self.wait_run_state(RunState::Idle, &mut on_tick).await;
        }
        match self.sync.run_state() {
            RunState::Idle => {
                let secret = self.secret()?;
                let launch_id = self
                    .gateway
                    .start_instance(&secret, region, version, slot)
                    .await?;
                self.sync.record_launch(&launch_id);
            }
            state => debug!(%state, "instance exists, not starting another"),
        }
        self.wait_run_state(RunState::Running, on_tick).await;
        info!("instance running");
        Ok(())
    }

    /// Stops the instance and waits until it is idle. Returns at once when
    /// nothing is running.
    pub async fn stop_instance(&self, on_tick: impl FnMut()) -> Result<(), ClientError> {
        if self.sync.run_state() == RunState::Idle {
            return Ok(());
        }
        let secret = self.secret()?;
        let launch_id = self.sync.launch_id();
        self.gateway
            .stop_instance(&secret, launch_id.as_deref())
            .await?;
        self.wait_run_state(RunState::Idle, on_tick).await;
        info!("instance stopped");
        Ok(())
    }

    async fn wait_run_state(&self, target: RunState, mut on_tick: impl FnMut()) {
        let mut rx = self.sync.watch_run_state();
        let mut ticker = tokio::time::interval(LIVENESS_TICK);
        ticker.tick().await; // Skip immediate first tick.

        loop {
            if *rx.borrow_and_update() == target {
                return;
            }
            tokio::select! {
                changed = rx.changed() => {
                    // The sender lives in `self.sync`; a closed channel
                    // cannot happen while `self` is borrowed.
                    if changed.is_err() {
                        return;
                    }
                }
                _ = ticker.tick() => on_tick(),
            }
        }
    }

    // --- read side ------------------------------------------------------

    pub fn session(&self) -> Session {
        self.sync.session()
    }

    pub fn regions(&self) -> OptionSet {
        self.sync.regions()
    }

    pub fn versions(&self) -> OptionSet {
        self.sync.versions()
    }

    pub fn mods(&self) -> Vec<ModEntry> {
        self.sync.mods()
    }

    /// All nine slots, empty ones included.
    pub fn slots(&self) -> Vec<SaveSlot> {
        self.sync.slots()
    }

    /// Slots that hold a save.
    pub fn get_remote_slots(&self) -> Vec<SaveSlot> {
        self.sync.remote_slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use fzm_gateway::{GatewayFuture, LoginResponse};
    use tokio::sync::{Notify, mpsc};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Login(Option<String>, String),
        Toggle(i64, bool),
        DeleteMod(i64),
        UploadMod(String),
        UploadSave(String, String),
        DeleteSave(String),
        Download(String),
        Command(Option<String>, String),
        Start(String, String, String),
        Stop(Option<String>),
    }

    /// Records calls; fails every call when `fail` is set.
    #[derive(Default)]
    struct MockGateway {
        calls: Mutex<Vec<Call>>,
        fail: bool,
        called: Notify,
    }

    impl MockGateway {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn record<T: Send + 'static>(&self, call: Call, ok: T) -> GatewayFuture<'_, T> {
            self.calls.lock().unwrap().push(call);
            self.called.notify_one();
            let fail = self.fail;
            Box::pin(async move {
                if fail {
                    Err(GatewayError::Remote {
                        status: 400,
                        body: "rejected".into(),
                    })
                } else {
                    Ok(ok)
                }
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ActionGateway for MockGateway {
        fn login<'a>(
            &'a self,
            user_token: Option<&'a str>,
            visit_secret: &'a str,
        ) -> GatewayFuture<'a, LoginResponse> {
            self.record(
                Call::Login(user_token.map(String::from), visit_secret.into()),
                LoginResponse {
                    user_token: "tok-new".into(),
                    referral_code: "ref".into(),
                },
            )
        }

        fn toggle_mod<'a>(&'a self, _: &'a str, id: i64, on: bool) -> GatewayFuture<'a, ()> {
            self.record(Call::Toggle(id, on), ())
        }

        fn delete_mod<'a>(&'a self, _: &'a str, id: i64) -> GatewayFuture<'a, ()> {
            self.record(Call::DeleteMod(id), ())
        }

        fn upload_mod<'a>(
            &'a self,
            _: &'a str,
            source: &'a UploadSource,
            _: Option<ProgressFn>,
        ) -> GatewayFuture<'a, ()> {
            self.record(Call::UploadMod(source.name.clone()), ())
        }

        fn upload_save<'a>(
            &'a self,
            _: &'a str,
            source: &'a UploadSource,
            slot: &'a str,
            _: Option<ProgressFn>,
        ) -> GatewayFuture<'a, ()> {
            self.record(Call::UploadSave(source.name.clone(), slot.into()), ())
        }

        fn delete_save<'a>(&'a self, _: &'a str, slot: &'a str) -> GatewayFuture<'a, ()> {
            self.record(Call::DeleteSave(slot.into()), ())
        }

        fn download_save<'a>(
            &'a self,
            _: &'a str,
            slot: &'a str,
            _: &'a Path,
            _: Option<ProgressFn>,
        ) -> GatewayFuture<'a, u64> {
            self.record(Call::Download(slot.into()), 42)
        }

        fn send_command<'a>(
            &'a self,
            _: &'a str,
            launch_id: Option<&'a str>,
            input: &'a str,
        ) -> GatewayFuture<'a, ()> {
            self.record(Call::Command(launch_id.map(String::from), input.into()), ())
        }

        fn start_instance<'a>(
            &'a self,
            _: &'a str,
            region: &'a str,
            version: &'a str,
            slot: &'a str,
        ) -> GatewayFuture<'a, String> {
            self.record(
                Call::Start(region.into(), version.into(), slot.into()),
                "L1".to_string(),
            )
        }

        fn stop_instance<'a>(
            &'a self,
            _: &'a str,
            launch_id: Option<&'a str>,
        ) -> GatewayFuture<'a, ()> {
            self.record(Call::Stop(launch_id.map(String::from)), ())
        }
    }

    fn event(json: &str) -> ServerEvent {
        ServerEvent::parse(json).unwrap()
    }

    /// Client with a visit secret and both aggregates settled.
    fn connected(gateway: Arc<MockGateway>) -> Arc<ZoneClient> {
        let client = Arc::new(ZoneClient::new(gateway, Some("tok-old".into())));
        let sync = client.synchronizer();
        sync.apply(&event(r#"{"type":"visit","secret":"s1"}"#));
        sync.apply(&event(r#"{"type":"mods","mods":[]}"#));
        sync.apply(&event(r#"{"type":"options","name":"saves","options":{}}"#));
        client
    }

    #[tokio::test]
    async fn toggle_mod_waits_for_next_snapshot() {
        let gateway = Arc::new(MockGateway::default());
        let client = connected(gateway.clone());

        let task = {
            let client = client.clone();
            tokio::spawn(async move { client.toggle_mod(5, false).await })
        };

        gateway.called.notified().await;
        tokio::task::yield_now().await;
        assert!(!client.synchronizer().is_settled(Aggregate::Mods));
        assert!(!task.is_finished());

        client.synchronizer().apply(&event(
            r#"{"type":"mods","mods":[{"id":5,"text":"x.zip","enabled":false}]}"#,
        ));
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("toggle should settle")
            .unwrap()
            .unwrap();

        assert!(client.synchronizer().is_settled(Aggregate::Mods));
        assert_eq!(gateway.calls(), vec![Call::Toggle(5, false)]);
        assert!(!client.mods()[0].enabled);
    }

    #[tokio::test]
    async fn failed_mutation_restores_flag_immediately() {
        let gateway = Arc::new(MockGateway::failing());
        let client = connected(gateway.clone());

        let err = client.toggle_mod(5, true).await.unwrap_err();
        assert_eq!(err.user_message(), "rejected");
        assert!(client.synchronizer().is_settled(Aggregate::Mods));

        let err = client.delete_save_slot("slot2").await.unwrap_err();
        assert!(matches!(err, ClientError::Gateway(GatewayError::Remote { .. })));
        assert!(client.synchronizer().is_settled(Aggregate::Saves));
    }

    #[tokio::test]
    async fn save_mutations_wait_on_saves_only() {
        let gateway = Arc::new(MockGateway::default());
        let client = connected(gateway.clone());

        let task = {
            let client = client.clone();
            tokio::spawn(async move { client.delete_save_slot("slot2").await })
        };
        gateway.called.notified().await;

        // A mods snapshot does not settle saves.
        client
            .synchronizer()
            .apply(&event(r#"{"type":"mods","mods":[]}"#));
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        client.synchronizer().apply(&event(
            r#"{"type":"options","name":"saves","options":{"slot2":"slot 2 (empty)"}}"#,
        ));
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(gateway.calls(), vec![Call::DeleteSave("slot2".into())]);
    }

    #[tokio::test]
    async fn calls_before_visit_are_rejected() {
        let gateway = Arc::new(MockGateway::default());
        let client = ZoneClient::new(gateway.clone(), None);

        let err = client.send_command("help").await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn download_does_not_touch_settlement() {
        let gateway = Arc::new(MockGateway::default());
        let client = connected(gateway.clone());

        let n = client
            .download_save_slot("slot2", Path::new("/tmp/unused.zip"), None)
            .await
            .unwrap();
        assert_eq!(n, 42);
        assert!(client.synchronizer().is_settled(Aggregate::Saves));
    }

    #[tokio::test]
    async fn send_command_uses_current_launch() {
        let gateway = Arc::new(MockGateway::default());
        let client = connected(gateway.clone());
        client
            .synchronizer()
            .apply(&event(r#"{"type":"running","launchId":"L9"}"#));

        client.send_command("/players").await.unwrap();
        assert_eq!(
            gateway.calls(),
            vec![Call::Command(Some("L9".into()), "/players".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn start_instance_returns_after_running_event() {
        let gateway = Arc::new(MockGateway::default());
        let client = connected(gateway.clone());
        let ticks = Arc::new(Mutex::new(0u32));

        let task = {
            let client = client.clone();
            let ticks = ticks.clone();
            tokio::spawn(async move {
                client
                    .start_instance("eu", "1.1", "slot2", move || {
                        *ticks.lock().unwrap() += 1;
                    })
                    .await
            })
        };
        gateway.called.notified().await;

        client
            .synchronizer()
            .apply(&event(r#"{"type":"starting","launchId":"L1"}"#));
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(!task.is_finished());

        client
            .synchronizer()
            .apply(&event(r#"{"type":"running","launchId":"L1"}"#));
        task.await.unwrap().unwrap();

        assert_eq!(*ticks.lock().unwrap(), 3);
        assert_eq!(
            gateway.calls(),
            vec![Call::Start("eu".into(), "1.1".into(), "slot2".into())]
        );
        assert_eq!(client.session().launch_id.as_deref(), Some("L1"));
    }

    #[tokio::test]
    async fn start_when_already_running_is_a_no_op() {
        let gateway = Arc::new(MockGateway::default());
        let client = connected(gateway.clone());
        client
            .synchronizer()
            .apply(&event(r#"{"type":"running","launchId":"L1"}"#));

        tokio::time::timeout(
            Duration::from_secs(1),
            client.start_instance("eu", "1.1", "slot1", || {}),
        )
        .await
        .expect("should return immediately")
        .unwrap();
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn start_while_stopping_waits_for_idle_then_starts() {
        let gateway = Arc::new(MockGateway::default());
        let client = connected(gateway.clone());
        let sync = client.synchronizer();
        sync.apply(&event(r#"{"type":"running","launchId":"L1"}"#));
        sync.apply(&event(r#"{"type":"stopping","launchId":"L1"}"#));

        let task = {
            let client = client.clone();
            tokio::spawn(async move { client.start_instance("eu", "1.1", "slot1", || {}).await })
        };
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(gateway.calls().is_empty(), "no start while the old instance stops");

        client.synchronizer().apply(&event(r#"{"type":"idle"}"#));
        gateway.called.notified().await;
        assert_eq!(
            gateway.calls(),
            vec![Call::Start("eu".into(), "1.1".into(), "slot1".into())]
        );

        client
            .synchronizer()
            .apply(&event(r#"{"type":"running","launchId":"L1"}"#));
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("start should finish once running")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn stop_instance_waits_for_idle() {
        let gateway = Arc::new(MockGateway::default());
        let client = connected(gateway.clone());
        client
            .synchronizer()
            .apply(&event(r#"{"type":"running","launchId":"L3"}"#));

        let task = {
            let client = client.clone();
            tokio::spawn(async move { client.stop_instance(|| {}).await })
        };
        gateway.called.notified().await;
        client
            .synchronizer()
            .apply(&event(r#"{"type":"stopping","launchId":"L3"}"#));
        client.synchronizer().apply(&event(r#"{"type":"idle"}"#));

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(gateway.calls(), vec![Call::Stop(Some("L3".into()))]);

        // Nothing running: no request.
        client.stop_instance(|| {}).await.unwrap();
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn run_logs_in_on_visit_then_ends_with_connection_error() {
        let gateway = Arc::new(MockGateway::default());
        let client = ZoneClient::new(gateway.clone(), Some("tok-old".into()));
        let (tx, rx) = mpsc::channel(8);

        tx.send(Ok(event(r#"{"type":"visit","secret":"s1"}"#)))
            .await
            .unwrap();
        tx.send(Ok(event(r#"{"type":"log","num":1,"line":"hi"}"#)))
            .await
            .unwrap();
        tx.send(Err(TransportError::Timeout)).await.unwrap();

        let err = client.run(rx).await.unwrap_err();
        assert!(matches!(err, ClientError::Connection(TransportError::Timeout)));
        assert_eq!(
            gateway.calls(),
            vec![Call::Login(Some("tok-old".into()), "s1".into())]
        );
        let session = client.session();
        assert_eq!(session.user_token.as_deref(), Some("tok-new"));
        assert_eq!(session.referral_code.as_deref(), Some("ref"));
        assert_eq!(client.log().len(), 1);
    }

    #[tokio::test]
    async fn rejected_login_ends_run() {
        let gateway = Arc::new(MockGateway::failing());
        let client = ZoneClient::new(gateway.clone(), None);
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(event(r#"{"type":"visit","secret":"s1"}"#)))
            .await
            .unwrap();
        tx.send(Ok(event(r#"{"type":"mods","mods":[]}"#)))
            .await
            .unwrap();

        let err = client.run(rx).await.unwrap_err();
        assert!(matches!(err, ClientError::Gateway(_)));
        // The event after the visit was never applied.
        assert!(!client.synchronizer().is_settled(Aggregate::Mods));
    }
}
