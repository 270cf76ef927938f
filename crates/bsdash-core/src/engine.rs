//! Dashboard engine: the controller task behind every handle.
//!
//! `DashboardEngine::start()` loads the startup documents and spawns a tokio
//! task that exclusively owns the [`Dashboard`]. Actions and queries are
//! channel sends answered over oneshot replies. Status fetches run on the
//! blocking pool and report back tagged with their sequence number; view
//! updates fan out over a broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::controller::{Dashboard, EngineConfig};
use crate::documents::{RunParameters, StatusDocument};
use crate::error::{DashError, Result};
use crate::poller::{FileStatusSource, StatusSource};
use crate::render::{CatalogView, DashboardStats, DashboardView, ViewUpdate};
use crate::view::Action;

/// Commands sent to the controller task.
enum Command {
    /// Apply a user action.
    Action {
        action: Action,
        reply: oneshot::Sender<Result<()>>,
    },
    Snapshot(oneshot::Sender<DashboardView>),
    Stats(oneshot::Sender<DashboardStats>),
    Catalog(oneshot::Sender<CatalogView>),
    RunParameters(oneshot::Sender<Option<RunParameters>>),
    ExportAnnotations(oneshot::Sender<String>),
    /// Fetch now, replying once the result has been applied or discarded.
    PollNow(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// A finished status fetch on its way back to the controller.
struct PollResult {
    seq: u64,
    result: Result<StatusDocument>,
    done: Option<oneshot::Sender<()>>,
}

/// Handle to a running dashboard. Cheap to clone; the task stops on
/// [`shutdown`](Self::shutdown) or once every handle is dropped.
#[derive(Clone)]
pub struct DashboardEngine {
    sender: mpsc::UnboundedSender<Command>,
    updates: broadcast::Sender<ViewUpdate>,
    config: Arc<EngineConfig>,
}

impl DashboardEngine {
    /// Start a dashboard polling `brainsuite_state.json` in the QC directory.
    /// Must be called from within a tokio runtime.
    pub fn start(config: EngineConfig) -> Result<Self> {
        let source = Arc::new(FileStatusSource::new(&config.qc_dir));
        Self::start_with_source(config, source)
    }

    pub fn start_with_source(config: EngineConfig, source: Arc<dyn StatusSource>) -> Result<Self> {
        let dashboard = Dashboard::load(&config)?;
        Self::spawn(dashboard, source, config)
    }

    /// Run an already built dashboard. Polling follows `config`.
    pub fn spawn(
        mut dashboard: Dashboard,
        source: Arc<dyn StatusSource>,
        config: EngineConfig,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| DashError::Other(format!("no tokio runtime: {}", e)))?;
        dashboard.configure_polling(&config)?;

        let (sender, receiver) = mpsc::unbounded_channel::<Command>();
        let (updates, _) = broadcast::channel(config.update_capacity.max(1));

        info!(
            source = %source.describe(),
            interval_ms = dashboard.view_state().poll_interval().as_millis() as u64,
            paused = dashboard.view_state().paused(),
            "DashboardEngine started"
        );
        runtime.spawn(controller_task(dashboard, source, receiver, updates.clone()));

        Ok(Self {
            sender,
            updates,
            config: Arc::new(config),
        })
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .map_err(|_| DashError::ChannelClosed)?;
        rx.await.map_err(|_| DashError::ChannelClosed)
    }

    /// Apply a user action. Resulting view updates go to subscribers.
    pub async fn apply(&self, action: Action) -> Result<()> {
        self.request(|reply| Command::Action { action, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<DashboardView> {
        self.request(Command::Snapshot).await
    }

    pub async fn stats(&self) -> Result<DashboardStats> {
        self.request(Command::Stats).await
    }

    pub async fn catalog(&self) -> Result<CatalogView> {
        self.request(Command::Catalog).await
    }

    pub async fn run_parameters(&self) -> Result<Option<RunParameters>> {
        self.request(Command::RunParameters).await
    }

    pub async fn export_annotations(&self) -> Result<String> {
        self.request(Command::ExportAnnotations).await
    }

    /// Poll immediately, outside the timer, and wait until the result has
    /// been applied (or discarded as stale).
    pub async fn poll_now(&self) -> Result<()> {
        self.request(Command::PollNow).await
    }

    /// Receive every view update published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ViewUpdate> {
        self.updates.subscribe()
    }

    /// Stop the controller task. Later calls on any handle fail with
    /// [`DashError::ChannelClosed`].
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

// ─── Controller task ─────────────────────────────────────────────────────────

fn ticker(period: Duration, fire_now: bool) -> Interval {
    let mut ticker = if fire_now {
        interval(period)
    } else {
        interval_at(Instant::now() + period, period)
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn controller_task(
    mut dashboard: Dashboard,
    source: Arc<dyn StatusSource>,
    mut receiver: mpsc::UnboundedReceiver<Command>,
    updates: broadcast::Sender<ViewUpdate>,
) {
    let (poll_tx, mut poll_rx) = mpsc::unbounded_channel::<PollResult>();
    let mut poll_ticker = ticker(dashboard.view_state().poll_interval(), true);

    loop {
        tokio::select! {
            // Prioritize user commands
            biased;

            cmd = receiver.recv() => {
                match cmd {
                    None => {
                        debug!("All engine handles dropped");
                        break;
                    }
                    Some(Command::Action { action, reply }) => {
                        let interval_before = dashboard.view_state().poll_interval();
                        let paused_before = dashboard.view_state().paused();

                        let result = dashboard.handle(action).map(|out| publish(&updates, out));
                        if let Err(e) = &result {
                            warn!("Rejected action: {}", e);
                        }
                        let _ = reply.send(result);

                        let view = dashboard.view_state();
                        if view.poll_interval() != interval_before {
                            info!(interval_ms = view.poll_interval().as_millis() as u64, "Poll interval changed");
                            poll_ticker = ticker(view.poll_interval(), false);
                        } else if paused_before && !view.paused() {
                            info!("Polling resumed");
                            poll_ticker = ticker(view.poll_interval(), true);
                        } else if !paused_before && view.paused() {
                            info!("Polling paused");
                        }
                    }
                    Some(Command::Snapshot(reply)) => {
                        let _ = reply.send(dashboard.view());
                    }
                    Some(Command::Stats(reply)) => {
                        let _ = reply.send(dashboard.stats());
                    }
                    Some(Command::Catalog(reply)) => {
                        let _ = reply.send(dashboard.catalog_view());
                    }
                    Some(Command::RunParameters(reply)) => {
                        let _ = reply.send(dashboard.run_parameters().cloned());
                    }
                    Some(Command::ExportAnnotations(reply)) => {
                        let _ = reply.send(dashboard.export_annotations());
                    }
                    Some(Command::PollNow(reply)) => {
                        issue_poll(&mut dashboard, &source, &poll_tx, Some(reply));
                    }
                    Some(Command::Shutdown(reply)) => {
                        info!("DashboardEngine shutting down");
                        let _ = reply.send(());
                        break;
                    }
                }
            }

            // The task holds `poll_tx`, so this channel never closes.
            Some(PollResult { seq, result, done }) = poll_rx.recv() => {
                publish(&updates, dashboard.apply_poll(seq, result));
                if let Some(done) = done {
                    let _ = done.send(());
                }
            }

            _ = poll_ticker.tick(), if !dashboard.view_state().paused() => {
                issue_poll(&mut dashboard, &source, &poll_tx, None);
            }
        }
    }
}

fn issue_poll(
    dashboard: &mut Dashboard,
    source: &Arc<dyn StatusSource>,
    poll_tx: &mpsc::UnboundedSender<PollResult>,
    done: Option<oneshot::Sender<()>>,
) {
    let seq = dashboard.next_poll_seq();
    let source = Arc::clone(source);
    let poll_tx = poll_tx.clone();
    tokio::spawn(async move {
        let result = tokio::task::spawn_blocking(move || source.fetch())
            .await
            .unwrap_or_else(|e| Err(DashError::Other(format!("status fetch panicked: {}", e))));
        let _ = poll_tx.send(PollResult { seq, result, done });
    });
}

/// Send updates to subscribers. Having none is not an error.
fn publish(updates: &broadcast::Sender<ViewUpdate>, out: Vec<ViewUpdate>) {
    for update in out {
        let _ = updates.send(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use tokio::sync::broadcast::error::RecvError;

    use crate::catalog::Catalog;

    /// Serves queued results in order, then fails.
    struct ScriptedSource(Mutex<Vec<Result<StatusDocument>>>);

    impl StatusSource for ScriptedSource {
        fn fetch(&self) -> Result<StatusDocument> {
            let mut queue = self.0.lock().unwrap();
            if queue.is_empty() {
                Err(DashError::Other("script exhausted".into()))
            } else {
                queue.remove(0)
            }
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn engine(script: Vec<Result<StatusDocument>>) -> DashboardEngine {
        let dashboard = Dashboard::new(
            vec!["S1".into(), "S2".into()],
            Catalog::brainsuite(),
            None,
            "/qc",
        );
        let config = EngineConfig::new("unused").with_start_paused(true);
        DashboardEngine::spawn(dashboard, Arc::new(ScriptedSource(Mutex::new(script))), config)
            .unwrap()
    }

    fn doc(states: &[&str]) -> StatusDocument {
        StatusDocument {
            process_states: states.iter().map(|s| Some(s.to_string())).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn poll_now_applies_and_publishes() {
        let engine = engine(vec![Ok(doc(&["CCCQUUUUUUUUUUU", "NQQQQQQQQQQQQQQ"]))]);
        let mut rx = engine.subscribe();

        engine.poll_now().await.unwrap();
        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.counts.queued, 1);
        assert_eq!(stats.counts.pending, 1);

        assert!(matches!(rx.recv().await.unwrap(), ViewUpdate::Progress(_)));
        assert!(matches!(rx.recv().await.unwrap(), ViewUpdate::Rows(rows) if rows.len() == 2));
    }

    #[tokio::test]
    async fn rejected_action_reports_error() {
        let engine = engine(vec![]);
        let err = engine
            .apply(Action::SelectSubject { subject: 9 })
            .await
            .unwrap_err();
        assert!(matches!(err, DashError::SubjectOutOfRange { index: 9, len: 2 }));
    }

    #[tokio::test]
    async fn shutdown_closes_every_handle() {
        let engine = engine(vec![]);
        let other = engine.clone();
        engine.shutdown().await;
        assert!(matches!(other.snapshot().await, Err(DashError::ChannelClosed)));
    }

    /// Counts fetches; every fetch succeeds.
    struct CountingSource(AtomicUsize);

    impl CountingSource {
        fn fetches(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl StatusSource for CountingSource {
        fn fetch(&self) -> Result<StatusDocument> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(doc(&["CCCCCCCCCCCCCCC", "CCLQQQQQQQQQQQQ"]))
        }

        fn describe(&self) -> String {
            "counting".into()
        }
    }

    fn counting_engine(interval: Duration, paused: bool) -> (DashboardEngine, Arc<CountingSource>) {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let dashboard = Dashboard::new(
            vec!["S1".into(), "S2".into()],
            Catalog::brainsuite(),
            None,
            "/qc",
        );
        let config = EngineConfig::new("unused")
            .with_poll_interval(interval)
            .with_start_paused(paused);
        let engine = DashboardEngine::spawn(dashboard, source.clone(), config).unwrap();
        (engine, source)
    }

    /// Wait for the next applied poll, skipping other updates.
    async fn next_poll(rx: &mut broadcast::Receiver<ViewUpdate>) {
        loop {
            if let ViewUpdate::Progress(_) = rx.recv().await.unwrap() {
                return;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn paused_engine_never_polls_and_resume_polls_at_once() {
        let (engine, source) = counting_engine(Duration::from_secs(1), true);
        let mut rx = engine.subscribe();

        tokio::time::advance(Duration::from_secs(10)).await;
        engine.stats().await.unwrap();
        assert_eq!(source.fetches(), 0);

        let resumed = Instant::now();
        engine.apply(Action::TogglePaused).await.unwrap();
        next_poll(&mut rx).await;
        assert_eq!(source.fetches(), 1);
        assert!(resumed.elapsed() < Duration::from_secs(1));

        engine.apply(Action::TogglePaused).await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;
        engine.stats().await.unwrap();
        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_change_rearms_without_immediate_poll() {
        let (engine, source) = counting_engine(Duration::from_secs(1), false);
        let mut rx = engine.subscribe();

        // first tick fires on start
        next_poll(&mut rx).await;
        assert_eq!(source.fetches(), 1);

        let changed = Instant::now();
        engine
            .apply(Action::SetPollInterval { millis: 5000 })
            .await
            .unwrap();

        next_poll(&mut rx).await;
        let first = changed.elapsed();
        assert!(first >= Duration::from_secs(5), "{:?}", first);
        assert!(first < Duration::from_secs(6), "{:?}", first);
        assert_eq!(source.fetches(), 2);

        next_poll(&mut rx).await;
        let second = changed.elapsed();
        assert!(second >= Duration::from_secs(10), "{:?}", second);
        assert!(second < Duration::from_secs(11), "{:?}", second);
        assert_eq!(source.fetches(), 3);
    }

    #[tokio::test]
    async fn slow_subscriber_lags_with_tiny_capacity() {
        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let dashboard = Dashboard::new(vec!["S1".into()], Catalog::brainsuite(), None, "/qc");
        let config = EngineConfig::new("unused")
            .with_start_paused(true)
            .with_update_capacity(1);
        let engine = DashboardEngine::spawn(dashboard, source, config).unwrap();
        let mut rx = engine.subscribe();

        // a poll publishes a progress and a rows update
        engine.poll_now().await.unwrap();
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(1))));
        assert!(matches!(rx.recv().await, Ok(ViewUpdate::Rows(_))));
    }
}
