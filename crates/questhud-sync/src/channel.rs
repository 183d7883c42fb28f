//! [`SnapshotChannel`] – reconnecting consumer of server snapshots.
//!
//! The channel owns one background task that cycles through
//!
//! ```text
//! Idle ──start()──▶ Connecting ──open──▶ Connected
//!                       ▲   │                │ close / error
//!                       │   └──failed open───┤
//!                       │                    ▼
//!                       └──after delay── Disconnected (pending retry)
//! ```
//!
//! forever, at a fixed delay, until [`SnapshotChannel::stop`] is called.
//! Every inbound frame is parsed as a complete [`Snapshot`] and replaces the
//! current one; frames that fail to parse are logged and dropped.
//!
//! All state lives behind a [`tokio::sync::watch`] sender.  Every mutation
//! runs inside the sender's lock and first checks the `stopped` flag, so once
//! `stop()` has returned nothing can change the view, not even a task that is
//! mid-poll on another worker thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use questhud_types::{ChannelStatus, HudError, Snapshot};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::transport::SnapshotTransport;

/// Delay between a lost connection and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// What consumers observe: the latest snapshot and the connection status.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelView {
    /// Latest successfully parsed snapshot; kept across disconnects.
    pub snapshot: Snapshot,
    /// Where the connection is in its lifecycle.
    pub status: ChannelStatus,
}

impl ChannelView {
    /// `true` only while the connection is open.
    pub fn is_live(&self) -> bool {
        self.status == ChannelStatus::Connected
    }
}

struct Shared {
    view: watch::Sender<ChannelView>,
    stopped: AtomicBool,
    attempts: AtomicU64,
}

impl Shared {
    /// Apply `f` to the view unless the channel has been stopped.
    /// `f` returns whether it changed anything.
    fn update(&self, f: impl FnOnce(&mut ChannelView) -> bool) -> bool {
        self.view.send_if_modified(|view| {
            if self.stopped.load(Ordering::SeqCst) {
                return false;
            }
            f(view)
        })
    }

    fn set_status(&self, status: ChannelStatus) {
        self.update(|view| {
            if view.status == status {
                return false;
            }
            view.status = status;
            true
        });
    }

    fn apply_frame(&self, text: &str) -> Result<(), HudError> {
        let snapshot = Snapshot::from_json(text)?;
        self.update(move |view| {
            view.snapshot = snapshot;
            true
        });
        Ok(())
    }
}

/// Keeps a single "current snapshot" fresh over a reconnecting transport.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use questhud_sync::{SnapshotChannel, WsTransport};
///
/// #[tokio::main]
/// async fn main() {
///     let channel = SnapshotChannel::new(Arc::new(WsTransport::new("ws://localhost:8787/ws")));
///     channel.start().expect("inside a runtime");
///     println!("objective: {}", channel.current_snapshot().objective);
///     channel.stop();
/// }
/// ```
pub struct SnapshotChannel {
    transport: Arc<dyn SnapshotTransport>,
    reconnect_delay: Duration,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotChannel {
    /// Create an idle channel that starts from [`Snapshot::default`].
    pub fn new(transport: Arc<dyn SnapshotTransport>) -> Self {
        Self::with_initial(transport, Snapshot::default())
    }

    /// Create an idle channel that reports `initial` until the first frame.
    pub fn with_initial(transport: Arc<dyn SnapshotTransport>, initial: Snapshot) -> Self {
        let (view, _) = watch::channel(ChannelView {
            snapshot: initial,
            status: ChannelStatus::Disconnected,
        });
        Self {
            transport,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            shared: Arc::new(Shared {
                view,
                stopped: AtomicBool::new(false),
                attempts: AtomicU64::new(0),
            }),
            task: Mutex::new(None),
        }
    }

    /// Override the reconnect delay (builder-style).
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Return the configured reconnect delay.
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// Begin connecting.
    ///
    /// Idempotent: a no-op while the connection task is already running, and
    /// after [`stop`][Self::stop].
    ///
    /// # Errors
    ///
    /// Returns [`HudError::Runtime`] when called outside a Tokio runtime.
    pub fn start(&self) -> Result<(), HudError> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.stopped.load(Ordering::SeqCst) {
            debug!("start() after stop() ignored");
            return Ok(());
        }
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }
        let handle = Handle::try_current().map_err(|e| HudError::Runtime(e.to_string()))?;

        self.shared.set_status(ChannelStatus::Connecting);
        *task = Some(handle.spawn(run(
            Arc::clone(&self.shared),
            Arc::clone(&self.transport),
            self.reconnect_delay,
        )));
        Ok(())
    }

    /// Release the connection and cancel any pending reconnect.
    ///
    /// The view keeps its last snapshot and reports
    /// [`ChannelStatus::Disconnected`]; nothing mutates it afterwards.
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.view.send_if_modified(|view| {
            if self.shared.stopped.swap(true, Ordering::SeqCst) {
                return false;
            }
            let changed = view.status != ChannelStatus::Disconnected;
            view.status = ChannelStatus::Disconnected;
            changed
        });
        if let Some(task) = task.take() {
            task.abort();
            info!("snapshot channel stopped");
        }
    }

    /// The latest successfully parsed snapshot, or the initial one.
    pub fn current_snapshot(&self) -> Snapshot {
        self.shared.view.borrow().snapshot.clone()
    }

    /// `true` only while the connection is open.
    pub fn is_live(&self) -> bool {
        self.shared.view.borrow().is_live()
    }

    /// Current connection lifecycle state.
    pub fn status(&self) -> ChannelStatus {
        self.shared.view.borrow().status
    }

    /// Number of connection attempts made so far.
    pub fn connect_attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Watch the view for changes.
    pub fn subscribe(&self) -> watch::Receiver<ChannelView> {
        self.shared.view.subscribe()
    }
}

impl Drop for SnapshotChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Connection task
// ────────────────────────────────────────────────────────────────────────────

async fn run(shared: Arc<Shared>, transport: Arc<dyn SnapshotTransport>, delay: Duration) {
    loop {
        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        shared.set_status(ChannelStatus::Connecting);

        match transport.connect().await {
            Ok(mut frames) => {
                info!(attempt, "snapshot channel connected");
                shared.set_status(ChannelStatus::Connected);

                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(text) => {
                            if let Err(e) = shared.apply_frame(&text) {
                                warn!(error = %e, "dropping malformed snapshot frame");
                            }
                        }
                        Err(e @ HudError::MalformedSnapshot(_)) => {
                            warn!(error = %e, "dropping malformed snapshot frame");
                        }
                        Err(e) => {
                            warn!(error = %e, "snapshot transport error");
                            break;
                        }
                    }
                }
                info!("snapshot channel disconnected");
            }
            Err(e) => {
                warn!(attempt, error = %e, "snapshot channel connect failed");
            }
        }

        shared.set_status(ChannelStatus::Disconnected);
        debug!(delay_ms = delay.as_millis() as u64, "reconnecting after delay");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::FrameStream;
    use async_trait::async_trait;
    use futures_util::stream;
    use questhud_types::{DangerLevel, Player};
    use std::collections::VecDeque;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    type FrameTx = mpsc::UnboundedSender<Result<String, HudError>>;

    /// Scripted transport: each `connect()` pops the next script entry.
    /// `None` (or an empty script) refuses the connection.
    #[derive(Default)]
    struct FakeTransport {
        script: Mutex<VecDeque<Option<mpsc::UnboundedReceiver<Result<String, HudError>>>>>,
        attempts: Mutex<Vec<Instant>>,
    }

    impl FakeTransport {
        fn accept_next(&self) -> FrameTx {
            let (tx, rx) = mpsc::unbounded_channel();
            self.script.lock().unwrap().push_back(Some(rx));
            tx
        }

        fn refuse_next(&self) {
            self.script.lock().unwrap().push_back(None);
        }

        fn attempt_times(&self) -> Vec<Instant> {
            self.attempts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SnapshotTransport for FakeTransport {
        async fn connect(&self) -> Result<FrameStream, HudError> {
            self.attempts.lock().unwrap().push(Instant::now());
            match self.script.lock().unwrap().pop_front().flatten() {
                Some(rx) => Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                }))),
                None => Err(HudError::Transport("connection refused".to_string())),
            }
        }
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn snapshot_json(objective: &str) -> String {
        format!(
            r#"{{"player":{{"lat":10,"lon":20,"heading":90}},"objective":"{objective}"}}"#
        )
    }

    fn make_channel() -> (Arc<FakeTransport>, SnapshotChannel) {
        let transport = Arc::new(FakeTransport::default());
        let channel = SnapshotChannel::new(transport.clone());
        (transport, channel)
    }

    #[test]
    fn idle_channel_serves_default_snapshot() {
        let (_, channel) = make_channel();
        assert_eq!(channel.current_snapshot(), Snapshot::default());
        assert!(!channel.is_live());
        assert_eq!(channel.status(), ChannelStatus::Disconnected);
        assert_eq!(channel.reconnect_delay(), DEFAULT_RECONNECT_DELAY);
    }

    #[test]
    fn caller_supplied_initial_snapshot_is_served() {
        let initial = Snapshot {
            objective: "Loading".to_string(),
            ..Snapshot::default()
        };
        let channel =
            SnapshotChannel::with_initial(Arc::new(FakeTransport::default()), initial.clone());
        assert_eq!(channel.current_snapshot(), initial);
    }

    #[test]
    fn start_outside_runtime_is_an_error() {
        let (_, channel) = make_channel();
        assert!(matches!(channel.start(), Err(HudError::Runtime(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_snapshot_then_close() {
        let (transport, channel) = make_channel();
        let tx = transport.accept_next();
        channel.start().unwrap();
        settle().await;
        assert!(channel.is_live());

        tx.send(Ok(r#"{"player":{"lat":1,"lon":2,"heading":0},"objective":"Find the gate","danger_level":"high","boss_fight_active":true,"boss_name":"Warden"}"#.to_string()))
            .unwrap();
        settle().await;

        let snap = channel.current_snapshot();
        assert_eq!(snap.player, Player { lat: 1.0, lon: 2.0, heading: 0.0 });
        assert_eq!(snap.objective, "Find the gate");
        assert_eq!(snap.danger_level, DangerLevel::High);
        assert!(snap.boss.active);
        assert_eq!(snap.boss.name.as_deref(), Some("Warden"));

        // Peer closes the connection.
        drop(tx);
        settle().await;
        assert!(!channel.is_live());
        assert_eq!(channel.current_snapshot(), snap);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_close_reconnects_after_the_delay() {
        let (transport, channel) = make_channel();
        let tx = transport.accept_next();
        let _tx2 = transport.accept_next();
        channel.start().unwrap();
        settle().await;
        tx.send(Ok(snapshot_json("before close"))).unwrap();
        settle().await;

        drop(tx);
        settle().await;
        assert!(!channel.is_live());

        tokio::time::sleep(DEFAULT_RECONNECT_DELAY - Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(channel.connect_attempts(), 1);

        tokio::time::sleep(Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(channel.connect_attempts(), 2);
        assert!(channel.is_live());
        assert_eq!(channel.current_snapshot().objective, "before close");

        let times = transport.attempt_times();
        assert_eq!(times[1] - times[0], DEFAULT_RECONNECT_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_never_replace_the_snapshot() {
        let (transport, channel) = make_channel();
        let tx = transport.accept_next();
        channel.start().unwrap();
        settle().await;

        tx.send(Ok(snapshot_json("first"))).unwrap();
        settle().await;
        assert_eq!(channel.current_snapshot().objective, "first");

        tx.send(Ok("{not json".to_string())).unwrap();
        tx.send(Ok(r#"{"objective":"no player"}"#.to_string())).unwrap();
        tx.send(Err(HudError::MalformedSnapshot("bad utf-8".to_string()))).unwrap();
        settle().await;
        assert_eq!(channel.current_snapshot().objective, "first");
        assert!(channel.is_live(), "malformed frames must not drop the connection");

        tx.send(Ok(snapshot_json("second"))).unwrap();
        settle().await;
        assert_eq!(channel.current_snapshot().objective, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_routes_to_retry() {
        let (transport, channel) = make_channel();
        let tx = transport.accept_next();
        let tx2 = transport.accept_next();
        channel.start().unwrap();
        settle().await;
        tx.send(Ok(snapshot_json("kept"))).unwrap();
        tx.send(Err(HudError::Transport("reset by peer".to_string()))).unwrap();
        settle().await;

        assert_eq!(channel.status(), ChannelStatus::Disconnected);
        assert_eq!(channel.current_snapshot().objective, "kept");

        tokio::time::sleep(DEFAULT_RECONNECT_DELAY).await;
        settle().await;
        assert!(channel.is_live());
        assert_eq!(channel.connect_attempts(), 2);
        drop(tx2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_forever_at_a_fixed_delay() {
        let (transport, channel) = make_channel();
        for _ in 0..5 {
            transport.refuse_next();
        }
        channel.start().unwrap();

        tokio::time::sleep(Duration::from_millis(2000 * 5 + 1)).await;
        settle().await;

        let times = transport.attempt_times();
        assert!(times.len() >= 6, "expected at least 6 attempts, got {}", times.len());
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], DEFAULT_RECONNECT_DELAY);
        }
        assert!(!channel.is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn custom_reconnect_delay_is_honoured() {
        let transport = Arc::new(FakeTransport::default());
        let channel = SnapshotChannel::new(transport.clone())
            .with_reconnect_delay(Duration::from_millis(500));
        channel.start().unwrap();

        tokio::time::sleep(Duration::from_millis(1001)).await;
        settle().await;

        let times = transport.attempt_times();
        assert_eq!(times.len(), 3);
        assert_eq!(times[1] - times[0], Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_single_flight() {
        let (transport, channel) = make_channel();
        let _tx = transport.accept_next();
        channel.start().unwrap();
        channel.start().unwrap();
        settle().await;
        channel.start().unwrap();
        settle().await;
        assert_eq!(transport.attempt_times().len(), 1);
        assert!(channel.is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_reconnect() {
        let (transport, channel) = make_channel();
        channel.start().unwrap();
        settle().await;
        assert_eq!(transport.attempt_times().len(), 1);

        channel.stop();
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(transport.attempt_times().len(), 1);
        assert_eq!(channel.status(), ChannelStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn no_mutation_after_stop() {
        let (transport, channel) = make_channel();
        let tx = transport.accept_next();
        channel.start().unwrap();
        settle().await;
        tx.send(Ok(snapshot_json("before stop"))).unwrap();
        settle().await;

        channel.stop();
        assert!(!channel.is_live());
        let _ = tx.send(Ok(snapshot_json("after stop")));
        settle().await;
        assert_eq!(channel.current_snapshot().objective, "before stop");

        // A stopped channel cannot be restarted.
        channel.start().unwrap();
        settle().await;
        assert_eq!(transport.attempt_times().len(), 1);
        assert_eq!(channel.status(), ChannelStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_each_snapshot() {
        let (transport, channel) = make_channel();
        let tx = transport.accept_next();
        let mut rx = channel.subscribe();
        channel.start().unwrap();

        tx.send(Ok(snapshot_json("watched"))).unwrap();
        loop {
            rx.changed().await.unwrap();
            if rx.borrow_and_update().snapshot.objective == "watched" {
                break;
            }
        }
        assert!(rx.borrow().is_live());
    }
}
