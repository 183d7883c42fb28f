//! [`PositionFusion`] – the live position/heading pipeline.
//!
//! Wires a [`LocationSource`] and an [`OrientationSource`] into a
//! [`FusionEngine`], publishes the result as a [`FusionView`], and forwards
//! every accepted sample to a [`PositionReporter`].
//!
//! Three tasks run per instance:
//!
//! | Task | Role |
//! |---|---|
//! | location watch | feeds fixes through the throttle gate, maps errors to [`SensorStatus`] |
//! | orientation watch | awaits consent, then feeds every reading into the heading filter |
//! | report forwarder | drains a bounded queue into the reporter; failures are logged only |
//!
//! The location watch never waits on the forwarder: when the queue is full
//! the update is dropped with a warning.
//!
//! Every mutation runs inside the watch sender's lock after checking the
//! `stopped` flag, so nothing changes once [`PositionFusion::stop`] has
//! returned.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use questhud_types::{HudError, LocationUpdate, SensorStatus};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::fusion::{DEFAULT_LOCATION_INTERVAL, FusionEngine, LocalSample};
use crate::heading::DEFAULT_SMOOTHING;
use crate::reporter::PositionReporter;
use crate::sources::{
    LocationError, LocationReading, LocationSource, OrientationReading, OrientationSource,
};

/// Capacity of the queue between sampling and reporting.
pub const DEFAULT_REPORT_QUEUE: usize = 16;

/// Tuning knobs for [`PositionFusion`].
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// Minimum spacing between accepted location fixes.
    pub location_interval: Duration,
    /// Heading smoothing factor in `[0, 1]`.
    pub smoothing: f64,
    /// Pending reports kept before new ones are dropped.
    pub report_queue: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            location_interval: DEFAULT_LOCATION_INTERVAL,
            smoothing: DEFAULT_SMOOTHING,
            report_queue: DEFAULT_REPORT_QUEUE,
        }
    }
}

/// What consumers observe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionView {
    /// Latest accepted sample, `None` until the first fix.
    pub sample: Option<LocalSample>,
    /// Combined permission and sensing state.
    pub status: SensorStatus,
    /// User-facing explanation of the last sensing failure.
    pub error: Option<String>,
    /// `true` once a compass reading has been applied.
    pub has_compass: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Shared state
// ────────────────────────────────────────────────────────────────────────────

struct Shared {
    view: watch::Sender<FusionView>,
    engine: Mutex<FusionEngine>,
    stopped: AtomicBool,
    location_watches: AtomicU64,
    /// Bumped by every `request_permissions`; writes from an older location
    /// watch are discarded.
    location_generation: AtomicU64,
}

impl Shared {
    fn update(&self, f: impl FnOnce(&mut FusionView) -> bool) -> bool {
        self.view.send_if_modified(|view| {
            if self.stopped.load(Ordering::SeqCst) {
                return false;
            }
            f(view)
        })
    }

    /// Like [`update`][Self::update], but only for the current location watch.
    fn update_location(&self, generation: u64, f: impl FnOnce(&mut FusionView) -> bool) -> bool {
        self.update(|view| {
            if self.location_generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            f(view)
        })
    }

    fn engine(&self) -> std::sync::MutexGuard<'_, FusionEngine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_orientation(&self, reading: OrientationReading) {
        self.update(|view| {
            if !self.engine().update_orientation(reading) {
                return false;
            }
            let changed = !view.has_compass;
            view.has_compass = true;
            changed
        });
    }

    fn on_location(
        &self,
        generation: u64,
        reading: &LocationReading,
        now: Instant,
    ) -> Option<LocalSample> {
        let mut accepted = None;
        self.update_location(generation, |view| {
            let Some(sample) = self.engine().update_location(reading, now) else {
                return false;
            };
            view.sample = Some(sample);
            view.status = SensorStatus::Active;
            view.error = None;
            accepted = Some(sample);
            true
        });
        accepted
    }

    fn on_location_error(&self, generation: u64, error: LocationError) {
        self.update_location(generation, |view| {
            // Only a successful fix (or a fresh request) leaves `Denied`.
            if view.status == SensorStatus::Denied && error != LocationError::PermissionDenied {
                return false;
            }
            view.status = match error {
                LocationError::PermissionDenied => SensorStatus::Denied,
                _ => SensorStatus::Error,
            };
            view.error = Some(error.user_message().to_string());
            true
        });
    }
}

// ────────────────────────────────────────────────────────────────────────────
// PositionFusion
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Tasks {
    location: Option<JoinHandle<()>>,
    orientation: Option<JoinHandle<()>>,
    forwarder: Option<JoinHandle<()>>,
    reports: Option<mpsc::Sender<LocationUpdate>>,
}

fn is_running(task: &Option<JoinHandle<()>>) -> bool {
    task.as_ref().is_some_and(|t| !t.is_finished())
}

/// Fuses location and orientation sensors into a throttled, smoothed local
/// sample and reports it upstream.
pub struct PositionFusion {
    location: Arc<dyn LocationSource>,
    orientation: Arc<dyn OrientationSource>,
    reporter: Arc<dyn PositionReporter>,
    report_queue: usize,
    shared: Arc<Shared>,
    tasks: Mutex<Tasks>,
}

impl PositionFusion {
    /// Create an idle pipeline with [`FusionConfig::default`].
    pub fn new(
        location: Arc<dyn LocationSource>,
        orientation: Arc<dyn OrientationSource>,
        reporter: Arc<dyn PositionReporter>,
    ) -> Self {
        Self::with_config(location, orientation, reporter, FusionConfig::default())
    }

    /// Create an idle pipeline with explicit tuning.
    pub fn with_config(
        location: Arc<dyn LocationSource>,
        orientation: Arc<dyn OrientationSource>,
        reporter: Arc<dyn PositionReporter>,
        config: FusionConfig,
    ) -> Self {
        let (view, _) = watch::channel(FusionView::default());
        Self {
            location,
            orientation,
            reporter,
            report_queue: config.report_queue.max(1),
            shared: Arc::new(Shared {
                view,
                engine: Mutex::new(FusionEngine::new(config.location_interval, config.smoothing)),
                stopped: AtomicBool::new(false),
                location_watches: AtomicU64::new(0),
                location_generation: AtomicU64::new(0),
            }),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    /// Start sensing.
    ///
    /// Moves the status to [`SensorStatus::Acquiring`], starts the location
    /// watch, and independently starts the orientation consent + watch so a
    /// pending consent prompt never holds back location fixes.
    ///
    /// A no-op while the location watch is running (unless the status is
    /// [`SensorStatus::Denied`], which a new request retries) and after
    /// [`stop`][Self::stop].
    ///
    /// # Errors
    ///
    /// Returns [`HudError::Runtime`] when called outside a Tokio runtime.
    pub fn request_permissions(&self) -> Result<(), HudError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if self.shared.stopped.load(Ordering::SeqCst) {
            debug!("request_permissions() after stop() ignored");
            return Ok(());
        }
        if is_running(&tasks.location) && self.sensor_status() != SensorStatus::Denied {
            return Ok(());
        }
        let handle = Handle::try_current().map_err(|e| HudError::Runtime(e.to_string()))?;

        if let Some(previous) = tasks.location.take() {
            previous.abort();
        }
        // The aborted watch may still be mid-write on another worker; the
        // generation bump makes any such write a no-op.
        let generation = self.shared.location_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.update(|view| {
            view.status = SensorStatus::Acquiring;
            view.error = None;
            true
        });

        let reports = match &tasks.reports {
            Some(tx) => tx.clone(),
            None => {
                let (tx, rx) = mpsc::channel(self.report_queue);
                let forwarder = forward_reports(rx, Arc::clone(&self.reporter));
                tasks.forwarder = Some(handle.spawn(forwarder));
                tasks.reports = Some(tx.clone());
                tx
            }
        };

        tasks.location = Some(handle.spawn(watch_location(
            Arc::clone(&self.shared),
            Arc::clone(&self.location),
            reports,
            generation,
        )));
        if !is_running(&tasks.orientation) {
            tasks.orientation = Some(handle.spawn(watch_orientation(
                Arc::clone(&self.shared),
                Arc::clone(&self.orientation),
            )));
        }
        info!(generation, "position fusion acquiring");
        Ok(())
    }

    /// Unsubscribe both sensors and stop reporting.  The view is frozen at
    /// its last value.
    pub fn stop(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        self.shared.view.send_if_modified(|_| {
            self.shared.stopped.store(true, Ordering::SeqCst);
            false
        });
        let mut aborted = false;
        for task in [tasks.location.take(), tasks.orientation.take(), tasks.forwarder.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
            aborted = true;
        }
        tasks.reports = None;
        if aborted {
            info!("position fusion stopped");
        }
    }

    /// Latest accepted sample, `None` until the first fix.
    pub fn current_local_sample(&self) -> Option<LocalSample> {
        self.shared.view.borrow().sample
    }

    /// Current permission and sensing state.
    pub fn sensor_status(&self) -> SensorStatus {
        self.shared.view.borrow().status
    }

    /// User-facing message for the last sensing failure, if any.
    pub fn sensor_error(&self) -> Option<String> {
        self.shared.view.borrow().error.clone()
    }

    /// `true` once a compass reading has been applied.
    pub fn has_compass(&self) -> bool {
        self.shared.view.borrow().has_compass
    }

    /// Number of location watches opened so far.
    pub fn location_watches(&self) -> u64 {
        self.shared.location_watches.load(Ordering::SeqCst)
    }

    /// Watch the view for changes.
    pub fn subscribe(&self) -> watch::Receiver<FusionView> {
        self.shared.view.subscribe()
    }
}

impl Drop for PositionFusion {
    fn drop(&mut self) {
        self.stop();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tasks
// ────────────────────────────────────────────────────────────────────────────

async fn watch_location(
    shared: Arc<Shared>,
    source: Arc<dyn LocationSource>,
    reports: mpsc::Sender<LocationUpdate>,
    generation: u64,
) {
    shared.location_watches.fetch_add(1, Ordering::SeqCst);
    let mut fixes = match source.watch().await {
        Ok(fixes) => fixes,
        Err(e) => {
            warn!(error = %e, "location watch could not start");
            shared.on_location_error(generation, e);
            return;
        }
    };

    while let Some(item) = fixes.next().await {
        match item {
            Ok(reading) => {
                let Some(sample) = shared.on_location(generation, &reading, Instant::now()) else {
                    trace!("location fix throttled");
                    continue;
                };
                let update = LocationUpdate {
                    lat: sample.lat,
                    lon: sample.lon,
                    heading: sample.heading,
                };
                match reports.try_send(update) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        warn!("position report queue full; dropping update");
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("position report queue closed");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "location error");
                shared.on_location_error(generation, e);
            }
        }
    }
    debug!("location watch ended");
}

async fn watch_orientation(shared: Arc<Shared>, source: Arc<dyn OrientationSource>) {
    let consent = source.request_consent().await;
    if !consent.allows_watch() {
        warn!("orientation permission denied; heading falls back to location course");
        return;
    }
    debug!(?consent, "orientation watch starting");

    let mut readings = source.watch();
    while let Some(reading) = readings.next().await {
        shared.on_orientation(reading);
    }
    debug!("orientation watch ended");
}

async fn forward_reports(
    mut rx: mpsc::Receiver<LocationUpdate>,
    reporter: Arc<dyn PositionReporter>,
) {
    while let Some(update) = rx.recv().await {
        if let Err(e) = reporter.report(&update).await {
            warn!(error = %e, "failed to send position update");
        }
    }
}
