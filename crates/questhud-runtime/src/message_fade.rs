//! [`MessageFade`] – show/fade/hide timing for the server's HUD message.
//!
//! ```text
//! Hidden ──visible msg──▶ Visible ──timeoutMs──▶ FadingOut ──500 ms──▶ Hidden
//!                            │                       ▲
//!                            └──── hidden msg ───────┘
//! ```
//!
//! A `timeoutMs` of `0` keeps the message up until the server replaces it.
//! Applying a different message cancels whatever timer is pending; applying
//! the same message again leaves the running timer alone, since every
//! snapshot repeats the current message.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use questhud_types::{HudError, HudMessage};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Length of the fade-out animation.
pub const FADE_DURATION: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FadePhase {
    #[default]
    Hidden,
    Visible,
    FadingOut,
}

/// What the overlay should draw right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FadeState {
    pub phase: FadePhase,
    /// Empty while hidden.
    pub text: String,
}

struct Shared {
    state: watch::Sender<FadeState>,
    generation: AtomicU64,
    stopped: AtomicBool,
}

impl Shared {
    /// Apply `f` unless stopped or superseded by a newer message.
    fn transition(&self, generation: u64, f: impl FnOnce(&mut FadeState) -> bool) -> bool {
        self.state.send_if_modified(|state| {
            if self.stopped.load(Ordering::SeqCst)
                || self.generation.load(Ordering::SeqCst) != generation
            {
                return false;
            }
            f(state)
        })
    }
}

/// Drives a [`FadeState`] from the messages of successive snapshots.
///
/// Timers run on the ambient Tokio runtime and are aborted by [`stop`][Self::stop]
/// or when the value is dropped.
pub struct MessageFade {
    shared: Arc<Shared>,
    last: Mutex<Option<HudMessage>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl MessageFade {
    /// Create a fader in the [`FadePhase::Hidden`] phase.
    pub fn new() -> Self {
        let (state, _) = watch::channel(FadeState::default());
        Self {
            shared: Arc::new(Shared {
                state,
                generation: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
            }),
            last: Mutex::new(None),
            timer: Mutex::new(None),
        }
    }

    /// Feed the message carried by the latest snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`HudError::Runtime`] when a timer is needed and no Tokio
    /// runtime is available.  The state is left untouched in that case.
    pub fn apply(&self, message: &HudMessage) -> Result<(), HudError> {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_ref() == Some(message) {
            return Ok(());
        }

        let shows = message.visible && !message.text.is_empty();
        let currently_hidden = self.shared.state.borrow().phase == FadePhase::Hidden;
        let needs_timer = if shows {
            message.timeout_ms > 0
        } else {
            !currently_hidden
        };
        let handle = if needs_timer {
            Some(Handle::try_current().map_err(|e| HudError::Runtime(e.to_string()))?)
        } else {
            None
        };

        *last = Some(message.clone());
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.take() {
            previous.abort();
            debug!(generation, "pending fade timer cancelled");
        }

        let shared = Arc::clone(&self.shared);
        if shows {
            let text = message.text.clone();
            let shown = shared.transition(generation, |state| {
                let next = FadeState {
                    phase: FadePhase::Visible,
                    text,
                };
                if *state == next {
                    return false;
                }
                *state = next;
                true
            });
            if shown {
                debug!(text = %message.text, timeout_ms = message.timeout_ms, "message shown");
            }
            if let Some(handle) = handle {
                let hold = Duration::from_millis(message.timeout_ms);
                *timer = Some(handle.spawn(async move {
                    tokio::time::sleep(hold).await;
                    if shared.transition(generation, |state| {
                        state.phase = FadePhase::FadingOut;
                        true
                    }) {
                        debug!(generation, "message timed out, fading out");
                    }
                    fade_then_hide(&shared, generation).await;
                }));
            }
        } else if let Some(handle) = handle {
            if shared.transition(generation, |state| {
                if state.phase == FadePhase::FadingOut {
                    return false;
                }
                state.phase = FadePhase::FadingOut;
                true
            }) {
                debug!(generation, "message withdrawn, fading out");
            }
            *timer = Some(handle.spawn(async move {
                fade_then_hide(&shared, generation).await;
            }));
        }
        Ok(())
    }

    /// Cancel pending timers and freeze the current state.
    pub fn stop(&self) {
        self.shared.state.send_if_modified(|_| {
            self.shared.stopped.store(true, Ordering::SeqCst);
            false
        });
        if let Some(timer) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }
        debug!("message fade stopped");
    }

    /// The phase and text to draw right now.
    pub fn state(&self) -> FadeState {
        self.shared.state.borrow().clone()
    }

    /// Receive every phase change.
    pub fn subscribe(&self) -> watch::Receiver<FadeState> {
        self.shared.state.subscribe()
    }
}

impl Default for MessageFade {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageFade {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn fade_then_hide(shared: &Shared, generation: u64) {
    tokio::time::sleep(FADE_DURATION).await;
    if shared.transition(generation, |state| {
        *state = FadeState::default();
        true
    }) {
        debug!(generation, "message hidden");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn msg(text: &str, visible: bool, timeout_ms: u64) -> HudMessage {
        HudMessage {
            text: text.to_string(),
            visible,
            timeout_ms,
        }
    }

    fn phase(fade: &MessageFade) -> FadePhase {
        fade.state().phase
    }

    #[tokio::test(start_paused = true)]
    async fn visible_message_fades_after_timeout_then_hides() {
        let fade = MessageFade::new();
        fade.apply(&msg("Boss incoming", true, 3000)).unwrap();
        assert_eq!(
            fade.state(),
            FadeState {
                phase: FadePhase::Visible,
                text: "Boss incoming".into()
            }
        );

        sleep(Duration::from_millis(2900)).await;
        assert_eq!(phase(&fade), FadePhase::Visible);

        sleep(Duration::from_millis(200)).await;
        assert_eq!(phase(&fade), FadePhase::FadingOut);
        assert_eq!(fade.state().text, "Boss incoming");

        sleep(Duration::from_millis(500)).await;
        assert_eq!(fade.state(), FadeState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_stays_visible() {
        let fade = MessageFade::new();
        fade.apply(&msg("Hold the line", true, 0)).unwrap();
        sleep(Duration::from_secs(3600)).await;
        assert_eq!(phase(&fade), FadePhase::Visible);
    }

    #[tokio::test(start_paused = true)]
    async fn new_message_restarts_the_timer() {
        let fade = MessageFade::new();
        fade.apply(&msg("first", true, 1000)).unwrap();
        sleep(Duration::from_millis(900)).await;
        fade.apply(&msg("second", true, 1000)).unwrap();

        sleep(Duration::from_millis(200)).await;
        assert_eq!(
            fade.state(),
            FadeState {
                phase: FadePhase::Visible,
                text: "second".into()
            }
        );

        sleep(Duration::from_millis(900)).await;
        assert_eq!(phase(&fade), FadePhase::FadingOut);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_message_keeps_the_running_timer() {
        let fade = MessageFade::new();
        let m = msg("same", true, 1000);
        fade.apply(&m).unwrap();
        sleep(Duration::from_millis(900)).await;
        fade.apply(&m).unwrap();
        sleep(Duration::from_millis(200)).await;
        assert_eq!(phase(&fade), FadePhase::FadingOut);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_message_fades_out_the_current_one() {
        let fade = MessageFade::new();
        fade.apply(&msg("up", true, 0)).unwrap();
        fade.apply(&msg("up", false, 0)).unwrap();
        assert_eq!(
            fade.state(),
            FadeState {
                phase: FadePhase::FadingOut,
                text: "up".into()
            }
        );
        sleep(Duration::from_millis(600)).await;
        assert_eq!(phase(&fade), FadePhase::Hidden);
    }

    #[test]
    fn hidden_message_while_hidden_needs_no_runtime() {
        let fade = MessageFade::new();
        fade.apply(&msg("", false, 0)).unwrap();
        fade.apply(&msg("ignored", false, 5000)).unwrap();
        assert_eq!(fade.state(), FadeState::default());
    }

    #[test]
    fn timed_message_outside_runtime_is_an_error() {
        let fade = MessageFade::new();
        let err = fade.apply(&msg("timed", true, 1000)).unwrap_err();
        assert!(matches!(err, HudError::Runtime(_)));
        assert_eq!(fade.state(), FadeState::default());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_timers() {
        let fade = MessageFade::new();
        fade.apply(&msg("frozen", true, 1000)).unwrap();
        fade.stop();
        sleep(Duration::from_millis(2000)).await;
        assert_eq!(phase(&fade), FadePhase::Visible);

        fade.apply(&msg("later", true, 0)).unwrap();
        assert_eq!(fade.state().text, "frozen");
    }

    /// Collects the `message` field of every event.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<String>>>);

    struct MessageField(String);

    impl tracing::field::Visit for MessageField {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for Captured {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            let mut field = MessageField(String::new());
            event.record(&mut field);
            self.0.lock().unwrap().push(field.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn phase_transitions_are_logged() {
        use tracing_subscriber::layer::SubscriberExt;

        let captured = Captured::default();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(captured.clone()),
        );

        let fade = MessageFade::new();
        fade.apply(&msg("first", true, 1000)).unwrap();
        fade.apply(&msg("second", true, 100)).unwrap();
        sleep(Duration::from_millis(700)).await;
        fade.stop();

        let lines = captured.0.lock().unwrap().clone();
        let position = |needle: &str| {
            lines
                .iter()
                .position(|l| l.contains(needle))
                .unwrap_or_else(|| panic!("no `{needle}` in {lines:?}"))
        };
        assert!(position("message shown") < position("pending fade timer cancelled"));
        assert!(position("pending fade timer cancelled") < position("message timed out"));
        assert!(position("message timed out") < position("message hidden"));
        assert!(position("message hidden") < position("message fade stopped"));
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_each_phase() {
        let fade = MessageFade::new();
        let mut rx = fade.subscribe();
        fade.apply(&msg("watch me", true, 100)).unwrap();

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().phase, FadePhase::Visible);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().phase, FadePhase::FadingOut);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().phase, FadePhase::Hidden);
    }
}
