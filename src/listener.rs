//! Global key listener.
//!
//! [`GlobalKeyListener`] owns the OS hook while running. Transitions arrive
//! on an OS-owned callback context and are handed to a [`KeyRecorder`],
//! which turns them into [`KeyEvent`]s in the shared [`SequenceStore`].
//! The callback path never blocks: one atomic load, one short append, and
//! a non-blocking channel send.

use crate::controller::Notification;
use crate::error::Result;
use crate::event::{KeyEvent, KeyState, NativeCode};
use crate::keymap::UNKNOWN_KEY;
use crate::platform::{HookToken, InputBackend, KeyHook, KeyTranslator};
use crate::store::SequenceStore;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Converts raw key transitions into stored events while recording is on.
pub struct KeyRecorder {
    store: Arc<SequenceStore>,
    translator: Arc<dyn KeyTranslator>,
    notifier: Option<UnboundedSender<Notification>>,
    recording: AtomicBool,
    origin: Instant,
    /// Nanoseconds from `origin` to the last stored event.
    last_event: AtomicU64,
}

impl KeyRecorder {
    pub fn new(store: Arc<SequenceStore>, translator: Arc<dyn KeyTranslator>) -> Self {
        Self {
            store,
            translator,
            notifier: None,
            recording: AtomicBool::new(false),
            origin: Instant::now(),
            last_event: AtomicU64::new(0),
        }
    }

    pub fn with_notifier(mut self, notifier: UnboundedSender<Notification>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    /// Start accepting transitions; the first event's delay is measured from now.
    pub fn begin(&self) {
        self.begin_at(Instant::now());
    }

    pub fn begin_at(&self, now: Instant) {
        self.last_event.store(self.offset(now), Ordering::Release);
        self.recording.store(true, Ordering::Release);
    }

    /// Stop accepting transitions. In-flight callbacks observe this on their
    /// next check and leave the store alone.
    pub fn end(&self) {
        self.recording.store(false, Ordering::Release);
    }

    /// Hook callback entry point.
    pub fn handle_transition(&self, code: NativeCode, pressed: bool) -> Option<KeyEvent> {
        self.handle_transition_at(code, pressed, Instant::now())
    }

    /// Record a transition observed at `now`.
    ///
    /// Unknown codes are dropped without touching the store or the timing
    /// origin, so the next recognized key's delay still spans the gap.
    pub fn handle_transition_at(
        &self,
        code: NativeCode,
        pressed: bool,
        now: Instant,
    ) -> Option<KeyEvent> {
        if !self.is_recording() {
            return None;
        }

        let now = self.offset(now);
        let delay = elapsed_ms(self.last_event.load(Ordering::Acquire), now);

        let name = self.translator.code_to_name(code);
        if name == UNKNOWN_KEY {
            debug!("Ignored unknown key code: {}", code);
            return None;
        }

        let event = KeyEvent::new(name, KeyState::from_pressed(pressed), delay)
            .with_native_code(code);
        match self.store.append(event.clone()) {
            Ok(len) => {
                self.last_event.store(now, Ordering::Release);
                debug!("Recorded: {} {} delay: {}ms", event.key, event.state, delay);
                if let Some(notifier) = &self.notifier {
                    let _ = notifier.send(Notification::SequenceChanged { len });
                }
                Some(event)
            }
            Err(e) => {
                warn!("Dropped {} {}: {}", event.key, event.state, e);
                None
            }
        }
    }

    fn offset(&self, at: Instant) -> u64 {
        let nanos = at.saturating_duration_since(self.origin).as_nanos();
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }
}

/// Milliseconds between two offsets, clamped to zero when the clock ran backwards.
fn elapsed_ms(previous: u64, now: u64) -> u64 {
    let nanos = Duration::from_nanos(now.saturating_sub(previous));
    u64::try_from(nanos.as_millis()).unwrap_or(u64::MAX)
}

impl fmt::Debug for KeyRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecorder")
            .field("recording", &self.is_recording())
            .field("events", &self.store.len())
            .finish_non_exhaustive()
    }
}

/// System-wide key listener: `Stopped` until [`start`](Self::start),
/// `Running` until [`stop`](Self::stop) or drop.
pub struct GlobalKeyListener<B: InputBackend> {
    backend: Arc<B>,
    recorder: Arc<KeyRecorder>,
    hook: Option<Box<dyn KeyHook>>,
    token: Option<HookToken>,
}

impl<B: InputBackend> GlobalKeyListener<B> {
    pub fn new(backend: Arc<B>, recorder: Arc<KeyRecorder>) -> Self {
        Self {
            backend,
            recorder,
            hook: None,
            token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.hook.is_some()
    }

    /// Install the OS hook. A no-op while already running.
    ///
    /// Permission failures are returned here, never discovered later.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            debug!("Global key listener already running");
            return Ok(());
        }

        let token = self.backend.hook_slot().claim()?;
        let hook = self.backend.install_hook(Arc::clone(&self.recorder))?;
        self.hook = Some(hook);
        self.token = Some(token);
        info!("Global key listener started");
        Ok(())
    }

    /// Remove the OS hook. Safe to call when already stopped.
    pub fn stop(&mut self) {
        if let Some(mut hook) = self.hook.take() {
            hook.uninstall();
            info!("Global key listener stopped");
        }
        self.token = None;
    }
}

impl<B: InputBackend> Drop for GlobalKeyListener<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap;
    use crate::platform::SimulatedBackend;
    use crate::KsrError;

    fn setup() -> (Arc<SimulatedBackend>, Arc<SequenceStore>, Arc<KeyRecorder>) {
        let backend = Arc::new(SimulatedBackend::with_table(&keymap::windows::TABLE));
        let store = Arc::new(SequenceStore::new());
        let recorder = Arc::new(KeyRecorder::new(
            Arc::clone(&store),
            backend.clone() as Arc<dyn KeyTranslator>,
        ));
        (backend, store, recorder)
    }

    #[test]
    fn test_delay_measured_between_events() {
        let (_, store, recorder) = setup();
        let t0 = Instant::now();
        recorder.begin_at(t0);

        recorder.handle_transition_at(0x41, true, t0 + Duration::from_millis(120));
        recorder.handle_transition_at(0x41, false, t0 + Duration::from_millis(170));

        let events = store.snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].delay, 120);
        assert_eq!(events[0].native_code, Some(0x41));
        assert_eq!(events[1].delay, 50);
        assert_eq!(events[1].state, KeyState::Up);
    }

    #[test]
    fn test_delay_clamped_when_clock_goes_backwards() {
        let (_, store, recorder) = setup();
        let t0 = Instant::now();
        recorder.begin_at(t0 + Duration::from_millis(500));

        let event = recorder
            .handle_transition_at(0x42, true, t0 + Duration::from_millis(100))
            .unwrap();
        assert_eq!(event.delay, 0);

        // Earlier than the previous event again.
        let event = recorder.handle_transition_at(0x42, false, t0).unwrap();
        assert_eq!(event.delay, 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_unknown_key_dropped() {
        let (_, store, recorder) = setup();
        let t0 = Instant::now();
        recorder.begin_at(t0);

        assert!(recorder
            .handle_transition_at(0xFF, true, t0 + Duration::from_millis(10))
            .is_none());
        assert!(store.is_empty());

        let event = recorder
            .handle_transition_at(0x41, true, t0 + Duration::from_millis(30))
            .unwrap();
        assert_eq!(event.delay, 30);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_ignored_when_not_recording() {
        let (_, store, recorder) = setup();
        assert!(recorder.handle_transition(0x41, true).is_none());

        recorder.begin();
        recorder.end();
        assert!(recorder.handle_transition(0x41, true).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_sequence_changed_notification() {
        let backend = Arc::new(SimulatedBackend::with_table(&keymap::windows::TABLE));
        let store = Arc::new(SequenceStore::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let recorder = KeyRecorder::new(Arc::clone(&store), backend as Arc<dyn KeyTranslator>)
            .with_notifier(tx);
        recorder.begin();
        recorder.handle_transition(0x0D, true);

        match rx.try_recv() {
            Ok(Notification::SequenceChanged { len }) => assert_eq!(len, 1),
            other => panic!("unexpected notification: {:?}", other),
        }
    }

    #[test]
    fn test_start_stop_idempotent() {
        let (backend, _, recorder) = setup();
        let mut listener = GlobalKeyListener::new(Arc::clone(&backend), recorder);

        listener.stop();
        assert!(!listener.is_running());

        listener.start().unwrap();
        listener.start().unwrap();
        assert!(listener.is_running());
        assert_eq!(backend.hooks_installed(), 1);

        listener.stop();
        listener.stop();
        assert!(!listener.is_running());
        assert!(!backend.is_hooked());
        assert!(!backend.hook_slot().is_claimed());
    }

    #[test]
    fn test_permission_denied_is_synchronous() {
        let backend = Arc::new(SimulatedBackend::new().deny_permissions());
        let store = Arc::new(SequenceStore::new());
        let recorder = Arc::new(KeyRecorder::new(store, backend.clone() as Arc<dyn KeyTranslator>));
        let mut listener = GlobalKeyListener::new(Arc::clone(&backend), recorder);

        let err = listener.start().unwrap_err();
        assert!(err.is_permission_denied());
        assert!(!listener.is_running());
        assert!(!backend.hook_slot().is_claimed());
    }

    #[test]
    fn test_second_listener_rejected() {
        let (backend, _, recorder) = setup();
        let mut first = GlobalKeyListener::new(Arc::clone(&backend), Arc::clone(&recorder));
        let mut second = GlobalKeyListener::new(Arc::clone(&backend), recorder);

        first.start().unwrap();
        assert!(matches!(second.start(), Err(KsrError::ListenerBusy)));

        drop(first);
        second.start().unwrap();
        assert!(second.is_running());
    }

    #[test]
    fn test_drop_releases_hook() {
        let (backend, _, recorder) = setup();
        {
            let mut listener = GlobalKeyListener::new(Arc::clone(&backend), recorder);
            listener.start().unwrap();
            assert!(backend.is_hooked());
        }
        assert!(!backend.is_hooked());
        assert!(!backend.hook_slot().is_claimed());
    }
}
