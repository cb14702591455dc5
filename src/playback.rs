//! Timed, cancellable replay of recorded sequences.
//!
//! The [`PlaybackEngine`] runs on a dedicated worker thread owned by a
//! [`PlaybackWorker`]. Play requests reach the worker as queued commands;
//! cancellation is the only thing the outside world touches directly, via
//! an atomic flag that the loop polls at every suspension point.

use crate::error::{KsrError, Result};
use crate::event::{KeyEvent, NativeCode};
use crate::platform::InputBackend;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

/// Longest uninterrupted sleep; bounds how late a cancellation is observed.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Fixed pauses around the recorded delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackTiming {
    /// Pause before the first emission so the target window can take focus.
    pub settle_delay: Duration,
    /// Pause between repetitions.
    pub repetition_gap: Duration,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(300),
            repetition_gap: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    pub outcome: PlaybackOutcome,
    pub emitted: usize,
    pub failed: usize,
}

/// Sink for replayed events.
pub trait Emit: Send {
    fn emit(&mut self, event: &KeyEvent) -> Result<()>;
}

/// Turns replayed events back into native synthetic key transitions.
pub struct SyntheticEmitter<B: InputBackend> {
    backend: Arc<B>,
    prefer_native_code: bool,
    failures: Arc<AtomicU64>,
}

impl<B: InputBackend> SyntheticEmitter<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            prefer_native_code: true,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Use the code captured at record time instead of re-resolving the name.
    pub fn prefer_native_code(mut self, prefer: bool) -> Self {
        self.prefer_native_code = prefer;
        self
    }

    /// Shared counter of events that could not be emitted.
    pub fn failure_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.failures)
    }

    fn resolve(&self, event: &KeyEvent) -> Option<NativeCode> {
        if self.prefer_native_code {
            if let Some(code) = event.native_code {
                return Some(code);
            }
        }
        self.backend.name_to_code(&event.key).or(event.native_code)
    }
}

impl<B: InputBackend> Emit for SyntheticEmitter<B> {
    fn emit(&mut self, event: &KeyEvent) -> Result<()> {
        let result = match self.resolve(event) {
            Some(code) => self.backend.post_key(code, event.state),
            None => Err(KsrError::unknown_key(event.key.as_str())),
        };
        if result.is_err() {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}

/// Replays one snapshot `repeat_count` times.
///
/// Assumes a single caller; the owning [`PlaybackWorker`] rejects
/// overlapping requests.
pub struct PlaybackEngine<E: Emit> {
    emitter: E,
    timing: PlaybackTiming,
    cancel: Arc<AtomicBool>,
}

impl<E: Emit> PlaybackEngine<E> {
    pub fn new(emitter: E, timing: PlaybackTiming, cancel: Arc<AtomicBool>) -> Self {
        Self {
            emitter,
            timing,
            cancel,
        }
    }

    pub fn play(&mut self, events: &[KeyEvent], repeat_count: u32) -> PlaybackReport {
        let mut report = PlaybackReport {
            outcome: PlaybackOutcome::Completed,
            emitted: 0,
            failed: 0,
        };
        if events.is_empty() {
            return report;
        }

        if !self.wait(self.timing.settle_delay) {
            debug!("Playback stopped during initial delay");
            report.outcome = PlaybackOutcome::Cancelled;
            return report;
        }

        for rep in 0..repeat_count {
            if rep > 0 && !self.wait(self.timing.repetition_gap) {
                report.outcome = PlaybackOutcome::Cancelled;
                return report;
            }
            debug!("Playing repetition {} of {}", rep + 1, repeat_count);

            for event in events {
                if self.is_cancelled() {
                    report.outcome = PlaybackOutcome::Cancelled;
                    return report;
                }
                if event.delay > 0 && !self.wait(Duration::from_millis(event.delay)) {
                    debug!("Playback stopped during delay before {} {}", event.key, event.state);
                    report.outcome = PlaybackOutcome::Cancelled;
                    return report;
                }

                match self.emitter.emit(event) {
                    Ok(()) => report.emitted += 1,
                    Err(e) => {
                        warn!("Skipped {} {}: {}", event.key, event.state, e);
                        report.failed += 1;
                    }
                }
            }
        }
        report
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Sleep for `duration`; false if cancellation was requested meanwhile.
    fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(CANCEL_POLL_INTERVAL));
        }
    }
}

enum Command {
    Play {
        events: Vec<KeyEvent>,
        repeat_count: u32,
    },
    Shutdown,
}

/// Dedicated playback thread.
///
/// `on_finish` runs on the worker thread exactly once per accepted
/// [`submit`](Self::submit). The worker stays active until it returns, so a
/// new playback can never be accepted before the previous one is reported.
pub struct PlaybackWorker {
    commands: UnboundedSender<Command>,
    cancel: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackWorker {
    pub fn spawn<E, F>(emitter: E, timing: PlaybackTiming, mut on_finish: F) -> Result<Self>
    where
        E: Emit + 'static,
        F: FnMut(PlaybackReport) + Send + 'static,
    {
        let (commands, mut receiver) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let active = Arc::new(AtomicBool::new(false));

        let mut engine = PlaybackEngine::new(emitter, timing, Arc::clone(&cancel));
        let worker_active = Arc::clone(&active);
        let thread = thread::Builder::new()
            .name("ksr-playback".to_string())
            .spawn(move || {
                while let Some(command) = receiver.blocking_recv() {
                    match command {
                        Command::Play {
                            events,
                            repeat_count,
                        } => {
                            info!(
                                "Playback started: {} events x {} repetitions",
                                events.len(),
                                repeat_count
                            );
                            let report = engine.play(&events, repeat_count);
                            info!(
                                "Playback {:?}: {} emitted, {} skipped",
                                report.outcome, report.emitted, report.failed
                            );
                            on_finish(report);
                            worker_active.store(false, Ordering::Release);
                        }
                        Command::Shutdown => break,
                    }
                }
            })?;

        Ok(Self {
            commands,
            cancel,
            active,
            thread: Some(thread),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Queue a playback of an independent snapshot.
    pub fn submit(&self, events: Vec<KeyEvent>, repeat_count: u32) -> Result<()> {
        if repeat_count == 0 {
            return Err(KsrError::InvalidRepeatCount(repeat_count));
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(KsrError::AlreadyPlaying);
        }

        // Cleared before queuing so a stop issued before the worker dequeues
        // the job is not lost.
        self.cancel.store(false, Ordering::Release);
        if self
            .commands
            .send(Command::Play {
                events,
                repeat_count,
            })
            .is_err()
        {
            self.active.store(false, Ordering::Release);
            return Err(KsrError::playback("worker thread has exited"));
        }
        Ok(())
    }

    /// Request cancellation of the active playback.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }
}

impl Drop for PlaybackWorker {
    fn drop(&mut self) {
        self.cancel();
        let _ = self.commands.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Playback worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::KeyState;
    use crate::keymap;
    use crate::platform::SimulatedBackend;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<(String, KeyState)>>>);

    impl Emit for Collect {
        fn emit(&mut self, event: &KeyEvent) -> Result<()> {
            if event.key == "Broken" {
                return Err(KsrError::unknown_key("Broken"));
            }
            self.0.lock().unwrap().push((event.key.clone(), event.state));
            Ok(())
        }
    }

    fn fast() -> PlaybackTiming {
        PlaybackTiming {
            settle_delay: Duration::ZERO,
            repetition_gap: Duration::from_millis(5),
        }
    }

    fn abc() -> Vec<KeyEvent> {
        vec![
            KeyEvent::new("A", KeyState::Down, 0),
            KeyEvent::new("A", KeyState::Up, 5),
            KeyEvent::new("B", KeyState::Down, 10),
        ]
    }

    #[test]
    fn test_play_repeats_in_order() {
        let sink = Collect::default();
        let mut engine =
            PlaybackEngine::new(sink.clone(), fast(), Arc::new(AtomicBool::new(false)));
        let report = engine.play(&abc(), 2);

        assert_eq!(report.outcome, PlaybackOutcome::Completed);
        assert_eq!(report.emitted, 6);
        let keys: Vec<_> = sink.0.lock().unwrap().clone();
        let expected: Vec<_> = [
            ("A", KeyState::Down),
            ("A", KeyState::Up),
            ("B", KeyState::Down),
        ]
        .iter()
        .cycle()
        .take(6)
        .map(|(k, s)| (k.to_string(), *s))
        .collect();
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_failed_emission_does_not_abort() {
        let sink = Collect::default();
        let mut engine =
            PlaybackEngine::new(sink.clone(), fast(), Arc::new(AtomicBool::new(false)));
        let events = vec![
            KeyEvent::new("A", KeyState::Down, 0),
            KeyEvent::new("Broken", KeyState::Down, 0),
            KeyEvent::new("A", KeyState::Up, 0),
        ];
        let report = engine.play(&events, 1);

        assert_eq!(report.outcome, PlaybackOutcome::Completed);
        assert_eq!(report.emitted, 2);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn test_cancel_before_start() {
        let sink = Collect::default();
        let cancel = Arc::new(AtomicBool::new(true));
        let mut engine = PlaybackEngine::new(sink.clone(), PlaybackTiming::default(), cancel);
        let started = Instant::now();
        let report = engine.play(&abc(), 3);

        assert_eq!(report.outcome, PlaybackOutcome::Cancelled);
        assert_eq!(report.emitted, 0);
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn test_empty_sequence_completes() {
        let mut engine = PlaybackEngine::new(
            Collect::default(),
            PlaybackTiming::default(),
            Arc::new(AtomicBool::new(false)),
        );
        let report = engine.play(&[], 4);
        assert_eq!(report.outcome, PlaybackOutcome::Completed);
        assert_eq!(report.emitted, 0);
    }

    #[test]
    fn test_synthetic_emitter_resolution() {
        let backend = Arc::new(SimulatedBackend::with_table(&keymap::windows::TABLE));
        let mut emitter = SyntheticEmitter::new(Arc::clone(&backend));
        let failures = emitter.failure_counter();

        // Cached code wins over the name.
        emitter
            .emit(&KeyEvent::new("A", KeyState::Down, 0).with_native_code(0x42))
            .unwrap();
        // No cached code: resolved by name.
        emitter.emit(&KeyEvent::new("Enter", KeyState::Up, 0)).unwrap();
        // Unresolvable.
        assert!(emitter.emit(&KeyEvent::new("Hyper", KeyState::Down, 0)).is_err());

        let posted: Vec<_> = backend.posted().iter().map(|p| (p.code, p.state)).collect();
        assert_eq!(posted, vec![(0x42, KeyState::Down), (0x0D, KeyState::Up)]);
        assert_eq!(failures.load(Ordering::Relaxed), 1);

        let mut by_name = SyntheticEmitter::new(Arc::clone(&backend)).prefer_native_code(false);
        by_name
            .emit(&KeyEvent::new("A", KeyState::Down, 0).with_native_code(0x42))
            .unwrap();
        assert_eq!(backend.posted().last().map(|p| p.code), Some(0x41));
    }

    fn wait_idle(worker: &PlaybackWorker) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.is_active() {
            assert!(Instant::now() < deadline, "worker never went idle");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_worker_signals_once_and_rejects_overlap() {
        let (tx, rx) = std::sync::mpsc::channel();
        let sink = Collect::default();
        let worker = PlaybackWorker::spawn(sink.clone(), fast(), move |report| {
            tx.send(report).unwrap();
        })
        .unwrap();

        let slow = vec![KeyEvent::new("A", KeyState::Down, 200)];
        worker.submit(slow, 1).unwrap();
        assert!(worker.is_active());
        assert!(matches!(
            worker.submit(abc(), 1),
            Err(KsrError::AlreadyPlaying)
        ));

        let report = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(report.outcome, PlaybackOutcome::Completed);
        wait_idle(&worker);
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        assert!(matches!(
            worker.submit(abc(), 0),
            Err(KsrError::InvalidRepeatCount(0))
        ));
    }

    #[test]
    fn test_finish_reported_before_next_submit_accepted() {
        let reported = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&reported);
        let worker = PlaybackWorker::spawn(Collect::default(), fast(), move |_| {
            thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::Release);
        })
        .unwrap();

        worker.submit(abc(), 1).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match worker.submit(abc(), 1) {
                Ok(()) => break,
                Err(KsrError::AlreadyPlaying) => {
                    assert!(Instant::now() < deadline, "worker never went idle");
                    thread::sleep(Duration::from_millis(1));
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert!(reported.load(Ordering::Acquire));
    }
}
