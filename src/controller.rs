//! Application core driven by the user interface.
//!
//! The [`Controller`] owns the sequence store, the global key listener and
//! the playback worker, and enforces that recording and playback never
//! overlap. Every rejected request returns before any state changes.
//! Progress is reported through [`Notification`]s on an unbounded channel,
//! which the hook callback and the playback thread can send on without
//! blocking.

use crate::config::Config;
use crate::error::{KsrError, Result};
use crate::event::KeyEvent;
use crate::listener::{GlobalKeyListener, KeyRecorder};
use crate::platform::{InputBackend, KeyTranslator};
use crate::playback::{PlaybackOutcome, PlaybackTiming, PlaybackWorker, SyntheticEmitter};
use crate::store::SequenceStore;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{info, warn};

/// Events emitted by the core for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    RecordingStarted,
    RecordingStopped,
    PlaybackStarted { repeat_count: u32, events: usize },
    PlaybackFinished { emitted: usize, failed: usize },
    PlaybackCancelled { emitted: usize },
    PermissionDenied(String),
    SequenceChanged { len: usize },
}

/// Options the controller takes from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerOptions {
    pub timing: PlaybackTiming,
    pub prefer_native_code: bool,
    pub max_events: Option<usize>,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            timing: PlaybackTiming::default(),
            prefer_native_code: true,
            max_events: None,
        }
    }
}

impl From<&Config> for ControllerOptions {
    fn from(config: &Config) -> Self {
        Self {
            timing: PlaybackTiming {
                settle_delay: config.settle_delay,
                repetition_gap: config.repetition_gap,
            },
            prefer_native_code: config.prefer_native_code,
            max_events: config.max_events,
        }
    }
}

pub struct Controller<B: InputBackend> {
    backend: Arc<B>,
    store: Arc<SequenceStore>,
    recorder: Arc<KeyRecorder>,
    listener: GlobalKeyListener<B>,
    worker: PlaybackWorker,
    notifier: UnboundedSender<Notification>,
}

impl<B: InputBackend> Controller<B> {
    pub fn new(
        backend: B,
        options: ControllerOptions,
    ) -> Result<(Self, UnboundedReceiver<Notification>)> {
        let backend = Arc::new(backend);
        let (notifier, notifications) = mpsc::unbounded_channel();

        let store = Arc::new(match options.max_events {
            Some(limit) => SequenceStore::with_limit(limit),
            None => SequenceStore::new(),
        });
        let translator: Arc<dyn KeyTranslator> = backend.clone();
        let recorder = Arc::new(
            KeyRecorder::new(Arc::clone(&store), translator).with_notifier(notifier.clone()),
        );
        let listener = GlobalKeyListener::new(Arc::clone(&backend), Arc::clone(&recorder));

        let emitter = SyntheticEmitter::new(Arc::clone(&backend))
            .prefer_native_code(options.prefer_native_code);
        let finished = notifier.clone();
        let worker = PlaybackWorker::spawn(emitter, options.timing, move |report| {
            let notification = match report.outcome {
                PlaybackOutcome::Completed => Notification::PlaybackFinished {
                    emitted: report.emitted,
                    failed: report.failed,
                },
                PlaybackOutcome::Cancelled => Notification::PlaybackCancelled {
                    emitted: report.emitted,
                },
            };
            let _ = finished.send(notification);
        })?;

        Ok((
            Self {
                backend,
                store,
                recorder,
                listener,
                worker,
                notifier,
            },
            notifications,
        ))
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn is_playing(&self) -> bool {
        self.worker.is_active()
    }

    /// Clear the sequence and start capturing keys system-wide.
    ///
    /// A no-op while already recording.
    pub fn start_recording(&mut self) -> Result<()> {
        if self.is_recording() {
            return Ok(());
        }
        if self.is_playing() {
            return Err(KsrError::mode_conflict("start recording", "playback is running"));
        }

        if let Err(e) = self.listener.start() {
            if e.is_permission_denied() {
                self.notify(Notification::PermissionDenied(e.to_string()));
            }
            return Err(e);
        }

        self.store.clear();
        self.notify(Notification::SequenceChanged { len: 0 });
        self.recorder.begin();
        info!("Recording started");
        self.notify(Notification::RecordingStarted);
        Ok(())
    }

    /// Stop capturing keys and release the OS hook. A no-op when not recording.
    pub fn stop_recording(&mut self) {
        if !self.is_recording() {
            return;
        }
        self.recorder.end();
        self.listener.stop();
        info!("Recording stopped with {} events", self.store.len());
        self.notify(Notification::RecordingStopped);
    }

    /// Queue playback of the current sequence on the worker thread.
    pub fn start_playback(&mut self, repeat_count: u32) -> Result<()> {
        if self.is_recording() {
            return Err(KsrError::mode_conflict("start playback", "recording"));
        }
        if self.is_playing() {
            return Err(KsrError::AlreadyPlaying);
        }
        if repeat_count == 0 {
            return Err(KsrError::InvalidRepeatCount(repeat_count));
        }

        let events = self.store.snapshot();
        if events.is_empty() {
            return Err(KsrError::empty_sequence("play"));
        }

        if let Err(e) = self.backend.prepare_output() {
            if e.is_permission_denied() {
                self.notify(Notification::PermissionDenied(e.to_string()));
            }
            return Err(e);
        }

        let count = events.len();
        self.worker.submit(events, repeat_count)?;
        self.notify(Notification::PlaybackStarted {
            repeat_count,
            events: count,
        });
        Ok(())
    }

    /// Request cancellation; returns whether a playback was active.
    ///
    /// The worker reports `PlaybackCancelled` once it has wound down.
    pub fn stop_playback(&self) -> bool {
        if !self.is_playing() {
            return false;
        }
        self.worker.cancel();
        info!("Playback stop requested");
        true
    }

    pub fn clear(&self) {
        self.store.clear();
        self.notify(Notification::SequenceChanged { len: 0 });
    }

    /// Independent copy of the current sequence, for display or saving.
    pub fn snapshot(&self) -> Vec<KeyEvent> {
        self.store.snapshot()
    }

    /// Replace the sequence wholesale with loaded events.
    pub fn load_snapshot(&self, events: Vec<KeyEvent>) -> Result<()> {
        if self.is_recording() {
            return Err(KsrError::mode_conflict("load a sequence", "recording"));
        }
        if self.is_playing() {
            return Err(KsrError::mode_conflict("load a sequence", "playback is running"));
        }
        if let Some(limit) = self.store.limit() {
            if events.len() > limit {
                return Err(KsrError::Overflow { limit });
            }
        }

        let len = events.len();
        self.store.replace(events);
        self.notify(Notification::SequenceChanged { len });
        Ok(())
    }

    fn notify(&self, notification: Notification) {
        if self.notifier.send(notification).is_err() {
            warn!("Notification receiver dropped");
        }
    }
}

impl<B: InputBackend> Drop for Controller<B> {
    fn drop(&mut self) {
        self.stop_recording();
        self.worker.cancel();
    }
}
