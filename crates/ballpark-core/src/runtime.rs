//! Runtime thread.
//!
//! The runtime thread owns the [`EngineController`] and is the only place
//! the controller is touched. It:
//! - Processes messages from any number of [`RuntimeHandle`]s
//! - Ticks the controller (tempo debounce and sequencer) every millisecond
//! - Publishes a [`RuntimeStatus`] for readers on other threads

use crate::controller::{EngineController, Lifecycle};
use crate::events::GameEvent;
use crate::feed::FeedError;
use crate::interpreter::MusicParameters;
use crate::snapshot::Snapshot;
use crate::sound::SoundEngine;
use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Instructions for the runtime thread.
#[derive(Debug)]
pub enum RuntimeMessage {
    /// User-initiated activation; required before audio is prepared.
    Activate,
    Start,
    Stop,
    /// A new snapshot to apply.
    Update(Box<Snapshot>),
    /// Raw result of a feed poll. Errors keep the current music.
    Fetched(Box<std::result::Result<Snapshot, FeedError>>),
    /// Leave the current game but keep the engine prepared.
    DeselectGame,
    /// Tear down the controller; the thread keeps running until shutdown.
    Dispose,
}

/// What the runtime thread last reported.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeStatus {
    pub lifecycle: Lifecycle,
    pub bpm: f64,
    /// Notes triggered since the runtime started.
    pub notes_triggered: u64,
    /// Snapshots applied since the runtime started.
    pub snapshots_applied: u64,
    /// Events raised by the most recent snapshot.
    pub last_events: Vec<GameEvent>,
    pub parameters: Option<MusicParameters>,
    /// Most recent start or initialization failure.
    pub last_error: Option<String>,
}

impl Default for RuntimeStatus {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            bpm: 0.0,
            notes_triggered: 0,
            snapshots_applied: 0,
            last_events: Vec::new(),
            parameters: None,
            last_error: None,
        }
    }
}

/// Handle to the running runtime.
///
/// Cheap to clone; every clone talks to the same thread.
#[derive(Clone)]
pub struct RuntimeHandle {
    /// Sender for runtime messages.
    message_tx: Sender<RuntimeMessage>,
    /// Last published status.
    status: Arc<RwLock<RuntimeStatus>>,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
}

impl RuntimeHandle {
    /// Send a message to the runtime thread.
    pub fn send(&self, msg: RuntimeMessage) -> Result<()> {
        self.message_tx
            .send(msg)
            .map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))
    }

    pub fn activate(&self) -> Result<()> {
        self.send(RuntimeMessage::Activate)
    }

    pub fn start(&self) -> Result<()> {
        self.send(RuntimeMessage::Start)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(RuntimeMessage::Stop)
    }

    pub fn update(&self, snapshot: Snapshot) -> Result<()> {
        self.send(RuntimeMessage::Update(Box::new(snapshot)))
    }

    pub fn fetched(&self, fetched: std::result::Result<Snapshot, FeedError>) -> Result<()> {
        self.send(RuntimeMessage::Fetched(Box::new(fetched)))
    }

    pub fn deselect_game(&self) -> Result<()> {
        self.send(RuntimeMessage::DeselectGame)
    }

    pub fn dispose(&self) -> Result<()> {
        self.send(RuntimeMessage::Dispose)
    }

    /// A copy of the last published status.
    pub fn status(&self) -> RuntimeStatus {
        self.status.read().expect("Status lock poisoned").clone()
    }

    /// Signal the runtime thread to exit.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Block until `predicate` holds for the status or `timeout` passes.
    pub fn wait_for(&self, timeout: Duration, predicate: impl Fn(&RuntimeStatus) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(&self.status()) {
                return true;
            }
            if Instant::now() >= deadline || self.is_shutdown_requested() {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

/// The runtime: a thread plus the handle that drives it.
pub struct Runtime {
    handle: RuntimeHandle,
    thread_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Move `controller` onto a new runtime thread.
    pub fn start<S>(controller: EngineController<S>) -> Result<Self>
    where
        S: SoundEngine + Send + 'static,
    {
        let (message_tx, message_rx) = unbounded();
        let status = Arc::new(RwLock::new(RuntimeStatus {
            lifecycle: controller.lifecycle(),
            bpm: controller.bpm(),
            ..RuntimeStatus::default()
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = RuntimeHandle {
            message_tx,
            status: status.clone(),
            shutdown: shutdown.clone(),
        };

        let thread_handle = thread::Builder::new()
            .name("ballpark-runtime".to_string())
            .spawn(move || {
                let mut runtime = RuntimeThread {
                    controller,
                    message_rx,
                    status,
                    notes_triggered: 0,
                    snapshots_applied: 0,
                };
                runtime.run(shutdown);
            })?;

        log::debug!("Runtime thread started");
        Ok(Self {
            handle,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get a handle to interact with the runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Shut down the runtime gracefully. The controller is disposed on the
    /// way out.
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.handle.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("Runtime thread panicked");
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.join();
    }
}

/// The runtime thread that processes messages and ticks the controller.
struct RuntimeThread<S: SoundEngine> {
    controller: EngineController<S>,
    message_rx: Receiver<RuntimeMessage>,
    status: Arc<RwLock<RuntimeStatus>>,
    notes_triggered: u64,
    snapshots_applied: u64,
}

impl<S: SoundEngine> RuntimeThread<S> {
    fn run(&mut self, shutdown: Arc<AtomicBool>) {
        let interval = Duration::from_millis(1);

        while !shutdown.load(Ordering::Relaxed) {
            self.drain_messages();
            let notes = self.controller.tick(Instant::now());
            self.notes_triggered += notes as u64;
            self.publish(|_| {});
            thread::sleep(interval);
        }

        self.controller.dispose();
        self.publish(|_| {});
        log::debug!("Runtime thread stopped");
    }

    fn drain_messages(&mut self) {
        while let Ok(msg) = self.message_rx.try_recv() {
            self.handle_message(msg);
        }
    }

    fn handle_message(&mut self, msg: RuntimeMessage) {
        let now = Instant::now();
        match msg {
            RuntimeMessage::Activate => self.controller.activate(),
            RuntimeMessage::Start => {
                if let Err(e) = self.controller.start_at(now) {
                    log::error!("Failed to start engine: {}", e);
                    let message = e.to_string();
                    self.publish(move |status| status.last_error = Some(message));
                }
            }
            RuntimeMessage::Stop => self.controller.stop_at(now),
            RuntimeMessage::Update(snapshot) => {
                let result = self.controller.update_game_state_at(Some(&snapshot), now);
                self.record(result.map(|r| r.events));
            }
            RuntimeMessage::Fetched(fetched) => {
                let result = self.controller.ingest(*fetched, now);
                self.record(result.map(|r| r.events));
            }
            RuntimeMessage::DeselectGame => self.controller.deselect_game(),
            RuntimeMessage::Dispose => self.controller.dispose(),
        }
    }

    fn record(&mut self, events: Option<Vec<GameEvent>>) {
        if let Some(events) = events {
            self.snapshots_applied += 1;
            self.publish(move |status| status.last_events = events);
        }
    }

    fn publish(&self, update: impl FnOnce(&mut RuntimeStatus)) {
        let mut status = self.status.write().expect("Status lock poisoned");
        status.lifecycle = self.controller.lifecycle();
        status.bpm = self.controller.bpm();
        status.notes_triggered = self.notes_triggered;
        status.snapshots_applied = self.snapshots_applied;
        if status.parameters.as_ref() != self.controller.parameters() {
            status.parameters = self.controller.parameters().cloned();
        }
        update(&mut status);
    }
}
