//! Engine lifecycle and per-snapshot orchestration.
//!
//! The [`EngineController`] owns the interpreter, the sequencer and the sound
//! engine. Each snapshot is applied in a fixed order: rhythm, tonality,
//! tempo (debounced), then one-shots for the detected events.

use crate::config::MusicConfig;
use crate::debounce::Debouncer;
use crate::error::{EngineError, Result};
use crate::events::{GameEvent, OneShot};
use crate::feed::FeedError;
use crate::interpreter::{GameStateInterpreter, Interpretation, MusicParameters};
use crate::sequencer::SequenceEngine;
use crate::snapshot::Snapshot;
use crate::sound::{EnginePlan, SoundEngine};
use std::time::Instant;

/// Where the controller is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Created, sound engine not prepared.
    Idle,
    /// Prepared; snapshots are applied but the transport is halted.
    Ready,
    Playing,
    /// Torn down for good.
    Disposed,
}

/// Drives a [`SoundEngine`] from a stream of snapshots.
pub struct EngineController<S: SoundEngine> {
    config: MusicConfig,
    engine: S,
    interpreter: GameStateInterpreter,
    sequencer: SequenceEngine,
    tempo: Debouncer<f64>,
    activated: bool,
    lifecycle: Lifecycle,
    parameters: Option<MusicParameters>,
}

impl<S: SoundEngine> EngineController<S> {
    pub fn new(config: MusicConfig, engine: S) -> Self {
        Self {
            interpreter: GameStateInterpreter::new(config.clone()),
            sequencer: SequenceEngine::new(&config),
            tempo: Debouncer::new(config.engine.tempo_debounce),
            config,
            engine,
            activated: false,
            lifecycle: Lifecycle::Idle,
            parameters: None,
        }
    }

    /// Record that a user asked for sound. Audio output must not be prepared
    /// before this.
    pub fn activate(&mut self) {
        self.activated = true;
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Prepare the sound engine. Does nothing when already initialized.
    pub fn initialize(&mut self) -> Result<()> {
        self.initialize_at(Instant::now())
    }

    pub fn initialize_at(&mut self, now: Instant) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Ready | Lifecycle::Playing => return Ok(()),
            Lifecycle::Disposed => {
                return Err(EngineError::Initialization(
                    "Engine has been disposed".to_string(),
                ))
            }
            Lifecycle::Idle => {}
        }
        if !self.activated {
            return Err(EngineError::Initialization(
                "Audio output requires activation first".to_string(),
            ));
        }

        let plan = EnginePlan::from_config(&self.config);
        self.engine.prepare(&plan).map_err(|e| match e {
            EngineError::Initialization(_) => e,
            other => EngineError::Initialization(other.to_string()),
        })?;

        let bpm = self.sequencer.set_tempo(self.config.tempo.base, now);
        self.engine.set_tempo(bpm)?;
        self.sequencer.set_scale(self.config.scales.tied.clone());

        self.lifecycle = Lifecycle::Ready;
        log::info!(
            "Engine initialized: master {} at {:.1} BPM",
            plan.master_chain.describe(),
            bpm
        );
        Ok(())
    }

    /// Start playback, initializing on demand.
    pub fn start(&mut self) -> Result<()> {
        self.start_at(Instant::now())
    }

    pub fn start_at(&mut self, now: Instant) -> Result<()> {
        self.initialize_at(now)?;
        if self.lifecycle == Lifecycle::Playing {
            return Ok(());
        }
        self.sequencer.start(&mut self.engine, now)?;
        self.engine.start()?;
        self.lifecycle = Lifecycle::Playing;
        Ok(())
    }

    /// Halt voices and transport. Everything stays configured, so playback
    /// can resume with [`start`](Self::start).
    pub fn stop(&mut self) {
        self.stop_at(Instant::now())
    }

    pub fn stop_at(&mut self, now: Instant) {
        if self.lifecycle != Lifecycle::Playing {
            return;
        }
        self.sequencer.stop(&mut self.engine, now);
        if let Err(e) = self.engine.stop() {
            log::warn!("Sound engine failed to stop: {}", e);
        }
        self.lifecycle = Lifecycle::Ready;
    }

    /// Apply a snapshot. Ignored before initialization or when absent.
    pub fn update_game_state(&mut self, snapshot: Option<&Snapshot>) -> Option<Interpretation> {
        self.update_game_state_at(snapshot, Instant::now())
    }

    pub fn update_game_state_at(
        &mut self,
        snapshot: Option<&Snapshot>,
        now: Instant,
    ) -> Option<Interpretation> {
        if !matches!(self.lifecycle, Lifecycle::Ready | Lifecycle::Playing) {
            log::debug!("Snapshot ignored: engine is {:?}", self.lifecycle);
            return None;
        }
        let interpretation = self.interpreter.interpret(snapshot)?;
        let params = &interpretation.params;

        for (voice, spec) in params.rhythm.iter() {
            if let Err(e) = self.sequencer.apply_spec(voice, spec, &mut self.engine, now) {
                log::warn!("[SEQ] Voice {} not updated: {}", voice, e);
            }
        }

        self.sequencer.set_scale(params.tonality.scale.clone());

        self.tempo.push(params.tempo.bpm, now);

        for event in &interpretation.events {
            self.play_event(*event, now);
        }

        self.parameters = Some(interpretation.params.clone());
        Some(interpretation)
    }

    /// Apply a feed result. Errors keep the current parameters and raise no
    /// events.
    pub fn ingest(
        &mut self,
        fetched: std::result::Result<Snapshot, FeedError>,
        now: Instant,
    ) -> Option<Interpretation> {
        match fetched {
            Ok(snapshot) => self.update_game_state_at(Some(&snapshot), now),
            Err(e) => {
                log::warn!("Keeping current music, feed failed: {}", e);
                None
            }
        }
    }

    fn play_event(&mut self, event: GameEvent, now: Instant) {
        let sound = self.config.events.get(event.kind());
        if sound.notes.is_empty() {
            log::debug!("[EVENT] {} has no phrase", event);
            return;
        }
        let shot = OneShot {
            event,
            notes: sound.notes.clone(),
            note_length: self.config.engine.one_shot_note,
            inter_note_delay: self.config.engine.inter_note_delay,
            at: now,
        };
        log::info!("[EVENT] {}", event);
        if let Err(e) = self.engine.trigger_one_shot(&shot) {
            log::warn!("[EVENT] {} failed: {}", event, e);
        }
    }

    /// Flush a due tempo change and advance the sequencer.
    /// Returns the number of notes triggered.
    pub fn tick(&mut self, now: Instant) -> usize {
        if self.lifecycle == Lifecycle::Disposed {
            return 0;
        }
        if let Some(bpm) = self.tempo.poll(now) {
            self.apply_tempo(bpm, now);
        }
        self.sequencer.tick(&mut self.engine, now)
    }

    fn apply_tempo(&mut self, bpm: f64, now: Instant) {
        if (self.sequencer.bpm() - bpm).abs() < f64::EPSILON {
            return;
        }
        let applied = self.sequencer.set_tempo(bpm, now);
        log::info!("[TEMPO] {:.1} BPM", applied);
        if let Err(e) = self.engine.set_tempo(applied) {
            log::warn!("[TEMPO] Sound engine rejected tempo: {}", e);
        }
    }

    /// Leave the current game. Voices are released and the next snapshot
    /// is treated as the first one; the sound engine stays prepared.
    pub fn deselect_game(&mut self) {
        if !self.is_initialized() {
            return;
        }
        self.tempo.cancel();
        self.sequencer.release_voices(&mut self.engine);
        self.interpreter.reset();
        self.parameters = None;
        log::info!("Game deselected");
    }

    /// Tear everything down. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.lifecycle == Lifecycle::Disposed {
            return;
        }
        let prepared = self.lifecycle != Lifecycle::Idle;
        let playing = self.lifecycle == Lifecycle::Playing;

        self.tempo.cancel();
        self.sequencer.dispose(&mut self.engine);
        if playing {
            if let Err(e) = self.engine.stop() {
                log::debug!("Stop during dispose failed: {}", e);
            }
        }
        if prepared {
            if let Err(e) = self.engine.dispose() {
                log::warn!("Sound engine dispose failed: {}", e);
            }
        }
        self.parameters = None;
        self.lifecycle = Lifecycle::Disposed;
        log::info!("Engine disposed");
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Ready | Lifecycle::Playing)
    }

    pub fn is_playing(&self) -> bool {
        self.lifecycle == Lifecycle::Playing
    }

    /// Parameters from the last applied snapshot.
    pub fn parameters(&self) -> Option<&MusicParameters> {
        self.parameters.as_ref()
    }

    /// Tempo the transport is running at.
    pub fn bpm(&self) -> f64 {
        self.sequencer.bpm()
    }

    pub fn sequencer(&self) -> &SequenceEngine {
        &self.sequencer
    }

    pub fn engine(&self) -> &S {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut S {
        &mut self.engine
    }

    pub fn config(&self) -> &MusicConfig {
        &self.config
    }
}
