//! Per-voice step sequencing against the shared transport.
//!
//! Every voice plays its Euclidean pattern on the one [`TransportClock`].
//! On each tick the sequencer collects the steps that fall inside a short
//! lookahead window and hands their onsets to the sound engine as
//! [`NoteTrigger`]s. Reconfiguring a voice never cuts a pattern in half: the
//! replacement waits for the next quantization boundary while the old
//! pattern keeps sounding.

use crate::config::{InstrumentConfig, MusicConfig};
use crate::error::{EngineError, Result};
use crate::euclid::{self, Pattern};
use crate::events::NoteTrigger;
use crate::interpreter::RhythmSpec;
use crate::pitch::Pitch;
use crate::sound::{SoundEngine, VoiceSetup};
use crate::timing::{BeatTime, TransportClock};
use crate::voice::{VoiceId, VoiceTable};
use std::time::{Duration, Instant};

const EPSILON: f64 = 1e-6;
/// Upper bound on steps walked per voice and tick.
const MAX_STEPS_PER_TICK: usize = 2048;

/// Lifecycle of the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Running,
    Disposed,
}

/// What applying a rhythm spec did to a voice.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VoiceChange {
    /// First spec for the voice.
    Created,
    /// Pattern regenerated; the new one sounds from `at`.
    Replaced { at: BeatTime },
    /// Same shape, new level.
    VolumeOnly,
    Unchanged,
}

/// One pattern bound to the transport.
#[derive(Clone, Debug)]
struct VoiceSequence {
    spec: RhythmSpec,
    pattern: Pattern,
    start_beat: BeatTime,
    /// Absolute index of the last step handed out.
    last_step: Option<u64>,
}

impl VoiceSequence {
    fn new(spec: RhythmSpec, start_beat: BeatTime) -> Self {
        let pattern = euclid::generate(spec.steps, spec.pulses, spec.rotation);
        Self {
            spec,
            pattern,
            start_beat,
            last_step: None,
        }
    }

    fn step_beats(&self) -> f64 {
        self.spec.subdivision.beats()
    }

    /// Beat of the last step handed out, if any.
    fn horizon(&self) -> Option<f64> {
        self.last_step
            .map(|step| self.start_beat.to_float() + step as f64 * self.step_beats())
    }

    /// Onsets not yet handed out, from the step sounding at `current` up to
    /// `limit`. Returns `(pattern index, beat)` pairs.
    fn due_onsets(&mut self, current: f64, limit: f64, include_limit: bool) -> Vec<(usize, BeatTime)> {
        let step = self.step_beats();
        if step <= f64::EPSILON || self.pattern.is_empty() {
            return Vec::new();
        }
        let start = self.start_beat.to_float();
        let mut index = ((current - start) / step).floor().max(0.0) as u64;
        if let Some(last) = self.last_step {
            index = index.max(last + 1);
        }

        let mut due = Vec::new();
        for _ in 0..MAX_STEPS_PER_TICK {
            let beat = start + index as f64 * step;
            let beyond = if include_limit {
                beat > limit + EPSILON
            } else {
                beat >= limit - EPSILON
            };
            if beyond {
                break;
            }
            let position = (index % self.pattern.len() as u64) as usize;
            if self.pattern.is_onset(position) {
                due.push((position, BeatTime::from_float(beat)));
            }
            self.last_step = Some(index);
            index += 1;
        }
        due
    }
}

#[derive(Clone, Debug)]
struct VoiceSlot {
    active: VoiceSequence,
    /// Replacement waiting for its start boundary.
    pending: Option<VoiceSequence>,
}

impl VoiceSlot {
    /// The most recently applied spec.
    fn latest_spec(&self) -> &RhythmSpec {
        self.pending
            .as_ref()
            .map(|p| &p.spec)
            .unwrap_or(&self.active.spec)
    }
}

/// Step sequencer for all voices on one shared clock.
pub struct SequenceEngine {
    clock: TransportClock,
    state: TransportState,
    voices: VoiceTable<Option<VoiceSlot>>,
    scale: Vec<Pitch>,
    instruments: VoiceTable<InstrumentConfig>,
    quantize_beats: f64,
    lookahead: Duration,
}

impl SequenceEngine {
    pub fn new(config: &MusicConfig) -> Self {
        Self {
            clock: TransportClock::new(),
            state: TransportState::Stopped,
            voices: VoiceTable::default(),
            scale: config.scales.tied.clone(),
            instruments: VoiceTable::from_fn(|voice| config.instruments.get(voice).clone()),
            quantize_beats: config.engine.quantize_beats,
            lookahead: config.engine.lookahead,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TransportState::Running
    }

    pub fn clock(&self) -> &TransportClock {
        &self.clock
    }

    pub fn bpm(&self) -> f64 {
        self.clock.bpm()
    }

    pub fn scale(&self) -> &[Pitch] {
        &self.scale
    }

    /// Number of voices that currently hold a pattern.
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|(_, slot)| slot.is_some()).count()
    }

    /// The pattern currently sounding for a voice.
    pub fn pattern(&self, voice: VoiceId) -> Option<&Pattern> {
        self.voices[voice].as_ref().map(|slot| &slot.active.pattern)
    }

    /// The pattern queued to replace the current one, if any.
    pub fn pending_pattern(&self, voice: VoiceId) -> Option<&Pattern> {
        self.voices[voice]
            .as_ref()
            .and_then(|slot| slot.pending.as_ref())
            .map(|p| &p.pattern)
    }

    /// The most recently applied spec for a voice.
    pub fn spec(&self, voice: VoiceId) -> Option<&RhythmSpec> {
        self.voices[voice].as_ref().map(VoiceSlot::latest_spec)
    }

    fn setup(&self, voice: VoiceId, sequence: &VoiceSequence) -> VoiceSetup {
        VoiceSetup {
            pattern: sequence.pattern.clone(),
            subdivision: sequence.spec.subdivision,
            volume_db: sequence.spec.volume_db,
            instrument: self.instruments[voice].clone(),
        }
    }

    /// Apply a rhythm spec to a voice.
    ///
    /// Fails only for this voice; the caller decides whether to carry on.
    pub fn apply_spec<S: SoundEngine>(
        &mut self,
        voice: VoiceId,
        spec: &RhythmSpec,
        engine: &mut S,
        now: Instant,
    ) -> Result<VoiceChange> {
        if self.state == TransportState::Disposed {
            log::debug!("[SEQ] Ignoring {} spec after dispose", voice);
            return Ok(VoiceChange::Unchanged);
        }

        let Some(slot) = self.voices[voice].as_ref() else {
            let start = self.clock.next_boundary(self.quantize_beats, now);
            let sequence = VoiceSequence::new(spec.clone(), start);
            engine.configure_voice(voice, &self.setup(voice, &sequence))?;
            if self.is_running() {
                engine.start_voice(voice, start)?;
            }
            log::debug!(
                "[SEQ] Created {} {} from beat {:.2}",
                voice,
                sequence.pattern,
                start.to_float()
            );
            self.voices[voice] = Some(VoiceSlot {
                active: sequence,
                pending: None,
            });
            return Ok(VoiceChange::Created);
        };

        // Back to the sounding shape before the queued one took over.
        if slot.pending.is_some() && slot.active.spec.same_shape(spec) {
            let volume_changed = (slot.active.spec.volume_db - spec.volume_db).abs() > f32::EPSILON;
            if volume_changed {
                engine.set_voice_volume(voice, spec.volume_db)?;
            }
            if let Some(slot) = self.voices[voice].as_mut() {
                slot.pending = None;
                slot.active.spec.volume_db = spec.volume_db;
            }
            log::debug!("[SEQ] Dropped queued pattern for {}", voice);
            return Ok(if volume_changed {
                VoiceChange::VolumeOnly
            } else {
                VoiceChange::Unchanged
            });
        }

        let latest = slot.latest_spec();
        if latest.same_shape(spec) {
            if (latest.volume_db - spec.volume_db).abs() <= f32::EPSILON {
                return Ok(VoiceChange::Unchanged);
            }
            engine.set_voice_volume(voice, spec.volume_db)?;
            if let Some(slot) = self.voices[voice].as_mut() {
                slot.active.spec.volume_db = spec.volume_db;
                if let Some(pending) = slot.pending.as_mut() {
                    pending.spec.volume_db = spec.volume_db;
                }
            }
            return Ok(VoiceChange::VolumeOnly);
        }

        if !self.is_running() {
            // Nothing is sounding, so the swap can happen right away.
            let start = self.clock.next_boundary(self.quantize_beats, now);
            let sequence = VoiceSequence::new(spec.clone(), start);
            engine.configure_voice(voice, &self.setup(voice, &sequence))?;
            log::debug!("[SEQ] Replaced {} with {} while stopped", voice, sequence.pattern);
            self.voices[voice] = Some(VoiceSlot {
                active: sequence,
                pending: None,
            });
            return Ok(VoiceChange::Replaced { at: start });
        }

        let current = self.clock.beat_at(now).to_float();
        let horizon = slot
            .active
            .horizon()
            .map(|beat| beat + EPSILON)
            .unwrap_or(current)
            .max(current);
        let at = quantize_up(horizon, self.quantize_beats);
        let sequence = VoiceSequence::new(spec.clone(), at);
        log::debug!(
            "[SEQ] Queued {} {} for beat {:.2}",
            voice,
            sequence.pattern,
            at.to_float()
        );
        if let Some(slot) = self.voices[voice].as_mut() {
            slot.pending = Some(sequence);
        }
        Ok(VoiceChange::Replaced { at })
    }

    /// Change the pitch pool. Takes effect with the next triggered note.
    pub fn set_scale(&mut self, scale: Vec<Pitch>) {
        self.scale = scale;
    }

    /// Change the tempo of the shared clock, keeping the beat position.
    /// Returns the tempo actually applied.
    pub fn set_tempo(&mut self, bpm: f64, now: Instant) -> f64 {
        self.clock.set_bpm(bpm, now);
        self.clock.bpm()
    }

    /// Start the clock and every configured voice. Voices restart on the
    /// next boundary.
    pub fn start<S: SoundEngine>(&mut self, engine: &mut S, now: Instant) -> Result<()> {
        match self.state {
            TransportState::Disposed => {
                return Err(EngineError::Initialization(
                    "Sequencer has been disposed".to_string(),
                ))
            }
            TransportState::Running => return Ok(()),
            TransportState::Stopped => {}
        }

        self.clock.start(now);
        let start = self.clock.next_boundary(self.quantize_beats, now);
        for (voice, slot) in self.voices.iter_mut() {
            let Some(slot) = slot else { continue };
            slot.active.start_beat = start;
            slot.active.last_step = None;
            if let Err(e) = engine.start_voice(voice, start) {
                log::warn!("[SEQ] Failed to start {}: {}", voice, e);
            }
        }
        self.state = TransportState::Running;
        log::info!(
            "[SEQ] Transport started at beat {:.2}, {:.1} BPM",
            start.to_float(),
            self.clock.bpm()
        );
        Ok(())
    }

    /// Halt every voice and the clock. Configuration is kept so the
    /// sequencer can be started again.
    pub fn stop<S: SoundEngine>(&mut self, engine: &mut S, now: Instant) {
        if self.state != TransportState::Running {
            return;
        }
        self.clock.stop(now);
        let instruments = &self.instruments;
        for (voice, slot) in self.voices.iter_mut() {
            let Some(slot) = slot else { continue };
            if let Err(e) = engine.stop_voice(voice) {
                log::warn!("[SEQ] Failed to stop {}: {}", voice, e);
            }
            if let Some(pending) = slot.pending.take() {
                let setup = VoiceSetup {
                    pattern: pending.pattern.clone(),
                    subdivision: pending.spec.subdivision,
                    volume_db: pending.spec.volume_db,
                    instrument: instruments[voice].clone(),
                };
                match engine.configure_voice(voice, &setup) {
                    Ok(()) => slot.active = pending,
                    Err(e) => log::warn!("[SEQ] Dropping queued pattern for {}: {}", voice, e),
                }
            }
        }
        self.state = TransportState::Stopped;
        log::info!("[SEQ] Transport stopped");
    }

    /// Release every voice. Idempotent; nothing is emitted afterwards.
    pub fn dispose<S: SoundEngine>(&mut self, engine: &mut S) {
        if self.state == TransportState::Disposed {
            return;
        }
        self.release_voices(engine);
        self.state = TransportState::Disposed;
        log::debug!("[SEQ] Disposed");
    }

    /// Stop and dispose every voice but keep the transport as it is. The
    /// next spec for a voice creates it again.
    pub fn release_voices<S: SoundEngine>(&mut self, engine: &mut S) {
        let was_running = self.is_running();
        for (voice, slot) in self.voices.iter_mut() {
            if slot.take().is_none() {
                continue;
            }
            if was_running {
                if let Err(e) = engine.stop_voice(voice) {
                    log::debug!("[SEQ] Stop during release failed for {}: {}", voice, e);
                }
            }
            if let Err(e) = engine.dispose_voice(voice) {
                log::debug!("[SEQ] Dispose failed for {}: {}", voice, e);
            }
        }
    }

    /// Hand every onset inside the lookahead window to the engine.
    /// Returns the number of notes triggered.
    pub fn tick<S: SoundEngine>(&mut self, engine: &mut S, now: Instant) -> usize {
        if !self.is_running() {
            return 0;
        }
        let current = self.clock.beat_at(now).to_float();
        let window_end = current + self.clock.lookahead_beats(self.lookahead);
        let mut triggered = 0;

        for voice in VoiceId::ALL {
            let Some(mut slot) = self.voices[voice].take() else {
                continue;
            };

            let swap_due = slot
                .pending
                .as_ref()
                .map(|p| p.start_beat.to_float() <= window_end + EPSILON)
                .unwrap_or(false);

            if swap_due {
                if let Some(pending) = slot.pending.take() {
                    let boundary = pending.start_beat;
                    let onsets = slot.active.due_onsets(current, boundary.to_float(), false);
                    triggered += self.trigger(engine, voice, &slot.active, onsets, now);
                    slot.active = self.swap(engine, voice, slot.active, pending);
                }
            }

            let onsets = slot.active.due_onsets(current, window_end, true);
            triggered += self.trigger(engine, voice, &slot.active, onsets, now);
            self.voices[voice] = Some(slot);
        }

        if triggered > 0 {
            log::trace!("[SEQ] {} notes up to beat {:.3}", triggered, window_end);
        }
        triggered
    }

    /// Replace a sounding pattern with its queued successor at the boundary.
    /// If the engine rejects the new pattern the old one keeps playing.
    fn swap<S: SoundEngine>(
        &self,
        engine: &mut S,
        voice: VoiceId,
        mut old: VoiceSequence,
        new: VoiceSequence,
    ) -> VoiceSequence {
        if let Err(e) = engine.stop_voice(voice) {
            log::warn!("[SEQ] Failed to stop {} for swap: {}", voice, e);
        }
        let result = engine
            .configure_voice(voice, &self.setup(voice, &new))
            .and_then(|()| engine.start_voice(voice, new.start_beat));
        match result {
            Ok(()) => {
                log::debug!(
                    "[SEQ] {} now {} at beat {:.2}",
                    voice,
                    new.pattern,
                    new.start_beat.to_float()
                );
                new
            }
            Err(e) => {
                log::warn!("[SEQ] Keeping previous pattern for {}: {}", voice, e);
                if let Err(e) = engine.start_voice(voice, new.start_beat) {
                    log::warn!("[SEQ] Failed to restart {}: {}", voice, e);
                }
                // The backend restarted the old pattern at the boundary.
                old.start_beat = new.start_beat;
                old.last_step = None;
                old
            }
        }
    }

    fn trigger<S: SoundEngine>(
        &self,
        engine: &mut S,
        voice: VoiceId,
        sequence: &VoiceSequence,
        onsets: Vec<(usize, BeatTime)>,
        now: Instant,
    ) -> usize {
        if self.scale.is_empty() {
            return 0;
        }
        let mut triggered = 0;
        for (step, beat) in onsets {
            let pitch = self.scale[(step + voice.scale_offset()) % self.scale.len()].clone();
            let note = NoteTrigger {
                voice,
                step,
                pitch,
                duration: sequence.spec.subdivision,
                beat,
                at: self.clock.instant_at(beat, now),
                volume_db: sequence.spec.volume_db,
            };
            match engine.trigger_note(&note) {
                Ok(()) => triggered += 1,
                Err(e) => log::warn!("[SEQ] {} note at beat {:.2} failed: {}", voice, beat.to_float(), e),
            }
        }
        triggered
    }
}

/// First multiple of `quantum` at or after `beat`.
fn quantize_up(beat: f64, quantum: f64) -> BeatTime {
    if quantum <= f64::EPSILON {
        return BeatTime::from_float(beat.max(0.0));
    }
    BeatTime::from_float(((beat / quantum - 1e-9).ceil() * quantum).max(0.0))
}
