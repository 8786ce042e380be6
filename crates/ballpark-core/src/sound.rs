//! The sound backend seam.
//!
//! The core decides *what* to play and *when*; a [`SoundEngine`] renders it.
//! Every instruction for the backend passes through this trait, so a session
//! can be recorded ([`RecordingEngine`]) or logged ([`LogEngine`]) without a
//! synthesizer attached.

use crate::config::{
    AmbienceConfig, Effect, EffectStage, InstrumentConfig, MusicConfig,
};
use crate::error::{EngineError, Result};
use crate::euclid::Pattern;
use crate::events::{EventKind, NoteTrigger, OneShot};
use crate::timing::{BeatTime, Subdivision};
use crate::voice::{VoiceId, VoiceTable};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Capability interface of the synthesis backend.
pub trait SoundEngine {
    /// Build the static signal graph: master chain, instruments, one-shot
    /// players and ambience.
    fn prepare(&mut self, plan: &EnginePlan) -> Result<()>;

    /// Install (or replace) the pattern of a voice. The voice stays silent
    /// until started.
    fn configure_voice(&mut self, voice: VoiceId, setup: &VoiceSetup) -> Result<()>;

    /// Begin sounding a configured voice from the given transport beat.
    fn start_voice(&mut self, voice: VoiceId, at: BeatTime) -> Result<()>;

    fn stop_voice(&mut self, voice: VoiceId) -> Result<()>;

    /// Release everything the backend holds for a voice.
    fn dispose_voice(&mut self, voice: VoiceId) -> Result<()>;

    fn set_voice_volume(&mut self, voice: VoiceId, volume_db: f32) -> Result<()>;

    /// Set the global tempo.
    fn set_tempo(&mut self, bpm: f64) -> Result<()>;

    /// Render one sequenced note.
    fn trigger_note(&mut self, note: &NoteTrigger) -> Result<()>;

    /// Render a one-shot phrase.
    fn trigger_one_shot(&mut self, shot: &OneShot) -> Result<()>;

    /// Start the transport (and the ambience bed).
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Tear down the whole graph.
    fn dispose(&mut self) -> Result<()>;
}

/// Ordered effect stages between a source and the output.
///
/// Only enabled stages are present. An empty chain means the source is
/// connected straight to the destination.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectChain {
    stages: Vec<Effect>,
}

impl EffectChain {
    pub fn builder() -> EffectChainBuilder {
        EffectChainBuilder::default()
    }

    /// Chain from configured stages, skipping disabled ones.
    pub fn from_stages(stages: &[EffectStage]) -> Self {
        stages
            .iter()
            .fold(Self::builder(), |builder, stage| builder.stage(stage))
            .build()
    }

    /// Stages in processing order.
    pub fn stages(&self) -> &[Effect] {
        &self.stages
    }

    /// True when nothing sits between source and destination.
    pub fn is_direct(&self) -> bool {
        self.stages.is_empty()
    }

    /// Human-readable routing, e.g. `reverb -> limiter -> out`.
    pub fn describe(&self) -> String {
        if self.is_direct() {
            return "direct -> out".to_string();
        }
        let mut names: Vec<&str> = self.stages.iter().map(Effect::name).collect();
        names.push("out");
        names.join(" -> ")
    }
}

/// Builder for [`EffectChain`].
#[derive(Default)]
pub struct EffectChainBuilder {
    stages: Vec<Effect>,
}

impl EffectChainBuilder {
    /// Append a configured stage if it is enabled.
    pub fn stage(mut self, stage: &EffectStage) -> Self {
        if stage.enabled {
            self.stages.push(stage.effect);
        }
        self
    }

    pub fn build(self) -> EffectChain {
        EffectChain {
            stages: self.stages,
        }
    }
}

/// Instrument and routing for one event's phrase.
#[derive(Clone, Debug, PartialEq)]
pub struct OneShotPlayer {
    pub event: EventKind,
    pub instrument: InstrumentConfig,
    pub chain: EffectChain,
}

/// Everything a backend builds once, before any voice exists.
#[derive(Clone, Debug, PartialEq)]
pub struct EnginePlan {
    pub master_volume_db: f32,
    pub master_chain: EffectChain,
    pub instruments: VoiceTable<InstrumentConfig>,
    pub one_shots: Vec<OneShotPlayer>,
    /// `None` when the ambience bed is disabled.
    pub ambience: Option<AmbienceConfig>,
}

impl EnginePlan {
    pub fn from_config(config: &MusicConfig) -> Self {
        let one_shots = [
            EventKind::Hit,
            EventKind::HomeRun,
            EventKind::Strikeout,
            EventKind::Walk,
            EventKind::RunScored,
            EventKind::OutRecorded,
        ]
        .into_iter()
        .map(|event| {
            let sound = config.events.get(event);
            OneShotPlayer {
                event,
                instrument: sound.instrument.clone(),
                chain: EffectChain::from_stages(&sound.effects),
            }
        })
        .collect();

        Self {
            master_volume_db: config.master.volume_db,
            master_chain: EffectChain::from_stages(&config.master.effects),
            instruments: VoiceTable::from_fn(|voice| config.instruments.get(voice).clone()),
            one_shots,
            ambience: config.ambience.enabled.then(|| config.ambience.clone()),
        }
    }
}

/// Pattern and sound of one voice.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceSetup {
    pub pattern: Pattern,
    pub subdivision: Subdivision,
    pub volume_db: f32,
    pub instrument: InstrumentConfig,
}

/// One call made against a [`RecordingEngine`].
#[derive(Clone, Debug, PartialEq)]
pub enum SoundCall {
    Prepare,
    ConfigureVoice { voice: VoiceId, pattern: Pattern },
    StartVoice { voice: VoiceId, at: BeatTime },
    StopVoice(VoiceId),
    DisposeVoice(VoiceId),
    SetVoiceVolume { voice: VoiceId, volume_db: f32 },
    SetTempo(f64),
    Note(NoteTrigger),
    OneShot(OneShot),
    Start,
    Stop,
    Dispose,
}

#[derive(Default)]
struct Recording {
    calls: Vec<SoundCall>,
    plan: Option<EnginePlan>,
}

/// Backend that renders nothing and records every instruction.
///
/// Clones share the same recording, so a test can keep one handle while the
/// engine itself moves into a controller or runtime thread.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    recording: Arc<Mutex<Recording>>,
    failing_voices: HashSet<VoiceId>,
    unavailable: bool,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine whose `prepare` always fails.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Make every call targeting `voice` fail.
    pub fn fail_voice(mut self, voice: VoiceId) -> Self {
        self.failing_voices.insert(voice);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.recording.lock().expect("Recording lock poisoned")
    }

    fn record(&self, call: SoundCall) {
        self.lock().calls.push(call);
    }

    fn check_voice(&self, voice: VoiceId) -> Result<()> {
        if self.failing_voices.contains(&voice) {
            return Err(EngineError::voice(voice, "backend rejected voice"));
        }
        Ok(())
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<SoundCall> {
        self.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear(&self) {
        self.lock().calls.clear();
    }

    /// Number of recorded calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&SoundCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Sequenced notes so far.
    pub fn notes(&self) -> Vec<NoteTrigger> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SoundCall::Note(note) => Some(note.clone()),
                _ => None,
            })
            .collect()
    }

    /// One-shots so far.
    pub fn one_shots(&self) -> Vec<OneShot> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                SoundCall::OneShot(shot) => Some(shot.clone()),
                _ => None,
            })
            .collect()
    }

    /// The plan passed to the last `prepare`.
    pub fn plan(&self) -> Option<EnginePlan> {
        self.lock().plan.clone()
    }
}

impl SoundEngine for RecordingEngine {
    fn prepare(&mut self, plan: &EnginePlan) -> Result<()> {
        if self.unavailable {
            return Err(EngineError::Initialization(
                "Audio output is not available".to_string(),
            ));
        }
        let mut recording = self.lock();
        recording.plan = Some(plan.clone());
        recording.calls.push(SoundCall::Prepare);
        Ok(())
    }

    fn configure_voice(&mut self, voice: VoiceId, setup: &VoiceSetup) -> Result<()> {
        self.check_voice(voice)?;
        self.record(SoundCall::ConfigureVoice {
            voice,
            pattern: setup.pattern.clone(),
        });
        Ok(())
    }

    fn start_voice(&mut self, voice: VoiceId, at: BeatTime) -> Result<()> {
        self.check_voice(voice)?;
        self.record(SoundCall::StartVoice { voice, at });
        Ok(())
    }

    fn stop_voice(&mut self, voice: VoiceId) -> Result<()> {
        self.check_voice(voice)?;
        self.record(SoundCall::StopVoice(voice));
        Ok(())
    }

    fn dispose_voice(&mut self, voice: VoiceId) -> Result<()> {
        self.record(SoundCall::DisposeVoice(voice));
        Ok(())
    }

    fn set_voice_volume(&mut self, voice: VoiceId, volume_db: f32) -> Result<()> {
        self.check_voice(voice)?;
        self.record(SoundCall::SetVoiceVolume { voice, volume_db });
        Ok(())
    }

    fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        self.record(SoundCall::SetTempo(bpm));
        Ok(())
    }

    fn trigger_note(&mut self, note: &NoteTrigger) -> Result<()> {
        self.check_voice(note.voice)?;
        self.record(SoundCall::Note(note.clone()));
        Ok(())
    }

    fn trigger_one_shot(&mut self, shot: &OneShot) -> Result<()> {
        self.record(SoundCall::OneShot(shot.clone()));
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.record(SoundCall::Start);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record(SoundCall::Stop);
        Ok(())
    }

    fn dispose(&mut self) -> Result<()> {
        self.record(SoundCall::Dispose);
        Ok(())
    }
}

/// Backend that writes every instruction to the log.
///
/// Notes go to `debug`, structural changes to `info`.
#[derive(Default)]
pub struct LogEngine {
    prepared: bool,
    notes: u64,
    one_shots: u64,
}

impl LogEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequenced notes rendered so far.
    pub fn notes_played(&self) -> u64 {
        self.notes
    }

    /// One-shot phrases rendered so far.
    pub fn one_shots_played(&self) -> u64 {
        self.one_shots
    }
}

impl SoundEngine for LogEngine {
    fn prepare(&mut self, plan: &EnginePlan) -> Result<()> {
        log::info!(
            "[SOUND] master {:.1} dB via {}",
            plan.master_volume_db,
            plan.master_chain.describe()
        );
        for (voice, instrument) in plan.instruments.iter() {
            log::debug!(
                "[SOUND] voice {} uses {} (filter: {})",
                voice,
                instrument.oscillator,
                instrument
                    .filter
                    .map(|f| format!("{:?} {} Hz", f.filter_type, f.frequency))
                    .unwrap_or_else(|| "none".to_string())
            );
        }
        for player in &plan.one_shots {
            log::debug!(
                "[SOUND] {} one-shot uses {} via {}",
                player.event,
                player.instrument.oscillator,
                player.chain.describe()
            );
        }
        if let Some(ambience) = &plan.ambience {
            log::info!(
                "[SOUND] ambience {:?} noise at {:.1} dB",
                ambience.noise,
                ambience.volume_db
            );
        }
        self.prepared = true;
        Ok(())
    }

    fn configure_voice(&mut self, voice: VoiceId, setup: &VoiceSetup) -> Result<()> {
        log::info!(
            "[SOUND] {} <- {} ({} @ {:.1} dB)",
            voice,
            setup.pattern,
            setup.subdivision,
            setup.volume_db
        );
        Ok(())
    }

    fn start_voice(&mut self, voice: VoiceId, at: BeatTime) -> Result<()> {
        log::debug!("[SOUND] start {} at beat {:.2}", voice, at.to_float());
        Ok(())
    }

    fn stop_voice(&mut self, voice: VoiceId) -> Result<()> {
        log::debug!("[SOUND] stop {}", voice);
        Ok(())
    }

    fn dispose_voice(&mut self, voice: VoiceId) -> Result<()> {
        log::debug!("[SOUND] dispose {}", voice);
        Ok(())
    }

    fn set_voice_volume(&mut self, voice: VoiceId, volume_db: f32) -> Result<()> {
        log::debug!("[SOUND] {} volume {:.1} dB", voice, volume_db);
        Ok(())
    }

    fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        log::info!("[SOUND] tempo {:.1} BPM", bpm);
        Ok(())
    }

    fn trigger_note(&mut self, note: &NoteTrigger) -> Result<()> {
        if !self.prepared {
            return Err(EngineError::Sound("note before prepare".to_string()));
        }
        self.notes += 1;
        log::debug!(
            "[SOUND] {:<8} step {:>2} {:<4} {:>7.2} Hz {}",
            note.voice,
            note.step,
            note.pitch,
            note.pitch.frequency(),
            note.duration
        );
        Ok(())
    }

    fn trigger_one_shot(&mut self, shot: &OneShot) -> Result<()> {
        self.one_shots += 1;
        let notes: Vec<String> = shot.notes.iter().map(|p| p.to_string()).collect();
        log::info!("[SOUND] {} -> [{}]", shot.event, notes.join(" "));
        for (at, pitch) in shot.schedule() {
            log::debug!(
                "[SOUND]   {} ({:.1} Hz) +{}ms",
                pitch,
                pitch.frequency(),
                at.saturating_duration_since(shot.at).as_millis()
            );
        }
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        log::info!("[SOUND] transport started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        log::info!("[SOUND] transport stopped");
        Ok(())
    }

    fn dispose(&mut self) -> Result<()> {
        log::info!(
            "[SOUND] disposed after {} notes and {} one-shots",
            self.notes,
            self.one_shots
        );
        self.prepared = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterConfig, FilterType};

    #[test]
    fn test_effect_chain_skips_disabled_stages() {
        let chain = EffectChain::from_stages(&[
            EffectStage::off(Effect::Distortion { amount: 0.5, wet: 1.0 }),
            EffectStage::on(Effect::Filter {
                filter: FilterConfig::new(FilterType::Lowpass, 800.0, 8.0),
            }),
            EffectStage::on(Effect::Limiter { threshold_db: -3.0 }),
        ]);
        assert_eq!(chain.stages().len(), 2);
        assert_eq!(chain.describe(), "filter -> limiter -> out");
    }

    #[test]
    fn test_empty_chain_is_direct() {
        let chain = EffectChain::from_stages(&[EffectStage::off(Effect::Limiter {
            threshold_db: 0.0,
        })]);
        assert!(chain.is_direct());
        assert_eq!(chain.describe(), "direct -> out");
    }

    #[test]
    fn test_engine_plan_from_default_config() {
        let plan = EnginePlan::from_config(&MusicConfig::default());
        assert_eq!(plan.master_chain.describe(), "reverb -> limiter -> out");
        assert_eq!(plan.one_shots.len(), 6);
        assert!(plan.ambience.is_none());
        let walk = plan
            .one_shots
            .iter()
            .find(|p| p.event == EventKind::Walk)
            .unwrap();
        assert!(walk.chain.is_direct());
        assert_eq!(plan.instruments[VoiceId::Runners].oscillator, "sawtooth");
    }

    #[test]
    fn test_recording_engine_shares_log_between_clones() {
        let observer = RecordingEngine::new();
        let mut engine = observer.clone();
        engine.set_tempo(120.0).unwrap();
        engine.start().unwrap();
        assert_eq!(observer.calls(), vec![SoundCall::SetTempo(120.0), SoundCall::Start]);
        observer.clear();
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_recording_engine_failures() {
        let mut engine = RecordingEngine::new().fail_voice(VoiceId::Outs);
        assert!(engine.stop_voice(VoiceId::Outs).is_err());
        assert!(engine.stop_voice(VoiceId::Balls).is_ok());

        let mut engine = RecordingEngine::unavailable();
        let plan = EnginePlan::from_config(&MusicConfig::default());
        assert!(matches!(
            engine.prepare(&plan),
            Err(EngineError::Initialization(_))
        ));
    }

    #[test]
    fn test_log_engine_counts_phrases() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut engine = LogEngine::new();
        engine
            .prepare(&EnginePlan::from_config(&MusicConfig::default()))
            .unwrap();
        let shot = OneShot {
            event: crate::events::GameEvent::HomeRun,
            notes: vec!["C4".parse().unwrap(), "G4".parse().unwrap()],
            note_length: Subdivision::EIGHTH,
            inter_note_delay: std::time::Duration::from_millis(150),
            at: std::time::Instant::now(),
        };
        engine.trigger_one_shot(&shot).unwrap();
        assert_eq!(engine.one_shots_played(), 1);
        assert_eq!(engine.notes_played(), 0);
    }
}
