//! Music configuration.
//!
//! Everything that shapes the sound without touching engine logic lives here:
//! per-voice base rhythms, the scales, the tempo formula, one-shot phrases for
//! game events, instruments, effect chains and engine timing. The built-in
//! [`Default`] is the stock sound design; a TOML file can override any part.
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/ballpark/config.toml`
//! - macOS: `~/Library/Application Support/ballpark/config.toml`
//! - Windows: `%APPDATA%\ballpark\config.toml`

use crate::error::{EngineError, Result};
use crate::events::EventKind;
use crate::pitch::Pitch;
use crate::timing::Subdivision;
use crate::voice::VoiceId;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MusicConfig {
    /// Master level and effects.
    pub master: MasterConfig,
    /// Scales and root note.
    pub scales: ScaleConfig,
    /// Base rhythm specs per voice.
    pub rhythms: RhythmConfig,
    /// Tempo formula constants.
    pub tempo: TempoConfig,
    /// Instruments per voice.
    pub instruments: VoiceInstruments,
    /// One-shot phrases per game event.
    pub events: EventSounds,
    /// Background noise bed.
    pub ambience: AmbienceConfig,
    /// Scheduling and debounce timing.
    pub engine: EngineTiming,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            master: MasterConfig::default(),
            scales: ScaleConfig::default(),
            rhythms: RhythmConfig::default(),
            tempo: TempoConfig::default(),
            instruments: VoiceInstruments::default(),
            events: EventSounds::default(),
            ambience: AmbienceConfig::default(),
            engine: EngineTiming::default(),
        }
    }
}

impl MusicConfig {
    /// Parse a configuration from TOML. Missing sections fall back to defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MusicConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from the default config file location.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(EngineError::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load configuration or return default if not found or invalid.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Using default music config: {}", e);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path.
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "ballpark") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(EngineError::Config("Could not determine config directory".to_string()))
        }
    }

    /// Write the default configuration to `path`, creating parent directories.
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let header = "# ballpark music configuration\n\
                      # Every section is optional; missing values use the built-in sound design.\n\n";
        fs::write(path, format!("{}{}", header, Self::default().to_toml_string()?))?;
        Ok(())
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        for (kind, scale) in self.scales.named() {
            if scale.is_empty() {
                return Err(EngineError::Config(format!("Scale '{}' is empty", kind)));
            }
        }
        for voice in VoiceId::ALL {
            let base = self.rhythms.get(voice);
            if base.steps == 0 || base.late_steps == Some(0) {
                return Err(EngineError::Config(format!(
                    "Rhythm for voice '{}' needs at least one step",
                    voice
                )));
            }
        }
        if self.tempo.max_bpm < 1.0 {
            return Err(EngineError::Config(format!(
                "max_bpm must be at least 1, got {}",
                self.tempo.max_bpm
            )));
        }
        if self.engine.quantize_beats < 0.0 {
            return Err(EngineError::Config("quantize_beats must not be negative".to_string()));
        }
        Ok(())
    }
}

/// Master output settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MasterConfig {
    /// Output level in dB.
    pub volume_db: f32,
    /// Master effect chain, processed in order.
    pub effects: Vec<EffectStage>,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            volume_db: -6.0,
            effects: vec![
                EffectStage::on(Effect::Reverb {
                    decay: 1.5,
                    pre_delay: 0.01,
                    wet: 0.3,
                }),
                EffectStage::on(Effect::Limiter { threshold_db: -3.0 }),
            ],
        }
    }
}

/// Which scale the score situation selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    HomeTeamLeading,
    AwayTeamLeading,
    Tied,
    EarlyInnings,
    LateInnings,
}

impl std::fmt::Display for ScaleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScaleKind::HomeTeamLeading => "home_team_leading",
            ScaleKind::AwayTeamLeading => "away_team_leading",
            ScaleKind::Tied => "tied",
            ScaleKind::EarlyInnings => "early_innings",
            ScaleKind::LateInnings => "late_innings",
        };
        f.write_str(name)
    }
}

/// Scales and tonal center.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScaleConfig {
    /// Fixed root note reported with every tonality.
    pub root_note: Pitch,
    /// Major pentatonic.
    pub home_team_leading: Vec<Pitch>,
    /// Minor pentatonic.
    pub away_team_leading: Vec<Pitch>,
    /// Mixolydian flavor.
    pub tied: Vec<Pitch>,
    /// Major; not selected by the interpreter, kept for sound designers.
    pub early_innings: Vec<Pitch>,
    /// Dorian, used for a tie late in the game.
    pub late_innings: Vec<Pitch>,
}

impl ScaleConfig {
    /// The scale for a kind.
    pub fn get(&self, kind: ScaleKind) -> &[Pitch] {
        match kind {
            ScaleKind::HomeTeamLeading => &self.home_team_leading,
            ScaleKind::AwayTeamLeading => &self.away_team_leading,
            ScaleKind::Tied => &self.tied,
            ScaleKind::EarlyInnings => &self.early_innings,
            ScaleKind::LateInnings => &self.late_innings,
        }
    }

    fn named(&self) -> [(ScaleKind, &[Pitch]); 5] {
        [
            ScaleKind::HomeTeamLeading,
            ScaleKind::AwayTeamLeading,
            ScaleKind::Tied,
            ScaleKind::EarlyInnings,
            ScaleKind::LateInnings,
        ]
        .map(|kind| (kind, self.get(kind)))
    }
}

fn pitches(names: &[&str]) -> Vec<Pitch> {
    names.iter().filter_map(|n| n.parse().ok()).collect()
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            root_note: Pitch::from_midi(crate::pitch::C3_MIDI),
            home_team_leading: pitches(&["C3", "E3", "G3", "A3", "C4", "D4", "E4", "G4", "A4"]),
            away_team_leading: pitches(&["C3", "Eb3", "F3", "G3", "Bb3", "C4", "Eb4", "F4", "G4"]),
            tied: pitches(&["C3", "D3", "E3", "G3", "B3", "C4", "D4", "E4", "G4"]),
            early_innings: pitches(&["C3", "D3", "E3", "G3", "A3", "C4", "D4", "E4", "G4", "A4"]),
            late_innings: pitches(&["C3", "D3", "Eb3", "G3", "Bb3", "C4", "D4", "Eb4", "G4"]),
        }
    }
}

/// Base rhythm for one voice. Pulses come from game state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RhythmBase {
    /// Pattern length.
    pub steps: u32,
    /// Pattern length from the late-inning threshold on (inning voice).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late_steps: Option<u32>,
    /// Left rotation applied to the generated pattern.
    #[serde(default)]
    pub rotation: i32,
    /// Length of one step.
    pub subdivision: Subdivision,
    /// Voice level in dB.
    pub volume_db: f32,
}

impl RhythmBase {
    fn new(steps: u32, rotation: i32, subdivision: Subdivision, volume_db: f32) -> Self {
        Self {
            steps,
            late_steps: None,
            rotation,
            subdivision,
            volume_db,
        }
    }

    /// Step count for the current game phase.
    pub fn steps_for(&self, late_game: bool) -> u32 {
        match (late_game, self.late_steps) {
            (true, Some(late)) => late,
            _ => self.steps,
        }
    }
}

impl Default for RhythmBase {
    fn default() -> Self {
        Self::new(4, 0, Subdivision::EIGHTH, -8.0)
    }
}

/// Base rhythms for all voices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RhythmConfig {
    /// First inning considered "late" (more rhythmic complexity, late scale).
    pub late_inning: u32,
    pub balls: RhythmBase,
    pub strikes: RhythmBase,
    pub outs: RhythmBase,
    pub runners: RhythmBase,
    pub inning: RhythmBase,
}

impl RhythmConfig {
    /// Base rhythm for a voice.
    pub fn get(&self, voice: VoiceId) -> &RhythmBase {
        match voice {
            VoiceId::Balls => &self.balls,
            VoiceId::Strikes => &self.strikes,
            VoiceId::Outs => &self.outs,
            VoiceId::Runners => &self.runners,
            VoiceId::Inning => &self.inning,
        }
    }
}

impl Default for RhythmConfig {
    fn default() -> Self {
        let mut inning = RhythmBase::new(8, 0, Subdivision::QUARTER, -10.0);
        inning.late_steps = Some(12);
        Self {
            late_inning: 7,
            balls: RhythmBase::new(4, 0, Subdivision::EIGHTH, -8.0),
            strikes: RhythmBase::new(3, 1, Subdivision::SIXTEENTH, -6.0),
            outs: RhythmBase::new(3, 0, Subdivision::dotted(8), -4.0),
            runners: RhythmBase::new(3, 0, Subdivision::EIGHTH, -5.0),
            inning,
        }
    }
}

/// Constants of the tempo formula
/// `bpm = base + inning * per_inning + total_runs * per_run`, capped at `max_bpm`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TempoConfig {
    pub base: f64,
    pub per_inning: f64,
    pub per_run: f64,
    pub max_bpm: f64,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            base: 90.0,
            per_inning: 5.0,
            per_run: 0.0,
            max_bpm: 140.0,
        }
    }
}

/// ADSR envelope, times in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Envelope {
    pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack,
            decay,
            sustain,
            release,
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(0.01, 0.1, 0.3, 0.5)
    }
}

/// Filter response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Lowpass,
    Highpass,
    Bandpass,
}

/// A resonant filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FilterConfig {
    #[serde(rename = "type")]
    pub filter_type: FilterType,
    pub frequency: f32,
    pub q: f32,
}

impl FilterConfig {
    pub const fn new(filter_type: FilterType, frequency: f32, q: f32) -> Self {
        Self {
            filter_type,
            frequency,
            q,
        }
    }
}

/// A simple oscillator-envelope-filter instrument.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstrumentConfig {
    /// Oscillator shape, e.g. "sine", "triangle8", "square4".
    pub oscillator: String,
    pub envelope: Envelope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterConfig>,
}

impl InstrumentConfig {
    fn new(oscillator: &str, envelope: Envelope, filter: Option<FilterConfig>) -> Self {
        Self {
            oscillator: oscillator.to_string(),
            envelope,
            filter,
        }
    }
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self::new("sine", Envelope::default(), None)
    }
}

/// One instrument per voice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VoiceInstruments {
    pub balls: InstrumentConfig,
    pub strikes: InstrumentConfig,
    pub outs: InstrumentConfig,
    pub runners: InstrumentConfig,
    pub inning: InstrumentConfig,
}

impl VoiceInstruments {
    /// Instrument for a voice.
    pub fn get(&self, voice: VoiceId) -> &InstrumentConfig {
        match voice {
            VoiceId::Balls => &self.balls,
            VoiceId::Strikes => &self.strikes,
            VoiceId::Outs => &self.outs,
            VoiceId::Runners => &self.runners,
            VoiceId::Inning => &self.inning,
        }
    }
}

impl Default for VoiceInstruments {
    fn default() -> Self {
        use FilterType::*;
        Self {
            balls: InstrumentConfig::new(
                "sine",
                Envelope::new(0.02, 0.1, 0.3, 0.8),
                Some(FilterConfig::new(Lowpass, 800.0, 1.0)),
            ),
            strikes: InstrumentConfig::new(
                "triangle",
                Envelope::new(0.005, 0.2, 0.2, 0.3),
                Some(FilterConfig::new(Highpass, 300.0, 1.0)),
            ),
            outs: InstrumentConfig::new(
                "square",
                Envelope::new(0.01, 0.3, 0.1, 0.2),
                Some(FilterConfig::new(Bandpass, 500.0, 2.0)),
            ),
            runners: InstrumentConfig::new(
                "sawtooth",
                Envelope::new(0.05, 0.3, 0.4, 0.5),
                Some(FilterConfig::new(Lowpass, 1200.0, 1.0)),
            ),
            inning: InstrumentConfig::new(
                "sine4",
                Envelope::new(0.1, 0.4, 0.6, 1.5),
                Some(FilterConfig::new(Lowpass, 600.0, 0.5)),
            ),
        }
    }
}

/// One effect unit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    Reverb { decay: f32, pre_delay: f32, wet: f32 },
    Limiter { threshold_db: f32 },
    FeedbackDelay { time: Subdivision, feedback: f32, wet: f32 },
    Distortion { amount: f32, wet: f32 },
    Filter { filter: FilterConfig },
}

impl Effect {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Effect::Reverb { .. } => "reverb",
            Effect::Limiter { .. } => "limiter",
            Effect::FeedbackDelay { .. } => "feedback_delay",
            Effect::Distortion { .. } => "distortion",
            Effect::Filter { .. } => "filter",
        }
    }
}

/// An optional stage in an effect chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EffectStage {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub effect: Effect,
}

fn enabled_by_default() -> bool {
    true
}

impl EffectStage {
    /// An enabled stage.
    pub fn on(effect: Effect) -> Self {
        Self {
            enabled: true,
            effect,
        }
    }

    /// A disabled stage (kept in the config, skipped when wiring).
    pub fn off(effect: Effect) -> Self {
        Self {
            enabled: false,
            effect,
        }
    }
}

/// Phrase played once when a game event is detected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OneShotConfig {
    pub notes: Vec<Pitch>,
    pub instrument: InstrumentConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub effects: Vec<EffectStage>,
}

impl Default for OneShotConfig {
    fn default() -> Self {
        Self {
            notes: Vec::new(),
            instrument: InstrumentConfig::default(),
            effects: Vec::new(),
        }
    }
}

/// One-shot phrase per event kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventSounds {
    pub hit: OneShotConfig,
    pub home_run: OneShotConfig,
    pub strikeout: OneShotConfig,
    pub walk: OneShotConfig,
    pub run_scored: OneShotConfig,
    pub out_recorded: OneShotConfig,
}

impl EventSounds {
    /// Phrase for an event kind.
    pub fn get(&self, kind: EventKind) -> &OneShotConfig {
        match kind {
            EventKind::Hit => &self.hit,
            EventKind::HomeRun => &self.home_run,
            EventKind::Strikeout => &self.strikeout,
            EventKind::Walk => &self.walk,
            EventKind::RunScored => &self.run_scored,
            EventKind::OutRecorded => &self.out_recorded,
        }
    }
}

impl Default for EventSounds {
    fn default() -> Self {
        default_events()
    }
}

fn default_events() -> EventSounds {
    let one_shot = |notes: &[&str], oscillator: &str, envelope: Envelope, effects: Vec<EffectStage>| {
        OneShotConfig {
            notes: pitches(notes),
            instrument: InstrumentConfig::new(oscillator, envelope, None),
            effects,
        }
    };
    EventSounds {
        hit: one_shot(
            &["G4", "C5"],
            "triangle8",
            Envelope::new(0.01, 0.1, 0.3, 0.6),
            vec![EffectStage::on(Effect::FeedbackDelay {
                time: Subdivision::SIXTEENTH,
                feedback: 0.3,
                wet: 0.4,
            })],
        ),
        home_run: one_shot(
            &["C4", "E4", "G4", "C5", "E5", "G5"],
            "square8",
            Envelope::new(0.01, 0.3, 0.4, 0.8),
            vec![
                EffectStage::on(Effect::FeedbackDelay {
                    time: Subdivision::EIGHTH,
                    feedback: 0.4,
                    wet: 0.5,
                }),
                EffectStage::on(Effect::Distortion { amount: 0.3, wet: 0.3 }),
            ],
        ),
        strikeout: one_shot(
            &["E4", "D4", "C4"],
            "sawtooth",
            Envelope::new(0.01, 0.1, 0.1, 0.3),
            vec![EffectStage::on(Effect::Filter {
                filter: FilterConfig::new(FilterType::Lowpass, 800.0, 8.0),
            })],
        ),
        walk: one_shot(
            &["C4", "E4", "G4"],
            "triangle",
            Envelope::new(0.05, 0.2, 0.2, 0.4),
            Vec::new(),
        ),
        run_scored: one_shot(
            &["C5", "G4", "E4", "C4", "G3", "C4"],
            "sine4",
            Envelope::new(0.01, 0.2, 0.3, 0.8),
            vec![EffectStage::on(Effect::Reverb {
                decay: 2.0,
                pre_delay: 0.01,
                wet: 0.5,
            })],
        ),
        out_recorded: one_shot(
            &["A3", "E3"],
            "square4",
            Envelope::new(0.01, 0.2, 0.1, 0.3),
            Vec::new(),
        ),
    }
}

/// Color of the ambience noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    White,
    Pink,
    Brown,
}

/// Crowd-like noise bed under the voices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AmbienceConfig {
    pub enabled: bool,
    pub noise: NoiseColor,
    pub filter: FilterConfig,
    pub volume_db: f32,
}

impl Default for AmbienceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            noise: NoiseColor::Pink,
            filter: FilterConfig::new(FilterType::Lowpass, 800.0, 1.0),
            volume_db: -20.0,
        }
    }
}

/// Scheduling and smoothing parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineTiming {
    /// Coalescing window for tempo changes.
    #[serde(with = "duration_str")]
    pub tempo_debounce: Duration,
    /// Gap between consecutive notes of a one-shot phrase.
    #[serde(with = "duration_str")]
    pub inter_note_delay: Duration,
    /// Length of each one-shot note.
    pub one_shot_note: Subdivision,
    /// How far ahead of the clock steps are handed to the sound engine.
    #[serde(with = "duration_str")]
    pub lookahead: Duration,
    /// Grid (in beats) on which new or replaced patterns start.
    pub quantize_beats: f64,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            tempo_debounce: Duration::from_millis(250),
            inter_note_delay: Duration::from_millis(150),
            one_shot_note: Subdivision::EIGHTH,
            lookahead: Duration::from_millis(100),
            quantize_beats: 1.0,
        }
    }
}

/// Serde helper for human-readable durations ("250ms", "1s 500ms").
mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MusicConfig::default();
        config.validate().unwrap();
        assert_eq!(config.scales.home_team_leading.len(), 9);
        assert_eq!(config.scales.early_innings.len(), 10);
        assert_eq!(config.rhythms.get(VoiceId::Inning).steps_for(true), 12);
        assert_eq!(config.rhythms.get(VoiceId::Inning).steps_for(false), 8);
        assert_eq!(config.rhythms.get(VoiceId::Balls).steps_for(true), 4);
        assert_eq!(config.events.get(EventKind::HomeRun).notes.len(), 6);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = MusicConfig::default();
        let text = config.to_toml_string().unwrap();
        let parsed = MusicConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.scales, config.scales);
        assert_eq!(parsed.rhythms, config.rhythms);
        assert_eq!(parsed.engine, config.engine);
        assert_eq!(parsed.events.get(EventKind::Strikeout), config.events.get(EventKind::Strikeout));
    }

    #[test]
    fn test_partial_override() {
        let config = MusicConfig::from_toml_str(
            r#"
            [tempo]
            base = 100.0
            max_bpm = 160.0

            [engine]
            tempo_debounce = "500ms"

            [rhythms]
            late_inning = 8

            [rhythms.balls]
            steps = 8
            subdivision = "16n"
            volume_db = -3.0
            "#,
        )
        .unwrap();
        assert!((config.tempo.base - 100.0).abs() < f64::EPSILON);
        assert!((config.tempo.per_inning - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.engine.tempo_debounce, Duration::from_millis(500));
        assert_eq!(config.engine.inter_note_delay, Duration::from_millis(150));
        assert_eq!(config.rhythms.late_inning, 8);
        assert_eq!(config.rhythms.balls.steps, 8);
        assert_eq!(config.rhythms.balls.subdivision, Subdivision::SIXTEENTH);
        // Untouched voices keep their defaults.
        assert_eq!(config.rhythms.strikes.rotation, 1);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(MusicConfig::from_toml_str("[scales]\ntied = []\n").is_err());
        assert!(MusicConfig::from_toml_str("[scales]\ntied = [\"X9\"]\n").is_err());
        assert!(MusicConfig::from_toml_str(
            "[rhythms.outs]\nsteps = 0\nsubdivision = \"8n\"\nvolume_db = 0.0\n"
        )
        .is_err());
        assert!(MusicConfig::from_toml_str("[engine]\nlookahead = \"soon\"\n").is_err());
    }

    #[test]
    fn test_write_default_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        MusicConfig::write_default(&path).unwrap();
        let loaded = MusicConfig::load_from(&path).unwrap();
        assert_eq!(loaded.tempo, MusicConfig::default().tempo);
    }

    #[test]
    fn test_effect_stage_toml() {
        let config = MusicConfig::from_toml_str(
            r#"
            [[master.effects]]
            enabled = false
            effect = { type = "reverb", decay = 3.0, pre_delay = 0.0, wet = 0.2 }

            [[master.effects]]
            effect = { type = "filter" }
            "#,
        );
        // A filter stage needs its parameters.
        assert!(config.is_err());

        let config = MusicConfig::from_toml_str(
            r#"
            [[master.effects]]
            enabled = false
            effect = { type = "reverb", decay = 3.0, pre_delay = 0.0, wet = 0.2 }

            [[master.effects]]
            effect = { type = "limiter", threshold_db = -1.0 }
            "#,
        )
        .unwrap();
        assert_eq!(config.master.effects.len(), 2);
        assert!(!config.master.effects[0].enabled);
        assert!(config.master.effects[1].enabled);
    }
}
