//! Timing primitives for the shared transport.
//!
//! - [`BeatTime`] - Fixed-point beat representation for precise timing
//! - [`Subdivision`] - Musical note value of one sequencer step ("8n", "16n", ...)
//! - [`TransportClock`] - The one clock every voice is driven by

use crate::error::{EngineError, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Lowest and highest tempo the clock accepts.
pub const MIN_BPM: f64 = 1.0;
pub const MAX_BPM: f64 = 999.0;

/// Fixed-point beat representation with 16 fractional bits.
///
/// Using fixed-point avoids floating-point drift over a nine-inning session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BeatTime {
    beats: i64,
}

impl BeatTime {
    const SCALE: i64 = 65_536;

    /// Zero beat time constant.
    pub const ZERO: BeatTime = BeatTime { beats: 0 };

    /// Create a BeatTime from a floating-point beat value.
    #[inline]
    pub fn from_float(value: f64) -> Self {
        Self {
            beats: (value * Self::SCALE as f64).round() as i64,
        }
    }

    /// Convert to a floating-point beat value.
    #[inline]
    pub fn to_float(self) -> f64 {
        self.beats as f64 / Self::SCALE as f64
    }
}

impl std::ops::Add for BeatTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            beats: self.beats.saturating_add(rhs.beats),
        }
    }
}

/// Rhythmic modifier on a note value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NoteModifier {
    /// Plain note value.
    Straight,
    /// One and a half times as long ("8n.").
    Dotted,
    /// Two thirds as long ("8t").
    Triplet,
}

/// Length of one sequencer step, in musical notation.
///
/// `"4n"` is a quarter note (one beat), `"8n"` an eighth, `"8n."` a dotted
/// eighth and `"8t"` an eighth-note triplet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Subdivision {
    /// Note value denominator (1 = whole, 4 = quarter, 16 = sixteenth).
    pub denominator: u32,
    pub modifier: NoteModifier,
}

impl Subdivision {
    pub const QUARTER: Subdivision = Subdivision::straight(4);
    pub const EIGHTH: Subdivision = Subdivision::straight(8);
    pub const SIXTEENTH: Subdivision = Subdivision::straight(16);

    /// A plain note value.
    pub const fn straight(denominator: u32) -> Self {
        Self {
            denominator,
            modifier: NoteModifier::Straight,
        }
    }

    /// A dotted note value.
    pub const fn dotted(denominator: u32) -> Self {
        Self {
            denominator,
            modifier: NoteModifier::Dotted,
        }
    }

    /// Length in quarter-note beats.
    pub fn beats(&self) -> f64 {
        let base = 4.0 / self.denominator.max(1) as f64;
        match self.modifier {
            NoteModifier::Straight => base,
            NoteModifier::Dotted => base * 1.5,
            NoteModifier::Triplet => base * 2.0 / 3.0,
        }
    }

    /// Wall-clock length at the given tempo.
    pub fn duration_at(&self, bpm: f64) -> Duration {
        Duration::from_secs_f64(self.beats() * 60.0 / bpm.clamp(MIN_BPM, MAX_BPM))
    }
}

impl Default for Subdivision {
    fn default() -> Self {
        Self::SIXTEENTH
    }
}

impl fmt::Display for Subdivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modifier {
            NoteModifier::Straight => write!(f, "{}n", self.denominator),
            NoteModifier::Dotted => write!(f, "{}n.", self.denominator),
            NoteModifier::Triplet => write!(f, "{}t", self.denominator),
        }
    }
}

fn subdivision_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)(n\.|n|t)$").expect("valid subdivision regex"))
}

impl FromStr for Subdivision {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let caps = subdivision_regex()
            .captures(s.trim())
            .ok_or_else(|| EngineError::Config(format!("Invalid subdivision '{s}'")))?;
        let denominator: u32 = caps[1]
            .parse()
            .map_err(|_| EngineError::Config(format!("Invalid subdivision '{s}'")))?;
        if denominator == 0 {
            return Err(EngineError::Config(format!("Subdivision '{s}' has a zero note value")));
        }
        let modifier = match &caps[2] {
            "n." => NoteModifier::Dotted,
            "t" => NoteModifier::Triplet,
            _ => NoteModifier::Straight,
        };
        Ok(Self {
            denominator,
            modifier,
        })
    }
}

impl Serialize for Subdivision {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Subdivision {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Transport-aware clock for converting between wall-clock time and beats.
///
/// The clock maintains an anchor point (beat position at a specific instant)
/// and uses BPM to calculate beat positions at other times. Changing the
/// tempo re-anchors, so every voice keeps its position and only the absolute
/// speed changes.
#[derive(Clone, Debug)]
pub struct TransportClock {
    bpm: f64,
    running: bool,
    anchor_instant: Instant,
    anchor_beat: BeatTime,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportClock {
    /// Create a new transport clock at 120 BPM, stopped at beat 0.
    pub fn new() -> Self {
        Self {
            bpm: 120.0,
            running: false,
            anchor_instant: Instant::now(),
            anchor_beat: BeatTime::ZERO,
        }
    }

    /// Set the BPM, preserving the current beat position.
    pub fn set_bpm(&mut self, bpm: f64, now: Instant) {
        let beat = self.beat_at(now);
        self.anchor_beat = beat;
        self.anchor_instant = now;
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    /// Get the current BPM.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Start the transport at the given instant.
    pub fn start(&mut self, now: Instant) {
        self.anchor_instant = now;
        self.running = true;
    }

    /// Stop the transport, preserving the current beat position.
    pub fn stop(&mut self, now: Instant) {
        self.anchor_beat = self.beat_at(now);
        self.running = false;
    }

    /// Calculate the beat position at a given instant.
    pub fn beat_at(&self, time: Instant) -> BeatTime {
        if !self.running || time <= self.anchor_instant {
            return self.anchor_beat;
        }

        let elapsed = time.duration_since(self.anchor_instant).as_secs_f64();
        let beats_elapsed = (elapsed / 60.0) * self.bpm;
        self.anchor_beat + BeatTime::from_float(beats_elapsed)
    }

    /// The wall-clock instant at which `beat` is (or was) reached.
    ///
    /// Beats at or before the current position map to `now`.
    pub fn instant_at(&self, beat: BeatTime, now: Instant) -> Instant {
        let current = self.beat_at(now);
        let beats_ahead = beat.to_float() - current.to_float();
        if beats_ahead <= 0.0 {
            return now;
        }
        now + Duration::from_secs_f64(beats_ahead * 60.0 / self.bpm)
    }

    /// The first multiple of `quantum` at or after the current beat.
    pub fn next_boundary(&self, quantum: f64, now: Instant) -> BeatTime {
        let current = self.beat_at(now).to_float();
        if quantum <= f64::EPSILON {
            return BeatTime::from_float(current);
        }
        BeatTime::from_float(((current / quantum).ceil() * quantum).max(0.0))
    }

    /// Calculate how many beats fit in the given lookahead window.
    pub fn lookahead_beats(&self, lookahead: Duration) -> f64 {
        lookahead.as_secs_f64() * (self.bpm / 60.0)
    }

    /// Check if the transport is running.
    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beat_time_roundtrip() {
        for val in [0.0, 1.0, 1.5, 3.75, 100.0, -5.0] {
            let bt = BeatTime::from_float(val);
            let back = bt.to_float();
            assert!((back - val).abs() < 0.0001, "Roundtrip failed for {val}");
        }
    }

    #[test]
    fn test_transport_clock_beat_calculation() {
        let mut clock = TransportClock::new();
        let now = Instant::now();
        clock.set_bpm(120.0, now);
        clock.start(now);
        // At 120 BPM, 1 beat = 0.5 seconds
        let later = now + Duration::from_millis(500);
        assert!((clock.beat_at(later).to_float() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_tempo_change_preserves_position() {
        let mut clock = TransportClock::new();
        let t0 = Instant::now();
        clock.start(t0);
        let t1 = t0 + Duration::from_secs(1);
        clock.set_bpm(60.0, t1);
        assert!((clock.beat_at(t1).to_float() - 2.0).abs() < 0.001);
        let t2 = t1 + Duration::from_secs(1);
        assert!((clock.beat_at(t2).to_float() - 3.0).abs() < 0.001);
    }

    #[test]
    fn test_stopped_clock_does_not_advance() {
        let mut clock = TransportClock::new();
        let t0 = Instant::now();
        clock.start(t0);
        clock.stop(t0 + Duration::from_millis(500));
        let later = t0 + Duration::from_secs(10);
        assert!((clock.beat_at(later).to_float() - 1.0).abs() < 0.001);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_bpm_is_clamped() {
        let mut clock = TransportClock::new();
        clock.set_bpm(0.0, Instant::now());
        assert!((clock.bpm() - MIN_BPM).abs() < f64::EPSILON);
        clock.set_bpm(5000.0, Instant::now());
        assert!((clock.bpm() - MAX_BPM).abs() < f64::EPSILON);
    }

    #[test]
    fn test_next_boundary() {
        let mut clock = TransportClock::new();
        let t0 = Instant::now();
        clock.start(t0);
        // 0.75 s at 120 BPM = 1.5 beats
        let now = t0 + Duration::from_millis(750);
        assert!((clock.next_boundary(1.0, now).to_float() - 2.0).abs() < 0.001);
        assert!((clock.next_boundary(4.0, now).to_float() - 4.0).abs() < 0.001);
        assert_eq!(clock.next_boundary(1.0, t0), BeatTime::ZERO);
    }

    #[test]
    fn test_instant_at() {
        let mut clock = TransportClock::new();
        let t0 = Instant::now();
        clock.start(t0);
        let at = clock.instant_at(BeatTime::from_float(2.0), t0);
        assert_eq!(at.duration_since(t0), Duration::from_secs(1));
        assert_eq!(clock.instant_at(BeatTime::ZERO, t0), t0);
    }

    #[test]
    fn test_subdivision_parsing() {
        let eighth: Subdivision = "8n".parse().unwrap();
        assert!((eighth.beats() - 0.5).abs() < 1e-9);
        let dotted: Subdivision = "8n.".parse().unwrap();
        assert!((dotted.beats() - 0.75).abs() < 1e-9);
        let triplet: Subdivision = "8t".parse().unwrap();
        assert!((triplet.beats() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(dotted.to_string(), "8n.");
        assert!("8x".parse::<Subdivision>().is_err());
        assert!("0n".parse::<Subdivision>().is_err());
    }

    #[test]
    fn test_subdivision_duration() {
        assert_eq!(Subdivision::QUARTER.duration_at(120.0), Duration::from_millis(500));
    }
}
