//! Pitch names and level conversions.
//!
//! Scales are configured as scientific pitch names ("C3", "Eb4", "F#2").
//! [`Pitch`] keeps the name for the sound backend and resolves it to a MIDI
//! note number and frequency.

use crate::error::{EngineError, Result};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// MIDI note number of C3.
pub const C3_MIDI: u8 = 48;

/// A named pitch resolved to its MIDI note number.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pitch {
    name: String,
    midi: u8,
}

impl Pitch {
    /// The pitch name as written in the config.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// MIDI note number (C4 = 60).
    pub fn midi(&self) -> u8 {
        self.midi
    }

    /// Frequency in Hz, A4 = 440.
    pub fn frequency(&self) -> f64 {
        midi_to_frequency(self.midi)
    }

    /// Build a pitch from a MIDI note number, spelled with sharps.
    pub fn from_midi(midi: u8) -> Self {
        let names = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
        let octave = (midi / 12) as i8 - 1;
        Self {
            name: format!("{}{}", names[(midi % 12) as usize], octave),
            midi,
        }
    }
}

fn pitch_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Ga-g])(#|b)?(-?\d)$").expect("valid pitch regex"))
}

impl FromStr for Pitch {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || EngineError::Config(format!("Invalid pitch name '{s}'"));
        let caps = pitch_regex().captures(s.trim()).ok_or_else(invalid)?;

        let class: i32 = match caps[1].to_ascii_uppercase().as_str() {
            "C" => 0,
            "D" => 2,
            "E" => 4,
            "F" => 5,
            "G" => 7,
            "A" => 9,
            _ => 11,
        };
        let accidental = match caps.get(2).map(|m| m.as_str()) {
            Some("#") => 1,
            Some("b") => -1,
            _ => 0,
        };
        let octave: i32 = caps[3].parse().map_err(|_| invalid())?;

        let midi = (octave + 1) * 12 + class + accidental;
        let midi = u8::try_from(midi).ok().filter(|m| *m <= 127).ok_or_else(invalid)?;

        Ok(Self {
            name: s.trim().to_string(),
            midi,
        })
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Serialize for Pitch {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for Pitch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Frequency of a MIDI note in Hz.
pub fn midi_to_frequency(midi: u8) -> f64 {
    440.0 * 2f64.powf((midi as f64 - 69.0) / 12.0)
}

/// Convert a linear gain (0..1) to decibels. Silence maps to negative infinity.
pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        return f64::NEG_INFINITY;
    }
    20.0 * gain.log10()
}

/// Convert decibels to linear gain.
pub fn db_to_gain(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}
