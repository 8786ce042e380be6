//! Game events and the sound instructions they turn into.
//!
//! - [`GameEvent`] - A discrete in-game happening detected by diffing snapshots
//! - [`NoteTrigger`] - One onset of a sequenced voice, bound to a transport beat
//! - [`OneShot`] - A short phrase played immediately for a game event

use crate::pitch::Pitch;
use crate::timing::{BeatTime, Subdivision};
use crate::voice::VoiceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Which side of the scoreboard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    Home,
    Away,
}

/// A discrete event inferred from two consecutive snapshots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameEvent {
    /// The given team's score went up.
    RunScored { team: TeamSide },
    Strikeout,
    Walk,
    Hit,
    HomeRun,
    OutRecorded,
}

impl GameEvent {
    /// The event kind, used to look up its one-shot phrase.
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::RunScored { .. } => EventKind::RunScored,
            GameEvent::Strikeout => EventKind::Strikeout,
            GameEvent::Walk => EventKind::Walk,
            GameEvent::Hit => EventKind::Hit,
            GameEvent::HomeRun => EventKind::HomeRun,
            GameEvent::OutRecorded => EventKind::OutRecorded,
        }
    }
}

impl fmt::Display for GameEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameEvent::RunScored { team: TeamSide::Home } => f.write_str("runScored(home)"),
            GameEvent::RunScored { team: TeamSide::Away } => f.write_str("runScored(away)"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// Event kinds without payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    RunScored,
    Strikeout,
    Walk,
    Hit,
    HomeRun,
    OutRecorded,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::RunScored => "runScored",
            EventKind::Strikeout => "strikeout",
            EventKind::Walk => "walk",
            EventKind::Hit => "hit",
            EventKind::HomeRun => "homeRun",
            EventKind::OutRecorded => "outRecorded",
        };
        f.write_str(name)
    }
}

/// A single sequenced note handed to the sound engine.
#[derive(Clone, Debug, PartialEq)]
pub struct NoteTrigger {
    /// Voice that produced the note.
    pub voice: VoiceId,
    /// Step index within the voice's pattern.
    pub step: usize,
    /// Pitch picked from the active scale.
    pub pitch: Pitch,
    /// Note length (the voice's subdivision).
    pub duration: Subdivision,
    /// Transport position of the step.
    pub beat: BeatTime,
    /// Wall-clock instant of the step (may be slightly ahead of now).
    pub at: Instant,
    /// Voice level in dB at trigger time.
    pub volume_db: f32,
}

/// A one-shot phrase for a game event.
#[derive(Clone, Debug, PartialEq)]
pub struct OneShot {
    pub event: GameEvent,
    /// Pitches played in order.
    pub notes: Vec<Pitch>,
    /// Length of each note.
    pub note_length: Subdivision,
    /// Gap between note onsets.
    pub inter_note_delay: Duration,
    /// When the first note sounds.
    pub at: Instant,
}

impl OneShot {
    /// Onset instant of every note in the phrase.
    pub fn schedule(&self) -> impl Iterator<Item = (Instant, &Pitch)> + '_ {
        self.notes
            .iter()
            .enumerate()
            .map(move |(i, pitch)| (self.at + self.inter_note_delay * i as u32, pitch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(GameEvent::RunScored { team: TeamSide::Away }.kind(), EventKind::RunScored);
        assert_eq!(GameEvent::HomeRun.kind(), EventKind::HomeRun);
        assert_eq!(GameEvent::RunScored { team: TeamSide::Home }.to_string(), "runScored(home)");
        assert_eq!(GameEvent::OutRecorded.to_string(), "outRecorded");
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(GameEvent::RunScored { team: TeamSide::Home }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "runScored", "team": "home"}));
        let json = serde_json::to_value(GameEvent::Walk).unwrap();
        assert_eq!(json, serde_json::json!({"type": "walk"}));
    }

    #[test]
    fn test_one_shot_schedule() {
        let at = Instant::now();
        let shot = OneShot {
            event: GameEvent::Walk,
            notes: vec!["C4".parse().unwrap(), "E4".parse().unwrap(), "G4".parse().unwrap()],
            note_length: Subdivision::EIGHTH,
            inter_note_delay: Duration::from_millis(150),
            at,
        };
        let times: Vec<Duration> = shot.schedule().map(|(t, _)| t.duration_since(at)).collect();
        assert_eq!(
            times,
            vec![Duration::ZERO, Duration::from_millis(150), Duration::from_millis(300)]
        );
    }
}
