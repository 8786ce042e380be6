//! Point-in-time game state as delivered by the feed.
//!
//! Field names serialize in camelCase so snapshot files written by the feed
//! service can be replayed directly.

use crate::events::TeamSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Highest legal ball count (ball four).
pub const MAX_BALLS: u8 = 4;
/// Highest legal strike count.
pub const MAX_STRIKES: u8 = 3;
/// Highest legal out count.
pub const MAX_OUTS: u8 = 3;

/// Team identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamInfo {
    pub id: Option<u64>,
    pub name: String,
    pub abbreviation: String,
}

impl Default for TeamInfo {
    fn default() -> Self {
        Self {
            id: None,
            name: "Unknown".to_string(),
            abbreviation: "UNK".to_string(),
        }
    }
}

/// A batter or pitcher with whatever stat block the feed supplied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRef {
    pub id: u64,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub stats: serde_json::Map<String, serde_json::Value>,
}

impl PlayerRef {
    pub fn new(id: u64, full_name: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            stats: serde_json::Map::new(),
        }
    }
}

/// Occupancy of first, second and third base.
pub type Runners = [bool; 3];

/// One point-in-time summary of a game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Snapshot {
    pub game_id: u64,
    /// Abstract state, e.g. "Live", "Final", "Preview".
    pub status: String,
    /// Detailed state, e.g. "In Progress", "Warmup".
    pub detailed_state: String,
    pub home_team: TeamInfo,
    pub away_team: TeamInfo,
    pub venue: String,
    #[serde(deserialize_with = "lenient_u32")]
    pub inning: u32,
    pub is_top_inning: bool,
    /// Half-inning state: "Top", "Middle", "Bottom" or "End".
    pub inning_state: Option<String>,
    /// Explicit break flag set by feeds that know it.
    pub is_between_innings: bool,
    #[serde(deserialize_with = "lenient_u8")]
    pub balls: u8,
    #[serde(deserialize_with = "lenient_u8")]
    pub strikes: u8,
    #[serde(deserialize_with = "lenient_u8")]
    pub outs: u8,
    pub runners: Runners,
    #[serde(deserialize_with = "lenient_u32")]
    pub home_score: u32,
    #[serde(deserialize_with = "lenient_u32")]
    pub away_score: u32,
    pub current_batter: Option<PlayerRef>,
    pub current_pitcher: Option<PlayerRef>,
    pub last_update: Option<DateTime<Utc>>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            game_id: 0,
            status: "Unknown".to_string(),
            detailed_state: "Unknown".to_string(),
            home_team: TeamInfo::default(),
            away_team: TeamInfo::default(),
            venue: "Unknown".to_string(),
            inning: 1,
            is_top_inning: true,
            inning_state: None,
            is_between_innings: false,
            balls: 0,
            strikes: 0,
            outs: 0,
            runners: [false; 3],
            home_score: 0,
            away_score: 0,
            current_batter: None,
            current_pitcher: None,
            last_update: None,
        }
    }
}

impl Snapshot {
    /// Number of occupied bases.
    pub fn runners_on(&self) -> u32 {
        self.runners.iter().filter(|&&on| on).count() as u32
    }

    /// Combined score of both teams.
    pub fn total_runs(&self) -> u32 {
        self.home_score.saturating_add(self.away_score)
    }

    /// Identity of the batter at the plate, if known.
    pub fn batter_id(&self) -> Option<u64> {
        self.current_batter.as_ref().map(|b| b.id)
    }

    /// Whether play is paused between half-innings.
    pub fn is_between_innings(&self) -> bool {
        self.is_between_innings
            || self
                .inning_state
                .as_deref()
                .map(|state| state.starts_with("Middle") || state.starts_with("End"))
                .unwrap_or(false)
    }

    /// The team ahead, or `None` on a tie.
    pub fn leader(&self) -> Option<TeamSide> {
        match self.home_score.cmp(&self.away_score) {
            std::cmp::Ordering::Greater => Some(TeamSide::Home),
            std::cmp::Ordering::Less => Some(TeamSide::Away),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// Absolute run differential.
    pub fn run_differential(&self) -> u32 {
        self.home_score.abs_diff(self.away_score)
    }

    /// A copy with out-of-range fields pulled back to neutral legal values.
    ///
    /// Counts are clamped to their maxima and an inning of 0 (pre-game feeds)
    /// is treated as the first inning.
    pub fn sanitized(&self) -> Snapshot {
        let mut clean = self.clone();
        if clean.balls > MAX_BALLS || clean.strikes > MAX_STRIKES || clean.outs > MAX_OUTS {
            log::debug!(
                "Clamping out-of-range count {}-{} with {} outs",
                clean.balls,
                clean.strikes,
                clean.outs
            );
        }
        clean.balls = clean.balls.min(MAX_BALLS);
        clean.strikes = clean.strikes.min(MAX_STRIKES);
        clean.outs = clean.outs.min(MAX_OUTS);
        clean.inning = clean.inning.max(1);
        clean
    }
}

/// Read a numeric field, mapping anything unusable to 0 and clamping the
/// rest to `max`.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D, max: u64) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let number = match &value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => s.trim().parse().unwrap_or(0),
        other => {
            log::debug!("Treating {} as 0", other);
            0
        }
    };
    Ok(number.min(max))
}

fn lenient_u8<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    lenient_number(deserializer, u8::MAX as u64).map(|n| n as u8)
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    lenient_number(deserializer, u32::MAX as u64).map(|n| n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_between_innings_detection() {
        let mut snap = Snapshot::default();
        assert!(!snap.is_between_innings());
        snap.inning_state = Some("Middle 7".to_string());
        assert!(snap.is_between_innings());
        snap.inning_state = Some("End".to_string());
        assert!(snap.is_between_innings());
        snap.inning_state = Some("Bottom".to_string());
        assert!(!snap.is_between_innings());
        snap.is_between_innings = true;
        assert!(snap.is_between_innings());
    }

    #[test]
    fn test_derived_values() {
        let snap = Snapshot {
            runners: [true, false, true],
            home_score: 2,
            away_score: 5,
            current_batter: Some(PlayerRef::new(7, "A. Batter")),
            ..Snapshot::default()
        };
        assert_eq!(snap.runners_on(), 2);
        assert_eq!(snap.total_runs(), 7);
        assert_eq!(snap.batter_id(), Some(7));
        assert_eq!(snap.leader(), Some(TeamSide::Away));
        assert_eq!(snap.run_differential(), 3);
    }

    #[test]
    fn test_sanitized_clamps_counts() {
        let snap = Snapshot {
            balls: 9,
            strikes: 5,
            outs: 4,
            inning: 0,
            ..Snapshot::default()
        }
        .sanitized();
        assert_eq!((snap.balls, snap.strikes, snap.outs, snap.inning), (4, 3, 3, 1));
    }

    #[test]
    fn test_camel_case_json() {
        let snap: Snapshot = serde_json::from_value(serde_json::json!({
            "gameId": 745_001,
            "inning": 3,
            "isTopInning": false,
            "balls": 2,
            "homeScore": 1,
            "runners": [false, true, false],
            "currentBatter": {"id": 42, "fullName": "Some Hitter"},
            "lastUpdate": "2024-06-01T19:05:00Z"
        }))
        .unwrap();
        assert_eq!(snap.game_id, 745_001);
        assert_eq!(snap.inning, 3);
        assert!(!snap.is_top_inning);
        assert_eq!(snap.runners_on(), 1);
        assert_eq!(snap.batter_id(), Some(42));
        assert_eq!(snap.away_team.abbreviation, "UNK");
        assert!(snap.last_update.is_some());
    }

    #[test]
    fn test_malformed_counts_fall_back() {
        let snap: Snapshot = serde_json::from_value(serde_json::json!({
            "balls": null,
            "strikes": "2",
            "outs": -1,
            "inning": 4.0,
            "homeScore": 300,
            "awayScore": {"runs": 3}
        }))
        .unwrap();
        assert_eq!((snap.balls, snap.strikes, snap.outs), (0, 2, 0));
        assert_eq!(snap.inning, 4);
        assert_eq!((snap.home_score, snap.away_score), (300, 0));

        let snap: Snapshot = serde_json::from_value(serde_json::json!({"balls": 300})).unwrap();
        assert_eq!(snap.balls, u8::MAX);
        assert_eq!(snap.sanitized().balls, MAX_BALLS);
    }

    #[test]
    fn test_total_runs_saturates() {
        let snap = Snapshot {
            home_score: u32::MAX,
            away_score: 1,
            ..Snapshot::default()
        };
        assert_eq!(snap.total_runs(), u32::MAX);
    }
}
