//! Live game feed documents.
//!
//! A live feed document has two halves: `gameData` (teams, venue, status,
//! player registry keyed as `"ID<id>"`) and `liveData` (linescore and the
//! current play). Only the fields needed for a [`Snapshot`] are read; every
//! other field is ignored and every missing leaf falls back to a neutral
//! default.

use super::FeedError;
use crate::snapshot::{PlayerRef, Snapshot, TeamInfo};
use chrono::Utc;
use serde_json::{Map, Value};

/// Convert a live feed document into a snapshot.
///
/// Fails with [`FeedError::Data`] when `gameData` or `liveData` is missing.
pub fn snapshot_from_live_feed(doc: &Value) -> Result<Snapshot, FeedError> {
    let data = doc
        .get("gameData")
        .filter(|v| v.is_object())
        .ok_or_else(|| FeedError::Data("Live feed is missing gameData".to_string()))?;
    let live = doc
        .get("liveData")
        .filter(|v| v.is_object())
        .ok_or_else(|| FeedError::Data("Live feed is missing liveData".to_string()))?;

    let linescore = &live["linescore"];
    let current_play = &live["plays"]["currentPlay"];
    let matchup = &current_play["matchup"];

    let snapshot = Snapshot {
        game_id: data["game"]["pk"].as_u64().unwrap_or(0),
        status: text_or(&data["status"]["abstractGameState"], "Unknown"),
        detailed_state: text_or(&data["status"]["detailedState"], "Unknown"),
        home_team: team(&data["teams"]["home"]),
        away_team: team(&data["teams"]["away"]),
        venue: text_or(&data["venue"]["name"], "Unknown"),
        inning: count(&linescore["currentInning"]) as u32,
        is_top_inning: linescore["isTopInning"].as_bool().unwrap_or(true),
        inning_state: linescore["inningState"].as_str().map(str::to_string),
        is_between_innings: false,
        balls: count(&linescore["balls"]).min(u8::MAX as u64) as u8,
        strikes: count(&linescore["strikes"]).min(u8::MAX as u64) as u8,
        outs: count(&linescore["outs"]).min(u8::MAX as u64) as u8,
        runners: bases(&current_play["runners"]),
        home_score: count(&linescore["teams"]["home"]["runs"]) as u32,
        away_score: count(&linescore["teams"]["away"]["runs"]) as u32,
        current_batter: player(data, &matchup["batter"], "batting"),
        current_pitcher: player(data, &matchup["pitcher"], "pitching"),
        last_update: Some(Utc::now()),
    };
    Ok(snapshot)
}

fn text_or(value: &Value, default: &str) -> String {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn count(value: &Value) -> u64 {
    value.as_u64().unwrap_or(0).min(u32::MAX as u64)
}

fn team(value: &Value) -> TeamInfo {
    TeamInfo {
        id: value["id"].as_u64(),
        name: text_or(&value["name"], "Unknown"),
        abbreviation: text_or(&value["abbreviation"], "UNK"),
    }
}

/// Occupied bases, from where each runner of the current play ended up.
fn bases(runners: &Value) -> [bool; 3] {
    let mut bases = [false; 3];
    for runner in runners.as_array().into_iter().flatten() {
        match runner["movement"]["end"].as_str() {
            Some("1B") => bases[0] = true,
            Some("2B") => bases[1] = true,
            Some("3B") => bases[2] = true,
            _ => {}
        }
    }
    bases
}

/// Look a matchup participant up in the player registry. Players missing
/// from the registry are reported as unknown (`None`).
fn player(data: &Value, participant: &Value, stat_group: &str) -> Option<PlayerRef> {
    let id = participant["id"].as_u64().filter(|id| *id != 0)?;
    let entry = data["players"].get(format!("ID{id}"))?;

    let mut stats = Map::new();
    let group = entry["stats"][stat_group].clone();
    stats.insert(
        stat_group.to_string(),
        if group.is_object() {
            group
        } else {
            Value::Object(Map::new())
        },
    );

    Some(PlayerRef {
        id,
        full_name: text_or(&entry["fullName"], "Unknown"),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn live_doc() -> Value {
        json!({
            "gameData": {
                "game": {"pk": 745_321},
                "status": {"abstractGameState": "Live", "detailedState": "In Progress"},
                "teams": {
                    "home": {"id": 147, "name": "New York Yankees", "abbreviation": "NYY"},
                    "away": {"id": 111, "name": "Boston Red Sox"}
                },
                "venue": {"name": "Yankee Stadium"},
                "players": {
                    "ID592450": {"fullName": "Aaron Judge", "stats": {"batting": {"homeRuns": 40}}},
                    "ID605483": {"fullName": "Brayan Bello"}
                }
            },
            "liveData": {
                "linescore": {
                    "currentInning": 6,
                    "isTopInning": false,
                    "inningState": "Bottom",
                    "balls": 2,
                    "strikes": 1,
                    "outs": 1,
                    "teams": {"home": {"runs": 4}, "away": {"runs": 2}}
                },
                "plays": {
                    "currentPlay": {
                        "matchup": {"batter": {"id": 592450}, "pitcher": {"id": 605483}},
                        "runners": [
                            {"movement": {"start": null, "end": "1B"}},
                            {"movement": {"start": "1B", "end": "3B"}},
                            {"movement": {"start": "3B", "end": "score"}}
                        ]
                    }
                }
            }
        })
    }

    #[test]
    fn test_full_document() {
        let snap = snapshot_from_live_feed(&live_doc()).unwrap();
        assert_eq!(snap.game_id, 745_321);
        assert_eq!(snap.status, "Live");
        assert_eq!(snap.home_team.abbreviation, "NYY");
        assert_eq!(snap.away_team.abbreviation, "UNK");
        assert_eq!(snap.venue, "Yankee Stadium");
        assert_eq!((snap.inning, snap.is_top_inning), (6, false));
        assert_eq!((snap.balls, snap.strikes, snap.outs), (2, 1, 1));
        assert_eq!(snap.runners, [true, false, true]);
        assert_eq!((snap.home_score, snap.away_score), (4, 2));
        assert_eq!(snap.inning_state.as_deref(), Some("Bottom"));

        let batter = snap.current_batter.unwrap();
        assert_eq!(batter.full_name, "Aaron Judge");
        assert_eq!(batter.stats["batting"]["homeRuns"], 40);
        let pitcher = snap.current_pitcher.unwrap();
        assert_eq!(pitcher.id, 605_483);
        assert_eq!(pitcher.stats["pitching"], json!({}));
    }

    #[test]
    fn test_sparse_document_uses_defaults() {
        let snap = snapshot_from_live_feed(&json!({"gameData": {}, "liveData": {}})).unwrap();
        assert_eq!(snap.status, "Unknown");
        assert_eq!(snap.venue, "Unknown");
        assert_eq!(snap.home_team.name, "Unknown");
        assert_eq!((snap.balls, snap.strikes, snap.outs), (0, 0, 0));
        assert_eq!(snap.inning, 0);
        assert!(snap.is_top_inning);
        assert_eq!(snap.runners, [false; 3]);
        assert!(snap.current_batter.is_none());
    }

    #[test]
    fn test_unregistered_player_is_unknown() {
        let mut doc = live_doc();
        doc["gameData"]["players"] = json!({});
        let snap = snapshot_from_live_feed(&doc).unwrap();
        assert!(snap.current_batter.is_none());
        assert!(snap.current_pitcher.is_none());
    }

    #[test]
    fn test_missing_halves_are_data_errors() {
        assert!(matches!(
            snapshot_from_live_feed(&json!({"liveData": {}})),
            Err(FeedError::Data(_))
        ));
        assert!(matches!(
            snapshot_from_live_feed(&json!({"gameData": {}})),
            Err(FeedError::Data(_))
        ));
        assert!(matches!(
            snapshot_from_live_feed(&json!({"gameData": [], "liveData": {}})),
            Err(FeedError::Data(_))
        ));
    }
}
