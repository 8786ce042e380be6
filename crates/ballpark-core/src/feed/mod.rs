//! Snapshot sources.
//!
//! - [`SnapshotFeed`] - Anything that can be polled for the latest snapshot
//! - [`ReplayFeed`] - Replays a recorded game from a JSON file
//! - [`live`] - Conversion of live game feed documents

pub mod live;

use crate::snapshot::Snapshot;
use serde_json::Value;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub use live::snapshot_from_live_feed;

/// Errors a feed can report instead of a snapshot.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The feed could not be reached.
    #[error("Network error: {0}")]
    Network(String),

    /// The payload was malformed or incomplete.
    #[error("Data error: {0}")]
    Data(String),

    /// A finite feed has no more snapshots.
    #[error("Feed exhausted")]
    Exhausted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A source of game snapshots, polled on an interval.
pub trait SnapshotFeed {
    fn fetch_snapshot(&mut self, game_id: u64) -> Result<Snapshot, FeedError>;
}

/// Turn one recorded frame into a snapshot.
///
/// Frames are either snapshots in their own camelCase form or full live
/// feed documents (anything carrying `gameData` or `liveData`).
pub fn snapshot_from_frame(frame: &Value) -> Result<Snapshot, FeedError> {
    let Some(object) = frame.as_object() else {
        return Err(FeedError::Data(format!(
            "Expected a JSON object, found {}",
            type_name(frame)
        )));
    };
    if object.contains_key("gameData") || object.contains_key("liveData") {
        return snapshot_from_live_feed(frame);
    }
    serde_json::from_value(frame.clone()).map_err(|e| FeedError::Data(e.to_string()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Replays a recorded sequence of frames, one per fetch.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    frames: Vec<Value>,
    position: usize,
}

impl ReplayFeed {
    pub fn new(frames: Vec<Value>) -> Self {
        Self {
            frames,
            position: 0,
        }
    }

    /// Parse a JSON array of frames. A single object is treated as a
    /// one-frame recording.
    pub fn from_json_str(content: &str) -> Result<Self, FeedError> {
        match serde_json::from_str::<Value>(content)? {
            Value::Array(frames) => Ok(Self::new(frames)),
            frame @ Value::Object(_) => Ok(Self::new(vec![frame])),
            other => Err(FeedError::Data(format!(
                "Expected an array of frames, found {}",
                type_name(&other)
            ))),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, FeedError> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// Total number of frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames not yet fetched.
    pub fn remaining(&self) -> usize {
        self.frames.len() - self.position
    }

    /// Start over from the first frame.
    pub fn rewind(&mut self) {
        self.position = 0;
    }
}

impl SnapshotFeed for ReplayFeed {
    fn fetch_snapshot(&mut self, game_id: u64) -> Result<Snapshot, FeedError> {
        let frame = self.frames.get(self.position).ok_or(FeedError::Exhausted)?;
        self.position += 1;
        let snapshot = snapshot_from_frame(frame)?;
        if game_id != 0 && snapshot.game_id != 0 && snapshot.game_id != game_id {
            log::debug!(
                "Replay frame {} belongs to game {}, requested {}",
                self.position,
                snapshot.game_id,
                game_id
            );
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_replay_in_order_then_exhausted() {
        let mut feed = ReplayFeed::from_json_str(
            r#"[{"gameId": 1, "inning": 1}, {"gameId": 1, "inning": 2}]"#,
        )
        .unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed.fetch_snapshot(1).unwrap().inning, 1);
        assert_eq!(feed.fetch_snapshot(1).unwrap().inning, 2);
        assert_eq!(feed.remaining(), 0);
        assert!(matches!(feed.fetch_snapshot(1), Err(FeedError::Exhausted)));
        feed.rewind();
        assert_eq!(feed.fetch_snapshot(1).unwrap().inning, 1);
    }

    #[test]
    fn test_bad_frame_is_data_error_and_feed_continues() {
        let mut feed = ReplayFeed::from_json_str(
            r#"[42, {"liveData": {}}, {"runners": "all"}, {"balls": 3}]"#,
        )
        .unwrap();
        assert!(matches!(feed.fetch_snapshot(0), Err(FeedError::Data(_))));
        assert!(matches!(feed.fetch_snapshot(0), Err(FeedError::Data(_))));
        assert!(matches!(feed.fetch_snapshot(0), Err(FeedError::Data(_))));
        assert_eq!(feed.fetch_snapshot(0).unwrap().balls, 3);
    }

    #[test]
    fn test_malformed_counts_do_not_drop_the_frame() {
        let mut feed = ReplayFeed::from_json_str(
            r#"[{"balls": null, "strikes": 2}, {"balls": 300, "homeScore": "x"}]"#,
        )
        .unwrap();
        let first = feed.fetch_snapshot(0).unwrap();
        assert_eq!((first.balls, first.strikes), (0, 2));
        let second = feed.fetch_snapshot(0).unwrap();
        assert_eq!(second.sanitized().balls, crate::snapshot::MAX_BALLS);
        assert_eq!(second.home_score, 0);
    }

    #[test]
    fn test_single_object_and_invalid_json() {
        let feed = ReplayFeed::from_json_str(r#"{"gameId": 7}"#).unwrap();
        assert_eq!(feed.len(), 1);
        assert!(matches!(ReplayFeed::from_json_str("not json"), Err(FeedError::Json(_))));
        assert!(matches!(ReplayFeed::from_json_str("12"), Err(FeedError::Data(_))));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"gameId": 3, "outs": 2}}]"#).unwrap();
        let mut feed = ReplayFeed::from_path(file.path()).unwrap();
        assert_eq!(feed.fetch_snapshot(3).unwrap().outs, 2);

        let missing = ReplayFeed::from_path(Path::new("/definitely/not/here.json"));
        assert!(matches!(missing, Err(FeedError::Io(_))));
    }
}
