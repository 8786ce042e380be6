//! Game state to musical parameters.
//!
//! [`GameStateInterpreter`] maps each snapshot to per-voice rhythm specs, a
//! tonality and a tempo, and detects discrete events by diffing it against
//! the previous snapshot. The previous snapshot is the only state it keeps.

use crate::config::{MusicConfig, ScaleKind};
use crate::events::{GameEvent, TeamSide};
use crate::pitch::Pitch;
use crate::snapshot::Snapshot;
use crate::timing::Subdivision;
use crate::voice::{VoiceId, VoiceTable};
use serde::Serialize;

/// Run differential at which tonal complexity saturates.
const COMPLEXITY_SPAN: f64 = 5.0;

/// Rhythm of one voice for the current game state.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RhythmSpec {
    pub steps: u32,
    pub pulses: u32,
    pub rotation: i32,
    pub subdivision: Subdivision,
    pub volume_db: f32,
}

impl RhythmSpec {
    /// Whether two specs produce the same pattern at the same step length.
    /// Volume is not part of the shape.
    pub fn same_shape(&self, other: &RhythmSpec) -> bool {
        self.steps == other.steps
            && self.pulses == other.pulses
            && self.rotation == other.rotation
            && self.subdivision == other.subdivision
    }
}

/// Active scale and tonal color.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tonality {
    pub scale: Vec<Pitch>,
    pub scale_kind: ScaleKind,
    pub root_note: Pitch,
    /// 0 for a tie, 1 from a five-run lead on.
    pub complexity: f64,
}

/// Global tempo.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Tempo {
    pub bpm: f64,
}

/// Everything the engine needs to sound the current game state.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MusicParameters {
    pub rhythm: VoiceTable<RhythmSpec>,
    pub tonality: Tonality,
    pub tempo: Tempo,
}

/// Result of interpreting one snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Interpretation {
    #[serde(flatten)]
    pub params: MusicParameters,
    pub events: Vec<GameEvent>,
}

/// Translates snapshots into musical parameters and events.
pub struct GameStateInterpreter {
    config: MusicConfig,
    previous: Option<Snapshot>,
}

impl GameStateInterpreter {
    pub fn new(config: MusicConfig) -> Self {
        Self {
            config,
            previous: None,
        }
    }

    /// Interpret a snapshot. `None` yields `None` and leaves the previous
    /// snapshot untouched.
    pub fn interpret(&mut self, snapshot: Option<&Snapshot>) -> Option<Interpretation> {
        let current = snapshot?.sanitized();

        let params = self.parameters(&current);
        let events = match &self.previous {
            Some(previous) => detect_events(previous, &current),
            None => Vec::new(),
        };
        if !events.is_empty() {
            log::debug!(
                "[EVENT] {}",
                events.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", ")
            );
        }

        self.previous = Some(current);
        Some(Interpretation { params, events })
    }

    /// Musical parameters for a snapshot without touching event state.
    pub fn parameters(&self, snapshot: &Snapshot) -> MusicParameters {
        MusicParameters {
            rhythm: self.rhythm(snapshot),
            tonality: self.tonality(snapshot),
            tempo: self.tempo(snapshot),
        }
    }

    /// Forget the previous snapshot, so the next one raises no events.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// The last snapshot seen.
    pub fn previous(&self) -> Option<&Snapshot> {
        self.previous.as_ref()
    }

    pub fn config(&self) -> &MusicConfig {
        &self.config
    }

    fn is_late(&self, snapshot: &Snapshot) -> bool {
        snapshot.inning >= self.config.rhythms.late_inning
    }

    fn rhythm(&self, snapshot: &Snapshot) -> VoiceTable<RhythmSpec> {
        let late = self.is_late(snapshot);
        let resting = snapshot.is_between_innings();

        VoiceTable::from_fn(|voice| {
            let base = self.config.rhythms.get(voice);
            let steps = base.steps_for(late);
            let pulses = if resting && voice.rests_between_innings() {
                0
            } else {
                match voice {
                    VoiceId::Balls => snapshot.balls as u32,
                    VoiceId::Strikes => snapshot.strikes as u32,
                    VoiceId::Outs => snapshot.outs as u32,
                    VoiceId::Runners => snapshot.runners_on(),
                    VoiceId::Inning => snapshot.inning,
                }
            };
            RhythmSpec {
                steps,
                pulses: pulses.min(steps),
                rotation: base.rotation,
                subdivision: base.subdivision,
                volume_db: base.volume_db,
            }
        })
    }

    fn tonality(&self, snapshot: &Snapshot) -> Tonality {
        let scale_kind = match snapshot.leader() {
            Some(TeamSide::Home) => ScaleKind::HomeTeamLeading,
            Some(TeamSide::Away) => ScaleKind::AwayTeamLeading,
            None if self.is_late(snapshot) => ScaleKind::LateInnings,
            None => ScaleKind::Tied,
        };
        let complexity = (snapshot.run_differential() as f64 / COMPLEXITY_SPAN).min(1.0);

        Tonality {
            scale: self.config.scales.get(scale_kind).to_vec(),
            scale_kind,
            root_note: self.config.scales.root_note.clone(),
            complexity,
        }
    }

    fn tempo(&self, snapshot: &Snapshot) -> Tempo {
        let tempo = &self.config.tempo;
        let bpm = tempo.base
            + snapshot.inning as f64 * tempo.per_inning
            + snapshot.total_runs() as f64 * tempo.per_run;
        Tempo {
            bpm: bpm.min(tempo.max_bpm),
        }
    }
}

/// Events implied by the change from `previous` to `current`, in output order.
fn detect_events(previous: &Snapshot, current: &Snapshot) -> Vec<GameEvent> {
    let mut events = Vec::new();

    if current.home_score > previous.home_score {
        events.push(GameEvent::RunScored {
            team: TeamSide::Home,
        });
    }
    if current.away_score > previous.away_score {
        events.push(GameEvent::RunScored {
            team: TeamSide::Away,
        });
    }

    let outs_up = current.outs > previous.outs;
    let outs_same = current.outs == previous.outs;
    let mut strikeout = false;

    if current.batter_id() != previous.batter_id() {
        strikeout = current.strikes == 0 && previous.strikes == 2 && outs_up;
        let walk = current.balls == 0 && previous.balls == 3 && outs_same;

        if strikeout {
            events.push(GameEvent::Strikeout);
        }
        if walk {
            events.push(GameEvent::Walk);
        }
        // Batted-ball data is not available; runner and score deltas are a
        // best guess and can misread a bases-clearing extra-base hit.
        if !walk && current.balls == 0 && current.strikes == 0 && outs_same {
            let runners_delta = current.runners_on() as i64 - previous.runners_on() as i64;
            let score_delta = current.total_runs() as i64 - previous.total_runs() as i64;
            if score_delta > 0 && runners_delta < 0 {
                events.push(GameEvent::HomeRun);
            } else {
                events.push(GameEvent::Hit);
            }
        }
    }

    if outs_up && !strikeout {
        events.push(GameEvent::OutRecorded);
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::PlayerRef;

    fn snapshot(batter: u64) -> Snapshot {
        Snapshot {
            current_batter: Some(PlayerRef::new(batter, format!("Batter {batter}"))),
            ..Snapshot::default()
        }
    }

    fn interpreter() -> GameStateInterpreter {
        GameStateInterpreter::new(MusicConfig::default())
    }

    #[test]
    fn test_none_snapshot() {
        let mut interp = interpreter();
        assert!(interp.interpret(None).is_none());
        assert!(interp.previous().is_none());
    }

    #[test]
    fn test_first_snapshot_has_no_events() {
        let mut interp = interpreter();
        let snap = Snapshot {
            home_score: 3,
            outs: 2,
            ..snapshot(1)
        };
        let result = interp.interpret(Some(&snap)).unwrap();
        assert!(result.events.is_empty());
        assert_eq!(interp.previous(), Some(&snap));
    }

    #[test]
    fn test_walk_is_not_a_hit() {
        let mut interp = interpreter();
        let prev = Snapshot {
            balls: 3,
            home_score: 2,
            away_score: 1,
            ..snapshot(1)
        };
        let curr = Snapshot {
            balls: 0,
            home_score: 2,
            away_score: 1,
            ..snapshot(2)
        };
        interp.interpret(Some(&prev));
        let result = interp.interpret(Some(&curr)).unwrap();
        assert_eq!(result.events, vec![GameEvent::Walk]);
    }

    #[test]
    fn test_home_run_detection() {
        let mut interp = interpreter();
        let prev = Snapshot {
            runners: [true, true, false],
            home_score: 1,
            away_score: 2,
            balls: 1,
            strikes: 1,
            ..snapshot(1)
        };
        let curr = Snapshot {
            runners: [false, false, false],
            home_score: 4,
            away_score: 2,
            ..snapshot(2)
        };
        interp.interpret(Some(&prev));
        let result = interp.interpret(Some(&curr)).unwrap();
        assert_eq!(
            result.events,
            vec![
                GameEvent::RunScored {
                    team: TeamSide::Home
                },
                GameEvent::HomeRun
            ]
        );
    }

    #[test]
    fn test_single_is_a_hit() {
        let mut interp = interpreter();
        interp.interpret(Some(&Snapshot {
            strikes: 1,
            ..snapshot(1)
        }));
        let result = interp
            .interpret(Some(&Snapshot {
                runners: [true, false, false],
                ..snapshot(2)
            }))
            .unwrap();
        assert_eq!(result.events, vec![GameEvent::Hit]);
    }

    #[test]
    fn test_strikeout_suppresses_out_recorded() {
        let mut interp = interpreter();
        interp.interpret(Some(&Snapshot {
            strikes: 2,
            outs: 1,
            ..snapshot(1)
        }));
        let result = interp
            .interpret(Some(&Snapshot {
                outs: 2,
                ..snapshot(2)
            }))
            .unwrap();
        assert_eq!(result.events, vec![GameEvent::Strikeout]);
    }

    #[test]
    fn test_ground_out_is_out_recorded() {
        let mut interp = interpreter();
        interp.interpret(Some(&Snapshot {
            strikes: 1,
            balls: 2,
            ..snapshot(1)
        }));
        let result = interp
            .interpret(Some(&Snapshot {
                outs: 1,
                ..snapshot(2)
            }))
            .unwrap();
        assert_eq!(result.events, vec![GameEvent::OutRecorded]);
    }

    #[test]
    fn test_same_batter_only_scores_and_outs() {
        let mut interp = interpreter();
        interp.interpret(Some(&Snapshot {
            balls: 3,
            ..snapshot(1)
        }));
        let result = interp
            .interpret(Some(&Snapshot {
                away_score: 1,
                outs: 1,
                ..snapshot(1)
            }))
            .unwrap();
        assert_eq!(
            result.events,
            vec![
                GameEvent::RunScored {
                    team: TeamSide::Away
                },
                GameEvent::OutRecorded
            ]
        );
    }

    #[test]
    fn test_between_innings_silences_count_voices() {
        let mut interp = interpreter();
        let snap = Snapshot {
            inning: 7,
            inning_state: Some("Middle 7".to_string()),
            balls: 2,
            strikes: 1,
            outs: 3,
            runners: [true, true, true],
            ..Snapshot::default()
        };
        let rhythm = interp.interpret(Some(&snap)).unwrap().params.rhythm;
        for voice in [VoiceId::Balls, VoiceId::Strikes, VoiceId::Outs, VoiceId::Runners] {
            assert_eq!(rhythm[voice].pulses, 0, "{voice} should rest");
        }
        assert_eq!(rhythm[VoiceId::Inning].steps, 12);
        assert_eq!(rhythm[VoiceId::Inning].pulses, 7);
    }

    #[test]
    fn test_rhythm_mapping() {
        let interp = interpreter();
        let snap = Snapshot {
            inning: 3,
            balls: 2,
            strikes: 1,
            outs: 1,
            runners: [true, false, true],
            ..Snapshot::default()
        };
        let rhythm = interp.parameters(&snap).rhythm;
        assert_eq!((rhythm[VoiceId::Balls].steps, rhythm[VoiceId::Balls].pulses), (4, 2));
        assert_eq!(rhythm[VoiceId::Strikes].rotation, 1);
        assert_eq!(rhythm[VoiceId::Strikes].pulses, 1);
        assert_eq!(rhythm[VoiceId::Runners].pulses, 2);
        assert_eq!((rhythm[VoiceId::Inning].steps, rhythm[VoiceId::Inning].pulses), (8, 3));

        // Extra innings cap at the step count.
        let extra = interp.parameters(&Snapshot {
            inning: 14,
            ..Snapshot::default()
        });
        assert_eq!(extra.rhythm[VoiceId::Inning].pulses, 12);
    }

    #[test]
    fn test_tempo_is_clamped() {
        let interp = interpreter();
        let early = interp.parameters(&Snapshot {
            inning: 2,
            ..Snapshot::default()
        });
        assert!((early.tempo.bpm - 100.0).abs() < f64::EPSILON);

        let extra = interp.parameters(&Snapshot {
            inning: 20,
            home_score: 30,
            ..Snapshot::default()
        });
        assert!((extra.tempo.bpm - 140.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_huge_scores_do_not_overflow() {
        let mut interp = interpreter();
        let first = Snapshot {
            home_score: u32::MAX - 1,
            ..snapshot(1)
        };
        let second = Snapshot {
            home_score: u32::MAX,
            away_score: 1,
            ..snapshot(2)
        };
        let params = interp.parameters(&second);
        assert!((params.tempo.bpm - 95.0).abs() < f64::EPSILON);
        assert!((params.tonality.complexity - 1.0).abs() < f64::EPSILON);

        interp.interpret(Some(&first));
        let result = interp.interpret(Some(&second)).unwrap();
        assert!(result.events.contains(&GameEvent::RunScored {
            team: TeamSide::Away
        }));
    }

    #[test]
    fn test_tonality_selection() {
        let interp = interpreter();
        let home = interp.parameters(&Snapshot {
            home_score: 6,
            away_score: 1,
            ..Snapshot::default()
        });
        assert_eq!(home.tonality.scale_kind, ScaleKind::HomeTeamLeading);
        assert!((home.tonality.complexity - 1.0).abs() < f64::EPSILON);
        assert_eq!(home.tonality.root_note.name(), "C3");

        let away = interp.parameters(&Snapshot {
            away_score: 2,
            inning: 8,
            ..Snapshot::default()
        });
        assert_eq!(away.tonality.scale_kind, ScaleKind::AwayTeamLeading);
        assert!((away.tonality.complexity - 0.4).abs() < 1e-9);

        let tied_early = interp.parameters(&Snapshot::default());
        assert_eq!(tied_early.tonality.scale_kind, ScaleKind::Tied);
        assert_eq!(tied_early.tonality.complexity, 0.0);

        let tied_late = interp.parameters(&Snapshot {
            inning: 9,
            home_score: 3,
            away_score: 3,
            ..Snapshot::default()
        });
        assert_eq!(tied_late.tonality.scale_kind, ScaleKind::LateInnings);
        assert_eq!(tied_late.tonality.scale[2].name(), "Eb3");
    }

    #[test]
    fn test_out_of_range_counts_are_sanitized() {
        let mut interp = interpreter();
        let result = interp
            .interpret(Some(&Snapshot {
                balls: 7,
                inning: 0,
                ..Snapshot::default()
            }))
            .unwrap();
        assert_eq!(result.params.rhythm[VoiceId::Balls].pulses, 4);
        assert_eq!(result.params.rhythm[VoiceId::Inning].pulses, 1);
    }

    #[test]
    fn test_reset_forgets_previous() {
        let mut interp = interpreter();
        interp.interpret(Some(&snapshot(1)));
        interp.reset();
        let result = interp
            .interpret(Some(&Snapshot {
                home_score: 1,
                ..snapshot(2)
            }))
            .unwrap();
        assert!(result.events.is_empty());
    }
}
