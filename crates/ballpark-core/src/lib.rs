//! Ballpark Core - turns the live state of a baseball game into music.
//!
//! This crate provides the building blocks of the engine:
//!
//! - **Euclid** - Euclidean rhythm patterns from small integers
//! - **Interpreter** - Game state to musical parameters and discrete events
//! - **Sequencer** - Per-voice step sequencing on one shared transport clock
//! - **Sound** - The capability interface of the synthesis backend
//! - **Controller** - Engine lifecycle and per-snapshot orchestration
//! - **Runtime** - A thread that owns the controller and ticks it
//! - **Feed** - Snapshot sources and live feed conversion
//! - **Config** - The sound design, loadable from TOML
//!
//! # Architecture
//!
//! Snapshots flow one way: feed -> [`GameStateInterpreter`] -> rhythm specs,
//! tonality, tempo and events -> [`EngineController`] -> [`SequenceEngine`]
//! for the continuous voices and the [`SoundEngine`] for one-shots. The
//! controller is single-threaded; [`Runtime`] moves it onto its own thread
//! and accepts [`RuntimeMessage`]s over a channel.

pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod euclid;
pub mod events;
pub mod feed;
pub mod interpreter;
pub mod pitch;
pub mod runtime;
pub mod sequencer;
pub mod snapshot;
pub mod sound;
pub mod timing;
pub mod voice;

pub use config::MusicConfig;
pub use controller::{EngineController, Lifecycle};
pub use error::{EngineError, Result};
pub use euclid::{generate, Pattern};
pub use events::{EventKind, GameEvent, NoteTrigger, OneShot, TeamSide};
pub use feed::{FeedError, ReplayFeed, SnapshotFeed};
pub use interpreter::{GameStateInterpreter, Interpretation, MusicParameters, RhythmSpec};
pub use pitch::Pitch;
pub use runtime::{Runtime, RuntimeHandle, RuntimeMessage, RuntimeStatus};
pub use sequencer::{SequenceEngine, VoiceChange};
pub use snapshot::Snapshot;
pub use sound::{EnginePlan, LogEngine, RecordingEngine, SoundEngine};
pub use timing::{BeatTime, Subdivision, TransportClock};
pub use voice::{VoiceId, VoiceTable};
