//! Timing and sequencing engine for the lightning step sequencer.
//!
//! [`Metro`] produces ticks, [`Pattern`] stores what to play at each
//! position, and [`Sequencer`] ties the two to an [`Engine`].

pub use crossbeam_channel;

pub mod engine;
pub mod metro;
pub mod note;
pub mod pattern;
pub mod sequencer;

pub use engine::{Engine, PlaybackError};
pub use metro::{Metro, MetroError, MetroFunc, Tempo, parse_divisor, tick_interval};
pub use note::Note;
pub use pattern::{EditAction, Pattern, PatternEdit, PatternError, Pos, Slot};
pub use sequencer::{EditError, Sequencer, SequencerConfig, SequencerError};
