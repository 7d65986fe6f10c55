use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;

use crate::engine::{Engine, PlaybackError};
use crate::metro::{Metro, MetroError, MetroFunc, Tempo, tick_interval};
use crate::note::Note;
use crate::pattern::{Pattern, PatternEdit, PatternError, Pos};

/// Construction parameters for a [`Sequencer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerConfig {
    /// Number of pattern positions
    pub length: usize,
    pub tempo: Tempo,
    /// Bar subdivision, "1/D"
    pub bardiv: String,
    /// Depth of the position channel. Positions that do not fit are dropped.
    pub position_buffer: usize,
    /// Depth of the error channel. A playback error that does not fit
    /// terminates the process.
    pub error_buffer: usize,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            length: 4096,
            tempo: 120.0,
            bardiv: "1/4".to_string(),
            position_buffer: 64,
            error_buffer: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SequencerError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Metro(#[from] MetroError),
}

/// Failure of one entry in an edit batch. Entries before `index` stay applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("edit {index} failed: {source}")]
pub struct EditError {
    pub index: usize,
    pub source: PatternError,
}

/// Plays a [`Pattern`] on the ticks of a [`Metro`].
///
/// Every tick is wrapped to the pattern length, published on the position
/// channel and used to look up the notes to hand to the [`Engine`]. Edits may
/// arrive from any thread while playing; each one holds the pattern lock for
/// its duration, as does the tick thread while it copies a slot.
pub struct Sequencer {
    metro: Mutex<Metro>,
    pattern: Arc<Mutex<Pattern>>,
    positions: Receiver<Pos>,
    errors: Receiver<PlaybackError>,
}

impl Sequencer {
    pub fn new(engine: Arc<dyn Engine>, config: SequencerConfig) -> Result<Self, SequencerError> {
        let pattern = Pattern::new(config.length)?;
        Self::with_pattern(engine, pattern, config)
    }

    /// Build around an existing pattern, e.g. a startup snapshot.
    /// `config.length` is ignored in favour of the pattern's own length.
    pub fn with_pattern(
        engine: Arc<dyn Engine>,
        pattern: Pattern,
        config: SequencerConfig,
    ) -> Result<Self, SequencerError> {
        tick_interval(config.tempo, &config.bardiv)?;

        let length = pattern.length() as Pos;
        let pattern = Arc::new(Mutex::new(pattern));
        let (position_tx, positions) = bounded(config.position_buffer);
        let (error_tx, errors) = bounded(config.error_buffer);
        let func = tick_func(engine, pattern.clone(), length, position_tx, error_tx);

        Ok(Self {
            metro: Mutex::new(Metro::new(config.tempo, config.bardiv, Some(func))),
            pattern,
            positions,
            errors,
        })
    }

    /// Wrapped positions, one per tick while playing.
    pub fn positions(&self) -> Receiver<Pos> {
        self.positions.clone()
    }

    /// Playback errors raised on the tick thread. This channel must be
    /// drained: an error that finds it full terminates the process.
    pub fn errors(&self) -> Receiver<PlaybackError> {
        self.errors.clone()
    }

    pub fn start(&self) -> Result<(), MetroError> {
        self.metro.lock().start()
    }

    /// Stop playback. Blocks until the tick thread has exited, then discards
    /// positions that were published but not yet read.
    pub fn stop(&self) {
        self.metro.lock().stop();
        while self.positions.try_recv().is_ok() {}
    }

    pub fn is_playing(&self) -> bool {
        self.metro.lock().is_playing()
    }

    /// Validate and store a new tempo. If playing, the new interval is used
    /// from the next start.
    pub fn set_tempo(&self, tempo: Tempo, bardiv: &str) -> Result<(), MetroError> {
        tick_interval(tempo, bardiv)?;
        self.metro.lock().set_tempo(tempo, bardiv);
        Ok(())
    }

    pub fn tempo(&self) -> Tempo {
        self.metro.lock().tempo()
    }

    pub fn bardiv(&self) -> String {
        self.metro.lock().bardiv().to_string()
    }

    pub fn length(&self) -> usize {
        self.pattern.lock().length()
    }

    pub fn notes_at(&self, pos: Pos) -> Vec<Option<Note>> {
        self.pattern.lock().notes_at(pos).to_vec()
    }

    /// Copy of the whole pattern.
    pub fn pattern(&self) -> Pattern {
        self.pattern.lock().clone()
    }

    pub fn add_to(&self, pos: Pos, note: Note) -> Result<(), PatternError> {
        self.pattern.lock().add_to(pos, note)
    }

    pub fn remove_from(&self, pos: Pos, note: &Note) -> Result<(), PatternError> {
        self.pattern.lock().remove_from(pos, note)
    }

    pub fn clear(&self, pos: Pos) -> Result<(), PatternError> {
        self.pattern.lock().clear(pos)
    }

    /// Apply edits in order, stopping at the first failure. Each edit is
    /// atomic on its own; the batch as a whole is not.
    pub fn apply(&self, edits: &[PatternEdit]) -> Result<(), EditError> {
        for (index, edit) in edits.iter().enumerate() {
            self.pattern
                .lock()
                .apply(edit)
                .map_err(|source| EditError { index, source })?;
        }
        Ok(())
    }
}

fn tick_func(
    engine: Arc<dyn Engine>,
    pattern: Arc<Mutex<Pattern>>,
    length: Pos,
    position_tx: Sender<Pos>,
    error_tx: Sender<PlaybackError>,
) -> MetroFunc {
    Arc::new(move |tick| {
        let wrapped = tick % length;
        if position_tx.try_send(wrapped).is_err() {
            tracing::trace!(position = wrapped, "position channel full, dropping");
        }

        let notes: Vec<Note> = pattern
            .lock()
            .notes_at(wrapped)
            .iter()
            .flatten()
            .cloned()
            .collect();

        let mut first_error = None;
        for note in &notes {
            if let Err(err) = engine.play_note(note) {
                tracing::warn!(position = wrapped, error = %err, "playback failed");
                first_error.get_or_insert(err);
            }
        }
        if let Some(err) = first_error {
            deliver_or_exit(&error_tx, err);
        }
    })
}

/// Hand a playback error to whoever drains the error channel. An error that
/// cannot be delivered would leave the audible output out of step with what
/// controllers believe is playing, so the process exits instead.
fn deliver_or_exit(error_tx: &Sender<PlaybackError>, err: PlaybackError) {
    match error_tx.try_send(err) {
        Ok(()) => {}
        Err(TrySendError::Full(err) | TrySendError::Disconnected(err)) => {
            tracing::error!(error = %err, "playback error was not consumed, exiting");
            std::process::exit(1);
        }
    }
}
