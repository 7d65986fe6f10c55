use crate::note::Note;

/// Failure reported by an [`Engine`] while triggering a note.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not play {sample} ({number}): {reason}")]
pub struct PlaybackError {
    pub sample: String,
    pub number: i32,
    pub reason: String,
}

impl PlaybackError {
    pub fn new(note: &Note, reason: impl Into<String>) -> Self {
        Self {
            sample: note.sample.clone(),
            number: note.number,
            reason: reason.into(),
        }
    }
}

/// Playback capability the sequencer drives.
///
/// The tick thread calls `play_note` for every note at the current position;
/// one-shot sample playback from controllers calls it as well, so
/// implementations must tolerate concurrent calls.
pub trait Engine: Send + Sync {
    fn play_note(&self, note: &Note) -> Result<(), PlaybackError>;
}
