use std::path::{Path, PathBuf};
use std::sync::Arc;

use lightning_core::{Engine, Note, PlaybackError};
use tracing::debug;

use crate::samples::SamplePool;

/// Engine that validates each trigger against the sample library and reports
/// it through `tracing`.
///
/// A note's `sample` may be a pool name, an absolute path, or a path relative
/// to the audio root.
pub struct TraceEngine {
    audio_root: PathBuf,
    samples: Arc<SamplePool>,
}

impl TraceEngine {
    pub fn new(audio_root: impl Into<PathBuf>, samples: Arc<SamplePool>) -> Self {
        Self {
            audio_root: audio_root.into(),
            samples,
        }
    }

    fn locate(&self, sample: &str) -> PathBuf {
        if let Ok(path) = self.samples.resolve(sample) {
            return path.to_path_buf();
        }
        let path = Path::new(sample);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.audio_root.join(path)
        }
    }
}

impl Engine for TraceEngine {
    fn play_note(&self, note: &Note) -> Result<(), PlaybackError> {
        let path = self.locate(&note.sample);
        if !path.is_file() {
            return Err(PlaybackError::new(
                note,
                format!("{} is not a sample file", path.display()),
            ));
        }
        debug!(
            sample = %path.display(),
            number = note.number,
            velocity = note.velocity,
            "trigger"
        );
        Ok(())
    }
}
