use serde::{Deserialize, Serialize};

/// A single sample trigger stored in a pattern slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Note {
    /// Sample name or path to the sample file
    pub sample: String,
    pub number: i32,
    pub velocity: i32,
}

impl Note {
    pub fn new(sample: impl Into<String>, number: i32, velocity: i32) -> Self {
        Self {
            sample: sample.into(),
            number,
            velocity,
        }
    }

    /// Two notes refer to the same pattern entry when sample and number agree.
    /// Velocity is not part of the key.
    pub fn same_key(&self, other: &Note) -> bool {
        self.number == other.number && self.sample == other.sample
    }

    /// Copy of this note with `sample` replaced, used after resolving a
    /// sample name to a file path.
    pub fn with_sample(&self, sample: impl Into<String>) -> Self {
        Self {
            sample: sample.into(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_json_field_names() {
        let note = Note::new("audio/file.flac", 56, 101);
        let json = serde_json::to_string(&note).unwrap();
        assert_eq!(
            json,
            r#"{"sample":"audio/file.flac","number":56,"velocity":101}"#
        );
    }

    #[test]
    fn test_same_key_ignores_velocity() {
        let a = Note::new("kick", 36, 100);
        let b = Note::new("kick", 36, 12);
        let c = Note::new("snare", 36, 100);
        assert!(a.same_key(&b));
        assert!(!a.same_key(&c));
    }

    #[test]
    fn test_with_sample() {
        let note = Note::new("kick", 36, 90);
        let resolved = note.with_sample("/samples/kick.wav");
        assert_eq!(resolved.sample, "/samples/kick.wav");
        assert_eq!(resolved.number, 36);
        assert_eq!(resolved.velocity, 90);
    }
}
