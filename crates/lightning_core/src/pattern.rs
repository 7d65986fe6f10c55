use serde::{Deserialize, Serialize};

use crate::note::Note;

/// A pattern position or raw tick count.
pub type Pos = u64;

/// The entries stored at one pattern position. `None` is a tombstone left by
/// [`Pattern::remove_from`] so that sibling indices never shift.
pub type Slot = Vec<Option<Note>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern length must be at least 1")]
    EmptyPattern,
    #[error("position {pos} out of range for pattern length {length}")]
    PositionOutOfRange { pos: Pos, length: usize },
    #[error("pattern declares length {length} but has {slots} slots")]
    LengthMismatch { length: usize, slots: usize },
}

/// Fixed-length grid of note slots.
///
/// Mutations require `pos < length`; [`Pattern::notes_at`] wraps instead, so
/// the sequencer can address it with a raw tick count. The pattern has no
/// internal locking; owners share it behind a mutex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PatternWire")]
pub struct Pattern {
    length: usize,
    notes: Vec<Slot>,
}

/// Pattern as it appears on the wire. Slots may be `null`, which older
/// snapshots used for positions that were never written.
#[derive(Deserialize)]
struct PatternWire {
    length: usize,
    notes: Vec<Option<Slot>>,
}

impl TryFrom<PatternWire> for Pattern {
    type Error = PatternError;

    fn try_from(wire: PatternWire) -> Result<Self, Self::Error> {
        if wire.length == 0 {
            return Err(PatternError::EmptyPattern);
        }
        if wire.notes.len() != wire.length {
            return Err(PatternError::LengthMismatch {
                length: wire.length,
                slots: wire.notes.len(),
            });
        }
        Ok(Self {
            length: wire.length,
            notes: wire
                .notes
                .into_iter()
                .map(Option::unwrap_or_default)
                .collect(),
        })
    }
}

impl Pattern {
    pub fn new(size: usize) -> Result<Self, PatternError> {
        if size == 0 {
            return Err(PatternError::EmptyPattern);
        }
        Ok(Self {
            length: size,
            notes: vec![Vec::new(); size],
        })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Entries at `pos % length`, tombstones included.
    pub fn notes_at(&self, pos: Pos) -> &[Option<Note>] {
        let idx = (pos % self.length as Pos) as usize;
        &self.notes[idx]
    }

    /// Add a note at `pos`, filling the first tombstone in the slot if there
    /// is one. Duplicate notes are allowed.
    pub fn add_to(&mut self, pos: Pos, note: Note) -> Result<(), PatternError> {
        let slot = self.slot_mut(pos)?;
        match slot.iter_mut().find(|entry| entry.is_none()) {
            Some(entry) => *entry = Some(note),
            None => slot.push(Some(note)),
        }
        Ok(())
    }

    /// Tombstone the first entry at `pos` matching `note` by sample and
    /// number. Removing a note that is not present is not an error.
    pub fn remove_from(&mut self, pos: Pos, note: &Note) -> Result<(), PatternError> {
        let slot = self.slot_mut(pos)?;
        if let Some(entry) = slot
            .iter_mut()
            .find(|entry| entry.as_ref().is_some_and(|n| n.same_key(note)))
        {
            *entry = None;
        }
        Ok(())
    }

    /// Drop every entry at `pos`, tombstones included.
    pub fn clear(&mut self, pos: Pos) -> Result<(), PatternError> {
        self.slot_mut(pos)?.clear();
        Ok(())
    }

    pub fn apply(&mut self, edit: &PatternEdit) -> Result<(), PatternError> {
        match edit.action {
            EditAction::Add => self.add_to(edit.pos, edit.note.clone()),
            EditAction::Remove => self.remove_from(edit.pos, &edit.note),
        }
    }

    fn slot_mut(&mut self, pos: Pos) -> Result<&mut Slot, PatternError> {
        if pos >= self.length as Pos {
            return Err(PatternError::PositionOutOfRange {
                pos,
                length: self.length,
            });
        }
        Ok(&mut self.notes[pos as usize])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    Add,
    Remove,
}

/// One entry of an edit batch sent by a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEdit {
    pub pos: Pos,
    pub note: Note,
    pub action: EditAction,
}

impl PatternEdit {
    pub fn add(pos: Pos, note: Note) -> Self {
        Self {
            pos,
            note,
            action: EditAction::Add,
        }
    }

    pub fn remove(pos: Pos, note: Note) -> Self {
        Self {
            pos,
            note,
            action: EditAction::Remove,
        }
    }
}
