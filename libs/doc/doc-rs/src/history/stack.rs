//! Undo/redo stacks of history entries.

use crate::history::entry::HistoryEntry;
use crate::model::tree::DocumentTree;

static MAX_UNDOS: usize = 500;

/// Which way a capture/revert/build call is replaying. Passed explicitly;
/// no component reads replay mode from shared mutable state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Undo,
    Redo,
}

/// Owns the undo/redo stacks. Reverting itself lives on
/// [crate::DocumentEditor], which pops entries through this type.
#[derive(Default)]
pub struct EditorHistory {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
}

impl EditorHistory {
    /// Records a completed action. A new action invalidates the redo stack;
    /// evicted entries release their snapshots before being dropped.
    pub fn push(&mut self, entry: HistoryEntry, tree: &mut DocumentTree) {
        for mut stale in self.redo_stack.drain(..) {
            stale.destroy(tree);
        }
        self.undo_stack.push(entry);
        if self.undo_stack.len() > MAX_UNDOS {
            let mut evicted = self.undo_stack.remove(0);
            evicted.destroy(tree);
        }
    }

    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo_stack.pop()
    }

    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo_stack.pop()
    }

    /// Re-files an entry after a successful revert; the entry has been
    /// inverted in place and now belongs to the opposite stack.
    pub fn push_reverted(&mut self, entry: HistoryEntry, direction: Direction) {
        match direction {
            Direction::Undo => self.redo_stack.push(entry),
            Direction::Redo => self.undo_stack.push(entry),
            Direction::Forward => {
                warn!("reverted entry filed in forward direction; treating as undo");
                self.redo_stack.push(entry);
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Releases every entry on both stacks.
    pub fn clear(&mut self, tree: &mut DocumentTree) {
        for mut entry in self.undo_stack.drain(..).chain(self.redo_stack.drain(..)) {
            entry.destroy(tree);
        }
    }
}
