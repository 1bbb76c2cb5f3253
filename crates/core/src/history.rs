//! The prefix of actions a source is resolved against.
//!
//! Sources address earlier actions by absolute position in an append-only
//! list. During discovery the prefix is the captured action list; during
//! replay it is the list of regenerated actions, where skipped exchanges
//! leave empty slots.

use crate::action::Action;
use crate::error::ResolveError;

/// Read access to the actions preceding the one being resolved.
pub trait ActionHistory {
    /// Number of slots in the prefix, empty ones included.
    fn len(&self) -> usize;

    /// The action stored at `index`, or `None` for an empty or missing slot.
    fn slot(&self, index: usize) -> Option<&Action>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve an index, distinguishing a dangling reference (error) from an
    /// empty slot (`Ok(None)`).
    fn lookup(&self, index: usize) -> Result<Option<&Action>, ResolveError> {
        let len = self.len();
        if index >= len {
            return Err(ResolveError::ActionNotFound { index, len });
        }
        Ok(self.slot(index))
    }
}

impl ActionHistory for [Action] {
    fn len(&self) -> usize {
        <[Action]>::len(self)
    }

    fn slot(&self, index: usize) -> Option<&Action> {
        self.get(index)
    }
}

impl ActionHistory for [Option<Action>] {
    fn len(&self) -> usize {
        <[Option<Action>]>::len(self)
    }

    fn slot(&self, index: usize) -> Option<&Action> {
        self.get(index).and_then(Option::as_ref)
    }
}

impl<T> ActionHistory for Vec<T>
where
    [T]: ActionHistory,
{
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn slot(&self, index: usize) -> Option<&Action> {
        self.as_slice().slot(index)
    }
}
