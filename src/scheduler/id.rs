//! Task handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a registered task.
///
/// A `TaskId` names an arena slot plus the generation that slot had when the
/// task was registered. Once the task is swept the slot's generation moves
/// on, so an old id can never alias a newer task that reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    index: u32,
    generation: u32,
}

impl TaskId {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Arena slot index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Slot generation this id was issued for.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    pub(crate) fn slot(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}v{}", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn display_includes_index_and_generation() {
        assert_eq!(TaskId::new(3, 7).to_string(), "task-3v7");
    }

    #[test]
    fn ids_differ_by_generation() {
        assert_ne!(TaskId::new(0, 0), TaskId::new(0, 1));
    }

    #[test]
    fn serde_round_trip() {
        let id = TaskId::new(12, 4);
        let json = serde_json::to_string(&id).unwrap();
        let restored: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, id);
        assert_eq!(restored.index(), 12);
        assert_eq!(restored.generation(), 4);
    }
}
