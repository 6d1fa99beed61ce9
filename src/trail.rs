use crate::bindings::CellRef;

/// Position in the trail taken before a proof attempt, so the attempt's
/// bindings can later be undone as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Append-only ledger of the binding cells bound during a proof attempt.
///
/// The trail is the only component that unbinds cells: failing or
/// backtracking means undoing the entries recorded since a checkpoint, in
/// reverse order. Checkpoints nest arbitrarily deep, one per choice point.
#[derive(Debug, Default)]
pub struct Trail {
    entries: Vec<CellRef>,
}

impl Trail {
    /// An empty trail.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Checkpoint at the current position.
    #[must_use]
    pub fn mark(&self) -> Checkpoint {
        Checkpoint(self.entries.len())
    }

    /// Record a cell that was just bound.
    pub fn push(&mut self, cell: CellRef) {
        self.entries.push(cell);
    }

    /// Undo every binding performed since `checkpoint`, last bound first,
    /// resetting each recorded cell to free. Undoing to the same
    /// checkpoint twice is a no-op the second time.
    ///
    /// # Panics
    ///
    /// Panics if `checkpoint` lies beyond the current trail head, which
    /// means it was taken on a region that has already been undone.
    pub fn undo_to(&mut self, checkpoint: Checkpoint) {
        assert!(
            checkpoint.0 <= self.entries.len(),
            "undo to a checkpoint beyond the trail head"
        );
        log::trace!(
            "undoing {} bindings back to position {}",
            self.entries.len() - checkpoint.0,
            checkpoint.0
        );
        while self.entries.len() > checkpoint.0 {
            let cell = self.entries.pop().expect("trail entry present");
            cell.free();
        }
    }

    /// Number of recorded bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no binding has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
