//! Frame completion tracking.
//!
//! Converts the stream of per-frame result/error signals from the remote device into
//! a single monotonically advancing "last completed frame" value.
//!
//! The device never emits a non-error result for frame N until every frame before N
//! has been resolved, but an error for frame N may arrive before frame N-1 is known.
//! Such errors are buffered in an ordered set and folded in once they become
//! contiguous with the completed frame.

use std::collections::BTreeSet;
use tracing::{debug, trace};

use crate::error::CaptureError;
use crate::types::FrameNumber;

/// Tracks the highest frame number below which every frame has resolved.
#[derive(Debug, Default)]
pub struct FrameNumberTracker {
    completed: Option<FrameNumber>,
    future_errors: BTreeSet<FrameNumber>,
}

impl FrameNumberTracker {
    /// Tracker with nothing resolved.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last fully resolved frame, `None` before the first frame resolves.
    pub fn completed_frame_number(&self) -> Option<FrameNumber> {
        self.completed
    }

    /// Frame number the next non-error result must carry.
    pub fn next_expected(&self) -> FrameNumber {
        self.completed.map_or(FrameNumber(0), FrameNumber::next)
    }

    /// Record a result (`is_error == false`) or an error for `frame`.
    ///
    /// Errors may arrive in any order and duplicates are ignored. A result must be
    /// for exactly [`next_expected`](Self::next_expected); anything else, including a
    /// repeated result for an already completed frame, is a protocol violation and
    /// leaves the tracker untouched.
    pub fn advance(&mut self, frame: FrameNumber, is_error: bool) -> Result<(), CaptureError> {
        if is_error {
            if self.completed.is_some_and(|completed| frame <= completed) {
                debug!(frame_number = %frame, "Ignoring error for an already resolved frame");
                return Ok(());
            }
            self.future_errors.insert(frame);
        } else {
            let expected = self.next_expected();
            if frame != expected {
                return Err(CaptureError::FrameOutOfOrder {
                    received: frame.0,
                    expected: expected.0,
                });
            }
            self.completed = Some(frame);
        }
        self.compact();
        Ok(())
    }

    /// Fold buffered errors that are now contiguous into the completed frame.
    fn compact(&mut self) {
        while let Some(&first) = self.future_errors.first() {
            if first != self.next_expected() {
                break;
            }
            self.future_errors.pop_first();
            self.completed = Some(first);
            trace!(frame_number = %first, "Buffered error frame resolved");
        }
    }

    /// Number of error frames waiting for their predecessors.
    pub fn buffered_errors(&self) -> usize {
        self.future_errors.len()
    }
}
