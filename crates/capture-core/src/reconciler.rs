//! Sequence completion reconciliation.
//!
//! Holds `(last_frame, request_id)` pairs for batches whose final frame is known
//! but not yet resolved. Each time the [`crate::FrameNumberTracker`] advances, the
//! pending list is walked in insertion order and every entry whose bound has been
//! reached fires `on_capture_sequence_completed` through its listener's queue.
//!
//! Entries are compared one by one; the scan never stops at the first unresolved
//! entry, so correctness does not depend on bounds being sorted.

use tracing::{debug, warn};

use crate::dispatch::Dispatcher;
use crate::error::CaptureError;
use crate::registry::{CaptureListenerHolder, ListenerRegistry};
use crate::types::{FrameNumber, LastFrame, RequestId};

/// A batch waiting for its last frame to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSequence {
    /// Final frame of the batch
    pub last_frame: FrameNumber,
    /// Batch id
    pub request_id: RequestId,
    listener_value: i32,
}

/// Ordered list of batches awaiting completion.
#[derive(Debug, Default)]
pub struct SequenceReconciler {
    pending: Vec<PendingSequence>,
}

impl SequenceReconciler {
    /// Empty reconciler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `request_id` until `last_frame` resolves.
    ///
    /// A batch that never reached the device completes immediately with a last
    /// frame of `0`. A bound that does not fit in an `i32` is rejected before
    /// anything is recorded.
    pub fn enqueue(
        &mut self,
        last_frame: LastFrame,
        request_id: RequestId,
        registry: &mut ListenerRegistry,
        dispatcher: &Dispatcher,
    ) -> Result<(), CaptureError> {
        match last_frame {
            LastFrame::NoFramesCaptured => {
                match registry.remove(request_id) {
                    Some(holder) => {
                        debug!(%request_id, "Sequence retired before reaching the device");
                        notify_sequence_completed(dispatcher, holder, request_id, 0);
                    }
                    None => {
                        warn!(%request_id, "No listener registered for early sequence completion");
                    }
                }
                Ok(())
            }
            LastFrame::Frame(frame) => {
                let listener_value = frame.to_listener_value()?;
                self.pending.push(PendingSequence {
                    last_frame: frame,
                    request_id,
                    listener_value,
                });
                Ok(())
            }
        }
    }

    /// Fire completion for every pending entry at or below `completed`.
    ///
    /// Returns the number of entries retired, including those without a listener.
    pub fn reconcile(
        &mut self,
        completed: Option<FrameNumber>,
        registry: &mut ListenerRegistry,
        dispatcher: &Dispatcher,
    ) -> usize {
        let Some(completed) = completed else {
            return 0;
        };

        let mut resolved = Vec::new();
        self.pending.retain(|entry| {
            if entry.last_frame <= completed {
                resolved.push(*entry);
                false
            } else {
                true
            }
        });

        for entry in &resolved {
            match registry.remove(entry.request_id) {
                Some(holder) => {
                    debug!(
                        request_id = %entry.request_id,
                        last_frame = %entry.last_frame,
                        "Capture sequence completed"
                    );
                    notify_sequence_completed(
                        dispatcher,
                        holder,
                        entry.request_id,
                        entry.listener_value,
                    );
                }
                None => {
                    debug!(request_id = %entry.request_id, "Sequence completed with no listener");
                }
            }
        }
        resolved.len()
    }

    /// Drop every pending entry without notifying.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Pending entries, oldest first.
    pub fn pending(&self) -> &[PendingSequence] {
        &self.pending
    }

    /// Number of pending entries
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn notify_sequence_completed(
    dispatcher: &Dispatcher,
    holder: CaptureListenerHolder,
    request_id: RequestId,
    last_frame: i32,
) {
    let listener = holder.listener().clone();
    dispatcher.post(holder.queue().as_ref(), move || {
        listener.on_capture_sequence_completed(request_id, last_frame);
    });
}
