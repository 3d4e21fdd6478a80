//! Request/listener bookkeeping.
//!
//! Every submitted batch that came with a listener gets a [`CaptureListenerHolder`] in
//! the [`ListenerRegistry`], keyed by the request id the remote device assigned. The
//! holder leaves the registry exactly once: when its sequence completes, or when the
//! session drops all holders on close. Removal hands back ownership, so a second
//! removal for the same id finds nothing and cannot notify twice.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::dispatch::DispatchQueue;
use crate::error::CaptureError;
use crate::listener::CaptureListener;
use crate::types::{CaptureRequest, RequestId};

/// A listener together with the batch it listens to and the queue to deliver on.
#[derive(Clone)]
pub struct CaptureListenerHolder {
    listener: Arc<dyn CaptureListener>,
    requests: Vec<Arc<CaptureRequest>>,
    queue: Arc<dyn DispatchQueue>,
    repeating: bool,
}

impl CaptureListenerHolder {
    /// Bundle a listener with its batch.
    ///
    /// Fails with [`CaptureError::EmptyRequestList`] for an empty batch.
    pub fn new(
        listener: Arc<dyn CaptureListener>,
        requests: Vec<Arc<CaptureRequest>>,
        queue: Arc<dyn DispatchQueue>,
        repeating: bool,
    ) -> Result<Self, CaptureError> {
        if requests.is_empty() {
            return Err(CaptureError::EmptyRequestList);
        }
        Ok(Self {
            listener,
            requests,
            queue,
            repeating,
        })
    }

    /// The request at `index` within the batch.
    pub fn sub_request(&self, index: i32) -> Result<Arc<CaptureRequest>, CaptureError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.requests.get(i))
            .cloned()
            .ok_or(CaptureError::SubsequenceOutOfRange {
                index,
                len: self.requests.len(),
            })
    }

    /// Number of requests in the batch
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    /// Always false; a holder is never built for an empty batch.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Listener
    pub fn listener(&self) -> &Arc<dyn CaptureListener> {
        &self.listener
    }

    /// Queue notifications are delivered on
    pub fn queue(&self) -> &Arc<dyn DispatchQueue> {
        &self.queue
    }

    /// Whether the batch was submitted as a repeating request
    pub fn is_repeating(&self) -> bool {
        self.repeating
    }
}

impl std::fmt::Debug for CaptureListenerHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureListenerHolder")
            .field("requests", &self.requests.len())
            .field("repeating", &self.repeating)
            .finish()
    }
}

/// In-flight request ids mapped to their listener holders.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    holders: HashMap<RequestId, CaptureListenerHolder>,
}

impl ListenerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the holder for `request_id`.
    pub fn register(&mut self, request_id: RequestId, holder: CaptureListenerHolder) {
        if self.holders.insert(request_id, holder).is_some() {
            warn!(%request_id, "Replacing listener for a request id that was still registered");
        }
    }

    /// The holder for `request_id`, if registered.
    pub fn lookup(&self, request_id: RequestId) -> Option<&CaptureListenerHolder> {
        self.holders.get(&request_id)
    }

    /// Remove and return the holder for `request_id`; `None` if already removed.
    pub fn remove(&mut self, request_id: RequestId) -> Option<CaptureListenerHolder> {
        let holder = self.holders.remove(&request_id);
        if holder.is_some() {
            debug!(%request_id, "Removed listener holder");
        }
        holder
    }

    /// Drop every holder without notifying.
    pub fn clear(&mut self) {
        self.holders.clear();
    }

    /// Number of registered holders
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}
