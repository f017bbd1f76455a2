//! Call correlation: issues request ids, tracks pending calls, and matches
//! asynchronous responses back to their callers.
//!
//! Responses are matched strictly by id and may arrive in any order. A
//! response for an unknown or already-resolved id is dropped with a
//! diagnostic; it never raises to calling code.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use webbridge_common::{BridgeError, ObjectId, ProtocolError, RequestId, TransportError};

use crate::protocol::RequestKind;

/// Outcome delivered to a pending call.
pub type CallResult = Result<Value, BridgeError>;

/// One outstanding request awaiting its response.
struct PendingCall {
    kind: RequestKind,
    cache_target: Option<(ObjectId, String)>,
    tx: oneshot::Sender<CallResult>,
}

/// Metadata of a call that just completed, reported back to the inbound
/// processing point so GET results can be folded into the property cache.
#[derive(Debug)]
pub struct ResolvedCall {
    pub kind: RequestKind,
    pub cache_target: Option<(ObjectId, String)>,
}

/// Future half of a pending call.
///
/// Dropping it abandons the reply without cancelling the call; the response
/// is still processed (and cached, for GETs) when it arrives.
pub struct PendingReply {
    rx: oneshot::Receiver<CallResult>,
}

impl PendingReply {
    pub async fn wait(self) -> CallResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::Abandoned),
        }
    }
}

pub struct Correlator {
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, PendingCall>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a fresh request id and record the pending call.
    pub fn begin(
        &self,
        kind: RequestKind,
        cache_target: Option<(ObjectId, String)>,
    ) -> (RequestId, PendingReply) {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(
                request_id,
                PendingCall {
                    kind,
                    cache_target,
                    tx,
                },
            );
        }
        (request_id, PendingReply { rx })
    }

    /// Complete the pending call for `request_id`, at most once.
    ///
    /// Returns the resolved call's metadata, or `None` if the id is unknown
    /// or already resolved (in which case the result is dropped and logged).
    pub fn resolve(&self, request_id: RequestId, result: CallResult) -> Option<ResolvedCall> {
        let call = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&request_id),
            Err(_) => None,
        };
        match call {
            Some(call) => {
                let resolved = ResolvedCall {
                    kind: call.kind,
                    cache_target: call.cache_target,
                };
                // The caller may have dropped its reply handle; that is fine
                // for fire-and-forget refreshes.
                let _ = call.tx.send(result);
                debug!(request_id, kind = %resolved.kind, "call resolved");
                Some(resolved)
            }
            None => {
                // Unknown id, already resolved, or cancelled. The response
                // is dropped; nothing propagates to other pending calls.
                warn!(error = %ProtocolError::UnknownRequest(request_id), "response dropped");
                None
            }
        }
    }

    /// Remove a pending call without completing it. The reply future is
    /// rejected by the caller (timeout path); the registry is untouched.
    pub fn cancel(&self, request_id: RequestId) -> bool {
        match self.pending.lock() {
            Ok(mut pending) => pending.remove(&request_id).is_some(),
            Err(_) => false,
        }
    }

    /// Reject every outstanding call. Used when the transport is lost so
    /// callers are not left hanging forever.
    pub fn fail_all(&self, reason: &str) {
        let drained: Vec<(RequestId, PendingCall)> = match self.pending.lock() {
            Ok(mut pending) => pending.drain().collect(),
            Err(_) => Vec::new(),
        };
        let count = drained.len();
        for (request_id, call) in drained {
            let _ = call.tx.send(Err(BridgeError::Transport(TransportError::Failed(
                reason.to_string(),
            ))));
            debug!(request_id, reason, "pending call rejected");
        }
        if count > 0 {
            warn!(count, reason, "all pending calls rejected");
        }
    }

    /// How many calls are currently outstanding.
    pub fn outstanding(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}
