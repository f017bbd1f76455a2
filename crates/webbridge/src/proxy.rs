//! Proxy handles: script-side stand-ins for host objects.
//!
//! A handle routes member access through the registry's two-tier lookup:
//! declared members and cached values first, then the dynamic path that
//! treats any undeclared name as a lazy remote property. Access is exposed
//! through the capability traits [`Readable`], [`Writable`] and
//! [`Invocable`] instead of runtime interception.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use webbridge_common::{ObjectId, RequestId, Result};

use crate::bridge::BridgeShared;
use crate::correlator::PendingReply;
use crate::protocol::RequestBody;
use crate::registry::CachedValue;

/// Read access to a remote object's properties through the local cache.
#[async_trait]
pub trait Readable {
    /// Current cached value; `Unresolved` if no fetch has completed yet.
    ///
    /// Never blocks and never fails: the read returns the best-known value
    /// immediately and unconditionally issues a background refresh, so
    /// repeated reads converge toward host truth.
    fn read(&self, property: &str) -> CachedValue;

    /// Fetch the property from the host, waiting for the response. The
    /// cache is updated as a side effect of the response arriving.
    async fn fetch(&self, property: &str) -> Result<Value>;
}

/// Write access: optimistic local cache update plus a SET to the host.
pub trait Writable {
    /// Update the cache immediately and send the SET without waiting for
    /// acknowledgment. The returned handle can be awaited for the host's
    /// ack, or dropped for pure fire-and-forget. The cache is not rolled
    /// back if the host rejects the write.
    fn write(&self, property: &str, value: Value) -> Result<SetAck>;
}

/// Remote method invocation.
#[async_trait]
pub trait Invocable {
    /// Call `function` on the host object with an ordered argument list and
    /// wait for the return value.
    async fn invoke(&self, function: &str, arguments: Vec<Value>) -> Result<Value>;
}

/// Acknowledgment handle for an optimistic write.
pub struct SetAck {
    shared: Arc<BridgeShared>,
    request_id: RequestId,
    reply: PendingReply,
}

impl SetAck {
    /// Wait for the host to acknowledge (or reject) the write.
    pub async fn wait(self) -> Result<Value> {
        self.shared.await_reply(self.request_id, self.reply).await
    }
}

/// Handle to one registered host object.
///
/// Cheap to clone; identity is stable for the lifetime of the registry
/// entry. Re-binding the entry's path produces a new handle and does not
/// migrate cache state.
#[derive(Clone)]
pub struct ProxyHandle {
    pub(crate) shared: Arc<BridgeShared>,
    pub(crate) id: ObjectId,
}

impl std::fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

impl ProxyHandle {
    pub fn object_id(&self) -> &ObjectId {
        &self.id
    }

    /// Whether the host declared `name` as a function member.
    pub fn is_declared_function(&self, name: &str) -> bool {
        self.shared
            .with_registry(|reg| {
                reg.entry(&self.id)
                    .map(|e| e.is_declared_function(name))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Whether the host declared `name` as a property member. Undeclared
    /// names are still readable and writable through the dynamic path.
    pub fn is_declared_property(&self, name: &str) -> bool {
        self.shared
            .with_registry(|reg| {
                reg.entry(&self.id)
                    .map(|e| e.is_declared_property(name))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }
}

#[async_trait]
impl Readable for ProxyHandle {
    fn read(&self, property: &str) -> CachedValue {
        let cached = self
            .shared
            .with_registry(|reg| reg.cached_value(&self.id, property))
            .unwrap_or_default();

        // Refresh unconditionally. The response fills the cache at the
        // inbound processing point, so the reply handle itself is dropped.
        let refresh = self.shared.send_request(RequestBody::Get {
            id: self.id.clone(),
            property: property.to_string(),
        });
        if let Err(e) = refresh {
            warn!(object = %self.id, property, error = %e, "background refresh failed");
        }

        cached
    }

    async fn fetch(&self, property: &str) -> Result<Value> {
        let (request_id, reply) = self.shared.send_request(RequestBody::Get {
            id: self.id.clone(),
            property: property.to_string(),
        })?;
        self.shared.await_reply(request_id, reply).await
    }
}

impl Writable for ProxyHandle {
    fn write(&self, property: &str, value: Value) -> Result<SetAck> {
        // Optimistic: local readers see the new value before the host
        // acknowledges. Not rolled back on rejection.
        self.shared.with_registry(|reg| {
            reg.set_cached_value(&self.id, property, value.clone());
        });

        let (request_id, reply) = self.shared.send_request(RequestBody::Set {
            id: self.id.clone(),
            property: property.to_string(),
            new_value: value,
        })?;
        Ok(SetAck {
            shared: Arc::clone(&self.shared),
            request_id,
            reply,
        })
    }
}

#[async_trait]
impl Invocable for ProxyHandle {
    async fn invoke(&self, function: &str, arguments: Vec<Value>) -> Result<Value> {
        let (request_id, reply) = self.shared.send_request(RequestBody::Invoke {
            id: self.id.clone(),
            function: function.to_string(),
            arguments,
        })?;
        self.shared.await_reply(request_id, reply).await
    }
}
