//! Bridge assembly: wires the registry, correlator, event dispatcher, and
//! transport together, owns the initialization state machine, and is the
//! single serialization point for inbound messages.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use webbridge_common::{BridgeError, ObjectId, RegistrationError, RequestId, Result};

use crate::config::BridgeConfig;
use crate::correlator::{CallResult, Correlator, PendingReply};
use crate::events::{EventDispatcher, Subscription};
use crate::protocol::{
    Inbound, PropertyUpdate, Request, RequestBody, ResponseOutcome, PROPERTY_UPDATED,
};
use crate::proxy::ProxyHandle;
use crate::registry::{MemberKind, ObjectRegistry};
use crate::transport::Transport;

/// Bridge lifecycle states. Initialization is guarded against re-entry;
/// once `Ready`, the bridge surface is structurally fixed (no re-init, no
/// transport or dispatcher swap), though registry entries and caches remain
/// mutable for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Uninitialized,
    Initializing,
    Ready,
}

/// State shared between the bridge, its proxies, and the inbound pump task.
pub(crate) struct BridgeShared {
    pub(crate) registry: Arc<Mutex<ObjectRegistry>>,
    pub(crate) correlator: Correlator,
    pub(crate) dispatcher: EventDispatcher,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) config: BridgeConfig,
}

impl BridgeShared {
    /// Run `f` against the locked registry. `None` only on a poisoned lock,
    /// which is logged and treated as an absent registry.
    pub(crate) fn with_registry<T>(&self, f: impl FnOnce(&mut ObjectRegistry) -> T) -> Option<T> {
        match self.registry.lock() {
            Ok(mut reg) => Some(f(&mut reg)),
            Err(_) => {
                warn!("registry lock poisoned; operation skipped");
                None
            }
        }
    }

    /// Allocate a request id, record the pending call, and hand the encoded
    /// request to the transport. On transport failure the pending call is
    /// removed and the error returned synchronously.
    pub(crate) fn send_request(&self, body: RequestBody) -> Result<(RequestId, PendingReply)> {
        let (request_id, reply) = self.correlator.begin(body.kind(), body.cache_target());
        let request = Request { request_id, body };
        let wire = match request.to_wire() {
            Ok(w) => w,
            Err(e) => {
                self.correlator.cancel(request_id);
                return Err(e.into());
            }
        };
        debug!(request_id, kind = %request.body.kind(), "request sent");
        if let Err(e) = self.transport.deliver_to_host(wire) {
            self.correlator.cancel(request_id);
            return Err(e.into());
        }
        Ok((request_id, reply))
    }

    /// Await a reply, applying the configured timeout policy. A timed-out
    /// call is removed from the correlator with no registry side effects.
    pub(crate) async fn await_reply(
        &self,
        request_id: RequestId,
        reply: PendingReply,
    ) -> CallResult {
        match self.config.call_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, reply.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    self.correlator.cancel(request_id);
                    Err(BridgeError::Timeout(timeout))
                }
            },
            None => reply.wait().await,
        }
    }

    /// Process one inbound message. This is the serialization point: the
    /// pump calls it one message at a time in delivery order, so registry
    /// mutation from responses and events never races with itself.
    pub(crate) fn process_inbound(&self, raw: &str) {
        let message = match Inbound::from_wire(raw) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, raw_len = raw.len(), "inbound message dropped");
                return;
            }
        };

        match message {
            Inbound::Response {
                request_id,
                outcome,
            } => self.process_response(request_id, outcome),
            Inbound::Event { event, data } => {
                debug!(event = %event, "host event");
                self.dispatcher.dispatch(&event, &data);
            }
            Inbound::DefineObject { path, id } => {
                if let Some(Err(e)) =
                    self.with_registry(|reg| reg.register_object(&path, id.clone()).map(|_| ()))
                {
                    warn!(path = %path, object = %id, error = %e, "defineObject rejected");
                }
            }
            Inbound::DefineFunction { id, name } => {
                self.process_define_member(&id, MemberKind::Function, &name);
            }
            Inbound::DefineProperty { id, name } => {
                self.process_define_member(&id, MemberKind::Property, &name);
            }
        }
    }

    fn process_response(&self, request_id: RequestId, outcome: ResponseOutcome) {
        let (result, cache_value) = match outcome {
            ResponseOutcome::Ok { value } => (Ok(value.clone()), Some(value)),
            ResponseOutcome::Err { error } => (Err(BridgeError::Host(error)), None),
        };
        // Unknown or already-resolved ids are dropped and logged by the
        // correlator; nothing propagates to other pending calls.
        let Some(resolved) = self.correlator.resolve(request_id, result) else {
            return;
        };
        // GET responses are folded into the property cache right here, at
        // the inbound processing point; arrival order decides the winner
        // when a response races a propertyUpdated event.
        if let (Some((id, property)), Some(value)) = (resolved.cache_target, cache_value) {
            let updated = self
                .with_registry(|reg| reg.set_cached_value(&id, &property, value))
                .unwrap_or(false);
            if !updated {
                warn!(object = %id, property = %property, "GET response for unknown object");
            }
        }
    }

    fn process_define_member(&self, id: &ObjectId, kind: MemberKind, name: &str) {
        if let Some(Err(e)) = self.with_registry(|reg| reg.define_member(id, kind, name)) {
            warn!(object = %id, member = name, error = %e, "define member rejected");
        }
    }
}

/// The bridge instance. One per embedded surface; owns all otherwise-global
/// state so multiple bridges can coexist in a process.
pub struct Bridge {
    shared: Arc<BridgeShared>,
    state: Mutex<BridgeState>,
}

impl Bridge {
    pub fn new(transport: impl Transport + 'static, config: BridgeConfig) -> Self {
        Self {
            shared: Arc::new(BridgeShared {
                registry: Arc::new(Mutex::new(ObjectRegistry::new())),
                correlator: Correlator::new(),
                dispatcher: EventDispatcher::new(),
                transport: Box::new(transport),
                config,
            }),
            state: Mutex::new(BridgeState::Uninitialized),
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(BridgeState::Uninitialized)
    }

    /// Bring the bridge up. Registers the built-in `propertyUpdated`
    /// listener before any user listener can run. A second call is a no-op.
    pub fn initialize(&self) -> BridgeState {
        let Ok(mut state) = self.state.lock() else {
            return BridgeState::Uninitialized;
        };
        if *state != BridgeState::Uninitialized {
            debug!(state = ?*state, "initialize: already started, ignoring");
            return *state;
        }
        *state = BridgeState::Initializing;

        // The built-in listener is first-registered, therefore first-called;
        // it is otherwise an ordinary listener and coexists with any user
        // listener on the same event type.
        let registry = Arc::clone(&self.shared.registry);
        let _builtin = self.shared.dispatcher.on(PROPERTY_UPDATED, move |data| {
            let update: PropertyUpdate = match serde_json::from_value(data.clone()) {
                Ok(u) => u,
                Err(e) => {
                    warn!(error = %e, "malformed propertyUpdated payload");
                    return;
                }
            };
            match registry.lock() {
                Ok(mut reg) => {
                    if !reg.set_cached_value(&update.object_id, &update.property, update.value) {
                        warn!(
                            object = %update.object_id,
                            property = %update.property,
                            "propertyUpdated for unknown object"
                        );
                    }
                }
                Err(_) => warn!("registry lock poisoned; propertyUpdated dropped"),
            }
        });

        *state = BridgeState::Ready;
        info!("bridge initialized");
        BridgeState::Ready
    }

    // -- Host control surface ------------------------------------------------

    /// Register a host object at a dotted path and get its proxy.
    pub fn register_object(&self, path: &str, id: impl Into<ObjectId>) -> Result<ProxyHandle> {
        let id = id.into();
        self.shared
            .with_registry(|reg| reg.register_object(path, id.clone()).map(|_| ()))
            .unwrap_or(Err(RegistrationError::UnknownObject(id.clone())))?;
        info!(path, object = %id, "object registered");
        Ok(ProxyHandle {
            shared: Arc::clone(&self.shared),
            id,
        })
    }

    /// Declare a callable member on a registered object.
    pub fn define_function(&self, id: &ObjectId, name: &str) -> Result<()> {
        self.define_member(id, MemberKind::Function, name)
    }

    /// Declare a cached property on a registered object.
    pub fn define_property(&self, id: &ObjectId, name: &str) -> Result<()> {
        self.define_member(id, MemberKind::Property, name)
    }

    fn define_member(&self, id: &ObjectId, kind: MemberKind, name: &str) -> Result<()> {
        self.shared
            .with_registry(|reg| reg.define_member(id, kind, name))
            .unwrap_or(Err(RegistrationError::UnknownObject(id.clone())))?;
        Ok(())
    }

    /// The ordered command batch that would recreate the current registry
    /// on a fresh peer: objects parents-first, then their declared members.
    pub fn setup_commands(&self) -> Vec<Inbound> {
        self.shared
            .with_registry(|reg| {
                let mut commands = Vec::new();
                let bound: Vec<(String, ObjectId)> = reg
                    .bindings_in_order()
                    .into_iter()
                    .map(|(p, id)| (p.to_string(), id.clone()))
                    .collect();
                for (path, id) in &bound {
                    commands.push(Inbound::DefineObject {
                        path: path.clone(),
                        id: id.clone(),
                    });
                }
                for (_, id) in &bound {
                    for (kind, name) in reg.declared_members(id) {
                        commands.push(match kind {
                            MemberKind::Function => Inbound::DefineFunction {
                                id: id.clone(),
                                name,
                            },
                            MemberKind::Property => Inbound::DefineProperty {
                                id: id.clone(),
                                name,
                            },
                        });
                    }
                }
                commands
            })
            .unwrap_or_default()
    }

    // -- Proxy access --------------------------------------------------------

    /// Proxy for the object currently bound at `path`.
    pub fn proxy(&self, path: &str) -> Option<ProxyHandle> {
        let id = self
            .shared
            .with_registry(|reg| reg.resolve(path).cloned())??;
        Some(ProxyHandle {
            shared: Arc::clone(&self.shared),
            id,
        })
    }

    /// Proxy by object id, including orphaned entries whose path binding
    /// was replaced.
    pub fn proxy_by_id(&self, id: &ObjectId) -> Option<ProxyHandle> {
        let known = self
            .shared
            .with_registry(|reg| reg.contains(id))
            .unwrap_or(false);
        known.then(|| ProxyHandle {
            shared: Arc::clone(&self.shared),
            id: id.clone(),
        })
    }

    // -- Events --------------------------------------------------------------

    /// The event dispatcher, for `on`/`once`/`off` on host-pushed events.
    pub fn events(&self) -> &EventDispatcher {
        &self.shared.dispatcher
    }

    /// Subscribe to a host event. Convenience for `events().on(...)`.
    pub fn on(
        &self,
        event: &str,
        callback: impl FnMut(&Value) + Send + 'static,
    ) -> Subscription {
        self.shared.dispatcher.on(event, callback)
    }

    // -- Inbound delivery ----------------------------------------------------

    /// Process one host-to-script message. The embedder must call this from
    /// a single logical delivery stream; use [`Bridge::spawn_inbound_pump`]
    /// for a ready-made ordered channel.
    pub fn process_inbound(&self, raw: &str) {
        self.shared.process_inbound(raw);
    }

    /// Create the inbound delivery channel and spawn the pump task that
    /// drains it one message at a time in delivery order.
    pub fn spawn_inbound_pump(&self) -> mpsc::Sender<String> {
        let (tx, mut rx) = mpsc::channel::<String>(self.shared.config.inbound_capacity);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                shared.process_inbound(&raw);
            }
            debug!("inbound pump stopped");
        });
        tx
    }

    /// Tear the bridge down: every pending call is rejected with a
    /// transport failure instead of hanging forever.
    pub fn shutdown(&self, reason: &str) {
        self.shared.correlator.fail_all(reason);
        info!(reason, "bridge shut down");
    }

    /// How many calls are currently awaiting a host response.
    pub fn outstanding_calls(&self) -> usize {
        self.shared.correlator.outstanding()
    }
}
