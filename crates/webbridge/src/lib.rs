//! Remote-object bridge between a host process and script logic running in
//! an embedded web surface.
//!
//! The host exposes flat registries of externally-identified objects; this
//! crate mirrors them as proxies whose property reads/writes and method
//! calls become asynchronous GET/SET/INVOKE messages over a string channel:
//! - Transparent property cache with read-now-refresh-later semantics
//! - Explicit request ids with out-of-order response correlation
//! - Host event push, including the built-in `propertyUpdated` channel that
//!   keeps the property cache synchronized
//! - A narrow [`Transport`] contract so any "send string, receive string"
//!   channel can carry the protocol
//!
//! The native webview widget itself is out of scope; see
//! `examples/counter.rs` for an in-process host wired over
//! [`ChannelTransport`].

pub mod bridge;
pub mod config;
pub mod correlator;
pub mod events;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod transport;

pub use bridge::{Bridge, BridgeState};
pub use config::BridgeConfig;
pub use correlator::{CallResult, Correlator, PendingReply};
pub use events::{EventDispatcher, Subscription};
pub use protocol::{
    Inbound, PropertyUpdate, Request, RequestBody, RequestKind, ResponseOutcome, PROPERTY_UPDATED,
};
pub use proxy::{Invocable, ProxyHandle, Readable, SetAck, Writable};
pub use registry::{CachedValue, MemberKind, ObjectRegistry, RegistryEntry};
pub use transport::{ChannelTransport, Transport};

pub use webbridge_common::{
    new_object_id, BridgeError, ObjectId, ObjectPath, ProtocolError, RegistrationError, Result,
    TransportError,
};
