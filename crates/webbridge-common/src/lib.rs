//! Shared vocabulary for the webbridge crates: object and request
//! identifiers, dotted object paths, and the bridge error taxonomy.

pub mod errors;
pub mod id;
pub mod path;

pub use errors::{BridgeError, ProtocolError, RegistrationError, TransportError};
pub use id::{new_object_id, ObjectId, RequestId};
pub use path::ObjectPath;

pub type Result<T> = std::result::Result<T, BridgeError>;
