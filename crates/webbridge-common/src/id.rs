use serde::{Deserialize, Serialize};
use std::fmt;

/// Mint a fresh host-side object id.
///
/// Hosts are free to use any unique string; this helper gives them a UUIDv4.
pub fn new_object_id() -> ObjectId {
    ObjectId(uuid::Uuid::new_v4().to_string())
}

/// Host-assigned identifier for one exposed object.
///
/// Opaque, unique per object, and stable for the object's lifetime. Every
/// GET/SET/INVOKE request and every `propertyUpdated` event names the object
/// it concerns by this id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Wire identifier for one outstanding request.
///
/// Allocated from a process-local monotonic counter and never reused while a
/// call with that id could still be outstanding.
pub type RequestId = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_object_id_is_valid_uuid() {
        let id = new_object_id();
        let parsed = uuid::Uuid::parse_str(id.as_str());
        assert!(parsed.is_ok());
        assert_eq!(parsed.unwrap().get_version_num(), 4);
    }

    #[test]
    fn new_object_id_is_unique() {
        let a = new_object_id();
        let b = new_object_id();
        assert_ne!(a, b);
    }

    #[test]
    fn object_id_display_matches_str() {
        let id = ObjectId::from("o1");
        assert_eq!(id.to_string(), "o1");
        assert_eq!(id.as_str(), "o1");
    }

    #[test]
    fn object_id_serializes_as_bare_string() {
        let id = ObjectId::from("counter-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"counter-1\"");

        let back: ObjectId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn object_id_hash_and_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ObjectId::from("a"));
        set.insert(ObjectId::from("a"));
        set.insert(ObjectId::from("b"));
        assert_eq!(set.len(), 2);
    }
}
