//! The object registry: authoritative mapping from object id to cached
//! property state and declared members, plus the dotted-path namespace.
//!
//! Entries are owned exclusively by the registry; proxies hold only the id.
//! All shared mutation happens either on the script-side caller (optimistic
//! writes) or at the single inbound-message-processing point (GET responses,
//! `propertyUpdated` events), so cache updates are idempotent and
//! last-write-wins by arrival order.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::debug;

use webbridge_common::{ObjectId, ObjectPath, RegistrationError};

/// Last known value of a remote property.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CachedValue {
    /// No fetch has completed yet.
    #[default]
    Unresolved,
    Value(Value),
}

impl CachedValue {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Unresolved => None,
            Self::Value(v) => Some(v),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }
}

/// Kind of declared member on an exposed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Function,
    Property,
}

/// Locally materialized state for one exposed host object.
#[derive(Debug)]
pub struct RegistryEntry {
    id: ObjectId,
    property_cache: HashMap<String, CachedValue>,
    functions: HashSet<String>,
    properties: HashSet<String>,
}

impl RegistryEntry {
    fn new(id: ObjectId) -> Self {
        Self {
            id,
            property_cache: HashMap::new(),
            functions: HashSet::new(),
            properties: HashSet::new(),
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    pub fn is_declared_function(&self, name: &str) -> bool {
        self.functions.contains(name)
    }

    pub fn is_declared_property(&self, name: &str) -> bool {
        self.properties.contains(name)
    }

    /// Current cache state for a property. Undeclared names read as
    /// `Unresolved` until a fetch or event fills them — dynamic members get
    /// the same treatment as declared ones.
    pub fn cached(&self, name: &str) -> CachedValue {
        self.property_cache.get(name).cloned().unwrap_or_default()
    }
}

/// Registry of all exposed objects plus the dotted-path bindings that make
/// them addressable from script code.
#[derive(Debug, Default)]
pub struct ObjectRegistry {
    entries: HashMap<ObjectId, RegistryEntry>,
    bindings: HashMap<String, ObjectId>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new object at `path`.
    ///
    /// Fails with `DuplicateId` if the id is already registered and with
    /// `UnresolvedPath` if the path's parent is not an existing binding.
    /// Binding the same leaf twice is last-write-wins: the old entry is
    /// orphaned but keeps its cache, and its pending calls resolve
    /// independently.
    pub fn register_object(
        &mut self,
        path: &str,
        id: ObjectId,
    ) -> Result<&RegistryEntry, RegistrationError> {
        let path = ObjectPath::parse(path)?;
        if self.entries.contains_key(&id) {
            return Err(RegistrationError::DuplicateId(id));
        }
        if let Some(parent) = path.parent() {
            if !self.bindings.contains_key(parent) {
                return Err(RegistrationError::UnresolvedPath {
                    path: path.as_str().to_string(),
                    parent: parent.to_string(),
                });
            }
        }
        if let Some(old) = self.bindings.insert(path.as_str().to_string(), id.clone()) {
            debug!(path = %path, old = %old, new = %id, "binding replaced");
        }
        let entry = self
            .entries
            .entry(id.clone())
            .or_insert_with(|| RegistryEntry::new(id));
        Ok(entry)
    }

    /// Declare a member on a registered object. Declaring a property seeds
    /// its cache slot as unresolved.
    pub fn define_member(
        &mut self,
        id: &ObjectId,
        kind: MemberKind,
        name: &str,
    ) -> Result<(), RegistrationError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| RegistrationError::UnknownObject(id.clone()))?;
        match kind {
            MemberKind::Function => {
                entry.functions.insert(name.to_string());
            }
            MemberKind::Property => {
                entry.properties.insert(name.to_string());
                entry.property_cache.entry(name.to_string()).or_default();
            }
        }
        Ok(())
    }

    /// Resolve a dotted path to the object currently bound there.
    pub fn resolve(&self, path: &str) -> Option<&ObjectId> {
        self.bindings.get(path)
    }

    pub fn entry(&self, id: &ObjectId) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.entries.contains_key(id)
    }

    /// Current cache state for `(id, name)`. Reads never fail: an unknown
    /// object or property degrades to `Unresolved`.
    pub fn cached_value(&self, id: &ObjectId, name: &str) -> CachedValue {
        self.entries
            .get(id)
            .map(|e| e.cached(name))
            .unwrap_or_default()
    }

    /// Overwrite the cache slot for `(id, name)`. Idempotent and
    /// last-write-wins; shared by the accessor path and the event-driven
    /// synchronization path. Returns false if the object is unknown.
    pub fn set_cached_value(&mut self, id: &ObjectId, name: &str, value: Value) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry
                    .property_cache
                    .insert(name.to_string(), CachedValue::Value(value));
                true
            }
            None => false,
        }
    }

    /// All current bindings sorted parents-before-children, for setup
    /// command generation.
    pub fn bindings_in_order(&self) -> Vec<(&str, &ObjectId)> {
        let mut bound: Vec<(&str, &ObjectId)> = self
            .bindings
            .iter()
            .map(|(p, id)| (p.as_str(), id))
            .collect();
        bound.sort_by_key(|(path, _)| (path.matches('.').count(), path.to_string()));
        bound
    }

    /// Declared members of an object, functions then properties, in a
    /// stable order.
    pub fn declared_members(&self, id: &ObjectId) -> Vec<(MemberKind, String)> {
        let Some(entry) = self.entries.get(id) else {
            return Vec::new();
        };
        let mut functions: Vec<_> = entry.functions.iter().cloned().collect();
        functions.sort();
        let mut properties: Vec<_> = entry.properties.iter().cloned().collect();
        properties.sort();
        functions
            .into_iter()
            .map(|n| (MemberKind::Function, n))
            .chain(properties.into_iter().map(|n| (MemberKind::Property, n)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry_with(path: &str, id: &str) -> ObjectRegistry {
        let mut reg = ObjectRegistry::new();
        reg.register_object(path, ObjectId::from(id)).unwrap();
        reg
    }

    #[test]
    fn register_top_level_object() {
        let reg = registry_with("app", "o1");
        assert_eq!(reg.resolve("app"), Some(&ObjectId::from("o1")));
        assert!(reg.contains(&ObjectId::from("o1")));
    }

    #[test]
    fn register_nested_object_requires_parent() {
        let mut reg = registry_with("app", "o1");
        reg.register_object("app.counter", ObjectId::from("o2"))
            .unwrap();
        assert_eq!(reg.resolve("app.counter"), Some(&ObjectId::from("o2")));

        let err = reg
            .register_object("missing.child", ObjectId::from("o3"))
            .unwrap_err();
        assert!(
            matches!(err, RegistrationError::UnresolvedPath { ref parent, .. } if parent == "missing")
        );
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut reg = registry_with("app", "o1");
        let err = reg
            .register_object("other", ObjectId::from("o1"))
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateId(_)));
    }

    #[test]
    fn rebinding_a_leaf_is_last_write_wins() {
        let mut reg = registry_with("app", "o1");
        reg.set_cached_value(&ObjectId::from("o1"), "count", json!(5));

        reg.register_object("app", ObjectId::from("o2")).unwrap();
        assert_eq!(reg.resolve("app"), Some(&ObjectId::from("o2")));

        // The orphaned entry keeps its cache state.
        assert_eq!(
            reg.cached_value(&ObjectId::from("o1"), "count"),
            CachedValue::Value(json!(5))
        );
        // The new entry starts fresh; no cache migration.
        assert!(reg.cached_value(&ObjectId::from("o2"), "count").is_unresolved());
    }

    #[test]
    fn invalid_path_rejected() {
        let mut reg = ObjectRegistry::new();
        assert!(matches!(
            reg.register_object("", ObjectId::from("o1")),
            Err(RegistrationError::InvalidPath(_))
        ));
        assert!(reg.register_object("a..b", ObjectId::from("o1")).is_err());
    }

    #[test]
    fn declaring_a_property_seeds_unresolved_cache() {
        let mut reg = registry_with("app", "o1");
        let id = ObjectId::from("o1");
        reg.define_member(&id, MemberKind::Property, "count").unwrap();

        let entry = reg.entry(&id).unwrap();
        assert!(entry.is_declared_property("count"));
        assert!(!entry.is_declared_function("count"));
        assert!(reg.cached_value(&id, "count").is_unresolved());
    }

    #[test]
    fn declaring_a_function() {
        let mut reg = registry_with("app", "o1");
        let id = ObjectId::from("o1");
        reg.define_member(&id, MemberKind::Function, "increment")
            .unwrap();
        assert!(reg.entry(&id).unwrap().is_declared_function("increment"));
    }

    #[test]
    fn define_member_on_unknown_object_fails() {
        let mut reg = ObjectRegistry::new();
        let err = reg
            .define_member(&ObjectId::from("ghost"), MemberKind::Property, "x")
            .unwrap_err();
        assert!(matches!(err, RegistrationError::UnknownObject(_)));
    }

    #[test]
    fn undeclared_member_reads_as_unresolved() {
        let reg = registry_with("app", "o1");
        assert!(reg
            .cached_value(&ObjectId::from("o1"), "never_declared")
            .is_unresolved());
        // Unknown object degrades the same way; reads never fail.
        assert!(reg
            .cached_value(&ObjectId::from("ghost"), "x")
            .is_unresolved());
    }

    #[test]
    fn cache_update_is_last_write_wins() {
        let mut reg = registry_with("app", "o1");
        let id = ObjectId::from("o1");
        assert!(reg.set_cached_value(&id, "count", json!(5)));
        assert!(reg.set_cached_value(&id, "count", json!(7)));
        assert_eq!(reg.cached_value(&id, "count"), CachedValue::Value(json!(7)));
    }

    #[test]
    fn cache_update_for_unknown_object_reports_false() {
        let mut reg = ObjectRegistry::new();
        assert!(!reg.set_cached_value(&ObjectId::from("ghost"), "x", json!(1)));
    }

    #[test]
    fn bindings_in_order_puts_parents_first() {
        let mut reg = registry_with("app", "o1");
        reg.register_object("app.counter", ObjectId::from("o2"))
            .unwrap();
        reg.register_object("zed", ObjectId::from("o3")).unwrap();

        let order: Vec<&str> = reg.bindings_in_order().iter().map(|(p, _)| *p).collect();
        assert_eq!(order, vec!["app", "zed", "app.counter"]);
    }

    #[test]
    fn declared_members_are_stable_and_grouped() {
        let mut reg = registry_with("app", "o1");
        let id = ObjectId::from("o1");
        reg.define_member(&id, MemberKind::Property, "count").unwrap();
        reg.define_member(&id, MemberKind::Function, "reset").unwrap();
        reg.define_member(&id, MemberKind::Function, "increment")
            .unwrap();

        let members = reg.declared_members(&id);
        assert_eq!(
            members,
            vec![
                (MemberKind::Function, "increment".to_string()),
                (MemberKind::Function, "reset".to_string()),
                (MemberKind::Property, "count".to_string()),
            ]
        );
    }
}
