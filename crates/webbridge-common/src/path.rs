use std::fmt;

use crate::errors::RegistrationError;

/// A dotted member path like `app.counter`.
///
/// Resolved at registration time into parent segments plus a leaf name. The
/// parent/leaf relation is structural only; a path owns no object state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    raw: String,
    leaf_start: usize,
}

impl ObjectPath {
    /// Parse a dotted path. Empty paths and empty segments are rejected.
    pub fn parse(raw: &str) -> Result<Self, RegistrationError> {
        if raw.is_empty() || raw.split('.').any(|seg| seg.is_empty()) {
            return Err(RegistrationError::InvalidPath(raw.to_string()));
        }
        let leaf_start = raw.rfind('.').map(|i| i + 1).unwrap_or(0);
        Ok(Self {
            raw: raw.to_string(),
            leaf_start,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The final segment, i.e. the member name installed on the parent.
    pub fn leaf(&self) -> &str {
        &self.raw[self.leaf_start..]
    }

    /// The dotted parent prefix, or `None` for a top-level path.
    pub fn parent(&self) -> Option<&str> {
        if self.leaf_start == 0 {
            None
        } else {
            Some(&self.raw[..self.leaf_start - 1])
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
