//! Structural cache keys.
//!
//! A key is a collection name followed by zero or more scoping components,
//! e.g. `("expenses",)` for the list and `("expenses", 7)` for one item.
//! Two keys are equal iff all components are equal in order.

use std::fmt;

/// One scoping component of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Int(i64),
    Text(String),
}

impl From<i64> for KeyPart {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(v) => f.write_str(v),
        }
    }
}

/// Identifier for a cached collection or item.
///
/// Fields are private: a key always has a collection name, and scope
/// components can only be appended.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    collection: String,
    scope: Vec<KeyPart>,
}

impl CacheKey {
    /// Key for a whole collection, e.g. `("expenses",)`.
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            scope: Vec::new(),
        }
    }

    /// Append a scoping component, e.g. `CacheKey::collection("expenses").with(7)`.
    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.scope.push(part.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.collection
    }

    pub fn scope(&self) -> &[KeyPart] {
        &self.scope
    }

    /// Number of components, counting the collection name.
    pub fn len(&self) -> usize {
        1 + self.scope.len()
    }

    /// Always false: a key has at least its collection name.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// True if every component of `self` matches the leading components of `other`.
    ///
    /// A key is a prefix of itself.
    pub fn is_prefix_of(&self, other: &CacheKey) -> bool {
        self.collection == other.collection
            && self.scope.len() <= other.scope.len()
            && self.scope.iter().zip(&other.scope).all(|(a, b)| a == b)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.collection)?;
        for part in &self.scope {
            write!(f, "/{}", part)?;
        }
        Ok(())
    }
}
