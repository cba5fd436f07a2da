//! Row key identifiers.
//!
//! A [`RowKey`] names one logical data row. Keys are compared and hashed by
//! value: two keys with the same underlying text are the same identity, no
//! matter where they were created. The backing storage is a shared string,
//! so cloning a key (which propagation does constantly) never copies text.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// An immutable, opaque identifier for one logical data row.
///
/// `RowKey` is the currency of the hilite network: handlers store sets of
/// them, events carry sets of them, and mappers relate aggregate keys to
/// member keys. Equality and hashing are by string value.
///
/// # Example
///
/// ```
/// use horizon_hilite::RowKey;
///
/// let a = RowKey::new("Row17");
/// let b: RowKey = "Row17".into();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "Row17");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(Arc<str>);

impl RowKey {
    /// Create a key from any string-like value.
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// The string form of this key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RowKey({:?})", &*self.0)
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RowKey {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl Borrow<str> for RowKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RowKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
