//! Aggregate-to-member key translation tables.
//!
//! A [`HiliteMapper`] is the bridge vocabulary of a
//! [`HiliteTranslator`](crate::HiliteTranslator): it relates one *aggregate*
//! key (a cluster, a group row) to the set of *member* keys it stands for.
//! [`DefaultHiliteMapper`] is the standard immutable implementation, built
//! from a plain map and persistable as a hierarchical JSON document so a
//! configured translation survives save/load cycles.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde_json::{Map, Value, json};

use crate::error::{HiliteError, Result};
use crate::key::RowKey;

/// Field name for the member-key array inside each aggregate sub-section.
pub const CFG_MAPPED_KEYS: &str = "mapped_keys";

/// A static translation table from aggregate keys to member key sets.
///
/// Implementations must be immutable once constructed; to change an active
/// mapping, replace the mapper wholesale via
/// [`HiliteTranslator::set_mapper`](crate::HiliteTranslator::set_mapper).
pub trait HiliteMapper: Send + Sync {
    /// The member keys for `key`, or `None` when the key has no mapping.
    fn get_keys(&self, key: &RowKey) -> Option<&HashSet<RowKey>>;

    /// All aggregate keys that have a mapping.
    fn key_set(&self) -> Box<dyn Iterator<Item = &RowKey> + '_>;

    /// The number of mapped aggregate keys.
    fn len(&self) -> usize;

    /// Whether no aggregate key is mapped.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The standard immutable [`HiliteMapper`] backed by a hash map.
///
/// Construction takes ownership of the map, so the table genuinely cannot
/// change underneath a running translator. Aggregate keys mapping to an
/// empty member set are dropped at construction: an empty mapping and a
/// missing mapping are the same thing everywhere in the propagation logic.
///
/// # Example
///
/// ```
/// use std::collections::{HashMap, HashSet};
/// use horizon_hilite::{DefaultHiliteMapper, HiliteMapper, RowKey};
///
/// let mut table = HashMap::new();
/// table.insert(
///     RowKey::new("cluster_1"),
///     HashSet::from([RowKey::new("row_a"), RowKey::new("row_b")]),
/// );
/// let mapper = DefaultHiliteMapper::new(table);
///
/// assert_eq!(mapper.len(), 1);
/// assert_eq!(mapper.get_keys(&RowKey::new("cluster_1")).unwrap().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct DefaultHiliteMapper {
    map: HashMap<RowKey, HashSet<RowKey>>,
}

impl DefaultHiliteMapper {
    /// Build a mapper from an aggregate-to-members table.
    ///
    /// Entries with empty member sets are discarded.
    pub fn new(map: HashMap<RowKey, HashSet<RowKey>>) -> Self {
        let map = map
            .into_iter()
            .filter(|(_, members)| !members.is_empty())
            .collect();
        Self { map }
    }

    /// A mapper with no entries.
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Serialize the mapping as a hierarchical JSON document.
    ///
    /// Each aggregate key becomes one sub-object keyed by the key's string
    /// form, holding the key string again under its own name and the member
    /// keys as a sorted array under [`CFG_MAPPED_KEYS`]. The member order in
    /// the document is not semantically significant; sorting just keeps the
    /// output stable.
    pub fn save(&self) -> Value {
        let mut root = Map::new();
        for (aggregate, members) in &self.map {
            let mut sorted: Vec<&str> = members.iter().map(RowKey::as_str).collect();
            sorted.sort_unstable();

            let name = aggregate.as_str();
            root.insert(
                name.to_string(),
                json!({
                    name: name,
                    CFG_MAPPED_KEYS: sorted,
                }),
            );
        }
        Value::Object(root)
    }

    /// Deserialize a mapping from a document produced by [`save`](Self::save).
    ///
    /// Two legacy member encodings are tolerated: members stored as plain
    /// key strings (the current form) and members stored as richer scalar
    /// cell values, which are normalized through their display form. Any
    /// structural problem yields [`HiliteError::InvalidSettings`]; the
    /// caller decides whether to continue with an empty mapping.
    pub fn load(document: &Value) -> Result<Self> {
        let root = document.as_object().ok_or_else(|| {
            HiliteError::InvalidSettings("mapping document root is not an object".to_string())
        })?;

        let mut map = HashMap::with_capacity(root.len());
        for (name, section) in root {
            let section = section.as_object().ok_or_else(|| {
                HiliteError::InvalidSettings(format!("entry {name:?} is not an object"))
            })?;
            let entries = section.get(CFG_MAPPED_KEYS).ok_or_else(|| {
                HiliteError::InvalidSettings(format!(
                    "entry {name:?} is missing the {CFG_MAPPED_KEYS:?} field"
                ))
            })?;
            let entries = entries.as_array().ok_or_else(|| {
                HiliteError::InvalidSettings(format!(
                    "{CFG_MAPPED_KEYS:?} of entry {name:?} is not an array"
                ))
            })?;

            let mut members = HashSet::with_capacity(entries.len());
            for entry in entries {
                members.insert(member_key(name, entry)?);
            }
            if !members.is_empty() {
                map.insert(RowKey::new(name.as_str()), members);
            }
        }
        Ok(Self { map })
    }

    /// Write the mapping document to a file as pretty-printed JSON.
    pub fn save_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.save())?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Read a mapping document back from a JSON file.
    pub fn load_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let document: Value = serde_json::from_str(&content)?;
        Self::load(&document)
    }
}

/// Normalize one member entry to a [`RowKey`].
///
/// Strings are taken verbatim (the native key-array form); numbers and
/// booleans are legacy cell values and convert through their display form.
fn member_key(section: &str, entry: &Value) -> Result<RowKey> {
    match entry {
        Value::String(s) => Ok(RowKey::new(s.as_str())),
        Value::Number(n) => Ok(RowKey::new(n.to_string())),
        Value::Bool(b) => Ok(RowKey::new(b.to_string())),
        other => Err(HiliteError::InvalidSettings(format!(
            "member entry {other} of {section:?} is neither a key nor a cell value"
        ))),
    }
}

impl HiliteMapper for DefaultHiliteMapper {
    fn get_keys(&self, key: &RowKey) -> Option<&HashSet<RowKey>> {
        self.map.get(key)
    }

    fn key_set(&self) -> Box<dyn Iterator<Item = &RowKey> + '_> {
        Box::new(self.map.keys())
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
