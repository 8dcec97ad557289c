use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use stopsig_cache::Atom;

/// A named response key ("leftarrow", "rightarrow", "space", ...).
/// Interned so comparisons during the response race are pointer-cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(Atom);

impl Key {
    pub fn new(name: &str) -> Self {
        Key(Atom::from(name))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Key::new(name)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Key::new(&name))
    }
}

/// The set of keys that qualify as a response for one trial.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize)]
pub enum KeySet {
    /// Any key qualifies.
    #[default]
    All,
    /// No key qualifies; the listener is never armed.
    None,
    /// Only the listed keys qualify.
    Of(Vec<Key>),
}

impl KeySet {
    pub fn of<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Key>,
    {
        KeySet::Of(keys.into_iter().map(Into::into).collect())
    }

    pub fn admits(&self, key: &Key) -> bool {
        match self {
            KeySet::All => true,
            KeySet::None => false,
            KeySet::Of(keys) => keys.contains(key),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, KeySet::None)
    }
}
