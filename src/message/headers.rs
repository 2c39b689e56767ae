use indexmap::IndexMap;

/// Case-insensitive, insertion-order-preserving header map.
///
/// Lookups are normalized to lowercase on both insert and query, fixing the
/// `Host`/`host` double-lookup the original proxy relied on (see design notes).
/// Original casing is retained for rendering; a repeated header collapses to the
/// last value written, per the parser contract.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: IndexMap<String, Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    value: String,
}

impl HeaderMap {
    pub fn new() -> Self {
        HeaderMap {
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        let key = name.to_ascii_lowercase();
        self.entries.insert(
            key,
            Entry {
                name: name.to_string(),
                value: value.to_string(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|e| e.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// True if the header is present and non-empty.
    pub fn has_nonempty(&self, name: &str) -> bool {
        self.get(name).map(|v| !v.is_empty()).unwrap_or(false)
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.shift_remove(&name.to_ascii_lowercase());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|e| (e.name.as_str(), e.value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
