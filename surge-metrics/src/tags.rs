use crate::key::KeyId;
use smallvec::SmallVec;

/// Interned `(key, value)` pairs identifying one series, sorted by key with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Request series carry scenario + phase, so four inline slots are plenty.
    pairs: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    /// Caller guarantees the pairs are sorted by key and keys are unique.
    pub fn from_sorted_iter(iter: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.pairs.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        self.pairs
            .binary_search_by_key(&key, |(k, _)| *k)
            .ok()
            .map(|idx| self.pairs[idx].1)
    }

    /// True when every pair of `selector` is present here. An empty selector matches all.
    pub fn contains_all(&self, selector: &TagSet) -> bool {
        selector.iter().all(|(k, v)| self.get(k) == Some(v))
    }
}
