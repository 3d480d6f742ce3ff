use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Interned string id used for metric names, tag keys and tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u32);

impl From<u32> for KeyId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl From<KeyId> for u32 {
    fn from(v: KeyId) -> Self {
        v.0
    }
}

#[derive(Default, Debug)]
pub(crate) struct Interner {
    inner: RwLock<InternerInner>,
}

#[derive(Default, Debug)]
struct InternerInner {
    ids: HashMap<Arc<str>, u32>,
    strings: Vec<Arc<str>>,
}

impl Interner {
    pub(crate) fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(&id) = self.inner.read().ids.get(s) {
            return KeyId(id);
        }

        let mut inner = self.inner.write();
        // Another writer may have won the race between the two locks.
        if let Some(&id) = inner.ids.get(s) {
            return KeyId(id);
        }

        let id = inner.strings.len() as u32;
        let s: Arc<str> = Arc::from(s);
        inner.strings.push(s.clone());
        inner.ids.insert(s, id);
        KeyId(id)
    }

    pub(crate) fn lookup(&self, s: &str) -> Option<KeyId> {
        self.inner.read().ids.get(s).copied().map(KeyId)
    }

    pub(crate) fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        self.inner.read().strings.get(id.0 as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let i = Interner::default();
        let a = i.get_or_intern("scenario");
        let b = i.get_or_intern("phase");
        assert_ne!(a, b);
        assert_eq!(i.get_or_intern("scenario"), a);
        assert_eq!(i.lookup("phase"), Some(b));
        assert_eq!(i.lookup("missing"), None);
        assert_eq!(i.resolve(a).as_deref(), Some("scenario"));
    }
}
