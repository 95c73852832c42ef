use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
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
pub struct Interner {
    map: RwLock<HashMap<Arc<str>, u32, ahash::RandomState>>,
    vec: RwLock<Vec<Arc<str>>>,
}

impl Interner {
    pub fn get_or_intern(&self, s: &str) -> KeyId {
        if let Some(id) = self.get(s) {
            return id;
        }

        let mut map = self.map.write();
        let mut vec = self.vec.write();

        // Another writer may have interned it between the read and write lock.
        if let Some(&id) = map.get(s) {
            return KeyId(id);
        }

        let id = vec.len() as u32;
        let s: Arc<str> = Arc::from(s);
        vec.push(s.clone());
        map.insert(s, id);

        KeyId(id)
    }

    /// Look up an already interned string without inserting it.
    pub fn get(&self, s: &str) -> Option<KeyId> {
        self.map.read().get(s).map(|&id| KeyId(id))
    }

    pub fn resolve(&self, id: KeyId) -> Option<Arc<str>> {
        let vec = self.vec.read();
        vec.get(id.0 as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interner_returns_stable_ids() {
        let interner = Interner::default();
        let a = interner.get_or_intern("scenario");
        let b = interner.get_or_intern("name");
        assert_ne!(a, b);
        assert_eq!(interner.get_or_intern("scenario"), a);
        assert_eq!(interner.get("name"), Some(b));
        assert_eq!(interner.get("missing"), None);
        assert_eq!(interner.resolve(a).as_deref(), Some("scenario"));
    }
}
