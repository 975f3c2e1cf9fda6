//! LRU cache for parsed objects.
//!
//! The read paths that dominate a fetch (closure walks over commits and
//! trees) revisit the same objects many times; a small cache of parsed
//! forms avoids re-inflating and re-parsing them.

use std::num::NonZeroUsize;

use lru::LruCache;
use quay_hash::Oid;

use crate::Object;

/// Bounded cache from object id to parsed object.
#[derive(Debug)]
pub struct ObjectCache {
    inner: LruCache<Oid, Object>,
}

impl ObjectCache {
    /// Create a cache holding up to `capacity` parsed objects.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            inner: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, oid: &Oid) -> Option<&Object> {
        self.inner.get(oid)
    }

    pub fn insert(&mut self, oid: Oid, object: Object) {
        self.inner.put(oid, object);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Blob;
    use quay_hash::HashKind;

    fn blob(n: u8) -> (Oid, Object) {
        let obj = Object::Blob(Blob::from_data(vec![n]));
        let oid = obj.id(HashKind::Sha1).unwrap();
        (oid, obj)
    }

    #[test]
    fn hit_and_miss() {
        let mut cache = ObjectCache::new(4);
        let (oid, obj) = blob(1);
        cache.insert(oid, obj.clone());
        assert_eq!(cache.get(&oid), Some(&obj));

        let (other, _) = blob(2);
        assert!(cache.get(&other).is_none());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut cache = ObjectCache::new(2);
        let (a, obj_a) = blob(1);
        let (b, obj_b) = blob(2);
        let (c, obj_c) = blob(3);
        cache.insert(a, obj_a);
        cache.insert(b, obj_b);
        cache.insert(c, obj_c);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&a).is_none());
        assert!(cache.get(&c).is_some());
    }
}
