//! ChainingHashMap: separate-chaining table with load-factor driven doubling.

use crate::error::BuildError;
use crate::observer::{emit, Event, Observer};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::mem;
use core::sync::atomic::{AtomicU64, Ordering};
use hashbrown::hash_map::DefaultHashBuilder;

/// Bucket count used by [`ChainingHashMap::new`] and the default builder.
pub const DEFAULT_INITIAL_CAPACITY: usize = 8;

/// Growth threshold on `len / bucket_count`, checked before placement.
pub const MAX_LOAD_FACTOR: f32 = 0.75;

// MAX_LOAD_FACTOR as an exact ratio; the growth check stays in integers so
// it does not lose precision once `len` no longer fits an f32 mantissa.
const LOAD_NUMERATOR: u128 = 3;
const LOAD_DENOMINATOR: u128 = 4;

// Source of per-map identities carried by handles.
static NEXT_MAP_ID: AtomicU64 = AtomicU64::new(0);

fn exceeds_max_load(len: usize, buckets: usize) -> bool {
    len as u128 * LOAD_DENOMINATOR > buckets as u128 * LOAD_NUMERATOR
}

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
}

type Bucket<K, V> = Vec<Entry<K, V>>;

fn empty_buckets<K, V>(count: usize) -> Vec<Bucket<K, V>> {
    let mut buckets = Vec::with_capacity(count);
    buckets.resize_with(count, Vec::new);
    buckets
}

/// Cursor to one entry. Valid until the next structural mutation of the map
/// that issued it (new-entry insert, remove, clear, or growth); in-place
/// value updates keep it valid. Stale handles, and handles presented to a
/// map other than the issuer, resolve to `None`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle {
    map: u64,
    bucket: usize,
    position: usize,
    epoch: u64,
}

impl Handle {
    /// Bucket the entry lived in when the handle was issued.
    pub fn bucket(&self) -> usize {
        self.bucket
    }

    pub fn key<'a, K, V, S>(&self, map: &'a ChainingHashMap<K, V, S>) -> Option<&'a K> {
        map.resolve(*self).map(|e| &e.key)
    }

    pub fn value<'a, K, V, S>(&self, map: &'a ChainingHashMap<K, V, S>) -> Option<&'a V> {
        map.resolve(*self).map(|e| &e.value)
    }

    pub fn value_mut<'a, K, V, S>(
        &self,
        map: &'a mut ChainingHashMap<K, V, S>,
    ) -> Option<&'a mut V> {
        map.resolve_mut(*self).map(|e| &mut e.value)
    }
}

/// Separate-chaining map. Buckets are `Vec`s of owned entries; a key's
/// bucket is `hasher.hash_one(key) % bucket_count`.
pub struct ChainingHashMap<K, V, S = DefaultHashBuilder> {
    hasher: S,
    buckets: Vec<Bucket<K, V>>,
    len: usize,
    collisions: usize,
    rehashes: usize,
    id: u64,
    // Bumped on every structural mutation; handles carry the value they saw.
    epoch: u64,
    observer: Option<Box<dyn Observer<K, V>>>,
}

/// Configuration for a [`ChainingHashMap`]: initial bucket count, hasher and
/// an optional observer.
pub struct ChainingHashMapBuilder<K, V, S = DefaultHashBuilder> {
    capacity: usize,
    hasher: S,
    observer: Option<Box<dyn Observer<K, V>>>,
}

impl<K, V> ChainingHashMapBuilder<K, V> {
    pub fn new() -> Self {
        Self {
            capacity: DEFAULT_INITIAL_CAPACITY,
            hasher: DefaultHashBuilder::default(),
            observer: None,
        }
    }
}

impl<K, V> Default for ChainingHashMapBuilder<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ChainingHashMapBuilder<K, V, S> {
    /// Initial number of buckets. Zero is rejected by [`build`](Self::build).
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn hasher<T>(self, hasher: T) -> ChainingHashMapBuilder<K, V, T> {
        ChainingHashMapBuilder {
            capacity: self.capacity,
            hasher,
            observer: self.observer,
        }
    }

    pub fn observer<O>(mut self, observer: O) -> Self
    where
        O: Observer<K, V> + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn build(self) -> Result<ChainingHashMap<K, V, S>, BuildError> {
        if self.capacity == 0 {
            return Err(BuildError::ZeroCapacity);
        }
        Ok(ChainingHashMap::from_parts(
            self.capacity,
            self.hasher,
            self.observer,
        ))
    }
}

impl<K, V> ChainingHashMap<K, V> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_CAPACITY)
    }

    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultHashBuilder::default())
    }

    pub fn builder() -> ChainingHashMapBuilder<K, V> {
        ChainingHashMapBuilder::new()
    }
}

impl<K, V> Default for ChainingHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> ChainingHashMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_capacity_and_hasher(DEFAULT_INITIAL_CAPACITY, hasher)
    }

    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Self {
        assert!(capacity > 0, "{}", BuildError::ZeroCapacity);
        Self::from_parts(capacity, hasher, None)
    }

    fn from_parts(
        capacity: usize,
        hasher: S,
        observer: Option<Box<dyn Observer<K, V>>>,
    ) -> Self {
        let map = Self {
            hasher,
            buckets: empty_buckets(capacity),
            len: 0,
            collisions: 0,
            rehashes: 0,
            id: NEXT_MAP_ID.fetch_add(1, Ordering::Relaxed),
            epoch: 0,
            observer,
        };
        emit(&map.observer, Event::Created { buckets: capacity });
        map
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current number of buckets. Starts at the initial capacity and only
    /// ever doubles.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// `len / bucket_count`, computed on every call. Diagnostic only: the
    /// growth check compares the exact integer ratio, so rounding here above
    /// 2^24 entries never delays growth.
    pub fn load_factor(&self) -> f32 {
        self.len as f32 / self.buckets.len() as f32
    }

    pub fn max_load_factor(&self) -> f32 {
        MAX_LOAD_FACTOR
    }

    /// Number of new entries appended to an already non-empty bucket,
    /// including those seen while replaying during growth. Reset by `clear`.
    pub fn collision_count(&self) -> usize {
        self.collisions
    }

    /// Number of growth steps over the map's lifetime. Survives `clear`.
    pub fn rehash_count(&self) -> usize {
        self.rehashes
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Attach an observer, returning the one it replaces.
    pub fn set_observer<O>(&mut self, observer: O) -> Option<Box<dyn Observer<K, V>>>
    where
        O: Observer<K, V> + 'static,
    {
        self.observer.replace(Box::new(observer))
    }

    pub fn detach_observer(&mut self) -> Option<Box<dyn Observer<K, V>>> {
        self.observer.take()
    }

    /// Drop every entry. Bucket count and `rehash_count` are kept;
    /// `collision_count` restarts at zero.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.len = 0;
        self.collisions = 0;
        self.bump_epoch();
        emit(
            &self.observer,
            Event::Cleared {
                buckets: self.buckets.len(),
            },
        );
    }

    /// Iterate over entries in bucket order. The order is unspecified and
    /// changes after growth.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            buckets: self.buckets.iter(),
            current: Default::default(),
            remaining: self.len,
        }
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            buckets: self.buckets.iter_mut(),
            current: Default::default(),
            remaining: self.len,
        }
    }

    fn bump_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn handle_at(&self, bucket: usize, position: usize) -> Handle {
        Handle {
            map: self.id,
            bucket,
            position,
            epoch: self.epoch,
        }
    }

    fn resolve(&self, h: Handle) -> Option<&Entry<K, V>> {
        if h.map != self.id || h.epoch != self.epoch {
            return None;
        }
        self.buckets.get(h.bucket)?.get(h.position)
    }

    fn resolve_mut(&mut self, h: Handle) -> Option<&mut Entry<K, V>> {
        if h.map != self.id || h.epoch != self.epoch {
            return None;
        }
        self.buckets.get_mut(h.bucket)?.get_mut(h.position)
    }

    fn needs_growth(&self) -> bool {
        exceeds_max_load(self.len, self.buckets.len())
    }

    // Append without scanning; the caller has already ruled out an equal key.
    fn append(&mut self, bucket: usize, key: K, value: V) -> usize {
        let chain = &mut self.buckets[bucket];
        if !chain.is_empty() {
            self.collisions += 1;
            emit(&self.observer, Event::Collision { bucket });
        }
        chain.push(Entry { key, value });
        self.len += 1;
        self.epoch = self.epoch.wrapping_add(1);

        let position = chain.len() - 1;
        let entry = &chain[position];
        emit(
            &self.observer,
            Event::Inserted {
                key: &entry.key,
                value: &entry.value,
                bucket,
                len: self.len,
            },
        );
        position
    }
}

impl<K, V, S> ChainingHashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn bucket_index<Q>(&self, q: &Q) -> usize
    where
        Q: ?Sized + Hash,
    {
        (self.hasher.hash_one(q) % self.buckets.len() as u64) as usize
    }

    fn position<Q>(&self, bucket: usize, q: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.buckets[bucket]
            .iter()
            .position(|e| e.key.borrow() == q)
    }

    /// Insert or update. Growth, if due, happens before the bucket index is
    /// computed. Returns the replaced value when `key` was already present.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        if self.needs_growth() {
            self.rehash();
        }

        let bucket = self.bucket_index(&key);
        if let Some(position) = self.position(bucket, &key) {
            let entry = &mut self.buckets[bucket][position];
            let old = mem::replace(&mut entry.value, value);
            emit(
                &self.observer,
                Event::Updated {
                    key: &entry.key,
                    value: &entry.value,
                    bucket,
                },
            );
            return Some(old);
        }

        self.append(bucket, key, value);
        None
    }

    pub fn find<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let bucket = self.bucket_index(q);
        match self.position(bucket, q) {
            Some(position) => {
                let entry = &self.buckets[bucket][position];
                emit(
                    &self.observer,
                    Event::Found {
                        key: &entry.key,
                        value: &entry.value,
                        bucket,
                    },
                );
                Some(&entry.value)
            }
            None => {
                emit(&self.observer, Event::Missed { bucket });
                None
            }
        }
    }

    pub fn find_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let bucket = self.bucket_index(q);
        match self.position(bucket, q) {
            Some(position) => {
                let entry = &mut self.buckets[bucket][position];
                emit(
                    &self.observer,
                    Event::Found {
                        key: &entry.key,
                        value: &entry.value,
                        bucket,
                    },
                );
                Some(&mut entry.value)
            }
            None => {
                emit(&self.observer, Event::Missed { bucket });
                None
            }
        }
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let bucket = self.bucket_index(q);
        self.position(bucket, q).is_some()
    }

    /// Locate an existing key without inserting.
    pub fn handle<Q>(&self, q: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let bucket = self.bucket_index(q);
        self.position(bucket, q)
            .map(|position| self.handle_at(bucket, position))
    }

    /// Remove `q`'s entry and return its value. Remaining entries of the
    /// bucket may be reordered. Never shrinks the table.
    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(q).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let bucket = self.bucket_index(q);
        let Some(position) = self.position(bucket, q) else {
            emit(&self.observer, Event::RemoveMissed { bucket });
            return None;
        };

        let entry = self.buckets[bucket].swap_remove(position);
        self.len -= 1;
        self.bump_epoch();
        emit(
            &self.observer,
            Event::Removed {
                key: &entry.key,
                value: &entry.value,
                bucket,
                len: self.len,
            },
        );
        Some((entry.key, entry.value))
    }

    /// Handle to `key`'s entry, appending one built by `default` if absent.
    ///
    /// An existing key is returned without any capacity check. For a new key
    /// growth completes first and the bucket is recomputed against the grown
    /// table, so the handle is never issued into storage about to move.
    /// `default` runs only when an entry is appended.
    pub fn entry_handle_with<F>(&mut self, key: K, default: F) -> Handle
    where
        F: FnOnce() -> V,
    {
        let bucket = self.bucket_index(&key);
        if let Some(position) = self.position(bucket, &key) {
            return self.handle_at(bucket, position);
        }

        if self.needs_growth() {
            self.rehash();
        }
        let bucket = self.bucket_index(&key);
        let position = self.append(bucket, key, default());
        self.handle_at(bucket, position)
    }

    pub fn entry_handle(&mut self, key: K) -> Handle
    where
        V: Default,
    {
        self.entry_handle_with(key, V::default)
    }

    pub fn get_or_insert_with<F>(&mut self, key: K, default: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let h = self.entry_handle_with(key, default);
        &mut self.buckets[h.bucket][h.position].value
    }

    /// `map[key]`-style access: the value for `key`, inserting `V::default()`
    /// first if the key is absent.
    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    // Move the table out, double it, and replay every entry through `insert`
    // so `len` and collision accounting are rebuilt against the new layout.
    fn rehash(&mut self) {
        let from = self.buckets.len();
        let to = from * 2;
        emit(
            &self.observer,
            Event::RehashStarted {
                from,
                to,
                len: self.len,
            },
        );

        self.rehashes += 1;
        let old = mem::replace(&mut self.buckets, empty_buckets(to));
        self.len = 0;
        self.bump_epoch();
        for entry in old.into_iter().flatten() {
            self.insert(entry.key, entry.value);
        }

        emit(
            &self.observer,
            Event::RehashFinished {
                buckets: to,
                len: self.len,
            },
        );
    }

    /// Structural self-check used by tests: `len` matches the chains, every
    /// entry sits in the bucket its hash selects, and no key appears twice.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let total: usize = self.buckets.iter().map(Vec::len).sum();
        assert_eq!(total, self.len, "len must equal the sum of chain lengths");
        assert!(!self.buckets.is_empty(), "bucket count must stay >= 1");
        for (index, chain) in self.buckets.iter().enumerate() {
            for (i, entry) in chain.iter().enumerate() {
                assert_eq!(self.bucket_index(&entry.key), index, "entry in wrong bucket");
                assert!(
                    chain[i + 1..].iter().all(|other| other.key != entry.key),
                    "duplicate key in bucket {index}"
                );
            }
        }
    }
}

impl<K, V, S> fmt::Debug for ChainingHashMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Extend<(K, V)> for ChainingHashMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V> FromIterator<(K, V)> for ChainingHashMap<K, V>
where
    K: Eq + Hash,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<'a, K, V, S> IntoIterator for &'a ChainingHashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over shared entries of a [`ChainingHashMap`].
pub struct Iter<'a, K, V> {
    buckets: core::slice::Iter<'a, Bucket<K, V>>,
    current: core::slice::Iter<'a, Entry<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.current.next() {
                self.remaining -= 1;
                return Some((&e.key, &e.value));
            }
            self.current = self.buckets.next()?.iter();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// Iterator over mutable entries of a [`ChainingHashMap`].
pub struct IterMut<'a, K, V> {
    buckets: core::slice::IterMut<'a, Bucket<K, V>>,
    current: core::slice::IterMut<'a, Entry<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.current.next() {
                self.remaining -= 1;
                return Some((&e.key, &mut e.value));
            }
            self.current = self.buckets.next()?.iter_mut();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeSet;
    use std::hash::Hasher;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct ConstBuildHasher;
    struct ConstHasher;
    impl BuildHasher for ConstBuildHasher {
        type Hasher = ConstHasher;
        fn build_hasher(&self) -> Self::Hasher {
            ConstHasher
        }
    }
    impl Hasher for ConstHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            0
        } // every key lands in bucket 0
    }

    /// Invariant: updating an existing key replaces the value in place,
    /// keeps `len`, and does not count as a collision.
    #[test]
    fn update_replaces_without_duplicating() {
        let mut m: ChainingHashMap<String, i32> = ChainingHashMap::new();
        assert_eq!(m.insert("a".to_string(), 1), None);
        assert_eq!(m.insert("a".to_string(), 2), Some(1));
        assert_eq!(m.len(), 1);
        assert_eq!(m.find("a"), Some(&2));
        assert_eq!(m.collision_count(), 0);
        m.assert_consistent();
    }

    /// Invariant: borrowed lookup works (store `String`, query with `&str`).
    #[test]
    fn borrowed_lookup_with_str() {
        let mut m: ChainingHashMap<String, i32> = ChainingHashMap::new();
        m.insert("hello".to_string(), 1);
        assert!(m.contains_key("hello"));
        assert!(!m.contains_key("world"));
        assert_eq!(m.find("hello"), Some(&1));
        assert!(m.find("world").is_none());
        assert_eq!(m.remove("hello"), Some(1));
        assert!(m.is_empty());
    }

    /// Invariant: a constant hasher chains everything into one bucket and
    /// equality still resolves each key; every append after the first counts.
    #[test]
    fn collision_handling_with_const_hasher() {
        let mut m: ChainingHashMap<String, i32, ConstBuildHasher> =
            ChainingHashMap::with_capacity_and_hasher(4, ConstBuildHasher);
        m.insert("a".to_string(), 1);
        m.insert("b".to_string(), 2);
        m.insert("c".to_string(), 3);

        assert_eq!(m.collision_count(), 2);
        assert_eq!(m.find("a"), Some(&1));
        assert_eq!(m.find("b"), Some(&2));
        assert_eq!(m.find("c"), Some(&3));
        assert_eq!(m.buckets[0].len(), 3);

        assert_eq!(m.remove("a"), Some(1));
        assert_eq!(m.find("b"), Some(&2));
        assert_eq!(m.find("c"), Some(&3));
        m.assert_consistent();
    }

    /// Invariant: with 2 buckets the third distinct insert grows exactly once
    /// to 4 buckets before placing, and earlier entries survive the replay.
    #[test]
    fn third_insert_into_two_buckets_grows_once() {
        let mut m: ChainingHashMap<&'static str, i32> = ChainingHashMap::with_capacity(2);
        m.insert("x", 1);
        m.insert("y", 2);
        assert_eq!(m.bucket_count(), 2);
        assert_eq!(m.rehash_count(), 0);
        // Over threshold after placement; tolerated until the next insert.
        assert_eq!(m.load_factor(), 1.0);

        m.insert("z", 3);
        assert_eq!(m.bucket_count(), 4);
        assert_eq!(m.rehash_count(), 1);
        assert_eq!(m.find(&"x"), Some(&1));
        assert_eq!(m.find(&"y"), Some(&2));
        assert_eq!(m.find(&"z"), Some(&3));
        m.assert_consistent();
    }

    /// Invariant: the capacity check precedes placement for updates too, so an
    /// update issued while over threshold still grows the table.
    #[test]
    fn update_while_over_threshold_grows_first() {
        let mut m: ChainingHashMap<u32, u32> = ChainingHashMap::with_capacity(1);
        m.insert(1, 10);
        assert_eq!(m.bucket_count(), 1);
        assert_eq!(m.insert(1, 11), Some(10));
        assert_eq!(m.bucket_count(), 2);
        assert_eq!(m.rehash_count(), 1);
        assert_eq!(m.len(), 1);
    }

    /// Invariant: indexed access on a new key grows before placing and writes
    /// through the post-growth bucket.
    #[test]
    fn get_or_insert_default_grows_before_placement() {
        let mut m: ChainingHashMap<&'static str, i32> = ChainingHashMap::with_capacity(2);
        m.insert("a", 1);
        m.insert("b", 2);
        *m.get_or_insert_default("c") += 5;

        assert_eq!(m.rehash_count(), 1);
        assert_eq!(m.bucket_count(), 4);
        assert_eq!(m.find(&"c"), Some(&5));
        assert_eq!(m.len(), 3);
        m.assert_consistent();
    }

    /// Invariant: indexed access on an existing key skips the capacity check.
    #[test]
    fn get_or_insert_default_existing_key_never_grows() {
        let mut m: ChainingHashMap<&'static str, i32> = ChainingHashMap::with_capacity(2);
        m.insert("a", 1);
        m.insert("b", 2);
        *m.get_or_insert_default("a") = 7;

        assert_eq!(m.rehash_count(), 0);
        assert_eq!(m.bucket_count(), 2);
        assert_eq!(m.find(&"a"), Some(&7));
    }

    /// Invariant: `get_or_insert_with` runs its closure only when appending.
    #[test]
    fn get_or_insert_with_is_lazy() {
        let mut m: ChainingHashMap<String, String> = ChainingHashMap::new();
        let calls = Cell::new(0);

        m.get_or_insert_with("k".to_string(), || {
            calls.set(calls.get() + 1);
            "v".to_string()
        });
        assert_eq!(calls.get(), 1);

        let v = m.get_or_insert_with("k".to_string(), || {
            calls.set(calls.get() + 1);
            "v2".to_string()
        });
        assert_eq!(v, "v");
        assert_eq!(calls.get(), 1, "default must not run for an existing key");
    }

    /// Invariant: handle access yields references while no structural change
    /// happened; in-place updates keep it valid.
    #[test]
    fn handle_access_and_mutation() {
        let mut m: ChainingHashMap<String, i32> = ChainingHashMap::new();
        let h = m.entry_handle("k1".to_string());
        assert_eq!(h.key(&m), Some(&"k1".to_string()));
        assert_eq!(h.value(&m), Some(&0));

        *h.value_mut(&mut m).unwrap() += 5;
        assert_eq!(h.value(&m), Some(&5));

        // Update of an existing key is not structural.
        m.insert("k1".to_string(), 9);
        assert_eq!(h.value(&m), Some(&9));
        assert_eq!(m.handle("k1"), Some(h));
    }

    /// Invariant: insert of a new key, remove, clear and growth each
    /// invalidate outstanding handles.
    #[test]
    fn structural_mutations_invalidate_handles() {
        let mut m: ChainingHashMap<u32, u32> = ChainingHashMap::with_capacity(64);
        let h = m.entry_handle(1);
        m.insert(2, 2);
        assert!(h.value(&m).is_none(), "new entry invalidates");

        let h = m.handle(&1).unwrap();
        assert_eq!(m.remove(&2), Some(2));
        assert!(h.value(&m).is_none(), "remove invalidates");

        let h = m.handle(&1).unwrap();
        m.clear();
        assert!(h.key(&m).is_none(), "clear invalidates");

        let mut small: ChainingHashMap<u32, u32> = ChainingHashMap::with_capacity(1);
        small.insert(1, 1);
        let h = small.handle(&1).unwrap();
        small.insert(1, 2); // over threshold: grows before updating
        assert!(h.value(&small).is_none(), "growth invalidates");
    }

    /// Invariant: a handle resolves only against the map that issued it, even
    /// when another map has the same layout and mutation history.
    #[test]
    fn handle_from_other_map_does_not_resolve() {
        let mut a: ChainingHashMap<u32, u32, ConstBuildHasher> =
            ChainingHashMap::with_capacity_and_hasher(4, ConstBuildHasher);
        let mut b: ChainingHashMap<u32, u32, ConstBuildHasher> =
            ChainingHashMap::with_capacity_and_hasher(4, ConstBuildHasher);
        let ha = a.entry_handle(1);
        let hb = b.entry_handle(1);
        assert_eq!(ha.value(&a), Some(&0));
        assert_eq!(hb.value(&b), Some(&0));

        assert_ne!(ha, hb);
        assert!(ha.value(&b).is_none());
        assert!(ha.value_mut(&mut b).is_none());
        assert!(hb.key(&a).is_none());
    }

    /// Invariant: the growth check is the exact ratio 3/4, including counts
    /// where `len as f32` rounds down onto the threshold.
    #[test]
    fn growth_check_is_exact_at_large_counts() {
        let buckets = 1usize << 26;
        let threshold = buckets / 4 * 3;
        assert!(!exceeds_max_load(threshold, buckets));
        assert!(exceeds_max_load(threshold + 1, buckets));
        // f32 cannot tell these apart; the integer check can.
        assert_eq!((threshold + 1) as f32, threshold as f32);

        assert!(!exceeds_max_load(3, 4));
        assert!(exceeds_max_load(4, 4));
        assert!(exceeds_max_load(1, 1));
        assert!(!exceeds_max_load(0, 1));
    }

    /// Invariant: a handle points at the bucket its key hashes to.
    #[test]
    fn handle_reports_bucket() {
        let mut m: ChainingHashMap<String, i32, ConstBuildHasher> =
            ChainingHashMap::with_capacity_and_hasher(8, ConstBuildHasher);
        let h = m.entry_handle("a".to_string());
        assert_eq!(h.bucket(), 0);
    }

    /// Invariant: after remove, the key is absent and reinserting it observes
    /// the new value.
    #[test]
    fn remove_then_reinsert_same_key_yields_new_value() {
        let mut m: ChainingHashMap<String, i32> = ChainingHashMap::new();
        m.insert("k".to_string(), 1);

        assert_eq!(m.remove_entry("k"), Some(("k".to_string(), 1)));
        assert!(!m.contains_key("k"));
        assert_eq!(m.remove("k"), None);

        m.insert("k".to_string(), 2);
        assert_eq!(m.find("k"), Some(&2));
        assert_eq!(m.len(), 1);
    }

    /// Invariant: iteration yields each live entry exactly once; `iter_mut`
    /// updates values as seen by later lookups.
    #[test]
    fn iteration_and_mutation() {
        let mut m: ChainingHashMap<String, i32> = ChainingHashMap::with_capacity(2);
        let keys = ["k1", "k2", "k3", "k4", "k5"];
        for (i, k) in keys.iter().enumerate() {
            m.insert((*k).to_string(), i as i32);
        }

        assert_eq!(m.iter().len(), keys.len());
        let seen: BTreeSet<String> = m.iter().map(|(k, _)| k.clone()).collect();
        let expected: BTreeSet<String> = keys.iter().map(|s| (*s).to_string()).collect();
        assert_eq!(seen, expected);

        for (_k, v) in m.iter_mut() {
            *v += 10;
        }
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(m.find(*k), Some(&(i as i32 + 10)));
        }
    }

    /// Invariant: clear empties the map, resets collisions, and keeps bucket
    /// count and rehash history; a second clear changes nothing.
    #[test]
    fn clear_keeps_capacity_and_history() {
        let mut m: ChainingHashMap<u32, u32, ConstBuildHasher> =
            ChainingHashMap::with_capacity_and_hasher(2, ConstBuildHasher);
        for i in 0..5 {
            m.insert(i, i);
        }
        let buckets = m.bucket_count();
        let rehashes = m.rehash_count();
        assert!(rehashes > 0);
        assert!(m.collision_count() > 0);

        m.clear();
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.len(), 0);
        assert_eq!(m.collision_count(), 0);
        assert_eq!(m.bucket_count(), buckets);
        assert_eq!(m.rehash_count(), rehashes);
        for i in 0..5 {
            assert!(m.find(&i).is_none());
        }
        m.assert_consistent();
    }

    /// Invariant: replay goes through the insert path, so collisions in the
    /// grown table are added to the running counter.
    #[test]
    fn rehash_replay_recounts_collisions() {
        let mut m: ChainingHashMap<u32, u32, ConstBuildHasher> =
            ChainingHashMap::with_capacity_and_hasher(1, ConstBuildHasher);
        m.insert(1, 1);
        m.insert(2, 2); // grows 1 -> 2; replaying 1 has no collision; 2 collides
        assert_eq!(m.rehash_count(), 1);
        assert_eq!(m.collision_count(), 1);

        m.insert(3, 3); // grows 2 -> 4; replay of 1,2 adds one; 3 adds one
        assert_eq!(m.rehash_count(), 2);
        assert_eq!(m.bucket_count(), 4);
        assert_eq!(m.collision_count(), 3);
    }

    /// Invariant: zero buckets is rejected by the builder and panics in the
    /// shorthand constructor.
    #[test]
    fn zero_capacity_rejected() {
        let r = ChainingHashMap::<u8, u8>::builder().capacity(0).build();
        assert_eq!(r.err(), Some(BuildError::ZeroCapacity));

        let res = std::panic::catch_unwind(|| ChainingHashMap::<u8, u8>::with_capacity(0));
        assert!(res.is_err());
    }

    /// Invariant: the builder's observer receives creation and growth events.
    #[test]
    fn builder_wires_observer() {
        struct Counter(Rc<RefCell<Vec<bool>>>);
        impl Observer<u32, u32> for Counter {
            fn notify(&self, event: &Event<'_, u32, u32>) {
                self.0.borrow_mut().push(event.is_structural());
            }
        }

        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut m = ChainingHashMap::<u32, u32>::builder()
            .capacity(1)
            .hasher(ConstBuildHasher)
            .observer(Counter(seen.clone()))
            .build()
            .unwrap();
        assert_eq!(*RefCell::borrow(&seen), vec![true]);

        m.insert(1, 1);
        m.insert(2, 2);
        let structural = RefCell::borrow(&seen).iter().filter(|s| **s).count();
        // Created + RehashStarted + RehashFinished
        assert_eq!(structural, 3);

        assert!(m.detach_observer().is_some());
        let before = RefCell::borrow(&seen).len();
        m.insert(3, 3);
        assert_eq!(RefCell::borrow(&seen).len(), before);
    }

    /// Invariant: `len()`/`is_empty()` track live entries across inserts,
    /// updates and removals; removing an absent key changes nothing.
    #[test]
    fn len_and_is_empty_behaviors() {
        let mut m: ChainingHashMap<String, i32> = ChainingHashMap::new();
        assert_eq!(m.len(), 0);
        assert!(m.is_empty());

        m.insert("a".to_string(), 1);
        m.insert("a".to_string(), 2);
        assert_eq!(m.len(), 1);

        m.insert("b".to_string(), 2);
        assert_eq!(m.len(), 2);

        assert_eq!(m.remove("zz"), None);
        assert_eq!(m.len(), 2);

        m.remove("a");
        m.remove("b");
        assert_eq!(m.len(), 0);
        assert!(m.is_empty());
    }

    #[test]
    fn debug_and_collect() {
        let m: ChainingHashMap<&'static str, i32> = [("a", 1)].into_iter().collect();
        assert_eq!(format!("{m:?}"), "{\"a\": 1}");
    }
}
