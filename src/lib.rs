//! chaining-hashmap: a single-threaded map that resolves collisions by
//! separate chaining and doubles its bucket array when the load factor
//! crosses a fixed threshold.
//!
//! Internal Design:
//!
//! Summary
//! - Storage: `Vec` of buckets, each bucket a `Vec` of owned `(K, V)`
//!   entries. A key's bucket is `hash_one(key) % bucket_count`.
//! - Lookups hash once and scan one chain linearly.
//! - Keys are unique map-wide; inserting a present key replaces its value.
//!
//! Two-phase mutation
//! - Every call that may append an entry first runs the capacity check
//!   (`load_factor() > 0.75` grows the table), then computes the bucket
//!   index against the possibly grown table and places the entry.
//! - Because the check precedes placement, the load factor may sit above
//!   the threshold after an insert. The next appending call repairs it.
//!
//! Growth
//! - The bucket array is moved out, a table of twice the size is
//!   installed, `len` restarts at zero, and every old entry is replayed
//!   through `insert`. Counters are therefore rebuilt by the same code that
//!   maintains them on ordinary inserts.
//! - The bucket count never shrinks; `remove` and `clear` keep it.
//!
//! Statistics
//! - `collision_count`: appends that landed in a non-empty bucket. Updates
//!   of existing keys never count. Reset by `clear`.
//! - `rehash_count`: growth steps, one per rehash. Survives `clear`.
//!
//! Handles
//! - `map[key]`-style access is `get_or_insert_default`, returning `&mut V`
//!   whose borrow ends before the next mutation. The copyable `Handle`
//!   variant carries an epoch and stops resolving after any structural
//!   mutation (new entry, removal, clear, growth).
//!
//! Observability
//! - An optional `Observer` receives `Event`s for construction, placement,
//!   collisions, lookups, removals, growth and clearing. `LogObserver`
//!   forwards them to the `log` facade. The map never depends on it.
//!
//! Notes and non-goals
//! - Single-threaded; no internal synchronization.
//! - No iteration-order guarantees, no shrinking, no serialization.

mod chaining_hash_map;
mod chaining_hash_map_proptest;
mod error;
pub mod observer;

// Public surface
pub use chaining_hash_map::{
    ChainingHashMap, ChainingHashMapBuilder, Handle, Iter, IterMut, DEFAULT_INITIAL_CAPACITY,
    MAX_LOAD_FACTOR,
};
pub use error::BuildError;
pub use observer::{Event, LogObserver, Observer};
