//! Optional diagnostic stream for structural events.
//!
//! A map reports construction, placement, lookups, removals, growth and
//! clearing to at most one [`Observer`]. Nothing in the map reads back from
//! the observer; detaching it never changes the map's behavior.

use core::fmt;
use log::Level;

/// `log` target used by [`LogObserver`].
pub const LOG_TARGET: &str = "chaining_hashmap";

/// A single structural event. Borrowed fields point into the map and are
/// only valid for the duration of the `notify` call.
#[derive(Debug)]
pub enum Event<'a, K, V> {
    /// The map was built with `buckets` empty buckets.
    Created { buckets: usize },
    /// A new entry was appended to `bucket`; the map now holds `len` entries.
    Inserted {
        key: &'a K,
        value: &'a V,
        bucket: usize,
        len: usize,
    },
    /// An existing entry's value was replaced in place.
    Updated {
        key: &'a K,
        value: &'a V,
        bucket: usize,
    },
    /// A new entry is about to land in a non-empty bucket.
    Collision { bucket: usize },
    /// Lookup hit.
    Found {
        key: &'a K,
        value: &'a V,
        bucket: usize,
    },
    /// Lookup miss.
    Missed { bucket: usize },
    /// An entry was excised from `bucket`; `len` entries remain.
    Removed {
        key: &'a K,
        value: &'a V,
        bucket: usize,
        len: usize,
    },
    /// Removal of an absent key.
    RemoveMissed { bucket: usize },
    /// Growth is about to replay `len` entries from `from` into `to` buckets.
    RehashStarted { from: usize, to: usize, len: usize },
    /// Growth finished; every entry now lives in one of `buckets` buckets.
    RehashFinished { buckets: usize, len: usize },
    /// All entries were dropped; `buckets` is retained.
    Cleared { buckets: usize },
}

impl<K, V> Event<'_, K, V> {
    /// Events that change the shape of the table rather than a single entry.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Event::Created { .. }
                | Event::RehashStarted { .. }
                | Event::RehashFinished { .. }
                | Event::Cleared { .. }
        )
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Display for Event<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Event::Created { buckets } => write!(f, "[CREATE] {buckets} buckets"),
            Event::Inserted {
                key,
                value,
                bucket,
                len,
            } => write!(f, "[INSERT] {key:?} -> {value:?} (bucket {bucket}, len={len})"),
            Event::Updated { key, value, bucket } => {
                write!(f, "[UPDATE] {key:?} -> {value:?} (bucket {bucket})")
            }
            Event::Collision { bucket } => write!(f, "[COLLISION] bucket {bucket}"),
            Event::Found { key, value, bucket } => {
                write!(f, "[FIND] {key:?} -> {value:?} (bucket {bucket})")
            }
            Event::Missed { bucket } => write!(f, "[FIND] miss (bucket {bucket})"),
            Event::Removed {
                key,
                value,
                bucket,
                len,
            } => write!(f, "[REMOVE] {key:?} -> {value:?} (bucket {bucket}, len={len})"),
            Event::RemoveMissed { bucket } => write!(f, "[REMOVE] miss (bucket {bucket})"),
            Event::RehashStarted { from, to, len } => {
                write!(f, "[REHASH] {from} -> {to} buckets, replaying {len} entries")
            }
            Event::RehashFinished { buckets, len } => {
                write!(f, "[REHASH] done ({buckets} buckets, len={len})")
            }
            Event::Cleared { buckets } => write!(f, "[CLEAR] ({buckets} buckets kept)"),
        }
    }
}

/// Receiver for [`Event`]s. Takes `&self` so read-only lookups can report
/// too; implementations that record use interior mutability.
pub trait Observer<K, V> {
    fn notify(&self, event: &Event<'_, K, V>);
}

impl<K, V, F> Observer<K, V> for F
where
    F: Fn(&Event<'_, K, V>),
{
    fn notify(&self, event: &Event<'_, K, V>) {
        self(event)
    }
}

/// Forwards every event to the `log` facade under [`LOG_TARGET`].
///
/// Structural events go out at `debug`, per-entry events at `trace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl<K: fmt::Debug, V: fmt::Debug> Observer<K, V> for LogObserver {
    fn notify(&self, event: &Event<'_, K, V>) {
        let level = if event.is_structural() {
            Level::Debug
        } else {
            Level::Trace
        };
        log::log!(target: LOG_TARGET, level, "{event}");
    }
}

#[inline]
pub(crate) fn emit<K, V>(observer: &Option<Box<dyn Observer<K, V>>>, event: Event<'_, K, V>) {
    if let Some(o) = observer {
        o.notify(&event);
    }
}
