//! Construction errors.

use thiserror::Error;

/// Rejected configuration passed to [`ChainingHashMapBuilder::build`].
///
/// [`ChainingHashMapBuilder::build`]: crate::ChainingHashMapBuilder::build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("initial capacity must be at least one bucket")]
    ZeroCapacity,
}
