//! Error types for shmq

use std::io;
use thiserror::Error;

/// Result type for shmq operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors that can occur while setting up or mutating the queue.
///
/// Steady-state queue operations (`write`/`next`) never return these; they
/// degrade to `false`/`None` instead.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The OS refused to create, attach, or remove a segment or semaphore
    #[error("{op} failed for IPC key {key}: {source}")]
    Resource {
        op: &'static str,
        key: i32,
        #[source]
        source: io::Error,
    },

    /// An explicit IPC key that cannot name a shared resource
    #[error("Invalid IPC key {0}: keys must be positive")]
    InvalidKey(i64),

    /// The segment cannot hold the header, the slot directory and one byte per slot
    #[error("Segment too small: {size} bytes cannot hold {slots} slots (need at least {needed})")]
    SegmentTooSmall {
        size: usize,
        slots: usize,
        needed: usize,
    },

    /// The attached segment was not laid out by this crate
    #[error("Invalid arena layout: {0}")]
    InvalidLayout(String),

    /// `allocate` was called twice on the same handle
    #[error("Arena already allocated on this handle")]
    AlreadyAllocated,

    /// Another handle in this process already owns the segment
    #[error("Segment with IPC key {0} is already attached by this process")]
    AlreadyAttached(i32),

    /// Variable names are stored inline in the slot directory
    #[error("Name too long: max {max} bytes, got {got}")]
    NameTooLong { max: usize, got: usize },

    /// Two distinct names derived the same IPC key
    #[error("Key collision: '{name}' and '{existing}' both derive IPC key {key}")]
    KeyCollision {
        name: String,
        existing: String,
        key: i32,
    },

    /// The value does not fit in its slot, or no free slot is left
    #[error("Capacity exceeded: {needed} bytes requested, {available} available")]
    CapacityExceeded { needed: usize, available: usize },

    /// The value could not be encoded
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    pub(crate) fn resource(op: &'static str, key: i32) -> Self {
        QueueError::Resource {
            op,
            key,
            source: io::Error::last_os_error(),
        }
    }
}
