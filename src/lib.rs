//! shmq - a cross-process FIFO message queue over System V IPC
//!
//! Processes on one host attach one shared memory segment and exchange
//! messages through named channels stored in it. Every channel has its own
//! binary semaphore, so operations on one channel are serialized across all
//! processes while different channels never wait on each other.
//!
//! ```no_run
//! use shmq::Queue::MessageQueue;
//!
//! let mut queue = MessageQueue::new();
//! queue.register_channel("jobs")?;
//! queue.allocate("jobs-arena", 64 * 1024)?;
//!
//! queue.write("jobs", "a");
//! assert_eq!(queue.next::<String>("jobs").as_deref(), Some("a"));
//! # Ok::<(), shmq::QueueError>(())
//! ```

pub mod error;
pub mod ffi;

// Module naming follows project convention
#[allow(non_snake_case)]
pub mod Core;
#[allow(non_snake_case)]
pub mod Queue;
#[allow(non_snake_case)]
pub mod Debug {
    pub mod StructDebug;
}

pub use error::{QueueError, Result};
pub use Core::key::{derive_key, IpcKey, SegmentId};
pub use Queue::{MessageQueue, QueueBuilder, QueueConfig};
