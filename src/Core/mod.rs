pub mod SharedMemory;
pub mod arena;
pub mod key;
pub mod semaphore;

pub use SharedMemory::{RawHandle, SharedMemoryBackend, SysVSegment};
pub use arena::SharedArena;
pub use key::{derive_key, IpcKey, SegmentId};
pub use semaphore::{AcquireError, BinarySemaphore, SemaphoreGuard};
