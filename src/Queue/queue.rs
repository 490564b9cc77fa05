use super::builder::QueueConfig;
use super::critical;
use super::registry::ChannelRegistry;
use crate::Core::arena::SharedArena;
use crate::Core::key::SegmentId;
use crate::error::{QueueError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;

/// A FIFO message queue shared between processes through one System V segment.
///
/// Each process builds exactly one handle per segment at start-up and passes it
/// by reference to whoever needs queue access. The handle is movable but not
/// cloneable; dropping it (or calling [`close`](MessageQueue::close)) destroys
/// every registered channel semaphore and removes the segment.
///
/// The handle is `Sync`: threads of one process may share it, and the channel
/// semaphores serialize them the same way they serialize processes.
pub struct MessageQueue {
    arena: Option<SharedArena>,
    registry: ChannelRegistry,
    config: QueueConfig,
    closed: bool,
}

impl MessageQueue {
    /// A handle with the default configuration and no segment attached yet.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            arena: None,
            registry: ChannelRegistry::new(config.mode),
            config,
            closed: false,
        }
    }

    /// Attach the shared segment, creating it with `size` bytes if absent.
    ///
    /// `segment` may be a numeric key (`4242`, `"4242"`) or a name that is hashed
    /// into one. Fails if the OS refuses the segment, or if this process
    /// already holds it.
    pub fn allocate(&mut self, segment: impl Into<SegmentId>, size: usize) -> Result<()> {
        if self.arena.is_some() {
            return Err(QueueError::AlreadyAllocated);
        }
        let segment = segment.into();
        let arena = SharedArena::allocate(&segment, size, self.config.slots, self.config.mode)?;
        log::debug!(
            "shmq: arena '{}' ready: {} slots of {} bytes",
            segment,
            arena.slot_count(),
            arena.slot_capacity()
        );
        self.arena = Some(arena);
        Ok(())
    }

    /// Open the semaphore of `channel`. Registering twice is the same as once.
    pub fn register_channel(&self, channel: &str) -> Result<()> {
        self.registry.register(channel)
    }

    /// Append `message` to `channel`. Returns whether it was stored.
    ///
    /// `false` when the channel is unregistered, the arena is not allocated, the
    /// lock cannot be taken, the stored state is not a queue, or the queue no
    /// longer fits its slot.
    pub fn write<T: Serialize + ?Sized>(&self, channel: &str, message: &T) -> bool {
        let message = match serde_json::to_value(message) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("shmq: message for '{}' not serializable: {}", channel, e);
                return false;
            }
        };
        self.with_lock(channel, false, |arena| {
            let mut queue = match load(arena, channel) {
                Ok(Some(queue)) => queue,
                Ok(None) => VecDeque::new(),
                Err(e) => {
                    log::warn!("shmq: refusing write to '{}': stored queue unreadable: {}", channel, e);
                    return false;
                }
            };
            queue.push_back(message);
            store(arena, channel, &queue)
        })
    }

    /// Remove and return the oldest message of `channel`.
    ///
    /// `None` when the channel is empty or unregistered, the lock cannot be
    /// taken, the oldest message does not decode as `T`, or the shortened queue
    /// could not be written back. In the last two cases the message stays queued.
    pub fn next<T: DeserializeOwned>(&self, channel: &str) -> Option<T> {
        self.next_if(channel, |_: &T| true)
    }

    /// Like [`next`](Self::next), but only dequeues when `accept` approves the
    /// oldest message. A rejected message stays at the head of the queue.
    pub fn next_if<T, P>(&self, channel: &str, accept: P) -> Option<T>
    where
        T: DeserializeOwned,
        P: FnOnce(&T) -> bool,
    {
        self.with_lock(channel, None, |arena| {
            let mut queue = load(arena, channel).ok()??;
            let front = queue.front()?;
            let message = match <T as serde::Deserialize>::deserialize(front) {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("shmq: head of '{}' does not decode: {}", channel, e);
                    return None;
                }
            };
            if !accept(&message) {
                return None;
            }
            queue.pop_front();
            if store(arena, channel, &queue) {
                Some(message)
            } else {
                None
            }
        })
    }

    /// Number of messages waiting in `channel`. 0 when it cannot be inspected.
    pub fn len(&self, channel: &str) -> usize {
        self.with_lock(channel, 0, |arena| match load(arena, channel) {
            Ok(Some(queue)) => queue.len(),
            _ => 0,
        })
    }

    pub fn is_empty(&self, channel: &str) -> bool {
        self.len(channel) == 0
    }

    /// Run `body` against the arena while holding the semaphore of `channel`.
    ///
    /// Returns `default` without running `body` if the channel is unregistered,
    /// the arena is not allocated, or the lock cannot be taken. The lock is
    /// released however `body` exits.
    pub fn with_lock<R, F>(&self, channel: &str, default: R, body: F) -> R
    where
        F: FnOnce(&SharedArena) -> R,
    {
        let arena = match &self.arena {
            Some(arena) => arena,
            None => return default,
        };
        critical::with_lock(&self.registry, channel, self.config.lock_timeout, default, || {
            body(arena)
        })
    }

    pub fn is_registered(&self, channel: &str) -> bool {
        self.registry.contains(channel)
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn arena(&self) -> Option<&SharedArena> {
        self.arena.as_ref()
    }

    pub fn is_allocated(&self) -> bool {
        self.arena.is_some()
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.config.lock_timeout
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Destroy every channel semaphore, then remove and detach the segment.
    ///
    /// Same as dropping the handle, but reports failures.
    pub fn close(mut self) -> Result<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let sems = self.registry.teardown();
        let segment = match self.arena.take() {
            Some(arena) => arena.remove(),
            None => Ok(()),
        };
        sems.and(segment)
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MessageQueue {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            log::warn!("shmq: teardown incomplete: {}", e);
        }
    }
}

type Stored = VecDeque<serde_json::Value>;

fn load(arena: &SharedArena, channel: &str) -> std::result::Result<Option<Stored>, serde_json::Error> {
    arena.try_get_variable(channel)
}

fn store(arena: &SharedArena, channel: &str, queue: &Stored) -> bool {
    match arena.set_variable(channel, queue) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("shmq: write-back to '{}' lost: {}", channel, e);
            false
        }
    }
}
