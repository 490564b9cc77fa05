use crate::Core::arena::layout::MAX_NAME_LEN;
use crate::Core::key::{derive_key, IpcKey};
use crate::Core::semaphore::BinarySemaphore;
use crate::error::{QueueError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Process-local map from channel name to its semaphore.
///
/// Channels are only ever added; [`teardown`](ChannelRegistry::teardown)
/// destroys every semaphore at once.
pub struct ChannelRegistry {
    channels: Mutex<HashMap<String, Arc<BinarySemaphore>>>,
    mode: u32,
}

impl ChannelRegistry {
    pub fn new(mode: u32) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            mode,
        }
    }

    /// Open (or create) the semaphore for `name`. A no-op if already registered.
    ///
    /// Opening may wait for another process to initialize the semaphore, so it
    /// runs with the registry unlocked.
    pub fn register(&self, name: &str) -> Result<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(QueueError::NameTooLong {
                max: MAX_NAME_LEN,
                got: name.len(),
            });
        }

        let key = derive_key(name);
        {
            let channels = self.channels.lock();
            if channels.contains_key(name) {
                return Ok(());
            }
            check_collision(&channels, name, key)?;
        }

        let sem = BinarySemaphore::open(key, self.mode)?;

        let mut channels = self.channels.lock();
        // Another thread may have registered it meanwhile; both handles name the same set
        if channels.contains_key(name) {
            return Ok(());
        }
        check_collision(&channels, name, key)?;
        channels.insert(name.to_string(), Arc::new(sem));
        log::debug!("shmq: registered channel '{}' (key={})", name, key);
        Ok(())
    }

    /// The semaphore of `name`, if registered.
    ///
    /// Returned as an `Arc` so callers can block on it without holding the registry lock.
    pub fn get(&self, name: &str) -> Option<Arc<BinarySemaphore>> {
        self.channels.lock().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.lock().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.lock().is_empty()
    }

    /// Destroy every registered semaphore and forget the channels.
    ///
    /// Keeps going past failures and reports the first one.
    pub fn teardown(&self) -> Result<()> {
        let drained: Vec<(String, Arc<BinarySemaphore>)> = self.channels.lock().drain().collect();
        let mut first_err = None;
        for (name, sem) in drained {
            if let Err(e) = sem.remove() {
                log::warn!("shmq: could not remove semaphore of channel '{}': {}", name, e);
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn check_collision(
    channels: &HashMap<String, Arc<BinarySemaphore>>,
    name: &str,
    key: IpcKey,
) -> Result<()> {
    match channels.iter().find(|(_, sem)| sem.key() == key) {
        Some((existing, _)) => Err(QueueError::KeyCollision {
            name: name.to_string(),
            existing: existing.clone(),
            key: key.get(),
        }),
        None => Ok(()),
    }
}
