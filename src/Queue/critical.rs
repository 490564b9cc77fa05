use super::registry::ChannelRegistry;
use crate::Core::semaphore::AcquireError;
use std::time::Duration;

/// Run `body` while holding the semaphore of `channel`.
///
/// Returns `default` without running `body` when the channel is not registered
/// or the semaphore cannot be taken. The semaphore is released on every exit
/// path of `body`, including a panic.
pub(crate) fn with_lock<R, F>(
    registry: &ChannelRegistry,
    channel: &str,
    timeout: Option<Duration>,
    default: R,
    body: F,
) -> R
where
    F: FnOnce() -> R,
{
    // The registry lock is dropped here, before we block on the semaphore.
    let sem = match registry.get(channel) {
        Some(sem) => sem,
        None => return default,
    };

    let _guard = match sem.acquire(timeout) {
        Ok(guard) => guard,
        Err(AcquireError::TimedOut) => {
            log::warn!(
                "shmq: channel '{}' still locked after {:?}; holder may be stale (key={})",
                channel,
                timeout.unwrap_or_default(),
                sem.key()
            );
            return default;
        }
        Err(e) => {
            log::debug!("shmq: could not lock channel '{}': {:?}", channel, e);
            return default;
        }
    };

    body()
}
