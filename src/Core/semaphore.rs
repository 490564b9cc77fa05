// Binary semaphores over System V semaphore sets (one semaphore per set)

use crate::Core::key::IpcKey;
use crate::error::{QueueError, Result};
use crossbeam_utils::Backoff;
use std::io;
use std::time::{Duration, Instant};

/// How long an opener waits for the creator to initialize a fresh semaphore.
const INIT_WAIT: Duration = Duration::from_secs(2);

/// Why an acquisition did not succeed.
#[derive(Debug)]
pub enum AcquireError {
    /// The bounded wait elapsed while another holder kept the lock
    TimedOut,
    /// The semaphore was removed while waiting
    Removed,
    /// A signal interrupted the wait
    Interrupted,
    Os(io::Error),
}

/// A binary semaphore shared by every process that knows its key.
///
/// Created with value 1. `acquire` decrements with `SEM_UNDO`, so a process that
/// dies while holding it gives it back.
#[derive(Debug)]
pub struct BinarySemaphore {
    semid: i32,
    key: IpcKey,
}

impl BinarySemaphore {
    /// Open the semaphore named by `key`, creating and initializing it if absent.
    pub fn open(key: IpcKey, mode: u32) -> Result<Self> {
        let perms = (mode & 0o777) as libc::c_int;

        let semid = unsafe { libc::semget(key.as_key_t(), 1, libc::IPC_CREAT | libc::IPC_EXCL | perms) };
        if semid >= 0 {
            // A fresh set starts at 0. Raising it with semop (not SETVAL) also sets
            // sem_otime, which is what openers wait for. No SEM_UNDO here: the
            // initial token must outlive this process.
            let sem = Self { semid, key };
            if let Err(source) = sem.op(1, 0) {
                unsafe { libc::semctl(semid, 0, libc::IPC_RMID) };
                return Err(QueueError::Resource {
                    op: "semop(init)",
                    key: key.get(),
                    source,
                });
            }
            log::debug!("shmq: created semaphore key={} semid={}", key, semid);
            return Ok(sem);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EEXIST) {
            return Err(QueueError::Resource {
                op: "semget",
                key: key.get(),
                source: err,
            });
        }

        let semid = unsafe { libc::semget(key.as_key_t(), 1, perms) };
        if semid < 0 {
            return Err(QueueError::resource("semget", key.get()));
        }
        let sem = Self { semid, key };
        sem.wait_initialized()?;
        log::debug!("shmq: opened semaphore key={} semid={}", key, semid);
        Ok(sem)
    }

    fn wait_initialized(&self) -> Result<()> {
        let deadline = Instant::now() + INIT_WAIT;
        let backoff = Backoff::new();
        loop {
            if self.last_op_time()? != 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(QueueError::Resource {
                    op: "semaphore init wait",
                    key: self.key.get(),
                    source: io::Error::new(
                        io::ErrorKind::TimedOut,
                        "creator never initialized the semaphore",
                    ),
                });
            }
            if backoff.is_completed() {
                std::thread::sleep(Duration::from_millis(1));
            } else {
                backoff.snooze();
            }
        }
    }

    fn last_op_time(&self) -> Result<libc::time_t> {
        unsafe {
            let mut stat: libc::semid_ds = std::mem::zeroed();
            if libc::semctl(self.semid, 0, libc::IPC_STAT, &mut stat as *mut libc::semid_ds) != 0 {
                return Err(QueueError::resource("semctl(IPC_STAT)", self.key.get()));
            }
            Ok(stat.sem_otime)
        }
    }

    /// Block until the semaphore is ours, or until `timeout` elapses.
    pub fn acquire(&self, timeout: Option<Duration>) -> std::result::Result<SemaphoreGuard<'_>, AcquireError> {
        let outcome = match timeout {
            None => self.op(-1, libc::SEM_UNDO),
            Some(limit) => self.timed_down(limit),
        };
        match outcome {
            Ok(()) => Ok(SemaphoreGuard { sem: self }),
            Err(e) => Err(classify(e)),
        }
    }

    /// Take the semaphore only if it is free right now.
    pub fn try_acquire(&self) -> Option<SemaphoreGuard<'_>> {
        self.op(-1, libc::SEM_UNDO | libc::IPC_NOWAIT)
            .ok()
            .map(|_| SemaphoreGuard { sem: self })
    }

    /// Current value: 1 when free, 0 when held.
    pub fn value(&self) -> Result<i32> {
        let v = unsafe { libc::semctl(self.semid, 0, libc::GETVAL) };
        if v < 0 {
            return Err(QueueError::resource("semctl(GETVAL)", self.key.get()));
        }
        Ok(v)
    }

    /// Destroy the semaphore set. Waiters in other processes fail with `EIDRM`.
    pub fn remove(&self) -> Result<()> {
        if unsafe { libc::semctl(self.semid, 0, libc::IPC_RMID) } != 0 {
            return Err(QueueError::resource("semctl(IPC_RMID)", self.key.get()));
        }
        log::debug!("shmq: removed semaphore key={} semid={}", self.key, self.semid);
        Ok(())
    }

    pub fn key(&self) -> IpcKey {
        self.key
    }

    fn release(&self) {
        if let Err(e) = self.op(1, libc::SEM_UNDO) {
            log::warn!("shmq: failed to release semaphore key={}: {}", self.key, e);
        }
    }

    fn op(&self, delta: i16, flags: libc::c_int) -> io::Result<()> {
        let mut buf = libc::sembuf {
            sem_num: 0,
            sem_op: delta as libc::c_short,
            sem_flg: flags as libc::c_short,
        };
        if unsafe { libc::semop(self.semid, &mut buf, 1) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    fn timed_down(&self, limit: Duration) -> io::Result<()> {
        let mut buf = libc::sembuf {
            sem_num: 0,
            sem_op: -1,
            sem_flg: libc::SEM_UNDO as libc::c_short,
        };
        let ts = libc::timespec {
            tv_sec: limit.as_secs() as libc::time_t,
            tv_nsec: limit.subsec_nanos() as libc::c_long,
        };
        let rc = unsafe {
            libc::syscall(
                libc::SYS_semtimedop,
                self.semid,
                &mut buf as *mut libc::sembuf,
                1usize,
                &ts as *const libc::timespec,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(all(target_os = "linux", target_pointer_width = "64")))]
    fn timed_down(&self, limit: Duration) -> io::Result<()> {
        // No semtimedop: poll with IPC_NOWAIT until the deadline.
        let deadline = Instant::now() + limit;
        loop {
            match self.op(-1, libc::SEM_UNDO | libc::IPC_NOWAIT) {
                Ok(()) => return Ok(()),
                Err(e) if e.raw_os_error() == Some(libc::EAGAIN) => {
                    if Instant::now() >= deadline {
                        return Err(e);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify(err: io::Error) -> AcquireError {
    match err.raw_os_error() {
        Some(libc::EAGAIN) => AcquireError::TimedOut,
        Some(libc::EIDRM) | Some(libc::EINVAL) => AcquireError::Removed,
        Some(libc::EINTR) => AcquireError::Interrupted,
        _ => AcquireError::Os(err),
    }
}

/// Holds the semaphore; releases it when dropped, including during unwinding.
#[must_use = "the semaphore is released as soon as the guard is dropped"]
pub struct SemaphoreGuard<'a> {
    sem: &'a BinarySemaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}
