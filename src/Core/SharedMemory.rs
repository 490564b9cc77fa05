// Shared memory backend over System V segments (shmget + shmat)
// Segments are named by an IPC key so unrelated processes can find them.

use crate::Core::key::IpcKey;
use crate::error::{QueueError, Result};
use std::fmt::Debug;
use std::io;
use std::ptr::{self, NonNull};

/// Shared memory backend trait for mapped regions
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Get a pointer to the mapped memory region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes
    fn size(&self) -> usize;

    /// Get the underlying OS handle
    fn raw_handle(&self) -> RawHandle;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// System V shared memory identifier
    ShmId(i32),
}

/// An attached System V shared memory segment.
///
/// Dropping detaches the segment; it stays in the kernel until [`SysVSegment::remove`]
/// marks it and the last process detaches.
#[derive(Debug)]
pub struct SysVSegment {
    ptr: NonNull<u8>,
    size: usize,
    shmid: i32,
    key: IpcKey,
    created: bool,
}

// The segment is plain shared bytes; synchronization is the caller's business.
unsafe impl Send for SysVSegment {}
unsafe impl Sync for SysVSegment {}

impl SysVSegment {
    /// Attach the segment named by `key`, creating it with `size` bytes if absent.
    ///
    /// An existing segment is attached at its real size, which may differ from `size`.
    pub fn open(key: IpcKey, size: usize, mode: u32) -> Result<Self> {
        let perms = (mode & 0o777) as libc::c_int;

        let (shmid, created) = unsafe {
            let id = libc::shmget(
                key.as_key_t(),
                size,
                libc::IPC_CREAT | libc::IPC_EXCL | perms,
            );
            if id >= 0 {
                (id, true)
            } else {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::EEXIST) {
                    return Err(QueueError::Resource {
                        op: "shmget",
                        key: key.get(),
                        source: err,
                    });
                }
                let id = libc::shmget(key.as_key_t(), 0, perms);
                if id < 0 {
                    return Err(QueueError::resource("shmget", key.get()));
                }
                (id, false)
            }
        };

        let actual_size = if created { size } else { segment_size(shmid, key)? };

        let addr = unsafe { libc::shmat(shmid, ptr::null(), 0) };
        if addr as isize == -1 {
            let err = QueueError::resource("shmat", key.get());
            if created {
                unsafe { libc::shmctl(shmid, libc::IPC_RMID, ptr::null_mut()) };
            }
            return Err(err);
        }

        let ptr = NonNull::new(addr as *mut u8)
            .ok_or_else(|| QueueError::InvalidLayout("shmat returned null".into()))?;

        log::debug!(
            "shmq: {} segment key={} shmid={} size={}",
            if created { "created" } else { "attached" },
            key,
            shmid,
            actual_size
        );

        Ok(Self {
            ptr,
            size: actual_size,
            shmid,
            key,
            created,
        })
    }

    /// Mark the segment for destruction once every process has detached.
    pub fn remove(&self) -> Result<()> {
        if unsafe { libc::shmctl(self.shmid, libc::IPC_RMID, ptr::null_mut()) } != 0 {
            return Err(QueueError::resource("shmctl(IPC_RMID)", self.key.get()));
        }
        log::debug!("shmq: removed segment key={} shmid={}", self.key, self.shmid);
        Ok(())
    }

    pub fn key(&self) -> IpcKey {
        self.key
    }

    /// Whether this process created the segment (as opposed to attaching it).
    pub fn is_creator(&self) -> bool {
        self.created
    }
}

fn segment_size(shmid: i32, key: IpcKey) -> Result<usize> {
    unsafe {
        let mut stat: libc::shmid_ds = std::mem::zeroed();
        if libc::shmctl(shmid, libc::IPC_STAT, &mut stat) != 0 {
            return Err(QueueError::resource("shmctl(IPC_STAT)", key.get()));
        }
        Ok(stat.shm_segsz as usize)
    }
}

impl Drop for SysVSegment {
    fn drop(&mut self) {
        unsafe {
            libc::shmdt(self.ptr.as_ptr() as *const libc::c_void);
        }
    }
}

impl SharedMemoryBackend for SysVSegment {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::ShmId(self.shmid)
    }
}
