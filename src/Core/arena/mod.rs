use crate::Core::key::{IpcKey, SegmentId};
use crate::Core::SharedMemory::{SharedMemoryBackend, SysVSegment};
use crate::error::{QueueError, Result};
use crossbeam_utils::Backoff;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::ptr;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
mod debug;
mod getters;
pub mod layout;

use layout::{
    pack_data_len, unpack_data_len, ArenaHeader, VariableSlot, ARENA_MAGIC, LAYOUT_VERSION,
    MAX_NAME_LEN, SLOT_CLAIMING, SLOT_FREE, SLOT_READY,
};

use lazy_static::lazy_static;
use parking_lot::Mutex;

/// How long an attacher waits for the creator to publish the header.
const HEADER_WAIT: Duration = Duration::from_secs(2);

lazy_static! {
    /// Segment keys attached by some `SharedArena` of this process.
    static ref ATTACHED: Mutex<HashSet<i32>> = Mutex::new(HashSet::new());
}

/// Key-value store of named variables inside one shared segment.
///
/// Every variable owns one fixed-size slot of the segment, so writing one
/// variable never moves another. A slot holds two copies of its region and
/// writes alternate between them, so a value is replaced all at once or not
/// at all, even if the writer dies midway. Operations on a single variable are not
/// synchronized here: callers serialize access per name (the queue does it
/// with the channel semaphore).
pub struct SharedArena {
    segment: SysVSegment,
    header: *mut ArenaHeader,
    slot_count: usize,
    slot_capacity: usize,
    data_offset: usize,
}

impl SharedArena {
    /// Attach the segment named by `segment`, creating it with `size` bytes and
    /// `slot_count` variable slots if it does not exist yet.
    ///
    /// Only one `SharedArena` per process may own a given segment.
    pub fn allocate(segment: &SegmentId, size: usize, slot_count: usize, mode: u32) -> Result<Self> {
        let key = segment.key()?;

        {
            let mut attached = ATTACHED.lock();
            if !attached.insert(key.get()) {
                return Err(QueueError::AlreadyAttached(key.get()));
            }
        }

        Self::attach(key, size, slot_count, mode).map_err(|e| {
            ATTACHED.lock().remove(&key.get());
            e
        })
    }

    fn attach(key: IpcKey, size: usize, slot_count: usize, mode: u32) -> Result<Self> {
        // Header, directory and two bytes of data per slot at the very least
        let bounds = layout::data_offset(slot_count).and_then(|offset| {
            slot_count
                .checked_mul(2)
                .and_then(|data| offset.checked_add(data))
                .map(|needed| (offset, needed))
        });
        let data_offset = match bounds {
            Some((offset, needed))
                if slot_count > 0 && slot_count <= u32::MAX as usize && size >= needed =>
            {
                offset
            }
            other => {
                return Err(QueueError::SegmentTooSmall {
                    size,
                    slots: slot_count,
                    needed: other.map_or(usize::MAX, |(_, needed)| needed),
                })
            }
        };

        let segment = SysVSegment::open(key, size, mode)?;
        let header = segment.as_ptr() as *mut ArenaHeader;

        let (slot_count, slot_capacity, data_offset) = if segment.is_creator() {
            let slot_capacity = ((segment.size() - data_offset) / slot_count / 2) & !7;
            unsafe {
                (*header).version = LAYOUT_VERSION;
                (*header).slot_count = slot_count as u32;
                (*header).slot_capacity = slot_capacity as u64;
                (*header).data_offset = data_offset as u64;
                (*header).magic.store(ARENA_MAGIC, Ordering::Release);
            }
            (slot_count, slot_capacity, data_offset)
        } else {
            let header_ref = unsafe { &*header };
            wait_for_magic(header_ref)?;
            if header_ref.version != LAYOUT_VERSION {
                return Err(QueueError::InvalidLayout(format!(
                    "layout version {} (expected {})",
                    header_ref.version, LAYOUT_VERSION
                )));
            }
            let slot_count = header_ref.slot_count as usize;
            let slot_capacity = header_ref.slot_capacity as usize;
            let data_offset = header_ref.data_offset as usize;
            let end = slot_count
                .checked_mul(2)
                .and_then(|regions| regions.checked_mul(slot_capacity))
                .and_then(|band| band.checked_add(data_offset));
            if end.map_or(true, |end| end > segment.size()) {
                return Err(QueueError::InvalidLayout(format!(
                    "{} slots of {} bytes do not fit in {} bytes",
                    slot_count,
                    slot_capacity,
                    segment.size()
                )));
            }
            (slot_count, slot_capacity, data_offset)
        };

        Ok(Self {
            segment,
            header,
            slot_count,
            slot_capacity,
            data_offset,
        })
    }

    /// True if a variable named `name` currently holds a value.
    pub fn has_variable(&self, name: &str) -> bool {
        self.find_slot(name)
            .map(|i| self.published(i).1 > 0)
            .unwrap_or(false)
    }

    /// The value stored at `name`, or `None` if absent or not decodable as `T`.
    pub fn get_variable<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        match self.try_get_variable(name) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("shmq: variable '{}' is not readable: {}", name, e);
                None
            }
        }
    }

    /// Like [`get_variable`](Self::get_variable), but tells an absent variable
    /// apart from one holding bytes that do not decode as `T`.
    pub fn try_get_variable<T: DeserializeOwned>(&self, name: &str) -> std::result::Result<Option<T>, serde_json::Error> {
        match self.read_bytes(name) {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Store `value` at `name`, replacing any prior value.
    ///
    /// Nothing is written unless the whole value fits, so a failed call leaves
    /// the prior value intact.
    pub fn set_variable<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.write_bytes(name, &bytes)
    }

    /// Drop the variable and free its slot. Returns whether it existed.
    pub fn remove_variable(&self, name: &str) -> bool {
        match self.find_slot(name) {
            Some(i) => {
                let slot = self.slot(i);
                slot.data_len.store(0, Ordering::Release);
                slot.state.store(SLOT_FREE, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Names of every variable currently holding a value.
    pub fn variable_names(&self) -> Vec<String> {
        (0..self.slot_count)
            .filter(|&i| {
                let slot = self.slot(i);
                slot.state.load(Ordering::Acquire) == SLOT_READY
                    && self.published(i).1 > 0
            })
            .map(|i| String::from_utf8_lossy(self.slot_name(i)).into_owned())
            .collect()
    }

    /// Mark the segment for removal. It disappears once every process detaches.
    pub fn remove(&self) -> Result<()> {
        self.segment.remove()
    }

    pub(crate) fn read_bytes(&self, name: &str) -> Option<Vec<u8>> {
        let i = self.find_slot(name)?;
        let (region, len) = self.published(i);
        if len == 0 || len > self.slot_capacity {
            return None;
        }
        let mut out = vec![0u8; len];
        unsafe {
            ptr::copy_nonoverlapping(self.data_ptr(i, region), out.as_mut_ptr(), len);
        }
        Some(out)
    }

    pub(crate) fn write_bytes(&self, name: &str, bytes: &[u8]) -> Result<()> {
        if name.len() > MAX_NAME_LEN {
            return Err(QueueError::NameTooLong {
                max: MAX_NAME_LEN,
                got: name.len(),
            });
        }
        if bytes.len() > self.slot_capacity {
            return Err(QueueError::CapacityExceeded {
                needed: bytes.len(),
                available: self.slot_capacity,
            });
        }

        let i = match self.find_slot(name) {
            Some(i) => i,
            None => self.claim_slot(name)?,
        };

        let region = self.stage_bytes(i, bytes);
        self.slot(i)
            .data_len
            .store(pack_data_len(region, bytes.len()), Ordering::Release);
        Ok(())
    }

    /// Copy `bytes` into the region of slot `i` that readers are not using and
    /// return its index. Nothing is visible until the caller publishes it.
    fn stage_bytes(&self, i: usize, bytes: &[u8]) -> usize {
        debug_assert!(bytes.len() <= self.slot_capacity);
        let region = 1 - self.published(i).0;
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), self.data_ptr(i, region), bytes.len());
        }
        region
    }

    /// Region index and length of the value slot `i` currently exposes.
    #[inline]
    fn published(&self, i: usize) -> (usize, usize) {
        unpack_data_len(self.slot(i).data_len.load(Ordering::Acquire))
    }

    fn find_slot(&self, name: &str) -> Option<usize> {
        if name.len() > MAX_NAME_LEN {
            return None;
        }
        (0..self.slot_count).find(|&i| {
            self.slot(i).state.load(Ordering::Acquire) == SLOT_READY
                && self.slot_name(i) == name.as_bytes()
        })
    }

    fn claim_slot(&self, name: &str) -> Result<usize> {
        for i in 0..self.slot_count {
            let slot = self.slot(i);
            if slot
                .state
                .compare_exchange(SLOT_FREE, SLOT_CLAIMING, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            unsafe {
                let slot_ptr = self.slot_ptr(i);
                ptr::copy_nonoverlapping(name.as_ptr(), (*slot_ptr).name.as_mut_ptr(), name.len());
                (*slot_ptr).name_len = name.len() as u32;
            }
            slot.data_len.store(0, Ordering::Relaxed);
            slot.state.store(SLOT_READY, Ordering::Release);
            log::debug!("shmq: variable '{}' bound to slot {}", name, i);
            return Ok(i);
        }
        Err(QueueError::CapacityExceeded {
            needed: 1,
            available: 0,
        })
    }

    #[inline]
    fn slot_ptr(&self, index: usize) -> *mut VariableSlot {
        debug_assert!(index < self.slot_count);
        unsafe {
            self.segment
                .as_ptr()
                .add(layout::directory_offset() + index * std::mem::size_of::<VariableSlot>())
                as *mut VariableSlot
        }
    }

    #[inline]
    fn slot(&self, index: usize) -> &VariableSlot {
        unsafe { &*self.slot_ptr(index) }
    }

    fn slot_name(&self, index: usize) -> &[u8] {
        let slot = self.slot(index);
        let len = (slot.name_len as usize).min(MAX_NAME_LEN);
        &slot.name[..len]
    }

    #[inline]
    fn data_ptr(&self, index: usize, region: usize) -> *mut u8 {
        debug_assert!(region < 2);
        unsafe {
            self.segment
                .as_ptr()
                .add(self.data_offset + (2 * index + region) * self.slot_capacity)
        }
    }
}

impl Drop for SharedArena {
    fn drop(&mut self) {
        ATTACHED.lock().remove(&self.segment.key().get());
    }
}

fn wait_for_magic(header: &ArenaHeader) -> Result<()> {
    let deadline = Instant::now() + HEADER_WAIT;
    let backoff = Backoff::new();
    loop {
        match header.magic.load(Ordering::Acquire) {
            ARENA_MAGIC => return Ok(()),
            0 if Instant::now() < deadline => {
                if backoff.is_completed() {
                    std::thread::sleep(Duration::from_millis(1));
                } else {
                    backoff.snooze();
                }
            }
            0 => {
                return Err(QueueError::InvalidLayout(
                    "creator never published the arena header".into(),
                ))
            }
            other => {
                return Err(QueueError::InvalidLayout(format!(
                    "foreign magic number {:#018x}",
                    other
                )))
            }
        }
    }
}

// The directory uses atomics for its state words; variable data is guarded by callers.
unsafe impl Send for SharedArena {}
unsafe impl Sync for SharedArena {}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(tag: &str) -> SharedArena {
        let id = SegmentId::Name(format!("shmq-arena-unit-{}-{}", std::process::id(), tag));
        SharedArena::allocate(&id, 16 * 1024, 2, 0o600).unwrap()
    }

    #[test]
    fn interrupted_write_keeps_prior_value() {
        let arena = arena("torn");
        arena.set_variable("jobs", &["a", "b"]).unwrap();
        let slot = arena.find_slot("jobs").unwrap();

        // A writer killed halfway through copying the next value
        let next = serde_json::to_vec(&["a", "b", "c"]).unwrap();
        arena.stage_bytes(slot, &next[..next.len() / 2]);

        assert_eq!(
            arena.try_get_variable::<Vec<String>>("jobs").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );

        // The next writer recovers and later writes keep alternating regions
        arena.set_variable("jobs", &["a", "b", "c"]).unwrap();
        assert_eq!(arena.get_variable::<Vec<String>>("jobs").map(|v| v.len()), Some(3));
        arena.set_variable("jobs", &["d"]).unwrap();
        assert_eq!(arena.get_variable::<Vec<String>>("jobs"), Some(vec!["d".to_string()]));
        arena.remove().unwrap();
    }

    #[test]
    fn writes_alternate_regions() {
        let arena = arena("regions");
        arena.set_variable("v", &1).unwrap();
        let slot = arena.find_slot("v").unwrap();
        let first = arena.published(slot).0;
        arena.set_variable("v", &2).unwrap();
        assert_ne!(arena.published(slot).0, first);
        arena.set_variable("v", &3).unwrap();
        assert_eq!(arena.published(slot), (first, 1));
        arena.remove().unwrap();
    }
}
