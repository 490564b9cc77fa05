use super::*;

/// Read-only accessors for SharedArena, used for monitoring and by the Debug impls.
impl SharedArena {
    /// IPC key of the underlying segment
    pub fn key(&self) -> IpcKey {
        self.segment.key()
    }

    /// Whether this process created the segment rather than attaching to it
    pub fn is_creator(&self) -> bool {
        self.segment.is_creator()
    }

    /// Total size of the segment in bytes
    pub fn size(&self) -> usize {
        self.segment.size()
    }

    /// Number of variable slots in the directory
    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Largest serialized value a single variable can hold
    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    /// Number of slots not bound to any variable
    pub fn free_slots(&self) -> usize {
        (0..self.slot_count)
            .filter(|&i| self.slot(i).state.load(Ordering::Acquire) == SLOT_FREE)
            .count()
    }

    /// Get the raw pointer to the ArenaHeader
    pub fn header_ptr(&self) -> *const ArenaHeader {
        self.header
    }

    /// Check that the header carries our magic number
    pub fn is_initialized(&self) -> bool {
        // Safety: the header lives as long as the attachment
        unsafe { !self.header.is_null() && (*self.header).magic.load(Ordering::Acquire) == ARENA_MAGIC }
    }

    /// Get a reference to the underlying shared memory backend
    pub fn shm(&self) -> &dyn SharedMemoryBackend {
        &self.segment
    }
}
