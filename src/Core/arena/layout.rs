use std::sync::atomic::{AtomicU32, AtomicU64};

/// Version of the in-segment layout. Bumped on any change to the structs below.
pub const LAYOUT_VERSION: u32 = 2;

/// Identifies a segment laid out by this crate ("SHMQARNA").
pub const ARENA_MAGIC: u64 = 0x5348_4D51_4152_4E41;

/// Longest variable name that fits in a directory entry.
pub const MAX_NAME_LEN: usize = 112;

/// Directory entry is unused.
pub const SLOT_FREE: u32 = 0;
/// A process is writing the name into the entry.
pub const SLOT_CLAIMING: u32 = 1;
/// The entry names a live variable.
pub const SLOT_READY: u32 = 2;

/// The header at the very beginning of the segment.
///
/// A freshly created System V segment is zero-filled, so everything except the
/// magic is valid before the creator publishes it.
#[repr(C, align(128))]
pub struct ArenaHeader {
    /// Written last by the creator with `Release`; attachers spin on it with `Acquire`.
    pub magic: AtomicU64,

    /// Layout version the creator used.
    pub version: u32,

    /// Number of entries in the variable directory.
    pub slot_count: u32,

    /// Bytes of serialized data each slot can hold. Every slot owns two
    /// regions of this size.
    pub slot_capacity: u64,

    /// Byte offset from the segment start to the first data region.
    pub data_offset: u64,
}

/// One entry of the variable directory, following the header.
///
/// Entry `i` owns two data regions starting at
/// `data_offset + 2 * i * slot_capacity`. Writers fill the region not in use,
/// then flip `data_len` to it with a single store, so a writer that dies
/// halfway leaves the previous value readable.
#[repr(C, align(128))]
pub struct VariableSlot {
    /// `SLOT_FREE`, `SLOT_CLAIMING` or `SLOT_READY`.
    pub state: AtomicU32,

    /// Length of `name` in bytes.
    pub name_len: u32,

    /// Variable name, not NUL-terminated.
    pub name: [u8; MAX_NAME_LEN],

    /// Published value: [`ACTIVE_REGION_BIT`] selects the region, the other
    /// bits hold the length. A length of 0 means the variable holds no value.
    pub data_len: AtomicU64,
}

/// Bit of `VariableSlot::data_len` naming the region that holds the value.
pub const ACTIVE_REGION_BIT: u64 = 1 << 63;

/// Pack a region index (0 or 1) and a length into a `data_len` word.
#[inline]
pub const fn pack_data_len(region: usize, len: usize) -> u64 {
    let bit = if region == 0 { 0 } else { ACTIVE_REGION_BIT };
    bit | (len as u64 & !ACTIVE_REGION_BIT)
}

/// Split a `data_len` word into its region index and length.
#[inline]
pub const fn unpack_data_len(word: u64) -> (usize, usize) {
    let region = if word & ACTIVE_REGION_BIT == 0 { 0 } else { 1 };
    (region, (word & !ACTIVE_REGION_BIT) as usize)
}

/// Offset of the directory from the segment start.
#[inline]
pub const fn directory_offset() -> usize {
    std::mem::size_of::<ArenaHeader>()
}

/// Offset of the first data region for a directory of `slot_count` entries,
/// or `None` if the directory does not fit in the address space.
#[inline]
pub const fn data_offset(slot_count: usize) -> Option<usize> {
    let dir = match slot_count.checked_mul(std::mem::size_of::<VariableSlot>()) {
        Some(dir) => dir,
        None => return None,
    };
    match directory_offset().checked_add(dir) {
        Some(end) if end <= usize::MAX - 127 => Some((end + 127) & !127),
        _ => None,
    }
}
