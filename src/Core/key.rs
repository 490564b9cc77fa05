// Name -> System V IPC key derivation

use crate::error::{QueueError, Result};
use sha2::{Digest, Sha256};
use std::fmt;

/// Size of the key range produced by [`derive_key`]. Keys land in `1..=KEY_SPACE`.
pub const KEY_SPACE: u64 = i32::MAX as u64 - 1;

/// A System V IPC key (`key_t`) naming a segment or a semaphore set.
///
/// Always positive, so it can never be `IPC_PRIVATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpcKey(i32);

impl IpcKey {
    pub fn new(raw: i32) -> Result<Self> {
        if raw <= 0 {
            return Err(QueueError::InvalidKey(raw as i64));
        }
        Ok(Self(raw))
    }

    #[inline]
    pub fn get(self) -> i32 {
        self.0
    }

    #[inline]
    pub(crate) fn as_key_t(self) -> libc::key_t {
        self.0 as libc::key_t
    }
}

impl fmt::Display for IpcKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Map an arbitrary name to an IPC key.
///
/// SHA-256 of the name, first eight digest bytes as a big-endian integer,
/// reduced into `1..=KEY_SPACE`. Distinct names may collide.
pub fn derive_key(name: &str) -> IpcKey {
    let digest = Sha256::digest(name.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(head) % KEY_SPACE + 1;
    IpcKey(value as i32)
}

/// Identifier of the shared segment: an explicit key or a name to hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentId {
    Key(i64),
    Name(String),
}

impl SegmentId {
    /// Resolve to the IPC key of the segment.
    pub fn key(&self) -> Result<IpcKey> {
        match self {
            SegmentId::Key(raw) => {
                let raw = i32::try_from(*raw).map_err(|_| QueueError::InvalidKey(*raw))?;
                IpcKey::new(raw)
            }
            SegmentId::Name(name) => Ok(derive_key(name)),
        }
    }
}

impl From<&str> for SegmentId {
    /// Strings holding a positive `i32` are taken as keys as-is; everything
    /// else, including `"0"` and negative numbers, is a name to hash.
    fn from(s: &str) -> Self {
        match s.trim().parse::<i32>() {
            Ok(raw) if raw > 0 => SegmentId::Key(raw as i64),
            _ => SegmentId::Name(s.to_string()),
        }
    }
}

impl From<String> for SegmentId {
    fn from(s: String) -> Self {
        SegmentId::from(s.as_str())
    }
}

impl From<i32> for SegmentId {
    fn from(raw: i32) -> Self {
        SegmentId::Key(raw as i64)
    }
}

impl From<IpcKey> for SegmentId {
    fn from(key: IpcKey) -> Self {
        SegmentId::Key(key.get() as i64)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentId::Key(raw) => write!(f, "{}", raw),
            SegmentId::Name(name) => f.write_str(name),
        }
    }
}
