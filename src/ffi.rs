use crate::Queue::{MessageQueue, QueueConfig};
use std::ffi::{c_char, CStr};
use std::ptr;

// Error codes
pub const SHMQ_SUCCESS: i32 = 0;
pub const SHMQ_ERROR_NULL_POINTER: i32 = -1;
pub const SHMQ_ERROR_INVALID_ARG: i32 = -2;
pub const SHMQ_ERROR_RESOURCE: i32 = -3;
pub const SHMQ_ERROR_NOT_WRITTEN: i32 = -4;
pub const SHMQ_ERROR_EMPTY: i32 = -5;
pub const SHMQ_ERROR_BUFFER_TOO_SMALL: i32 = -6;

/// Handle to a queue instance (opaque pointer)
pub struct QueueHandle {
    inner: MessageQueue,
}

unsafe fn str_arg<'a>(s: *const c_char) -> Option<&'a str> {
    if s.is_null() {
        return None;
    }
    CStr::from_ptr(s).to_str().ok()
}

/// Attach (or create) a segment and return a queue handle.
///
/// # Arguments
/// * `segment` - Segment name, or a decimal IPC key.
/// * `size` - Bytes to reserve if the segment has to be created.
///
/// # Returns
/// * Pointer to `QueueHandle`, or NULL on failure.
#[no_mangle]
pub extern "C" fn shmq_open(segment: *const c_char, size: usize) -> *mut QueueHandle {
    let segment = match unsafe { str_arg(segment) } {
        Some(s) => s,
        None => return ptr::null_mut(),
    };

    let mut queue = MessageQueue::with_config(QueueConfig::from_env());
    match queue.allocate(segment, size) {
        Ok(()) => Box::into_raw(Box::new(QueueHandle { inner: queue })),
        Err(e) => {
            log::error!("shmq ffi: failed to open segment '{}': {}", segment, e);
            ptr::null_mut()
        }
    }
}

/// Register a channel. Idempotent.
#[no_mangle]
pub extern "C" fn shmq_register(handle: *mut QueueHandle, channel: *const c_char) -> i32 {
    if handle.is_null() {
        return SHMQ_ERROR_NULL_POINTER;
    }
    let channel = match unsafe { str_arg(channel) } {
        Some(c) => c,
        None => return SHMQ_ERROR_INVALID_ARG,
    };
    let queue = unsafe { &(*handle).inner };
    match queue.register_channel(channel) {
        Ok(()) => SHMQ_SUCCESS,
        Err(e) => {
            log::error!("shmq ffi: failed to register '{}': {}", channel, e);
            SHMQ_ERROR_RESOURCE
        }
    }
}

/// Append a byte message to a channel.
///
/// # Returns
/// * 0 on success, `SHMQ_ERROR_NOT_WRITTEN` if the queue did not take it.
#[no_mangle]
pub extern "C" fn shmq_write(
    handle: *mut QueueHandle,
    channel: *const c_char,
    data: *const u8,
    len: usize,
) -> i32 {
    if handle.is_null() || (data.is_null() && len > 0) {
        return SHMQ_ERROR_NULL_POINTER;
    }
    let channel = match unsafe { str_arg(channel) } {
        Some(c) => c,
        None => return SHMQ_ERROR_INVALID_ARG,
    };
    let queue = unsafe { &(*handle).inner };
    let payload: &[u8] = if len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(data, len) }
    };

    if queue.write(channel, payload) {
        SHMQ_SUCCESS
    } else {
        SHMQ_ERROR_NOT_WRITTEN
    }
}

/// Pop the oldest message of a channel.
///
/// # Arguments
/// * `out_buf` - Buffer to write message into.
/// * `out_len` - Input: size of buf, Output: size of message received.
///
/// # Returns
/// * 0 on success.
/// * `SHMQ_ERROR_EMPTY` if nothing could be dequeued.
/// * `SHMQ_ERROR_BUFFER_TOO_SMALL` with `*out_len` set to the needed size; the
///   message stays queued.
#[no_mangle]
pub extern "C" fn shmq_next(
    handle: *mut QueueHandle,
    channel: *const c_char,
    out_buf: *mut u8,
    out_len: *mut usize,
) -> i32 {
    if handle.is_null() || out_len.is_null() {
        return SHMQ_ERROR_NULL_POINTER;
    }
    let channel = match unsafe { str_arg(channel) } {
        Some(c) => c,
        None => return SHMQ_ERROR_INVALID_ARG,
    };
    let queue = unsafe { &(*handle).inner };
    let max_len = if out_buf.is_null() { 0 } else { unsafe { *out_len } };

    let mut needed = None;
    let message = queue.next_if(channel, |m: &Vec<u8>| {
        if m.len() > max_len {
            needed = Some(m.len());
            false
        } else {
            true
        }
    });

    match (message, needed) {
        (Some(data), _) => {
            unsafe {
                if !data.is_empty() {
                    ptr::copy_nonoverlapping(data.as_ptr(), out_buf, data.len());
                }
                *out_len = data.len();
            }
            SHMQ_SUCCESS
        }
        (None, Some(len)) => {
            unsafe { *out_len = len };
            SHMQ_ERROR_BUFFER_TOO_SMALL
        }
        (None, None) => SHMQ_ERROR_EMPTY,
    }
}

/// Tear down the queue: destroy channel semaphores, remove the segment, free the handle.
#[no_mangle]
pub extern "C" fn shmq_close(handle: *mut QueueHandle) -> i32 {
    if handle.is_null() {
        return SHMQ_ERROR_NULL_POINTER;
    }
    let handle = unsafe { Box::from_raw(handle) };
    match handle.inner.close() {
        Ok(()) => SHMQ_SUCCESS,
        Err(e) => {
            log::error!("shmq ffi: teardown incomplete: {}", e);
            SHMQ_ERROR_RESOURCE
        }
    }
}
