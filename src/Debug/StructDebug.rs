use crate::Core::arena::SharedArena;
use crate::Queue::{ChannelRegistry, MessageQueue};
use std::fmt;

/// Debug function for SharedArena
///
/// Shows the segment identity and layout without reading any variable data.
pub fn debug_shared_arena(arena: &SharedArena, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SharedArena")
        .field("key", &format_args!("{}", arena.key()))
        .field("handle", &arena.shm().raw_handle())
        .field("header", &format_args!("{:p}", arena.header_ptr()))
        .field("size", &arena.size())
        .field("slots", &arena.slot_count())
        .field("free_slots", &arena.free_slots())
        .field("slot_capacity", &arena.slot_capacity())
        .field("creator", &arena.is_creator())
        .field("initialized", &arena.is_initialized())
        .finish()
}

/// Debug function for ChannelRegistry
pub fn debug_channel_registry(registry: &ChannelRegistry, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelRegistry")
        .field("channels", &registry.names())
        .finish()
}

/// Debug function for MessageQueue
pub fn debug_message_queue(queue: &MessageQueue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MessageQueue")
        .field("arena", &queue.arena())
        .field("channels", &queue.channels())
        .field("lock_timeout", &queue.lock_timeout())
        .finish_non_exhaustive()
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_channel_registry(self, f)
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        debug_message_queue(self, f)
    }
}
