mod builder;
mod critical;
mod queue;
mod registry;

pub use builder::{QueueBuilder, QueueConfig, DEFAULT_MODE, DEFAULT_SEGMENT, DEFAULT_SIZE, DEFAULT_SLOTS};
pub use queue::MessageQueue;
pub use registry::ChannelRegistry;
