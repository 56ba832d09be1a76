mod channel;
mod config;
mod publisher;

pub use channel::{ChannelError, FileChannel, MessageChannel};
pub use config::PublisherConfig;
pub use publisher::{PublishState, Publisher};
