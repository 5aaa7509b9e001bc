pub mod kafka_channel;

pub use kafka_channel::*;
