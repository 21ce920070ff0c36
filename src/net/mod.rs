//! Network abstraction layer: a single bidirectional TCP byte channel
//! used for both the control and audio connections.

mod channel;

pub use channel::ByteChannel;
