//! Per-stream actor subsystem: mailbox messages, the waiter registry, the
//! lazy-spawn/idle-evict registry, content framing, segment rotation, the
//! estuary fan-out subsystem, and the actor loop itself.

pub mod fanout;
pub mod framing;
pub mod messages;
pub mod registry;
pub mod rotation;
pub mod stream_actor;
pub mod waiter;

pub use messages::StreamCommand;
pub use registry::{split_stream_key, stream_key, ActorRegistry};
pub use stream_actor::ActorContext;
