//! Execution hand-off between quorum and the chain.

pub mod broadcaster;
pub mod dispatcher;
pub mod gate;

pub use broadcaster::{Broadcaster, ExternalBroadcaster};
pub use dispatcher::Dispatcher;
pub use gate::{DefaultGate, ExecutionGate};
