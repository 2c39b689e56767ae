//! Session bookkeeping: the inbound/outbound pair that makes up one proxied
//! transaction, and the engine that owns every live pair keyed by `mio::Token`.

pub mod engine;
pub mod inbound;
pub mod outbound;
pub mod placeholder;
pub mod queue;

pub use engine::Engine;
pub use inbound::Inbound;
pub use outbound::Outbound;
