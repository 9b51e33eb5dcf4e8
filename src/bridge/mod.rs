//! Routing between the relay network and the chat network.

pub mod router;
pub mod service;

pub use router::{APOLOGY, MessageBridge, Routed};
pub use service::{BridgeService, run_loops};
