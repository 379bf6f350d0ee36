//! Protocol Module
//!
//! Transport-agnostic protocol types and message shapes for the dynamic
//! node-address allocation handshake and node status traffic.

pub mod messages;
pub mod types;

pub use messages::*;
pub use types::*;
