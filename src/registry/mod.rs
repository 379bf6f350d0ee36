//! Node Registry Module
//!
//! Tracks live nodes from their status broadcasts, detects first-sight and
//! restart conditions, and stores descriptive info responses.

pub mod events;
pub mod node_registry;

pub use events::*;
pub use node_registry::*;
