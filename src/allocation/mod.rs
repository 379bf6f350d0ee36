//! Allocation Module
//!
//! The three-stage unique-ID assembly session and the address allocator it
//! feeds on completion.

pub mod allocator;
pub mod session;

pub use allocator::*;
pub use session::*;
