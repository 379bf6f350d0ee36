//! Bus Node Allocator - Dynamic Node-ID Allocation Server
//!
//! A server granting unique small-integer addresses to unidentified devices
//! on a shared broadcast bus. Devices present a 16-byte hardware unique ID
//! over a three-stage fragment handshake; the server assembles the ID,
//! avoids every address already granted or observed live, and broadcasts
//! the grant.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Allocator Service                       │
//! │            (single serialized inbound event stream)          │
//! ├──────────────┬────────────────────┬──────────────────────────┤
//! │ Node         │ Allocation Session │ Address Allocator        │
//! │ Registry     │ (3-stage unique-ID │ (grant table + free-     │
//! │ (status /    │  assembly, 3 s     │  address scan, avoids    │
//! │  info,       │  inactivity reset) │  registry-known + own)   │
//! │  refresh)    │                    │                          │
//! ├──────────────┴────────────────────┴──────────────────────────┤
//! │                     Bus Transport Port                       │
//! │        (broadcast echoes/grants, fire info requests)         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`protocol`]: addresses, unique IDs, message shapes, the event stream
//! - [`registry`]: observed-node tracking and info refresh decisions
//! - [`allocation`]: the handshake state machine and the allocator
//! - [`relay`]: device log forwarding
//! - [`service`]: wiring and the serialized event loop
//! - [`transport`]: the bus port and the UDP reference adapter
//! - [`error`]: error types and handling

pub mod allocation;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod service;
pub mod transport;

// Re-export commonly used types
pub use allocation::{
    AddressAllocator, AllocationRecord, AllocationSession, SessionOutcome, SessionStage,
    DEFAULT_QUERY_TIMEOUT,
};
pub use error::{Error, Result};
pub use protocol::{
    AllocationBroadcast, AllocationFragment, BusEvent, LogBroadcast, NodeAddress, NodeInfo,
    NodeStatus, Severity, StatusBroadcast, UniqueId, MAX_DYNAMIC_ADDR, MIN_DYNAMIC_ADDR,
};
pub use registry::{
    NodeRegistry, RefreshDecision, RegistryEvent, DEFAULT_STATUS_TIMEOUT,
};
pub use relay::LogRelay;
pub use service::{AllocatorConfig, AllocatorService};
pub use transport::{BusTransport, BusTransportRef, UdpBusTransport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
