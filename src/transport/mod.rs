//! Transport Module
//!
//! The bus transport port the allocation server talks through, plus a
//! JSON-over-UDP reference adapter. Real deployments implement
//! [`BusTransport`] against their bus stack; framing, arbitration, and
//! delivery guarantees are entirely the adapter's concern.

pub mod udp;

pub use udp::*;

use crate::error::Result;
use crate::protocol::{AllocationBroadcast, NodeAddress};
use async_trait::async_trait;
use std::sync::Arc;

/// Port for outbound bus operations
#[async_trait]
pub trait BusTransport: Send + Sync {
    /// Broadcast a per-stage echo or a final grant
    async fn broadcast_allocation(&self, message: &AllocationBroadcast) -> Result<()>;

    /// Fire a descriptive-info request at a node
    ///
    /// Fire-and-forget: the response, if one ever arrives, is delivered back
    /// through the inbound event stream, never out-of-band.
    async fn send_info_request(&self, target: NodeAddress) -> Result<()>;
}

pub type BusTransportRef = Arc<dyn BusTransport>;
