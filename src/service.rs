//! Allocation Server Service
//!
//! Owns the node registry, the handshake session, and the address allocator,
//! and drives them from a single serialized stream of inbound bus events.
//! One consumer drains the stream, so no two events ever mutate the shared
//! state concurrently; descriptive-info requests are fired without blocking
//! and their responses come back through the same stream.

use crate::allocation::{
    AddressAllocator, AllocationSession, SessionOutcome, DEFAULT_QUERY_TIMEOUT,
};
use crate::error::Result;
use crate::protocol::{
    AllocationBroadcast, AllocationFragment, BusEvent, NodeAddress, StatusBroadcast,
    MAX_DYNAMIC_ADDR, MIN_DYNAMIC_ADDR,
};
use crate::registry::{NewNodeCallback, NodeRegistry, DEFAULT_STATUS_TIMEOUT};
use crate::relay::LogRelay;
use crate::transport::BusTransportRef;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the allocation service
#[derive(Debug, Clone)]
pub struct AllocatorConfig {
    /// The server's own bus address, excluded from grants
    pub own_address: NodeAddress,
    /// Node silence window before a reappearance triggers an info refresh
    pub status_timeout: Duration,
    /// Handshake inactivity window before the session resets
    pub query_timeout: Duration,
    /// Dynamic address range, inclusive bounds as configured
    pub range_low: u8,
    pub range_high: u8,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            own_address: NodeAddress::MAX,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            range_low: MIN_DYNAMIC_ADDR,
            range_high: MAX_DYNAMIC_ADDR,
        }
    }
}

// =============================================================================
// Allocator Service
// =============================================================================

/// The allocation server: registry + session + allocator behind one
/// event stream
pub struct AllocatorService {
    config: AllocatorConfig,
    /// Observed-node registry
    registry: Arc<NodeRegistry>,
    /// Address allocator consulting the registry
    allocator: Arc<AddressAllocator>,
    /// The single process-wide handshake session
    session: Mutex<AllocationSession>,
    /// Device log forwarding
    relay: LogRelay,
    /// Outbound bus port
    transport: BusTransportRef,
}

impl AllocatorService {
    /// Create a service from configuration and a transport
    pub fn new(config: AllocatorConfig, transport: BusTransportRef) -> Result<Arc<Self>> {
        let registry = NodeRegistry::with_timeout(config.status_timeout);
        let allocator = AddressAllocator::with_range(
            registry.clone(),
            config.own_address,
            config.range_low,
            config.range_high,
        )?;
        let session = Mutex::new(AllocationSession::with_timeout(config.query_timeout));
        Ok(Arc::new(Self {
            config,
            registry,
            allocator,
            session,
            relay: LogRelay::new(),
            transport,
        }))
    }

    /// The service configuration
    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// The node registry
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// The address allocator
    pub fn allocator(&self) -> &Arc<AddressAllocator> {
        &self.allocator
    }

    /// Install a callback fired after a node's info is recorded
    pub fn set_new_node_callback(&self, callback: NewNodeCallback) {
        self.registry.set_new_node_callback(callback);
    }

    /// Drain the inbound event stream until shutdown
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<BusEvent>,
        shutdown: CancellationToken,
    ) {
        info!(
            own_address = self.config.own_address.get(),
            range_low = self.config.range_low,
            range_high = self.config.range_high,
            "Allocation service running"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Allocation service shutting down");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        info!("Event stream closed, stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Process one inbound event
    ///
    /// All registry/session/allocator mutation funnels through here, on
    /// whatever task owns the receiving end of the stream.
    pub async fn handle_event(&self, event: BusEvent) {
        match event {
            BusEvent::Status(broadcast) => self.handle_status(broadcast),
            BusEvent::Fragment(fragment) => self.handle_fragment(fragment).await,
            BusEvent::Log(log) => self.relay.relay(&log),
            BusEvent::Info { source, info } => self.registry.record_info(source, info),
        }
    }

    fn handle_status(&self, broadcast: StatusBroadcast) {
        let decision = self.registry.observe(broadcast.source, broadcast.status);
        if decision.needs_refresh() {
            debug!(
                address = broadcast.source.get(),
                ?decision,
                "Requesting node info"
            );
            let transport = self.transport.clone();
            let address = broadcast.source;
            // Fire-and-forget: no retry, and a lost response just means the
            // next refresh trigger asks again.
            tokio::spawn(async move {
                if let Err(e) = transport.send_info_request(address).await {
                    debug!(address = address.get(), "Info request failed: {}", e);
                }
            });
        }
    }

    async fn handle_fragment(&self, fragment: AllocationFragment) {
        let outcome = self.session.lock().handle_fragment(&fragment);
        match outcome {
            SessionOutcome::Echo(accumulated) => {
                self.broadcast(AllocationBroadcast::echo(accumulated)).await;
            }
            SessionOutcome::Complete {
                unique_id,
                requested_address,
            } => match self.allocator.resolve(unique_id, requested_address) {
                Ok(address) => {
                    self.broadcast(AllocationBroadcast::grant(address, unique_id))
                        .await;
                }
                Err(e) => {
                    error!(unique_id = %unique_id, "Couldn't allocate node address: {}", e);
                }
            },
            SessionOutcome::TimedOut => {
                error!("Allocation query timeout, resetting session");
            }
            SessionOutcome::Ignored => {}
        }
    }

    async fn broadcast(&self, message: AllocationBroadcast) {
        if let Err(e) = self.transport.broadcast_allocation(&message).await {
            warn!("Allocation broadcast failed: {}", e);
        }
    }
}
