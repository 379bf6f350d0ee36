//! UDP Bus Adapter
//!
//! Reference [`BusTransport`] implementation carrying protocol messages as
//! JSON datagrams over UDP broadcast. Good enough to run the server end to
//! end on a LAN or loopback; it makes no reliability claims beyond what UDP
//! gives.

use crate::error::{Error, Result};
use crate::protocol::{
    AllocationBroadcast, AllocationFragment, BusEvent, LogBroadcast, NodeAddress, NodeInfo,
    StatusBroadcast,
};
use crate::transport::BusTransport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Maximum datagram the adapter will read
const MAX_DATAGRAM: usize = 2048;

// =============================================================================
// Wire Frames
// =============================================================================

/// One JSON datagram on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireFrame {
    /// Periodic status broadcast from a node
    Status(StatusBroadcast),
    /// Handshake fragment from an unidentified device
    Fragment(AllocationFragment),
    /// Server echo or grant
    Grant(AllocationBroadcast),
    /// Log line from a node
    Log(LogBroadcast),
    /// Server asking a node to describe itself
    InfoRequest { target: NodeAddress },
    /// Node answering an info request
    InfoResponse { source: NodeAddress, info: NodeInfo },
}

/// Map an inbound frame to a processing-stream event
///
/// Grants and info requests are the server's own outbound traffic reflected
/// back by the broadcast medium and are dropped here.
pub fn frame_to_event(frame: WireFrame) -> Option<BusEvent> {
    match frame {
        WireFrame::Status(status) => Some(BusEvent::Status(status)),
        WireFrame::Fragment(fragment) => Some(BusEvent::Fragment(fragment)),
        WireFrame::Log(log) => Some(BusEvent::Log(log)),
        WireFrame::InfoResponse { source, info } => Some(BusEvent::Info { source, info }),
        WireFrame::Grant(_) | WireFrame::InfoRequest { .. } => None,
    }
}

// =============================================================================
// UDP Bus Transport
// =============================================================================

/// JSON-over-UDP bus adapter
pub struct UdpBusTransport {
    socket: Arc<UdpSocket>,
    /// Broadcast destination for outbound frames
    peer: SocketAddr,
}

impl UdpBusTransport {
    /// Bind the bus socket and enable broadcast
    pub async fn bind(bind_addr: SocketAddr, peer: SocketAddr) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;
        info!(%bind_addr, %peer, "Bus socket bound");
        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            peer,
        }))
    }

    /// Send one frame to the broadcast address
    async fn send_frame(&self, frame: &WireFrame) -> Result<()> {
        let payload = serde_json::to_vec(frame)?;
        self.socket
            .send_to(&payload, self.peer)
            .await
            .map_err(|e| Error::Transport(format!("send failed: {}", e)))?;
        Ok(())
    }

    /// Spawn the inbound listener feeding the serialized event stream
    ///
    /// Runs until `shutdown` fires or the event channel closes. Undecodable
    /// datagrams are logged and skipped.
    pub fn spawn_listener(
        self: &Arc<Self>,
        events: mpsc::Sender<BusEvent>,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let socket = self.socket.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM];
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Bus listener shutting down");
                        break;
                    }
                    received = socket.recv_from(&mut buf) => {
                        let (len, from) = match received {
                            Ok(received) => received,
                            Err(e) => {
                                warn!("Bus receive error: {}", e);
                                continue;
                            }
                        };
                        let frame: WireFrame = match serde_json::from_slice(&buf[..len]) {
                            Ok(frame) => frame,
                            Err(e) => {
                                debug!(%from, "Dropping undecodable datagram: {}", e);
                                continue;
                            }
                        };
                        if let Some(event) = frame_to_event(frame) {
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        })
    }
}

#[async_trait]
impl BusTransport for UdpBusTransport {
    async fn broadcast_allocation(&self, message: &AllocationBroadcast) -> Result<()> {
        self.send_frame(&WireFrame::Grant(message.clone())).await
    }

    async fn send_info_request(&self, target: NodeAddress) -> Result<()> {
        self.send_frame(&WireFrame::InfoRequest { target }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::NodeStatus;

    #[test]
    fn test_frame_tagging() {
        let frame = WireFrame::InfoRequest {
            target: NodeAddress::new(9).unwrap(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""kind":"info_request""#));
        assert!(json.contains(r#""target":9"#));
    }

    #[test]
    fn test_own_traffic_not_turned_into_events() {
        let echo = WireFrame::Grant(AllocationBroadcast::echo(bytes::Bytes::from_static(
            &[1, 2, 3, 4, 5, 6],
        )));
        assert_eq!(frame_to_event(echo), None);

        let status = WireFrame::Status(StatusBroadcast {
            source: NodeAddress::new(4).unwrap(),
            status: NodeStatus::with_uptime(12),
        });
        assert!(matches!(
            frame_to_event(status),
            Some(BusEvent::Status(broadcast)) if broadcast.source.get() == 4
        ));
    }
}
