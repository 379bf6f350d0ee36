//! Allocation Session State Machine
//!
//! Assembles a 16-byte unique ID from the three handshake fragments (6, 6,
//! and 4 bytes) broadcast by an unidentified device. The bus is a shared
//! broadcast medium with no per-device session key, so a single process-wide
//! session exists and fragments correlate only by length and arrival order;
//! two devices handshaking at once can corrupt each other's attempt and must
//! retry. An inactivity timeout resets abandoned sessions.

use crate::protocol::{
    AllocationFragment, NodeAddress, UniqueId, LONG_FRAGMENT_LEN, SHORT_FRAGMENT_LEN,
    UNIQUE_ID_LEN,
};
use bytes::Bytes;
use std::time::{Duration, Instant};
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

/// Default inactivity window after which an open session is abandoned
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

// =============================================================================
// Stage & Outcome
// =============================================================================

/// Assembly stage, derived from the accumulated buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    /// No handshake in flight
    Empty,
    /// First fragment accepted
    Stage1,
    /// Second fragment accepted
    Stage2,
}

/// What a fragment did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Fragment accepted; echo the accumulated bytes so the device can
    /// confirm no concurrent handshake collided with its own
    Echo(Bytes),
    /// Third fragment accepted; the unique ID is complete and the session
    /// has reset
    Complete {
        unique_id: UniqueId,
        requested_address: Option<NodeAddress>,
    },
    /// Mis-sequenced fragment inside the timeout window; tolerated as bus
    /// noise
    Ignored,
    /// Session expired (or none was open); state reset to empty
    TimedOut,
}

// =============================================================================
// Allocation Session
// =============================================================================

/// Single in-flight unique-ID assembly
///
/// The buffer only ever holds 0, 6, 12, or 16 bytes between calls; length
/// checks against the exact stage boundaries are the only fragment
/// correlation the protocol offers.
#[derive(Debug)]
pub struct AllocationSession {
    /// Unique-ID bytes accumulated so far
    buffer: Vec<u8>,
    /// When the last fragment was accepted
    last_fragment: Option<Instant>,
    /// Inactivity window before the session is abandoned
    query_timeout: Duration,
}

impl AllocationSession {
    /// Create a session with the default 3 s inactivity timeout
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_QUERY_TIMEOUT)
    }

    /// Create a session with a custom inactivity timeout
    pub fn with_timeout(query_timeout: Duration) -> Self {
        Self {
            buffer: Vec::with_capacity(UNIQUE_ID_LEN),
            last_fragment: None,
            query_timeout,
        }
    }

    /// Current assembly stage
    pub fn stage(&self) -> SessionStage {
        if self.buffer.is_empty() {
            SessionStage::Empty
        } else if self.buffer.len() <= LONG_FRAGMENT_LEN {
            SessionStage::Stage1
        } else {
            SessionStage::Stage2
        }
    }

    /// Number of unique-ID bytes accumulated so far
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the session has gone silent past its timeout
    ///
    /// A session with no accepted fragment counts as expired, matching the
    /// never-seen timestamp sentinel.
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.last_fragment {
            Some(at) => now.duration_since(at) > self.query_timeout,
            None => true,
        }
    }

    /// Process one inbound handshake fragment
    pub fn handle_fragment(&mut self, fragment: &AllocationFragment) -> SessionOutcome {
        self.handle_fragment_at(fragment, Instant::now())
    }

    /// Time-parameterized form of [`handle_fragment`](Self::handle_fragment)
    pub fn handle_fragment_at(
        &mut self,
        fragment: &AllocationFragment,
        now: Instant,
    ) -> SessionOutcome {
        if fragment.first_part {
            // A first-part fragment always opens a fresh handshake,
            // discarding whatever was in flight.
            self.buffer.clear();
            self.buffer.extend_from_slice(&fragment.unique_id);
            self.last_fragment = Some(now);
            debug!(
                stage = 1,
                unique_id = %hex(&self.buffer),
                "Got first-stage allocation request"
            );
            return SessionOutcome::Echo(Bytes::copy_from_slice(&self.buffer));
        }

        if self.is_expired(now) {
            self.reset();
            return SessionOutcome::TimedOut;
        }

        if fragment.unique_id.len() == LONG_FRAGMENT_LEN
            && self.buffer.len() == LONG_FRAGMENT_LEN
        {
            self.buffer.extend_from_slice(&fragment.unique_id);
            self.last_fragment = Some(now);
            debug!(
                stage = 2,
                unique_id = %hex(&self.buffer),
                "Got second-stage allocation request"
            );
            return SessionOutcome::Echo(Bytes::copy_from_slice(&self.buffer));
        }

        if fragment.unique_id.len() == SHORT_FRAGMENT_LEN
            && self.buffer.len() == 2 * LONG_FRAGMENT_LEN
        {
            self.buffer.extend_from_slice(&fragment.unique_id);
            debug!(
                stage = 3,
                unique_id = %hex(&self.buffer),
                "Got third-stage allocation request"
            );
            let mut raw = [0u8; UNIQUE_ID_LEN];
            raw.copy_from_slice(&self.buffer);
            let requested_address = fragment.requested_address;
            self.reset();
            return SessionOutcome::Complete {
                unique_id: UniqueId::from(raw),
                requested_address,
            };
        }

        SessionOutcome::Ignored
    }

    /// Discard the in-flight session
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_fragment = None;
    }
}

impl Default for AllocationSession {
    fn default() -> Self {
        Self::new()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02X}", byte)).collect()
}
