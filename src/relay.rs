//! Log Relay
//!
//! Forwards structured log broadcasts from nodes on the bus into the
//! server's own log stream, dispatched by severity.

use crate::protocol::{LogBroadcast, NodeAddress, Severity};
use tracing::{debug, error, info, warn};

/// Relays device log broadcasts into the tracing sinks
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRelay;

impl LogRelay {
    pub fn new() -> Self {
        Self
    }

    /// Relay one log broadcast at its reported severity
    pub fn relay(&self, message: &LogBroadcast) {
        self.relay_parts(
            message.source,
            &message.source_name,
            &message.text,
            message.severity,
        );
    }

    /// Relay a pre-split log line
    pub fn relay_parts(
        &self,
        source: NodeAddress,
        source_name: &str,
        text: &str,
        severity: Severity,
    ) {
        match severity {
            Severity::Debug => {
                debug!(address = source.get(), source = source_name, "{}", text)
            }
            Severity::Info => {
                info!(address = source.get(), source = source_name, "{}", text)
            }
            Severity::Warning => {
                warn!(address = source.get(), source = source_name, "{}", text)
            }
            Severity::Error => {
                error!(address = source.get(), source = source_name, "{}", text)
            }
        }
    }
}
