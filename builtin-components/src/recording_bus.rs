use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use dispatch_component::{MessageBus, TransportError};
use dispatch_protocol::{AgentIdentity, Message};

/// Bus that doesn't deliver anything, but remembers what was sent.
/// Clones share the same log, so one clone can be handed to an agent and
/// the other kept for inspection.
#[derive(Clone, Default)]
pub struct RecordingBus {
    sent: Arc<Mutex<Vec<(AgentIdentity, Message)>>>,
    unreachable: Arc<Mutex<HashSet<String>>>,
}

impl RecordingBus {
    pub fn new() -> RecordingBus {
        RecordingBus::default()
    }

    /// Sends to this address will fail, as if recipient was disconnected.
    pub fn disconnect(&self, address: &str) {
        if let Ok(mut unreachable) = self.unreachable.lock() {
            unreachable.insert(address.to_string());
        }
    }

    pub fn sent(&self) -> Vec<(AgentIdentity, Message)> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    pub fn take(&self) -> Vec<(AgentIdentity, Message)> {
        self.sent
            .lock()
            .map(|mut sent| sent.drain(..).collect())
            .unwrap_or_default()
    }
}

impl MessageBus for RecordingBus {
    fn send(&self, to: &AgentIdentity, message: &Message) -> Result<(), TransportError> {
        // Catch messages, that couldn't be put on the wire.
        message.encode()?;

        let disconnected = self
            .unreachable
            .lock()
            .map(|unreachable| unreachable.contains(&to.address))
            .unwrap_or(false);
        if disconnected {
            return Err(TransportError::UnknownRecipient(to.address.clone()));
        }

        self.sent
            .lock()
            .map_err(|_| TransportError::Closed(to.address.clone()))?
            .push((to.clone(), message.clone()));
        Ok(())
    }
}
