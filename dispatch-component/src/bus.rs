use dispatch_protocol::{AgentIdentity, Message, ProtocolError};

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("Recipient [{0}] is not connected to the bus")]
    UnknownRecipient(String),
    #[error("Recipient [{0}] mailbox is closed")]
    Closed(String),
    #[error(transparent)]
    Encode(#[from] ProtocolError),
}

/// Agent's connection to the message bus. Sender identity is implied by the
/// connection, so only the recipient must be given.
///
/// Delivery is asynchronous: `Ok` means, that message was handed over to the
/// bus, not that recipient processed it.
pub trait MessageBus {
    fn send(&self, to: &AgentIdentity, message: &Message) -> Result<(), TransportError>;
}
