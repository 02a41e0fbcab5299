use actix::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use dispatch_component::{MessageBus, TransportError};
use dispatch_protocol::{AgentIdentity, Message};

use crate::actor::Deliver;

/// In-process message bus. Routes serialized messages to agents' mailboxes
/// by address.
#[derive(Clone, Default)]
pub struct LocalBus {
    mailboxes: Arc<RwLock<HashMap<String, Recipient<Deliver>>>>,
}

impl LocalBus {
    pub fn new() -> LocalBus {
        LocalBus::default()
    }

    pub fn register(&self, identity: &AgentIdentity, mailbox: Recipient<Deliver>) {
        match self.mailboxes.write() {
            Ok(mut mailboxes) => {
                if mailboxes
                    .insert(identity.address.clone(), mailbox)
                    .is_some()
                {
                    log::warn!("Address [{}] was already registered. Replacing.", identity);
                }
            }
            Err(_) => log::warn!("Can't register [{}]. Bus registry poisoned.", identity),
        }
    }

    pub fn unregister(&self, identity: &AgentIdentity) {
        match self.mailboxes.write() {
            Ok(mut mailboxes) => {
                mailboxes.remove(&identity.address);
            }
            Err(_) => log::warn!("Can't unregister [{}]. Bus registry poisoned.", identity),
        }
    }

    /// Connection, that sends messages on behalf of `identity`.
    pub fn connect(&self, identity: AgentIdentity) -> BusConnection {
        BusConnection {
            identity,
            bus: self.clone(),
        }
    }
}

pub struct BusConnection {
    identity: AgentIdentity,
    bus: LocalBus,
}

impl MessageBus for BusConnection {
    fn send(&self, to: &AgentIdentity, message: &Message) -> Result<(), TransportError> {
        let body = message.encode()?;
        let mailboxes = self
            .bus
            .mailboxes
            .read()
            .map_err(|_| TransportError::Closed(to.address.clone()))?;

        let mailbox = mailboxes
            .get(&to.address)
            .ok_or_else(|| TransportError::UnknownRecipient(to.address.clone()))?;

        if !mailbox.connected() {
            return Err(TransportError::Closed(to.address.clone()));
        }

        log::debug!("[{}] -> [{}]: {}", self.identity, to, message);

        // Doesn't wait for mailbox capacity. Bus stores messages until
        // recipient is ready to process them.
        mailbox.do_send(Deliver {
            from: self.identity.clone(),
            body,
        });
        Ok(())
    }
}
