use actix::prelude::*;
use anyhow::Result;
use std::time::Instant;
use tokio::sync::mpsc;

use dispatch_protocol::AgentIdentity;

use crate::agent::{Agent, AgentSpec};
use crate::bus::LocalBus;
use crate::session::SessionOutcome;

/// Message delivered to agent by the bus.
#[derive(Message, Clone, Debug)]
#[rtype(result = "()")]
pub struct Deliver {
    pub from: AgentIdentity,
    pub body: String,
}

/// Asks Requester to start new negotiation session.
#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<()>")]
pub struct RequestService {}

#[derive(Message, Clone, Debug)]
#[rtype(result = "Result<()>")]
pub struct Shutdown {}

/// Channels on which agent reports results of its work.
pub struct AgentCallbacks {
    pub outcome_channel: mpsc::UnboundedReceiver<SessionOutcome>,
}

/// Runs `Agent` on actix. Feeds inbound messages into agent's event queue
/// and keeps single timer armed for the next due event.
pub struct AgentActor {
    agent: Agent,
    bus: LocalBus,
    timer: Option<SpawnHandle>,
    outcomes: mpsc::UnboundedSender<SessionOutcome>,
}

impl AgentActor {
    /// Starts agent and connects it to the bus.
    pub fn spawn(spec: AgentSpec, bus: &LocalBus) -> (AgentAddr, AgentCallbacks) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let identity = spec.identity.clone();

        let bus = bus.clone();
        let addr = AgentActor::create(move |ctx| {
            bus.register(&spec.identity, ctx.address().recipient());
            let connection = bus.connect(spec.identity.clone());

            AgentActor {
                agent: Agent::new(spec, Box::new(connection)),
                bus,
                timer: None,
                outcomes: sender,
            }
        });

        let addr = AgentAddr {
            identity,
            on_request: addr.clone().recipient(),
            on_shutdown: addr.recipient(),
        };
        let callbacks = AgentCallbacks {
            outcome_channel: receiver,
        };
        (addr, callbacks)
    }

    fn pump(&mut self, ctx: &mut Context<Self>) {
        for outcome in self.agent.advance(Instant::now()) {
            self.outcomes.send(outcome).ok();
        }

        if let Some(handle) = self.timer.take() {
            ctx.cancel_future(handle);
        }

        if let Some(due) = self.agent.next_wakeup() {
            let delay = due.saturating_duration_since(Instant::now());
            self.timer = Some(ctx.run_later(delay, |actor, ctx| {
                actor.timer = None;
                actor.pump(ctx);
            }));
        }
    }
}

impl Actor for AgentActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.agent.start(Instant::now());
        self.pump(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        log::info!("[{}] Going offline.", self.agent.identity().name);
        self.bus.unregister(self.agent.identity());
    }
}

impl Handler<Deliver> for AgentActor {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Context<Self>) -> Self::Result {
        self.agent.deliver(msg.from, msg.body, Instant::now());
        self.pump(ctx);
    }
}

impl Handler<RequestService> for AgentActor {
    type Result = Result<()>;

    fn handle(&mut self, _: RequestService, ctx: &mut Context<Self>) -> Self::Result {
        self.agent.request_service(Instant::now())?;
        self.pump(ctx);
        Ok(())
    }
}

impl Handler<Shutdown> for AgentActor {
    type Result = Result<()>;

    fn handle(&mut self, _: Shutdown, ctx: &mut Context<Self>) -> Self::Result {
        ctx.stop();
        Ok(())
    }
}

#[derive(Clone)]
pub struct AgentAddr {
    pub identity: AgentIdentity,
    pub on_request: Recipient<RequestService>,
    pub on_shutdown: Recipient<Shutdown>,
}

impl AgentAddr {
    pub async fn request_service(&self) -> Result<()> {
        self.on_request.send(RequestService {}).await?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.on_shutdown.send(Shutdown {}).await?
    }
}
