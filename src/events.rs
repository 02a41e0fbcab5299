use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::time::Instant;

use dispatch_protocol::{AgentIdentity, RequestId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AgentEvent {
    /// Requester should open new negotiation session.
    StartNegotiation,
    /// Collection window of session elapsed.
    CloseWindow(RequestId),
    /// Message delivered by the bus.
    Inbound { from: AgentIdentity, body: String },
}

#[derive(Debug)]
struct Scheduled {
    due: Instant,
    seq: u64,
    event: AgentEvent,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Agent's single queue of timers and inbound messages. Events are processed
/// in order of due time and events due at the same time in order of scheduling,
/// so interleaving of messages and timers is always well defined.
///
/// Queue doesn't read the clock by itself. Caller passes current time, which
/// allows tests to advance virtual time.
#[derive(Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Scheduled>>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> EventQueue {
        EventQueue::default()
    }

    pub fn schedule(&mut self, due: Instant, event: AgentEvent) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Scheduled { due, seq, event }));
    }

    /// Removes the earliest event, if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<(Instant, AgentEvent)> {
        match self.heap.peek() {
            Some(Reverse(scheduled)) if scheduled.due <= now => self
                .heap
                .pop()
                .map(|Reverse(scheduled)| (scheduled.due, scheduled.event)),
            _ => None,
        }
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(scheduled)| scheduled.due)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
