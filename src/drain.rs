//! Drain/retry driver for the outbound queue.
//!
//! Ticked at a fixed interval by the node task (the interval is
//! unconditional, whether or not the previous attempt succeeded). Each
//! tick materializes the queue head into the transmit buffer and runs it
//! through selection and dispatch; transport success dequeues the head,
//! failure leaves it queued verbatim for the next tick.
//!
//! The driver is an explicit state machine:
//!
//! - `Idle` — queue empty, nothing to do until something is enqueued.
//! - `AwaitingTimer` — backlog present, waiting for the next tick.
//! - `Sending` — an attempt is in progress (transient within a tick).
//! - `AwaitingEvent` — the last attempt failed; waiting for the next
//!   tick or for fresh neighbor state.
//!
//! Transitions: enqueue moves `Idle` to `AwaitingTimer`; a tick moves
//! `AwaitingTimer`/`AwaitingEvent` through `Sending` to `AwaitingTimer`
//! (more backlog), `Idle` (drained) or `AwaitingEvent` (failed); a
//! neighbor update moves `AwaitingEvent` back to `AwaitingTimer` and
//! clears the cached retry target so selection re-runs on fresh state.
//!
//! After a link failure the fully addressed packet and its resolved next
//! hop are cached, and subsequent ticks redeliver that exact form to the
//! same target via `resend` — the queued snapshot itself is never
//! modified by retries. An optional per-packet retry budget bounds the
//! number of failed attempts before the head is abandoned; with no
//! budget a persistently unreachable next hop blocks the head of the
//! queue indefinitely.

use log::{Level, log};

use crate::dispatcher::{MultihopDispatcher, SendError, Transport};
use crate::neighbor_table::NeighborTable;
use crate::next_hop::ForwardPolicy;
use crate::node::EnergyMeter;
use crate::packet::{MeshPacket, PacketBuf};
use crate::packet_queue::PacketQueue;
use crate::NodeAddr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainState {
    Idle,
    AwaitingTimer,
    Sending,
    AwaitingEvent,
}

/// What one drain cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Queue was empty.
    Empty,
    /// Head handed to the transport and accepted; dequeued.
    Sent(NodeAddr),
    /// Selector found no next hop; head left queued.
    NoRoute,
    /// Transport refused the packet; head left queued.
    LinkFailed(NodeAddr),
    /// No forward policy registered; head left queued.
    NoPolicy,
    /// Retry budget exhausted; head abandoned.
    Dropped,
}

pub struct DrainDriver {
    state: DrainState,
    retry_budget: Option<u8>,
    head_attempts: u8,
    head_retry: Option<(MeshPacket, NodeAddr)>,
}

impl DrainDriver {
    pub const fn with(retry_budget: Option<u8>) -> Self {
        DrainDriver {
            state: DrainState::Idle,
            retry_budget,
            head_attempts: 0,
            head_retry: None,
        }
    }

    pub fn state(&self) -> DrainState {
        self.state
    }

    /// Called after a successful enqueue.
    pub fn note_backlog(&mut self) {
        if self.state == DrainState::Idle {
            self.state = DrainState::AwaitingTimer;
        }
    }

    /// Called when the neighbor table changed. New topology may unblock a
    /// stuck head, so the cached retry target is discarded and selection
    /// re-runs on the next tick.
    pub fn note_neighbor_update(&mut self) {
        self.head_retry = None;
        if self.state == DrainState::AwaitingEvent {
            self.state = DrainState::AwaitingTimer;
        }
    }

    /// One drain cycle: attempt the queue head once.
    pub fn tick<const N: usize, P: ForwardPolicy, T: Transport>(
        &mut self,
        queue: &mut PacketQueue<N>,
        dispatcher: &MultihopDispatcher<P>,
        neighbors: &NeighborTable,
        transport: &mut T,
        buf: &mut PacketBuf,
        energy: &mut EnergyMeter,
    ) -> DrainOutcome {
        let Some(head) = queue.peek_front() else {
            self.state = DrainState::Idle;
            return DrainOutcome::Empty;
        };
        self.state = DrainState::Sending;

        // Redeliver a previously addressed head to the same target.
        if let Some((packet, next_hop)) = self.head_retry {
            energy.note_transmit();
            if dispatcher.resend(&packet, next_hop, transport) {
                return self.head_done(queue, DrainOutcome::Sent(next_hop));
            }
            return self.head_failed(queue, DrainOutcome::LinkFailed(next_hop));
        }

        buf.load(head);
        let result = if head.header().origin == dispatcher.local_addr() {
            let destination = head.header().destination;
            dispatcher.send(buf, destination, neighbors, transport)
        } else {
            dispatcher.forward(buf, neighbors, transport)
        };

        match result {
            Ok(status) => {
                energy.note_transmit();
                if status.delivered {
                    self.head_done(queue, DrainOutcome::Sent(status.next_hop))
                } else {
                    self.head_retry = Some((buf.snapshot(), status.next_hop));
                    self.head_failed(queue, DrainOutcome::LinkFailed(status.next_hop))
                }
            }
            Err(SendError::NoRoute) => self.head_failed(queue, DrainOutcome::NoRoute),
            Err(SendError::NoForwardPolicy) => {
                log!(Level::Warn, "drain cycle with no forward policy registered");
                self.state = DrainState::AwaitingEvent;
                DrainOutcome::NoPolicy
            }
        }
    }

    fn head_done<const N: usize>(&mut self, queue: &mut PacketQueue<N>, outcome: DrainOutcome) -> DrainOutcome {
        queue.dequeue_front();
        self.head_attempts = 0;
        self.head_retry = None;
        self.state = if queue.is_empty() {
            DrainState::Idle
        } else {
            DrainState::AwaitingTimer
        };
        outcome
    }

    fn head_failed<const N: usize>(&mut self, queue: &mut PacketQueue<N>, outcome: DrainOutcome) -> DrainOutcome {
        self.head_attempts = self.head_attempts.saturating_add(1);
        if let Some(budget) = self.retry_budget {
            if self.head_attempts >= budget {
                log!(
                    Level::Warn,
                    "abandoning queue head after {} failed attempts",
                    self.head_attempts
                );
                return self.head_done(queue, DrainOutcome::Dropped);
            }
        }
        self.state = DrainState::AwaitingEvent;
        outcome
    }
}
