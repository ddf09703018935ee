//! # Multihop Dispatcher - Forwarding Decisions and Transmit Path
//!
//! This module implements the packet handling core that sits between the
//! link-layer unicast transport and the rest of the node.
//!
//! ## Receive path
//!
//! An inbound packet already delivered by the transport is inspected:
//! - addressed to this node: it is delivered locally, carrying its
//!   origin, last-hop and hop-count attributes exactly as they arrived;
//! - addressed elsewhere: it is a forwarding opportunity. The hop count
//!   is incremented by one, the packet is snapshotted and handed back for
//!   the outbound queue. With no forward policy registered the packet is
//!   dropped without comment.
//!
//! ## Send path
//!
//! A locally originated send compacts the transmit buffer, stamps the
//! four header attributes (destination, origin, rewritten sender,
//! incremented hop count), resolves the next hop through the registered
//! forward policy and hands the packet to the transport. The transport's
//! own success/failure report is passed through untranslated.
//!
//! A separate `resend` retransmits an already-addressed packet to an
//! explicit next hop without re-running selection; the retry driver uses
//! it to redeliver a queue head to the same target.

use log::{Level, log};

use crate::neighbor_table::NeighborTable;
use crate::next_hop::ForwardPolicy;
use crate::packet::{MeshPacket, PacketBuf};
use crate::{NodeAddr, RxPacketQueueSender};

/// Link-layer unicast seam.
///
/// Implementations deliver a packet to a directly reachable neighbor and
/// report acceptance as a plain bool; whatever acknowledgement or
/// retransmission the link performs is its own business. Inbound traffic
/// flows through the RX queue sender wired in at `attach` time.
pub trait Transport {
    /// Wires the transport to this node: its own address and the channel
    /// inbound packets are delivered on.
    fn attach(&mut self, local_addr: NodeAddr, rx_sender: RxPacketQueueSender);

    /// Unicast toward a direct neighbor. `true` means the link accepted
    /// the packet.
    fn send(&mut self, next_hop: NodeAddr, packet: &MeshPacket) -> bool;
}

/// Why a send produced no transmission. Both are non-fatal: the caller
/// may leave the packet queued and retry on a later tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendError {
    /// No forward policy is registered; nothing can be transmitted.
    NoForwardPolicy,
    /// The selector found no usable next hop.
    NoRoute,
}

/// Outcome of a send that reached the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendStatus {
    pub next_hop: NodeAddr,
    /// The transport's report, passed through exactly.
    pub delivered: bool,
}

/// Receive-path decision for one inbound packet.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Inbound {
    /// Addressed to this node: deliver to the local callback.
    Local,
    /// Relay opportunity: hop count already incremented, snapshot ready
    /// for the outbound queue.
    Forward(MeshPacket),
    /// Not for us and no forward policy registered.
    Drop,
}

pub struct MultihopDispatcher<P: ForwardPolicy> {
    local_addr: NodeAddr,
    policy: Option<P>,
}

impl<P: ForwardPolicy> MultihopDispatcher<P> {
    pub fn with(local_addr: NodeAddr) -> Self {
        MultihopDispatcher { local_addr, policy: None }
    }

    pub fn set_forward_policy(&mut self, policy: P) {
        self.policy = Some(policy);
    }

    pub fn has_forward_policy(&self) -> bool {
        self.policy.is_some()
    }

    pub fn local_addr(&self) -> NodeAddr {
        self.local_addr
    }

    /// Receive-side decision. Does not touch the queue or the transport;
    /// the node core acts on the returned decision.
    pub(crate) fn receive(&self, packet: &MeshPacket) -> Inbound {
        if packet.header().destination == self.local_addr {
            return Inbound::Local;
        }

        if self.policy.is_none() {
            return Inbound::Drop;
        }

        let mut relay = *packet;
        relay.header.hop_count = relay.header.hop_count.saturating_add(1);
        Inbound::Forward(relay)
    }

    /// Send path for a locally originated packet sitting in `buf`.
    ///
    /// Stamps the header, resolves the next hop and unicasts. Fails with
    /// `NoForwardPolicy` before anything is stamped, `NoRoute` when the
    /// selector comes up empty.
    pub fn send<T: Transport>(
        &self,
        buf: &mut PacketBuf,
        to: NodeAddr,
        neighbors: &NeighborTable,
        transport: &mut T,
    ) -> Result<SendStatus, SendError> {
        let policy = self.policy.as_ref().ok_or(SendError::NoForwardPolicy)?;

        buf.compact();
        buf.header.destination = to;
        buf.header.origin = self.local_addr;
        buf.header.sender = self.local_addr;
        buf.header.hop_count = buf.header.hop_count.saturating_add(1);

        let next_hop = policy.next_hop(neighbors, to).ok_or(SendError::NoRoute)?;

        let packet = buf.snapshot();
        log!(
            Level::Debug,
            "sending data towards {} via {} (hops {})",
            to,
            next_hop,
            packet.header().hop_count
        );
        let delivered = transport.send(next_hop, &packet);
        Ok(SendStatus { next_hop, delivered })
    }

    /// Transmit path for a packet this node is relaying: the sender
    /// attribute is rewritten to this node, origin, destination and hop
    /// count ride through untouched (the hop was counted on receipt).
    pub fn forward<T: Transport>(
        &self,
        buf: &mut PacketBuf,
        neighbors: &NeighborTable,
        transport: &mut T,
    ) -> Result<SendStatus, SendError> {
        let policy = self.policy.as_ref().ok_or(SendError::NoForwardPolicy)?;

        buf.compact();
        buf.header.sender = self.local_addr;
        let destination = buf.header.destination;

        let next_hop = policy.next_hop(neighbors, destination).ok_or(SendError::NoRoute)?;

        let packet = buf.snapshot();
        log!(
            Level::Debug,
            "forwarding packet from {} towards {} via {}",
            packet.header().origin,
            destination,
            next_hop
        );
        let delivered = transport.send(next_hop, &packet);
        Ok(SendStatus { next_hop, delivered })
    }

    /// Retransmits an already-addressed packet to an explicit next hop,
    /// with no selection. Returns the transport's report.
    pub fn resend<T: Transport>(&self, packet: &MeshPacket, next_hop: NodeAddr, transport: &mut T) -> bool {
        transport.send(next_hop, packet)
    }
}
