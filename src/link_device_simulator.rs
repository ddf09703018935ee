use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{Level, log};

use crate::dispatcher::Transport;
use crate::packet::MeshPacket;
use crate::{NodeAddr, RxPacketQueueSender};

const SIM_NETWORK_SIZE: usize = 64;

#[derive(Clone, Copy)]
struct SimPeer {
    addr: NodeAddr,
    rx_sender: RxPacketQueueSender,
}

/// Shared registry wiring simulated links together: one entry per node,
/// mapping its address to its RX queue. Unicast between registered peers
/// is a channel push; anything else fails like an unreachable radio
/// neighbor.
pub struct SimNetwork {
    peers: Mutex<CriticalSectionRawMutex, RefCell<[Option<SimPeer>; SIM_NETWORK_SIZE]>>,
}

impl SimNetwork {
    pub const fn new() -> Self {
        SimNetwork {
            peers: Mutex::new(RefCell::new([const { None }; SIM_NETWORK_SIZE])),
        }
    }

    fn register(&self, addr: NodeAddr, rx_sender: RxPacketQueueSender) -> Result<(), ()> {
        self.peers.lock(|peers| {
            let mut peers = peers.borrow_mut();
            for slot in peers.iter_mut() {
                match slot {
                    Some(peer) if peer.addr == addr => {
                        peer.rx_sender = rx_sender;
                        return Ok(());
                    }
                    None => {
                        *slot = Some(SimPeer { addr, rx_sender });
                        return Ok(());
                    }
                    Some(_) => {}
                }
            }
            Err(())
        })
    }

    fn deliver(&self, to: NodeAddr, packet: MeshPacket) -> bool {
        self.peers.lock(|peers| {
            let peers = peers.borrow();
            for peer in peers.iter().flatten() {
                if peer.addr == to {
                    return peer.rx_sender.try_send(packet).is_ok();
                }
            }
            false
        })
    }
}

/// One node's attachment to a [`SimNetwork`].
pub struct SimLink {
    network: &'static SimNetwork,
    local_addr: NodeAddr,
}

impl SimLink {
    pub const fn with(network: &'static SimNetwork) -> Self {
        SimLink { network, local_addr: 0 }
    }
}

impl Transport for SimLink {
    fn attach(&mut self, local_addr: NodeAddr, rx_sender: RxPacketQueueSender) {
        self.local_addr = local_addr;
        if self.network.register(local_addr, rx_sender).is_err() {
            log!(Level::Error, "Simulated network full, node {} not reachable", local_addr);
        } else {
            log!(Level::Info, "Simulated link attached, node {}", local_addr);
        }
    }

    fn send(&mut self, next_hop: NodeAddr, packet: &MeshPacket) -> bool {
        let delivered = self.network.deliver(next_hop, *packet);
        if !delivered {
            log::trace!("simulated unicast {} -> {} failed", self.local_addr, next_hop);
        }
        delivered
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::RxPacketQueue;
    use crate::packet::{MeshPacket, PacketHeader};
    use embassy_sync::channel::Channel;

    fn packet() -> MeshPacket {
        MeshPacket::with(
            PacketHeader {
                hop_count: 1,
                sender: 2,
                origin: 2,
                destination: 1,
            },
            &[0xC0, 0xFF],
        )
        .unwrap()
    }

    #[test]
    fn unicast_reaches_the_registered_peer_only() {
        let network: &'static SimNetwork = Box::leak(Box::new(SimNetwork::new()));
        let rx_a: &'static RxPacketQueue = Box::leak(Box::new(Channel::new()));
        let rx_b: &'static RxPacketQueue = Box::leak(Box::new(Channel::new()));

        let mut link_a = SimLink::with(network);
        let mut link_b = SimLink::with(network);
        link_a.attach(1, rx_a.sender());
        link_b.attach(2, rx_b.sender());

        assert!(link_b.send(1, &packet()));
        assert_eq!(rx_a.try_receive().unwrap(), packet());
        assert!(rx_b.try_receive().is_err());
    }

    #[test]
    fn unknown_peer_is_unreachable() {
        let network: &'static SimNetwork = Box::leak(Box::new(SimNetwork::new()));
        let rx: &'static RxPacketQueue = Box::leak(Box::new(Channel::new()));
        let mut link = SimLink::with(network);
        link.attach(1, rx.sender());

        assert!(!link.send(9, &packet()));
    }
}
