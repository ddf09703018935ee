use log::{Level, log};

use crate::dispatcher::Transport;
use crate::packet::MeshPacket;
use crate::{NodeAddr, RxPacketQueueSender};

/// Loopback link: every unicast is delivered straight back into this
/// node's own RX queue. Useful for exercising the full stack on a single
/// node without any radio.
pub struct EchoLink {
    rx_sender: Option<RxPacketQueueSender>,
}

impl EchoLink {
    pub const fn new() -> Self {
        EchoLink { rx_sender: None }
    }
}

impl Transport for EchoLink {
    fn attach(&mut self, local_addr: NodeAddr, rx_sender: RxPacketQueueSender) {
        log!(Level::Info, "Echo link attached to node {}", local_addr);
        self.rx_sender = Some(rx_sender);
    }

    fn send(&mut self, _next_hop: NodeAddr, packet: &MeshPacket) -> bool {
        let Some(sender) = &self.rx_sender else {
            return false;
        };
        match sender.try_send(*packet) {
            Ok(()) => true,
            Err(_) => {
                log!(Level::Warn, "RX queue full, dropping echoed packet");
                false
            }
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::RxPacketQueue;
    use crate::packet::{MeshPacket, PacketHeader};
    use embassy_sync::channel::Channel;

    #[test]
    fn unattached_link_refuses_to_send() {
        let mut link = EchoLink::new();
        let packet = MeshPacket::with(
            PacketHeader {
                hop_count: 1,
                sender: 2,
                origin: 2,
                destination: 1,
            },
            &[5],
        )
        .unwrap();
        assert!(!link.send(1, &packet));
    }

    #[test]
    fn sent_packet_comes_straight_back() {
        let rx: &'static RxPacketQueue = Box::leak(Box::new(Channel::new()));
        let mut link = EchoLink::new();
        link.attach(2, rx.sender());

        let packet = MeshPacket::with(
            PacketHeader {
                hop_count: 1,
                sender: 2,
                origin: 2,
                destination: 1,
            },
            &[5, 6],
        )
        .unwrap();
        assert!(link.send(1, &packet));
        assert_eq!(rx.try_receive().unwrap(), packet);
    }
}
