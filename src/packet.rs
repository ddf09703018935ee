use crate::{NodeAddr, PACKET_PAYLOAD_SIZE};

/// Link-layer header attributes carried beside the payload.
///
/// The transport is required to round-trip all four attributes unchanged:
/// `sender` is rewritten at every hop, while `origin` and `destination`
/// (the extended sender/receiver pair) stay stable end-to-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketHeader {
    /// Number of relay transmissions since origination. Starts at 1 on the
    /// first transmit of a fresh local send, incremented by exactly 1 per
    /// forwarding hop.
    pub hop_count: u8,
    /// Address of the most recent forwarder.
    pub sender: NodeAddr,
    /// Address of the node that created the data (extended sender).
    pub origin: NodeAddr,
    /// Final addressee (extended receiver).
    pub destination: NodeAddr,
}

/// An immutable snapshot of a packet's payload and addressing.
///
/// Snapshots are value copies taken at enqueue time; reuse of the live
/// transmit buffer never alters a snapshot already sitting in the queue.
#[derive(Clone, Copy, Debug)]
pub struct MeshPacket {
    pub(crate) header: PacketHeader,
    pub(crate) payload: [u8; PACKET_PAYLOAD_SIZE],
    pub(crate) length: usize,
}

impl MeshPacket {
    /// Builds a packet from a header and payload bytes. Fails if the
    /// payload does not fit the link MTU.
    pub fn with(header: PacketHeader, payload: &[u8]) -> Result<Self, ()> {
        if payload.len() > PACKET_PAYLOAD_SIZE {
            return Err(());
        }
        let mut buffer = [0u8; PACKET_PAYLOAD_SIZE];
        buffer[..payload.len()].copy_from_slice(payload);
        Ok(MeshPacket {
            header,
            payload: buffer,
            length: payload.len(),
        })
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.length]
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl PartialEq for MeshPacket {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header && self.payload() == other.payload()
    }
}

impl Eq for MeshPacket {}

/// The node's reusable transmit buffer.
///
/// One buffer per node, loaded from queue snapshots or fresh payloads and
/// stamped by the dispatcher before each transmit. The buffer keeps
/// whatever the previous occupant left beyond the current length until
/// `compact` is called.
pub struct PacketBuf {
    pub(crate) header: PacketHeader,
    data: [u8; PACKET_PAYLOAD_SIZE],
    length: usize,
}

impl PacketBuf {
    pub const fn new() -> Self {
        PacketBuf {
            header: PacketHeader {
                hop_count: 0,
                sender: 0,
                origin: 0,
                destination: 0,
            },
            data: [0u8; PACKET_PAYLOAD_SIZE],
            length: 0,
        }
    }

    /// Replaces the buffer contents with a fresh payload. The header
    /// attributes are left untouched; the dispatcher stamps them.
    pub fn copy_from(&mut self, payload: &[u8]) -> Result<(), ()> {
        if payload.len() > PACKET_PAYLOAD_SIZE {
            return Err(());
        }
        self.data[..payload.len()].copy_from_slice(payload);
        self.length = payload.len();
        Ok(())
    }

    /// Discards slack left behind by a prior, longer occupant of the
    /// buffer. Run before stamping and transmitting.
    pub fn compact(&mut self) {
        for byte in self.data[self.length..].iter_mut() {
            *byte = 0;
        }
    }

    /// Materializes a queued snapshot into the transmit path.
    pub fn load(&mut self, packet: &MeshPacket) {
        self.header = packet.header;
        self.data = packet.payload;
        self.length = packet.length;
    }

    /// Takes an immutable snapshot of the current contents. Only the live
    /// region is captured; slack bytes never reach a snapshot.
    pub fn snapshot(&self) -> MeshPacket {
        let mut payload = [0u8; PACKET_PAYLOAD_SIZE];
        payload[..self.length].copy_from_slice(&self.data[..self.length]);
        MeshPacket {
            header: self.header,
            payload,
            length: self.length,
        }
    }

    pub fn header(&self) -> &PacketHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.length]
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    fn header() -> PacketHeader {
        PacketHeader {
            hop_count: 2,
            sender: 4,
            origin: 7,
            destination: 1,
        }
    }

    #[test]
    fn packet_rejects_oversized_payload() {
        let too_big = [0u8; PACKET_PAYLOAD_SIZE + 1];
        assert!(MeshPacket::with(header(), &too_big).is_err());
    }

    #[test]
    fn snapshot_is_byte_for_byte_identical() {
        let payload = [0xA5u8, 0x5A, 0x01, 0x02, 0x03];
        let packet = MeshPacket::with(header(), &payload).unwrap();

        let mut buf = PacketBuf::new();
        buf.load(&packet);
        let copy = buf.snapshot();

        assert_eq!(copy.payload(), &payload);
        assert_eq!(copy.header(), &header());
        assert_eq!(copy, packet);
    }

    #[test]
    fn snapshot_survives_later_buffer_reuse() {
        let mut buf = PacketBuf::new();
        buf.copy_from(&[1, 2, 3, 4]).unwrap();
        buf.header = header();
        let snapshot = buf.snapshot();

        // Reuse the live buffer for something else entirely.
        buf.copy_from(&[9, 9]).unwrap();
        buf.header.hop_count = 77;

        assert_eq!(snapshot.payload(), &[1, 2, 3, 4]);
        assert_eq!(snapshot.header().hop_count, 2);
    }

    #[test]
    fn compact_clears_slack_from_prior_use() {
        let mut buf = PacketBuf::new();
        buf.copy_from(&[0xFF; 16]).unwrap();
        buf.copy_from(&[1, 2]).unwrap();
        buf.compact();

        assert_eq!(buf.payload(), &[1, 2]);
        // The snapshot of a compacted buffer carries no residue either way,
        // but the backing store itself must be clean after compact.
        let snapshot = buf.snapshot();
        assert_eq!(snapshot.payload(), &[1, 2]);
    }
}
