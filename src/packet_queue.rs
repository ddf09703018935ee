//! Bounded FIFO of outbound packet snapshots.
//!
//! Insertion order is delivery-attempt order. Enqueue on a full queue
//! rejects the new packet and hands it back so the producer learns the
//! reading was dropped; existing entries are never evicted. Queued
//! snapshots are immutable, retries work on copies.

use crate::packet::MeshPacket;

pub struct PacketQueue<const N: usize> {
    slots: [Option<MeshPacket>; N],
    head: usize,
    len: usize,
}

impl<const N: usize> PacketQueue<N> {
    pub const fn new() -> Self {
        PacketQueue {
            slots: [const { None }; N],
            head: 0,
            len: 0,
        }
    }

    /// Takes ownership of a snapshot. On a full queue the packet is handed
    /// back unmodified.
    pub fn enqueue(&mut self, packet: MeshPacket) -> Result<(), MeshPacket> {
        if self.len == N {
            return Err(packet);
        }
        let tail = (self.head + self.len) % N;
        self.slots[tail] = Some(packet);
        self.len += 1;
        Ok(())
    }

    pub fn peek_front(&self) -> Option<&MeshPacket> {
        self.slots[self.head].as_ref()
    }

    pub fn dequeue_front(&mut self) -> Option<MeshPacket> {
        let packet = self.slots[self.head].take()?;
        self.head = (self.head + 1) % N;
        self.len -= 1;
        Some(packet)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Entries in FIFO order, head first.
    pub fn iter(&self) -> impl Iterator<Item = &MeshPacket> + '_ {
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % N].as_ref())
    }
}
