//! Next-hop selection over the neighbor table.
//!
//! A forward policy is the neighbor-aware piece of the dispatcher: given
//! the current neighbor table and a packet's final destination it names
//! the single neighbor the packet should be handed to, or none. The
//! greedy policy shipped here minimizes hop distance to the sink and
//! tie-breaks on remaining battery to spread relay load across the
//! network's lifetime; direct sink adjacency always wins outright, since
//! it cannot be improved upon.

use crate::NodeAddr;
use crate::neighbor_table::NeighborTable;

/// Initial best-distance bound; no believable hop metric reaches it.
const SENTINEL_MAX: i16 = 200;

/// Pseudo-distance assigned to direct sink adjacency. Below any real hop
/// count, so no later candidate can displace the sink.
const SINK_ADJACENT: i16 = -1;

/// Names the relay a packet should be handed to next.
pub trait ForwardPolicy {
    fn next_hop(&self, neighbors: &NeighborTable, destination: NodeAddr) -> Option<NodeAddr>;
}

/// Greedy shortest-distance-to-sink selection, battery tie-break.
pub struct GreedySinkPolicy;

impl ForwardPolicy for GreedySinkPolicy {
    fn next_hop(&self, neighbors: &NeighborTable, destination: NodeAddr) -> Option<NodeAddr> {
        select(neighbors, destination)
    }
}

/// Single deterministic pass over the neighbor set.
///
/// Ties on hop distance go to the higher battery level; remaining ties go
/// to whichever record was seen first. An empty table, or one where no
/// candidate improves on the sentinel bound, yields `None`.
pub fn select(neighbors: &NeighborTable, sink_addr: NodeAddr) -> Option<NodeAddr> {
    let mut best = None;
    let mut best_hops = SENTINEL_MAX;
    let mut best_battery = 0u8;

    for neighbor in neighbors.iter() {
        if neighbor.addr == sink_addr {
            best = Some(neighbor.addr);
            best_hops = SINK_ADJACENT;
            best_battery = neighbor.battery_level;
        } else if (neighbor.hops_to_sink as i16) <= best_hops {
            if (neighbor.hops_to_sink as i16) < best_hops {
                best = Some(neighbor.addr);
                best_hops = neighbor.hops_to_sink as i16;
                best_battery = neighbor.battery_level;
            } else if neighbor.battery_level > best_battery {
                best = Some(neighbor.addr);
                best_battery = neighbor.battery_level;
            }
        }
    }

    best
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::neighbor_table::SINK_DISTANCE;

    const SINK: NodeAddr = 1;

    fn table(entries: &[(NodeAddr, u8, u8)]) -> NeighborTable {
        let mut table = NeighborTable::new();
        for &(addr, hops, battery) in entries {
            table.upsert(addr, hops, battery);
        }
        table
    }

    #[test]
    fn sink_adjacency_always_wins() {
        let neighbors = table(&[(SINK, SINK_DISTANCE, 0), (10, 3, 50), (11, 3, 80), (12, 2, 10)]);
        assert_eq!(select(&neighbors, SINK), Some(SINK));
    }

    #[test]
    fn sink_wins_even_when_seen_first() {
        // A closer-looking non-sink candidate after the sink must not
        // displace it.
        let neighbors = table(&[(SINK, SINK_DISTANCE, 0), (12, 1, 90)]);
        assert_eq!(select(&neighbors, SINK), Some(SINK));
    }

    #[test]
    fn lowest_hop_distance_wins() {
        let neighbors = table(&[(10, 3, 50), (11, 3, 80), (12, 2, 10)]);
        assert_eq!(select(&neighbors, SINK), Some(12));
    }

    #[test]
    fn equal_distance_breaks_on_battery() {
        let neighbors = table(&[(10, 3, 50), (11, 3, 80)]);
        assert_eq!(select(&neighbors, SINK), Some(11));
    }

    #[test]
    fn empty_table_yields_none() {
        let neighbors = NeighborTable::new();
        assert_eq!(select(&neighbors, SINK), None);
    }

    #[test]
    fn policy_trait_matches_free_function() {
        let neighbors = table(&[(10, 4, 10), (11, 2, 10)]);
        assert_eq!(GreedySinkPolicy.next_hop(&neighbors, SINK), Some(11));
    }
}
