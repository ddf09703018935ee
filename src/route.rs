use crate::{NodeAddr, ROUTE_TABLE_SIZE};

/// One entry of the route table maintained by the external distance-
/// vector protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: NodeAddr,
    pub next_hop: NodeAddr,
    pub cost: u8,
}

pub type RoutesSnapshot = [Option<RouteEntry>; ROUTE_TABLE_SIZE];

/// Seam to the route-discovery collaborator. The protocol itself lives
/// outside this core; the node only triggers discovery and reads the
/// resulting table for the operator surface.
pub trait RouteDiscovery {
    fn discover(&mut self, target: NodeAddr);

    fn routes(&self) -> RoutesSnapshot;
}

/// Backend-less stand-in: discovery requests are logged and the table
/// stays empty.
pub struct NullRouteDiscovery;

impl RouteDiscovery for NullRouteDiscovery {
    fn discover(&mut self, target: NodeAddr) {
        log::debug!("route discovery requested for {} (no backend attached)", target);
    }

    fn routes(&self) -> RoutesSnapshot {
        [None; ROUTE_TABLE_SIZE]
    }
}
