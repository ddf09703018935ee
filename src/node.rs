use log::{Level, log};

use crate::command::{Command, CommandResponse, NeighborSummary, QueueEntrySummary, SenseOutcome};
use crate::dispatcher::{Inbound, MultihopDispatcher, Transport};
use crate::drain::{DrainDriver, DrainOutcome};
use crate::neighbor_table::NeighborTable;
use crate::next_hop::GreedySinkPolicy;
use crate::packet::{MeshPacket, PacketBuf, PacketHeader};
use crate::packet_queue::PacketQueue;
use crate::route::RouteDiscovery;
use crate::sensor::Sensor;
use crate::{
    DeliveryQueueSender, NEIGHBOR_TABLE_SIZE, NodeAddr, NodeConfiguration, PACKET_PAYLOAD_SIZE, PACKET_QUEUE_SIZE,
    ResponseQueueSender,
};

#[cfg(any(feature = "link-device-echo", feature = "link-device-simulator"))]
use crate::{ControlQueueReceiver, LinkDevice, MAX_NODE_COUNT, RxPacketQueueReceiver};
#[cfg(any(feature = "link-device-echo", feature = "link-device-simulator"))]
use embassy_futures::select::{Either3, select3};
#[cfg(any(feature = "link-device-echo", feature = "link-device-simulator"))]
use embassy_time::{Duration, Ticker};

/// Abstract energy bookkeeping: one event per radio transmission, radio
/// reception or sensor sample. Owned by the node core and passed by
/// handle to whoever spends energy; there is no ambient global counter.
pub struct EnergyMeter {
    events: u32,
}

impl EnergyMeter {
    pub const fn new() -> Self {
        EnergyMeter { events: 0 }
    }

    pub fn note_transmit(&mut self) {
        self.events = self.events.saturating_add(1);
    }

    pub fn note_receive(&mut self) {
        self.events = self.events.saturating_add(1);
    }

    pub fn note_sample(&mut self) {
        self.events = self.events.saturating_add(1);
    }

    pub fn events(&self) -> u32 {
        self.events
    }
}

/// A locally delivered packet, handed to the application exactly once.
/// Carries the addressing attributes exactly as they arrived.
#[derive(Clone, Copy, Debug)]
pub struct Delivery {
    pub origin: NodeAddr,
    pub last_hop: NodeAddr,
    pub hop_count: u8,
    data: [u8; PACKET_PAYLOAD_SIZE],
    length: usize,
}

impl Delivery {
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.length]
    }
}

/// Everything the node reacts to besides inbound packets and the drain
/// timer: operator commands, neighbor-discovery reports and application
/// submissions.
pub enum NodeEvent {
    Command(Command),
    NeighborSeen {
        addr: NodeAddr,
        hops_to_sink: u8,
        battery_level: u8,
    },
    Transmit {
        destination: NodeAddr,
        data: [u8; PACKET_PAYLOAD_SIZE],
        length: usize,
    },
}

/// The node's single thread of control. All mutation happens inside one
/// reaction at a time (run-to-completion), so none of the owned state
/// needs locking.
pub(crate) struct NodeCore<T: Transport, S: Sensor, R: RouteDiscovery> {
    dispatcher: MultihopDispatcher<GreedySinkPolicy>,
    queue: PacketQueue<PACKET_QUEUE_SIZE>,
    neighbors: NeighborTable,
    drain: DrainDriver,
    energy: EnergyMeter,
    tx_buf: PacketBuf,
    transport: T,
    sensor: S,
    route_discovery: R,
    sink_addr: NodeAddr,
    delivery_sender: DeliveryQueueSender,
    response_sender: ResponseQueueSender,
}

impl<T: Transport, S: Sensor, R: RouteDiscovery> NodeCore<T, S, R> {
    pub(crate) fn with(
        local_addr: NodeAddr,
        sink_addr: NodeAddr,
        config: &NodeConfiguration,
        transport: T,
        sensor: S,
        route_discovery: R,
        delivery_sender: DeliveryQueueSender,
        response_sender: ResponseQueueSender,
    ) -> Self {
        let mut dispatcher = MultihopDispatcher::with(local_addr);
        dispatcher.set_forward_policy(GreedySinkPolicy);
        NodeCore {
            dispatcher,
            queue: PacketQueue::new(),
            neighbors: NeighborTable::new(),
            drain: DrainDriver::with(config.retry_budget),
            energy: EnergyMeter::new(),
            tx_buf: PacketBuf::new(),
            transport,
            sensor,
            route_discovery,
            sink_addr,
            delivery_sender,
            response_sender,
        }
    }

    /// Receive path: deliver locally or queue for relay.
    pub(crate) fn handle_inbound(&mut self, packet: MeshPacket) {
        self.energy.note_receive();
        match self.dispatcher.receive(&packet) {
            Inbound::Local => {
                // Copy the attributes before handing off; the application
                // side must see them exactly as they arrived.
                let header = *packet.header();
                let mut data = [0u8; PACKET_PAYLOAD_SIZE];
                data[..packet.length()].copy_from_slice(packet.payload());
                let delivery = Delivery {
                    origin: header.origin,
                    last_hop: header.sender,
                    hop_count: header.hop_count,
                    data,
                    length: packet.length(),
                };
                if self.delivery_sender.try_send(delivery).is_err() {
                    log!(
                        Level::Warn,
                        "Delivery queue full, dropping packet from {}. The application is not keeping up.",
                        header.origin
                    );
                }
            }
            Inbound::Forward(relay) => {
                let relay_header = *relay.header();
                match self.queue.enqueue(relay) {
                    Ok(()) => {
                        self.drain.note_backlog();
                        log::debug!(
                            "queued relay from {} towards {} (hops {})",
                            relay_header.origin,
                            relay_header.destination,
                            relay_header.hop_count
                        );
                    }
                    Err(refused) => {
                        log!(
                            Level::Warn,
                            "Relay queue full, dropping packet from {} towards {}",
                            refused.header().origin,
                            refused.header().destination
                        );
                    }
                }
            }
            Inbound::Drop => {
                log::trace!("not ours and no forward policy, dropping packet for {}", packet.header().destination);
            }
        }
    }

    pub(crate) fn handle_event(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::Command(command) => {
                let response = self.execute(command);
                if self.response_sender.try_send(response).is_err() {
                    log!(Level::Warn, "Response queue full, dropping command response");
                }
            }
            NodeEvent::NeighborSeen {
                addr,
                hops_to_sink,
                battery_level,
            } => {
                self.neighbors.upsert(addr, hops_to_sink, battery_level);
                self.drain.note_neighbor_update();
            }
            NodeEvent::Transmit {
                destination,
                data,
                length,
            } => {
                self.originate(destination, &data[..length]);
            }
        }
    }

    pub(crate) fn execute(&mut self, command: Command) -> CommandResponse {
        match command {
            Command::Routes => CommandResponse::Routes(self.route_discovery.routes()),
            Command::Discover => {
                self.route_discovery.discover(self.sink_addr);
                CommandResponse::DiscoverStarted { target: self.sink_addr }
            }
            Command::Send => CommandResponse::Drain(self.drain_cycle()),
            Command::Sense => CommandResponse::Sense(self.sense()),
            Command::Queue => {
                let mut entries = [None; PACKET_QUEUE_SIZE];
                for (slot, packet) in entries.iter_mut().zip(self.queue.iter()) {
                    *slot = Some(QueueEntrySummary {
                        origin: packet.header().origin,
                        destination: packet.header().destination,
                        hop_count: packet.header().hop_count,
                        length: packet.length(),
                    });
                }
                CommandResponse::Queue {
                    len: self.queue.len(),
                    capacity: self.queue.capacity(),
                    entries,
                }
            }
            Command::Battery => CommandResponse::Battery {
                energy_events: self.energy.events(),
            },
            Command::Neighbors => {
                let mut entries = [None; NEIGHBOR_TABLE_SIZE];
                for (slot, neighbor) in entries.iter_mut().zip(self.neighbors.iter()) {
                    *slot = Some(NeighborSummary {
                        addr: neighbor.addr,
                        hops_to_sink: neighbor.hops_to_sink,
                        battery_level: neighbor.battery_level,
                        heard_secs_ago: neighbor.last_heard.elapsed().as_secs(),
                    });
                }
                CommandResponse::Neighbors { entries }
            }
        }
    }

    /// Samples the sensor and queues the reading toward the sink.
    pub(crate) fn sense(&mut self) -> SenseOutcome {
        match self.sensor.sample() {
            Err(err) => {
                log!(Level::Warn, "sensor read failed: {:?}, nothing enqueued", err);
                SenseOutcome::SensorFailed(err)
            }
            Ok(reading) => {
                self.energy.note_sample();
                if self.originate(self.sink_addr, reading.as_bytes()) {
                    SenseOutcome::Enqueued
                } else {
                    SenseOutcome::QueueFull
                }
            }
        }
    }

    /// Creates a fresh locally originated packet and queues it. The hop
    /// count is stamped at transmit time, not here.
    fn originate(&mut self, destination: NodeAddr, payload: &[u8]) -> bool {
        let header = PacketHeader {
            hop_count: 0,
            sender: self.dispatcher.local_addr(),
            origin: self.dispatcher.local_addr(),
            destination,
        };
        let Ok(packet) = MeshPacket::with(header, payload) else {
            log!(Level::Warn, "payload exceeds MTU, dropping packet towards {}", destination);
            return false;
        };
        match self.queue.enqueue(packet) {
            Ok(()) => {
                self.drain.note_backlog();
                true
            }
            Err(_) => {
                log!(Level::Warn, "Outbound queue full, dropping packet towards {}", destination);
                false
            }
        }
    }

    /// One drain/retry cycle over the queue head.
    pub(crate) fn drain_cycle(&mut self) -> DrainOutcome {
        let outcome = self.drain.tick(
            &mut self.queue,
            &self.dispatcher,
            &self.neighbors,
            &mut self.transport,
            &mut self.tx_buf,
            &mut self.energy,
        );
        log::trace!("drain cycle: {:?}", outcome);
        outcome
    }
}

/// The node's single task: reacts to inbound packets, control events and
/// the drain timer, one reaction at a time.
#[cfg(any(feature = "link-device-echo", feature = "link-device-simulator"))]
#[embassy_executor::task(pool_size = MAX_NODE_COUNT)]
pub(crate) async fn node_task(
    mut core: NodeCore<LinkDevice, crate::sensor::SyntheticSensor, crate::route::NullRouteDiscovery>,
    rx_packet_queue_receiver: RxPacketQueueReceiver,
    control_queue_receiver: ControlQueueReceiver,
    drain_interval: Duration,
) -> ! {
    log!(Level::Info, "Node task started, drain interval: {}s", drain_interval.as_secs());
    let mut ticker = Ticker::every(drain_interval);
    loop {
        match select3(
            rx_packet_queue_receiver.receive(),
            control_queue_receiver.receive(),
            ticker.next(),
        )
        .await
        {
            Either3::First(packet) => core.handle_inbound(packet),
            Either3::Second(event) => core.handle_event(event),
            Either3::Third(()) => {
                let _ = core.drain_cycle();
            }
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::route::NullRouteDiscovery;
    use crate::sensor::{SensorReadError, SensorReading};
    use crate::{DeliveryQueue, ResponseQueue, RxPacketQueueSender};
    use embassy_sync::channel::Channel;

    const LOCAL: NodeAddr = 5;
    const SINK: NodeAddr = 1;

    struct TestTransport {
        sent: Vec<(NodeAddr, MeshPacket)>,
        accept: bool,
    }

    impl Transport for TestTransport {
        fn attach(&mut self, _local_addr: NodeAddr, _rx_sender: RxPacketQueueSender) {}

        fn send(&mut self, next_hop: NodeAddr, packet: &MeshPacket) -> bool {
            self.sent.push((next_hop, *packet));
            self.accept
        }
    }

    struct ScriptedSensor(Result<SensorReading, SensorReadError>);

    impl Sensor for ScriptedSensor {
        fn sample(&mut self) -> Result<SensorReading, SensorReadError> {
            self.0
        }
    }

    struct Rig {
        core: NodeCore<TestTransport, ScriptedSensor, NullRouteDiscovery>,
        deliveries: &'static DeliveryQueue,
        responses: &'static ResponseQueue,
    }

    fn rig_with(sensor: ScriptedSensor, accept: bool) -> Rig {
        let deliveries: &'static DeliveryQueue = Box::leak(Box::new(Channel::new()));
        let responses: &'static ResponseQueue = Box::leak(Box::new(Channel::new()));
        let config = NodeConfiguration {
            drain_interval_secs: 10,
            retry_budget: None,
        };
        let core = NodeCore::with(
            LOCAL,
            SINK,
            &config,
            TestTransport { sent: Vec::new(), accept },
            sensor,
            NullRouteDiscovery,
            deliveries.sender(),
            responses.sender(),
        );
        Rig { core, deliveries, responses }
    }

    fn rig() -> Rig {
        rig_with(ScriptedSensor(Ok(SensorReading::with(1, 2000))), true)
    }

    fn inbound(destination: NodeAddr, hop_count: u8, payload: &[u8]) -> MeshPacket {
        MeshPacket::with(
            PacketHeader {
                hop_count,
                sender: 9,
                origin: 7,
                destination,
            },
            payload,
        )
        .unwrap()
    }

    #[test]
    fn local_packet_is_delivered_exactly_once_with_attrs_unchanged() {
        let mut rig = rig();
        rig.core.handle_inbound(inbound(LOCAL, 3, &[10, 20, 30]));

        let delivery = rig.deliveries.try_receive().unwrap();
        assert_eq!(delivery.origin, 7);
        assert_eq!(delivery.last_hop, 9);
        assert_eq!(delivery.hop_count, 3);
        assert_eq!(delivery.payload(), &[10, 20, 30]);

        assert!(rig.deliveries.try_receive().is_err());
        assert_eq!(rig.core.queue.len(), 0);
    }

    #[test]
    fn foreign_packet_is_queued_for_relay_not_delivered() {
        let mut rig = rig();
        rig.core.handle_inbound(inbound(2, 3, &[1]));

        assert!(rig.deliveries.try_receive().is_err());
        assert_eq!(rig.core.queue.len(), 1);
        let queued = rig.core.queue.peek_front().unwrap();
        assert_eq!(queued.header().hop_count, 4);
        assert_eq!(queued.header().origin, 7);
    }

    #[test]
    fn relayed_packet_reaches_selected_neighbor_on_drain() {
        let mut rig = rig();
        rig.core.handle_event(NodeEvent::NeighborSeen {
            addr: 3,
            hops_to_sink: 1,
            battery_level: 70,
        });
        rig.core.handle_inbound(inbound(SINK, 2, &[0xAA]));

        assert_eq!(rig.core.drain_cycle(), DrainOutcome::Sent(3));
        let (next_hop, sent) = &rig.core.transport.sent[0];
        assert_eq!(*next_hop, 3);
        assert_eq!(sent.header().sender, LOCAL);
        assert_eq!(sent.header().origin, 7);
        assert_eq!(sent.header().hop_count, 3);
        assert_eq!(sent.payload(), &[0xAA]);
    }

    #[test]
    fn sense_enqueues_one_reading() {
        let mut rig = rig();
        assert_eq!(rig.core.sense(), SenseOutcome::Enqueued);
        assert_eq!(rig.core.queue.len(), 1);
        let queued = rig.core.queue.peek_front().unwrap();
        assert_eq!(queued.header().origin, LOCAL);
        assert_eq!(queued.header().destination, SINK);
        assert_eq!(queued.header().hop_count, 0);
    }

    #[test]
    fn sensor_failure_enqueues_nothing() {
        let mut rig = rig_with(ScriptedSensor(Err(SensorReadError::NotReady)), true);
        assert_eq!(rig.core.sense(), SenseOutcome::SensorFailed(SensorReadError::NotReady));
        assert_eq!(rig.core.queue.len(), 0);
        assert_eq!(rig.core.energy.events(), 0);
    }

    #[test]
    fn sense_on_full_queue_discards_the_new_reading() {
        let mut rig = rig();
        for _ in 0..PACKET_QUEUE_SIZE {
            assert_eq!(rig.core.sense(), SenseOutcome::Enqueued);
        }
        assert_eq!(rig.core.sense(), SenseOutcome::QueueFull);
        assert_eq!(rig.core.queue.len(), PACKET_QUEUE_SIZE);
    }

    #[test]
    fn commands_report_queue_battery_and_neighbors() {
        let mut rig = rig();
        rig.core.handle_event(NodeEvent::NeighborSeen {
            addr: 2,
            hops_to_sink: 1,
            battery_level: 88,
        });
        rig.core.sense();

        match rig.core.execute(Command::Queue) {
            CommandResponse::Queue { len, capacity, entries } => {
                assert_eq!(len, 1);
                assert_eq!(capacity, PACKET_QUEUE_SIZE);
                let entry = entries[0].unwrap();
                assert_eq!(entry.origin, LOCAL);
                assert_eq!(entry.destination, SINK);
            }
            other => panic!("unexpected response: {:?}", other),
        }

        match rig.core.execute(Command::Battery) {
            // One sample so far; no radio traffic yet.
            CommandResponse::Battery { energy_events } => assert_eq!(energy_events, 1),
            other => panic!("unexpected response: {:?}", other),
        }

        match rig.core.execute(Command::Neighbors) {
            CommandResponse::Neighbors { entries } => {
                let entry = entries[0].unwrap();
                assert_eq!(entry.addr, 2);
                assert_eq!(entry.battery_level, 88);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn send_command_runs_one_drain_cycle() {
        let mut rig = rig();
        rig.core.handle_event(NodeEvent::NeighborSeen {
            addr: SINK,
            hops_to_sink: 0,
            battery_level: 100,
        });
        rig.core.sense();

        rig.core.handle_event(NodeEvent::Command(Command::Send));
        match rig.responses.try_receive().unwrap() {
            CommandResponse::Drain(DrainOutcome::Sent(next_hop)) => assert_eq!(next_hop, SINK),
            other => panic!("unexpected response: {:?}", other),
        }
        assert!(rig.core.queue.is_empty());
    }

    #[test]
    fn transmit_event_originates_a_packet() {
        let mut rig = rig();
        let mut data = [0u8; PACKET_PAYLOAD_SIZE];
        data[..3].copy_from_slice(&[7, 8, 9]);
        rig.core.handle_event(NodeEvent::Transmit {
            destination: 4,
            data,
            length: 3,
        });

        assert_eq!(rig.core.queue.len(), 1);
        let queued = rig.core.queue.peek_front().unwrap();
        assert_eq!(queued.header().destination, 4);
        assert_eq!(queued.payload(), &[7, 8, 9]);
    }
}
