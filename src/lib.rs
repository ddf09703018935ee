#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(
    not(test),
    not(any(feature = "link-device-echo", feature = "link-device-simulator"))
))]
compile_error!("At least one link device feature must be enabled");

mod command;
mod dispatcher;
mod drain;
mod neighbor_table;
mod next_hop;
mod node;
mod packet;
mod packet_queue;
mod route;
mod sensor;

#[cfg(feature = "link-device-echo")]
pub mod link_device_echo;

#[cfg(feature = "link-device-simulator")]
pub mod link_device_simulator;

#[cfg(feature = "link-device-simulator")]
pub use crate::link_device_simulator::{SimLink, SimNetwork};

#[cfg(feature = "link-device-echo")]
pub use crate::link_device_echo::EchoLink;

// The concrete link device the node task runs with. The simulator takes
// precedence when both features are enabled.
#[cfg(feature = "link-device-simulator")]
pub use crate::link_device_simulator::SimLink as LinkDevice;
#[cfg(all(feature = "link-device-echo", not(feature = "link-device-simulator")))]
pub use crate::link_device_echo::EchoLink as LinkDevice;

pub use crate::command::{Command, CommandResponse, NeighborSummary, QueueEntrySummary, SenseOutcome};
pub use crate::dispatcher::{MultihopDispatcher, SendError, SendStatus, Transport};
pub use crate::drain::{DrainOutcome, DrainState};
pub use crate::neighbor_table::{Neighbor, NeighborTable, SINK_DISTANCE};
pub use crate::next_hop::{ForwardPolicy, GreedySinkPolicy};
pub use crate::node::{Delivery, EnergyMeter, NodeEvent};
pub use crate::packet::{MeshPacket, PacketBuf, PacketHeader};
pub use crate::packet_queue::PacketQueue;
pub use crate::route::{NullRouteDiscovery, RouteDiscovery, RouteEntry, RoutesSnapshot};
pub use crate::sensor::{SENSOR_READING_SIZE, Sensor, SensorReadError, SensorReading, SyntheticSensor};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

#[cfg(any(feature = "link-device-echo", feature = "link-device-simulator"))]
use crate::node::node_task;
#[cfg(any(feature = "link-device-echo", feature = "link-device-simulator"))]
use embassy_executor::Spawner;
#[cfg(any(feature = "link-device-echo", feature = "link-device-simulator"))]
use embassy_time::Duration;
#[cfg(any(feature = "link-device-echo", feature = "link-device-simulator"))]
use log::{Level, log};

/// Link address of a node. The all-zero address is never assigned.
pub type NodeAddr = u16;

// Link-dependent constants that define compatibility between nodes
pub const PACKET_PAYLOAD_SIZE: usize = 116; // 128-byte link MTU minus header overhead

// Capacity constants that only affect how much one node can hold
pub const PACKET_QUEUE_SIZE: usize = 10;
pub const NEIGHBOR_TABLE_SIZE: usize = 16;
pub const ROUTE_TABLE_SIZE: usize = 8;

#[cfg(feature = "link-device-simulator")]
pub(crate) const MAX_NODE_COUNT: usize = 64;

#[cfg(all(feature = "link-device-echo", not(feature = "link-device-simulator")))]
pub(crate) const MAX_NODE_COUNT: usize = 1;

const RX_PACKET_QUEUE_SIZE: usize = 16;
pub(crate) type RxPacketQueue = Channel<CriticalSectionRawMutex, MeshPacket, RX_PACKET_QUEUE_SIZE>;
pub type RxPacketQueueSender = Sender<'static, CriticalSectionRawMutex, MeshPacket, RX_PACKET_QUEUE_SIZE>;
pub(crate) type RxPacketQueueReceiver = Receiver<'static, CriticalSectionRawMutex, MeshPacket, RX_PACKET_QUEUE_SIZE>;

#[cfg(all(feature = "embedded", not(feature = "std")))]
static RX_PACKET_QUEUE: RxPacketQueue = Channel::new();

const CONTROL_QUEUE_SIZE: usize = 8;
pub(crate) type ControlQueue = Channel<CriticalSectionRawMutex, NodeEvent, CONTROL_QUEUE_SIZE>;
pub(crate) type ControlQueueSender = Sender<'static, CriticalSectionRawMutex, NodeEvent, CONTROL_QUEUE_SIZE>;
pub(crate) type ControlQueueReceiver = Receiver<'static, CriticalSectionRawMutex, NodeEvent, CONTROL_QUEUE_SIZE>;

#[cfg(all(feature = "embedded", not(feature = "std")))]
static CONTROL_QUEUE: ControlQueue = Channel::new();

const DELIVERY_QUEUE_SIZE: usize = 8;
pub(crate) type DeliveryQueue = Channel<CriticalSectionRawMutex, Delivery, DELIVERY_QUEUE_SIZE>;
pub(crate) type DeliveryQueueSender = Sender<'static, CriticalSectionRawMutex, Delivery, DELIVERY_QUEUE_SIZE>;
pub(crate) type DeliveryQueueReceiver = Receiver<'static, CriticalSectionRawMutex, Delivery, DELIVERY_QUEUE_SIZE>;

#[cfg(all(feature = "embedded", not(feature = "std")))]
static DELIVERY_QUEUE: DeliveryQueue = Channel::new();

const RESPONSE_QUEUE_SIZE: usize = 4;
pub(crate) type ResponseQueue = Channel<CriticalSectionRawMutex, CommandResponse, RESPONSE_QUEUE_SIZE>;
pub(crate) type ResponseQueueSender = Sender<'static, CriticalSectionRawMutex, CommandResponse, RESPONSE_QUEUE_SIZE>;
pub(crate) type ResponseQueueReceiver = Receiver<'static, CriticalSectionRawMutex, CommandResponse, RESPONSE_QUEUE_SIZE>;

#[cfg(all(feature = "embedded", not(feature = "std")))]
static RESPONSE_QUEUE: ResponseQueue = Channel::new();

/// Node-level configuration knobs.
pub struct NodeConfiguration {
    /// Seconds between drain/retry cycles over the outbound queue. The
    /// interval is unconditional: it applies whether or not the previous
    /// attempt succeeded.
    pub drain_interval_secs: u16,
    /// Failed delivery attempts before a queue head is abandoned.
    /// `None` retries indefinitely, which lets a persistently
    /// unreachable next hop block the head of the queue.
    pub retry_budget: Option<u8>,
}

/// Manager-side error for operator command submission.
#[derive(Debug)]
pub enum ControlError {
    ChannelFull,
    NotInited,
}

/// Manager-side error for application packet submission.
#[derive(Debug)]
pub enum SubmitError {
    ChannelFull,
    NotInited,
    PayloadTooLarge,
}

#[derive(Debug)]
pub enum ReceiveError {
    NotInited,
}

enum MeshNodeState {
    Uninitialized,
    Initialized {
        control_queue_sender: ControlQueueSender,
        delivery_queue_receiver: DeliveryQueueReceiver,
        response_queue_receiver: ResponseQueueReceiver,
    },
}

/// Handle to one mesh node: spawns the node task and exposes the
/// command, submission and delivery surfaces over channels.
pub struct MeshNode {
    state: MeshNodeState,
}

impl MeshNode {
    pub const fn new() -> Self {
        MeshNode {
            state: MeshNodeState::Uninitialized,
        }
    }

    #[cfg(all(
        feature = "embedded",
        not(feature = "std"),
        any(feature = "link-device-echo", feature = "link-device-simulator")
    ))]
    pub fn initialize(
        &mut self,
        config: NodeConfiguration,
        spawner: Spawner,
        link_device: LinkDevice,
        local_addr: NodeAddr,
        sink_addr: NodeAddr,
        rng_seed: u64,
    ) -> Result<(), ()> {
        return self.initialize_common(
            config,
            spawner,
            link_device,
            &RX_PACKET_QUEUE,
            &CONTROL_QUEUE,
            &DELIVERY_QUEUE,
            &RESPONSE_QUEUE,
            local_addr,
            sink_addr,
            rng_seed,
        );
    }

    #[cfg(all(feature = "std", any(feature = "link-device-echo", feature = "link-device-simulator")))]
    pub fn initialize(
        &mut self,
        config: NodeConfiguration,
        spawner: Spawner,
        link_device: LinkDevice,
        local_addr: NodeAddr,
        sink_addr: NodeAddr,
        rng_seed: u64,
    ) -> Result<(), ()> {
        let rx_packet_queue_static: &'static RxPacketQueue = Box::leak(Box::new(Channel::new()));
        let control_queue_static: &'static ControlQueue = Box::leak(Box::new(Channel::new()));
        let delivery_queue_static: &'static DeliveryQueue = Box::leak(Box::new(Channel::new()));
        let response_queue_static: &'static ResponseQueue = Box::leak(Box::new(Channel::new()));
        return self.initialize_common(
            config,
            spawner,
            link_device,
            rx_packet_queue_static,
            control_queue_static,
            delivery_queue_static,
            response_queue_static,
            local_addr,
            sink_addr,
            rng_seed,
        );
    }

    #[cfg(any(feature = "link-device-echo", feature = "link-device-simulator"))]
    #[allow(clippy::too_many_arguments)]
    fn initialize_common(
        &mut self,
        config: NodeConfiguration,
        spawner: Spawner,
        mut link_device: LinkDevice,
        rx_packet_queue: &'static RxPacketQueue,
        control_queue: &'static ControlQueue,
        delivery_queue: &'static DeliveryQueue,
        response_queue: &'static ResponseQueue,
        local_addr: NodeAddr,
        sink_addr: NodeAddr,
        rng_seed: u64,
    ) -> Result<(), ()> {
        link_device.attach(local_addr, rx_packet_queue.sender());

        let drain_interval = Duration::from_secs(config.drain_interval_secs as u64);
        let core = node::NodeCore::with(
            local_addr,
            sink_addr,
            &config,
            link_device,
            SyntheticSensor::with(rng_seed),
            NullRouteDiscovery,
            delivery_queue.sender(),
            response_queue.sender(),
        );

        let node_task_result = spawner.spawn(node_task(
            core,
            rx_packet_queue.receiver(),
            control_queue.receiver(),
            drain_interval,
        ));
        if node_task_result.is_err() {
            return Err(());
        }
        log!(Level::Info, "Mesh node initialized, addr {} sink {}", local_addr, sink_addr);

        self.state = MeshNodeState::Initialized {
            control_queue_sender: control_queue.sender(),
            delivery_queue_receiver: delivery_queue.receiver(),
            response_queue_receiver: response_queue.receiver(),
        };
        Ok(())
    }

    /// Submits one operator command and waits for its report.
    pub async fn execute(&self, command: Command) -> Result<CommandResponse, ControlError> {
        let (control_queue_sender, response_queue_receiver) = match &self.state {
            MeshNodeState::Uninitialized => {
                return Err(ControlError::NotInited);
            }
            MeshNodeState::Initialized {
                control_queue_sender,
                response_queue_receiver,
                ..
            } => (control_queue_sender, response_queue_receiver),
        };
        control_queue_sender
            .try_send(NodeEvent::Command(command))
            .map_err(|_| ControlError::ChannelFull)?;
        Ok(response_queue_receiver.receive().await)
    }

    /// Originates an application packet toward `destination`.
    pub fn submit(&self, destination: NodeAddr, payload: &[u8]) -> Result<(), SubmitError> {
        if payload.len() > PACKET_PAYLOAD_SIZE {
            return Err(SubmitError::PayloadTooLarge);
        }
        let control_queue_sender = match &self.state {
            MeshNodeState::Uninitialized => {
                return Err(SubmitError::NotInited);
            }
            MeshNodeState::Initialized { control_queue_sender, .. } => control_queue_sender,
        };
        let mut data = [0u8; PACKET_PAYLOAD_SIZE];
        data[..payload.len()].copy_from_slice(payload);
        control_queue_sender
            .try_send(NodeEvent::Transmit {
                destination,
                data,
                length: payload.len(),
            })
            .map_err(|_| SubmitError::ChannelFull)?;
        Ok(())
    }

    /// Feeds one neighbor-discovery report into the node. The forwarding
    /// core itself never mutates the neighbor table; this is the path the
    /// external discovery collaborator uses.
    pub fn report_neighbor(&self, addr: NodeAddr, hops_to_sink: u8, battery_level: u8) -> Result<(), ControlError> {
        let control_queue_sender = match &self.state {
            MeshNodeState::Uninitialized => {
                return Err(ControlError::NotInited);
            }
            MeshNodeState::Initialized { control_queue_sender, .. } => control_queue_sender,
        };
        control_queue_sender
            .try_send(NodeEvent::NeighborSeen {
                addr,
                hops_to_sink,
                battery_level,
            })
            .map_err(|_| ControlError::ChannelFull)?;
        Ok(())
    }

    /// Waits for the next locally delivered packet.
    pub async fn received(&self) -> Result<Delivery, ReceiveError> {
        let delivery_queue_receiver = match &self.state {
            MeshNodeState::Uninitialized => {
                return Err(ReceiveError::NotInited);
            }
            MeshNodeState::Initialized {
                delivery_queue_receiver, ..
            } => delivery_queue_receiver,
        };
        Ok(delivery_queue_receiver.receive().await)
    }
}
