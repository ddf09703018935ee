use embassy_executor::Spawner;
use embassy_time::{Duration, Timer};
use env_logger::Builder;
use log::LevelFilter;
use log::{Level, log};
use sensegrid_mesh_lib::{Command, MeshNode, NodeConfiguration, SINK_DISTANCE, SimLink, SimNetwork};

// Three nodes in a line: leaf (3) -> relay (2) -> sink (1).
const SINK_ADDR: u16 = 1;
const RELAY_ADDR: u16 = 2;
const LEAF_ADDR: u16 = 3;

static SIM_NETWORK: SimNetwork = SimNetwork::new();

fn node_config() -> NodeConfiguration {
    NodeConfiguration {
        drain_interval_secs: 2,
        retry_budget: Some(5),
    }
}

/// Samples the leaf's sensor every few seconds, the way a sensing
/// process would drive the serial `sense` command.
#[embassy_executor::task(pool_size = 4)]
async fn sensor_loop(node: &'static MeshNode) -> ! {
    let sense = Command::parse("sense").unwrap();
    let battery = Command::parse("battery").unwrap();
    let mut round: u32 = 0;
    loop {
        match node.execute(sense).await {
            Ok(response) => log!(Level::Debug, "leaf: {}", response),
            Err(err) => log!(Level::Error, "leaf sense failed: {:?}", err),
        }
        round += 1;
        if round % 5 == 0 {
            if let Ok(response) = node.execute(battery).await {
                log!(Level::Info, "leaf {}", response);
            }
        }
        Timer::after(Duration::from_secs(5)).await;
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    Builder::new().filter_level(LevelFilter::Debug).init();

    log!(Level::Debug, "Starting up");
    let mut sink_temp = MeshNode::new();
    sink_temp
        .initialize(node_config(), spawner, SimLink::with(&SIM_NETWORK), SINK_ADDR, SINK_ADDR, 101)
        .expect("sink init");
    let sink: &'static MeshNode = Box::leak(Box::new(sink_temp));

    let mut relay_temp = MeshNode::new();
    relay_temp
        .initialize(node_config(), spawner, SimLink::with(&SIM_NETWORK), RELAY_ADDR, SINK_ADDR, 102)
        .expect("relay init");
    let relay: &'static MeshNode = Box::leak(Box::new(relay_temp));

    let mut leaf_temp = MeshNode::new();
    leaf_temp
        .initialize(node_config(), spawner, SimLink::with(&SIM_NETWORK), LEAF_ADDR, SINK_ADDR, 103)
        .expect("leaf init");
    let leaf: &'static MeshNode = Box::leak(Box::new(leaf_temp));

    // Stand in for the neighbor-discovery collaborator: the leaf hears
    // only the relay, the relay hears both ends.
    leaf.report_neighbor(RELAY_ADDR, 1, 80).unwrap();
    relay.report_neighbor(SINK_ADDR, SINK_DISTANCE, 100).unwrap();
    relay.report_neighbor(LEAF_ADDR, 2, 60).unwrap();
    sink.report_neighbor(RELAY_ADDR, 1, 80).unwrap();

    if let Ok(response) = leaf.execute(Command::Neighbors).await {
        log!(Level::Info, "leaf {}", response);
    }

    spawner.spawn(sensor_loop(leaf)).unwrap();

    log!(Level::Debug, "nodes started, waiting for readings at the sink");
    loop {
        match sink.received().await {
            Ok(delivery) => {
                log!(
                    Level::Info,
                    "sink: reading from node {} via {} ({} hops, {} bytes)",
                    delivery.origin,
                    delivery.last_hop,
                    delivery.hop_count,
                    delivery.payload().len()
                );
            }
            Err(err) => {
                log!(Level::Error, "sink receive failed: {:?}", err);
            }
        }
    }
}
