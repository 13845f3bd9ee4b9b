//! Jog a servo drive at constant velocity and print its position
//!
//! Without `--socket`, the drive is simulated in process.
use std::{
    path::PathBuf,
    sync::{
        mpsc::{channel, Receiver, Sender},
        Arc,
    },
    time::{Duration, Instant},
};

use clap::Parser;
use pdoflow_engine::{
    common::{
        constants::object_ids,
        network_config::NetworkConfig,
        traits::{Transport, TransportError},
        CanNodeId, NetworkClass, NodeAddress, PdoAddress, PdoFrame, TransmissionType,
    },
    Event, EventSignal, MappedVar, Network, NetworkOptions, NetworkRef, Node, PdoContainer,
};

/// Control word value which enables the drive operation
const ENABLE_OPERATION: u16 = 0x000F;
const STATUS_OPERATION_ENABLED: u16 = 0x0237;
const STATUS_SWITCH_ON_DISABLED: u16 = 0x0250;

const FEEDBACK_BIT: u32 = 1 << 0;

#[derive(Parser, Debug)]
struct Args {
    /// CAN interface of a real drive, e.g. "can0"
    #[clap(long)]
    socket: Option<String>,
    #[clap(long, short, default_value = "1")]
    node_id: u8,
    /// Cycle period in milliseconds
    #[clap(long, default_value = "2")]
    period_ms: u64,
    /// Target velocity in counts per second
    #[clap(long, short, default_value = "1000")]
    velocity: i32,
    #[clap(long, default_value = "3")]
    seconds: u64,
    /// Network configuration file; overrides the period
    #[clap(long)]
    config: Option<PathBuf>,
    /// Real-time priority of the dispatch thread
    #[clap(long)]
    priority: Option<u8>,
}

/// A simulated drive answering each command PDO with a feedback PDO
struct SimDrive {
    commands: Sender<PdoFrame>,
}

impl Transport for SimDrive {
    fn send(&self, frame: &PdoFrame) -> Result<(), TransportError> {
        self.commands
            .send(*frame)
            .map_err(|_| TransportError::Disconnected)
    }
}

// Runs off the dispatch thread: delivering from inside `send` would block on the registry
fn run_sim_drive(
    command_address: PdoAddress,
    feedback_address: PdoAddress,
    period: Duration,
    commands: Receiver<PdoFrame>,
    network: NetworkRef,
) {
    let mut position: i64 = 0;
    while let Ok(frame) = commands.recv() {
        if frame.address() != command_address || frame.len() < 6 {
            continue;
        }
        let data = frame.data();
        let control = u16::from_le_bytes([data[0], data[1]]);
        let velocity = i32::from_le_bytes([data[2], data[3], data[4], data[5]]);

        let status = if control == ENABLE_OPERATION {
            position += velocity as i64 * period.as_micros() as i64 / 1_000_000;
            STATUS_OPERATION_ENABLED
        } else {
            STATUS_SWITCH_ON_DISABLED
        };

        let mut payload = [0u8; 6];
        payload[0..2].copy_from_slice(&status.to_le_bytes());
        payload[2..6].copy_from_slice(&(position as i32).to_le_bytes());
        let Ok(feedback) = PdoFrame::new(feedback_address, &payload) else {
            continue;
        };
        match network.acquire() {
            Some(guard) => {
                guard.deliver(&feedback);
            }
            None => break,
        }
    }
    log::debug!("Simulated drive stopped");
}

fn open_network(args: &Args, drive: NodeAddress) -> Network {
    let mut options = match &args.config {
        Some(path) => {
            let config = NetworkConfig::load_from_file(path).unwrap_or_else(|e| {
                log::error!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            });
            // The drive profile below is built from CANopen PDOs
            if config.class != NetworkClass::Can {
                log::error!(
                    "{} configures a {} network, this demo drives a CAN node",
                    path.display(),
                    config.class
                );
                std::process::exit(1);
            }
            NetworkOptions::from_config(&config)
        }
        None => NetworkOptions::new(NetworkClass::Can, Duration::from_millis(args.period_ms)),
    };
    if let Some(priority) = args.priority {
        options = options.with_priority(priority);
    }
    let period = match options.sync {
        pdoflow_engine::SyncMode::Timer(period) => period,
        pdoflow_engine::SyncMode::External => Duration::from_millis(args.period_ms),
    };

    match &args.socket {
        #[cfg(feature = "socketcan")]
        Some(iface) => {
            let transport = pdoflow_engine::socketcan::SocketCanTransport::open(iface)
                .expect("Failed to open CAN interface");
            let network =
                Network::open(Arc::new(transport.clone()), options).expect("Failed to open network");
            transport
                .spawn_receiver(network.network_ref())
                .expect("Failed to start receive thread");
            network
        }
        #[cfg(not(feature = "socketcan"))]
        Some(_) => {
            log::error!("Built without the socketcan feature");
            std::process::exit(1);
        }
        None => {
            let (tx, rx) = channel();
            let network = Network::open(Arc::new(SimDrive { commands: tx }), options)
                .expect("Failed to open network");
            let net_ref = network.network_ref();
            let (command, feedback) = pdo_addresses(drive);
            std::thread::Builder::new()
                .name("sim-drive".into())
                .spawn(move || run_sim_drive(command, feedback, period, rx, net_ref))
                .expect("Failed to start simulated drive");
            network
        }
    }
}

/// Command (RPDO1) and feedback (TPDO1) addresses of the drive
fn pdo_addresses(drive: NodeAddress) -> (PdoAddress, PdoAddress) {
    match (drive.rpdo_address(1), drive.tpdo_address(1)) {
        (Ok(command), Ok(feedback)) => (command, feedback),
        (Err(e), _) | (_, Err(e)) => {
            log::error!("No PDO address for {}: {}", drive, e);
            std::process::exit(1);
        }
    }
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let drive = NodeAddress::Can(CanNodeId::new(args.node_id).expect("Invalid node id"));
    let network = open_network(&args, drive);
    let (command_address, feedback_address) = pdo_addresses(drive);
    let node = Node::new(&network, drive).expect("Failed to create node");

    let control_word = MappedVar::<u16>::new(object_ids::CONTROL_WORD, 0);
    let target_velocity = MappedVar::<i32>::new(object_ids::TARGET_VELOCITY, 0);
    let mut rpdo = PdoContainer::outgoing(NetworkClass::Can);
    rpdo.init(command_address).unwrap();
    rpdo.add_var(&control_word).unwrap();
    rpdo.add_var(&target_velocity).unwrap();
    rpdo.set_type(TransmissionType::Cyclic(1));
    node.pdo_set(1, rpdo).expect("Failed to bind RPDO1");

    let signal = Arc::new(EventSignal::new());
    let status_word = MappedVar::<u16>::new(object_ids::STATUS_WORD, 0);
    let position = MappedVar::<i32>::new(object_ids::POSITION_ACTUAL, 0);
    let mut tpdo = PdoContainer::incoming(NetworkClass::Can);
    tpdo.init(feedback_address).unwrap();
    tpdo.add_var(&status_word).unwrap();
    tpdo.add_var(&position).unwrap();
    let hook_signal = signal.clone();
    tpdo.set_received(move |_: &PdoContainer| hook_signal.set_bits(FEEDBACK_BIT))
        .unwrap();
    node.pdo_set(1, tpdo).expect("Failed to bind TPDO1");

    control_word.write(ENABLE_OPERATION);
    target_velocity.write(args.velocity);
    node.start_node();
    log::info!("Jogging {} at {} counts/s", drive, args.velocity);

    let end = Instant::now() + Duration::from_secs(args.seconds);
    let mut last_print = Instant::now();
    while Instant::now() < end {
        signal.clear_bits(FEEDBACK_BIT);
        if Event::Any(FEEDBACK_BIT)
            .wait(&signal, Some(Duration::from_millis(100)))
            .is_err()
        {
            log::warn!("No feedback from {}", drive);
            continue;
        }
        if last_print.elapsed() >= Duration::from_millis(250) {
            println!(
                "status 0x{:04X} position {}",
                status_word.read(),
                position.read()
            );
            last_print = Instant::now();
        }
    }

    target_velocity.write(0);
    control_word.write(0);
    let stats = network.stats();
    log::info!(
        "{} ticks, {} overruns, {} send failures",
        stats.ticks,
        stats.overruns,
        stats.send_failures
    );
    node.stop_node();
    network.close();
}
