//! Blocking SocketCAN transport
//!
//! Sends PDO frames on a Linux CAN interface and runs a receive thread which delivers incoming
//! frames to a network until the network goes away.
use std::io::ErrorKind;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use defmt_or_log::{debug, info, warn};
use pdoflow_common::{
    messages::{CanId, PdoAddress, PdoFrame},
    traits::{Transport, TransportError},
};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Id, Socket, StandardId};

use crate::network::NetworkRef;

/// How often the receive thread checks whether its network still exists
const RECEIVE_POLL: Duration = Duration::from_millis(100);

fn to_socketcan_id(id: CanId) -> Option<Id> {
    match id {
        CanId::Std(id) => StandardId::new(id).map(Id::Standard),
        CanId::Extended(id) => ExtendedId::new(id).map(Id::Extended),
    }
}

fn from_socketcan_id(id: Id) -> CanId {
    match id {
        Id::Standard(id) => CanId::std(id.as_raw()),
        Id::Extended(id) => CanId::extended(id.as_raw()),
    }
}

fn io_to_transport_error(e: std::io::Error) -> TransportError {
    match e.kind() {
        ErrorKind::WouldBlock => TransportError::QueueFull,
        ErrorKind::NotConnected | ErrorKind::BrokenPipe => TransportError::Disconnected,
        _ => TransportError::Driver {
            code: e.raw_os_error().unwrap_or(-1),
        },
    }
}

/// A [`Transport`] on a SocketCAN interface
#[derive(Clone)]
pub struct SocketCanTransport {
    socket: Arc<CanSocket>,
}

impl core::fmt::Debug for SocketCanTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SocketCanTransport").finish_non_exhaustive()
    }
}

impl SocketCanTransport {
    /// Open a CAN interface, e.g. "can0" or "vcan0"
    pub fn open(interface: &str) -> std::io::Result<Self> {
        let socket = CanSocket::open(interface)?;
        socket.set_read_timeout(RECEIVE_POLL)?;
        info!("Opened SocketCAN interface {}", interface);
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    /// Start a thread delivering received frames to `network`
    ///
    /// The thread exits once the network has been closed or dropped.
    pub fn spawn_receiver(&self, network: NetworkRef) -> std::io::Result<JoinHandle<()>> {
        let socket = self.socket.clone();
        std::thread::Builder::new()
            .name("pdoflow-socketcan-rx".into())
            .spawn(move || receive_loop(&socket, &network))
    }
}

fn receive_loop(socket: &CanSocket, network: &NetworkRef) {
    loop {
        let frame = match socket.read_frame() {
            Ok(frame) => frame,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                if !network.is_available() {
                    break;
                }
                continue;
            }
            Err(e) => {
                warn!("SocketCAN receive failed: {:?}", e);
                if !network.is_available() {
                    break;
                }
                std::thread::sleep(RECEIVE_POLL);
                continue;
            }
        };

        let CanFrame::Data(frame) = frame else {
            continue;
        };
        let Some(guard) = network.acquire() else {
            break;
        };
        let address = PdoAddress::Cob(from_socketcan_id(frame.id()));
        if let Ok(pdo_frame) = PdoFrame::new(address, frame.data()) {
            guard.deliver(&pdo_frame);
        }
    }
    debug!("SocketCAN receive thread exiting, network is gone");
}

impl Transport for SocketCanTransport {
    fn send(&self, frame: &PdoFrame) -> Result<(), TransportError> {
        let PdoAddress::Cob(id) = frame.address() else {
            return Err(TransportError::UnsupportedAddress);
        };
        let id = to_socketcan_id(id).ok_or(TransportError::UnsupportedAddress)?;
        let can_frame = CanFrame::new(id, frame.data()).ok_or(TransportError::FrameTooLong {
            len: frame.len(),
        })?;
        self.socket
            .write_frame(&can_frame)
            .map_err(io_to_transport_error)
    }
}
