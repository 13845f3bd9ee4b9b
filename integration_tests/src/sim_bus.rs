use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use pdoflow_common::messages::{PdoAddress, PdoFrame};
use pdoflow_common::traits::{Transport, TransportError};

#[derive(Default)]
struct SimBusInner {
    history: Vec<PdoFrame>,
    // External channels for sending frames to, e.g. test listeners
    listeners: Vec<Sender<PdoFrame>>,
    fail_with: Option<TransportError>,
}

/// An in-memory transport recording every frame sent on it
#[derive(Clone, Default)]
pub struct SimBus {
    inner: Arc<Mutex<SimBusInner>>,
}

impl SimBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the bus as a transport for [`pdoflow_engine::Network::open`]
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    pub fn new_receiver(&self) -> SimBusReceiver {
        let (tx, rx) = channel();
        self.inner.lock().unwrap().listeners.push(tx);
        SimBusReceiver { channel_rx: rx }
    }

    /// All frames sent so far
    pub fn sent(&self) -> Vec<PdoFrame> {
        self.inner.lock().unwrap().history.clone()
    }

    /// Frames sent to one address
    pub fn sent_to(&self, address: PdoAddress) -> Vec<PdoFrame> {
        self.inner
            .lock()
            .unwrap()
            .history
            .iter()
            .filter(|f| f.address() == address)
            .copied()
            .collect()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().history.clear();
    }

    /// Make every following send fail with `error`, or succeed again with None
    pub fn set_failure(&self, error: Option<TransportError>) {
        self.inner.lock().unwrap().fail_with = error;
    }
}

impl Transport for SimBus {
    fn send(&self, frame: &PdoFrame) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(e) = inner.fail_with {
            log::debug!("SimBus failing send of {:?}: {:?}", frame, e);
            return Err(e);
        }
        log::trace!("SimBus sent {:?}", frame);
        inner.history.push(*frame);
        inner.listeners.retain(|tx| tx.send(*frame).is_ok());
        Ok(())
    }
}

pub struct SimBusReceiver {
    channel_rx: Receiver<PdoFrame>,
}

impl SimBusReceiver {
    pub fn try_recv(&mut self) -> Option<PdoFrame> {
        self.channel_rx.try_recv().ok()
    }

    pub fn recv_timeout(&mut self, timeout: std::time::Duration) -> Option<PdoFrame> {
        self.channel_rx.recv_timeout(timeout).ok()
    }

    pub fn flush(&mut self) {
        while self.channel_rx.try_recv().is_ok() {}
    }
}
