//! The dispatch thread
//!
//! One thread per network runs the cycle. On every tick, with the registry locked, it first
//! decodes the frames received since the last tick and runs their receive hooks, then encodes
//! and sends every outgoing PDO that is due. A hook can therefore write outputs which go out in
//! the same tick.
//!
//! On timer driven CAN networks the tick ends with a SYNC broadcast, after the due transmits, so
//! devices latch their synchronous PDOs from the outputs just sent.
//!
//! Between ticks the thread also wakes for incoming event driven PDOs, which are decoded as soon
//! as they arrive.
use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use defmt_or_log::{debug, info, warn};
use pdoflow_common::{
    constants::cob_ids,
    messages::{CanId, NetworkClass, PdoAddress, PdoFrame},
    node_id::NodeAddress,
    pdo::{PdoDirection, TransmissionType},
};
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};

use crate::network::{NetworkShared, SyncMode};
use crate::pdo::{PdoContainer, PdoState};

/// State shared between the dispatch thread and the threads poking it
#[derive(Debug, Default)]
pub(crate) struct DispatchSignal {
    pub ticks: u64,
    pub sync_requests: u64,
    pub rx_event: bool,
    pub shutdown: bool,
}

/// All PDOs bound on a network
#[derive(Debug, Default)]
pub(crate) struct Registry {
    pdos: Vec<Arc<PdoContainer>>,
}

impl Registry {
    pub fn register(&mut self, pdo: Arc<PdoContainer>) {
        if let Some(address) = pdo.address() {
            if let Some(other) = self
                .pdos
                .iter()
                .find(|p| p.direction() == pdo.direction() && p.address() == Some(address))
            {
                warn!(
                    "{} at {} shares its address with the PDO of {:?}",
                    pdo.direction(),
                    address,
                    other.owner()
                );
            }
        }
        self.pdos.push(pdo);
    }

    pub fn slot_in_use(&self, node: NodeAddress, direction: PdoDirection, slot: u8) -> bool {
        self.pdos
            .iter()
            .any(|p| p.direction() == direction && p.owner() == Some((node, slot)))
    }

    pub fn node_pdos(&self, node: NodeAddress) -> impl Iterator<Item = &Arc<PdoContainer>> {
        self.pdos
            .iter()
            .filter(move |p| matches!(p.owner(), Some((n, _)) if n == node))
    }

    /// Remove the PDOs of a node, leaving them inactive
    pub fn remove_node(&mut self, node: NodeAddress) {
        self.pdos.retain(|p| {
            let owned = matches!(p.owner(), Some((n, _)) if n == node);
            if owned {
                p.set_state(PdoState::Inactive);
            }
            !owned
        });
    }

    pub fn deactivate_all(&mut self) {
        for pdo in self.pdos.drain(..) {
            pdo.set_state(PdoState::Inactive);
        }
    }

    pub fn find_incoming(&self, address: PdoAddress) -> Option<&Arc<PdoContainer>> {
        self.pdos
            .iter()
            .find(|p| p.is_active(PdoDirection::Incoming) && p.address() == Some(address))
    }

    fn active(&self, direction: PdoDirection) -> impl Iterator<Item = &Arc<PdoContainer>> {
        self.pdos.iter().filter(move |p| p.is_active(direction))
    }
}

enum Work {
    Tick,
    Receive,
    Shutdown,
}

fn elevate_priority(priority: u8) {
    let value = match ThreadPriorityValue::try_from(priority) {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid dispatch priority {}: {:?}", priority, e);
            return;
        }
    };
    match set_current_thread_priority(ThreadPriority::Crossplatform(value)) {
        Ok(()) => debug!("Dispatch thread priority set to {}", priority),
        Err(e) => warn!(
            "Failed to raise dispatch thread priority, running at normal priority: {:?}",
            e
        ),
    }
}

fn wait_for_work(shared: &NetworkShared, sync: SyncMode, deadline: Instant) -> Work {
    let mut signal = shared.lock_signal();
    loop {
        if signal.shutdown {
            return Work::Shutdown;
        }
        if signal.rx_event {
            signal.rx_event = false;
            return Work::Receive;
        }
        match sync {
            SyncMode::Timer(_) => {
                let now = Instant::now();
                if now >= deadline {
                    return Work::Tick;
                }
                signal = shared
                    .wake()
                    .wait_timeout(signal, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            SyncMode::External => {
                if signal.sync_requests > 0 {
                    signal.sync_requests -= 1;
                    return Work::Tick;
                }
                signal = shared
                    .wake()
                    .wait(signal)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}

fn receive(shared: &NetworkShared, pdo: &PdoContainer) {
    if pdo.process_received() == Some(false) {
        shared.stats.hook_faults.fetch_add(1, Ordering::Relaxed);
    }
}

/// Decode event driven PDOs which arrived between ticks
fn receive_events(shared: &NetworkShared) {
    let registry = shared.lock_registry();
    for pdo in registry
        .active(PdoDirection::Incoming)
        .filter(|p| p.transmission_type() == TransmissionType::Event)
    {
        receive(shared, pdo);
    }
}

fn send(shared: &NetworkShared, pdo: &PdoContainer) {
    let Some(frame) = pdo.frame() else {
        return;
    };
    if let Err(e) = shared.transport().send(&frame) {
        shared.stats.send_failures.fetch_add(1, Ordering::Relaxed);
        warn!("Failed to send PDO at {}: {:?}", frame.address(), e);
    }
}

fn send_sync(shared: &NetworkShared, frame: &PdoFrame) {
    if let Err(e) = shared.transport().send(frame) {
        shared.stats.send_failures.fetch_add(1, Ordering::Relaxed);
        warn!("Failed to send SYNC: {:?}", e);
    }
}

/// The SYNC frame closing each tick, if the network generates one
fn sync_frame(class: NetworkClass, sync: SyncMode) -> Option<PdoFrame> {
    match (class, sync) {
        (NetworkClass::Can, SyncMode::Timer(_)) => {
            PdoFrame::new(PdoAddress::Cob(CanId::std(cob_ids::SYNC)), &[]).ok()
        }
        _ => None,
    }
}

/// Run one tick: all receives, then all due transmits
fn run_tick(shared: &NetworkShared) {
    let registry = shared.lock_registry();
    for pdo in registry.active(PdoDirection::Incoming) {
        receive(shared, pdo);
    }
    for pdo in registry.active(PdoDirection::Outgoing) {
        if pdo.tick_due() {
            send(shared, pdo);
        }
    }
}

/// Body of the dispatch thread
pub(crate) fn run(shared: Arc<NetworkShared>, sync: SyncMode, priority: Option<u8>) {
    if let Some(priority) = priority {
        elevate_priority(priority);
    }
    info!("Dispatch thread started ({:?})", sync);

    let period = match sync {
        SyncMode::Timer(period) => period,
        SyncMode::External => Duration::ZERO,
    };
    let mut deadline = Instant::now() + period;
    let sync_frame = sync_frame(shared.class(), sync);

    loop {
        match wait_for_work(&shared, sync, deadline) {
            Work::Shutdown => break,
            Work::Receive => {
                receive_events(&shared);
                continue;
            }
            Work::Tick => (),
        }

        run_tick(&shared);
        if let Some(frame) = &sync_frame {
            send_sync(&shared, frame);
        }
        let backlog = shared.finish_tick();

        match sync {
            SyncMode::Timer(period) => {
                deadline += period;
                let now = Instant::now();
                if now > deadline {
                    let overruns = shared.stats.overruns.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        "Dispatch cycle overrun by {:?} ({} total)",
                        now - deadline,
                        overruns
                    );
                    deadline = now + period;
                }
            }
            SyncMode::External if backlog > 0 => {
                let overruns =
                    shared.stats.overruns.fetch_add(backlog, Ordering::Relaxed) + backlog;
                warn!(
                    "{} SYNC requests arrived during the tick, running one late tick ({} overruns)",
                    backlog,
                    overruns
                );
            }
            SyncMode::External => (),
        }
    }

    info!("Dispatch thread stopped");
}
