//! Network handle and weak references to it
//!
//! A [`Network`] owns the dispatch thread and the registry of bound PDOs. Everything else (nodes,
//! PDO containers transmitting, receive threads of transports) holds a [`NetworkRef`], a weak
//! reference which must be acquired for each use. Acquisition fails once the network has been
//! closed or dropped, so no caller ever touches a torn down network.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use defmt_or_log::{debug, info, trace};
use pdoflow_common::{
    messages::{NetworkClass, PdoFrame},
    network_config::NetworkConfig,
    traits::{Transport, TransportError},
};
use snafu::ResultExt;

use crate::dispatch::{self, DispatchSignal, Registry};
use crate::error::{OpenError, SpawnSnafu, WaitError};

/// Name of the dispatch thread
pub const DISPATCH_THREAD_NAME: &str = "pdoflow-dispatch";

/// What paces the dispatch cycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    /// A software timer with a fixed period (CAN SYNC interval or EtherCAT SYNC0 period)
    Timer(Duration),
    /// Ticks are triggered by [`Network::sync`], e.g. from a hardware SYNC interrupt
    External,
}

/// Options for opening a network
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkOptions {
    /// The fieldbus class
    pub class: NetworkClass,
    /// What paces the cycle. Fixed for the lifetime of the network.
    pub sync: SyncMode,
    /// Real-time priority (1-99) for the dispatch thread, if any
    pub priority: Option<u8>,
}

impl NetworkOptions {
    /// Timer driven options with the given period
    pub fn new(class: NetworkClass, period: Duration) -> Self {
        Self {
            class,
            sync: SyncMode::Timer(period),
            priority: None,
        }
    }

    /// Options for an externally paced network
    pub fn external(class: NetworkClass) -> Self {
        Self {
            class,
            sync: SyncMode::External,
            priority: None,
        }
    }

    /// Set the dispatch thread priority
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Build options from a loaded configuration
    pub fn from_config(config: &NetworkConfig) -> Self {
        Self {
            class: config.class,
            sync: SyncMode::Timer(config.sync_period()),
            priority: config.dispatch_priority,
        }
    }
}

/// Counters maintained by the dispatch thread
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Completed ticks
    pub ticks: u64,
    /// Ticks whose work finished after the next deadline, or, on externally paced networks,
    /// SYNC requests which arrived while a tick was still running
    pub overruns: u64,
    /// Receive hooks which panicked
    pub hook_faults: u64,
    /// Cyclic transmissions and SYNC frames the transport failed to send
    pub send_failures: u64,
    /// Delivered frames with no active incoming PDO at their address
    pub unmatched_frames: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatCounters {
    pub overruns: AtomicU64,
    pub hook_faults: AtomicU64,
    pub send_failures: AtomicU64,
    pub unmatched_frames: AtomicU64,
}

pub(crate) struct NetworkShared {
    class: NetworkClass,
    transport: Arc<dyn Transport>,
    open: AtomicBool,
    registry: Mutex<Registry>,
    signal: Mutex<DispatchSignal>,
    /// Wakes the dispatch thread
    wake: Condvar,
    /// Wakes threads waiting for a tick
    tick_done: Condvar,
    pub stats: StatCounters,
}

impl NetworkShared {
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lock_signal(&self) -> MutexGuard<'_, DispatchSignal> {
        self.signal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wake(&self) -> &Condvar {
        &self.wake
    }

    /// Record a completed tick and wake tick waiters
    ///
    /// Returns the number of SYNC requests which arrived while the tick ran. They are collapsed
    /// into a single pending request.
    pub fn finish_tick(&self) -> u64 {
        let mut signal = self.lock_signal();
        let backlog = signal.sync_requests;
        signal.sync_requests = backlog.min(1);
        signal.ticks += 1;
        self.tick_done.notify_all();
        backlog
    }

    pub fn class(&self) -> NetworkClass {
        self.class
    }

    fn deliver(&self, frame: &PdoFrame) -> bool {
        let registry = self.lock_registry();
        let Some(pdo) = registry.find_incoming(frame.address()) else {
            self.stats.unmatched_frames.fetch_add(1, Ordering::Relaxed);
            trace!("No active PDO for {:?}", frame);
            return false;
        };
        if pdo.buffer_frame(*frame) {
            trace!("Overwrote undecoded frame at {}", frame.address());
        }
        if pdo.transmission_type() == pdoflow_common::TransmissionType::Event {
            let mut signal = self.lock_signal();
            signal.rx_event = true;
            self.wake.notify_all();
        }
        true
    }

    fn sync(&self) {
        let mut signal = self.lock_signal();
        signal.sync_requests += 1;
        self.wake.notify_all();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// An open network with its dispatch thread
///
/// Dropping the network closes it.
pub struct Network {
    shared: Arc<NetworkShared>,
    sync: SyncMode,
    thread: Option<JoinHandle<()>>,
}

impl core::fmt::Debug for Network {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Network")
            .field("class", &self.shared.class)
            .field("sync", &self.sync)
            .field("open", &self.shared.is_open())
            .finish_non_exhaustive()
    }
}

impl Network {
    /// Open a network on a transport and start its dispatch thread
    pub fn open(transport: Arc<dyn Transport>, options: NetworkOptions) -> Result<Self, OpenError> {
        if options.sync == SyncMode::Timer(Duration::ZERO) {
            return Err(OpenError::ZeroPeriod);
        }

        let shared = Arc::new(NetworkShared {
            class: options.class,
            transport,
            open: AtomicBool::new(true),
            registry: Mutex::new(Registry::default()),
            signal: Mutex::new(DispatchSignal::default()),
            wake: Condvar::new(),
            tick_done: Condvar::new(),
            stats: StatCounters::default(),
        });

        let thread_shared = shared.clone();
        let thread = std::thread::Builder::new()
            .name(DISPATCH_THREAD_NAME.into())
            .spawn(move || dispatch::run(thread_shared, options.sync, options.priority))
            .context(SpawnSnafu)?;

        info!("Opened {} network ({:?})", options.class, options.sync);
        Ok(Self {
            shared,
            sync: options.sync,
            thread: Some(thread),
        })
    }

    /// Open a network using the class, period and priority of a configuration
    pub fn open_with_config(
        transport: Arc<dyn Transport>,
        config: &NetworkConfig,
    ) -> Result<Self, OpenError> {
        Self::open(transport, NetworkOptions::from_config(config))
    }

    /// The fieldbus class
    pub fn class(&self) -> NetworkClass {
        self.shared.class
    }

    /// What paces the cycle
    pub fn sync_mode(&self) -> SyncMode {
        self.sync
    }

    /// Get a weak reference to the network
    pub fn network_ref(&self) -> NetworkRef {
        NetworkRef {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// True until the network is closed
    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Hand a received frame to the matching incoming PDO
    ///
    /// This is the receive path of the transport. The frame is decoded on the next tick, or
    /// right away by the dispatch thread for event driven PDOs. Returns false if no active PDO
    /// listens on the frame's address.
    pub fn deliver(&self, frame: &PdoFrame) -> bool {
        self.shared.deliver(frame)
    }

    /// Trigger one tick of an externally paced network
    ///
    /// Requests arriving while a tick runs are overruns: they are counted in
    /// [`DispatchStats::overruns`] and run as one late tick. Ignored for timer driven networks.
    pub fn sync(&self) {
        match self.sync {
            SyncMode::External => self.shared.sync(),
            SyncMode::Timer(_) => debug!("Ignoring sync() on a timer driven network"),
        }
    }

    /// Number of completed ticks
    pub fn ticks(&self) -> u64 {
        self.shared.lock_signal().ticks
    }

    /// Block until at least `tick` ticks have completed
    ///
    /// Returns the tick count observed.
    pub fn wait_for_tick(&self, tick: u64, timeout: Duration) -> Result<u64, WaitError> {
        let deadline = Instant::now() + timeout;
        let mut signal = self.shared.lock_signal();
        loop {
            if signal.ticks >= tick {
                return Ok(signal.ticks);
            }
            let now = Instant::now();
            if now >= deadline || signal.shutdown {
                return Err(WaitError::Timeout);
            }
            signal = self
                .shared
                .tick_done
                .wait_timeout(signal, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// A snapshot of the dispatch counters
    pub fn stats(&self) -> DispatchStats {
        let stats = &self.shared.stats;
        DispatchStats {
            ticks: self.ticks(),
            overruns: stats.overruns.load(Ordering::Relaxed),
            hook_faults: stats.hook_faults.load(Ordering::Relaxed),
            send_failures: stats.send_failures.load(Ordering::Relaxed),
            unmatched_frames: stats.unmatched_frames.load(Ordering::Relaxed),
        }
    }

    /// Stop the dispatch thread and deactivate all PDOs
    ///
    /// Every [`NetworkRef`] becomes unavailable.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.shared.open.store(false, Ordering::Release);
        {
            let mut signal = self.shared.lock_signal();
            signal.shutdown = true;
            self.shared.wake.notify_all();
            self.shared.tick_done.notify_all();
        }
        if thread.join().is_err() {
            defmt_or_log::error!("Dispatch thread panicked");
        }
        self.shared.lock_registry().deactivate_all();
        info!("Closed {} network", self.shared.class);
    }
}

impl Drop for Network {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A weak reference to a [`Network`]
#[derive(Clone, Debug, Default)]
pub struct NetworkRef {
    shared: Weak<NetworkShared>,
}

impl NetworkRef {
    /// Try to get a strong handle to the network
    ///
    /// Returns None if the network has been closed or dropped. Keep the guard only for the
    /// duration of one operation; holding it does not keep the dispatch thread running.
    pub fn acquire(&self) -> Option<NetworkGuard> {
        let shared = self.shared.upgrade()?;
        if shared.is_open() {
            Some(NetworkGuard { shared })
        } else {
            None
        }
    }

    /// True if the network can currently be acquired
    pub fn is_available(&self) -> bool {
        self.acquire().is_some()
    }
}

impl core::fmt::Debug for NetworkShared {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NetworkShared")
            .field("class", &self.class)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

/// A scoped strong handle to a network, obtained from [`NetworkRef::acquire`]
#[derive(Debug)]
pub struct NetworkGuard {
    shared: Arc<NetworkShared>,
}

impl NetworkGuard {
    /// The fieldbus class
    pub fn class(&self) -> NetworkClass {
        self.shared.class
    }

    /// Send a frame on the transport
    pub fn send(&self, frame: &PdoFrame) -> Result<(), TransportError> {
        self.shared.transport.send(frame)
    }

    /// Hand a received frame to the matching incoming PDO
    ///
    /// See [`Network::deliver`].
    pub fn deliver(&self, frame: &PdoFrame) -> bool {
        self.shared.deliver(frame)
    }

    pub(crate) fn shared(&self) -> &Arc<NetworkShared> {
        &self.shared
    }
}
