use std::time::Duration;

use pdoflow_engine::Network;

/// Install a logger for test output; safe to call from every test
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Run `n` ticks on an externally paced network, one SYNC per completed tick
pub fn run_ticks(network: &Network, n: u64) -> u64 {
    let mut ticks = network.ticks();
    for _ in 0..n {
        network.sync();
        ticks = network
            .wait_for_tick(ticks + 1, Duration::from_secs(2))
            .expect("Dispatch thread did not complete the tick");
    }
    ticks
}
