use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use assertables::{assert_ge, assert_lt};
use integration_tests::prelude::*;
use serial_test::serial;

/// A wait on bits which are already set returns immediately
#[test]
fn test_wait_already_satisfied() {
    let signal = EventSignal::new();
    signal.set_bits(0b100);
    assert_eq!(Ok(0b100), Event::Any(0b110).wait(&signal, None));
    assert_eq!(Ok(0b100), Event::All(0b100).wait(&signal, Some(Duration::ZERO)));
}

/// Waiting on All requires every bit; waiting on Any requires one
#[test]
fn test_any_and_all() {
    let signal = EventSignal::new();
    signal.set_bits(0b01);
    assert_eq!(
        Err(WaitError::Timeout),
        Event::All(0b11).wait(&signal, Some(Duration::from_millis(5)))
    );
    assert_eq!(Ok(0b01), Event::Any(0b11).wait(&signal, Some(Duration::from_millis(5))));

    signal.clear_bits(0b01);
    assert_eq!(0, signal.mask());
    signal.set_mask(0b11);
    assert_eq!(Ok(0b11), Event::All(0b11).wait(&signal, Some(Duration::from_millis(5))));
}

/// A bit set while a thread is waiting wakes it long before the timeout
#[serial]
#[test]
fn test_wake_before_timeout() {
    let signal = Arc::new(EventSignal::new());
    let setter = signal.clone();
    let start = Instant::now();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        setter.set_bits(0b1);
    });

    let result = Event::Any(0b1).wait(&signal, Some(Duration::from_millis(50)));
    let elapsed = start.elapsed();
    handle.join().unwrap();

    assert_eq!(Ok(0b1), result);
    assert_ge!(elapsed, Duration::from_millis(10));
    assert_lt!(elapsed, Duration::from_millis(50));
}

/// A predicate which never becomes true times out no earlier than asked, and not much later
#[serial]
#[test]
fn test_timeout_is_honoured() {
    let signal = Arc::new(EventSignal::new());
    // Unrelated bits keep waking the waiter
    let setter = signal.clone();
    let handle = thread::spawn(move || {
        for _ in 0..5 {
            thread::sleep(Duration::from_millis(5));
            setter.set_bits(0b10);
        }
    });

    let start = Instant::now();
    let result = Event::Any(0b1).wait(&signal, Some(Duration::from_millis(40)));
    let elapsed = start.elapsed();
    handle.join().unwrap();

    assert_eq!(Err(WaitError::Timeout), result);
    assert_ge!(elapsed, Duration::from_millis(40));
    // Wakes from unrelated bits must not restart the timeout
    assert_lt!(elapsed, Duration::from_millis(40 + 160));
}

/// Two incoming PDOs each set one bit from their hooks; a waiter on both wakes once both
/// have arrived, not at its timeout
#[serial]
#[test]
fn test_hooks_wake_all_waiter() {
    init_logging();
    let bus = SimBus::new();
    let network = Network::open(
        bus.transport(),
        NetworkOptions::new(NetworkClass::Can, std::time::Duration::from_millis(1)),
    )
    .unwrap();
    let signal = Arc::new(EventSignal::new());

    let mut nodes = Vec::new();
    for (bit, id) in [(0b01u32, 1u8), (0b10, 2)] {
        let address = NodeAddress::Can(CanNodeId::new(id).unwrap());
        let node = Node::new(&network, address).unwrap();
        let mut tpdo = PdoContainer::incoming(NetworkClass::Can);
        tpdo.init(address.tpdo_address(1).unwrap()).unwrap();
        tpdo.add_var(MappedVar::<i32>::new(0x6064, 0)).unwrap();
        let hook_signal = signal.clone();
        tpdo.set_received(move |_: &PdoContainer| hook_signal.set_bits(bit))
            .unwrap();
        node.pdo_set(1, tpdo).unwrap();
        node.start_node();
        nodes.push(node);
    }

    let net_ref = network.network_ref();
    let start = Instant::now();
    let sender = thread::spawn(move || {
        for id in [1u8, 2] {
            thread::sleep(Duration::from_millis(2));
            let address = NodeAddress::Can(CanNodeId::new(id).unwrap());
            let frame = PdoFrame::new(address.tpdo_address(1).unwrap(), &[0, 0, 0, id]).unwrap();
            net_ref.acquire().unwrap().deliver(&frame);
        }
    });

    let result = Event::All(0b11).wait(&signal, Some(Duration::from_secs(1)));
    let elapsed = start.elapsed();
    sender.join().unwrap();

    assert_eq!(Ok(0b11), result);
    assert_lt!(elapsed, Duration::from_millis(500));
}
