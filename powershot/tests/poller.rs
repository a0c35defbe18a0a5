mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{camera, init_logging, FakeCamera};

fn wait_until_finished(camera: &mut powershot::Camera<FakeCamera>) {
    let started = Instant::now();
    while camera.transport().poller_running() {
        assert!(started.elapsed() < Duration::from_secs(2), "poller never exited");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn error_budget_stops_the_poller() {
    init_logging();
    let fake = FakeCamera::new();
    fake.state().interrupt_failure = Some(rusb::Error::Io);
    let mut camera = camera(&fake);

    camera.transport().start_poller(0x10).unwrap();
    let started = Instant::now();
    assert!(!camera.transport().wait_for_interrupts(0x10, Duration::from_secs(5)));
    // gave up as soon as the poller died, not after the full timeout
    assert!(started.elapsed() < Duration::from_secs(2));

    assert!(!camera.transport().poller_running());
    assert_eq!(fake.state().interrupt_reads, 10);
    assert_eq!(camera.transport().stop_poller(), Some(Vec::new()));
}

#[test]
fn timeouts_are_not_errors() {
    let fake = FakeCamera::new();
    let mut camera = camera(&fake);

    camera.transport().start_poller(0x10).unwrap();
    thread::sleep(Duration::from_millis(100));

    assert!(camera.transport().poller_running());
    assert!(fake.state().interrupt_reads > camera.transport().config().poller.error_budget);
    camera.transport().stop_poller();
}

#[test]
fn timeouts_do_not_reset_the_error_count() {
    let fake = FakeCamera::new();
    fake.state()
        .interrupt_errors
        .extend([rusb::Error::Io, rusb::Error::Timeout, rusb::Error::Pipe].iter().cycle().take(15));
    let mut camera = camera(&fake);

    camera.transport().start_poller(0x10).unwrap();
    wait_until_finished(&mut camera);
    // ten failures interleaved with five timeouts
    assert_eq!(fake.state().interrupt_reads, 15);
}

#[test]
fn data_resets_the_error_count() {
    let fake = FakeCamera::new();
    {
        let mut state = fake.state();
        state.interrupt_errors.extend(std::iter::repeat(rusb::Error::Io).take(9));
        state.interrupts.push_back(vec![0x01; 0x08]);
        state.interrupt_failure = Some(rusb::Error::Overflow);
    }
    let mut camera = camera(&fake);

    camera.transport().start_poller(0x10).unwrap();
    wait_until_finished(&mut camera);

    assert_eq!(fake.state().interrupt_reads, 9 + 1 + 10);
    assert_eq!(camera.transport().stop_poller(), Some(vec![0x01; 0x08]));
}

#[test]
fn vanished_device_stops_at_once() {
    for err in [rusb::Error::NoDevice, rusb::Error::Busy] {
        let fake = FakeCamera::new();
        fake.state().interrupt_failure = Some(err);
        let mut camera = camera(&fake);

        camera.transport().start_poller(0x10).unwrap();
        assert!(!camera.transport().wait_for_interrupts(0x10, Duration::from_secs(5)));
        assert!(!camera.transport().poller_running());
        assert_eq!(fake.state().interrupt_reads, 1, "{:?}", err);
    }
}

#[test]
fn finished_poller_can_be_replaced() {
    let fake = FakeCamera::new();
    fake.queue_interrupt(vec![0xaa; 0x10]);
    let mut camera = camera(&fake);

    camera.transport().start_poller(0x10).unwrap();
    assert!(camera.transport().wait_for_interrupts(0x10, Duration::from_secs(1)));
    wait_until_finished(&mut camera);

    camera.transport().start_poller(0x20).unwrap();
    assert!(camera.transport().poller_running());
    assert_eq!(camera.transport().interrupt_bytes(), 0);
}
