use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use super::UsbIo;
use crate::codec::hexdump;
use crate::config::PollerConfig;
use crate::error::Result;

/// Background reader of the interrupt endpoint.
///
/// The camera signals the end of a wake-up or of a capture by pushing a few
/// 0x10 byte records on the interrupt pipe. The poller collects them until
/// `target` bytes arrived, it is asked to stop, the device disappears or too
/// many transfers fail in a row.
#[derive(Debug)]
pub struct InterruptPoller {
    received: Arc<Mutex<Vec<u8>>>,
    should_stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    wait_tick: Duration,
    worker: Option<JoinHandle<()>>,
}

impl InterruptPoller {
    pub fn spawn<D: UsbIo>(device: Arc<D>, endpoint: u8, target: usize, config: &PollerConfig) -> Result<Self> {
        let received = Arc::new(Mutex::new(Vec::new()));
        let should_stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let worker = {
            let received = received.clone();
            let should_stop = should_stop.clone();
            let finished = finished.clone();
            let config = config.clone();
            thread::Builder::new()
                .name("interrupt-poller".to_string())
                .spawn(move || {
                    poll(&*device, endpoint, target, &config, &received, &should_stop);
                    finished.store(true, Ordering::SeqCst);
                })?
        };

        debug!("interrupt poller started, waiting for 0x{:x} bytes", target);
        Ok(Self {
            received,
            should_stop,
            finished,
            wait_tick: config.wait_tick,
            worker: Some(worker),
        })
    }

    pub fn is_running(&self) -> bool {
        !self.finished.load(Ordering::SeqCst)
    }

    /// Number of bytes collected so far.
    pub fn received_len(&self) -> usize {
        lock(&self.received).len()
    }

    /// Block until at least `count` bytes arrived or `timeout` elapsed.
    ///
    /// Gives up early, returning `false`, once the poller has exited
    /// without reaching `count`.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            if self.received_len() >= count {
                return true;
            }
            if !self.is_running() {
                // one last look, the worker may have appended right before exiting
                return self.received_len() >= count;
            }
            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return false;
            }
            thread::sleep(self.wait_tick.min(timeout - elapsed));
        }
    }

    /// Ask the worker to exit, wait for it and hand back what it collected.
    pub fn stop(mut self) -> Vec<u8> {
        self.shutdown();
        std::mem::take(&mut *lock(&self.received))
    }

    fn shutdown(&mut self) {
        self.should_stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("interrupt poller thread panicked");
            }
        }
    }
}

impl Drop for InterruptPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(received: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    received.lock().unwrap_or_else(PoisonError::into_inner)
}

fn poll<D: UsbIo>(
    device: &D,
    endpoint: u8,
    target: usize,
    config: &PollerConfig,
    received: &Mutex<Vec<u8>>,
    should_stop: &AtomicBool,
) {
    let mut buf = vec![0u8; config.chunk];
    let mut errors = 0;

    while !should_stop.load(Ordering::SeqCst) {
        match device.read_interrupt(endpoint, &mut buf, config.read_timeout) {
            Ok(0) => errors = 0,
            Ok(len) => {
                errors = 0;
                trace!("interrupt in 0x{:x} bytes\n{}", len, hexdump(&buf[..len]));
                let mut received = lock(received);
                received.extend_from_slice(&buf[..len]);
                if received.len() >= target {
                    info!("poller got 0x{:x} bytes, needed 0x{:x}", received.len(), target);
                    return;
                }
            }
            Err(rusb::Error::Timeout) => {}
            Err(err @ (rusb::Error::NoDevice | rusb::Error::Busy)) => {
                warn!("interrupt poll: {}, poller exiting", err);
                return;
            }
            Err(err) => {
                errors += 1;
                warn!("interrupt poll: {} ({} in a row)", err, errors);
                if errors >= config.error_budget {
                    info!("poller got too many errors, exiting");
                    return;
                }
            }
        }
        thread::sleep(config.interval);
    }

    info!("poller stop requested, exiting");
}
