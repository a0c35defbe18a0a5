#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use powershot::catalog::CommandDescriptor;
use powershot::codec::put_le32;
use powershot::{Camera, PollerConfig, RemoteConfig, TransportConfig, UsbIo};

pub fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

/// What the fake camera does in answer to one command packet.
#[derive(Debug, Default, Clone)]
pub struct Reply {
    pub bulk: Vec<u8>,
    pub interrupts: Vec<Vec<u8>>,
}

impl Reply {
    pub fn bulk(bulk: Vec<u8>) -> Self {
        Self {
            bulk,
            interrupts: Vec::new(),
        }
    }

    /// No answer at all, the next bulk read times out.
    pub fn silence() -> Self {
        Self::default()
    }

    pub fn with_interrupts(mut self, interrupts: Vec<Vec<u8>>) -> Self {
        self.interrupts = interrupts;
        self
    }
}

pub type Responder = Box<dyn FnMut(&[u8]) -> Reply + Send>;

/// A fixed response of `total` bytes whose length word agrees with `total`.
pub fn fixed_response(total: usize, status: u32, patches: &[(usize, &[u8])]) -> Vec<u8> {
    fixed_response_claiming(total, total, status, patches)
}

/// A fixed response of `actual` bytes that claims to be `claimed` long.
pub fn fixed_response_claiming(actual: usize, claimed: usize, status: u32, patches: &[(usize, &[u8])]) -> Vec<u8> {
    let mut data = vec![0u8; actual];
    put_le32(&mut data, 0x48, (claimed - 0x40) as u32).unwrap();
    put_le32(&mut data, 0x50, status).unwrap();
    for (offset, bytes) in patches {
        data[*offset..*offset + bytes.len()].copy_from_slice(bytes);
    }
    data
}

/// A variable response: 0x40 byte header announcing `payload`, then `payload`.
pub fn variable_response(payload: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 0x40];
    put_le32(&mut data, 0x06, payload.len() as u32).unwrap();
    data.extend_from_slice(payload);
    data
}

/// Full-length response to `cmd` with `patches` at absolute offsets.
pub fn response_for(cmd: &CommandDescriptor, patches: &[(usize, &[u8])]) -> Vec<u8> {
    fixed_response(cmd.expected_len().unwrap(), 0, patches)
}

pub fn identify_response() -> Vec<u8> {
    // body offsets + 0x40
    response_for(
        &powershot::catalog::IDENTIFY_CAMERA,
        &[
            (0x58, [0x00u8, 0x01, 0x10, 0x01].as_slice()),
            (0x5c, b"Canon PowerShot G3\0".as_slice()),
            (0x7c, b"Nikola\0".as_slice()),
        ],
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlWrite {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub data: Vec<u8>,
}

pub struct FakeState {
    pub status_byte: u8,
    /// Interrupt records sent after the wake message.
    pub wake_interrupts: Vec<Vec<u8>>,
    pub bulk: VecDeque<u8>,
    pub interrupts: VecDeque<Vec<u8>>,
    /// Interrupt reads fail with these first, one per read.
    pub interrupt_errors: VecDeque<rusb::Error>,
    /// What an interrupt read returns once nothing else is queued,
    /// `Timeout` when unset.
    pub interrupt_failure: Option<rusb::Error>,
    pub interrupt_reads: usize,
    pub responders: HashMap<(u8, u8), Responder>,
    pub control_writes: Vec<ControlWrite>,
    pub control_reads: Vec<(u8, u8, u16, usize)>,
    pub commands: Vec<(u8, u8)>,
    pub cleared_halts: Vec<u8>,
    /// Requested length of every bulk read.
    pub bulk_reads: Vec<usize>,
    pub configured: usize,
    pub io_count: usize,
    /// Cap on the bytes one bulk read returns, to provoke short reads.
    pub bulk_read_limit: Option<usize>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            status_byte: b'C',
            wake_interrupts: vec![vec![0xaa; 0x10]],
            bulk: VecDeque::new(),
            interrupts: VecDeque::new(),
            interrupt_errors: VecDeque::new(),
            interrupt_failure: None,
            interrupt_reads: 0,
            responders: HashMap::new(),
            control_writes: Vec::new(),
            control_reads: Vec::new(),
            commands: Vec::new(),
            cleared_halts: Vec::new(),
            bulk_reads: Vec::new(),
            configured: 0,
            io_count: 0,
            bulk_read_limit: None,
        }
    }
}

/// A scripted G3. Clones share state, so a test keeps one handle while the
/// camera owns the other.
#[derive(Clone, Default)]
pub struct FakeCamera {
    state: Arc<Mutex<FakeState>>,
}

impl FakeCamera {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.respond_with(&powershot::catalog::IDENTIFY_CAMERA, |_| Reply::bulk(identify_response()));
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn respond_with<F>(&self, cmd: &CommandDescriptor, responder: F)
    where
        F: FnMut(&[u8]) -> Reply + Send + 'static,
    {
        self.state().responders.insert((cmd.cmd1, cmd.cmd2), Box::new(responder));
    }

    /// Always answer `cmd` with `response`.
    pub fn respond(&self, cmd: &CommandDescriptor, response: Vec<u8>) {
        self.respond_with(cmd, move |_| Reply::bulk(response.clone()));
    }

    pub fn io_count(&self) -> usize {
        self.state().io_count
    }

    pub fn commands(&self) -> Vec<(u8, u8)> {
        self.state().commands.clone()
    }

    pub fn command_packets(&self) -> Vec<Vec<u8>> {
        self.state()
            .control_writes
            .iter()
            .filter(|w| w.value == 0x10)
            .map(|w| w.data.clone())
            .collect()
    }

    pub fn queue_interrupt(&self, record: Vec<u8>) {
        self.state().interrupts.push_back(record);
    }
}

impl UsbIo for FakeCamera {
    fn configure(&mut self) -> rusb::Result<()> {
        self.state().configured += 1;
        Ok(())
    }

    fn clear_halt(&self, endpoint: u8, _timeout: Duration) -> rusb::Result<()> {
        let mut state = self.state();
        state.cleared_halts.push(endpoint);
        if endpoint == 0x83 {
            return Err(rusb::Error::Pipe);
        }
        Ok(())
    }

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        _index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let mut state = self.state();
        state.io_count += 1;
        state.control_reads.push((request_type, request, value, buf.len()));
        match value {
            0x55 => {
                buf[0] = state.status_byte;
                Ok(1)
            }
            0x01 => {
                for (i, b) in buf.iter_mut().enumerate() {
                    *b = i as u8;
                }
                Ok(buf.len())
            }
            0x04 => Ok(buf.len()),
            _ => Err(rusb::Error::Pipe),
        }
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        _index: u16,
        buf: &[u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        let mut state = self.state();
        state.io_count += 1;
        state.control_writes.push(ControlWrite {
            request_type,
            request,
            value,
            data: buf.to_vec(),
        });

        match value {
            0x10 => {
                let key = (buf[0x44], buf[0x47]);
                state.commands.push(key);
                let reply = match state.responders.get_mut(&key) {
                    Some(responder) => responder(buf),
                    None => Reply::silence(),
                };
                state.bulk.extend(reply.bulk);
                state.interrupts.extend(reply.interrupts);
            }
            0x11 => {
                state.bulk.extend(std::iter::repeat(0x55).take(0x44));
                let wake = state.wake_interrupts.clone();
                state.interrupts.extend(wake);
            }
            _ => {}
        }
        Ok(buf.len())
    }

    fn read_bulk(&self, _endpoint: u8, buf: &mut [u8], _timeout: Duration) -> rusb::Result<usize> {
        let mut state = self.state();
        state.io_count += 1;
        state.bulk_reads.push(buf.len());
        if state.bulk.is_empty() {
            return Err(rusb::Error::Timeout);
        }
        let limit = state.bulk_read_limit.unwrap_or(usize::MAX);
        let len = buf.len().min(state.bulk.len()).min(limit);
        for (dst, src) in buf.iter_mut().zip(state.bulk.drain(..len)) {
            *dst = src;
        }
        Ok(len)
    }

    fn read_interrupt(&self, _endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        let (record, failure) = {
            let mut state = self.state();
            state.io_count += 1;
            state.interrupt_reads += 1;
            if let Some(err) = state.interrupt_errors.pop_front() {
                return Err(err);
            }
            (state.interrupts.pop_front(), state.interrupt_failure)
        };
        match (record, failure) {
            (Some(record), _) => {
                let len = buf.len().min(record.len());
                buf[..len].copy_from_slice(&record[..len]);
                Ok(len)
            }
            (None, Some(err)) => Err(err),
            (None, None) => {
                thread::sleep(timeout.min(Duration::from_millis(2)));
                Err(rusb::Error::Timeout)
            }
        }
    }
}

pub fn fast_transport_config() -> TransportConfig {
    TransportConfig {
        wake_interrupt_timeout: Duration::from_millis(500),
        poller: PollerConfig {
            read_timeout: Duration::from_millis(2),
            interval: Duration::from_millis(1),
            wait_tick: Duration::from_millis(2),
            ..PollerConfig::default()
        },
        ..TransportConfig::default()
    }
}

pub fn fast_remote_config() -> RemoteConfig {
    RemoteConfig {
        drain_interval: Duration::from_millis(1),
        capture_timeout: Duration::from_millis(300),
        ..RemoteConfig::default()
    }
}

/// A camera over `fake` with test-friendly timings.
pub fn camera(fake: &FakeCamera) -> Camera<FakeCamera> {
    Camera::with_config(fake.clone(), fast_transport_config(), fast_remote_config())
}
