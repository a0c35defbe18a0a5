use std::io::Write;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use log::{debug, info, trace, warn};

use super::packet::{
    build_packet, first_chunk_size, next_chunk_size, ChunkPlan, Serial, RESPONSE_HEADER_LEN, RESPONSE_LEN_OFFSET,
    RESPONSE_STATUS_OFFSET, VARIABLE_LEN_OFFSET,
};
use super::poller::InterruptPoller;
use super::UsbIo;
use crate::catalog::{CommandDescriptor, ResponseShape, IDENTIFY_CAMERA};
use crate::codec::{hexdump, le32};
use crate::config::TransportConfig;
use crate::error::{Error, Result};

const REQUEST_TYPE_IN: u8 = 0xc0;
const REQUEST_TYPE_OUT: u8 = 0x40;

const VALUE_COMMAND: u16 = 0x10;
const VALUE_CAMERA_STATUS: u16 = 0x55;
const VALUE_WAKE_MESSAGE: u16 = 0x01;
const VALUE_WAKE_REPLY: u16 = 0x11;
const VALUE_ACTIVE_ACK: u16 = 0x04;

const WAKE_MESSAGE_LEN: usize = 0x58;
const WAKE_REPLY_LEN: usize = 0x50;
const ACTIVE_ACK_LEN: usize = 0x50;
const WAKE_BULK_LEN: usize = 0x44;
const WAKE_INTERRUPT_LEN: usize = 0x10;

/// A fixed response must be at least this long to carry its status word.
const FIXED_MIN_LEN: usize = RESPONSE_STATUS_OFFSET + 4;

/// What the camera said about itself at the start of the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CamStatus {
    /// Already talking to a host, no wake-up needed.
    Active,
    /// Just powered up, had to be woken.
    Cold,
}

impl CamStatus {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'A' => Some(CamStatus::Active),
            b'C' => Some(CamStatus::Cold),
            _ => None,
        }
    }
}

/// The camera's answer to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status word of a fixed-length response.
    pub status: Option<u32>,
    /// Response data, with or without the 0x40 byte header depending on the
    /// call that produced it.
    pub data: Bytes,
}

/// Where response chunks go while a command drains.
trait ChunkSink {
    fn accept(&mut self, chunk: &[u8]) -> Result<()>;
}

impl ChunkSink for BytesMut {
    fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        self.extend_from_slice(chunk);
        Ok(())
    }
}

struct WriteSink<'a, W: Write> {
    inner: &'a mut W,
    written: u64,
}

impl<W: Write> ChunkSink for WriteSink<'_, W> {
    fn accept(&mut self, chunk: &[u8]) -> Result<()> {
        self.inner.write_all(chunk)?;
        self.written += chunk.len() as u64;
        Ok(())
    }
}

/// Command/response framing over one opened camera.
///
/// All control and bulk traffic goes through `&mut self`, so commands never
/// interleave. The device is shared only with the interrupt poller thread.
pub struct Transport<D: UsbIo> {
    device: Arc<D>,
    config: TransportConfig,
    timeout: Duration,
    serial: Serial,
    poller: Option<InterruptPoller>,
}

impl<D: UsbIo> Transport<D> {
    pub fn new(device: D, config: TransportConfig) -> Self {
        let timeout = config.timeout;
        Self {
            device: Arc::new(device),
            config,
            timeout,
            serial: Serial::default(),
            poller: None,
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    /// Use `timeout` for transfers until the returned guard is dropped.
    pub fn override_timeout(&mut self, timeout: Duration) -> TimeoutGuard<'_, D> {
        let previous = std::mem::replace(&mut self.timeout, timeout);
        debug!("timeout {:?} -> {:?}", previous, timeout);
        TimeoutGuard {
            transport: self,
            previous,
            since: Instant::now(),
        }
    }

    /// Bring the camera into a state where it accepts commands.
    pub fn init(&mut self) -> Result<CamStatus> {
        // a poller that exited on its own may still hold the device until joined
        if self.poller.is_some() && !self.poller_running() {
            if let Some(received) = self.stop_poller() {
                debug!("reaped finished interrupt poller with 0x{:x} bytes", received.len());
            }
        }
        match Arc::get_mut(&mut self.device) {
            Some(device) => device.configure()?,
            None => debug!("device shared with a running poller, keeping its configuration"),
        }

        let endpoints = self.config.endpoints;
        for endpoint in [endpoints.bulk_in, endpoints.interrupt_in, endpoints.bulk_out] {
            if let Err(err) = self.device.clear_halt(endpoint, self.timeout) {
                info!("clearing halt on 0x{:02x} failed: {}", endpoint, err);
            }
        }

        let started_poller = if self.poller_running() {
            debug!("reusing the running interrupt poller");
            false
        } else {
            self.start_poller(WAKE_INTERRUPT_LEN)?;
            true
        };

        let result = self.wake();

        if started_poller {
            self.stop_poller();
        }
        result
    }

    fn wake(&mut self) -> Result<CamStatus> {
        let init_timeout = self.config.init_timeout;
        let (status, mut msg) = {
            let mut transport = self.override_timeout(init_timeout);
            let raw = transport.control_read(VALUE_CAMERA_STATUS, 1)?;
            let status = CamStatus::from_byte(raw[0]).ok_or_else(|| Error::protocol("bad init status"))?;
            let msg = transport.control_read(VALUE_WAKE_MESSAGE, WAKE_MESSAGE_LEN)?;

            if status == CamStatus::Active {
                debug!("camera was already active");
                transport.control_read(VALUE_ACTIVE_ACK, ACTIVE_ACK_LEN)?;
                return Ok(status);
            }
            (status, msg)
        };

        debug!("camera woken up, initializing");
        msg[..0x40].fill(0);
        msg[0] = 0x10;
        msg.copy_within(0x48..WAKE_MESSAGE_LEN, 0x40);
        self.control_write(VALUE_WAKE_REPLY, &msg[..WAKE_REPLY_LEN])?;
        self.bulk_read(WAKE_BULK_LEN)?;

        let wait = self.config.wake_interrupt_timeout;
        if !self.wait_for_interrupts(WAKE_INTERRUPT_LEN, wait) {
            return Err(Error::protocol("timed out waiting for wake interrupt"));
        }

        for attempt in 1..=self.config.identify_attempts {
            match self.command(&IDENTIFY_CAMERA, &[]) {
                Ok(_) => return Ok(status),
                Err(err) => debug!("identify after init failed (attempt {}): {}", attempt, err),
            }
        }
        Err(Error::protocol("device never became ready"))
    }

    /// Run `cmd` and return the response without its 0x40 byte header.
    pub fn command(&mut self, cmd: &CommandDescriptor, payload: &[u8]) -> Result<Response> {
        let mut data = BytesMut::new();
        let status = self.execute(cmd, payload, false, &mut data)?;
        Ok(Response {
            status,
            data: data.freeze(),
        })
    }

    /// Run `cmd` and return the whole response, header included.
    pub fn command_full(&mut self, cmd: &CommandDescriptor, payload: &[u8]) -> Result<Response> {
        let mut data = BytesMut::new();
        let status = self.execute(cmd, payload, true, &mut data)?;
        Ok(Response {
            status,
            data: data.freeze(),
        })
    }

    /// Run `cmd`, streaming the response into `sink` chunk by chunk.
    ///
    /// Returns the number of bytes written.
    pub fn command_into<W: Write>(
        &mut self,
        cmd: &CommandDescriptor,
        payload: &[u8],
        sink: &mut W,
        with_header: bool,
    ) -> Result<u64> {
        let mut sink = WriteSink {
            inner: sink,
            written: 0,
        };
        self.execute(cmd, payload, with_header, &mut sink)?;
        Ok(sink.written)
    }

    fn execute(
        &mut self,
        cmd: &CommandDescriptor,
        payload: &[u8],
        with_header: bool,
        sink: &mut dyn ChunkSink,
    ) -> Result<Option<u32>> {
        let serial = self.serial.advance();
        let packet = build_packet(cmd, payload, self.serial);
        info!(
            ">>> {} (0x{:x}, 0x{:x}, 0x{:x}) payload 0x{:x} #{}",
            cmd.name,
            cmd.cmd1,
            cmd.cmd2,
            cmd.cmd3(),
            payload.len(),
            serial
        );
        if !payload.is_empty() {
            debug!("payload {}", hex::encode(payload));
        }

        let (first, mut remaining) = match cmd.shape {
            ResponseShape::Variable => (RESPONSE_HEADER_LEN, 0),
            ResponseShape::Fixed(len) => {
                let first = first_chunk_size(len);
                (first, len - first)
            }
        };

        self.control_write(VALUE_COMMAND, &packet)?;
        let mut data = self.bulk_read(first)?;

        let status = match cmd.shape {
            ResponseShape::Variable => {
                remaining = le32(&data, VARIABLE_LEN_OFFSET)? as usize;
                info!("<<< {} variable response, 0x{:x} bytes follow #{}", cmd.name, remaining, serial);
                None
            }
            ResponseShape::Fixed(expected) => {
                if data.len() < FIXED_MIN_LEN {
                    if remaining == 0 {
                        return Err(Error::protocol(format!(
                            "{} response of 0x{:x} bytes cannot hold a status",
                            cmd.name, expected
                        )));
                    }
                    let chunk = next_chunk_size(remaining);
                    data.extend_from_slice(&self.bulk_read(chunk)?);
                    remaining -= chunk;
                }

                let reported = le32(&data, RESPONSE_LEN_OFFSET)? as usize + RESPONSE_HEADER_LEN;
                if reported != expected {
                    warn!(
                        "{} response length 0x{:x}, camera says 0x{:x}, correcting",
                        cmd.name, expected, reported
                    );
                    remaining = reported.checked_sub(data.len()).ok_or_else(|| {
                        Error::protocol(format!(
                            "camera reported 0x{:x} bytes but 0x{:x} were already read",
                            reported,
                            data.len()
                        ))
                    })?;
                }

                let status = le32(&data, RESPONSE_STATUS_OFFSET)?;
                info!(
                    "<<< {} retlen 0x{:x} #{} status 0x{:x}",
                    cmd.name, reported, serial, status
                );
                Some(status)
            }
        };

        if with_header {
            sink.accept(&data)?;
        } else if data.len() > RESPONSE_HEADER_LEN {
            sink.accept(&data[RESPONSE_HEADER_LEN..])?;
        }

        for chunk in ChunkPlan::new(remaining) {
            sink.accept(&self.bulk_read(chunk)?)?;
        }

        Ok(status)
    }

    fn request_for(len: usize) -> u8 {
        if len > 1 {
            0x04
        } else {
            0x0c
        }
    }

    pub fn control_read(&mut self, value: u16, len: usize) -> Result<BytesMut> {
        let request = Self::request_for(len);
        debug!("CTRL IN (req 0x{:x}, wValue 0x{:x}) reading 0x{:x} bytes", request, value, len);

        let mut buf = BytesMut::zeroed(len);
        let read = self
            .device
            .read_control(REQUEST_TYPE_IN, request, value, 0, &mut buf, self.timeout)?;
        if read != len {
            warn!("control read got 0x{:x} bytes, wanted 0x{:x}", read, len);
            return Err(Error::transport("unexpected response length"));
        }
        trace!("\n{}", hexdump(&buf));
        Ok(buf)
    }

    pub fn control_write(&mut self, value: u16, data: &[u8]) -> Result<usize> {
        let request = Self::request_for(data.len());
        debug!(
            "CTRL OUT (req 0x{:x}, wValue 0x{:x}) 0x{:x} bytes",
            request,
            value,
            data.len()
        );
        trace!("\n{}", hexdump(data));

        let written = self
            .device
            .write_control(REQUEST_TYPE_OUT, request, value, 0, data, self.timeout)?;
        if written != data.len() {
            warn!("control write sent 0x{:x} bytes of 0x{:x}", written, data.len());
            return Err(Error::transport("control write was incomplete"));
        }
        Ok(written)
    }

    pub fn bulk_read(&mut self, len: usize) -> Result<BytesMut> {
        let started = Instant::now();
        let mut buf = BytesMut::zeroed(len);
        let read = self
            .device
            .read_bulk(self.config.endpoints.bulk_in, &mut buf, self.timeout)?;
        if read != len {
            warn!("bulk in got 0x{:x} bytes instead of 0x{:x}", read, len);
            trace!("\n{}", hexdump(&buf[..read]));
            return Err(Error::transport("short bulk read"));
        }
        debug!("bulk in got 0x{:x} bytes in {:?}", read, started.elapsed());
        trace!("\n{}", hexdump(&buf));
        Ok(buf)
    }

    pub fn poller_running(&self) -> bool {
        self.poller.as_ref().is_some_and(InterruptPoller::is_running)
    }

    /// Start collecting interrupt bytes until `target` of them arrived.
    pub fn start_poller(&mut self, target: usize) -> Result<()> {
        if self.poller_running() {
            return Err(Error::precondition("an interrupt poller is already running"));
        }
        // a poller that exited on its own is replaced
        self.poller = None;
        self.poller = Some(InterruptPoller::spawn(
            self.device.clone(),
            self.config.endpoints.interrupt_in,
            target,
            &self.config.poller,
        )?);
        Ok(())
    }

    /// Stop the poller, if any, and return the bytes it collected.
    pub fn stop_poller(&mut self) -> Option<Vec<u8>> {
        self.poller.take().map(InterruptPoller::stop)
    }

    /// Bytes the current poller has collected so far.
    pub fn interrupt_bytes(&self) -> usize {
        self.poller.as_ref().map_or(0, InterruptPoller::received_len)
    }

    /// Wait for the current poller to collect `count` bytes. False without a
    /// poller, on timeout or when the poller exits early.
    pub fn wait_for_interrupts(&self, count: usize, timeout: Duration) -> bool {
        match &self.poller {
            Some(poller) => poller.wait_for(count, timeout),
            None => false,
        }
    }

    /// Read and discard whatever sits on the interrupt pipe.
    ///
    /// Makes `attempts` reads, `interval` apart. Timeouts and other
    /// failures are logged and skipped. Returns the number of bytes thrown
    /// away.
    pub fn drain_interrupts(&mut self, attempts: usize, interval: Duration) -> Result<usize> {
        if self.poller_running() {
            return Err(Error::precondition("cannot drain the interrupt pipe while a poller runs"));
        }

        let endpoint = self.config.endpoints.interrupt_in;
        let mut buf = vec![0u8; self.config.poller.chunk];
        let mut drained = 0;
        for attempt in 0..attempts {
            if attempt > 0 {
                std::thread::sleep(interval);
            }
            match self.device.read_interrupt(endpoint, &mut buf, self.config.poller.read_timeout) {
                Ok(len) => {
                    if len > 0 {
                        debug!("drained 0x{:x} stale interrupt bytes\n{}", len, hexdump(&buf[..len]));
                    }
                    drained += len;
                }
                Err(rusb::Error::Timeout) => {}
                Err(err) => debug!("interrupt drain: {}", err),
            }
        }
        Ok(drained)
    }
}

impl<D: UsbIo> Drop for Transport<D> {
    fn drop(&mut self) {
        if let Some(received) = self.stop_poller() {
            debug!("stopped interrupt poller with 0x{:x} bytes on drop", received.len());
        }
    }
}

/// Restores the transport's previous timeout when dropped.
pub struct TimeoutGuard<'a, D: UsbIo> {
    transport: &'a mut Transport<D>,
    previous: Duration,
    since: Instant,
}

impl<D: UsbIo> Deref for TimeoutGuard<'_, D> {
    type Target = Transport<D>;

    fn deref(&self) -> &Transport<D> {
        self.transport
    }
}

impl<D: UsbIo> DerefMut for TimeoutGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut Transport<D> {
        self.transport
    }
}

impl<D: UsbIo> Drop for TimeoutGuard<'_, D> {
    fn drop(&mut self) {
        debug!(
            "timeout {:?} <- {:?}, back after {:?}",
            self.previous,
            self.transport.timeout,
            self.since.elapsed()
        );
        self.transport.timeout = self.previous;
    }
}
