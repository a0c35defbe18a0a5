//! Remote capture over the `CONTROL_CAMERA` envelope.
//!
//! Every remote-control sub-command travels as the payload of a
//! `CONTROL_CAMERA` command:
//!
//! ```text
//! [sub-command:4][arg1:4][arg2:4]     or     [sub-command:4][raw payload]
//! ```
//!
//! and the camera answers with a fixed response sized by the sub-command.

use bytes::{BufMut, BytesMut};
use log::{debug, info, warn};

use crate::bitfield::ParameterBlock;
use crate::catalog::{
    CommandDescriptor, RcSubcommand, GENERIC_LOCK_KEYS, RC_EXIT, RC_GET_AVAILABLE_SHOT, RC_GET_PARAMS,
    RC_GET_ZOOM_POS, RC_INIT, RC_SET_PARAMS, RC_SET_TRANSFER_MODE, RC_SET_ZOOM_POS, RC_SHUTTER_RELEASE,
};
use crate::codec::le32;
use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::params::{ReleaseParams, TransferMode};
use crate::usb::transport::{Response, Transport};
use crate::usb::UsbIo;

/// Offset of the sub-command's own data in a `CONTROL_CAMERA` response.
const REPLY_DATA_OFFSET: usize = 0x5c;

/// First argument of the "set" sub-commands, the length of the value that
/// follows.
const VALUE_WORD_LEN: u32 = 0x04;

/// Interrupt bytes the camera sends once a shot is stored.
const CAPTURE_INTERRUPT_LEN: usize = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    Completed { interrupt_bytes: usize },
    /// The camera did not report completion within the capture timeout.
    TimedOut,
}

/// Remote-control state that outlives a single [`RemoteControl`] borrow.
#[derive(Debug, Default)]
pub struct Session {
    active: bool,
    transfer_mode: Option<TransferMode>,
    config: RemoteConfig,
}

impl Session {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            active: false,
            transfer_mode: None,
            config,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

fn rc_payload(rc: &RcSubcommand, arg1: Option<u32>, arg2: Option<u32>) -> BytesMut {
    let mut payload = BytesMut::with_capacity(12);
    payload.put_u32_le(rc.value);
    payload.put_u32_le(arg1.unwrap_or(0));
    if let Some(arg2) = arg2 {
        payload.put_u32_le(arg2);
    }
    payload
}

fn rc_raw_payload(rc: &RcSubcommand, raw: &[u8]) -> BytesMut {
    let mut payload = BytesMut::with_capacity(4 + raw.len());
    payload.put_u32_le(rc.value);
    payload.put_slice(raw);
    payload
}

fn send<D: UsbIo>(transport: &mut Transport<D>, rc: &RcSubcommand, payload: &[u8]) -> Result<Response> {
    let cmd = CommandDescriptor::envelope_for(rc);
    info!("RC {} retlen 0x{:x}", rc.name, cmd.expected_len().unwrap_or_default());
    transport.command_full(&cmd, payload)
}

/// Remote capture commands, borrowed from a [`Camera`](crate::Camera).
///
/// Everything except [`start`](Self::start) and
/// [`force_exit`](Self::force_exit) needs an active session and fails with
/// [`Error::Precondition`] otherwise, before touching the USB bus.
pub struct RemoteControl<'a, D: UsbIo> {
    transport: &'a mut Transport<D>,
    session: &'a mut Session,
}

impl<'a, D: UsbIo> RemoteControl<'a, D> {
    pub fn new(transport: &'a mut Transport<D>, session: &'a mut Session) -> Self {
        Self { transport, session }
    }

    pub fn is_active(&self) -> bool {
        self.session.active
    }

    fn require_active(&self, operation: &str) -> Result<()> {
        if self.session.active {
            Ok(())
        } else {
            Err(Error::precondition(format!("{} only works while remote control is active", operation)))
        }
    }

    /// Enter remote-control mode. Does nothing when already active unless
    /// `force` is set.
    pub fn start(&mut self, force: bool) -> Result<()> {
        if self.session.active && !force {
            info!("remote control already active, force me");
            return Ok(());
        }

        let config = self.session.config.clone();
        let drained = self
            .transport
            .drain_interrupts(config.drain_attempts, config.drain_interval)?;
        if drained > 0 {
            debug!("dropped 0x{:x} stale interrupt bytes", drained);
        }

        // RC_INIT tends to fail with the keys unlocked
        self.transport.command(&GENERIC_LOCK_KEYS, &[])?;
        {
            let mut transport = self.transport.override_timeout(config.init_timeout);
            send(&mut *transport, &RC_INIT, &rc_payload(&RC_INIT, None, None))?;
        }
        self.session.active = true;
        self.session.transfer_mode = None;

        self.set_transfer_mode(TransferMode::FULL_TO_DRIVE)?;
        // lens back to wide
        self.set_zoom(0)
    }

    /// Leave remote-control mode.
    ///
    /// The session is inactive afterwards even when the exit command fails;
    /// the failure is still reported.
    pub fn stop(&mut self) -> Result<()> {
        self.require_active("stop")?;
        self.exit()
    }

    /// Send `RC_EXIT` whatever this session believes, for a camera left in
    /// remote-control mode by an earlier host.
    pub fn force_exit(&mut self) -> Result<()> {
        if !self.session.active {
            debug!("sending RC_EXIT outside of a session");
        }
        self.exit()
    }

    fn exit(&mut self) -> Result<()> {
        let exit_timeout = self.session.config.exit_timeout;
        let result = {
            let mut transport = self.transport.override_timeout(exit_timeout);
            send(&mut *transport, &RC_EXIT, &rc_payload(&RC_EXIT, None, None))
        };
        self.session.active = false;
        self.session.transfer_mode = None;
        result.map(|_| ())
    }

    /// Run `rc` with up to two word arguments, returning the full response.
    pub fn command(&mut self, rc: &RcSubcommand, arg1: Option<u32>, arg2: Option<u32>) -> Result<Response> {
        self.require_active(rc.name)?;
        send(self.transport, rc, &rc_payload(rc, arg1, arg2))
    }

    /// Run `rc` with `raw` appended after the sub-command word.
    pub fn command_with_payload(&mut self, rc: &RcSubcommand, raw: &[u8]) -> Result<Response> {
        self.require_active(rc.name)?;
        send(self.transport, rc, &rc_raw_payload(rc, raw))
    }

    /// The transfer mode last set through this session, not read back from
    /// the camera.
    pub fn last_transfer_mode(&self) -> Result<Option<TransferMode>> {
        self.require_active("last_transfer_mode")?;
        Ok(self.session.transfer_mode)
    }

    pub fn set_transfer_mode(&mut self, mode: TransferMode) -> Result<()> {
        self.command(&RC_SET_TRANSFER_MODE, Some(VALUE_WORD_LEN), Some(mode.bits() as u32))?;
        self.session.transfer_mode = Some(mode);
        Ok(())
    }

    pub fn release_params(&mut self) -> Result<ReleaseParams> {
        let response = self.command(&RC_GET_PARAMS, None, None)?;
        let end = REPLY_DATA_OFFSET + ReleaseParams::SIZE;
        let block = response.data.get(REPLY_DATA_OFFSET..end).ok_or(Error::Range {
            offset: REPLY_DATA_OFFSET,
            width: ReleaseParams::SIZE,
            len: response.data.len(),
        })?;
        let params = ReleaseParams::from_slice(block)?;
        debug!("release params from camera: {:?}", params);
        Ok(params)
    }

    /// Write `params` back and return what the camera now reports.
    pub fn set_release_params(&mut self, params: &ReleaseParams) -> Result<ReleaseParams> {
        let mut raw = BytesMut::with_capacity(4 + ReleaseParams::SIZE);
        raw.put_u32_le(ReleaseParams::SIZE as u32);
        raw.put_slice(params.as_bytes());
        self.command_with_payload(&RC_SET_PARAMS, &raw)?;
        self.release_params()
    }

    pub fn zoom(&mut self) -> Result<u32> {
        let response = self.command(&RC_GET_ZOOM_POS, None, None)?;
        le32(&response.data, REPLY_DATA_OFFSET)
    }

    pub fn set_zoom(&mut self, position: u32) -> Result<()> {
        self.command(&RC_SET_ZOOM_POS, Some(VALUE_WORD_LEN), Some(position))?;
        Ok(())
    }

    /// Number of shots that still fit on the card.
    pub fn available_shots(&mut self) -> Result<u32> {
        let response = self.command(&RC_GET_AVAILABLE_SHOT, None, None)?;
        le32(&response.data, REPLY_DATA_OFFSET)
    }

    /// Release the shutter and wait for the camera to report the shot.
    pub fn capture(&mut self) -> Result<CaptureOutcome> {
        self.require_active("capture")?;

        self.transport.start_poller(CAPTURE_INTERRUPT_LEN)?;
        let released = send(
            self.transport,
            &RC_SHUTTER_RELEASE,
            &rc_payload(&RC_SHUTTER_RELEASE, None, None),
        );
        if let Err(err) = released {
            self.transport.stop_poller();
            return Err(err);
        }

        let timeout = self.session.config.capture_timeout;
        let completed = self.transport.wait_for_interrupts(CAPTURE_INTERRUPT_LEN, timeout);
        let received = self.transport.stop_poller().map_or(0, |bytes| bytes.len());

        if completed {
            info!("capture completed");
            Ok(CaptureOutcome::Completed {
                interrupt_bytes: received,
            })
        } else {
            warn!("capture did not complete within {:?}", timeout);
            Ok(CaptureOutcome::TimedOut)
        }
    }
}
