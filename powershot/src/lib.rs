//! Remote control for Canon PowerShot cameras over Canon's vendor USB
//! protocol, the way gphoto2 speaks it to a G3.
//!
//! ```no_run
//! # fn main() -> powershot::Result<()> {
//! let mut camera = powershot::Camera::find()?.expect("no camera attached");
//! camera.initialize(false)?;
//! println!("{:?}", camera.identify()?);
//!
//! let mut remote = camera.remote();
//! remote.start(false)?;
//! remote.capture()?;
//! remote.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod bitfield;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod error;
pub mod params;
pub mod remote;
pub mod storage;
pub mod usb;

use std::io::Write;

use log::{debug, info, warn};
use rusb::{Context, DeviceHandle, UsbContext};

pub use config::{Endpoints, PollerConfig, RemoteConfig, TransportConfig};
pub use error::{Error, Result};
pub use params::{ReleaseParams, TransferMode};
pub use remote::{CaptureOutcome, RemoteControl, Session};
pub use storage::{DirTree, FsAttributes, FsEntry, Storage};
pub use usb::transport::{CamStatus, Response, Transport};
pub use usb::UsbIo;

use catalog::{CAMERA_CHOWN, GET_PIC_ABILITIES, GET_TIME, IDENTIFY_CAMERA, POWER_STATUS, SET_TIME};
use codec::{extract_cstring, le16, le32};
use usb::{open_device, CANON_VENDOR_ID, POWERSHOT_G3_PRODUCT_ID};

/// Longest owner name the camera accepts.
pub const MAX_OWNER_LEN: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub model: String,
    pub owner: String,
    pub firmware: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerStatus {
    /// Raw battery level as reported by the camera.
    pub battery: u8,
    pub on_ac: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PicAbilities {
    pub status: u32,
    pub struct_size: u16,
    pub model_id: u32,
    pub camera_id: String,
}

fn cstring_at(body: &[u8], offset: usize, what: &str) -> Result<String> {
    extract_cstring(body, offset)?.ok_or_else(|| Error::protocol(format!("unterminated {} string", what)))
}

fn byte_at(body: &[u8], offset: usize) -> Result<u8> {
    body.get(offset).copied().ok_or(Error::Range {
        offset,
        width: 1,
        len: body.len(),
    })
}

/// A connected camera.
///
/// Body offsets used below were observed on a G3; other models lay their
/// replies out differently.
pub struct Camera<D: UsbIo> {
    transport: Transport<D>,
    session: Session,
}

impl Camera<DeviceHandle<Context>> {
    /// Open the first G3 attached to this host.
    pub fn find() -> Result<Option<Self>> {
        let mut context = Context::new()?;
        Self::open(&mut context)
    }
}

impl<T: UsbContext + 'static> Camera<DeviceHandle<T>> {
    pub fn open(context: &mut T) -> Result<Option<Self>> {
        Self::open_with(context, TransportConfig::default(), RemoteConfig::default())
    }

    pub fn open_with(context: &mut T, config: TransportConfig, remote: RemoteConfig) -> Result<Option<Self>> {
        match open_device(context, CANON_VENDOR_ID, POWERSHOT_G3_PRODUCT_ID)? {
            Some((_device, _device_desc, mut handle)) => {
                handle.configure()?;
                Ok(Some(Camera::with_config(handle, config, remote)))
            }
            None => Ok(None),
        }
    }
}

impl<D: UsbIo> Camera<D> {
    pub fn new(device: D) -> Self {
        Self::with_config(device, TransportConfig::default(), RemoteConfig::default())
    }

    pub fn with_config(device: D, config: TransportConfig, remote: RemoteConfig) -> Self {
        Self {
            transport: Transport::new(device, config),
            session: Session::new(remote),
        }
    }

    pub fn transport(&mut self) -> &mut Transport<D> {
        &mut self.transport
    }

    pub fn remote(&mut self) -> RemoteControl<'_, D> {
        RemoteControl::new(&mut self.transport, &mut self.session)
    }

    pub fn storage(&mut self) -> Storage<'_, D> {
        Storage::new(&mut self.transport)
    }

    /// Run the wake-up handshake, unless the camera already answers or
    /// `force` is set. `None` means nothing had to be done.
    pub fn initialize(&mut self, force: bool) -> Result<Option<CamStatus>> {
        if !force && self.is_ready() {
            info!("initialize called, but camera seems up, force me");
            return Ok(None);
        }
        info!("camera will be initialized");
        self.transport.init().map(Some)
    }

    /// Whether the camera answers `IDENTIFY_CAMERA`, which has no side
    /// effects on its state.
    pub fn is_ready(&mut self) -> bool {
        match self.transport.command(&IDENTIFY_CAMERA, &[]) {
            Ok(_) => true,
            Err(err) => {
                debug!("camera not ready: {}", err);
                false
            }
        }
    }

    pub fn identify(&mut self) -> Result<Identity> {
        let response = self.transport.command(&IDENTIFY_CAMERA, &[])?;
        let body = &response.data;
        let version = body.get(0x18..0x1c).ok_or(Error::Range {
            offset: 0x18,
            width: 4,
            len: body.len(),
        })?;

        Ok(Identity {
            model: cstring_at(body, 0x1c, "model")?,
            owner: cstring_at(body, 0x3c, "owner")?,
            firmware: itertools::join(version.iter().rev(), "."),
        })
    }

    /// Camera clock, seconds since the epoch in the camera's local time.
    pub fn time(&mut self) -> Result<u32> {
        let response = self.transport.command(&GET_TIME, &[])?;
        le32(&response.data, 0x14)
    }

    /// Set the camera clock and return what it reads afterwards.
    pub fn set_time(&mut self, time: u32) -> Result<u32> {
        let mut payload = time.to_le_bytes().to_vec();
        payload.extend_from_slice(&[0; 8]);
        self.transport.command(&SET_TIME, &payload)?;
        self.time()
    }

    pub fn owner(&mut self) -> Result<String> {
        Ok(self.identify()?.owner)
    }

    pub fn set_owner(&mut self, owner: &str) -> Result<()> {
        if owner.len() > MAX_OWNER_LEN {
            return Err(Error::precondition(format!(
                "owner name is {} bytes, the camera takes at most {}",
                owner.len(),
                MAX_OWNER_LEN
            )));
        }
        let mut payload = owner.as_bytes().to_vec();
        payload.push(0);
        self.transport.command(&CAMERA_CHOWN, &payload)?;
        Ok(())
    }

    pub fn power_status(&mut self) -> Result<PowerStatus> {
        let response = self.transport.command(&POWER_STATUS, &[])?;
        let body = &response.data;
        Ok(PowerStatus {
            battery: byte_at(body, 0x14)?,
            on_ac: byte_at(body, 0x17)? & 0x20 == 0,
        })
    }

    /// True when the camera is not running on battery.
    pub fn on_ac(&mut self) -> Result<bool> {
        Ok(self.power_status()?.on_ac)
    }

    pub fn pic_abilities(&mut self) -> Result<PicAbilities> {
        let response = self.transport.command_full(&GET_PIC_ABILITIES, &[])?;
        let data = &response.data;
        let id_bytes = data.get(0x5a..0x7a).ok_or(Error::Range {
            offset: 0x5a,
            width: 0x20,
            len: data.len(),
        })?;
        let camera_id = extract_cstring(id_bytes, 0)?
            .unwrap_or_else(|| String::from_utf8_lossy(id_bytes).into_owned());

        let abilities = PicAbilities {
            status: le32(data, 0x50)?,
            struct_size: le16(data, 0x54)?,
            model_id: le32(data, 0x56)?,
            camera_id,
        };
        info!("pic abilities: {:?}", abilities);
        Ok(abilities)
    }

    pub fn drive(&mut self) -> Result<String> {
        self.storage().drive()
    }

    pub fn list(&mut self, path: &str, depth: u8) -> Result<DirTree> {
        self.storage().list(path, depth)
    }

    pub fn download<W: Write>(&mut self, path: &str, sink: &mut W, thumbnail: bool) -> Result<u64> {
        self.storage().download(path, sink, thumbnail)
    }
}

impl<D: UsbIo> Drop for Camera<D> {
    fn drop(&mut self) {
        if !self.session.is_active() {
            return;
        }
        info!("leaving remote control before the camera goes away");
        if let Err(err) = self.remote().stop() {
            warn!("remote control exit on drop failed: {}", err);
        }
    }
}
