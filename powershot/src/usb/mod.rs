pub mod packet;
pub mod poller;
pub mod transport;

use std::time::Duration;

use log::{debug, info};
use rusb::{Device, DeviceDescriptor, DeviceHandle, Direction, Recipient, RequestType, UsbContext};

pub const CANON_VENDOR_ID: u16 = 0x04a9;
pub const POWERSHOT_G3_PRODUCT_ID: u16 = 0x306e;

const CONFIGURATION: u8 = 1;
const INTERFACE: u8 = 0;

const CLEAR_FEATURE: u8 = 0x01;
const ENDPOINT_HALT: u16 = 0x00;

/// The slice of libusb the camera protocol needs.
///
/// Everything except [`configure`](UsbIo::configure) takes `&self` so that
/// the interrupt poller can read its endpoint from another thread while the
/// owner keeps using the control and bulk pipes.
pub trait UsbIo: Send + Sync + 'static {
    /// Select configuration 1 and claim interface 0, altsetting 0.
    /// Must tolerate being called on an already configured device.
    fn configure(&mut self) -> rusb::Result<()>;

    fn clear_halt(&self, endpoint: u8, timeout: Duration) -> rusb::Result<()>;

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize>;

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;

    fn read_interrupt(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;
}

impl<T: UsbContext + 'static> UsbIo for DeviceHandle<T> {
    fn configure(&mut self) -> rusb::Result<()> {
        match self.set_auto_detach_kernel_driver(true) {
            Ok(()) | Err(rusb::Error::NotSupported) => {}
            Err(err) => return Err(err),
        }

        match self.active_configuration() {
            Ok(CONFIGURATION) => debug!("configuration {} already set", CONFIGURATION),
            _ => match self.set_active_configuration(CONFIGURATION) {
                // the kernel refuses to switch while an interface is claimed,
                // which only happens when we are already configured
                Ok(()) | Err(rusb::Error::Busy) => {}
                Err(err) => return Err(err),
            },
        }

        self.claim_interface(INTERFACE)?;
        self.set_alternate_setting(INTERFACE, 0)
    }

    fn clear_halt(&self, endpoint: u8, timeout: Duration) -> rusb::Result<()> {
        let request_type = rusb::request_type(Direction::Out, RequestType::Standard, Recipient::Endpoint);
        DeviceHandle::write_control(
            self,
            request_type,
            CLEAR_FEATURE,
            ENDPOINT_HALT,
            endpoint as u16,
            &[],
            timeout,
        )
        .map(|_| ())
    }

    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::read_control(self, request_type, request, value, index, buf, timeout)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        timeout: Duration,
    ) -> rusb::Result<usize> {
        DeviceHandle::write_control(self, request_type, request, value, index, buf, timeout)
    }

    fn read_bulk(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::read_bulk(self, endpoint, buf, timeout)
    }

    fn read_interrupt(&self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        DeviceHandle::read_interrupt(self, endpoint, buf, timeout)
    }
}

/// Open the first device matching `vid:pid`.
pub fn open_device<T: UsbContext>(
    context: &mut T,
    vid: u16,
    pid: u16,
) -> rusb::Result<Option<(Device<T>, DeviceDescriptor, DeviceHandle<T>)>> {
    for device in context.devices()?.iter() {
        let device_desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };

        if device_desc.vendor_id() == vid && device_desc.product_id() == pid {
            info!(
                "found {:04x}:{:04x} on bus {} address {}",
                vid,
                pid,
                device.bus_number(),
                device.address()
            );
            let handle = device.open()?;
            return Ok(Some((device, device_desc, handle)));
        }
    }

    debug!("no {:04x}:{:04x} attached to this host", vid, pid);
    Ok(None)
}
