use i2cmp_host_core::{
    ControlTransport, DeviceOpener, I2cMpResult, I2cMpSession, TransportError,
    TransportErrorKind, TransportResult, DEFAULT_TIMEOUT,
};
use i2cmp_proto::{PRODUCT_ID, VENDOR_ID};
use rusb::{Context, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, trace};

/// [`ControlTransport`] backed by a `rusb` device handle.
///
/// The adapter only uses the default control pipe, so no interface is
/// claimed. Dropping the transport closes the handle.
pub struct RusbControl {
    handle: DeviceHandle<Context>,
}

impl RusbControl {
    pub fn new(handle: DeviceHandle<Context>) -> Self {
        Self { handle }
    }
}

impl ControlTransport for RusbControl {
    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransportResult<usize> {
        trace!(request, value, index, bytes = buf.len(), "control-in");
        self.handle
            .read_control(request_type, request, value, index, buf, timeout)
            .map_err(|err| {
                debug!(request, value, index, %err, "control-in failed");
                map_rusb_error("control-in", err)
            })
    }

    fn control_out(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> TransportResult<usize> {
        trace!(request, value, index, bytes = data.len(), "control-out");
        self.handle
            .write_control(request_type, request, value, index, data, timeout)
            .map_err(|err| {
                debug!(request, value, index, %err, "control-out failed");
                map_rusb_error("control-out", err)
            })
    }
}

/// Opens the first attached device with matching USB IDs on a fresh libusb
/// context. The IDs come from [`I2cMpSession::connect`] (the adapter's own)
/// or [`I2cMpSession::connect_to`].
#[derive(Clone, Copy, Debug, Default)]
pub struct RusbOpener;

impl DeviceOpener for RusbOpener {
    type Transport = RusbControl;

    fn open(&self, vendor_id: u16, product_id: u16) -> TransportResult<RusbControl> {
        let context = Context::new().map_err(|err| map_rusb_error("init libusb context", err))?;
        let handle = context
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or_else(|| {
                TransportError::with_message(
                    TransportErrorKind::NotFound,
                    format!("device {vendor_id:04x}:{product_id:04x} not found"),
                )
            })?;
        Ok(RusbControl::new(handle))
    }
}

/// Connect to the first attached I2C-MP-USB adapter.
pub fn connect() -> I2cMpResult<I2cMpSession<RusbControl>> {
    connect_with(VENDOR_ID, PRODUCT_ID, DEFAULT_TIMEOUT)
}

/// Connect to the first attached device with the given USB IDs, using
/// `timeout` for every control transfer.
pub fn connect_with(
    vendor_id: u16,
    product_id: u16,
    timeout: Duration,
) -> I2cMpResult<I2cMpSession<RusbControl>> {
    let mut session = I2cMpSession::with_timeout(timeout);
    session.connect_to(&RusbOpener, vendor_id, product_id)?;
    Ok(session)
}

/// An attached adapter as seen during enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdapterInfo {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Enumerate attached devices with the given USB IDs.
pub fn list_adapters(vendor_id: u16, product_id: u16) -> TransportResult<Vec<AdapterInfo>> {
    let context = Context::new().map_err(|err| map_rusb_error("init libusb context", err))?;
    let devices = context
        .devices()
        .map_err(|err| map_rusb_error("list devices", err))?;

    let mut adapters = Vec::new();
    for device in devices.iter() {
        let desc = match device.device_descriptor() {
            Ok(desc) => desc,
            Err(err) => {
                debug!(
                    bus = device.bus_number(),
                    address = device.address(),
                    %err,
                    "skipping device without descriptor"
                );
                continue;
            }
        };
        if desc.vendor_id() != vendor_id || desc.product_id() != product_id {
            continue;
        }
        adapters.push(AdapterInfo {
            bus: device.bus_number(),
            address: device.address(),
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
        });
    }
    Ok(adapters)
}

fn map_rusb_error(op: &str, err: rusb::Error) -> TransportError {
    let kind = match err {
        rusb::Error::Timeout => TransportErrorKind::Timeout,
        rusb::Error::NoDevice => TransportErrorKind::Disconnected,
        rusb::Error::Pipe | rusb::Error::Overflow => TransportErrorKind::Protocol,
        rusb::Error::NotFound => TransportErrorKind::NotFound,
        rusb::Error::NotSupported => TransportErrorKind::Unsupported,
        _ => TransportErrorKind::Other,
    };
    TransportError::with_message(kind, format!("{op}: {err}"))
}
