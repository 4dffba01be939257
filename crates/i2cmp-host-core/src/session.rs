use crate::{ControlTransport, DeviceOpener, TransportError, TransportErrorKind};
use i2cmp_proto::{
    BOOTLOADER_MAGIC, CLASS_IN_REQ_TYPE, CLASS_OUT_REQ_TYPE, CMD_GET_STATUS,
    CMD_SET_BAUDRATE, CMD_START_BOOTLOADER, I2C_M_RD, I2C_M_WR, PRODUCT_ID, PROBE_OPCODE,
    ProbeStyle, STATUS_ACK, STATUS_LEN, VENDOR_ID, decode_word, encode_word_data,
    probe_style, read_phase_opcode, write_phase_opcode,
};
use std::{fmt, ops::RangeInclusive, time::Duration};
use tracing::{debug, trace};

/// Transfer timeout used until [`I2cMpSession::set_timeout`] is called.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Session error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum I2cMpErrorKind {
    /// The USB subsystem could not be set up or no adapter was found.
    Connection,
    /// An operation was attempted on a disconnected session.
    NotConnected,
    /// A control transfer failed.
    Transport,
}

/// Errors surfaced by [`I2cMpSession`].
#[derive(Clone, Debug)]
pub struct I2cMpError {
    kind: I2cMpErrorKind,
    message: Option<String>,
    transport: Option<TransportErrorKind>,
}

impl I2cMpError {
    pub fn new(kind: I2cMpErrorKind) -> Self {
        Self {
            kind,
            message: None,
            transport: None,
        }
    }

    pub fn with_message(kind: I2cMpErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
            transport: None,
        }
    }

    fn from_transport(kind: I2cMpErrorKind, op: &str, err: TransportError) -> Self {
        Self {
            kind,
            message: Some(format!("{op}: {err}")),
            transport: Some(err.kind()),
        }
    }

    pub fn kind(&self) -> I2cMpErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Underlying transport failure, if the error came from a transfer.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        self.transport
    }
}

impl fmt::Display for I2cMpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{:?}: {}", self.kind, msg),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl std::error::Error for I2cMpError {}

pub type I2cMpResult<T> = Result<T, I2cMpError>;

enum SessionState<T> {
    Disconnected,
    Connected(T),
}

/// A session with one I2C-MP-USB adapter.
///
/// Every operation borrows the session mutably, so the write and read phases
/// of one transaction can never interleave with another transaction.
pub struct I2cMpSession<T> {
    state: SessionState<T>,
    timeout: Duration,
}

impl<T> Default for I2cMpSession<T> {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }
}

impl<T> I2cMpSession<T> {
    /// Create a disconnected session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: SessionState::Disconnected,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Timeout applied to every control transfer issued afterwards.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SessionState::Connected(_))
    }

    /// Use an already opened transport. Any previously held one is closed.
    pub fn attach(&mut self, transport: T) {
        self.state = SessionState::Connected(transport);
    }

    /// Close the adapter handle. Does nothing when already disconnected.
    pub fn disconnect(&mut self) {
        if let SessionState::Connected(transport) =
            std::mem::replace(&mut self.state, SessionState::Disconnected)
        {
            drop(transport);
            debug!("disconnected from I2C-MP-USB");
        }
    }

    /// The open transport plus the timeout to use with it.
    pub(crate) fn connected(&mut self) -> I2cMpResult<(&mut T, Duration)> {
        match &mut self.state {
            SessionState::Connected(transport) => Ok((transport, self.timeout)),
            SessionState::Disconnected => Err(I2cMpError::with_message(
                I2cMpErrorKind::NotConnected,
                "not connected to I2C-MP-USB",
            )),
        }
    }
}

impl<T: ControlTransport> I2cMpSession<T> {
    /// Open the adapter through `opener` using its fixed USB IDs.
    pub fn connect<O>(&mut self, opener: &O) -> I2cMpResult<()>
    where
        O: DeviceOpener<Transport = T>,
    {
        self.connect_to(opener, VENDOR_ID, PRODUCT_ID)
    }

    /// Open an adapter that enumerates with non-default USB IDs.
    pub fn connect_to<O>(&mut self, opener: &O, vendor_id: u16, product_id: u16) -> I2cMpResult<()>
    where
        O: DeviceOpener<Transport = T>,
    {
        self.disconnect();
        let transport = opener.open(vendor_id, product_id).map_err(|err| {
            let op = match err.kind() {
                TransportErrorKind::NotFound => "I2C-MP-USB not found",
                _ => "unable to open I2C-MP-USB",
            };
            I2cMpError::from_transport(I2cMpErrorKind::Connection, op, err)
        })?;
        debug!(vendor_id, product_id, "connected to I2C-MP-USB");
        self.attach(transport);
        Ok(())
    }

    /// Set the I2C clock frequency in kHz.
    pub fn set_baudrate(&mut self, rate_khz: u16) -> I2cMpResult<()> {
        let (transport, timeout) = self.connected()?;
        transport
            .control_out(CLASS_OUT_REQ_TYPE, CMD_SET_BAUDRATE, rate_khz, 0, &[], timeout)
            .map_err(|err| transfer_error("set baudrate failed", err))?;
        debug!(rate_khz, "I2C clock set");
        Ok(())
    }

    /// Run one I2C transaction: write `out`, then read `input.len()` bytes,
    /// under a single START/STOP. Either side may be empty.
    ///
    /// A failed write phase aborts before the read phase. A failed read
    /// phase is reported on its own; the write has already reached the
    /// device by then.
    pub fn transmit(&mut self, address: u8, out: &[u8], input: &mut [u8]) -> I2cMpResult<()> {
        let (transport, timeout) = self.connected()?;

        let skip_write = out.is_empty();
        let skip_read = input.is_empty();

        if !skip_write {
            write_phase(transport, address, write_phase_opcode(!skip_read), out, timeout)?;
        }
        if !skip_read {
            read_phase(transport, address, read_phase_opcode(!skip_write), input, timeout)?;
        }
        Ok(())
    }

    pub fn read_byte(&mut self, address: u8) -> I2cMpResult<u8> {
        let mut buf = [0u8; 1];
        self.transmit(address, &[], &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_byte_data(&mut self, address: u8, register: u8) -> I2cMpResult<u8> {
        let mut buf = [0u8; 1];
        self.transmit(address, &[register], &mut buf)?;
        Ok(buf[0])
    }

    /// Read a little-endian word from `register`.
    pub fn read_word_data(&mut self, address: u8, register: u8) -> I2cMpResult<u16> {
        let mut buf = [0u8; 2];
        self.transmit(address, &[register], &mut buf)?;
        Ok(decode_word(buf))
    }

    pub fn write_byte(&mut self, address: u8, value: u8) -> I2cMpResult<()> {
        self.transmit(address, &[value], &mut [])
    }

    pub fn write_byte_data(&mut self, address: u8, register: u8, value: u8) -> I2cMpResult<()> {
        self.transmit(address, &[register, value], &mut [])
    }

    /// Write `value` little-endian to `register`.
    pub fn write_word_data(&mut self, address: u8, register: u8, value: u16) -> I2cMpResult<()> {
        self.transmit(address, &encode_word_data(register, value), &mut [])
    }

    /// Check whether a device acknowledges `address`.
    ///
    /// Unlike [`transmit`](Self::transmit), only the status transfer is
    /// checked for failure. The zero-length I2C transfer before it is
    /// expected to fail when nothing answers.
    pub fn probe_device(&mut self, address: u8) -> I2cMpResult<bool> {
        let (transport, timeout) = self.connected()?;
        let index = u16::from(address);

        let style = probe_style(address);
        let probe = match style {
            ProbeStyle::Read => transport.control_in(
                CLASS_IN_REQ_TYPE,
                PROBE_OPCODE,
                style.value(),
                index,
                &mut [],
                timeout,
            ),
            ProbeStyle::Write => transport.control_out(
                CLASS_OUT_REQ_TYPE,
                PROBE_OPCODE,
                style.value(),
                index,
                &[],
                timeout,
            ),
        };
        if let Err(err) = probe {
            trace!(address, ?style, %err, "probe transfer failed");
        }

        let mut status = [0u8; STATUS_LEN];
        transport
            .control_in(CLASS_IN_REQ_TYPE, CMD_GET_STATUS, 0, 0, &mut status, timeout)
            .map_err(|err| transfer_error("probe device failed", err))?;
        let present = status[0] == STATUS_ACK;
        trace!(address, ?style, present, "probe");
        Ok(present)
    }

    /// Probe every address in `addresses` and return the ones that answered.
    pub fn scan(&mut self, addresses: RangeInclusive<u8>) -> I2cMpResult<Vec<u8>> {
        let mut found = Vec::new();
        for address in addresses {
            if self.probe_device(address)? {
                found.push(address);
            }
        }
        debug!(count = found.len(), "bus scan complete");
        Ok(found)
    }

    /// Reset the adapter into its bootloader. The device drops off the bus,
    /// so the session should be disconnected afterwards.
    pub fn start_bootloader(&mut self) -> I2cMpResult<()> {
        let (transport, timeout) = self.connected()?;
        transport
            .control_out(
                CLASS_OUT_REQ_TYPE,
                CMD_START_BOOTLOADER,
                BOOTLOADER_MAGIC,
                0,
                &[],
                timeout,
            )
            .map_err(|err| transfer_error("start bootloader failed", err))?;
        debug!("bootloader requested");
        Ok(())
    }
}

pub(crate) fn write_phase<T: ControlTransport>(
    transport: &mut T,
    address: u8,
    opcode: u8,
    data: &[u8],
    timeout: Duration,
) -> I2cMpResult<()> {
    let written = transport
        .control_out(
            CLASS_OUT_REQ_TYPE,
            opcode,
            I2C_M_WR,
            u16::from(address),
            data,
            timeout,
        )
        .map_err(|err| transfer_error("I2C write failed", err))?;
    trace!(address, opcode, bytes = written, "i2c write phase");
    if written != data.len() {
        debug!(address, expected = data.len(), written, "short i2c write");
    }
    Ok(())
}

pub(crate) fn read_phase<T: ControlTransport>(
    transport: &mut T,
    address: u8,
    opcode: u8,
    buf: &mut [u8],
    timeout: Duration,
) -> I2cMpResult<()> {
    let read = transport
        .control_in(
            CLASS_IN_REQ_TYPE,
            opcode,
            I2C_M_RD,
            u16::from(address),
            buf,
            timeout,
        )
        .map_err(|err| transfer_error("I2C read failed", err))?;
    trace!(address, opcode, bytes = read, "i2c read phase");
    if read != buf.len() {
        debug!(address, expected = buf.len(), read, "short i2c read");
    }
    Ok(())
}

fn transfer_error(op: &str, err: TransportError) -> I2cMpError {
    I2cMpError::from_transport(I2cMpErrorKind::Transport, op, err)
}
