use std::{fmt, time::Duration};

/// Transport error categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Disconnected,
    /// Request stalled or the device returned more than asked for.
    Protocol,
    NotFound,
    Unsupported,
    Other,
}

/// Error reported by a [`ControlTransport`] or [`DeviceOpener`].
#[derive(Clone, Debug)]
pub struct TransportError {
    kind: TransportErrorKind,
    message: Option<String>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    pub fn with_message(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: Some(message.into()),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{:?}: {}", self.kind, msg),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl std::error::Error for TransportError {}

pub type TransportResult<T> = Result<T, TransportError>;

/// Blocking USB control transfers on the default pipe of one open device.
///
/// Implementations own the device handle; dropping the transport closes it.
/// Any failure (timeout, stall, unplug) is reported as `Err`, there is no
/// separate "negative byte count" channel.
pub trait ControlTransport {
    /// Device → host transfer. Returns the number of bytes written into `buf`.
    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        timeout: Duration,
    ) -> TransportResult<usize>;

    /// Host → device transfer. Returns the number of bytes sent.
    fn control_out(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> TransportResult<usize>;
}

/// Locates and opens an adapter by USB vendor/product ID.
pub trait DeviceOpener {
    type Transport: ControlTransport;

    fn open(&self, vendor_id: u16, product_id: u16) -> TransportResult<Self::Transport>;
}
