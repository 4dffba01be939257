pub mod hal;
pub mod session;
pub mod transport;

pub use session::{
    DEFAULT_TIMEOUT, I2cMpError, I2cMpErrorKind, I2cMpResult, I2cMpSession,
};
pub use transport::{
    ControlTransport, DeviceOpener, TransportError, TransportErrorKind, TransportResult,
};

pub use i2cmp_proto as proto;
