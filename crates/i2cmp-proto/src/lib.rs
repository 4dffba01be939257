#![no_std]

//! Control-transfer encoding understood by the I2C-MP-USB firmware.
//!
//! Every request is a class request addressed to the device. The firmware
//! reads the semantic action from `bRequest`, the I2C direction from `wValue`
//! and the 7-bit target address from `wIndex`.

use byteorder::{ByteOrder, LittleEndian};

/// USB vendor ID of the adapter.
pub const VENDOR_ID: u16 = 0x0403;
/// USB product ID of the adapter.
pub const PRODUCT_ID: u16 = 0xc631;

/// bmRequestType for host → device class requests.
pub const CLASS_OUT_REQ_TYPE: u8 = 0x20;
/// bmRequestType for device → host class requests.
pub const CLASS_IN_REQ_TYPE: u8 = 0xA0;

/// Base opcode for an I2C data phase.
pub const CMD_I2C_IO: u8 = 4;
/// Flag: this phase opens the bus transaction (START).
pub const CMD_I2C_IO_BEGIN: u8 = 1;
/// Flag: this phase closes the bus transaction (STOP).
pub const CMD_I2C_IO_END: u8 = 2;
/// Fetch the ack status of the last I2C phase.
pub const CMD_GET_STATUS: u8 = 3;
/// Reset the adapter into its bootloader.
pub const CMD_START_BOOTLOADER: u8 = 0x10;
/// Set the I2C clock in kHz.
pub const CMD_SET_BAUDRATE: u8 = 0x11;

/// `wValue` marking an I2C phase as a read.
pub const I2C_M_RD: u16 = 0x01;
/// `wValue` marking an I2C phase as a write.
pub const I2C_M_WR: u16 = 0x00;

/// Unlock value required by [`CMD_START_BOOTLOADER`].
pub const BOOTLOADER_MAGIC: u16 = 0x5237;

/// Status byte reported when the addressed device acknowledged.
pub const STATUS_ACK: u8 = 1;
/// Number of bytes returned by [`CMD_GET_STATUS`].
pub const STATUS_LEN: usize = 1;

/// Highest valid 7-bit I2C address.
pub const MAX_ADDRESS: u8 = 0x7F;

/// Opcode for an I2C phase that starts and/or stops the transaction.
pub const fn io_opcode(begin: bool, end: bool) -> u8 {
    let mut op = CMD_I2C_IO;
    if begin {
        op |= CMD_I2C_IO_BEGIN;
    }
    if end {
        op |= CMD_I2C_IO_END;
    }
    op
}

/// Opcode for the write phase of a transaction. Without a following read
/// phase the write alone completes the transaction.
pub const fn write_phase_opcode(has_read: bool) -> u8 {
    io_opcode(true, !has_read)
}

/// Opcode for the read phase of a transaction. Without a preceding write
/// phase the read alone opens the transaction.
pub const fn read_phase_opcode(has_write: bool) -> u8 {
    io_opcode(!has_write, true)
}

/// Opcode of the zero-length transfer used to probe an address.
pub const PROBE_OPCODE: u8 = io_opcode(true, true);

/// How an address is probed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeStyle {
    /// Zero-length read (IN, `wValue = I2C_M_RD`).
    Read,
    /// Zero-length write (OUT, `wValue = 0`).
    Write,
}

impl ProbeStyle {
    /// `wValue` carried by the probe transfer.
    pub const fn value(self) -> u16 {
        match self {
            ProbeStyle::Read => I2C_M_RD,
            ProbeStyle::Write => I2C_M_WR,
        }
    }
}

/// Pick the probe style the way `i2cdetect` does: EEPROMs (0x50..=0x5F) and
/// the 0x30..=0x37 block can be corrupted by a quick write, so they get a
/// read.
pub const fn probe_style(address: u8) -> ProbeStyle {
    match address {
        0x30..=0x37 | 0x50..=0x5F => ProbeStyle::Read,
        _ => ProbeStyle::Write,
    }
}

/// Outbound buffer of a register word write: `[reg, lo, hi]`.
pub fn encode_word_data(register: u8, value: u16) -> [u8; 3] {
    let mut buf = [register, 0, 0];
    LittleEndian::write_u16(&mut buf[1..], value);
    buf
}

/// Decode a little-endian word read back from a device.
pub fn decode_word(buf: [u8; 2]) -> u16 {
    LittleEndian::read_u16(&buf)
}
