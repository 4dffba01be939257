//! [`embedded_hal::i2c::I2c`] for an adapter session, so sensor drivers
//! written against embedded-hal run unchanged on the host.

use crate::session::{read_phase, write_phase};
use crate::{ControlTransport, I2cMpError, I2cMpSession};
use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};
use i2cmp_proto::io_opcode;
use std::ops::Range;

impl embedded_hal::i2c::Error for I2cMpError {
    fn kind(&self) -> ErrorKind {
        // Data phases carry no ack status, so a NACK can't be told apart.
        ErrorKind::Other
    }
}

impl<T: ControlTransport> ErrorType for I2cMpSession<T> {
    type Error = I2cMpError;
}

impl<T: ControlTransport> I2c<SevenBitAddress> for I2cMpSession<T> {
    /// Adjacent operations of the same direction are merged into one control
    /// transfer. The first transfer carries BEGIN and the last carries END,
    /// so each direction change becomes a repeated START.
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let (transport, timeout) = self.connected()?;
        let phases = split_phases(operations);
        let last = phases.len().saturating_sub(1);

        for (i, phase) in phases.into_iter().enumerate() {
            let opcode = io_opcode(i == 0, i == last);
            let ops = &mut operations[phase.range];
            match phase.direction {
                Direction::Write => {
                    let mut data = Vec::new();
                    for op in ops.iter() {
                        if let Operation::Write(bytes) = op {
                            data.extend_from_slice(bytes);
                        }
                    }
                    write_phase(transport, address, opcode, &data, timeout)?;
                }
                Direction::Read => {
                    let total: usize = ops
                        .iter()
                        .map(|op| match op {
                            Operation::Read(buf) => buf.len(),
                            Operation::Write(_) => 0,
                        })
                        .sum();
                    let mut data = vec![0u8; total];
                    read_phase(transport, address, opcode, &mut data, timeout)?;
                    let mut offset = 0;
                    for op in ops.iter_mut() {
                        if let Operation::Read(buf) = op {
                            let len = buf.len();
                            buf.copy_from_slice(&data[offset..offset + len]);
                            offset += len;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Write,
    Read,
}

#[derive(Debug, PartialEq, Eq)]
struct Phase {
    direction: Direction,
    range: Range<usize>,
}

fn split_phases(operations: &[Operation<'_>]) -> Vec<Phase> {
    let mut phases: Vec<Phase> = Vec::new();
    for (i, op) in operations.iter().enumerate() {
        let direction = match op {
            Operation::Write(_) => Direction::Write,
            Operation::Read(_) => Direction::Read,
        };
        match phases.last_mut() {
            Some(phase) if phase.direction == direction => phase.range.end = i + 1,
            _ => phases.push(Phase {
                direction,
                range: i..i + 1,
            }),
        }
    }
    phases
}
