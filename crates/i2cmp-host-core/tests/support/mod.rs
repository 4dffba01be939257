#![allow(dead_code)]

use i2cmp_host_core::{ControlTransport, TransportError, TransportErrorKind, TransportResult};
use std::{cell::RefCell, collections::VecDeque, rc::Rc, time::Duration};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dir {
    In,
    Out,
}

/// One control transfer as seen on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub dir: Dir,
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    /// OUT payload, or the requested length worth of zeroes for IN.
    pub data: Vec<u8>,
}

impl Transfer {
    pub fn fields(&self) -> (Dir, u8, u16, u16) {
        (self.dir, self.request, self.value, self.index)
    }
}

pub enum Reply {
    /// Succeed; IN transfers copy these bytes into the caller's buffer.
    Data(Vec<u8>),
    /// Succeed but report only this many bytes moved.
    Count(usize),
    Fail(TransportErrorKind),
}

/// Records every transfer and answers from a script. Unscripted transfers
/// succeed with a full-length zero reply.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    log: Rc<RefCell<Vec<Transfer>>>,
    replies: Rc<RefCell<VecDeque<Reply>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, data: &[u8]) -> &Self {
        self.replies.borrow_mut().push_back(Reply::Data(data.to_vec()));
        self
    }

    pub fn count(&self, bytes: usize) -> &Self {
        self.replies.borrow_mut().push_back(Reply::Count(bytes));
        self
    }

    pub fn fail(&self, kind: TransportErrorKind) -> &Self {
        self.replies.borrow_mut().push_back(Reply::Fail(kind));
        self
    }

    pub fn transfers(&self) -> Vec<Transfer> {
        self.log.borrow().clone()
    }

    fn next_reply(&self) -> Option<Reply> {
        self.replies.borrow_mut().pop_front()
    }
}

impl ControlTransport for RecordingTransport {
    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> TransportResult<usize> {
        self.log.borrow_mut().push(Transfer {
            dir: Dir::In,
            request_type,
            request,
            value,
            index,
            data: vec![0; buf.len()],
        });
        match self.next_reply() {
            Some(Reply::Fail(kind)) => Err(TransportError::with_message(kind, "control-in")),
            Some(Reply::Data(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            Some(Reply::Count(bytes)) => Ok(bytes.min(buf.len())),
            None => {
                buf.fill(0);
                Ok(buf.len())
            }
        }
    }

    fn control_out(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        _timeout: Duration,
    ) -> TransportResult<usize> {
        self.log.borrow_mut().push(Transfer {
            dir: Dir::Out,
            request_type,
            request,
            value,
            index,
            data: data.to_vec(),
        });
        match self.next_reply() {
            Some(Reply::Fail(kind)) => Err(TransportError::with_message(kind, "control-out")),
            Some(Reply::Count(bytes)) => Ok(bytes),
            _ => Ok(data.len()),
        }
    }
}
