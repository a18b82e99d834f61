use crate::prelude::MAX_READ_DATA;
use std::io::{self, ErrorKind, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    LevelTriggered,
    EdgeTriggered,
}

#[derive(Debug)]
pub enum ReadResult {
    /// At least one byte was read; the buffer grew by this many bytes.
    Progress(usize),
    /// Drained until `EAGAIN`/`EWOULDBLOCK` without reading anything new.
    WouldBlock,
    /// Peer performed an orderly close (`recv` returned 0).
    Closed,
    /// `ECONNRESET`: treated like any other terminal error by the caller,
    /// but never logged above debug.
    Reset,
    /// Any other I/O error.
    Error(io::Error),
    /// The buffer is full and cannot accept more bytes without being retired.
    Overflow,
}

/// Fixed-capacity byte region with a single write cursor. Bytes are retired
/// from the front via `retrieve`, which compacts with one `copy_within`.
pub struct InputBuffer {
    data: Vec<u8>,
    write_index: usize,
    capacity: usize,
}

impl InputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { data: vec![0u8; capacity], write_index: 0, capacity }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(MAX_READ_DATA)
    }

    pub fn readable(&self) -> &[u8] {
        &self.data[..self.write_index]
    }

    pub fn readable_len(&self) -> usize {
        self.write_index
    }

    pub fn writable_len(&self) -> usize {
        self.capacity - self.write_index
    }

    fn writable_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.write_index..self.capacity]
    }

    fn advance_write(&mut self, n: usize) {
        self.write_index = (self.write_index + n).min(self.capacity);
    }

    /// Drops `n` bytes from the front, compacting the remainder forward.
    pub fn retrieve(&mut self, n: usize) {
        let n = n.min(self.write_index);
        if n == 0 {
            return;
        }
        let remaining = self.write_index - n;
        self.data.copy_within(n..self.write_index, 0);
        self.write_index = remaining;
    }

    pub fn clear(&mut self) {
        self.write_index = 0;
    }

    /// Reads from `src` into the free region of the buffer.
    /// `LevelTriggered` performs exactly one `read`; `EdgeTriggered` loops
    /// until `WouldBlock`, since edge-triggered readiness only fires once
    /// per state transition and every byte must be drained before re-arming.
    pub fn read_from<R: Read>(&mut self, src: &mut R, mode: TriggerMode) -> ReadResult {
        let mut total = 0usize;
        loop {
            if self.writable_len() == 0 {
                return if total > 0 { ReadResult::Progress(total) } else { ReadResult::Overflow };
            }

            match src.read(self.writable_mut()) {
                Ok(0) => {
                    return if total > 0 { ReadResult::Progress(total) } else { ReadResult::Closed };
                }
                Ok(n) => {
                    self.advance_write(n);
                    total += n;
                    if mode == TriggerMode::LevelTriggered {
                        return ReadResult::Progress(total);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return if total > 0 { ReadResult::Progress(total) } else { ReadResult::WouldBlock };
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    return if total > 0 { ReadResult::Progress(total) } else { ReadResult::Reset };
                }
                Err(e) => return ReadResult::Error(e),
            }
        }
    }
}
