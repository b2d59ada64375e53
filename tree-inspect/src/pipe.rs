// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A thread-safe in-process byte pipe.
//!
//! Mimics unix pipe semantics between one producer and one consumer
//! thread: writes append to an internal buffer, [InProcessPipe::read]
//! blocks until enough bytes are available or the pipe is closed, and
//! an empty result means EOF. Handles are cheap clones sharing the
//! same buffer; any handle may close the pipe, and closing twice is
//! fine.

use {
    crate::{Error, Result},
    std::{
        collections::VecDeque,
        sync::{Arc, Condvar, Mutex},
    },
};

#[derive(Default)]
struct PipeState {
    buffer: VecDeque<u8>,
    closed: bool,
    bytes_read: u64,
}

/// A bounded-unbounded byte pipe connecting two threads.
#[derive(Clone, Default)]
pub struct InProcessPipe {
    state: Arc<(Mutex<PipeState>, Condvar)>,
}

impl InProcessPipe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the pipe, waking the reader.
    ///
    /// Writing to a closed pipe is an error.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        let (lock, cond) = &*self.state;
        let mut state = lock.lock().unwrap();

        if state.closed {
            return Err(Error::PipeClosed);
        }

        state.buffer.extend(data);
        cond.notify_all();

        Ok(data.len())
    }

    /// Read exactly `n` bytes, blocking until they are available or the
    /// pipe closes. At EOF fewer bytes (possibly none) are returned.
    pub fn read(&self, n: usize) -> Vec<u8> {
        let (lock, cond) = &*self.state;
        let mut state = lock.lock().unwrap();

        while state.buffer.len() < n && !state.closed {
            state = cond.wait(state).unwrap();
        }

        let take = n.min(state.buffer.len());
        let data = state.buffer.drain(..take).collect::<Vec<_>>();
        state.bytes_read += data.len() as u64;

        data
    }

    /// Read everything until the pipe closes.
    pub fn read_all(&self) -> Vec<u8> {
        let (lock, cond) = &*self.state;
        let mut state = lock.lock().unwrap();

        while !state.closed {
            state = cond.wait(state).unwrap();
        }

        let data = state.buffer.drain(..).collect::<Vec<_>>();
        state.bytes_read += data.len() as u64;

        data
    }

    /// Total bytes consumed so far.
    pub fn tell(&self) -> u64 {
        let (lock, _) = &*self.state;
        lock.lock().unwrap().bytes_read
    }

    /// Signal EOF from the writer side. Idempotent.
    pub fn close(&self) {
        let (lock, cond) = &*self.state;
        let mut state = lock.lock().unwrap();
        state.closed = true;
        cond.notify_all();
    }
}

impl std::io::Read for InProcessPipe {
    /// Blocks until at least one byte is available or the pipe closes.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let (lock, cond) = &*self.state;
        let mut state = lock.lock().unwrap();

        while state.buffer.is_empty() && !state.closed {
            state = cond.wait(state).unwrap();
        }

        let take = buf.len().min(state.buffer.len());
        for (i, b) in state.buffer.drain(..take).enumerate() {
            buf[i] = b;
        }
        state.bytes_read += take as u64;

        Ok(take)
    }
}

impl std::io::Write for InProcessPipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        InProcessPipe::write(self, buf).map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "write to closed pipe")
        })
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
