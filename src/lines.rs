//! Line-at-a-time reading over raw descriptors.
//!
//! [`LineReader`] keeps its own buffer so that the supervisor can tell, without
//! touching the descriptor, whether a full line is already waiting. This
//! matters because readiness polling only ever sees what is still inside the
//! kernel.

use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::time::Duration;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

const CHUNK: usize = 4096;

#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            eof: false,
        }
    }

    /// True when [`take_line`](Self::take_line) would return without reading,
    /// either with a line or because the stream has ended.
    pub fn is_ready(&self) -> bool {
        self.eof || self.buf.contains(&b'\n')
    }

    /// True once the stream has ended and every buffered byte was handed out.
    pub fn at_eof(&self) -> bool {
        self.eof && self.buf.is_empty()
    }

    /// Reads once from the underlying stream, returning the number of bytes
    /// added. Zero means end-of-stream.
    pub fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0; CHUNK];
        let n = loop {
            match self.inner.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };

        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..n]);
        }

        Ok(n)
    }

    /// Pops the next buffered line without its terminator.
    ///
    /// After end-of-stream a trailing unterminated line is returned once.
    pub fn take_line(&mut self) -> Option<String> {
        let bytes = match self.buf.iter().position(|&b| b == b'\n') {
            Some(end) => {
                let mut line: Vec<u8> = self.buf.drain(..=end).collect();
                line.pop();
                line
            }
            None if self.eof && !self.buf.is_empty() => std::mem::take(&mut self.buf),
            None => return None,
        };

        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Blocks until a line is available, or returns `None` at end-of-stream.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            if self.eof {
                return Ok(None);
            }

            self.fill()?;
        }
    }
}

impl<R: AsFd> AsFd for LineReader<R> {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

/// Waits until any of `fds` is readable (or hung up), for at most `timeout`.
///
/// Returns one flag per descriptor, in order. A signal arriving during the
/// wait surfaces as `EINTR`.
pub fn poll_readable(fds: &[BorrowedFd<'_>], timeout: Duration) -> nix::Result<Vec<bool>> {
    let mut pollfds: Vec<PollFd<'_>> = fds
        .iter()
        .map(|fd| PollFd::new(*fd, PollFlags::POLLIN))
        .collect();

    let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
    poll(&mut pollfds, PollTimeout::from(millis))?;

    let ready = PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR;
    Ok(pollfds
        .iter()
        .map(|pfd| pfd.revents().map_or(false, |revents| revents.intersects(ready)))
        .collect())
}
