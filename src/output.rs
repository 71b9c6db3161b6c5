//! The operator's two streams.
//!
//! Every write is flushed immediately, and write failures (a closed terminal,
//! a reader that went away) are logged and otherwise ignored so that they can
//! never take the supervisor down.

use std::fmt;
use std::io::{self, Stderr, Stdout, Write};

pub struct Output<O, E> {
    out: O,
    err: E,
}

impl Output<Stdout, Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> Output<O, E> {
    pub const fn new(out: O, err: E) -> Self {
        Self { out, err }
    }

    /// Writes one line to the output stream.
    pub fn line(&mut self, args: fmt::Arguments) {
        if let Err(err) = write_line(&mut self.out, args) {
            debug!("dropped output line: {}", err);
        }
    }

    /// Writes one line to the diagnostic stream.
    pub fn diag(&mut self, args: fmt::Arguments) {
        if let Err(err) = write_line(&mut self.err, args) {
            debug!("dropped diagnostic line: {}", err);
        }
    }

    pub fn into_inner(self) -> (O, E) {
        (self.out, self.err)
    }
}

fn write_line<W: Write>(w: &mut W, args: fmt::Arguments) -> io::Result<()> {
    w.write_fmt(args)?;
    w.write_all(b"\n")?;
    w.flush()
}
