#![allow(unsafe_code)]

//! Interrupts received by the supervisor itself.
//!
//! Handlers only ever store to atomics. Whatever an interrupt asks for is done
//! by the supervisor loop once it notices the flag.
//!
//! - `SIGHUP` requests a status report.
//! - `SIGINT` is acknowledged and otherwise has no effect.
//! - `SIGPIPE` is caught and ignored; the failed write reports `EPIPE` instead.
//!
//! Caught signals go back to their default disposition across exec, so jobs
//! are not affected by any of this.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::Result;

static STATUS_REQUESTED: AtomicBool = AtomicBool::new(false);
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_hangup(_: c_int) {
    STATUS_REQUESTED.store(true, Ordering::SeqCst);
}

extern "C" fn on_interrupt(_: c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

extern "C" fn on_broken_pipe(_: c_int) {}

/// Installs the supervisor's handlers.
pub fn install() -> Result<()> {
    let handlers: [(Signal, extern "C" fn(c_int)); 3] = [
        (Signal::SIGHUP, on_hangup),
        (Signal::SIGINT, on_interrupt),
        (Signal::SIGPIPE, on_broken_pipe),
    ];

    for (signal, handler) in handlers {
        let action = SigAction::new(
            SigHandler::Handler(handler),
            SaFlags::SA_RESTART,
            SigSet::empty(),
        );
        // SAFETY: the handlers only touch atomics.
        unsafe { sigaction(signal, &action) }?;
        debug!("installed handler for {:?}", signal);
    }

    Ok(())
}

/// Returns whether a status report was requested since the last call.
pub fn take_status_request() -> bool {
    STATUS_REQUESTED.swap(false, Ordering::SeqCst)
}

/// Returns whether an interrupt arrived since the last call.
pub fn take_interrupt() -> bool {
    INTERRUPTED.swap(false, Ordering::SeqCst)
}

/// Held by tests that raise signals or consume the flags.
#[cfg(test)]
pub(crate) fn exclusive() -> std::sync::MutexGuard<'static, ()> {
    static FLAGS: std::sync::Mutex<()> = std::sync::Mutex::new(());
    FLAGS.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
