//! Process-wide "interrupted" flag, raised by termination signals.
//!
//! The flag is only consulted at the top of [`Backend::next_event()`], so an
//! in-flight exchange with the stub always runs to completion.
//!
//! [`Backend::next_event()`]: crate::backend::Backend::next_event

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tracing::debug;

use crate::error::Result;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Signals that ask the tracer to stop.
pub const SIGNALS: &[Signal] = &[
    Signal::SIGINT,
    Signal::SIGHUP,
    Signal::SIGQUIT,
    Signal::SIGPIPE,
    Signal::SIGTERM,
];

extern "C" fn on_signal(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Install the flag-raising handler for each of [`SIGNALS`].
pub fn install_handlers() -> Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(on_signal),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for sig in SIGNALS {
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
        unsafe { signal::sigaction(*sig, &action)? };
        debug!(signal = %sig, "installed interrupt handler");
    }

    Ok(())
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Raise the flag as if a termination signal had arrived.
pub fn interrupt() {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

pub fn reset() {
    INTERRUPTED.store(false, Ordering::SeqCst);
}
