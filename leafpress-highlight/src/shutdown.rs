//! Termination signal handling.

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Interrupt,
    Terminate,
    Hangup,
}

impl Termination {
    fn raw(self) -> libc::c_int {
        match self {
            Termination::Interrupt => libc::SIGINT,
            Termination::Terminate => libc::SIGTERM,
            Termination::Hangup => libc::SIGHUP,
        }
    }
}

/// Listeners for SIGINT, SIGTERM and SIGHUP.
///
/// Install before creating the socket so that no signal can arrive while the
/// socket exists but nobody would remove it.
pub struct TerminationSignals {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
}

impl TerminationSignals {
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    pub async fn recv(&mut self) -> Termination {
        tokio::select! {
            _ = self.interrupt.recv() => Termination::Interrupt,
            _ = self.terminate.recv() => Termination::Terminate,
            _ = self.hangup.recv() => Termination::Hangup,
        }
    }
}

/// Restore the default disposition for `sig` and deliver it to ourselves, so
/// the parent sees the process die from the original signal.
pub fn reraise(sig: Termination) -> ! {
    let raw = sig.raw();
    // SAFETY: resetting a disposition to SIG_DFL and raising a signal have no
    // memory-safety preconditions.
    unsafe {
        libc::signal(raw, libc::SIG_DFL);
        libc::raise(raw);
    }
    std::process::exit(128 + raw)
}
