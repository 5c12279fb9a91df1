// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Makes an operator interrupt visible to the blocking waits of the client.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::exception::{ClientException, ClientResult};

static SIGNAL_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signal: libc::c_int) {
    SIGNAL_RECEIVED.store(true, Ordering::SeqCst);
}

/// Shared flag which is raised when the current run should stop waiting.
///
/// Clones observe the same flag. A flag created with [`InterruptFlag::from_signals`]
/// is additionally raised by SIGINT and SIGTERM.
#[derive(Clone, Debug, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
    follows_signals: bool,
}

impl InterruptFlag {
    /// Creates a flag which is only raised through [`raise`](Self::raise).
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs handlers for SIGINT and SIGTERM and returns a flag following them.
    /// # Errors
    /// * [`ConfigException`](`crate::exception::ClientException::ConfigException`) if the handlers cannot be installed.
    pub fn from_signals() -> ClientResult<Self> {
        let action = SigAction::new(
            SigHandler::Handler(on_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for signal in [Signal::SIGINT, Signal::SIGTERM] {
            // on_signal only stores into an atomic.
            unsafe { sigaction(signal, &action) }.map_err(|e| {
                ClientException::ConfigException {
                    message: format!("could not install handler for {:?}: {}", signal, e),
                }
            })?;
        }
        Ok(InterruptFlag {
            raised: Arc::new(AtomicBool::new(false)),
            follows_signals: true,
        })
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
            || (self.follows_signals && SIGNAL_RECEIVED.load(Ordering::SeqCst))
    }

    /// Returns [`Interrupted`](`crate::exception::ClientException::Interrupted`) once the flag is raised.
    pub fn check(&self) -> ClientResult<()> {
        match self.is_raised() {
            true => Err(ClientException::Interrupted),
            false => Ok(()),
        }
    }
}
