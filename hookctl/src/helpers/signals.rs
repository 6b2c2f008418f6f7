/// # Signals
///
/// Provides the shutdown flag shared between the termination signal handlers
/// and the polling loop.
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Result;
use signal_hook::consts::{SIGINT, SIGTERM};

/// Signals requesting a graceful termination.
pub(crate) const SHUTDOWN_SIGNALS: [i32; 2] = [SIGINT, SIGTERM];

#[derive(Clone)]
pub(crate) struct Running {
    // Set to true once termination was requested.
    condition: Arc<AtomicBool>,
}

impl Running {
    // Create a new Running instance, stopping upon receiving one of the
    // shutdown signals.
    //
    // The handlers only perform an atomic store on the shared condition, which
    // is the only thing that can be done safely in a signal context.
    pub(crate) fn new() -> Result<Running> {
        let run = Self::ignore_signals();

        for sig in SHUTDOWN_SIGNALS {
            signal_hook::flag::register(sig, Arc::clone(&run.condition))?;
        }

        Ok(run)
    }

    // Same as `new()` but without handling termination signals. Termination
    // *must* be manually handled here.
    pub(crate) fn ignore_signals() -> Running {
        Self {
            condition: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn running(&self) -> bool {
        !self.condition.load(Ordering::Relaxed)
    }

    pub(crate) fn terminate(&self) {
        self.condition.store(true, Ordering::Relaxed);
    }
}
