//! Process-exit cleanup on termination signals.
//!
//! A dedicated thread waits for SIGINT, SIGTERM or SIGHUP, runs the manager's
//! synchronous emergency cleanup and exits with `128 + signal`.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::warn;

use crate::io::multiplexer::Multiplexer;
use crate::manager::PaneManager;

/// Signals that trigger emergency cleanup.
pub const TERMINATION_SIGNALS: [i32; 3] = [SIGINT, SIGTERM, SIGHUP];

/// Keeps the signal thread alive; dropping it unregisters the handlers.
#[derive(Debug)]
pub struct SignalGuard {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalGuard {
    pub fn install<M: Multiplexer + 'static>(manager: Arc<PaneManager<M>>) -> io::Result<Self> {
        let mut signals = Signals::new(TERMINATION_SIGNALS)?;
        let handle = signals.handle();
        let thread = std::thread::spawn(move || {
            if let Some(signal) = signals.forever().next() {
                warn!(signal, "termination signal received, closing agent panes");
                let closed = manager.cleanup_sync();
                warn!(closed, "emergency cleanup finished");
                std::process::exit(exit_code_for(signal));
            }
        });
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            warn!("signal thread panicked");
        }
    }
}

/// Conventional shell exit status for death by `signal`.
pub fn exit_code_for(signal: i32) -> i32 {
    128 + signal
}
