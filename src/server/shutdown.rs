//! Shutdown notification for the event loop.
//!
//! Two sources can stop the loop:
//!
//! - SIGINT/SIGTERM, delivered through a self-pipe whose read end is
//!   registered with the poll, so a signal always turns into readiness.
//!   The pipe can be installed before the poll exists; a signal caught in
//!   between waits in the pipe and is reported when it is attached.
//! - [`ShutdownHandle::shutdown`], which sets a flag and fires a mio waker

use mio::net::UnixStream;
use mio::{Interest, Registry, Token, Waker};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::SigId;
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Cloneable handle that asks a running server to stop.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    pub(crate) fn new(waker: Waker) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            waker: Arc::new(waker),
        }
    }

    /// Requests shutdown and wakes the event loop. Callable from any thread.
    pub fn shutdown(&self) -> io::Result<()> {
        self.request();
        self.waker.wake()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// Marks shutdown from inside the event loop, where no wakeup is needed.
    pub(crate) fn request(&self) {
        self.requested.store(true, Ordering::Release);
    }
}

/// Signal self-pipe.
///
/// Dropping it detaches the signal actions.
pub(crate) struct SignalPipe {
    receiver: UnixStream,
    ids: Vec<SigId>,
}

impl SignalPipe {
    /// Routes SIGINT and SIGTERM into a new pipe.
    pub(crate) fn install() -> io::Result<Self> {
        let (read, write) = std::os::unix::net::UnixStream::pair()?;
        read.set_nonblocking(true)?;
        write.set_nonblocking(true)?;

        let mut ids = Vec::with_capacity(2);
        for signal in [SIGINT, SIGTERM] {
            match signal_hook::low_level::pipe::register(signal, write.try_clone()?) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    for id in ids {
                        signal_hook::low_level::unregister(id);
                    }
                    return Err(e);
                }
            }
        }

        debug!("Signal handlers installed");
        Ok(Self {
            receiver: UnixStream::from_std(read),
            ids,
        })
    }

    /// Registers the read end with the poll under `token`.
    pub(crate) fn attach(&mut self, registry: &Registry, token: Token) -> io::Result<()> {
        registry.register(&mut self.receiver, token, Interest::READABLE)
    }

    /// Consumes pending notifications. Returns true if a signal arrived.
    pub(crate) fn drain(&mut self) -> bool {
        let mut buf = [0u8; 32];
        let mut received = false;
        loop {
            match self.receiver.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => received = true,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        if received {
            info!("Caught interrupt, exiting");
        }
        received
    }

    /// Detaches the signal actions and leaves the poll.
    pub(crate) fn uninstall(&mut self, registry: &Registry) {
        self.detach_signals();
        if let Err(e) = registry.deregister(&mut self.receiver) {
            debug!(error = %e, "Failed to deregister signal pipe");
        }
    }

    fn detach_signals(&mut self) {
        for id in self.ids.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        self.detach_signals();
    }
}
