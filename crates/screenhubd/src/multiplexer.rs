//! Readiness multiplexer over client sockets and the listening socket.
//!
//! The watch set is an array of `pollfd` entries built from the client table
//! plus the listener. Each entry is paired with a [`WatchTarget`] tag so the
//! dispatch code never has to infer meaning from positions.
//!
//! The multiplexer never rebuilds on its own. The server rebuilds it only
//! after the client table changed, so a stable topology costs nothing per
//! tick beyond the `poll(2)` call itself.

use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use thiserror::Error;
use tracing::trace;

use screenhub_core::ClientId;

/// Events that mean the socket is broken or gone.
const FAULT_EVENTS: libc::c_short = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;

/// What a watched descriptor belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchTarget {
    Client(ClientId),
    Listener,
}

/// Readiness of one watched descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub target: WatchTarget,
    /// Data (or a pending connection) can be read without blocking.
    pub readable: bool,
    /// Error, hangup, or invalid descriptor.
    pub fault: bool,
}

/// Targets that reported any event in one poll, in watch-set order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessReport {
    ready: Vec<Readiness>,
}

impl ReadinessReport {
    /// True when nothing is ready.
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty()
    }

    /// Client entries only.
    pub fn clients(&self) -> impl Iterator<Item = (ClientId, &Readiness)> {
        self.ready.iter().filter_map(|r| match r.target {
            WatchTarget::Client(id) => Some((id, r)),
            WatchTarget::Listener => None,
        })
    }

    /// The listener entry, if it reported anything.
    pub fn listener(&self) -> Option<&Readiness> {
        self.ready
            .iter()
            .find(|r| r.target == WatchTarget::Listener)
    }
}

/// `poll(2)`-based readiness check over the current watch set.
#[derive(Default)]
pub struct Multiplexer {
    targets: Vec<WatchTarget>,
    fds: Vec<libc::pollfd>,
    rebuilds: u64,
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("targets", &self.targets)
            .field("rebuilds", &self.rebuilds)
            .finish()
    }
}

impl Multiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the watch set with `clients` followed by the listener.
    ///
    /// Every entry watches for read readiness; error and hangup conditions
    /// are always reported by the kernel.
    pub fn rebuild<I>(&mut self, clients: I, listener: RawFd)
    where
        I: IntoIterator<Item = (ClientId, RawFd)>,
    {
        self.targets.clear();
        self.fds.clear();

        for (id, fd) in clients {
            self.push(WatchTarget::Client(id), fd);
        }
        self.push(WatchTarget::Listener, listener);

        self.rebuilds = self.rebuilds.saturating_add(1);
        trace!(watched = self.fds.len(), rebuilds = self.rebuilds, "Watch set rebuilt");
    }

    fn push(&mut self, target: WatchTarget, fd: RawFd) {
        self.targets.push(target);
        self.fds.push(libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        });
    }

    /// Checks every watched descriptor once.
    ///
    /// Use `Duration::ZERO` for a cooperative tick; the call then never
    /// blocks. An interrupted call is reported as an idle report.
    ///
    /// # Errors
    /// `PollError` if `poll(2)` itself fails. There is no way to recover the
    /// multiplexer from that; callers should treat it as fatal.
    pub fn poll(&mut self, timeout: Duration) -> Result<ReadinessReport, PollError> {
        for entry in &mut self.fds {
            entry.revents = 0;
        }

        let timeout_ms = libc::c_int::try_from(timeout.as_millis()).unwrap_or(libc::c_int::MAX);
        let nfds = libc::nfds_t::try_from(self.fds.len()).map_err(|_| PollError::TooManyTargets {
            count: self.fds.len(),
        })?;

        // SAFETY: `fds` is a live, exclusively borrowed buffer of `nfds` pollfd entries.
        let rc = unsafe { libc::poll(self.fds.as_mut_ptr(), nfds, timeout_ms) };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                trace!("poll interrupted");
                return Ok(ReadinessReport::default());
            }
            return Err(PollError::Io(err.to_string()));
        }

        if rc == 0 {
            return Ok(ReadinessReport::default());
        }

        let ready = self
            .targets
            .iter()
            .zip(&self.fds)
            .filter(|(_, entry)| entry.revents != 0)
            .map(|(target, entry)| Readiness {
                target: *target,
                readable: entry.revents & libc::POLLIN != 0,
                fault: entry.revents & FAULT_EVENTS != 0,
            })
            .collect();

        Ok(ReadinessReport { ready })
    }

    /// Targets in watch-set order.
    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    pub fn watched(&self) -> usize {
        self.fds.len()
    }

    /// How many times the watch set has been built.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    /// Drops the watch set and releases its storage.
    pub fn clear(&mut self) {
        self.targets = Vec::new();
        self.fds = Vec::new();
    }
}

/// Errors from the readiness primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("poll failed: {0}")]
    Io(String),

    #[error("watch set too large: {count} descriptors")]
    TooManyTargets { count: usize },
}
