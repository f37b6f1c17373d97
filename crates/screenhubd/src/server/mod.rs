//! Lifecycle controller for the screen server.
//!
//! The server:
//! - Opens a loopback listening endpoint on `init`
//! - Services all sockets once per `tick`, never blocking the caller
//! - Accepts UI clients, greets them, reads their messages, evicts them
//!   on hangup or error
//! - Tears everything down on `shutdown`
//!
//! # State machine
//!
//! ```text
//! ┌───────────────┐  init ok  ┌─────────┐ shutdown ┌──────────────┐       ┌─────────┐
//! │ Uninitialized │──────────▶│ Running │─────────▶│ ShuttingDown │──────▶│ Stopped │
//! └───────┬───────┘           └─────────┘          └──────────────┘       └─────────┘
//!         │ shutdown                                                           ▲
//!         └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Per-client failures evict that client and the tick carries on
//! - Only a broken readiness primitive or listener surfaces as a fatal error

mod connection;

pub use connection::{Connection, ReadError};

use std::fmt;
use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::time::Duration;

use tokio_util::bytes::Bytes;
use tracing::{debug, error, info, trace, warn};

use screenhub_core::{CanvasId, ClientId};
use screenhub_protocol::{ClientMessage, FramingError};

use crate::clients::ClientTable;
use crate::config::{ConfigError, ServerConfig};
use crate::listener::{AcceptError, BindError, ListeningEndpoint};
use crate::multiplexer::{Multiplexer, PollError, Readiness, WatchTarget};
use crate::registry::{RegistryError, ScreenRegistry};

/// Lifecycle state of a [`UiServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting down"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Whether the watch set was rebuilt before polling.
    pub rebuilt: bool,

    /// Clients accepted this tick.
    pub accepted: Vec<ClientId>,

    /// Clients evicted this tick.
    pub evicted: Vec<ClientId>,

    /// Messages read this tick, in read order.
    pub messages: Vec<(ClientId, ClientMessage)>,
}

impl TickOutcome {
    /// True when the tick accepted, evicted and read nothing.
    pub fn is_idle(&self) -> bool {
        self.accepted.is_empty() && self.evicted.is_empty() && self.messages.is_empty()
    }
}

/// Screen server embedded in the emulation loop.
///
/// Single-threaded: every operation takes `&mut self`, so a tick can never
/// overlap another tick or a shutdown.
#[derive(Debug)]
pub struct UiServer {
    config: ServerConfig,
    state: ServerState,
    listener: Option<ListeningEndpoint>,
    clients: ClientTable,
    screens: ScreenRegistry,
    multiplexer: Multiplexer,

    /// Set when something other than client membership invalidates the
    /// watch set (init, screen registration).
    watch_stale: bool,

    /// Bytes sent to each accepted client.
    greeting: Bytes,
}

impl UiServer {
    /// Creates a server; nothing is bound until [`init`](Self::init).
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: ServerState::Uninitialized,
            listener: None,
            clients: ClientTable::new(),
            screens: ScreenRegistry::new(),
            multiplexer: Multiplexer::new(),
            watch_stale: true,
            greeting: Bytes::new(),
        }
    }

    /// Creates a server with the default configuration (`127.0.0.1:0`).
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Binds the listening endpoint and starts serving.
    ///
    /// Returns the bound address; its port is what UI clients must be told.
    /// On failure the server stays `Uninitialized` and the caller decides
    /// whether to carry on without it.
    pub fn init(&mut self) -> Result<SocketAddr, ServerError> {
        if self.state != ServerState::Uninitialized {
            return Err(ServerError::InvalidState {
                operation: "init",
                state: self.state,
            });
        }

        self.config.validate()?;
        let greeting = self
            .config
            .wire_format
            .greeting(self.config.max_frame_length)?;

        let endpoint = ListeningEndpoint::open(self.config.bind_address, self.config.port)
            .map_err(|e| {
                error!(error = %e, "UI server failed to bind");
                e
            })?;
        let address = endpoint.local_addr();

        self.listener = Some(endpoint);
        self.greeting = greeting;
        self.watch_stale = true;
        self.state = ServerState::Running;

        info!(
            address = %address,
            port = address.port(),
            wire_format = %self.config.wire_format,
            "UI server listening"
        );
        Ok(address)
    }

    /// Makes a screen available to UI clients.
    ///
    /// Allowed before and after `init`, but not once shutdown has begun.
    /// A duplicate canvas is rejected and leaves the registry unchanged.
    pub fn add_screen(&mut self, canvas: CanvasId, name: &str) -> Result<(), ServerError> {
        match self.state {
            ServerState::Uninitialized | ServerState::Running => {}
            state => {
                warn!(canvas = %canvas, name = %name, state = %state, "Screen added after shutdown");
                return Err(ServerError::InvalidState {
                    operation: "add_screen",
                    state,
                });
            }
        }

        self.screens.register(canvas, name)?;
        self.watch_stale = true;
        Ok(())
    }

    /// Services every socket once without blocking.
    ///
    /// Does nothing unless the server is `Running`. Per-client problems are
    /// handled inside the tick (the client is evicted); an `Err` is always
    /// fatal for the server, see [`ServerError::is_fatal`].
    pub fn tick(&mut self) -> Result<TickOutcome, ServerError> {
        let mut outcome = TickOutcome::default();

        if self.state != ServerState::Running {
            trace!(state = %self.state, "Tick skipped");
            return Ok(outcome);
        }

        let Some(listener_fd) = self.listener.as_ref().and_then(ListeningEndpoint::raw_fd) else {
            error!("UI server running without a listening socket");
            return Err(ServerError::ListenerFault);
        };

        let membership_changed = self.clients.take_stale();
        let other_change = std::mem::take(&mut self.watch_stale);
        if membership_changed || other_change {
            self.multiplexer.rebuild(
                self.clients.iter().map(|c| (c.id(), c.as_raw_fd())),
                listener_fd,
            );
            outcome.rebuilt = true;
        }

        let report = self.multiplexer.poll(Duration::ZERO).map_err(|e| {
            error!(error = %e, "UI server poll error");
            ServerError::Poll(e)
        })?;

        if report.is_idle() {
            return Ok(outcome);
        }

        // Client IO first, then new connections.
        for (id, readiness) in report.clients() {
            self.service_client(id, readiness, &mut outcome);
        }

        if let Some(readiness) = report.listener() {
            if readiness.fault {
                error!("UI server socket error");
                return Err(ServerError::ListenerFault);
            }
            if readiness.readable {
                self.accept_client(&mut outcome);
            }
        }

        Ok(outcome)
    }

    fn service_client(&mut self, id: ClientId, readiness: &Readiness, outcome: &mut TickOutcome) {
        if readiness.fault {
            info!(client_id = %id, "Socket error on client");
            self.evict(id, outcome);
            return;
        }

        if !readiness.readable {
            return;
        }

        let Some(client) = self.clients.get_mut(id) else {
            return;
        };

        match client.connection_mut().read_messages() {
            Ok(messages) => {
                for message in messages {
                    info!(client_id = %id, message = %message, "Client says");
                    outcome.messages.push((id, message));
                }
            }
            Err(ReadError::Eof) => {
                info!(client_id = %id, "Client disconnected");
                self.evict(id, outcome);
            }
            Err(e) => {
                warn!(client_id = %id, error = %e, "Dropping client after read failure");
                self.evict(id, outcome);
            }
        }
    }

    fn accept_client(&mut self, outcome: &mut TickOutcome) {
        let Some(listener) = self.listener.as_ref() else {
            return;
        };

        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(AcceptError::WouldBlock) => {
                debug!("Listener readable but no connection pending");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to accept connection");
                return;
            }
        };

        let connection = Connection::new(
            stream,
            peer,
            self.config.wire_format,
            self.config.max_frame_length,
        );
        let id = match self.clients.add(connection) {
            Ok(id) => id,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Refusing connection");
                return;
            }
        };
        outcome.accepted.push(id);
        info!(client_id = %id, peer = %peer, clients = self.clients.count(), "New client connected");

        let sent = match self.clients.get_mut(id) {
            Some(client) => client.connection_mut().send(&self.greeting),
            None => Ok(()),
        };
        if let Err(e) = sent {
            warn!(client_id = %id, error = %e, "Failed to greet client");
            self.evict(id, outcome);
        }
    }

    fn evict(&mut self, id: ClientId, outcome: &mut TickOutcome) {
        if self.clients.remove(id) {
            outcome.evicted.push(id);
        }
    }

    /// Closes every client and the listener and releases all storage.
    ///
    /// Safe to call repeatedly; calls after the first do nothing.
    pub fn shutdown(&mut self) {
        if matches!(self.state, ServerState::ShuttingDown | ServerState::Stopped) {
            debug!(state = %self.state, "Shutdown already done");
            return;
        }

        self.state = ServerState::ShuttingDown;
        info!(clients = self.clients.count(), "UI server shutting down");

        let closed = self.clients.clear_all();
        if let Some(mut listener) = self.listener.take() {
            listener.close();
        }
        self.multiplexer.clear();
        self.screens.clear();
        self.greeting = Bytes::new();

        self.state = ServerState::Stopped;
        info!(closed_clients = closed, "UI server stopped");
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bound address, while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(ListeningEndpoint::local_addr)
    }

    /// Bound port, while listening.
    pub fn port(&self) -> Option<u16> {
        self.local_addr().map(|a| a.port())
    }

    pub fn clients(&self) -> &ClientTable {
        &self.clients
    }

    pub fn screens(&self) -> &ScreenRegistry {
        &self.screens
    }

    /// How many times the watch set has been rebuilt.
    pub fn watch_rebuilds(&self) -> u64 {
        self.multiplexer.rebuild_count()
    }

    /// Whether the next tick will rebuild the watch set.
    pub fn watch_set_stale(&self) -> bool {
        self.watch_stale || self.clients.is_stale()
    }

    /// Targets in the current watch set.
    pub fn watch_targets(&self) -> &[WatchTarget] {
        self.multiplexer.targets()
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to open listening socket: {0}")]
    Bind(#[from] BindError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build greeting: {0}")]
    Framing(#[from] FramingError),

    #[error("Screen registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Readiness poll failed: {0}")]
    Poll(#[from] PollError),

    #[error("Listening socket reported an error")]
    ListenerFault,

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ServerState,
    },
}

impl ServerError {
    /// Whether the server can no longer make progress.
    ///
    /// Fatal errors come from `tick`; the host is expected to shut the
    /// server down and exit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Poll(_) | Self::ListenerFault)
    }
}
