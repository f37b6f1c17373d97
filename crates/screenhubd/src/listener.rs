//! Loopback listening endpoint.
//!
//! Binds `127.0.0.1` (or another loopback address) and lets the OS pick the
//! port unless one is configured, so several emulator instances can run side
//! by side. The bound port is what gets handed to UI client processes.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use thiserror::Error;
use tracing::debug;

/// The listening socket UI clients connect to.
#[derive(Debug)]
pub struct ListeningEndpoint {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
}

impl ListeningEndpoint {
    /// Binds a non-blocking listener on `address:port`.
    ///
    /// Port 0 asks the OS for an ephemeral port; read it back with
    /// [`port`](Self::port).
    ///
    /// # Errors
    /// - `BindError::NotLoopback` if `address` is not a loopback address
    /// - `BindError::Io` if the OS refuses the bind
    pub fn open(address: Ipv4Addr, port: u16) -> Result<Self, BindError> {
        if !address.is_loopback() {
            return Err(BindError::NotLoopback { address });
        }

        let requested = SocketAddrV4::new(address, port);
        let io_err = |e: io::Error| BindError::Io {
            address: requested,
            error: e.to_string(),
        };

        let listener = TcpListener::bind(requested).map_err(io_err)?;
        listener.set_nonblocking(true).map_err(io_err)?;
        let local_addr = listener.local_addr().map_err(io_err)?;

        debug!(address = %local_addr, "Listening endpoint bound");

        Ok(Self {
            listener: Some(listener),
            local_addr,
        })
    }

    /// Accepts one pending connection.
    ///
    /// Meant to be called after the multiplexer reported the listener
    /// readable. The accepted stream is switched to non-blocking mode.
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr), AcceptError> {
        let listener = self.listener.as_ref().ok_or(AcceptError::Closed)?;

        let (stream, peer) = listener.accept().map_err(|e| {
            if e.kind() == io::ErrorKind::WouldBlock {
                AcceptError::WouldBlock
            } else {
                AcceptError::Io(e.to_string())
            }
        })?;

        stream
            .set_nonblocking(true)
            .map_err(|e| AcceptError::Io(e.to_string()))?;

        Ok((stream, peer))
    }

    /// Releases the listening socket. Returns whether it was still open.
    pub fn close(&mut self) -> bool {
        match self.listener.take() {
            Some(listener) => {
                debug!(address = %self.local_addr, "Listening endpoint closed");
                drop(listener);
                true
            }
            None => false,
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Descriptor to watch for incoming connections, while open.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.listener.as_ref().map(AsRawFd::as_raw_fd)
    }
}

/// Errors that can occur while binding the listening socket.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("Refusing to listen on non-loopback address {address}")]
    NotLoopback { address: Ipv4Addr },

    #[error("Failed to bind {address}: {error}")]
    Io { address: SocketAddrV4, error: String },
}

/// Errors that can occur while accepting a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AcceptError {
    /// No connection was actually pending.
    #[error("No pending connection")]
    WouldBlock,

    #[error("Listening endpoint is closed")]
    Closed,

    #[error("Accept failed: {0}")]
    Io(String),
}
