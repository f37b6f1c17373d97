//! Table of connected UI clients.
//!
//! The table is the only owner of client sockets. Entries are kept in
//! connection order in a `Vec`: appending is amortised O(1) and removal is
//! O(n) because later entries shift down to keep the order stable. Client
//! counts are small (a handful of UI processes), so the linear scan is the
//! cheaper choice over an indexed map.
//!
//! Every membership change marks the table stale so the server knows to
//! rebuild its watch set before the next poll.

use std::os::fd::{AsRawFd, RawFd};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use screenhub_core::{ClientId, DomainError, DomainResult};

use crate::server::Connection;

/// A connected UI client.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    connection: Connection,
    connected_at: DateTime<Utc>,
}

impl Client {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Seconds since the client connected.
    pub fn connected_secs(&self) -> i64 {
        (Utc::now() - self.connected_at).num_seconds()
    }
}

impl AsRawFd for Client {
    fn as_raw_fd(&self) -> RawFd {
        self.connection.as_raw_fd()
    }
}

/// Connected clients in connection order.
#[derive(Debug)]
pub struct ClientTable {
    clients: Vec<Client>,
    /// `None` once `ClientId::MAX` has been issued.
    next_id: Option<ClientId>,
    stale: bool,
}

impl Default for ClientTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientTable {
    /// Creates an empty table.
    ///
    /// A new table starts stale: no watch set has been built from it yet.
    pub fn new() -> Self {
        Self::starting_at(ClientId::FIRST)
    }

    pub(crate) fn starting_at(first: ClientId) -> Self {
        Self {
            clients: Vec::new(),
            next_id: Some(first),
            stale: true,
        }
    }

    /// Adds a client and returns its freshly issued id.
    ///
    /// # Errors
    /// `DomainError::ClientIdsExhausted` once every id has been issued; the
    /// connection is closed and the table is left unchanged.
    pub fn add(&mut self, connection: Connection) -> DomainResult<ClientId> {
        let Some(id) = self.next_id else {
            connection.close();
            return Err(DomainError::ClientIdsExhausted {
                last: ClientId::new(u64::MAX),
            });
        };
        self.next_id = id.checked_next();

        self.clients.push(Client {
            id,
            connection,
            connected_at: Utc::now(),
        });
        self.stale = true;

        debug!(client_id = %id, count = self.clients.len(), "Client added");
        Ok(id)
    }

    /// Closes and removes a client.
    ///
    /// Returns `false` (and changes nothing) if `id` is not in the table.
    pub fn remove(&mut self, id: ClientId) -> bool {
        let Some(index) = self.clients.iter().position(|c| c.id == id) else {
            return false;
        };

        let client = self.clients.remove(index);
        info!(
            client_id = %id,
            peer = %client.connection.peer(),
            connected_secs = client.connected_secs(),
            "Client removed"
        );
        client.connection.close();
        self.stale = true;
        true
    }

    pub fn get(&self, id: ClientId) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: ClientId) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.id == id)
    }

    /// Clients in connection order.
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    /// Ids in connection order.
    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|c| c.id).collect()
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// The id the next accepted client will get, if any is left.
    pub fn next_id(&self) -> Option<ClientId> {
        self.next_id
    }

    /// Closes every client and empties the table. Returns how many were closed.
    ///
    /// The id counter is left alone.
    pub fn clear_all(&mut self) -> usize {
        let closed = self.clients.len();
        for client in self.clients.drain(..) {
            debug!(client_id = %client.id, "Closing client");
            client.connection.close();
        }
        if closed > 0 {
            self.stale = true;
        }
        closed
    }

    /// Whether membership changed since the last [`take_stale`](Self::take_stale).
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Returns the stale flag and resets it.
    pub fn take_stale(&mut self) -> bool {
        std::mem::replace(&mut self.stale, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};

    use screenhub_protocol::{WireFormat, DEFAULT_MAX_FRAME_LENGTH};

    struct Peer {
        listener: TcpListener,
        remotes: Vec<TcpStream>,
    }

    impl Peer {
        fn new() -> Self {
            Self {
                listener: TcpListener::bind("127.0.0.1:0").unwrap(),
                remotes: Vec::new(),
            }
        }

        fn connection(&mut self) -> Connection {
            let remote = TcpStream::connect(self.listener.local_addr().unwrap()).unwrap();
            let (stream, peer) = self.listener.accept().unwrap();
            stream.set_nonblocking(true).unwrap();
            self.remotes.push(remote);
            Connection::new(stream, peer, WireFormat::Placeholder, DEFAULT_MAX_FRAME_LENGTH)
        }
    }

    #[test]
    fn test_ids_increase_from_zero() {
        let mut peer = Peer::new();
        let mut table = ClientTable::new();

        let a = table.add(peer.connection()).unwrap();
        let b = table.add(peer.connection()).unwrap();

        assert_eq!(a, ClientId::new(0));
        assert_eq!(b, ClientId::new(1));
        assert_eq!(table.count(), 2);
        assert_eq!(table.next_id(), Some(ClientId::new(2)));
    }

    #[test]
    fn test_ids_not_reused_after_remove() {
        let mut peer = Peer::new();
        let mut table = ClientTable::new();

        let a = table.add(peer.connection()).unwrap();
        assert!(table.remove(a));
        let b = table.add(peer.connection()).unwrap();

        assert_ne!(a, b);
        assert!(b > a);
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut peer = Peer::new();
        let mut table = ClientTable::new();
        let ids: Vec<_> = (0..5).map(|_| table.add(peer.connection()).unwrap()).collect();

        assert!(table.remove(ids[1]));
        assert!(table.remove(ids[3]));

        assert_eq!(table.ids(), vec![ids[0], ids[2], ids[4]]);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut peer = Peer::new();
        let mut table = ClientTable::new();
        table.add(peer.connection()).unwrap();
        table.take_stale();

        assert!(!table.remove(ClientId::new(99)));
        assert_eq!(table.count(), 1);
        assert!(!table.is_stale());
    }

    #[test]
    fn test_membership_changes_mark_stale() {
        let mut peer = Peer::new();
        let mut table = ClientTable::new();
        assert!(table.take_stale(), "new table starts stale");
        assert!(!table.take_stale());

        let id = table.add(peer.connection()).unwrap();
        assert!(table.take_stale());
        assert!(!table.is_stale());

        table.remove(id);
        assert!(table.take_stale());
    }

    #[test]
    fn test_remove_closes_socket() {
        let mut peer = Peer::new();
        let mut table = ClientTable::new();
        let id = table.add(peer.connection()).unwrap();

        table.remove(id);

        let remote = peer.remotes.get_mut(0).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(remote.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_exhausted_ids_refuse_new_clients() {
        let mut peer = Peer::new();
        let mut table = ClientTable::starting_at(ClientId::new(u64::MAX));

        let last = table.add(peer.connection()).unwrap();
        assert_eq!(last, ClientId::new(u64::MAX));
        assert_eq!(table.next_id(), None);
        table.take_stale();

        let err = table.add(peer.connection()).unwrap_err();
        assert_eq!(
            err,
            DomainError::ClientIdsExhausted {
                last: ClientId::new(u64::MAX)
            }
        );
        assert_eq!(table.ids(), vec![last]);
        assert!(!table.is_stale());

        // The refused connection is closed, not leaked
        let remote = peer.remotes.get_mut(1).unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(remote.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_clear_all_keeps_counter() {
        let mut peer = Peer::new();
        let mut table = ClientTable::new();
        table.add(peer.connection()).unwrap();
        table.add(peer.connection()).unwrap();

        assert_eq!(table.clear_all(), 2);
        assert!(table.is_empty());
        assert_eq!(table.next_id(), Some(ClientId::new(2)));
        assert_eq!(table.clear_all(), 0);
    }
}
