//! A single UI client socket.
//!
//! Each accepted client gets a `Connection` that:
//! - Owns the non-blocking TCP stream
//! - Reads one message per readiness event in the configured wire format
//! - Buffers partial frames between reads (length-prefixed format)
//! - Shuts the socket down explicitly when the client is evicted
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - `WouldBlock` and `Interrupted` reads yield no message instead of an error

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::fd::{AsRawFd, RawFd};

use tokio_util::bytes::BytesMut;
use tracing::debug;

use screenhub_protocol::{
    ClientMessage, FrameCodec, FramingError, WireFormat, PLACEHOLDER_MESSAGE_LEN,
};

/// Bytes read per readiness event in the length-prefixed format.
const READ_CHUNK: usize = 4096;

/// How incoming bytes are turned into messages.
#[derive(Debug)]
enum MessageReader {
    Placeholder,
    Framed { codec: FrameCodec, inbound: BytesMut },
}

/// An open socket to a UI client.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    reader: MessageReader,
}

impl Connection {
    /// Wraps an accepted stream.
    ///
    /// The stream must already be non-blocking; the listening endpoint
    /// takes care of that on accept.
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        wire_format: WireFormat,
        max_frame_length: usize,
    ) -> Self {
        let reader = match wire_format {
            WireFormat::Placeholder => MessageReader::Placeholder,
            WireFormat::LengthPrefixed => MessageReader::Framed {
                codec: FrameCodec::new(max_frame_length),
                inbound: BytesMut::with_capacity(READ_CHUNK),
            },
        };

        Self {
            stream,
            peer,
            reader,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Performs one read and returns the messages it completed.
    ///
    /// The placeholder format yields at most one message of up to
    /// [`PLACEHOLDER_MESSAGE_LEN`] bytes. The framed format yields every frame
    /// completed by the bytes read, possibly none.
    pub fn read_messages(&mut self) -> Result<Vec<ClientMessage>, ReadError> {
        match &mut self.reader {
            MessageReader::Placeholder => {
                let mut buf = [0u8; PLACEHOLDER_MESSAGE_LEN];
                match read_once(&mut self.stream, &mut buf)? {
                    Some(n) => Ok(vec![ClientMessage::from_slice(
                        buf.get(..n).unwrap_or_default(),
                    )]),
                    None => Ok(Vec::new()),
                }
            }
            MessageReader::Framed { codec, inbound } => {
                let mut buf = [0u8; READ_CHUNK];
                match read_once(&mut self.stream, &mut buf)? {
                    Some(n) => {
                        inbound.extend_from_slice(buf.get(..n).unwrap_or_default());
                        Ok(codec.decode_all(inbound)?)
                    }
                    None => Ok(Vec::new()),
                }
            }
        }
    }

    /// Writes `bytes` to the client.
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.flush()
    }

    /// Shuts the socket down in both directions and closes it.
    pub fn close(self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            // Peer already gone; the descriptor is still released on drop.
            debug!(peer = %self.peer, error = %e, "Socket shutdown failed");
        }
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

/// Reads once; `Ok(None)` means nothing was available.
fn read_once(stream: &mut TcpStream, buf: &mut [u8]) -> Result<Option<usize>, ReadError> {
    match stream.read(buf) {
        Ok(0) => Err(ReadError::Eof),
        Ok(n) => Ok(Some(n)),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted) => {
            Ok(None)
        }
        Err(e) => Err(ReadError::Io(e.to_string())),
    }
}

/// Errors that can occur while reading from a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    #[error("Connection closed")]
    Eof,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread::sleep;
    use std::time::{Duration, Instant};

    use screenhub_protocol::DEFAULT_MAX_FRAME_LENGTH;

    fn pair(format: WireFormat, max_frame_length: usize) -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (stream, peer) = listener.accept().unwrap();
        stream.set_nonblocking(true).unwrap();
        (Connection::new(stream, peer, format, max_frame_length), client)
    }

    /// Reads until something other than "nothing available" comes back.
    fn read_until_data(conn: &mut Connection) -> Result<Vec<ClientMessage>, ReadError> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let result = conn.read_messages();
            match &result {
                Ok(messages) if messages.is_empty() && Instant::now() < deadline => {
                    sleep(Duration::from_millis(5));
                }
                _ => return result,
            }
        }
    }

    #[test]
    fn test_placeholder_reads_at_most_five_bytes() {
        let (mut conn, mut client) = pair(WireFormat::Placeholder, DEFAULT_MAX_FRAME_LENGTH);
        client.write_all(b"ping\nmore").unwrap();

        let first = read_until_data(&mut conn).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].as_bytes(), b"ping\n");

        let second = read_until_data(&mut conn).unwrap();
        assert_eq!(second[0].as_bytes(), b"more");
    }

    #[test]
    fn test_nothing_available_is_not_an_error() {
        let (mut conn, _client) = pair(WireFormat::Placeholder, DEFAULT_MAX_FRAME_LENGTH);
        assert_eq!(conn.read_messages().unwrap(), Vec::new());
    }

    #[test]
    fn test_peer_close_reports_eof() {
        let (mut conn, client) = pair(WireFormat::Placeholder, DEFAULT_MAX_FRAME_LENGTH);
        drop(client);
        assert_eq!(read_until_data(&mut conn), Err(ReadError::Eof));
    }

    #[test]
    fn test_framed_partial_frame_yields_nothing_until_complete() {
        let (mut conn, mut client) = pair(WireFormat::LengthPrefixed, DEFAULT_MAX_FRAME_LENGTH);
        client.write_all(&[0, 0, 0, 5, b'f', b'r']).unwrap();

        // Give the partial frame time to arrive; every read yields nothing
        for _ in 0..20 {
            assert!(conn.read_messages().unwrap().is_empty());
            sleep(Duration::from_millis(5));
        }

        client.write_all(b"ame").unwrap();
        let messages = read_until_data(&mut conn).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "frame");

        // Nothing left over for later reads
        client.write_all(&[0, 0, 0, 2, b'o', b'k']).unwrap();
        let messages = read_until_data(&mut conn).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text(), "ok");
    }

    #[test]
    fn test_framed_oversized_frame_is_error() {
        let (mut conn, mut client) = pair(WireFormat::LengthPrefixed, 16);
        client.write_all(&[0, 0, 1, 0]).unwrap();
        assert_eq!(
            read_until_data(&mut conn),
            Err(ReadError::Framing(FramingError::FrameTooLarge { max: 16 }))
        );
    }

    #[test]
    fn test_send_reaches_peer() {
        let (mut conn, mut client) = pair(WireFormat::Placeholder, DEFAULT_MAX_FRAME_LENGTH);
        conn.send(b"hello\n").unwrap();

        let mut buf = [0u8; 6];
        client.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello\n");
    }

    #[test]
    fn test_close_sends_eof_to_peer() {
        let (conn, mut client) = pair(WireFormat::Placeholder, DEFAULT_MAX_FRAME_LENGTH);
        conn.close();

        let mut buf = [0u8; 1];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }
}
