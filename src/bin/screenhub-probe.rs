//! screenhub probe - minimal UI client for poking a running server
//!
//! Connects to the given port, prints the greeting, then sends each
//! `--send` message in the chosen wire format.
//!
//! ```bash
//! screenhub-probe 6510 --send ping
//! screenhub-probe 6510 --wire-format length-prefixed --send subscribe --send bye
//! ```

use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpStream};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::bytes::BytesMut;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use screenhub_protocol::{FrameCodec, WireFormat, FRAME_HEADER_LEN, GREETING};

/// screenhub probe - connect to a screen server as a UI client
#[derive(Parser, Debug)]
#[command(name = "screenhub-probe", version, about)]
struct Args {
    /// Server port (as printed by screenhubd)
    port: u16,

    /// Server address
    #[arg(long, default_value_t = Ipv4Addr::LOCALHOST)]
    host: Ipv4Addr,

    /// Wire format the server was started with
    #[arg(long, default_value_t = WireFormat::Placeholder)]
    wire_format: WireFormat,

    /// Message to send (repeatable)
    #[arg(long = "send", value_name = "TEXT")]
    messages: Vec<String>,

    /// Pause between messages in milliseconds
    #[arg(long, default_value_t = 100)]
    pause_ms: u64,

    /// Maximum frame length for the length-prefixed format
    #[arg(long, default_value_t = screenhub_protocol::DEFAULT_MAX_FRAME_LENGTH)]
    max_frame_length: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("screenhub_probe=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let mut stream = TcpStream::connect((args.host, args.port))
        .with_context(|| format!("Failed to connect to {}:{}", args.host, args.port))?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .context("Failed to set read timeout")?;
    info!(peer = %format!("{}:{}", args.host, args.port), "Connected");

    let mut codec = FrameCodec::new(args.max_frame_length);
    let greeting = read_greeting(&mut stream, args.wire_format, &mut codec)?;
    println!("greeting: {}", greeting.escape_debug());

    for text in &args.messages {
        let bytes = match args.wire_format {
            WireFormat::Placeholder => BytesMut::from(text.as_bytes()),
            WireFormat::LengthPrefixed => codec
                .encode(text.as_bytes())
                .context("Message too large for frame")?,
        };
        stream
            .write_all(&bytes)
            .with_context(|| format!("Failed to send {text:?}"))?;
        debug!(bytes = bytes.len(), "Sent message");
        thread::sleep(Duration::from_millis(args.pause_ms));
    }

    info!(sent = args.messages.len(), "Done");
    Ok(())
}

/// Reads the server greeting in the given wire format.
fn read_greeting(
    stream: &mut TcpStream,
    wire_format: WireFormat,
    codec: &mut FrameCodec,
) -> Result<String> {
    match wire_format {
        WireFormat::Placeholder => {
            let mut buf = vec![0u8; GREETING.len()];
            stream.read_exact(&mut buf).context("Failed to read greeting")?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
        WireFormat::LengthPrefixed => {
            let mut buf = BytesMut::from(&[0u8; FRAME_HEADER_LEN][..]);
            stream
                .read_exact(&mut buf)
                .context("Failed to read greeting header")?;

            let mut chunk = [0u8; 256];
            loop {
                if let Some(message) = codec.decode_all(&mut buf)?.into_iter().next() {
                    return Ok(message.text().into_owned());
                }
                let n = stream.read(&mut chunk).context("Failed to read greeting")?;
                if n == 0 {
                    bail!("Server closed the connection before greeting");
                }
                buf.extend_from_slice(chunk.get(..n).unwrap_or_default());
            }
        }
    }
}
