//! Unix socket transport.
//!
//! Connects to a daemon exposing raw ATT over a Unix socket, one
//! 2-byte-length-prefixed PDU per frame. The read half feeds a
//! [`PduBuffer`] in a reader task; the write half is owned by the writer
//! task. Closure of either half closes the inbound stream, which is how
//! the session learns the channel died.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::transport::framing::PduBuffer;
use crate::transport::writer::{spawn_writer_task, WriterConfig, WriterHandle};
use crate::transport::{BoxFuture, Channel, ConnectParams, Connection, SecurityLevel, Transport};

/// Capacity of the inbound PDU channel.
const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// Read chunk size; comfortably holds the largest framed PDU.
const READ_BUF_SIZE: usize = 1024;

/// Transport over a Unix socket.
pub struct SocketTransport {
    path: PathBuf,
}

impl SocketTransport {
    /// Transport connecting to the socket at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The socket path this transport connects to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for SocketTransport {
    fn connect(&self, params: ConnectParams) -> BoxFuture<'_, Result<Connection>> {
        Box::pin(async move {
            debug!(
                remote = %params.remote,
                security = %params.security,
                path = %self.path.display(),
                "opening channel"
            );

            let stream = UnixStream::connect(&self.path).await?;
            let (read_half, write_half) = stream.into_split();

            let (writer, _writer_task) = spawn_writer_task(write_half, WriterConfig::default());
            let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
            tokio::spawn(reader_loop(read_half, inbound_tx));

            let channel = SocketChannel { writer };
            channel.set_security_level(params.security).await?;

            Ok(Connection {
                channel: Box::new(channel),
                inbound: inbound_rx,
            })
        })
    }
}

struct SocketChannel {
    writer: WriterHandle,
}

impl Channel for SocketChannel {
    fn send(&self, pdu: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.writer.send(pdu).await })
    }

    fn set_security_level(&self, level: SecurityLevel) -> BoxFuture<'_, Result<()>> {
        // Unix sockets carry no link security; the level is accepted so
        // sessions behave uniformly across transports.
        Box::pin(async move {
            debug!(%level, "security level applied");
            Ok(())
        })
    }
}

/// Reads socket chunks, reassembles PDUs and forwards them inbound.
///
/// Exits on EOF, read error, framing violation or a dropped receiver;
/// dropping `tx` is what signals closure upstream.
async fn reader_loop<R>(mut reader: R, tx: mpsc::Sender<Bytes>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut buffer = PduBuffer::new();
    let mut chunk = [0u8; READ_BUF_SIZE];

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => {
                debug!("channel closed by peer");
                return;
            }
            Ok(n) => n,
            Err(err) => {
                warn!(%err, "channel read failed");
                return;
            }
        };

        let pdus = match buffer.push(&chunk[..n]) {
            Ok(pdus) => pdus,
            Err(err) => {
                warn!(%err, "dropping channel on framing violation");
                return;
            }
        };

        for pdu in pdus {
            if tx.send(pdu).await.is_err() {
                return;
            }
        }
    }
}
