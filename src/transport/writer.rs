//! Dedicated writer task for the socket transport.
//!
//! Outbound PDUs go through an mpsc channel to a single task owning the
//! write half, so senders never contend on a lock:
//!
//! ```text
//! session ──► mpsc::Sender<Bytes> ──► writer task ──► socket
//! ```
//!
//! The task drains whatever is queued and frames the batch into one
//! buffer before writing, so bursts of small PDUs cost one syscall.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{BluewireError, Result};
use crate::transport::framing::frame_pdu;

/// Default channel capacity for the outbound queue.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum PDUs drained into one write.
const MAX_BATCH_SIZE: usize = 16;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Capacity of the outbound PDU queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for queueing PDUs to the writer task. Cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
    pending: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Queue one PDU. Fails with `Disconnected` once the task is gone.
    pub async fn send(&self, pdu: Bytes) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(pdu).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            BluewireError::Disconnected
        })
    }

    /// PDUs queued but not yet written.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task over `writer`.
///
/// Returns the sending handle and the task's join handle. The task exits
/// cleanly when every `WriterHandle` clone is dropped.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
    };
    let task = tokio::spawn(writer_loop(rx, writer, pending));

    (handle, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut staging = BytesMut::new();

    loop {
        let first = match rx.recv().await {
            Some(pdu) => pdu,
            // All handles dropped, clean shutdown.
            None => return Ok(()),
        };

        let mut batch = 1;
        staging.clear();
        frame_pdu(&first, &mut staging);

        while batch < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(pdu) => {
                    frame_pdu(&pdu, &mut staging);
                    batch += 1;
                }
                Err(_) => break,
            }
        }

        writer.write_all(&staging).await?;
        writer.flush().await?;

        pending.fetch_sub(batch, Ordering::Release);
    }
}
