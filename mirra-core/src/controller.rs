//! Control channel worker.
//!
//! Owns the control socket and a FIFO queue of [`ControlMessage`]s.
//! Messages are serialized and written in exactly the order they were
//! enqueued; the bytes on the socket are the concatenation of the
//! individual serializations.
//!
//! `push` never blocks: the queue is unbounded and traffic is tiny. It
//! returns `false` only once the session is stopping and the queue has
//! been closed.

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::control::{ControlMessage, SERIALIZED_MAX_SIZE};

/// Cloneable producer half of the control queue.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<ControlMessage>,
}

impl ControllerHandle {
    /// Enqueue a message for the device.
    ///
    /// Returns `false` if the queue has been closed (session stopping).
    pub fn push(&self, msg: ControlMessage) -> bool {
        self.tx.send(msg).is_ok()
    }
}

/// Create a handle backed by a bare queue, without a worker.
///
/// Messages pushed into it are simply collected by the returned
/// receiver; useful for exercising producers without a socket.
pub fn channel() -> (ControllerHandle, mpsc::UnboundedReceiver<ControlMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControllerHandle { tx }, rx)
}

/// Spawn the controller worker on `socket`.
///
/// Returns the producer handle and the worker's join handle. Cancel
/// `token` to stop: the worker discards whatever is still queued,
/// shuts the socket down and exits.
pub fn spawn<W>(
    mut socket: W,
    token: CancellationToken,
) -> (ControllerHandle, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<ControlMessage>();

    let handle = tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(SERIALIZED_MAX_SIZE);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                msg = rx.recv() => {
                    let Some(msg) = msg else { break };
                    buf.clear();
                    match msg.serialize(&mut buf) {
                        Ok(len) => {
                            debug!("sending control message ({len} bytes)");
                            if let Err(e) = socket.write_all(&buf).await {
                                warn!("could not write control message: {e}");
                                break;
                            }
                        }
                        Err(e) => {
                            // Oversized or otherwise unserializable
                            // messages are dropped; the session goes on.
                            warn!("could not serialize control message: {e}");
                        }
                    }
                }
            }
        }

        // Drain and discard; producers see push() == false from now on.
        rx.close();
        while rx.try_recv().is_ok() {}
        let _ = socket.shutdown().await;
        debug!("controller stopped");
    });

    (ControllerHandle { tx }, handle)
}

// ── Tests ────────────────────────────────────────────────────────
