//! Ordered write-through of registry mutations to a [`Store`].
//!
//! The registry enqueues each mutation while it holds its mutation lock, so
//! queue order is in-memory order. One task drains the queue into the store;
//! callers of `upsert` and friends never wait on store I/O.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::{Announcement, StoreFailure, StoreOperation};
use crate::store::Store;
use crate::telemetry as m;

enum PendingWrite {
    /// Mirror a node's current rows; no rows deletes the node.
    Node {
        node_id: String,
        rows: Vec<Announcement>,
    },
    /// Acknowledged once everything queued before it has been applied.
    Flush(oneshot::Sender<()>),
}

/// Handle to the drain task of one store.
pub(super) struct StoreWriter {
    tx: mpsc::UnboundedSender<PendingWrite>,
    task: JoinHandle<()>,
}

impl StoreWriter {
    /// Start the drain task. Must be called from within a Tokio runtime.
    pub(super) fn spawn(store: Arc<dyn Store>, failures: broadcast::Sender<StoreFailure>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(drain(store, rx, failures));
        Self { tx, task }
    }

    pub(super) fn enqueue(&self, node_id: &str, rows: Vec<Announcement>) {
        let write = PendingWrite::Node {
            node_id: node_id.to_string(),
            rows,
        };
        if self.tx.send(write).is_err() {
            warn!(node_id = %node_id, "Store writer has stopped; write-through dropped");
        }
    }

    pub(super) async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(PendingWrite::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Apply what is queued, then stop the task and release the store.
    pub(super) async fn close(self) {
        let Self { tx, task } = self;
        drop(tx);
        if let Err(e) = task.await {
            warn!(error = %e, "Store writer task ended abnormally");
        }
    }
}

async fn drain(
    store: Arc<dyn Store>,
    mut rx: mpsc::UnboundedReceiver<PendingWrite>,
    failures: broadcast::Sender<StoreFailure>,
) {
    while let Some(write) = rx.recv().await {
        match write {
            PendingWrite::Node { node_id, rows } => {
                apply(store.as_ref(), &node_id, &rows, &failures).await;
            }
            PendingWrite::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Store writer stopped");
}

async fn apply(
    store: &dyn Store,
    node_id: &str,
    rows: &[Announcement],
    failures: &broadcast::Sender<StoreFailure>,
) {
    let (operation, result) = if rows.is_empty() {
        (
            StoreOperation::DeleteForNode,
            store.delete_for_node(node_id).await,
        )
    } else {
        (
            StoreOperation::ReplaceForNode,
            store.replace_for_node(node_id, rows).await,
        )
    };

    if let Err(e) = result {
        error!(
            node_id = %node_id,
            operation = %operation,
            error = %e,
            "Store write-through failed; in-memory state kept"
        );
        metrics::counter!(m::STORE_FAILURES).increment(1);
        // No subscribers is fine; the failure is already logged.
        let _ = failures.send(StoreFailure {
            operation,
            node_id: node_id.to_string(),
            message: e.to_string(),
        });
    }
}
