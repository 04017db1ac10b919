use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::foundation::error::{PlayoutError, PlayoutResult};

/// Build a bounded frame queue with an abort handle.
///
/// Threaded producers push decoded frames through one of these; the whole
/// point over a plain channel is the third return value. Dropping or
/// triggering the [`AbortGuard`] fails every blocked `send`/`recv` fast so a
/// worker stuck on a full queue unwinds promptly during shutdown.
pub fn frame_queue<T: Send>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>, AbortGuard) {
    let (tx, rx) = bounded::<T>(capacity.max(1));
    // Zero-capacity channel used only for its disconnect edge.
    let (abort_tx, abort_rx) = bounded::<()>(0);
    let guard = AbortGuard {
        tx: Arc::new(Mutex::new(Some(abort_tx))),
    };
    (
        QueueSender {
            tx,
            abort_rx: abort_rx.clone(),
        },
        QueueReceiver { rx, abort_rx },
        guard,
    )
}

/// Sending half of an abortable bounded queue.
pub struct QueueSender<T> {
    tx: Sender<T>,
    abort_rx: Receiver<()>,
}

impl<T: Send> QueueSender<T> {
    /// Block until there is room, the receiver is gone, or the queue aborts.
    pub fn send(&self, item: T) -> PlayoutResult<()> {
        crossbeam_channel::select! {
            send(self.tx, item) -> res => {
                res.map_err(|_| PlayoutError::aborted("frame queue receiver dropped"))
            }
            recv(self.abort_rx) -> _ => Err(PlayoutError::aborted("frame queue aborted")),
        }
    }
}

/// Receiving half of an abortable bounded queue.
pub struct QueueReceiver<T> {
    rx: Receiver<T>,
    abort_rx: Receiver<()>,
}

impl<T: Send> QueueReceiver<T> {
    /// Block for the next item.
    pub fn recv(&self) -> PlayoutResult<T> {
        crossbeam_channel::select! {
            recv(self.rx) -> res => {
                res.map_err(|_| PlayoutError::aborted("frame queue sender dropped"))
            }
            recv(self.abort_rx) -> _ => Err(PlayoutError::aborted("frame queue aborted")),
        }
    }

    /// Non-blocking pop.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Number of buffered items right now.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// `true` when nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Cancels a frame queue; cloneable, idempotent, and triggered on last drop.
#[derive(Clone)]
pub struct AbortGuard {
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

impl AbortGuard {
    /// Abort the queue, waking every blocked sender and receiver.
    pub fn abort(&self) {
        self.tx.lock().expect("abort guard lock poisoned").take();
    }
}
