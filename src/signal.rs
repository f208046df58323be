//! Tick notifications for the display and audio sides.
//!
//! A notification carries no data: the receiver reads whatever the machine
//! looks like *now*. So the channel only needs to hold one pending
//! notification; if the receiver falls behind, further ticks collapse into
//! the one already queued and the sender never blocks.
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::time::Duration;

/// sending half, owned by the scheduler
#[derive(Clone)]
pub struct TickSender {
    tx: SyncSender<()>,
}

/// receiving half, owned by a display or audio loop
pub struct TickReceiver {
    rx: Receiver<()>,
}

/// single-slot tick channel
pub fn tick_channel() -> (TickSender, TickReceiver) {
    let (tx, rx) = mpsc::sync_channel(1);
    (TickSender { tx }, TickReceiver { rx })
}

impl TickSender {
    /// queue a notification unless one is already pending; returns false once
    /// the receiver has gone away
    pub fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => true,
            Err(TrySendError::Disconnected(())) => false,
        }
    }
}

impl TickReceiver {
    /// block until a tick arrives; false once every sender is gone
    pub fn wait(&self) -> bool {
        self.rx.recv().is_ok()
    }

    /// like `wait` but gives up after `timeout`; `Some(false)` means the senders are gone
    pub fn wait_timeout(&self, timeout: Duration) -> Option<bool> {
        match self.rx.recv_timeout(timeout) {
            Ok(()) => Some(true),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(false),
        }
    }

    /// consume a pending tick without blocking
    pub fn try_take(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}
