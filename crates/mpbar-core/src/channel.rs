//! Many-producer, single-consumer queue of progress messages.
//!
//! Built on `crossbeam-channel`. The extra shared state tracks whether the
//! channel was closed and how many sends are currently in progress, so the
//! consumer can tell "nothing buffered right now" apart from "nothing will
//! ever arrive again".

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::ProgressError;
use crate::progress::Postfix;

/// A message carried from a worker to the watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Message {
    /// Advance the bar by `n` (always > 0).
    Advance(u64),
    /// Replace the postfix shown after the bar.
    Postfix(Postfix),
}

/// Outcome of one `receive` call.
#[derive(Debug, PartialEq, Eq)]
pub enum Received {
    Message(Message),
    /// Nothing arrived within the timeout.
    Timeout,
    /// The channel is closed and fully drained.
    Closed,
}

#[derive(Debug, Default)]
struct Shared {
    closed: AtomicBool,
    in_flight: AtomicUsize,
}

/// Create a channel. `capacity` of `None` means unbounded.
pub fn update_channel(capacity: Option<usize>) -> (UpdateSender, UpdateReceiver) {
    let (tx, rx) = match capacity {
        Some(cap) => crossbeam_channel::bounded(cap),
        None => crossbeam_channel::unbounded(),
    };
    let shared = Arc::new(Shared::default());
    (
        UpdateSender {
            tx,
            shared: Arc::clone(&shared),
        },
        UpdateReceiver { rx, shared },
    )
}

/// Producer handle. Cheap to clone; one per worker is fine.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: Sender<Message>,
    shared: Arc<Shared>,
}

impl UpdateSender {
    /// Enqueue a message. On a bounded channel this blocks while the queue
    /// is full; messages are never dropped.
    pub fn send(&self, message: Message) -> Result<(), ProgressError> {
        // The in-flight count is raised before the closed flag is read, so a
        // consumer that sees `in_flight == 0` after closing knows no send
        // can still slip in.
        self.shared.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = if self.shared.closed.load(Ordering::SeqCst) {
            Err(ProgressError::InvalidState(
                "send on a closed update channel".to_string(),
            ))
        } else {
            self.tx.send(message).map_err(|_| {
                ProgressError::InvalidState("update channel has no receiver".to_string())
            })
        };
        self.shared.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

/// Consumer handle. Owned by the watcher.
#[derive(Debug)]
pub struct UpdateReceiver {
    rx: Receiver<Message>,
    shared: Arc<Shared>,
}

impl UpdateReceiver {
    /// Wait up to `timeout` for the next message.
    pub fn receive(&self, timeout: Duration) -> Received {
        if self.is_drained() {
            return Received::Closed;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(message) => Received::Message(message),
            Err(RecvTimeoutError::Timeout) if self.is_drained() => Received::Closed,
            Err(RecvTimeoutError::Timeout) => Received::Timeout,
            Err(RecvTimeoutError::Disconnected) => Received::Closed,
        }
    }

    /// Refuse further sends. Buffered messages stay receivable.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Closed, no send in progress, nothing buffered.
    pub fn is_drained(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
            && self.shared.in_flight.load(Ordering::SeqCst) == 0
            && self.rx.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHORT: Duration = Duration::from_millis(10);

    #[test]
    fn send_then_receive() {
        let (tx, rx) = update_channel(None);
        tx.send(Message::Advance(3)).unwrap();
        assert_eq!(rx.receive(SHORT), Received::Message(Message::Advance(3)));
    }

    #[test]
    fn receive_times_out_when_idle() {
        let (_tx, rx) = update_channel(None);
        assert_eq!(rx.receive(SHORT), Received::Timeout);
    }

    #[test]
    fn send_after_close_is_invalid_state() {
        let (tx, rx) = update_channel(None);
        rx.close();
        assert!(tx.is_closed());
        let err = tx.send(Message::Advance(1)).unwrap_err();
        assert!(matches!(err, ProgressError::InvalidState(_)));
    }

    #[test]
    fn buffered_messages_survive_close() {
        let (tx, rx) = update_channel(None);
        tx.send(Message::Advance(1)).unwrap();
        tx.send(Message::Advance(2)).unwrap();
        rx.close();
        assert!(!rx.is_drained());
        assert_eq!(rx.receive(SHORT), Received::Message(Message::Advance(1)));
        assert_eq!(rx.receive(SHORT), Received::Message(Message::Advance(2)));
        assert_eq!(rx.receive(SHORT), Received::Closed);
        assert!(rx.is_drained());
    }

    #[test]
    fn all_senders_dropped_reports_closed() {
        let (tx, rx) = update_channel(None);
        tx.send(Message::Advance(1)).unwrap();
        drop(tx);
        assert_eq!(rx.receive(SHORT), Received::Message(Message::Advance(1)));
        assert_eq!(rx.receive(SHORT), Received::Closed);
    }

    #[test]
    fn bounded_channel_blocks_instead_of_dropping() {
        let (tx, rx) = update_channel(Some(2));
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let tx = tx.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        tx.send(Message::Advance(1)).unwrap();
                    }
                })
            })
            .collect();

        let mut total = 0;
        while total < 200 {
            if let Received::Message(Message::Advance(n)) = rx.receive(SHORT) {
                total += n;
            }
        }
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(total, 200);
        assert_eq!(rx.pending(), 0);
    }
}
