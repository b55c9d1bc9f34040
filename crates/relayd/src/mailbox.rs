//! Per-name inbound message queue.
//!
//! A `Mailbox` is an unbounded FIFO of [`OutboundMessage`]s. Any number of
//! reader pumps may push into it (through the registry actor); exactly one
//! writer pump drains it.
//!
//! # Cancel Safety
//!
//! [`Mailbox::recv`] removes a message only in the same poll that returns
//! it. Dropping the future at any `.await` point (for example when a
//! `select!` picks a cancellation branch) never loses a message.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use relay_core::{ClientName, OutboundMessage};

/// Unbounded FIFO queue of messages waiting for one client.
#[derive(Debug)]
pub struct Mailbox {
    name: ClientName,
    queue: Mutex<VecDeque<OutboundMessage>>,
    notify: Notify,
    closed: AtomicBool,
    created_at: DateTime<Utc>,
}

impl Mailbox {
    pub fn new(name: ClientName) -> Self {
        Self {
            name,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            created_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &ClientName {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Appends a message to the back of the queue.
    ///
    /// Returns `false` (and drops the message) if the mailbox was evicted.
    pub fn push(&self, message: OutboundMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        self.lock().push_back(message);
        self.notify.notify_one();
        true
    }

    /// Puts a message back at the head of the queue.
    ///
    /// Used when a dequeued message could not be written, so it is the
    /// next one delivered.
    pub fn requeue(&self, message: OutboundMessage) -> bool {
        if self.is_closed() {
            return false;
        }
        self.lock().push_front(message);
        self.notify.notify_one();
        true
    }

    /// Waits for the next message.
    ///
    /// Suspends indefinitely while the queue is empty. Returns `None` once
    /// the mailbox has been closed.
    pub async fn recv(&self) -> Option<OutboundMessage> {
        loop {
            if self.is_closed() {
                return None;
            }
            let next = self.lock().pop_front();
            if next.is_some() {
                return next;
            }
            // notify_one stores a permit when nobody is waiting, so a push
            // between the check above and this await is not missed.
            self.notify.notified().await;
        }
    }

    /// Evicts the mailbox: drops the backlog and wakes the consumer.
    ///
    /// Returns the number of undelivered messages dropped.
    pub fn close(&self) -> usize {
        self.closed.store(true, Ordering::Release);
        let dropped = {
            let mut queue = self.lock();
            let dropped = queue.len();
            queue.clear();
            dropped
        };
        self.notify.notify_waiters();
        self.notify.notify_one();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of messages waiting.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the VecDeque in a torn
    // state, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, VecDeque<OutboundMessage>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
