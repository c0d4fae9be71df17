//! Unbounded message queue between workers
//!
//! # Backpressure
//!
//! Queues never block producers. A slow listener set makes the queue grow
//! instead of stalling the wire read, which means memory grows without bound
//! while listeners stay behind. An optional high-water mark turns that
//! growth into a log warning; it never throttles the producer.

use crate::core::encoded::EncodedMessage;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Thread-safe FIFO of encoded messages
pub struct MessageQueue {
    name: String,
    tx: Sender<EncodedMessage>,
    rx: Receiver<EncodedMessage>,
    high_water_mark: Option<usize>,
    alarm_raised: AtomicBool,
}

impl MessageQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_high_water_mark(name, None)
    }

    /// Queue that warns once its length reaches `mark`
    pub fn with_high_water_mark(name: impl Into<String>, mark: Option<usize>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            name: name.into(),
            tx,
            rx,
            high_water_mark: mark.filter(|m| *m > 0),
            alarm_raised: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a message; never blocks
    pub fn push(&self, message: EncodedMessage) {
        // Both ends live in self, so the channel can't be disconnected
        let _ = self.tx.send(message);

        if let Some(mark) = self.high_water_mark {
            let len = self.tx.len();
            if len >= mark && !self.alarm_raised.swap(true, Ordering::AcqRel) {
                warn!(
                    "{}: queue reached high-water mark ({} >= {}), listeners are falling behind",
                    self.name, len, mark
                );
            }
        }
    }

    /// Pop the oldest message, waiting at most `timeout`
    pub fn pop_timeout(&self, timeout: Duration) -> Option<EncodedMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(message) => {
                self.rearm_alarm();
                Some(message)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Pop the oldest message if one is queued
    pub fn try_pop(&self) -> Option<EncodedMessage> {
        let message = self.rx.try_recv().ok();
        if message.is_some() {
            self.rearm_alarm();
        }
        message
    }

    /// Remove and return everything queued, oldest first
    pub fn drain(&self) -> Vec<EncodedMessage> {
        let drained: Vec<EncodedMessage> = self.rx.try_iter().collect();
        self.rearm_alarm();
        drained
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Whether the high-water warning is currently raised
    pub fn is_above_high_water(&self) -> bool {
        self.alarm_raised.load(Ordering::Acquire)
    }

    fn rearm_alarm(&self) {
        if let Some(mark) = self.high_water_mark {
            if self.alarm_raised.load(Ordering::Acquire) && self.rx.len() < mark / 2 {
                self.alarm_raised.store(false, Ordering::Release);
                info!("{}: queue drained below half of high-water mark ({})", self.name, mark);
            }
        }
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("high_water_mark", &self.high_water_mark)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let queue = MessageQueue::new("test");
        for i in 0..5 {
            queue.push(EncodedMessage::new_received(format!("m{}", i)));
        }

        assert_eq!(queue.len(), 5);
        let first = queue.try_pop().unwrap();
        assert_eq!(first.payload, "m0");

        let rest: Vec<String> = queue.drain().into_iter().map(|m| m.payload).collect();
        assert_eq!(rest, vec!["m1", "m2", "m3", "m4"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_timeout_on_empty_queue() {
        let queue = MessageQueue::new("test");
        assert!(queue.pop_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_high_water_alarm_raises_and_rearms() {
        let queue = MessageQueue::with_high_water_mark("test", Some(4));

        for i in 0..3 {
            queue.push(EncodedMessage::new_received(format!("m{}", i)));
        }
        assert!(!queue.is_above_high_water());

        queue.push(EncodedMessage::new_received("m3"));
        assert!(queue.is_above_high_water());

        // 4 -> 3 -> 2: still at or above half
        queue.try_pop();
        queue.try_pop();
        assert!(queue.is_above_high_water());

        // 1 < 2: re-armed
        queue.try_pop();
        assert!(!queue.is_above_high_water());
    }

    #[test]
    fn test_zero_mark_disables_alarm() {
        let queue = MessageQueue::with_high_water_mark("test", Some(0));
        queue.push(EncodedMessage::new_received("m"));
        assert!(!queue.is_above_high_water());
    }
}
