//! Dispatch worker: fans queued messages out to interested listeners
//!
//! # Architecture
//!
//! ```text
//! MessageQueue ──pop──> DispatchWorker (OS thread) ──> listener 1
//!                                                  ──> listener 2
//!                                                  ──> ...
//! ```
//!
//! One worker per direction. Listeners are called sequentially in
//! registration order; the processed counter moves only after every listener
//! has seen the message.
//!
//! # Shutdown
//!
//! `terminate` raises a flag; the worker keeps dispatching until the queue is
//! empty, then exits. If draining takes longer than the drain timeout, the
//! worker is told to stop at the next message boundary and whatever is left
//! stays in the queue.

use crate::core::encoded::{Direction, EncodedMessage};
use crate::core::listeners::{ListenerRegistry, SharedListener};
use crate::core::queue::MessageQueue;
use crate::error::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// How long a pop waits before the worker re-checks its flags
const POP_TIMEOUT: Duration = Duration::from_millis(50);

/// Worker thread that hands queued messages to listeners
pub struct DispatchWorker {
    name: String,
    direction: Direction,
    processed: Arc<AtomicU64>,
    listener_failures: Arc<AtomicU64>,
    terminate: Arc<AtomicBool>,
    abandon: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DispatchWorker {
    /// Spawn a worker for `direction`, reading from `queue`
    pub fn spawn(
        name: impl Into<String>,
        direction: Direction,
        queue: Arc<MessageQueue>,
        registry: Arc<ListenerRegistry>,
    ) -> Result<Self> {
        let name = name.into();
        let processed = Arc::new(AtomicU64::new(0));
        let listener_failures = Arc::new(AtomicU64::new(0));
        let terminate = Arc::new(AtomicBool::new(false));
        let abandon = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded(1);

        let handle = {
            let name = name.clone();
            let processed = Arc::clone(&processed);
            let listener_failures = Arc::clone(&listener_failures);
            let terminate = Arc::clone(&terminate);
            let abandon = Arc::clone(&abandon);

            std::thread::Builder::new().name(name.clone()).spawn(move || {
                debug!("{}: started", name);

                loop {
                    if abandon.load(Ordering::Acquire) {
                        debug!("{}: drain timeout exceeded, leaving {} message(s) queued", name, queue.len());
                        break;
                    }

                    match queue.pop_timeout(POP_TIMEOUT) {
                        Some(message) => {
                            let listeners = registry.snapshot(direction);
                            let failures = dispatch(&name, &message, &listeners);
                            if failures > 0 {
                                listener_failures.fetch_add(failures, Ordering::Relaxed);
                            }
                            processed.fetch_add(1, Ordering::AcqRel);
                        }
                        None => {
                            if terminate.load(Ordering::Acquire) {
                                debug!("{}: terminate requested and queue empty, exiting", name);
                                break;
                            }
                        }
                    }
                }

                let _ = done_tx.send(());
            })?
        };

        Ok(Self {
            name,
            direction,
            processed,
            listener_failures,
            terminate,
            abandon,
            done_rx,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Messages handed to all interested listeners
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Acquire)
    }

    /// Shared handle to the processed counter; stays readable after the worker stops
    pub fn processed_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.processed)
    }

    /// Listener invocations that returned an error or panicked
    pub fn listener_failures(&self) -> u64 {
        self.listener_failures.load(Ordering::Relaxed)
    }

    pub fn listener_failures_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.listener_failures)
    }

    pub fn is_finished(&self) -> bool {
        self.handle.lock().as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }

    /// Stop the worker and wait for its thread
    ///
    /// The worker drains its queue for at most `drain_timeout`, then stops at
    /// the next message boundary. A message being dispatched is always
    /// finished.
    pub fn terminate(&self, drain_timeout: Duration) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };

        trace!("{}: terminating", self.name);
        self.terminate.store(true, Ordering::Release);

        match self.done_rx.recv_timeout(drain_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "{}: queue not drained within {:?}, stopping after current message",
                    self.name, drain_timeout
                );
                self.abandon.store(true, Ordering::Release);
            }
        }

        if handle.join().is_err() {
            error!("{}: worker thread panicked", self.name);
        }
    }
}

impl Drop for DispatchWorker {
    fn drop(&mut self) {
        if self.handle.get_mut().is_some() {
            self.abandon.store(true, Ordering::Release);
            self.terminate(Duration::ZERO);
        }
    }
}

/// Hand one message to every listener; returns the number of failures
fn dispatch(worker: &str, message: &EncodedMessage, listeners: &[SharedListener]) -> u64 {
    let mut failures = 0;
    for listener in listeners {
        match catch_unwind(AssertUnwindSafe(|| listener.on_message(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("{}: listener '{}' failed to handle message: {}", worker, listener.name(), e);
                failures += 1;
            }
            Err(_) => {
                error!("{}: listener '{}' panicked while handling message", worker, listener.name());
                failures += 1;
            }
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectivityError;
    use crate::traits::MessageListener;
    use std::time::Instant;

    struct Recorder {
        name: String,
        fail: bool,
        delay: Duration,
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new(name: &str, fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                delay,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl MessageListener for Recorder {
        fn name(&self) -> &str {
            &self.name
        }
        fn listener_type(&self) -> &str {
            "Recorder"
        }
        fn is_active_for_received(&self) -> bool {
            true
        }
        fn is_active_for_sent(&self) -> bool {
            false
        }
        fn on_message(&self, message: &EncodedMessage) -> Result<()> {
            std::thread::sleep(self.delay);
            self.seen.lock().push(message.payload.clone());
            if self.fail {
                return Err(ConnectivityError::Listener {
                    name: self.name.clone(),
                    reason: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_failing_listener_does_not_block_others() {
        let queue = Arc::new(MessageQueue::new("in"));
        let registry = Arc::new(ListenerRegistry::new());
        let failing = Recorder::new("failing", true, Duration::ZERO);
        let healthy = Recorder::new("healthy", false, Duration::ZERO);
        registry.add(failing.clone());
        registry.add(healthy.clone());

        let worker =
            DispatchWorker::spawn("test-dispatch", Direction::Received, queue.clone(), registry).unwrap();
        queue.push(EncodedMessage::new_received("m1"));
        queue.push(EncodedMessage::new_received("m2"));

        assert!(wait_for(|| worker.processed() == 2));
        assert_eq!(*healthy.seen.lock(), vec!["m1", "m2"]);
        assert_eq!(*failing.seen.lock(), vec!["m1", "m2"]);
        assert_eq!(worker.listener_failures(), 2);

        worker.terminate(Duration::from_secs(1));
        assert!(worker.is_finished());
    }

    #[test]
    fn test_terminate_drains_queue() {
        let queue = Arc::new(MessageQueue::new("in"));
        let registry = Arc::new(ListenerRegistry::new());
        let slow = Recorder::new("slow", false, Duration::from_millis(5));
        registry.add(slow.clone());

        let worker =
            DispatchWorker::spawn("test-dispatch", Direction::Received, queue.clone(), registry).unwrap();
        for i in 0..10 {
            queue.push(EncodedMessage::new_received(format!("m{}", i)));
        }

        worker.terminate(Duration::from_secs(5));
        assert_eq!(worker.processed(), 10);
        assert!(queue.is_empty());
        assert_eq!(slow.seen.lock().len(), 10);
    }

    #[test]
    fn test_drain_timeout_leaves_rest_queued() {
        let queue = Arc::new(MessageQueue::new("in"));
        let registry = Arc::new(ListenerRegistry::new());
        registry.add(Recorder::new("slow", false, Duration::from_millis(100)));

        let worker =
            DispatchWorker::spawn("test-dispatch", Direction::Received, queue.clone(), registry).unwrap();
        for i in 0..20 {
            queue.push(EncodedMessage::new_received(format!("m{}", i)));
        }

        worker.terminate(Duration::from_millis(150));
        let processed = worker.processed() as usize;
        assert!(processed < 20);
        assert_eq!(processed + queue.len(), 20);
    }
}
