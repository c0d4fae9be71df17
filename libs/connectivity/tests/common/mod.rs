//! Common test utilities for connectivity integration tests

#![allow(dead_code)]

use connectivity::{ConnectionSettings, ConnectivityError, EncodedMessage, MessageListener, Result};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const ORDER_DICTIONARY: &str = r#"
messages:
  - type: ORDER
    type_conditions: [{ value: "^[A-Z][0-9]" }]
    fields:
      - { name: ID, position: 1, length: 5, alignment: left }
      - { name: QTY, position: 6, length: 4, alignment: right }
"#;

/// Settings with a short poll interval so tests react quickly
pub fn settings(name: &str, storage_dir: &Path) -> ConnectionSettings {
    let mut settings = ConnectionSettings::new(name, storage_dir);
    settings.poll_interval_ms = 20;
    settings.dispatch_drain_timeout_ms = 2000;
    settings
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Listener that records what it sees
pub struct RecordingListener {
    name: String,
    received: bool,
    sent: bool,
    fail: bool,
    delay: Duration,
    seen: Mutex<Vec<EncodedMessage>>,
    pub started: AtomicBool,
    pub disposed: AtomicBool,
    /// Makes `start` fail while set
    pub fail_start: AtomicBool,
}

impl RecordingListener {
    pub fn new(name: &str, received: bool, sent: bool) -> Arc<Self> {
        Self::build(name, received, sent, false, Duration::ZERO)
    }

    /// Listener whose every `on_message` returns an error
    pub fn failing(name: &str) -> Arc<Self> {
        Self::build(name, true, true, true, Duration::ZERO)
    }

    /// Receive listener that takes `delay` per message
    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Self::build(name, true, false, false, delay)
    }

    fn build(name: &str, received: bool, sent: bool, fail: bool, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            received,
            sent,
            fail,
            delay,
            seen: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
        })
    }

    pub fn seen(&self) -> Vec<EncodedMessage> {
        self.seen.lock().clone()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.seen.lock().iter().map(|m| m.payload.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl MessageListener for RecordingListener {
    fn name(&self) -> &str {
        &self.name
    }

    fn listener_type(&self) -> &str {
        "Recording"
    }

    fn is_active_for_received(&self) -> bool {
        self.received
    }

    fn is_active_for_sent(&self) -> bool {
        self.sent
    }

    fn start(&self) -> Result<()> {
        if self.fail_start.load(Ordering::Acquire) {
            return Err(ConnectivityError::Listener {
                name: self.name.clone(),
                reason: "not ready".to_string(),
            });
        }
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn on_message(&self, message: &EncodedMessage) -> Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.seen.lock().push(message.clone());
        if self.fail {
            return Err(ConnectivityError::Listener {
                name: self.name.clone(),
                reason: "refusing message".to_string(),
            });
        }
        Ok(())
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}
