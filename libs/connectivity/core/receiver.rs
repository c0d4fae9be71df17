//! Receiver worker: transport read side -> inbound queue
//!
//! Reads one raw message at a time with a bounded timeout so the terminate
//! flag is observed between reads. Decode failures are logged and skipped.
//! A fatal transport error, or too many consecutive read errors, stops the
//! worker and takes the client out of `Running`.

use crate::core::connection_state::{AtomicClientState, AtomicMetrics, ClientState};
use crate::core::encoded::EncodedMessage;
use crate::core::queue::MessageQueue;
use crate::error::{ConnectivityError, Result};
use crate::traits::{Codec, MessageSource};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Granularity of interruptible sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Everything a receiver worker needs from its client
pub struct ReceiverContext {
    pub name: String,
    pub source: Box<dyn MessageSource>,
    pub codec: Option<Arc<dyn Codec>>,
    pub queue: Arc<MessageQueue>,
    pub metrics: Arc<AtomicMetrics>,
    pub state: Arc<AtomicClientState>,
    pub last_error: Arc<Mutex<Option<String>>>,
    pub poll_interval: Duration,
    pub read_delay: Duration,
    /// Consecutive recoverable errors tolerated; 0 means unlimited
    pub max_read_errors: u32,
}

/// Worker thread that feeds the inbound queue
pub struct ReceiverWorker {
    name: String,
    terminate: Arc<AtomicBool>,
    started: DateTime<Utc>,
    stopped: Arc<Mutex<Option<DateTime<Utc>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReceiverWorker {
    pub fn spawn(context: ReceiverContext) -> Result<Self> {
        let name = context.name.clone();
        let terminate = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(Mutex::new(None));
        let started = Utc::now();

        let handle = {
            let terminate = Arc::clone(&terminate);
            let stopped = Arc::clone(&stopped);
            std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    run(context, &terminate);
                    *stopped.lock() = Some(Utc::now());
                })?
        };

        info!("{}: receiver started", name);
        Ok(Self {
            name,
            terminate,
            started,
            stopped,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// When the worker thread exited, if it has
    pub fn stopped(&self) -> Option<DateTime<Utc>> {
        *self.stopped.lock()
    }

    pub fn is_alive(&self) -> bool {
        self.handle.lock().as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Signal the worker and wait until its thread has exited
    pub fn terminate(&self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        self.terminate.store(true, Ordering::Release);
        if handle.join().is_err() {
            error!("{}: receiver thread panicked", self.name);
        }
        debug!("{}: receiver terminated", self.name);
    }
}

impl Drop for ReceiverWorker {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn run(mut ctx: ReceiverContext, terminate: &AtomicBool) {
    let mut consecutive_errors: u32 = 0;

    while !terminate.load(Ordering::Acquire) {
        match ctx.source.read(ctx.poll_interval) {
            Ok(Some(raw)) => {
                consecutive_errors = 0;
                if let Some(message) = decode(&ctx, raw) {
                    ctx.queue.push(message);
                }
                if !ctx.read_delay.is_zero() {
                    sleep_unless_terminated(ctx.read_delay, terminate);
                }
            }
            Ok(None) => {
                trace!("{}: nothing to read", ctx.name);
            }
            Err(e) if e.is_fatal() => {
                stop_on_error(&ctx, e);
                return;
            }
            Err(e) => {
                consecutive_errors += 1;
                warn!(
                    "{}: error while reading message ({} in a row): {}",
                    ctx.name, consecutive_errors, e
                );
                if ctx.max_read_errors > 0 && consecutive_errors >= ctx.max_read_errors {
                    let reason = ConnectivityError::Connection(format!(
                        "{} consecutive read errors, last one: {}",
                        consecutive_errors, e
                    ));
                    stop_on_error(&ctx, reason);
                    return;
                }
                sleep_unless_terminated(ctx.poll_interval, terminate);
            }
        }
    }

    debug!("{}: receiver loop finished", ctx.name);
}

fn decode(ctx: &ReceiverContext, raw: String) -> Option<EncodedMessage> {
    let Some(codec) = &ctx.codec else {
        return Some(EncodedMessage::new_received(raw));
    };

    match codec.decode(&raw, None) {
        Ok(message) => Some(EncodedMessage::new_received(raw).with_message(message)),
        Err(e) => {
            ctx.metrics.increment_decode_failures();
            warn!("{}: could not decode message with codec '{}': {}", ctx.name, codec.name(), e);
            trace!("{}: undecodable message: {}", ctx.name, raw);
            None
        }
    }
}

fn stop_on_error(ctx: &ReceiverContext, e: ConnectivityError) {
    error!("{}: receiver stopped: {}", ctx.name, e);
    *ctx.last_error.lock() = Some(e.to_string());
    let _ = ctx.state.compare_exchange(ClientState::Running, ClientState::Idle);
}

fn sleep_unless_terminated(duration: Duration, terminate: &AtomicBool) {
    let deadline = Instant::now() + duration;
    loop {
        let now = Instant::now();
        if now >= deadline || terminate.load(Ordering::Acquire) {
            return;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}
