//! Client: one running connection to a counterparty
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────────────── Client ────────────────────────┐
//!  Transport ──read──> ReceiverWorker ──> inbound ──> DispatchWorker ──> receive listeners
//!      ^                                                                  │
//!      └──write── send_*() ──(copy, if send listeners)──> outbound ──> DispatchWorker ──> send listeners
//!                 └────────────────────────────────────────────────────────┘
//! ```
//!
//! A client is created per connection start and discarded by `dispose`; it is
//! never restarted in place. Sends are synchronous and serialized by the
//! transport lock. Listener notification of sent messages is asynchronous.

use crate::core::config::ConnectionSettings;
use crate::core::connection_state::{AtomicClientState, AtomicMetrics, ClientState};
use crate::core::dispatcher::DispatchWorker;
use crate::core::encoded::{Direction, EncodedMessage};
use crate::core::listeners::{ListenerRegistry, SharedListener};
use crate::core::message::Message;
use crate::core::queue::MessageQueue;
use crate::core::receiver::{ReceiverContext, ReceiverWorker};
use crate::core::unhandled::UnhandledMessageStore;
use crate::error::{ConnectivityError, Result};
use crate::traits::{Codec, SendOutcome, Transport};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error, info, trace, warn};

#[derive(Default)]
struct Workers {
    started: bool,
    receiver: Option<Arc<ReceiverWorker>>,
    received_dispatcher: Option<Arc<DispatchWorker>>,
    sent_dispatcher: Option<Arc<DispatchWorker>>,
}

/// Snapshot of a client's counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientMetrics {
    pub state: ClientState,
    pub sent: u64,
    pub raw_sent: u64,
    pub received: u64,
    pub send_failures: u64,
    pub decode_failures: u64,
    pub listener_failures: u64,
    pub inbound_len: usize,
    pub outbound_len: usize,
}

/// Running connection: transport, workers, queues and listeners
pub struct Client {
    name: String,
    /// Snapshot taken at construction
    settings: ConnectionSettings,
    /// Also the send monitor: one write at a time
    transport: Mutex<Box<dyn Transport>>,
    codec: Option<Arc<dyn Codec>>,
    state: Arc<AtomicClientState>,
    metrics: Arc<AtomicMetrics>,
    last_error: Arc<Mutex<Option<String>>>,
    listeners: Arc<ListenerRegistry>,
    store: UnhandledMessageStore,
    inbound: Arc<MessageQueue>,
    outbound: Mutex<Option<Arc<MessageQueue>>>,
    workers: Mutex<Workers>,
}

impl Client {
    /// Validate settings and open the transport
    ///
    /// # Errors
    /// * `ConnectivityError::Settings` - invalid settings; nothing was opened
    /// * `ConnectivityError::Connection` - the transport couldn't be opened;
    ///   whatever it partially opened has been closed
    pub fn new(
        settings: ConnectionSettings,
        mut transport: Box<dyn Transport>,
        codec: Option<Arc<dyn Codec>>,
    ) -> Result<Self> {
        settings.validate()?;
        let name = settings.name.clone();
        let store = UnhandledMessageStore::new(&settings.storage_dir, &name)?;
        let state = Arc::new(AtomicClientState::new(ClientState::Created));

        state.set(ClientState::Connecting);
        debug!("{}: connecting", name);
        if let Err(e) = transport.connect() {
            error!("{}: could not connect: {}", name, e);
            if let Err(close_err) = transport.close_connections() {
                warn!("{}: error while closing partially opened connection: {}", name, close_err);
            }
            return Err(match e {
                ConnectivityError::Connection(_) => e,
                other => ConnectivityError::Connection(other.to_string()),
            });
        }
        state.set(ClientState::Idle);
        info!("{}: connected", name);

        let inbound = Arc::new(MessageQueue::with_high_water_mark(
            format!("{} (Received)", name),
            settings.queue_high_water_mark,
        ));

        Ok(Self {
            name,
            settings,
            transport: Mutex::new(transport),
            codec,
            state,
            metrics: Arc::new(AtomicMetrics::new()),
            last_error: Arc::new(Mutex::new(None)),
            listeners: Arc::new(ListenerRegistry::new()),
            store,
            inbound,
            outbound: Mutex::new(None),
            workers: Mutex::new(Workers::default()),
        })
    }

    /// Start listeners (optionally), recover unhandled messages and workers
    ///
    /// # Errors
    /// * `ConnectivityError::InvalidState` - already started or disposed
    /// * a listener's start error; nothing else has been started and `start`
    ///   may be called again (listeners started before the failing one are
    ///   started a second time)
    /// * a failure to spawn a worker thread
    pub fn start(&self, start_listeners: bool) -> Result<()> {
        let mut workers = self.workers.lock();
        if workers.started || self.state.get() != ClientState::Idle {
            return Err(ConnectivityError::InvalidState(format!(
                "{}: client can't be started in state {}",
                self.name,
                self.state.get()
            )));
        }

        // A listener that fails to start leaves the client startable again
        if start_listeners {
            info!("{}: starting listeners", self.name);
            for listener in self.listeners.all() {
                trace!("{}: starting listener '{}' ({})", self.name, listener.name(), listener.listener_type());
                listener.start()?;
            }
        }
        workers.started = true;

        if self.store.exists() {
            self.store.restore_into(&self.inbound);
        }

        if self.listeners.has_receive_listeners() {
            let worker = DispatchWorker::spawn(
                format!("{} (Received processor)", self.name),
                Direction::Received,
                Arc::clone(&self.inbound),
                Arc::clone(&self.listeners),
            )?;
            workers.received_dispatcher = Some(Arc::new(worker));
        }

        if self.listeners.has_send_listeners() {
            let queue = Arc::new(MessageQueue::with_high_water_mark(
                format!("{} (Sent)", self.name),
                self.settings.queue_high_water_mark,
            ));
            let worker = DispatchWorker::spawn(
                format!("{} (Sent processor)", self.name),
                Direction::Sent,
                Arc::clone(&queue),
                Arc::clone(&self.listeners),
            )?;
            *self.outbound.lock() = Some(queue);
            workers.sent_dispatcher = Some(Arc::new(worker));
        }

        self.state.set(ClientState::Running);

        let source = {
            let mut transport = self.transport.lock();
            if self.settings.receive && transport.is_receive_capable() {
                Some(transport.create_receiver())
            } else {
                None
            }
        };

        match source {
            Some(Ok(source)) => {
                let worker = ReceiverWorker::spawn(ReceiverContext {
                    name: format!("{} (Receiver)", self.name),
                    source,
                    codec: self.codec.clone(),
                    queue: Arc::clone(&self.inbound),
                    metrics: Arc::clone(&self.metrics),
                    state: Arc::clone(&self.state),
                    last_error: Arc::clone(&self.last_error),
                    poll_interval: self.settings.poll_interval(),
                    read_delay: self.settings.read_delay(),
                    max_read_errors: self.settings.max_read_errors,
                });
                match worker {
                    Ok(worker) => workers.receiver = Some(Arc::new(worker)),
                    Err(e) => {
                        self.state.set(ClientState::Idle);
                        return Err(e);
                    }
                }
            }
            Some(Err(e)) => {
                error!("{}: could not create receiver: {}", self.name, e);
                *self.last_error.lock() = Some(e.to_string());
                self.state.set(ClientState::Idle);
                return Err(e);
            }
            None => debug!("{}: no receiver needed", self.name),
        }

        info!("{}: started", self.name);
        Ok(())
    }

    /// Stop workers, persist unhandled messages and close the transport
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    /// `ConnectivityError::Connection` if the transport failed to close; all
    /// other steps have still been performed.
    pub fn dispose(&self, dispose_listeners: bool) -> Result<()> {
        if self.state.get() == ClientState::Disposed {
            return Ok(());
        }
        info!("{}: disposing", self.name);

        let (receiver, received_dispatcher, sent_dispatcher) = {
            let workers = self.workers.lock();
            (
                workers.receiver.clone(),
                workers.received_dispatcher.clone(),
                workers.sent_dispatcher.clone(),
            )
        };

        if let Some(receiver) = receiver {
            receiver.terminate();
        }

        let drain_timeout = self.settings.dispatch_drain_timeout();
        if let Some(worker) = received_dispatcher {
            trace!("{}: disposing processor '{}'", self.name, worker.name());
            worker.terminate(drain_timeout);
        }
        if let Some(worker) = sent_dispatcher {
            trace!("{}: disposing processor '{}'", self.name, worker.name());
            worker.terminate(drain_timeout);
        }

        self.store.save(&self.inbound);

        if let Some(outbound) = self.outbound.lock().as_ref() {
            if !outbound.is_empty() {
                warn!(
                    "{}: {} sent message(s) not passed to send listeners",
                    self.name,
                    outbound.drain().len()
                );
            }
        }

        if dispose_listeners {
            info!("{}: disposing listeners", self.name);
            for listener in self.listeners.all() {
                listener.dispose();
            }
        }

        let closed = self.transport.lock().close_connections();
        self.state.set(ClientState::Disposed);

        match closed {
            Ok(()) => {
                info!("{}: disposed", self.name);
                Ok(())
            }
            Err(e) => {
                error!("{}: error while closing connection: {}", self.name, e);
                Err(match e {
                    ConnectivityError::Connection(_) => e,
                    other => ConnectivityError::Connection(other.to_string()),
                })
            }
        }
    }

    /// Write a raw payload
    pub fn send_payload(&self, payload: &str) -> Result<SendOutcome> {
        let outcome = self.write(|transport| transport.send_payload(payload))?;
        self.notify_send_listeners(|| EncodedMessage::new_sent(payload));
        Ok(outcome)
    }

    /// Write an encoded message, keeping its metadata fields for listeners
    pub fn send_encoded(&self, message: &EncodedMessage) -> Result<SendOutcome> {
        let outcome = self.write(|transport| transport.send_encoded(message))?;
        self.notify_send_listeners(|| message.to_sent_copy());
        Ok(outcome)
    }

    /// Encode `message` with the client's codec and write it
    ///
    /// # Errors
    /// `ConnectivityError::Encode` if there's no codec or encoding fails;
    /// nothing reaches the transport in that case.
    pub fn send_message(&self, message: &Message) -> Result<SendOutcome> {
        let codec = self.codec.as_ref().ok_or_else(|| {
            ConnectivityError::Encode(format!("{}: no codec configured", self.name))
        })?;
        let payload = codec.encode(message)?;
        let encoded = EncodedMessage::new_sent(payload).with_message(message.clone());
        self.send_encoded(&encoded)
    }

    fn write<F>(&self, op: F) -> Result<SendOutcome>
    where
        F: FnOnce(&mut Box<dyn Transport>) -> Result<SendOutcome>,
    {
        let state = self.state.get();
        if !state.is_connected() {
            return Err(ConnectivityError::InvalidState(format!(
                "{}: can't send in state {}",
                self.name, state
            )));
        }

        let result = {
            let mut transport = self.transport.lock();
            op(&mut *transport)
        };

        match result {
            Ok(outcome) => {
                self.metrics.increment_sent();
                Ok(outcome)
            }
            Err(e) => {
                self.metrics.increment_send_failures();
                warn!("{}: send failed: {}", self.name, e);
                Err(match e {
                    ConnectivityError::Send(_) => e,
                    other => ConnectivityError::Send(other.to_string()),
                })
            }
        }
    }

    fn notify_send_listeners<F>(&self, make: F)
    where
        F: FnOnce() -> EncodedMessage,
    {
        if !self.listeners.has_send_listeners() {
            return;
        }
        match self.outbound.lock().as_ref() {
            Some(queue) => queue.push(make()),
            None => trace!("{}: send listeners present but not started, skipping notification", self.name),
        }
    }

    /// Register a listener; its direction flags are read now
    pub fn add_message_listener(&self, listener: SharedListener) {
        trace!("{}: listener '{}' ({}) added", self.name, listener.name(), listener.listener_type());
        self.listeners.add(listener);
    }

    /// Dispose and unregister a listener
    pub fn remove_message_listener(&self, listener: &SharedListener) -> bool {
        listener.dispose();
        let removed = self.listeners.remove(listener);
        if removed {
            trace!("{}: listener '{}' ({}) removed", self.name, listener.name(), listener.listener_type());
        }
        removed
    }

    pub fn find_listener(&self, name: &str) -> Option<SharedListener> {
        self.listeners.find(name)
    }

    pub fn listeners(&self) -> Vec<SharedListener> {
        self.listeners.all()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    #[inline]
    pub fn state(&self) -> ClientState {
        self.state.get()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Start time of the receiver, if one was started
    pub fn started(&self) -> Option<DateTime<Utc>> {
        self.workers.lock().receiver.as_ref().map(|r| r.started())
    }

    /// Stop time of the receiver, if it has stopped
    pub fn stopped(&self) -> Option<DateTime<Utc>> {
        self.workers.lock().receiver.as_ref().and_then(|r| r.stopped())
    }

    /// Sent messages
    ///
    /// With send listeners a message counts once all of them have processed
    /// it; otherwise once the transport accepted it.
    pub fn sent(&self) -> u64 {
        match self.workers.lock().sent_dispatcher.as_ref() {
            Some(worker) => worker.processed(),
            None => self.metrics.raw_sent(),
        }
    }

    /// Messages accepted by the transport
    pub fn raw_sent(&self) -> u64 {
        self.metrics.raw_sent()
    }

    /// Received messages processed by all receive listeners
    pub fn received(&self) -> u64 {
        self.workers
            .lock()
            .received_dispatcher
            .as_ref()
            .map(|w| w.processed())
            .unwrap_or(0)
    }

    /// Error that stopped the receiver, if any
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.lock().as_ref().map(|q| q.len()).unwrap_or(0)
    }

    pub fn metrics(&self) -> ClientMetrics {
        let listener_failures: u64 = {
            let workers = self.workers.lock();
            workers
                .received_dispatcher
                .iter()
                .chain(workers.sent_dispatcher.iter())
                .map(|w| w.listener_failures())
                .sum()
        };

        ClientMetrics {
            state: self.state(),
            sent: self.sent(),
            raw_sent: self.metrics.raw_sent(),
            received: self.received(),
            send_failures: self.metrics.send_failures(),
            decode_failures: self.metrics.decode_failures(),
            listener_failures,
            inbound_len: self.inbound_len(),
            outbound_len: self.outbound_len(),
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if !self.state.is_disposed() {
            warn!("{}: dropped without dispose, disposing now", self.name);
            if let Err(e) = self.dispose(true) {
                error!("{}: dispose on drop failed: {}", self.name, e);
            }
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("state", &self.state.get())
            .field("listeners", &self.listeners.len())
            .field("inbound_len", &self.inbound_len())
            .finish()
    }
}
