//! In-process transport backed by crossbeam channels
//!
//! ```text
//! MemoryPeer ──push()──> [inbound] ──> MemorySource (receiver worker)
//! MemoryPeer <──sent()── [outbound] <── MemoryTransport::send_payload
//! ```
//!
//! The peer outlives the transports it hands out, so a connection can be
//! restarted against the same peer. Faults can be switched on at any time.

use crate::error::{ConnectivityError, Result};
use crate::traits::{MessageSource, SendOutcome, Transport};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Switchable failure modes and call counters shared by a peer and its transports
#[derive(Debug, Default)]
pub struct MemoryFaults {
    pub fail_connect: AtomicBool,
    pub fail_send: AtomicBool,
    pub fail_close: AtomicBool,
    /// Readers report a fatal error
    pub reader_broken: AtomicBool,
    pub connects: AtomicU64,
    pub closes: AtomicU64,
}

/// Counterparty side of the in-memory link
pub struct MemoryPeer {
    inbound_tx: Sender<String>,
    inbound_rx: Receiver<String>,
    outbound_tx: Sender<String>,
    outbound_rx: Receiver<String>,
    receive_capable: bool,
    faults: Arc<MemoryFaults>,
    sequence: Arc<AtomicU64>,
}

impl MemoryPeer {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = unbounded();
        let (outbound_tx, outbound_rx) = unbounded();
        Self {
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx,
            receive_capable: true,
            faults: Arc::new(MemoryFaults::default()),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Peer whose transports have nothing to read from
    pub fn send_only() -> Self {
        Self {
            receive_capable: false,
            ..Self::new()
        }
    }

    /// A fresh, unconnected transport talking to this peer
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            inbound_rx: self.inbound_rx.clone(),
            outbound_tx: self.outbound_tx.clone(),
            receive_capable: self.receive_capable,
            connected: false,
            faults: Arc::clone(&self.faults),
            sequence: Arc::clone(&self.sequence),
        }
    }

    /// Make a message available to the client's receiver
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.inbound_tx.send(text.into());
    }

    /// Messages written by clients so far, oldest first; consumes them
    pub fn sent(&self) -> Vec<String> {
        self.outbound_rx.try_iter().collect()
    }

    /// Wait for the next message written by a client
    pub fn recv_sent(&self, timeout: Duration) -> Option<String> {
        self.outbound_rx.recv_timeout(timeout).ok()
    }

    /// Messages pushed but not read yet
    pub fn pending(&self) -> usize {
        self.inbound_rx.len()
    }

    pub fn faults(&self) -> &MemoryFaults {
        &self.faults
    }
}

impl Default for MemoryPeer {
    fn default() -> Self {
        Self::new()
    }
}

/// Client side of the in-memory link
pub struct MemoryTransport {
    inbound_rx: Receiver<String>,
    outbound_tx: Sender<String>,
    receive_capable: bool,
    connected: bool,
    faults: Arc<MemoryFaults>,
    sequence: Arc<AtomicU64>,
}

impl MemoryTransport {
    /// Transport plus the peer it talks to
    pub fn pair() -> (Self, MemoryPeer) {
        let peer = MemoryPeer::new();
        (peer.transport(), peer)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(ConnectivityError::Connection("memory transport is not connected".to_string()))
        }
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self) -> Result<()> {
        self.faults.connects.fetch_add(1, Ordering::Relaxed);
        if self.faults.fail_connect.load(Ordering::Acquire) {
            return Err(ConnectivityError::Connection("connection refused by peer".to_string()));
        }
        self.connected = true;
        debug!("Memory transport connected");
        Ok(())
    }

    fn close_connections(&mut self) -> Result<()> {
        self.faults.closes.fetch_add(1, Ordering::Relaxed);
        self.connected = false;
        if self.faults.fail_close.load(Ordering::Acquire) {
            return Err(ConnectivityError::Connection("peer did not acknowledge close".to_string()));
        }
        debug!("Memory transport closed");
        Ok(())
    }

    fn is_receive_capable(&self) -> bool {
        self.receive_capable
    }

    fn create_receiver(&mut self) -> Result<Box<dyn MessageSource>> {
        self.ensure_connected()?;
        Ok(Box::new(MemorySource {
            inbound_rx: self.inbound_rx.clone(),
            faults: Arc::clone(&self.faults),
        }))
    }

    fn send_payload(&mut self, payload: &str) -> Result<SendOutcome> {
        self.ensure_connected()?;
        if self.faults.fail_send.load(Ordering::Acquire) {
            return Err(ConnectivityError::Send("peer rejected message".to_string()));
        }
        self.outbound_tx
            .send(payload.to_string())
            .map_err(|e| ConnectivityError::Send(e.to_string()))?;

        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        trace!("Memory transport sent message #{}", sequence);
        Ok(SendOutcome::with_reference(sequence.to_string()))
    }
}

struct MemorySource {
    inbound_rx: Receiver<String>,
    faults: Arc<MemoryFaults>,
}

impl MessageSource for MemorySource {
    fn read(&mut self, timeout: Duration) -> Result<Option<String>> {
        if self.faults.reader_broken.load(Ordering::Acquire) {
            return Err(ConnectivityError::Connection("memory link broken".to_string()));
        }
        match self.inbound_rx.recv_timeout(timeout) {
            Ok(text) => Ok(Some(text)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ConnectivityError::Connection("memory peer is gone".to_string()))
            }
        }
    }
}
