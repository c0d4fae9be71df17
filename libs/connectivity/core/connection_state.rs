//! Lock-free client state and counters

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Lifecycle state of a client
///
/// ```text
/// Created -> Connecting -> Idle <-> Running
///                 |          |        |
///                 +----------+--------+--> Disposed
/// ```
///
/// `Idle` is connected but not running: either `start` hasn't been called yet,
/// or the receiver stopped on a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientState {
    Created = 0,
    Connecting = 1,
    Idle = 2,
    Running = 3,
    Disposed = 4,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ClientState::Created,
            1 => ClientState::Connecting,
            2 => ClientState::Idle,
            3 => ClientState::Running,
            _ => ClientState::Disposed,
        }
    }

    /// Connected means the transport is open, running or not
    pub fn is_connected(self) -> bool {
        matches!(self, ClientState::Idle | ClientState::Running)
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClientState::Created => "Created",
            ClientState::Connecting => "Connecting",
            ClientState::Idle => "Idle",
            ClientState::Running => "Running",
            ClientState::Disposed => "Disposed",
        };
        f.write_str(s)
    }
}

/// Atomic holder for [`ClientState`]
#[derive(Debug)]
pub struct AtomicClientState {
    inner: AtomicU8,
}

impl AtomicClientState {
    pub fn new(state: ClientState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> ClientState {
        ClientState::from_u8(self.inner.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ClientState) {
        self.inner.store(state as u8, Ordering::Release);
    }

    /// Move to `new` only if the current state is `current`
    pub fn compare_exchange(&self, current: ClientState, new: ClientState) -> Result<ClientState, ClientState> {
        self.inner
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(ClientState::from_u8)
            .map_err(ClientState::from_u8)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.get() == ClientState::Running
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.get() == ClientState::Disposed
    }
}

/// Monotonic counters of a client
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    raw_sent: AtomicU64,
    send_failures: AtomicU64,
    decode_failures: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.raw_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_send_failures(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_decode_failures(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Messages accepted by the transport
    #[inline]
    pub fn raw_sent(&self) -> u64 {
        self.raw_sent.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }
}
