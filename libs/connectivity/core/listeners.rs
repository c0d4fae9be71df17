//! Listener registry shared between the client and its dispatch workers
//!
//! A listener lives in up to three collections: all, receive-interested and
//! send-interested. Membership is decided once, when the listener is added.
//! Dispatch workers never hold the lock while calling listeners; they take a
//! snapshot per message, so adding or removing listeners concurrently is safe.

use crate::core::encoded::Direction;
use crate::traits::MessageListener;
use parking_lot::RwLock;
use std::sync::Arc;

/// Listener handle shared by the registry and dispatch workers
pub type SharedListener = Arc<dyn MessageListener>;

#[derive(Default)]
struct Collections {
    all: Vec<SharedListener>,
    receive: Vec<SharedListener>,
    send: Vec<SharedListener>,
}

/// The three listener collections of a client
#[derive(Default)]
pub struct ListenerRegistry {
    inner: RwLock<Collections>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; its direction flags are read here and only here
    pub fn add(&self, listener: SharedListener) {
        let mut inner = self.inner.write();
        if listener.is_active_for_received() {
            inner.receive.push(Arc::clone(&listener));
        }
        if listener.is_active_for_sent() {
            inner.send.push(Arc::clone(&listener));
        }
        inner.all.push(listener);
    }

    /// Unregister a listener from every collection
    ///
    /// Returns `false` if it wasn't registered.
    pub fn remove(&self, listener: &SharedListener) -> bool {
        let mut inner = self.inner.write();
        let before = inner.all.len();
        inner.all.retain(|l| !same_listener(l, listener));
        inner.receive.retain(|l| !same_listener(l, listener));
        inner.send.retain(|l| !same_listener(l, listener));
        inner.all.len() != before
    }

    /// Find a registered listener by name
    pub fn find(&self, name: &str) -> Option<SharedListener> {
        self.inner.read().all.iter().find(|l| l.name() == name).cloned()
    }

    /// Snapshot of listeners interested in `direction`, in registration order
    pub fn snapshot(&self, direction: Direction) -> Vec<SharedListener> {
        let inner = self.inner.read();
        match direction {
            Direction::Received => inner.receive.clone(),
            Direction::Sent => inner.send.clone(),
        }
    }

    /// Snapshot of every registered listener
    pub fn all(&self) -> Vec<SharedListener> {
        self.inner.read().all.clone()
    }

    pub fn has_receive_listeners(&self) -> bool {
        !self.inner.read().receive.is_empty()
    }

    pub fn has_send_listeners(&self) -> bool {
        !self.inner.read().send.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.read().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().all.is_empty()
    }
}

fn same_listener(a: &SharedListener, b: &SharedListener) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoded::EncodedMessage;
    use crate::error::Result;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagListener {
        name: String,
        received: AtomicBool,
        sent: bool,
    }

    impl FlagListener {
        fn shared(name: &str, received: bool, sent: bool) -> SharedListener {
            Arc::new(Self {
                name: name.to_string(),
                received: AtomicBool::new(received),
                sent,
            })
        }
    }

    impl MessageListener for FlagListener {
        fn name(&self) -> &str {
            &self.name
        }
        fn listener_type(&self) -> &str {
            "Flag"
        }
        fn is_active_for_received(&self) -> bool {
            self.received.load(Ordering::Acquire)
        }
        fn is_active_for_sent(&self) -> bool {
            self.sent
        }
        fn on_message(&self, _message: &EncodedMessage) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_membership_follows_flags() {
        let registry = ListenerRegistry::new();
        registry.add(FlagListener::shared("recv", true, false));
        registry.add(FlagListener::shared("send", false, true));
        registry.add(FlagListener::shared("dual", true, true));
        registry.add(FlagListener::shared("none", false, false));

        let recv: Vec<String> = registry
            .snapshot(Direction::Received)
            .iter()
            .map(|l| l.name().to_string())
            .collect();
        let send: Vec<String> = registry
            .snapshot(Direction::Sent)
            .iter()
            .map(|l| l.name().to_string())
            .collect();

        assert_eq!(recv, vec!["recv", "dual"]);
        assert_eq!(send, vec!["send", "dual"]);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_membership_fixed_at_registration() {
        let registry = ListenerRegistry::new();
        let listener = Arc::new(FlagListener {
            name: "late".to_string(),
            received: AtomicBool::new(false),
            sent: false,
        });
        registry.add(listener.clone());

        listener.received.store(true, Ordering::Release);
        assert!(!registry.has_receive_listeners());
    }

    #[test]
    fn test_remove_from_all_collections() {
        let registry = ListenerRegistry::new();
        let dual = FlagListener::shared("dual", true, true);
        registry.add(dual.clone());
        registry.add(FlagListener::shared("other", true, false));

        assert!(registry.remove(&dual));
        assert!(!registry.remove(&dual));
        assert!(!registry.has_send_listeners());
        assert_eq!(registry.snapshot(Direction::Received).len(), 1);
        assert!(registry.find("dual").is_none());
        assert!(registry.find("other").is_some());
    }
}
