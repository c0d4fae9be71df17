//! Long-lived owner of a connection's clients
//!
//! A `Connection` keeps the editable settings, the codec and the way to build
//! a transport. Every `start` builds a fresh [`Client`] from a snapshot of
//! the settings; `stop` disposes it. Unhandled messages left by one client are
//! picked up by the next one through the connection's storage directory.

use crate::core::client::Client;
use crate::core::config::ConnectionSettings;
use crate::core::listeners::SharedListener;
use crate::error::{ConnectivityError, Result};
use crate::listeners::ListenerFactory;
use crate::traits::{Codec, Transport};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{info, warn};

/// Builds a new transport for each client
pub type TransportFactory = Box<dyn Fn(&ConnectionSettings) -> Result<Box<dyn Transport>> + Send + Sync>;

pub struct Connection {
    settings: RwLock<ConnectionSettings>,
    codec: Option<Arc<dyn Codec>>,
    transport_factory: TransportFactory,
    /// Listeners attached programmatically; re-attached on every start
    extra_listeners: RwLock<Vec<SharedListener>>,
    client: Mutex<Option<Arc<Client>>>,
}

impl Connection {
    pub fn new(settings: ConnectionSettings, transport_factory: TransportFactory) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings: RwLock::new(settings),
            codec: None,
            transport_factory,
            extra_listeners: RwLock::new(Vec::new()),
            client: Mutex::new(None),
        })
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn name(&self) -> String {
        self.settings.read().name.clone()
    }

    /// Copy of the live settings
    pub fn settings(&self) -> ConnectionSettings {
        self.settings.read().clone()
    }

    /// Edit the live settings; a running client keeps its own snapshot
    pub fn update_settings<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut ConnectionSettings),
    {
        let mut updated = self.settings();
        edit(&mut updated);
        updated.validate()?;
        *self.settings.write() = updated;
        Ok(())
    }

    /// Attach a listener to the running client (if any) and all future ones
    pub fn add_listener(&self, listener: SharedListener) {
        if let Some(client) = self.client() {
            client.add_message_listener(Arc::clone(&listener));
        }
        self.extra_listeners.write().push(listener);
    }

    /// Build, connect and start a new client
    ///
    /// # Errors
    /// * `ConnectivityError::InvalidState` - a client is already running
    /// * settings, listener, connection or start errors; a client that
    ///   connected but failed to start is disposed before returning
    pub fn start(&self) -> Result<Arc<Client>> {
        let mut slot = self.client.lock();
        if slot.is_some() {
            return Err(ConnectivityError::InvalidState(format!(
                "{}: connection is already running",
                self.name()
            )));
        }

        let settings = self.settings();
        let listeners = ListenerFactory::new(self.codec.clone()).create_all(&settings.listeners)?;
        let transport = (self.transport_factory)(&settings)?;
        let client = Client::new(settings, transport, self.codec.clone())?;

        for listener in listeners.into_iter().chain(self.extra_listeners.read().iter().cloned()) {
            client.add_message_listener(listener);
        }

        if let Err(e) = client.start(true) {
            warn!("{}: start failed, disposing client: {}", client.name(), e);
            if let Err(dispose_err) = client.dispose(true) {
                warn!("{}: error while disposing failed client: {}", client.name(), dispose_err);
            }
            return Err(e);
        }

        info!("{}: connection started", client.name());
        let client = Arc::new(client);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Dispose the running client, if any
    pub fn stop(&self) -> Result<()> {
        let Some(client) = self.client.lock().take() else {
            return Ok(());
        };
        let result = client.dispose(true);
        info!("{}: connection stopped", client.name());
        result
    }

    pub fn restart(&self) -> Result<Arc<Client>> {
        self.stop()?;
        self.start()
    }

    pub fn client(&self) -> Option<Arc<Client>> {
        self.client.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.client().map(|c| c.is_running()).unwrap_or(false)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Error while stopping connection on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transports::MemoryPeer;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn factory(peer: &Arc<MemoryPeer>) -> TransportFactory {
        let peer = Arc::clone(peer);
        Box::new(move |_settings| Ok(Box::new(peer.transport()) as Box<dyn Transport>))
    }

    #[test]
    fn test_start_stop_restart_builds_fresh_clients() {
        let dir = tempdir().unwrap();
        let peer = Arc::new(MemoryPeer::send_only());
        let connection = Connection::new(ConnectionSettings::new("Gateway", dir.path()), factory(&peer)).unwrap();

        let first = connection.start().unwrap();
        assert!(connection.is_running());
        assert!(connection.start().is_err());

        let second = connection.restart().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(first.state() == crate::core::connection_state::ClientState::Disposed);

        connection.stop().unwrap();
        assert!(!connection.is_running());
        assert_eq!(peer.faults().connects.load(Ordering::Relaxed), 2);
        assert_eq!(peer.faults().closes.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_settings_edits_do_not_reach_running_client() {
        let dir = tempdir().unwrap();
        let peer = Arc::new(MemoryPeer::send_only());
        let connection = Connection::new(ConnectionSettings::new("Gateway", dir.path()), factory(&peer)).unwrap();

        let client = connection.start().unwrap();
        connection.update_settings(|s| s.poll_interval_ms = 999).unwrap();

        assert_eq!(client.settings().poll_interval_ms, 250);
        assert_eq!(connection.settings().poll_interval_ms, 999);
        assert!(connection.update_settings(|s| s.name.clear()).is_err());
        connection.stop().unwrap();
    }

    #[test]
    fn test_unknown_listener_type_fails_before_connecting() {
        let dir = tempdir().unwrap();
        let peer = Arc::new(MemoryPeer::new());
        let mut settings = ConnectionSettings::new("Gateway", dir.path());
        settings
            .listeners
            .push(crate::core::config::ListenerConfiguration::new("db", "Database", ""));
        let connection = Connection::new(settings, factory(&peer)).unwrap();

        assert!(matches!(connection.start(), Err(ConnectivityError::Settings(_))));
        assert_eq!(peer.faults().connects.load(Ordering::Relaxed), 0);
    }
}
