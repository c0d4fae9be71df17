use crate::core::encoded::EncodedMessage;
use crate::error::Result;

/// Observer of a connection's traffic
///
/// A listener is registered with a client and receives every message of the
/// directions it is interested in. Interest is read once, at registration.
///
/// Listeners are shared between the received and sent dispatch workers, so
/// `on_message` takes `&self` and may be called from two threads at once.
pub trait MessageListener: Send + Sync {
    fn name(&self) -> &str;

    /// Listener kind, e.g. "File" or "Collector"
    fn listener_type(&self) -> &str;

    fn is_active_for_received(&self) -> bool;

    fn is_active_for_sent(&self) -> bool;

    /// Arm the listener; called before any message can reach it
    fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Handle one message
    ///
    /// # Errors
    /// Errors are logged by the dispatch worker, which then moves on to the
    /// next listener.
    fn on_message(&self, message: &EncodedMessage) -> Result<()>;

    /// Release resources; no messages arrive after this
    fn dispose(&self) {}
}

/// Common listener identity and direction flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerProperties {
    pub name: String,
    pub listener_type: String,
    pub active_for_received: bool,
    pub active_for_sent: bool,
}

impl ListenerProperties {
    pub fn new(
        name: impl Into<String>,
        listener_type: impl Into<String>,
        active_for_received: bool,
        active_for_sent: bool,
    ) -> Self {
        Self {
            name: name.into(),
            listener_type: listener_type.into(),
            active_for_received,
            active_for_sent,
        }
    }
}
