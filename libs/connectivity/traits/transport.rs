use crate::core::encoded::EncodedMessage;
use crate::error::Result;
use std::time::Duration;

/// Result of one transport write
///
/// `reference` carries whatever identifier the counterparty hands back
/// (message id, sequence number), when the protocol has one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOutcome {
    pub reference: Option<String>,
}

impl SendOutcome {
    pub fn with_reference(reference: impl Into<String>) -> Self {
        Self {
            reference: Some(reference.into()),
        }
    }
}

/// Protocol-specific endpoint a client drives
///
/// The client owns its transport exclusively. The receive side is split off
/// through [`Transport::create_receiver`] so the receiver worker can block on
/// reads while callers send.
pub trait Transport: Send {
    /// Open the underlying connection
    ///
    /// # Errors
    /// `ConnectivityError::Connection` when the endpoint can't be opened
    fn connect(&mut self) -> Result<()>;

    /// Close everything `connect` opened; must tolerate partial opens
    fn close_connections(&mut self) -> Result<()>;

    /// Whether this transport has anything to read from
    fn is_receive_capable(&self) -> bool;

    /// Hand out the read side for the receiver worker
    fn create_receiver(&mut self) -> Result<Box<dyn MessageSource>>;

    /// Write one raw payload
    fn send_payload(&mut self, payload: &str) -> Result<SendOutcome>;

    /// Write one encoded message
    ///
    /// Transports that propagate metadata (headers, properties) override this.
    fn send_encoded(&mut self, message: &EncodedMessage) -> Result<SendOutcome> {
        self.send_payload(&message.payload)
    }
}

/// Read side of a transport
pub trait MessageSource: Send {
    /// Read one raw message, waiting at most `timeout`
    ///
    /// # Returns
    /// * `Ok(Some(text))` - a message arrived
    /// * `Ok(None)` - nothing arrived within the timeout
    /// * `Err(e)` - read failed; `e.is_fatal()` means the transport is gone
    fn read(&mut self, timeout: Duration) -> Result<Option<String>>;
}
