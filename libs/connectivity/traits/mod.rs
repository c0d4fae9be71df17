//! # Connectivity Traits
//!
//! Contracts the connectivity core is composed from:
//!
//! - **Codec**: turn wire text into messages and back
//! - **Transport** / **MessageSource**: write and read one raw message
//! - **MessageListener**: observe a connection's traffic
//!
//! ## Example
//!
//! ```rust,ignore
//! use connectivity::*;
//!
//! struct PrintListener;
//!
//! impl MessageListener for PrintListener {
//!     fn name(&self) -> &str { "print" }
//!     fn listener_type(&self) -> &str { "Print" }
//!     fn is_active_for_received(&self) -> bool { true }
//!     fn is_active_for_sent(&self) -> bool { false }
//!     fn on_message(&self, message: &EncodedMessage) -> Result<()> {
//!         println!("{}", message.payload);
//!         Ok(())
//!     }
//! }
//! ```

pub mod codec;
pub mod error;
pub mod listener;
pub mod transport;

pub use codec::{Codec, RawTextCodec};
pub use error::{ConnectivityError, Result};
pub use listener::{ListenerProperties, MessageListener};
pub use transport::{MessageSource, SendOutcome, Transport};
