//! # Connectivity core
//!
//! Client lifecycle, worker threads, queues and persistence.
//!
//! ## Example
//!
//! ```rust,ignore
//! use connectivity::*;
//! use std::sync::Arc;
//!
//! let dictionary = Arc::new(FlatDictionary::load("config/dictionary.yaml")?);
//! let codec: Arc<dyn Codec> = Arc::new(FlatMessageCodec::new(dictionary));
//! let (transport, peer) = MemoryTransport::pair();
//!
//! let client = Client::new(ConnectionSettings::new("Gateway", "data/Memory"), Box::new(transport), Some(codec))?;
//! client.add_message_listener(Arc::new(CollectorListener::new(
//!     ListenerProperties::new("collector", CollectorListener::TYPE, true, false),
//!     None,
//!     "",
//! )?));
//! client.start(true)?;
//!
//! peer.push("A1      7");
//! client.send_message(&Message::builder().msg_type("ORDER").field("ID", "B2").build())?;
//!
//! client.dispose(true)?;
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod connection_state;
pub mod dispatcher;
pub mod encoded;
pub mod listeners;
pub mod message;
pub mod message_file;
pub mod queue;
pub mod receiver;
pub mod unhandled;

// Re-export main types
pub use client::{Client, ClientMetrics};
pub use config::{ConnectionSettings, ListenerConfiguration};
pub use connection::{Connection, TransportFactory};
pub use connection_state::{AtomicClientState, AtomicMetrics, ClientState};
pub use dispatcher::DispatchWorker;
pub use encoded::{Direction, EncodedMessage, Metadata};
pub use listeners::{ListenerRegistry, SharedListener};
pub use message::{Message, MessageBuilder, MSG_TYPE, SUB_MSG_TYPE};
pub use message_file::{MessageFileReader, MessageFileWriter};
pub use queue::MessageQueue;
pub use receiver::{ReceiverContext, ReceiverWorker};
pub use unhandled::UnhandledMessageStore;
