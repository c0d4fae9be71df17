//! # Connectivity
//!
//! Generic connection client for talking to external counterparties.
//!
//! ## Features
//!
//! - **Decoupled pipelines**: a receiver thread and one dispatch thread per direction, joined by unbounded crossbeam queues
//! - **Pluggable contracts**: transports, codecs and listeners are traits
//! - **Crash recovery**: received-but-unhandled messages are spilled to disk on dispose and replayed on the next start
//! - **Fixed-width codec**: dictionary-driven positional encoding with type auto-detection

pub mod traits;
pub mod core;
pub mod flat;
pub mod listeners;
pub mod transports;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    client::{Client, ClientMetrics},
    config::{ConnectionSettings, ListenerConfiguration},
    connection::{Connection, TransportFactory},
    connection_state::ClientState,
    encoded::{Direction, EncodedMessage, Metadata},
    listeners::SharedListener,
    message::{Message, MessageBuilder, MSG_TYPE, SUB_MSG_TYPE},
    message_file::{MessageFileReader, MessageFileWriter},
    queue::MessageQueue,
    unhandled::UnhandledMessageStore,
};

pub use flat::{FlatDictionary, FlatMessageCodec};
pub use listeners::{CollectorListener, FileListener, ListenerFactory};
pub use transports::{MemoryPeer, MemoryTransport};
