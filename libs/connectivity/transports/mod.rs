//! Transport implementations shipped with the core

mod memory;

pub use memory::{MemoryFaults, MemoryPeer, MemoryTransport};
