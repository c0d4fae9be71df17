//! Built-in listeners and the factory that builds them from configuration

mod collector;
mod factory;
mod file;

pub use collector::{CollectedMessage, CollectorListener, CollectorSettings, FailedMessage};
pub use factory::ListenerFactory;
pub use file::FileListener;
