use crate::core::config::ListenerConfiguration;
use crate::core::listeners::SharedListener;
use crate::error::{ConnectivityError, Result};
use crate::listeners::{CollectorListener, FileListener};
use crate::traits::{Codec, ListenerProperties};
use std::sync::Arc;
use tracing::debug;

/// Builds listeners from their configuration
///
/// Collectors get the connection's codec so they can decode what the receiver
/// didn't.
#[derive(Clone, Default)]
pub struct ListenerFactory {
    codec: Option<Arc<dyn Codec>>,
}

impl ListenerFactory {
    pub fn new(codec: Option<Arc<dyn Codec>>) -> Self {
        Self { codec }
    }

    /// Create one listener
    ///
    /// # Errors
    /// `ConnectivityError::Settings` for an unknown type or bad settings
    pub fn create(&self, config: &ListenerConfiguration) -> Result<SharedListener> {
        let properties = ListenerProperties::new(
            config.name.clone(),
            config.listener_type.clone(),
            config.active_for_received,
            config.active_for_sent,
        );

        let listener: SharedListener = if config.listener_type.eq_ignore_ascii_case(FileListener::TYPE) {
            Arc::new(FileListener::new(properties, config.settings.trim())?)
        } else if config.listener_type.eq_ignore_ascii_case(CollectorListener::TYPE) {
            Arc::new(CollectorListener::new(properties, self.codec.clone(), &config.settings)?)
        } else {
            return Err(ConnectivityError::Settings(format!(
                "Listener '{}' has unknown type '{}'",
                config.name, config.listener_type
            )));
        };

        debug!("Listener '{}' ({}) created", config.name, config.listener_type);
        Ok(listener)
    }

    /// Create all listeners, failing on the first bad configuration
    pub fn create_all(&self, configs: &[ListenerConfiguration]) -> Result<Vec<SharedListener>> {
        configs.iter().map(|c| self.create(c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_builds_known_types() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("audit.dat");
        let factory = ListenerFactory::default();

        let listeners = factory
            .create_all(&[
                ListenerConfiguration::new("audit", "file", file.display().to_string()).with_directions(true, true),
                ListenerConfiguration::new("collector", "Collector", "maxage=60"),
            ])
            .unwrap();

        assert_eq!(listeners[0].name(), "audit");
        assert!(listeners[0].is_active_for_sent());
        assert_eq!(listeners[1].listener_type(), "Collector");
        assert!(!listeners[1].is_active_for_sent());
    }

    #[test]
    fn test_unknown_type_is_settings_error() {
        let err = ListenerFactory::default()
            .create(&ListenerConfiguration::new("x", "Database", ""))
            .err()
            .unwrap();
        assert!(matches!(err, ConnectivityError::Settings(_)));
    }
}
