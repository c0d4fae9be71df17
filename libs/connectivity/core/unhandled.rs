//! Spill/restore of messages that were received but never dispatched
//!
//! On dispose the client drains its inbound queue into
//! `{storage_dir}/{connection_name}.dat`. The next client of the same
//! connection reads that file back into its inbound queue on start, ahead of
//! anything newly received, and deletes it.
//!
//! Both directions are best-effort: failures are logged, never propagated.

use crate::core::message_file::{MessageFileReader, MessageFileWriter};
use crate::core::queue::MessageQueue;
use crate::error::{ConnectivityError, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File-backed store of unhandled messages for one connection
#[derive(Debug, Clone)]
pub struct UnhandledMessageStore {
    connection_name: String,
    path: PathBuf,
}

impl UnhandledMessageStore {
    /// Store for `connection_name` inside the connection-type directory
    ///
    /// # Errors
    /// `ConnectivityError::Settings` if the name is empty
    pub fn new(storage_dir: impl AsRef<Path>, connection_name: &str) -> Result<Self> {
        if connection_name.trim().is_empty() {
            return Err(ConnectivityError::Settings(
                "Connection name is not specified".to_string(),
            ));
        }
        Ok(Self {
            connection_name: connection_name.to_string(),
            path: Self::file_path(storage_dir, connection_name),
        })
    }

    /// Deterministic file location for a connection
    pub fn file_path(storage_dir: impl AsRef<Path>, connection_name: &str) -> PathBuf {
        storage_dir.as_ref().join(format!("{}.dat", connection_name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a previous run left unhandled messages behind
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Drain `queue` into the store file, preserving order
    ///
    /// The file is rewritten, never appended to: anything it held was put
    /// back into the queue on start. Returns the number of messages that
    /// reached the file.
    pub fn save(&self, queue: &MessageQueue) -> usize {
        if queue.is_empty() {
            return 0;
        }

        let pending = queue.drain();
        info!(
            "{}: {} message(s) remain unhandled, storing them to file '{}'",
            self.connection_name,
            pending.len(),
            self.path.display()
        );

        let mut writer = match MessageFileWriter::open(&self.path, false) {
            Ok(w) => w,
            Err(e) => {
                warn!(
                    "{}: could not store unhandled messages to file, {} message(s) lost: {}",
                    self.connection_name,
                    pending.len(),
                    e
                );
                return 0;
            }
        };

        for (index, message) in pending.iter().enumerate() {
            if let Err(e) = writer.write(message).and_then(|_| writer.flush()) {
                warn!(
                    "{}: could not store unhandled messages to file, {} message(s) lost: {}",
                    self.connection_name,
                    pending.len() - index,
                    e
                );
                return index;
            }
        }

        pending.len()
    }

    /// Load stored messages into `queue`, then delete the file
    ///
    /// Returns the number of messages restored. If the file can't be read to
    /// the end, the records before the bad one are still restored and the
    /// file is moved to [`Self::corrupt_path`] so they aren't delivered twice.
    pub fn restore_into(&self, queue: &MessageQueue) -> usize {
        info!(
            "{}: reading unhandled messages from file '{}'",
            self.connection_name,
            self.path.display()
        );

        let mut restored = 0;
        let result = MessageFileReader::process_messages(&self.path, |m| {
            queue.push(m);
            restored += 1;
        });

        match result {
            Ok(_) => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!(
                        "{}: could not remove file with unhandled messages after reading it: {}",
                        self.connection_name, e
                    );
                }
            }
            Err(e) => {
                let corrupt = self.corrupt_path();
                warn!(
                    "{}: error while reading unhandled messages, moving file to '{}': {}",
                    self.connection_name,
                    corrupt.display(),
                    e
                );
                if let Err(e) = std::fs::rename(&self.path, &corrupt) {
                    warn!(
                        "{}: could not move unreadable unhandled messages file: {}",
                        self.connection_name, e
                    );
                }
            }
        }

        info!("{}: {} unhandled message(s) read", self.connection_name, restored);
        restored
    }

    /// Where an unreadable store file is kept for inspection
    pub fn corrupt_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".corrupt");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::encoded::EncodedMessage;
    use tempfile::tempdir;

    #[test]
    fn test_empty_name_is_rejected() {
        let dir = tempdir().unwrap();
        let err = UnhandledMessageStore::new(dir.path(), "  ").unwrap_err();
        assert!(matches!(err, ConnectivityError::Settings(_)));
    }

    #[test]
    fn test_path_is_derived_from_name() {
        let path = UnhandledMessageStore::file_path("/var/conns/MQ", "Gateway");
        assert_eq!(path, PathBuf::from("/var/conns/MQ/Gateway.dat"));
    }

    #[test]
    fn test_save_and_restore_round_trip() {
        let dir = tempdir().unwrap();
        let store = UnhandledMessageStore::new(dir.path(), "Con").unwrap();

        let queue = MessageQueue::new("inbound");
        for p in ["a", "b", "c"] {
            queue.push(EncodedMessage::new_received(p));
        }

        assert_eq!(store.save(&queue), 3);
        assert!(queue.is_empty());
        assert!(store.exists());

        let fresh = MessageQueue::new("inbound");
        assert_eq!(store.restore_into(&fresh), 3);
        assert!(!store.exists());

        let payloads: Vec<String> = fresh.drain().into_iter().map(|m| m.payload).collect();
        assert_eq!(payloads, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_save_of_empty_queue_creates_no_file() {
        let dir = tempdir().unwrap();
        let store = UnhandledMessageStore::new(dir.path(), "Con").unwrap();
        assert_eq!(store.save(&MessageQueue::new("inbound")), 0);
        assert!(!store.exists());
    }

    #[test]
    fn test_unreadable_file_is_moved_aside() {
        let dir = tempdir().unwrap();
        let store = UnhandledMessageStore::new(dir.path(), "Con").unwrap();

        let good = serde_json::to_string(&EncodedMessage::new_received("a")).unwrap();
        std::fs::write(store.path(), format!("{}\ngarbage\n", good)).unwrap();

        let queue = MessageQueue::new("inbound");
        assert_eq!(store.restore_into(&queue), 1);
        assert!(!store.exists());
        assert!(store.corrupt_path().is_file());
        assert_eq!(queue.try_pop().map(|m| m.payload).as_deref(), Some("a"));
    }

    #[test]
    fn test_save_replaces_previous_content() {
        let dir = tempdir().unwrap();
        let store = UnhandledMessageStore::new(dir.path(), "Con").unwrap();
        std::fs::write(store.path(), "stale\n").unwrap();

        let queue = MessageQueue::new("inbound");
        queue.push(EncodedMessage::new_received("fresh"));
        assert_eq!(store.save(&queue), 1);

        let stored = MessageFileReader::read_all(store.path()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].payload, "fresh");
    }
}
