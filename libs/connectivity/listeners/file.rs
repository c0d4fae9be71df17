use crate::core::encoded::EncodedMessage;
use crate::core::message_file::MessageFileWriter;
use crate::error::{ConnectivityError, Result};
use crate::traits::{ListenerProperties, MessageListener};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, error, trace};

/// Appends every message it sees to a record file
///
/// The file uses the record format of `MessageFileWriter`, so it can be read
/// back with `MessageFileReader`. One lock serializes writes coming from the
/// received and sent dispatch workers.
pub struct FileListener {
    properties: ListenerProperties,
    path: PathBuf,
    writer: Mutex<Option<MessageFileWriter>>,
}

impl FileListener {
    pub const TYPE: &'static str = "File";

    /// Open `path` for appending
    ///
    /// # Errors
    /// * `ConnectivityError::Settings` - empty path
    /// * `ConnectivityError::Io` - the file can't be opened
    pub fn new(properties: ListenerProperties, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.as_os_str().is_empty() {
            return Err(ConnectivityError::Settings(format!(
                "Listener '{}': output file is not specified",
                properties.name
            )));
        }

        let writer = MessageFileWriter::open(&path, true)?;
        debug!("File '{}' opened for writing", path.display());

        Ok(Self {
            properties,
            path,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MessageListener for FileListener {
    fn name(&self) -> &str {
        &self.properties.name
    }

    fn listener_type(&self) -> &str {
        &self.properties.listener_type
    }

    fn is_active_for_received(&self) -> bool {
        self.properties.active_for_received
    }

    fn is_active_for_sent(&self) -> bool {
        self.properties.active_for_sent
    }

    /// Reopens the file if the listener was disposed before
    fn start(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        if writer.is_none() {
            *writer = Some(MessageFileWriter::open(&self.path, true)?);
            debug!("File '{}' reopened for writing", self.path.display());
        }
        Ok(())
    }

    fn on_message(&self, message: &EncodedMessage) -> Result<()> {
        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or_else(|| ConnectivityError::Listener {
            name: self.properties.name.clone(),
            reason: "file is closed".to_string(),
        })?;

        writer
            .write(message)
            .and_then(|_| writer.flush())
            .map_err(|e| ConnectivityError::Listener {
                name: self.properties.name.clone(),
                reason: format!("could not write message into file: {}", e),
            })?;
        trace!("{} message written to '{}'", message.direction(), self.path.display());
        Ok(())
    }

    fn dispose(&self) {
        if let Some(mut writer) = self.writer.lock().take() {
            if let Err(e) = writer.flush() {
                error!("Error while disposing file listener '{}': {}", self.properties.name, e);
            }
            trace!("File listener '{}' disposed", self.properties.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message_file::MessageFileReader;
    use tempfile::tempdir;

    fn properties() -> ListenerProperties {
        ListenerProperties::new("audit", FileListener::TYPE, true, true)
    }

    #[test]
    fn test_writes_both_directions_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.dat");
        let listener = FileListener::new(properties(), &path).unwrap();

        listener.on_message(&EncodedMessage::new_received("in")).unwrap();
        listener.on_message(&EncodedMessage::new_sent("out")).unwrap();
        listener.dispose();

        let records = MessageFileReader::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].is_received());
        assert_eq!(records[1].payload, "out");
    }

    #[test]
    fn test_disposed_listener_rejects_messages_until_restarted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.dat");
        let listener = FileListener::new(properties(), &path).unwrap();

        listener.dispose();
        assert!(listener.on_message(&EncodedMessage::new_received("lost")).is_err());

        listener.start().unwrap();
        listener.on_message(&EncodedMessage::new_received("kept")).unwrap();
        listener.dispose();

        let records = MessageFileReader::read_all(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, "kept");
    }

    #[test]
    fn test_empty_path_is_rejected() {
        assert!(matches!(
            FileListener::new(properties(), ""),
            Err(ConnectivityError::Settings(_))
        ));
    }
}
