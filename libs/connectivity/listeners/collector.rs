//! In-memory collector of received messages
//!
//! Settings are `key=value` pairs separated by `;`, keys case-insensitive:
//!
//! | key           | meaning                                               |
//! |---------------|-------------------------------------------------------|
//! | `type`        | keep only messages of this `MsgType`                  |
//! | `maxage`      | seconds after which a message is dropped              |
//! | `filename`    | record file whose received messages are preloaded     |
//! | `storefailed` | keep messages that couldn't be decoded (default true) |

use crate::core::encoded::EncodedMessage;
use crate::core::message::Message;
use crate::core::message_file::MessageFileReader;
use crate::error::{ConnectivityError, Result};
use crate::traits::{Codec, ListenerProperties, MessageListener, RawTextCodec};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Failed messages are dropped after this many seconds
const FAILED_MAX_AGE_SECS: i64 = 6 * 60 * 60;

/// Parsed collector settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectorSettings {
    pub type_filter: Option<String>,
    pub max_age: Option<chrono::Duration>,
    pub file_name: Option<PathBuf>,
    pub store_failed: bool,
}

impl CollectorSettings {
    /// Parse a `key=value;key=value` settings string
    pub fn parse(settings: &str) -> Result<Self> {
        let mut parsed = CollectorSettings {
            store_failed: true,
            ..Default::default()
        };

        for pair in settings.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ConnectivityError::Settings(format!("Collector setting '{}' is not in key=value form", pair))
            })?;
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "type" => {
                    parsed.type_filter = Some(value.to_string()).filter(|v| !v.is_empty());
                }
                "maxage" => {
                    let seconds: i64 = value.parse().map_err(|_| {
                        ConnectivityError::Settings(format!("Collector setting 'maxage' is not a number: '{}'", value))
                    })?;
                    if seconds <= 0 {
                        return Err(ConnectivityError::Settings(
                            "Collector setting 'maxage' must be greater than 0".to_string(),
                        ));
                    }
                    parsed.max_age = Some(chrono::Duration::seconds(seconds));
                }
                "filename" => {
                    parsed.file_name = Some(PathBuf::from(value)).filter(|p| !p.as_os_str().is_empty());
                }
                "storefailed" => {
                    parsed.store_failed = value.parse().map_err(|_| {
                        ConnectivityError::Settings(format!(
                            "Collector setting 'storefailed' must be true or false, got '{}'",
                            value
                        ))
                    })?;
                }
                other => warn!("Unknown collector setting '{}' ignored", other),
            }
        }

        Ok(parsed)
    }
}

/// A message kept by the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedMessage {
    pub id: u64,
    pub received: DateTime<Utc>,
    pub message: Message,
}

/// Wire text the collector couldn't decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedMessage {
    pub id: u64,
    pub received: DateTime<Utc>,
    pub payload: String,
}

#[derive(Default)]
struct Contents {
    next_id: u64,
    passed: VecDeque<CollectedMessage>,
    failed: VecDeque<FailedMessage>,
}

/// Receive listener that keeps messages for later lookup
pub struct CollectorListener {
    properties: ListenerProperties,
    codec: Option<Arc<dyn Codec>>,
    settings: CollectorSettings,
    contents: Mutex<Contents>,
}

impl CollectorListener {
    pub const TYPE: &'static str = "Collector";

    pub fn new(properties: ListenerProperties, codec: Option<Arc<dyn Codec>>, settings: &str) -> Result<Self> {
        let settings = CollectorSettings::parse(settings)?;
        Ok(Self {
            properties,
            codec,
            settings,
            contents: Mutex::new(Contents::default()),
        })
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    /// Collect one message; `message` is its decoded form when already known
    fn collect(&self, payload: &str, decoded: Option<&Message>, received: DateTime<Utc>) {
        let message = match decoded {
            Some(m) => Ok(m.clone()),
            None => match &self.codec {
                Some(codec) => codec.decode(payload, None),
                None => RawTextCodec.decode(payload, None),
            },
        };

        let mut contents = self.contents.lock();
        let id = contents.next_id;
        contents.next_id += 1;

        match message {
            Ok(message) => {
                if let Some(filter) = &self.settings.type_filter {
                    if message.msg_type() != Some(filter.as_str()) {
                        trace!("{}: message of type {:?} skipped", self.properties.name, message.msg_type());
                        return;
                    }
                }
                contents.passed.push_back(CollectedMessage { id, received, message });
            }
            Err(e) => {
                warn!("{}: error while decoding message: {}", self.properties.name, e);
                if self.settings.store_failed {
                    contents.failed.push_back(FailedMessage {
                        id,
                        received,
                        payload: payload.to_string(),
                    });
                }
            }
        }

        Self::prune(&mut contents, self.settings.max_age, Utc::now());
    }

    fn prune(contents: &mut Contents, max_age: Option<chrono::Duration>, now: DateTime<Utc>) {
        if let Some(max_age) = max_age {
            contents.passed.retain(|m| now - m.received <= max_age);
        }
        let failed_max_age = chrono::Duration::seconds(FAILED_MAX_AGE_SECS);
        contents.failed.retain(|m| now - m.received <= failed_max_age);
    }

    /// All collected messages, oldest first
    pub fn messages(&self) -> Vec<CollectedMessage> {
        let mut contents = self.contents.lock();
        Self::prune(&mut contents, self.settings.max_age, Utc::now());
        contents.passed.iter().cloned().collect()
    }

    /// Messages collected after the one with `id`
    pub fn messages_after(&self, id: u64) -> Vec<CollectedMessage> {
        self.messages().into_iter().filter(|m| m.id > id).collect()
    }

    pub fn message(&self, id: u64) -> Option<CollectedMessage> {
        self.contents.lock().passed.iter().find(|m| m.id == id).cloned()
    }

    pub fn failed(&self) -> Vec<FailedMessage> {
        self.contents.lock().failed.iter().cloned().collect()
    }

    /// Remove a message so later lookups don't see it again
    pub fn remove(&self, id: u64) -> bool {
        let mut contents = self.contents.lock();
        let before = contents.passed.len();
        contents.passed.retain(|m| m.id != id);
        contents.passed.len() != before
    }

    pub fn clear(&self) {
        let mut contents = self.contents.lock();
        contents.passed.clear();
        contents.failed.clear();
    }

    pub fn len(&self) -> usize {
        self.contents.lock().passed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.lock().passed.is_empty()
    }
}

impl MessageListener for CollectorListener {
    fn name(&self) -> &str {
        &self.properties.name
    }

    fn listener_type(&self) -> &str {
        &self.properties.listener_type
    }

    fn is_active_for_received(&self) -> bool {
        self.properties.active_for_received
    }

    /// Collectors only ever look at received traffic
    fn is_active_for_sent(&self) -> bool {
        false
    }

    fn start(&self) -> Result<()> {
        let Some(path) = &self.settings.file_name else {
            return Ok(());
        };
        if !path.is_file() {
            debug!("{}: no file '{}' to preload", self.properties.name, path.display());
            return Ok(());
        }

        let mut preloaded = 0;
        MessageFileReader::process_messages(path, |record| {
            if record.is_received() {
                self.collect(&record.payload, record.message.as_ref(), record.timestamp());
                preloaded += 1;
            }
        })?;
        debug!("{}: {} message(s) preloaded from '{}'", self.properties.name, preloaded, path.display());
        Ok(())
    }

    fn on_message(&self, message: &EncodedMessage) -> Result<()> {
        self.collect(&message.payload, message.message.as_ref(), message.timestamp());
        Ok(())
    }

    fn dispose(&self) {
        trace!("{}: collector disposed with {} message(s)", self.properties.name, self.len());
    }
}
