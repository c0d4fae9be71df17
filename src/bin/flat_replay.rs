//! Replays a file of fixed-width records through a connection
//!
//! Every non-empty line of the input file is delivered to the client as if
//! the counterparty had sent it. Records are decoded with the dictionary from
//! `DICTIONARY_PATH` and dispatched to the listeners configured in
//! `CONNECTION_CONFIG_PATH`. With `--echo`, each record is also sent back
//! through the client so send listeners see it too.
//!
//! Usage: `flat_replay <records-file> [--echo] [--interval-ms N]`

use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use wirebench::bin_common::{
    init_logging_with_level, load_config_from_env, parse_args, BinaryRunner, ConfigType, RunConfig,
};
use wirebench::connectivity::{
    Client, Codec, Connection, ConnectionSettings, FlatDictionary, FlatMessageCodec, MemoryPeer, Transport, TransportFactory,
};

struct ReplayArgs {
    records: PathBuf,
    echo: bool,
    interval: Option<Duration>,
}

impl ReplayArgs {
    fn parse(args: Vec<String>) -> Result<Self> {
        let mut records = None;
        let mut echo = false;
        let mut interval = None;

        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--echo" => echo = true,
                "--interval-ms" => {
                    let value = iter.next().context("--interval-ms needs a value")?;
                    let millis: u64 = value
                        .parse()
                        .with_context(|| format!("Invalid --interval-ms value '{}'", value))?;
                    interval = Some(Duration::from_millis(millis));
                }
                other if other.starts_with("--") => bail!("Unknown option '{}'", other),
                other => records = Some(PathBuf::from(other)),
            }
        }

        Ok(Self {
            records: records.context("Usage: flat_replay <records-file> [--echo] [--interval-ms N]")?,
            echo,
            interval,
        })
    }
}

struct FlatReplay {
    config: RunConfig,
    connection: Connection,
    peer: Arc<MemoryPeer>,
    records: Vec<String>,
    echo: bool,
}

impl FlatReplay {
    fn new(settings: ConnectionSettings, codec: Arc<dyn Codec>, args: ReplayArgs) -> Result<Self> {
        let content = std::fs::read_to_string(&args.records)
            .with_context(|| format!("Failed to read records from {}", args.records.display()))?;
        let records: Vec<String> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();

        let peer = Arc::new(MemoryPeer::new());
        let factory: TransportFactory = {
            let peer = Arc::clone(&peer);
            Box::new(move |_settings| Ok(Box::new(peer.transport()) as Box<dyn Transport>))
        };

        let mut config = RunConfig::new(format!("Flat replay ({})", settings.name));
        if let Some(interval) = args.interval {
            config = config.with_replay_interval(interval);
        }

        let connection = Connection::new(settings, factory)
            .context("Invalid connection settings")?
            .with_codec(codec);

        Ok(Self {
            config,
            connection,
            peer,
            records,
            echo: args.echo,
        })
    }

    /// Wait until everything pushed has been read and dispatched
    async fn wait_for_drain(&self) {
        let heartbeat = Duration::from_secs(self.config.heartbeat_interval_secs);
        let mut last_beat = tokio::time::Instant::now();

        while let Some(client) = self.connection.client() {
            if !client.is_running() || is_drained(&client, self.peer.pending()) {
                break;
            }
            if last_beat.elapsed() >= heartbeat {
                info!("Heartbeat: {:?}", client.metrics());
                last_beat = tokio::time::Instant::now();
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

/// Whether the client has caught up with `pending` unread records
///
/// Without receive listeners nothing drains the inbound queue, so only the
/// reads count; the rest is persisted when the connection stops.
fn is_drained(client: &Client, pending: usize) -> bool {
    let dispatching = client.listeners().iter().any(|l| l.is_active_for_received());
    pending == 0 && (!dispatching || client.inbound_len() == 0)
}

impl BinaryRunner for FlatReplay {
    async fn run(&mut self) -> Result<String> {
        let started = Utc::now();
        let client = self.connection.start().context("Failed to start connection")?;
        info!(
            "Replaying {} records through {} listener(s)",
            self.records.len(),
            client.listeners().len()
        );

        let replay = async {
            for record in &self.records {
                self.peer.push(record.clone());
                if self.echo {
                    if let Err(e) = client.send_payload(record) {
                        warn!("Failed to echo record: {}", e);
                    }
                }
                if let Some(interval) = self.config.replay_interval {
                    tokio::time::sleep(interval).await;
                }
            }
            self.wait_for_drain().await;
        };

        tokio::select! {
            _ = replay => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping replay");
            }
        }

        let metrics = client.metrics();
        if let Some(error) = client.last_error() {
            warn!("Client reported an error: {}", error);
        }
        self.connection.stop().context("Failed to stop connection")?;

        let elapsed = Utc::now() - started;
        Ok(format!(
            "Replayed {} records in {}ms: received={} sent={} decode_failures={} listener_failures={}",
            self.records.len(),
            elapsed.num_milliseconds(),
            metrics.received,
            metrics.sent,
            metrics.decode_failures,
            metrics.listener_failures
        ))
    }

    fn config(&self) -> &RunConfig {
        &self.config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let settings_path = load_config_from_env(ConfigType::Connection);
    let settings = ConnectionSettings::load(&settings_path)
        .with_context(|| format!("Failed to load connection settings from {}", settings_path.display()))?;

    init_logging_with_level(&settings.log_level);

    let dictionary_path = load_config_from_env(ConfigType::Dictionary);
    let dictionary = FlatDictionary::load(&dictionary_path)
        .with_context(|| format!("Failed to load dictionary from {}", dictionary_path.display()))?;
    info!(
        "Loaded {} message types from {}",
        dictionary.len(),
        dictionary_path.display()
    );
    let codec: Arc<dyn Codec> = Arc::new(FlatMessageCodec::new(Arc::new(dictionary)));

    let args = ReplayArgs::parse(parse_args())?;
    let mut app = FlatReplay::new(settings, codec, args)?;
    app.execute().await
}
