use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tickstream::models::config::{DEFAULT_GROUP_ID, DEFAULT_PRODUCER_ALIAS, DEFAULT_SYMBOL, DEFAULT_TOPIC};
use tickstream::models::{ConsumerConfig, LogContext, ProducerConfig, Topology};
use tickstream::sink::{LogSink, Sink, SqliteSink};
use tickstream::{BrokerKind, Role};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "tickstream",
    about = "Role-selectable streaming agent - publishes synthetic stock ticks or relays them into a sink"
)]
struct Cli {
    /// Path to the two-host topology file (JSON, or TOML with a .toml extension)
    #[arg(short, long, global = true, default_value = "config/cluster.json")]
    config: String,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Broker transport
    #[arg(long, global = true, value_enum, default_value_t)]
    broker: BrokerKind,

    #[command(subcommand)]
    role: RoleCommand,
}

#[derive(Subcommand, Debug)]
enum RoleCommand {
    /// Publish a bounded, paced run of synthetic ticks
    Produce(ProduceArgs),
    /// Relay delivered ticks into the sink until interrupted
    Consume(ConsumeArgs),
}

#[derive(Args, Debug)]
struct ProduceArgs {
    /// Topic to publish to
    #[arg(long, default_value = DEFAULT_TOPIC)]
    topic: String,

    /// Label attached to every record
    #[arg(long, default_value = DEFAULT_PRODUCER_ALIAS)]
    producer_alias: String,

    /// Ticker symbol, also used as the message key
    #[arg(long, default_value = DEFAULT_SYMBOL)]
    symbol: String,

    /// Number of records to publish
    #[arg(short = 'n', long, default_value_t = 100)]
    num_messages: u64,

    /// Seconds to wait between records
    #[arg(short = 's', long, default_value_t = 1)]
    sleep_interval: u64,

    /// Starting price of the random walk
    #[arg(long, default_value_t = 100.0)]
    initial_price: f64,

    /// Seed for a reproducible price walk
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct ConsumeArgs {
    /// Topics to subscribe to
    #[arg(long = "topic", default_value = DEFAULT_TOPIC, num_args = 1..)]
    topics: Vec<String>,

    /// Consumer group whose committed offsets track acknowledgements
    #[arg(long, default_value = DEFAULT_GROUP_ID)]
    group_id: String,

    /// SQLite database the sink writes to
    #[arg(long, default_value = "data/ticks.db")]
    sink_db: String,

    /// Log records instead of storing them
    #[arg(long)]
    log_only: bool,

    /// Upper bound on a single poll
    #[arg(long, default_value_t = 500)]
    poll_timeout_ms: u64,

    /// Pause after a failed forward before polling again
    #[arg(long, default_value_t = 1000)]
    retry_backoff_ms: u64,
}

impl ProduceArgs {
    fn into_config(self) -> ProducerConfig {
        ProducerConfig {
            topic: self.topic,
            producer_alias: self.producer_alias,
            symbol: self.symbol,
            sleep_interval_seconds: self.sleep_interval,
            message_count: self.num_messages,
            initial_price: self.initial_price,
            seed: self.seed,
        }
    }
}

impl ConsumeArgs {
    fn open_sink(&self) -> Result<Arc<dyn Sink>> {
        if self.log_only {
            return Ok(Arc::new(LogSink));
        }
        if let Some(parent) = Path::new(&self.sink_db).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create sink directory: {}", parent.display())
                })?;
            }
        }
        let sink = SqliteSink::open(&self.sink_db)
            .with_context(|| format!("Failed to open sink DB: {}", self.sink_db))?;
        Ok(Arc::new(sink))
    }

    fn into_config(self) -> ConsumerConfig {
        ConsumerConfig {
            topics: self.topics,
            group_id: self.group_id,
            poll_timeout_ms: self.poll_timeout_ms,
            retry_backoff_ms: self.retry_backoff_ms,
        }
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let ctx = LogContext::driver();
    let topology = Topology::resolve(&cli.config, &ctx)
        .with_context(|| format!("Failed to resolve topology: {}", cli.config))?;

    let role = match cli.role {
        RoleCommand::Produce(args) => Role::Producer(args.into_config()),
        RoleCommand::Consume(args) => {
            let sink = args.open_sink()?;
            Role::Consumer {
                config: args.into_config(),
                sink,
            }
        }
    };

    if cli.broker == BrokerKind::Memory {
        tracing::warn!("Using the in-memory broker; records stay inside this process");
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal");
        trigger.cancel();
    });

    let summary = tickstream::run(role, &topology, cli.broker.connector(), &ctx, cancel)
        .await
        .context("Agent run failed")?;

    tracing::info!(
        state = ?summary.state,
        processed = summary.processed,
        failed = summary.failed,
        "Agent finished"
    );
    Ok(())
}
