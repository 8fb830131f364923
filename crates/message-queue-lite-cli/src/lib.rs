//! # Message Queue Lite CLI
//!
//! Developer tooling for the message-queue-lite engine.
//!
//! This module provides CLI commands for:
//! - Printing the resolved queue settings
//! - Running an in-process producer/consumer simulation against a queue

use clap::{Parser, Subcommand};
use message_queue_lite::{
    ConfigurationError, EntrySnapshot, MessageQueue, QueueError, QueueEventSink, QueueManager,
    QueueName, QueueSettings, QueueStatus,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

/// Queue used by the `simulate` command
pub const SIMULATION_QUEUE_NAME: &str = "simulation";

/// How long an idle simulated consumer waits before polling again
const CONSUMER_IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// How often the simulation checks whether every message has settled
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ============================================================================
// CLI Structure
// ============================================================================

/// mql - tools for the message-queue-lite in-process queue
#[derive(Parser)]
#[command(name = "mql")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect settings and simulate load for message-queue-lite")]
pub struct Cli {
    /// Configuration file path (YAML, TOML or JSON)
    #[arg(short, long, env = "MQL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Logging level, used when RUST_LOG is not set
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the resolved queue settings
    Config {
        /// Output format for the settings
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },

    /// Run producers and consumers against an in-process queue
    Simulate {
        /// Number of messages to enqueue
        #[arg(long, default_value = "100")]
        messages: usize,

        /// Number of concurrent consumer tasks
        #[arg(long, default_value = "4")]
        consumers: usize,

        /// Leave every N-th delivery unacknowledged (0 acknowledges all)
        #[arg(long, default_value = "0")]
        drop_every: usize,

        /// Give up after this many seconds
        #[arg(long, default_value = "60")]
        timeout_seconds: u64,

        /// Output format for the summary
        #[arg(short = 'f', long, default_value = "text")]
        format: OutputFormat,
    },
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
    /// TOML format
    Toml,
}

/// Output format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("Failed to render output: {message}")]
    Output { message: String },

    #[error("Failed to initialize logging: {message}")]
    Logging { message: String },
}

impl CliError {
    /// Process exit code for this error. Code 2 is left to clap for usage
    /// errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Queue(_) => 3,
            Self::InvalidArgument { .. } => 4,
            Self::Output { .. } => 5,
            Self::Logging { .. } => 6,
        }
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// Parameters of a `simulate` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationOptions {
    pub messages: usize,
    pub consumers: usize,
    pub drop_every: usize,
    pub timeout: Duration,
}

impl SimulationOptions {
    /// Check the options describe a runnable simulation
    pub fn validate(&self) -> Result<(), CliError> {
        if self.messages == 0 {
            return Err(CliError::InvalidArgument {
                arg: "messages".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.consumers == 0 {
            return Err(CliError::InvalidArgument {
                arg: "consumers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.timeout.is_zero() {
            return Err(CliError::InvalidArgument {
                arg: "timeout-seconds".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Outcome of a `simulate` run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub messages: usize,
    pub deliveries: usize,
    pub acknowledged: usize,
    pub lease_expired: usize,
    pub discarded: usize,
    pub timed_out: bool,
    pub elapsed_ms: u64,
    pub final_status: QueueStatus,
}

/// Event sink counting lifecycle notifications
#[derive(Debug, Default)]
struct SimulationCounters {
    acknowledged: AtomicUsize,
    lease_expired: AtomicUsize,
    discarded: AtomicUsize,
}

impl SimulationCounters {
    /// Messages that will never be delivered again
    fn settled(&self) -> usize {
        self.acknowledged.load(Ordering::Acquire) + self.discarded.load(Ordering::Acquire)
    }
}

impl QueueEventSink for SimulationCounters {
    fn on_acknowledged(&self, _queue: &QueueName, _entry: &EntrySnapshot) {
        self.acknowledged.fetch_add(1, Ordering::AcqRel);
    }

    fn on_lease_expired(&self, _queue: &QueueName, _entry: &EntrySnapshot) {
        self.lease_expired.fetch_add(1, Ordering::AcqRel);
    }

    fn on_discarded(&self, _queue: &QueueName, _entry: &EntrySnapshot) {
        self.discarded.fetch_add(1, Ordering::AcqRel);
    }
}

async fn run_consumer(
    queue: Arc<MessageQueue>,
    deliveries: Arc<AtomicUsize>,
    drop_every: usize,
    stop: Arc<AtomicBool>,
) {
    while !stop.load(Ordering::Acquire) {
        let Some(envelope) = queue.dequeue() else {
            tokio::time::sleep(CONSUMER_IDLE_BACKOFF).await;
            continue;
        };

        let delivery = deliveries.fetch_add(1, Ordering::AcqRel) + 1;
        if drop_every > 0 && delivery % drop_every == 0 {
            debug!(
                delivery_tag = %envelope.delivery_tag,
                retry_count = envelope.retry_count,
                "Simulated consumer dropped delivery"
            );
        } else {
            queue.acknowledge(envelope.delivery_tag);
        }

        tokio::task::yield_now().await;
    }
}

/// Enqueue `options.messages` payloads and consume them with
/// `options.consumers` tasks until every message is acknowledged or
/// discarded, or the timeout elapses.
pub async fn run_simulation(
    settings: QueueSettings,
    options: SimulationOptions,
) -> Result<SimulationReport, CliError> {
    options.validate()?;

    let manager = QueueManager::new(settings);
    let name = QueueName::new(SIMULATION_QUEUE_NAME.to_string()).map_err(QueueError::from)?;
    let queue = manager.create_queue(name, None)?;

    let counters = Arc::new(SimulationCounters::default());
    queue.subscribe(counters.clone());

    for index in 0..options.messages {
        queue.enqueue(format!("message-{}", index).into_bytes())?;
    }

    info!(
        messages = options.messages,
        consumers = options.consumers,
        drop_every = options.drop_every,
        "Simulation started"
    );

    let started = Instant::now();
    let deadline = started + options.timeout;
    let stop = Arc::new(AtomicBool::new(false));
    let deliveries = Arc::new(AtomicUsize::new(0));

    let consumers: Vec<_> = (0..options.consumers)
        .map(|_| {
            tokio::spawn(run_consumer(
                Arc::clone(&queue),
                Arc::clone(&deliveries),
                options.drop_every,
                Arc::clone(&stop),
            ))
        })
        .collect();

    let timed_out = loop {
        if counters.settled() >= options.messages {
            break false;
        }
        if Instant::now() >= deadline {
            break true;
        }
        tokio::time::sleep(PROGRESS_POLL_INTERVAL).await;
    };

    stop.store(true, Ordering::Release);
    for consumer in consumers {
        if let Err(e) = consumer.await {
            warn!(error = %e, "Simulated consumer task failed");
        }
    }

    // Release acknowledged entries so the final counts show only live messages.
    queue.run_lease_monitor_pass();

    let report = SimulationReport {
        messages: options.messages,
        deliveries: deliveries.load(Ordering::Acquire),
        acknowledged: counters.acknowledged.load(Ordering::Acquire),
        lease_expired: counters.lease_expired.load(Ordering::Acquire),
        discarded: counters.discarded.load(Ordering::Acquire),
        timed_out,
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        final_status: queue.status(),
    };

    manager.shutdown().await;

    if timed_out {
        warn!(
            settled = report.acknowledged + report.discarded,
            messages = report.messages,
            "Simulation timed out before every message settled"
        );
    } else {
        info!(elapsed_ms = report.elapsed_ms, "Simulation completed");
    }

    Ok(report)
}

// ============================================================================
// Rendering
// ============================================================================

/// Render settings in the requested configuration format
pub fn render_settings(settings: &QueueSettings, format: &ConfigFormat) -> Result<String, CliError> {
    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(settings).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::to_string_pretty(settings).map_err(|e| e.to_string()),
        ConfigFormat::Toml => toml::to_string(settings).map_err(|e| e.to_string()),
    };

    rendered.map_err(|message| CliError::Output { message })
}

/// Render a simulation summary
pub fn render_report(report: &SimulationReport, format: &OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).map_err(|e| CliError::Output {
                message: e.to_string(),
            })
        }
        OutputFormat::Text => Ok(format!(
            "Simulation summary for queue '{}'\n\
             messages:      {}\n\
             deliveries:    {}\n\
             acknowledged:  {}\n\
             lease expired: {}\n\
             discarded:     {}\n\
             timed out:     {}\n\
             elapsed:       {} ms\n\
             ready:         {}\n\
             in flight:     {}",
            report.final_status.queue_name,
            report.messages,
            report.deliveries,
            report.acknowledged,
            report.lease_expired,
            report.discarded,
            report.timed_out,
            report.elapsed_ms,
            report.final_status.ready_count,
            report.final_status.in_flight_count,
        )),
    }
}

// ============================================================================
// Command Execution
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli.log_level, cli.json_logs)?;

    let settings = QueueSettings::load(cli.config.as_deref())?;
    debug!(?settings, "Settings resolved");

    match cli.command {
        Commands::Config { format } => {
            println!("{}", render_settings(&settings, &format)?);
            Ok(())
        }
        Commands::Simulate {
            messages,
            consumers,
            drop_every,
            timeout_seconds,
            format,
        } => {
            let options = SimulationOptions {
                messages,
                consumers,
                drop_every,
                timeout: Duration::from_secs(timeout_seconds),
            };
            let report = run_simulation(settings, options).await?;
            println!("{}", render_report(&report, &format)?);
            Ok(())
        }
    }
}

/// Initialize logging to stderr so command output on stdout stays parseable
pub fn initialize_logging(log_level: &str, json_logs: bool) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?;

    let json_layer = json_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer =
        (!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| CliError::Logging {
            message: e.to_string(),
        })
}
