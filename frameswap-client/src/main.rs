//! frameswap client — entry point.
//!
//! ```text
//! frameswap-client                     Exchange frames with defaults
//! frameswap-client --config <path>     Use custom config TOML
//! frameswap-client --gen-config        Dump default config and exit
//! frameswap-client --max-ticks 600     Stop after 600 ticks
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::time::MissedTickBehavior;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use frameswap_core::{Capture, Completion, ExchangeController, HttpTransport, WireEncoding};

use frameswap_client::config::{ClientConfig, LoggingConfig};
use frameswap_client::sink::LoggingSink;
use frameswap_client::source::RippleSource;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "frameswap-client", about = "Exchange frames with a remote compute service")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "frameswap-client.toml")]
    config: PathBuf,

    /// Service host (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Service port (overrides config).
    #[arg(long)]
    port: Option<String>,

    /// Service path (overrides config).
    #[arg(long)]
    path: Option<String>,

    /// Request body encoding (overrides config).
    #[arg(short, long, value_enum)]
    encoding: Option<EncodingArg>,

    /// Stop after this many ticks.
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum EncodingArg {
    Json,
    Binary,
}

impl From<EncodingArg> for WireEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Json => WireEncoding::Json,
            EncodingArg::Binary => WireEncoding::Binary,
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let loaded = ClientConfig::load(&cli.config);

    // Init tracing before anything is logged, including the config outcome.
    let level = match &loaded {
        Ok(Some(config)) => config.logging.level.clone(),
        _ => LoggingConfig::default().level,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match loaded {
        Ok(Some(config)) => {
            info!("loaded config {}", cli.config.display());
            config
        }
        Ok(None) => {
            info!("no config at {}; using defaults", cli.config.display());
            ClientConfig::default()
        }
        Err(e) => {
            error!("{e}");
            return Err(e.into());
        }
    };
    if let Some(host) = cli.host {
        config.endpoint.host = host;
    }
    if let Some(port) = cli.port {
        config.endpoint.port = port;
    }
    if let Some(path) = cli.path {
        config.endpoint.path = path;
    }
    if let Some(encoding) = cli.encoding {
        config.exchange.encoding = encoding.into();
    }

    info!("frameswap-client v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Build the pipeline ───────────────────────────────────

    let transport = match config.request_timeout() {
        Some(timeout) => HttpTransport::with_timeout(timeout)?,
        None => HttpTransport::new()?,
    };
    let mut controller = ExchangeController::new(Arc::new(transport), config.settings());
    let mut source = RippleSource::new(
        config.source.width,
        config.source.height,
        config.source.layout,
    );
    let mut sink = LoggingSink::new();

    controller.start(&config.endpoint)?;

    // ── 2. Stats reporter ───────────────────────────────────────

    let mut stats_rx = controller.stats_receiver();
    let reporter = tokio::spawn(async move {
        let mut every = tokio::time::interval(Duration::from_secs(5));
        every.tick().await;
        loop {
            every.tick().await;
            if !stats_rx.has_changed().unwrap_or(false) {
                continue;
            }
            let stats = stats_rx.borrow_and_update().clone();
            info!(
                submitted = stats.submitted,
                applied = stats.applied,
                dropped = stats.dropped,
                skipped = stats.skipped,
                throughput_bps = stats.throughput_bps,
                rtt_ms = stats.smoothed_rtt.as_millis() as u64,
                "exchange stats"
            );
        }
    });

    // ── 3. Tick loop ────────────────────────────────────────────

    let mut interval = tokio::time::interval(config.tick_interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut ticks: u64 = 0;
    let mut outcome = Ok(());

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = controller.reply_ready() => {}
            _ = &mut ctrl_c => {
                info!("interrupted");
                break;
            }
        }

        match controller.tick(&mut source, &mut sink) {
            Ok(report) => {
                if let Some(Completion::Applied { sequence, width, height }) = report.completion {
                    tracing::debug!(sequence, width, height, "reply applied");
                }
                if let Some(Capture::Skipped(e)) = report.capture {
                    tracing::debug!("capture skipped: {e}");
                }
            }
            Err(e) => {
                error!("exchange stopped: {e}");
                outcome = Err(e);
                break;
            }
        }

        ticks += 1;
        if cli.max_ticks.is_some_and(|max| ticks >= max) {
            info!(ticks, "tick limit reached");
            break;
        }
    }

    // ── 4. Shutdown ─────────────────────────────────────────────

    controller.stop(&mut sink);
    reporter.abort();
    let stats = controller.stats();

    info!(
        ticks,
        submitted = stats.submitted,
        applied = stats.applied,
        dropped = stats.dropped,
        discarded = stats.discarded,
        bytes_sent = stats.bytes_sent,
        "frameswap-client stopped"
    );

    outcome.map_err(Into::into)
}
