//! pinwatch - Raspberry Pi digital input monitor binary.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use pinwatch::{
    gpio, monitor, start_web_server, MonitorConfig, MonitorEvent, ResolvedConfig, Snapshot,
    WebConfig, DEFAULT_CONFIG_PATH, DEFAULT_WEB_PORT,
};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "pinwatch")]
#[command(about = "Raspberry Pi GPIO input monitor with a live dashboard")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Monitor configuration file (JSON)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override the poll interval, in milliseconds
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Override the history retention, in hours
    #[arg(long)]
    retention_hours: Option<f64>,

    /// Override the number of HIGH intervals kept per pin
    #[arg(long)]
    max_samples: Option<usize>,

    /// Use simulated inputs instead of GPIO hardware
    #[arg(long)]
    simulate: bool,

    /// Drop pins that cannot be claimed instead of refusing to start
    #[arg(long)]
    skip_unavailable: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start monitoring and serve the dashboard (default)
    Serve(ServeArgs),

    /// Sample for a few ticks, print one snapshot and exit
    Snapshot(SnapshotArgs),

    /// Validate the configuration and print the pin table
    CheckConfig,
}

#[derive(Args)]
struct ServeArgs {
    /// Web server bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(short, long, default_value_t = DEFAULT_WEB_PORT)]
    port: u16,

    /// Static files directory with a custom index.html
    #[arg(long)]
    static_dir: Option<String>,

    /// Disable CORS headers
    #[arg(long)]
    no_cors: bool,

    /// Maximum WebSocket connections
    #[arg(long, default_value_t = 100)]
    max_connections: usize,
}

impl Default for ServeArgs {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_WEB_PORT,
            static_dir: None,
            no_cors: false,
            max_connections: 100,
        }
    }
}

#[derive(Args)]
struct SnapshotArgs {
    /// Output format: json or pretty
    #[arg(short, long, default_value = "pretty")]
    format: String,

    /// Number of ticks to sample before printing
    #[arg(short, long, default_value_t = 3)]
    ticks: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(&cli)?;

    match &cli.command {
        Some(Commands::Serve(args)) => serve_command(&cli, args).await,
        Some(Commands::Snapshot(args)) => snapshot_command(&cli, args).await,
        Some(Commands::CheckConfig) => check_config_command(&cli),
        None => serve_command(&cli, &ServeArgs::default()).await,
    }
}

fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // RUST_LOG still wins for targets it names
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(())
}

/// Load the config file and apply command-line overrides.
fn resolve_config(cli: &Cli) -> anyhow::Result<ResolvedConfig> {
    let mut config = MonitorConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    if let Some(ms) = cli.interval_ms {
        config = config.with_poll_interval(ms as f64 / 1000.0);
    }
    if let Some(hours) = cli.retention_hours {
        config = config.with_retention_hours(hours);
    }
    if let Some(max) = cli.max_samples {
        config = config.with_max_samples_per_pin(max);
    }

    Ok(config.resolve()?)
}

/// Resolve the config and open the sampler, applying the unavailable-pin policy.
fn prepare(cli: &Cli) -> anyhow::Result<(ResolvedConfig, gpio::OpenedSampler)> {
    let mut config = resolve_config(cli)?;
    let opened = gpio::open_sampler(&config.pin_ids(), cli.simulate)?;

    if !opened.unavailable.is_empty() {
        for (pin, reason) in &opened.unavailable {
            warn!("GPIO pin {} unavailable: {}", pin, reason);
        }
        if !cli.skip_unavailable {
            let pins: Vec<String> = opened.unavailable.iter().map(|(p, _)| p.to_string()).collect();
            bail!(
                "pins {} could not be claimed (use --skip-unavailable to monitor the rest)",
                pins.join(", ")
            );
        }
        let unavailable: Vec<_> = opened.unavailable.iter().map(|(p, _)| *p).collect();
        let available: Vec<_> = config
            .pin_ids()
            .into_iter()
            .filter(|id| !unavailable.contains(id))
            .collect();
        config.retain_pins(&available);
        if config.pins.is_empty() {
            bail!("no configured pins could be claimed");
        }
    }

    Ok((config, opened))
}

async fn serve_command(cli: &Cli, args: &ServeArgs) -> anyhow::Result<()> {
    print_banner();

    let (config, opened) = prepare(cli)?;
    info!(
        "Monitoring {} pins every {}ms",
        config.pins.len(),
        config.poll_interval.as_millis()
    );

    let (handle, task) = monitor::spawn(&config, opened.sampler);

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, stopping...");
            signal_handle.shutdown();
        }
    });

    let web_config = WebConfig::new(&args.host, args.port)
        .with_static_path(args.static_dir.clone())
        .with_cors(!args.no_cors)
        .with_max_websocket_connections(args.max_connections);

    info!("Web server configuration:");
    info!("  - Bind address: {}", web_config.bind_address());
    info!("  - CORS enabled: {}", web_config.enable_cors);
    info!("  - Max WebSocket connections: {}", web_config.max_websocket_connections);

    let served = start_web_server(web_config, handle.clone()).await;

    handle.shutdown();
    task.await.context("monitor task panicked")?;
    served?;

    info!("pinwatch stopped");
    Ok(())
}

async fn snapshot_command(cli: &Cli, args: &SnapshotArgs) -> anyhow::Result<()> {
    if !matches!(args.format.as_str(), "json" | "pretty") {
        bail!("Unsupported format: {}. Use 'json' or 'pretty'", args.format);
    }

    let (config, opened) = prepare(cli)?;
    let (monitor_loop, handle) = monitor::create(&config, opened.sampler);
    let mut subscription = handle.subscribe();
    let task = tokio::spawn(monitor_loop.run());

    let mut last = None;
    while let Some(event) = subscription.recv().await {
        if let MonitorEvent::Snapshot(snapshot) = event {
            let done = snapshot.tick >= args.ticks;
            last = Some(snapshot);
            if done {
                break;
            }
        }
    }

    handle.shutdown();
    task.await.context("monitor task panicked")?;

    let Some(snapshot) = last else {
        bail!("monitor stopped before producing a snapshot");
    };
    let snapshot = snapshot.with_history(handle.broadcaster().history(), 50);

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        _ => print_pretty_snapshot(&snapshot),
    }

    Ok(())
}

fn check_config_command(cli: &Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli)?;

    println!("Configuration OK ({})", cli.config.display());
    println!("  Poll interval: {} ms", config.poll_interval.as_millis());
    println!(
        "  History retention: {:.2} h, max {} samples per pin",
        config.retention.as_secs_f64() / 3600.0,
        config.max_samples_per_pin
    );
    println!("  Subscriber buffer: {} events", config.subscriber_buffer);
    println!(
        "  GPIO hardware support: {}",
        if gpio::hardware_supported() { "compiled in" } else { "not compiled" }
    );
    println!();
    println!("  {:>4}  Label", "Pin");
    for pin in &config.pins {
        println!("  {:>4}  {}", pin.id, pin.label);
    }

    Ok(())
}

fn print_banner() {
    println!("pinwatch - Raspberry Pi GPIO Monitor");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();
}

fn print_pretty_snapshot(snapshot: &Snapshot) {
    println!(
        "Pin Snapshot (tick {}, {})",
        snapshot.tick,
        snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("==========================================");
    println!(
        "  {:>4}  {:<16} {:<5} {:>11} {:>10}  Last change",
        "Pin", "Label", "Level", "Transitions", "High for"
    );

    for (id, view) in &snapshot.pins {
        let last = view
            .last_transition
            .map(|t| t.format("%H:%M:%S%.3f").to_string())
            .unwrap_or_else(|| "-".to_string());
        let level = match (view.state, view.stale) {
            (_, true) => "?",
            (true, false) => "HIGH",
            (false, false) => "LOW",
        };
        println!(
            "  {:>4}  {:<16} {:<5} {:>11} {:>9.1}s  {}",
            id, view.label, level, view.transitions, view.current_high_duration, last
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["pinwatch", "serve", "--port", "9090"]).unwrap();
        match cli.command {
            Some(Commands::Serve(args)) => assert_eq!(args.port, 9090),
            _ => panic!("expected serve command"),
        }
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::try_parse_from(["pinwatch"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(cli.interval_ms.is_none());
        assert!(!cli.simulate);
    }

    #[test]
    fn test_interval_override() {
        let cli = Cli::try_parse_from([
            "pinwatch",
            "--config",
            "/nonexistent/pinwatch.json",
            "--interval-ms",
            "250",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.poll_interval.as_millis(), 250);
    }

    #[test]
    fn test_history_overrides() {
        let cli = Cli::try_parse_from([
            "pinwatch",
            "--config",
            "/nonexistent/pinwatch.json",
            "--retention-hours",
            "2",
            "--max-samples",
            "10",
        ])
        .unwrap();
        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.retention.as_secs(), 7200);
        assert_eq!(config.max_samples_per_pin, 10);
    }

    #[test]
    fn test_zero_interval_is_fatal() {
        let cli = Cli::try_parse_from([
            "pinwatch",
            "--config",
            "/nonexistent/pinwatch.json",
            "-i",
            "0",
        ])
        .unwrap();
        assert!(resolve_config(&cli).is_err());
    }
}
