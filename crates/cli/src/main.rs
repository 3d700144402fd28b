mod serve;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Mutex;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use wastetrack_core::{normalize, CoordinateOutcome, RawCoordinates, TrackingConfig};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Waste item lifecycle and tracking service.
#[derive(Parser)]
#[command(
    name = "wastetrack",
    version,
    about = "Waste item lifecycle and tracking service"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Log filter directive (e.g. `info`, `wastetrack_core=debug`)
    #[arg(long, global = true, env = "WASTETRACK_LOG", default_value = "info")]
    log_level: String,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Path to the TOML configuration (defaults apply when omitted)
        #[arg(long, env = "WASTETRACK_CONFIG")]
        config: Option<PathBuf>,
        /// Path to TLS certificate file (PEM format). Requires --tls-key.
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key file (PEM format). Requires --tls-cert.
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// Normalize a coordinate submission the way the server would store it
    #[command(allow_negative_numbers = true)]
    Normalize {
        /// Submitted latitude
        latitude: Option<String>,
        /// Submitted longitude
        longitude: Option<String>,
        /// Device-reported latitude; preferred when both device values are set
        #[arg(long)]
        device_latitude: Option<String>,
        /// Device-reported longitude
        #[arg(long)]
        device_longitude: Option<String>,
        /// Path to the TOML configuration supplying the coverage box
        #[arg(long, env = "WASTETRACK_CONFIG")]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file and print the effective settings
    CheckConfig {
        /// Path to the TOML configuration (defaults apply when omitted)
        #[arg(long, env = "WASTETRACK_CONFIG")]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    if let Err(msg) = init_logging(&cli.log_level, cli.log_file.as_deref()) {
        report_error(&msg, cli.output, cli.quiet);
        process::exit(1);
    }

    match cli.command {
        Commands::Serve {
            port,
            config,
            tls_cert,
            tls_key,
        } => {
            // Validate TLS flags: both must be provided or neither
            if tls_cert.is_some() != tls_key.is_some() {
                report_error(
                    "error: --tls-cert and --tls-key must both be provided",
                    cli.output,
                    cli.quiet,
                );
                process::exit(1);
            }
            let config = load_config(config.as_deref(), cli.output, cli.quiet);
            let rt = match tokio::runtime::Runtime::new() {
                Ok(rt) => rt,
                Err(e) => {
                    report_error(
                        &format!("failed to create tokio runtime: {}", e),
                        cli.output,
                        cli.quiet,
                    );
                    process::exit(1);
                }
            };
            if let Err(e) = rt.block_on(serve::start_server(port, config, tls_cert, tls_key)) {
                report_error(&format!("Server error: {}", e), cli.output, cli.quiet);
                process::exit(1);
            }
        }
        Commands::Normalize {
            latitude,
            longitude,
            device_latitude,
            device_longitude,
            config,
        } => {
            let config = load_config(config.as_deref(), cli.output, cli.quiet);
            let raw = RawCoordinates {
                latitude,
                longitude,
                device_latitude,
                device_longitude,
            };
            cmd_normalize(&raw, &config, cli.output, cli.quiet);
        }
        Commands::CheckConfig { config } => {
            let config = load_config(config.as_deref(), cli.output, cli.quiet);
            cmd_check_config(&config, cli.output, cli.quiet);
        }
    }
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<(), String> {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| format!("error opening log file '{}': {}", path.display(), e))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
    Ok(())
}

fn load_config(path: Option<&Path>, output: OutputFormat, quiet: bool) -> TrackingConfig {
    let Some(path) = path else {
        return TrackingConfig::default();
    };
    match TrackingConfig::load(path) {
        Ok(config) => {
            tracing::debug!(path = %path.display(), "configuration loaded");
            config
        }
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

// ── Normalize subcommand ─────────────────────────────────────────────────────

fn cmd_normalize(raw: &RawCoordinates, config: &TrackingConfig, output: OutputFormat, quiet: bool) {
    let outcome = normalize(raw, &config.coverage.bbox);

    let (result, in_region) = match outcome {
        CoordinateOutcome::Absent => ("absent", None),
        CoordinateOutcome::Valid { in_region, .. } => ("valid", Some(in_region)),
        CoordinateOutcome::Swapped { latitude, longitude } => (
            "swapped",
            Some(config.coverage.bbox.contains(latitude, longitude)),
        ),
        CoordinateOutcome::Dropped => ("dropped", None),
    };
    let coordinates = outcome.coordinates();

    if !quiet {
        match output {
            OutputFormat::Text => match coordinates {
                Some((lat, lon)) => {
                    println!("{}: {}, {}", result, lat, lon);
                    if in_region == Some(false) {
                        println!("note: outside the coverage area");
                    }
                }
                None => println!("{}", result),
            },
            OutputFormat::Json => {
                let mut json = serde_json::json!({ "result": result });
                if let Some((lat, lon)) = coordinates {
                    json["latitude"] = serde_json::json!(lat);
                    json["longitude"] = serde_json::json!(lon);
                }
                if let Some(flag) = in_region {
                    json["in_region"] = serde_json::json!(flag);
                }
                if let Some(warning) = outcome.warning() {
                    json["warning"] = serde_json::json!(warning.message);
                }
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json).unwrap_or_default()
                );
            }
        }
        if output == OutputFormat::Text {
            if let Some(warning) = outcome.warning() {
                eprintln!("warning: {}", warning.message);
            }
        }
    }

    if coordinates.is_none() {
        process::exit(1);
    }
}

// ── CheckConfig subcommand ───────────────────────────────────────────────────

fn cmd_check_config(config: &TrackingConfig, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => {
            println!(
                "Configuration OK: {}, {} (UTC{:+}), {} barangay(s), {} collector(s)",
                config.coverage.municipality,
                config.coverage.province,
                config.timezone_offset_hours,
                config.barangays.len(),
                config.collectors.len()
            );
        }
        OutputFormat::Json => match serde_json::to_string_pretty(config) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                report_error(
                    &format!("error serializing configuration: {}", e),
                    output,
                    quiet,
                );
                process::exit(1);
            }
        },
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
