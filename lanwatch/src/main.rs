use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dns_capture::{AddressOnly, HostnameResolver, NmapReverseLookup};
use inventory_json::JsonFileStore;
use lanwatch_core::{timefmt, HostRecord, InventoryStore};
use nmap_scan::NmapScanner;
use presence::{CycleOutcome, Monitor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::{CaptureOverrides, CaptureSettings, MonitorOverrides, MonitorSettings};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json, Csv }

#[derive(Debug, Parser)]
#[command(name = "lanwatch", version, about = "LAN presence and DNS activity monitor")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./lanwatch.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log filter (e.g. info, debug, lanwatch=trace). Defaults to RUST_LOG, then info.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Scan the network on a fixed interval and keep the host inventory up to date
    Monitor {
        /// CIDR block or address to scan (default: 192.168.1.0/24)
        #[arg(long)]
        target: Option<String>,
        /// Ports: comma/range list (e.g., 22,80,443 or 1-1024,8080). Default: 22,80,443
        #[arg(long)]
        ports: Option<String>,
        /// Seconds to wait between scans (default: 60)
        #[arg(long)]
        interval_secs: Option<u64>,
        /// Inventory file (default: NmapLog.json)
        #[arg(long, value_name = "FILE")]
        inventory: Option<PathBuf>,
        /// Skip OS detection. OS detection (-O) needs root: use this or --sudo when not running as root
        #[arg(long, default_value_t = false)]
        no_os: bool,
        /// Run nmap through sudo (needed for OS detection unless already root)
        #[arg(long, default_value_t = false)]
        sudo: bool,
        /// Run a single cycle and exit
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Capture DNS queries with tshark and append them to a JSON-lines log
    Capture {
        /// Capture interface (default: wlo1)
        #[arg(long)]
        interface: Option<String>,
        /// Capture log file, appended to (default: DnsLog.json)
        #[arg(long, value_name = "FILE")]
        log: Option<PathBuf>,
        /// Record the source address instead of looking up host names
        #[arg(long, default_value_t = false)]
        no_resolve: bool,
        /// Run tshark through sudo
        #[arg(long, default_value_t = false)]
        sudo: bool,
    },
    /// Print the stored host inventory
    Inventory {
        /// Inventory file (default: NmapLog.json)
        #[arg(long, value_name = "FILE")]
        inventory: Option<PathBuf>,
        /// Only show hosts that are currently connected
        #[arg(long, default_value_t = false)]
        connected: bool,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(l) => EnvFilter::try_new(l)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {}", e))
}

/// Cancel the returned token on Ctrl-C.
fn shutdown_on_ctrl_c(rt: &tokio::runtime::Runtime) -> CancellationToken {
    let token = CancellationToken::new();
    let t = token.clone();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        t.cancel();
    });
    token
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded_cfg = config::load_config(cli.config.as_deref())?;
    let level = cli.log_level.clone().or_else(|| loaded_cfg.as_ref().and_then(|c| c.log_level.clone()));
    init_logging(level.as_deref())?;

    match cli.command {
        Commands::Version => {
            println!("lanwatch {} (core {})", env!("CARGO_PKG_VERSION"), lanwatch_core::version());
        }
        Commands::Monitor { target, ports, interval_secs, inventory, no_os, sudo, once } => {
            let overrides = MonitorOverrides { target, ports, interval_secs, inventory, no_os, sudo };
            let settings = MonitorSettings::resolve(overrides, loaded_cfg.as_ref().and_then(|c| c.monitor.as_ref()))?;
            info!(
                target = %settings.nmap.target,
                ports = %nmap_scan::ports_arg(&settings.nmap.ports),
                inventory = %settings.inventory.display(),
                "starting monitor"
            );
            let scanner = NmapScanner::new(settings.nmap)?;
            let store = JsonFileStore::new(settings.inventory);
            let mut monitor = Monitor::start(scanner, store, settings.interval)?;

            let rt = tokio::runtime::Runtime::new()?;
            if once {
                if let CycleOutcome::Skipped(e) = rt.block_on(monitor.run_cycle()) {
                    return Err(e.into());
                }
            } else {
                let shutdown = shutdown_on_ctrl_c(&rt);
                rt.block_on(monitor.run(shutdown));
            }
        }
        Commands::Capture { interface, log, no_resolve, sudo } => {
            let overrides = CaptureOverrides { interface, log, no_resolve, sudo };
            let settings = CaptureSettings::resolve(overrides, loaded_cfg.as_ref().and_then(|c| c.capture.as_ref()));
            let resolver: Arc<dyn HostnameResolver> = if settings.resolve_hostnames {
                Arc::new(NmapReverseLookup::default())
            } else {
                Arc::new(AddressOnly)
            };
            let rt = tokio::runtime::Runtime::new()?;
            let shutdown = shutdown_on_ctrl_c(&rt);
            let summary = rt.block_on(dns_capture::run_capture(&settings.tshark, resolver, &settings.log, shutdown))?;
            info!(written = summary.written, malformed = summary.pumped.malformed, "capture done");
        }
        Commands::Inventory { inventory, connected, format } => {
            let path = inventory
                .or_else(|| loaded_cfg.as_ref().and_then(|c| c.monitor.as_ref()).and_then(|m| m.inventory_path.clone()))
                .unwrap_or_else(|| PathBuf::from(config::DEFAULT_INVENTORY));
            let records: Vec<HostRecord> = JsonFileStore::new(&path)
                .load()?
                .into_iter()
                .filter(|r| !connected || r.is_connected())
                .collect();
            if records.is_empty() {
                warn!(path = %path.display(), "inventory is empty");
            }
            print_inventory(&records, format)?;
        }
    }
    Ok(())
}

fn print_inventory(records: &[HostRecord], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for r in records {
                let state = if r.is_connected() { "up" } else { "down" };
                let os = if r.os_fingerprint.is_empty() { "-" } else { r.os_fingerprint.as_str() };
                println!(
                    "{:<4} {:<16} {:<24} ports={:<12} os={} first={} last={}",
                    state,
                    r.ip,
                    r.display_name,
                    if r.open_ports.is_empty() { "-".to_string() } else { r.open_ports.join(",") },
                    os,
                    timefmt::rfc3339(r.first_seen),
                    timefmt::rfc3339(r.last_seen),
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(records)?);
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            wtr.write_record(["ip", "name", "os", "ports", "first_seen", "last_seen", "state"])?;
            for r in records {
                wtr.write_record([
                    r.ip.clone(),
                    r.display_name.clone(),
                    r.os_fingerprint.clone(),
                    r.open_ports.join("|"),
                    timefmt::rfc3339(r.first_seen),
                    timefmt::rfc3339(r.last_seen),
                    if r.is_connected() { "conectado".to_string() } else { "desconectado".to_string() },
                ])?;
            }
            wtr.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn monitor_flags_parse() {
        let cli = Cli::try_parse_from(["lanwatch", "monitor", "--target", "10.0.0.0/24", "--ports", "22,80", "--once", "--no-os"]).unwrap();
        match cli.command {
            Commands::Monitor { target, ports, once, no_os, sudo, .. } => {
                assert_eq!(target.as_deref(), Some("10.0.0.0/24"));
                assert_eq!(ports.as_deref(), Some("22,80"));
                assert!(once && no_os && !sudo);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn inventory_format_parses() {
        let cli = Cli::try_parse_from(["lanwatch", "--log-level", "debug", "inventory", "--format", "csv", "--connected"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Inventory { format: OutputFormat::Csv, connected: true, .. }));
    }
}
