use anyhow::{Context, Result};
use dns_capture::TsharkOptions;
use nmap_scan::NmapOptions;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG: &str = "lanwatch.yaml";
pub const DEFAULT_INVENTORY: &str = "NmapLog.json";
pub const DEFAULT_CAPTURE_LOG: &str = "DnsLog.json";
pub const DEFAULT_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    pub target: Option<String>,
    pub ports: Option<PortList>,
    pub os_detection: Option<bool>,
    pub sudo: Option<bool>,
    pub interval_secs: Option<u64>,
    pub scan_timeout_secs: Option<u64>,
    pub inventory_path: Option<PathBuf>,
}

/// `ports: 22,80,443` is a string to YAML but `ports: 443` is a number.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortList {
    Single(u16),
    Spec(String),
}

impl PortList {
    pub fn spec(&self) -> String {
        match self {
            PortList::Single(p) => p.to_string(),
            PortList::Spec(s) => s.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    pub interface: Option<String>,
    pub filter: Option<String>,
    pub log_path: Option<PathBuf>,
    pub sudo: Option<bool>,
    pub resolve_hostnames: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub log_level: Option<String>,
    pub monitor: Option<MonitorConfig>,
    pub capture: Option<CaptureConfig>,
}

/// Load the config at `path`, or `./lanwatch.yaml` if none was given and it
/// exists. An explicitly named file that is missing or invalid is an error.
pub fn load_config(path: Option<&Path>) -> Result<Option<Config>> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let p = Path::new(DEFAULT_CONFIG);
            if p.exists() { p.to_path_buf() } else { return Ok(None); }
        }
    };
    let s = fs::read_to_string(&path).with_context(|| format!("reading config {}", path.display()))?;
    let cfg = serde_yaml::from_str(&s).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(Some(cfg))
}

/// Monitor flags given on the command line; unset ones fall back to the config file.
#[derive(Debug, Default, Clone)]
pub struct MonitorOverrides {
    pub target: Option<String>,
    pub ports: Option<String>,
    pub interval_secs: Option<u64>,
    pub inventory: Option<PathBuf>,
    pub no_os: bool,
    pub sudo: bool,
}

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub nmap: NmapOptions,
    pub interval: Duration,
    pub inventory: PathBuf,
}

impl MonitorSettings {
    pub fn resolve(cli: MonitorOverrides, cfg: Option<&MonitorConfig>) -> Result<Self> {
        let cfg = cfg.cloned().unwrap_or_default();
        let defaults = NmapOptions::default();

        let target = cli.target.or(cfg.target).unwrap_or(defaults.target);
        let target = nmap_scan::validate_target(&target)?;
        let ports = match cli.ports.or(cfg.ports.map(|p| p.spec())) {
            Some(spec) => nmap_scan::parse_ports(&spec).with_context(|| format!("invalid port list {:?}", spec))?,
            None => defaults.ports,
        };
        let os_detection = !cli.no_os && cfg.os_detection.unwrap_or(defaults.os_detection);
        let sudo = cli.sudo || cfg.sudo.unwrap_or(defaults.sudo);
        let timeout = cfg.scan_timeout_secs.map(Duration::from_secs).unwrap_or(defaults.timeout);
        let interval_secs = cli.interval_secs.or(cfg.interval_secs).unwrap_or(DEFAULT_INTERVAL_SECS).max(1);

        Ok(MonitorSettings {
            nmap: NmapOptions { program: defaults.program, target, ports, os_detection, sudo, timeout },
            interval: Duration::from_secs(interval_secs),
            inventory: cli.inventory.or(cfg.inventory_path).unwrap_or_else(|| PathBuf::from(DEFAULT_INVENTORY)),
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct CaptureOverrides {
    pub interface: Option<String>,
    pub log: Option<PathBuf>,
    pub no_resolve: bool,
    pub sudo: bool,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub tshark: TsharkOptions,
    pub log: PathBuf,
    pub resolve_hostnames: bool,
}

impl CaptureSettings {
    pub fn resolve(cli: CaptureOverrides, cfg: Option<&CaptureConfig>) -> Self {
        let cfg = cfg.cloned().unwrap_or_default();
        let defaults = TsharkOptions::default();
        CaptureSettings {
            tshark: TsharkOptions {
                program: defaults.program,
                interface: cli.interface.or(cfg.interface).unwrap_or(defaults.interface),
                filter: cfg.filter.unwrap_or(defaults.filter),
                sudo: cli.sudo || cfg.sudo.unwrap_or(defaults.sudo),
            },
            log: cli.log.or(cfg.log_path).unwrap_or_else(|| PathBuf::from(DEFAULT_CAPTURE_LOG)),
            resolve_hostnames: !cli.no_resolve && cfg.resolve_hostnames.unwrap_or(true),
        }
    }
}
