//! Snapshot provider backed by an external `nmap` run.

mod parse;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ipnet::IpNet;
use lanwatch_core::{ProviderError, Snapshot, SnapshotProvider};
use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

pub use parse::parse_nmap_output;

/// Parse a comma-separated list of ports/ranges (e.g., "22,80,443", "1-1024,8080").
pub fn parse_ports(spec: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();
    for part in spec.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            let s: u16 = start.trim().parse()?;
            let e: u16 = end.trim().parse()?;
            if s == 0 || e == 0 || s > e {
                return Err(anyhow!("invalid port range: {}", part));
            }
            ports.extend(s..=e);
        } else {
            let p: u16 = part.parse()?;
            if p == 0 {
                return Err(anyhow!("invalid port: {}", part));
            }
            ports.push(p);
        }
    }
    if ports.is_empty() {
        return Err(anyhow!("no ports given"));
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}

/// Render ports back into nmap's `-p` syntax, collapsing consecutive runs.
pub fn ports_arg(ports: &[u16]) -> String {
    let mut parts = Vec::new();
    let mut i = 0;
    while i < ports.len() {
        let start = ports[i];
        let mut end = start;
        while i + 1 < ports.len() && ports[i + 1] == end.saturating_add(1) {
            end = ports[i + 1];
            i += 1;
        }
        parts.push(if start == end { start.to_string() } else { format!("{}-{}", start, end) });
        i += 1;
    }
    parts.join(",")
}

/// Accept a CIDR block or a single address as scan target.
pub fn validate_target(target: &str) -> Result<String> {
    let t = target.trim();
    if t.parse::<IpNet>().is_ok() || t.parse::<IpAddr>().is_ok() {
        Ok(t.to_string())
    } else {
        Err(anyhow!("scan target must be an address or CIDR block: {}", target))
    }
}

#[derive(Debug, Clone)]
pub struct NmapOptions {
    pub program: String,
    pub target: String,
    pub ports: Vec<u16>,
    pub os_detection: bool,
    pub sudo: bool,
    pub timeout: Duration,
}

impl Default for NmapOptions {
    fn default() -> Self {
        NmapOptions {
            program: "nmap".into(),
            target: "192.168.1.0/24".into(),
            ports: vec![22, 80, 443],
            os_detection: true,
            sudo: false,
            timeout: Duration::from_secs(600),
        }
    }
}

impl NmapOptions {
    /// Program and arguments, e.g. `sudo nmap -O -p 22,80,443 192.168.1.0/24`.
    pub fn command_line(&self) -> Vec<String> {
        let mut argv = Vec::new();
        if self.sudo {
            argv.push("sudo".to_string());
        }
        argv.push(self.program.clone());
        if self.os_detection {
            argv.push("-O".into());
        }
        argv.push("-p".into());
        argv.push(ports_arg(&self.ports));
        argv.push(self.target.clone());
        argv
    }
}

/// nmap refuses `-O` for unprivileged users and quits.
fn needs_root(output: &str) -> bool {
    output.contains("requires root privileges")
}

/// Runs nmap once per snapshot and scrapes its normal output.
#[derive(Debug, Clone)]
pub struct NmapScanner {
    opts: NmapOptions,
}

impl NmapScanner {
    pub fn new(opts: NmapOptions) -> Result<Self> {
        validate_target(&opts.target)?;
        if opts.ports.is_empty() {
            return Err(anyhow!("no ports to scan"));
        }
        Ok(NmapScanner { opts })
    }

    async fn run(&self) -> Result<String, ProviderError> {
        let argv = self.opts.command_line();
        let tool = self.opts.program.clone();
        let Some((program, args)) = argv.split_first() else {
            return Err(ProviderError::Config("empty command line".into()));
        };
        debug!(command = %argv.join(" "), "spawning scan");
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ProviderError::Spawn { tool: tool.clone(), source })?;
        let out = match timeout(self.opts.timeout, child.wait_with_output()).await {
            Ok(res) => res.map_err(|source| ProviderError::Spawn { tool: tool.clone(), source })?,
            Err(_) => return Err(ProviderError::Timeout { tool, after: self.opts.timeout }),
        };
        let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&out.stderr));
        if !out.status.success() {
            if needs_root(&text) && !self.opts.sudo {
                warn!("nmap needs root for OS detection; rerun with --sudo or --no-os");
            }
            return Err(ProviderError::Exit { tool, status: out.status.to_string(), output: text.trim().to_string() });
        }
        Ok(text)
    }
}

#[async_trait]
impl SnapshotProvider for NmapScanner {
    async fn snapshot(&self) -> Result<Snapshot, ProviderError> {
        let text = self.run().await?;
        let snap = parse_nmap_output(&text);
        debug!(hosts = snap.len(), "scan parsed");
        Ok(snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_list() {
        let v = parse_ports("22,80,443").unwrap();
        assert_eq!(v, vec![22, 80, 443]);
    }

    #[test]
    fn parse_ranges_and_list() {
        let v = parse_ports("1-3,5,3").unwrap();
        assert_eq!(v, vec![1, 2, 3, 5]);
    }

    #[test]
    fn reject_invalid() {
        assert!(parse_ports("0").is_err());
        assert!(parse_ports("10-5").is_err());
        assert!(parse_ports(" , ").is_err());
    }

    #[test]
    fn ports_arg_collapses_runs() {
        assert_eq!(ports_arg(&[22, 80, 443]), "22,80,443");
        assert_eq!(ports_arg(&[1, 2, 3, 5, 8080, 8081]), "1-3,5,8080-8081");
        assert_eq!(ports_arg(&[65535]), "65535");
    }

    #[test]
    fn targets() {
        assert_eq!(validate_target(" 192.168.1.0/24 ").unwrap(), "192.168.1.0/24");
        assert!(validate_target("10.0.0.7").is_ok());
        assert!(validate_target("fd00::/64").is_ok());
        assert!(validate_target("192.168.1.0/33").is_err());
        assert!(validate_target("192.168.1.0/24; rm -rf /").is_err());
    }

    #[test]
    fn default_command_line() {
        let opts = NmapOptions { sudo: true, ..Default::default() };
        assert_eq!(opts.command_line(), vec!["sudo", "nmap", "-O", "-p", "22,80,443", "192.168.1.0/24"]);
        let opts = NmapOptions { os_detection: false, ..Default::default() };
        assert_eq!(opts.command_line(), vec!["nmap", "-p", "22,80,443", "192.168.1.0/24"]);
    }

    #[test]
    fn scanner_rejects_bad_target() {
        let opts = NmapOptions { target: "lan".into(), ..Default::default() };
        assert!(NmapScanner::new(opts).is_err());
    }

    #[test]
    fn root_requirement_is_recognised() {
        let out = "TCP/IP fingerprinting (for OS scan) requires root privileges.\nQUITTING!";
        assert!(needs_root(out));
        assert!(!needs_root("Failed to resolve \"lan\"."));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let opts = NmapOptions { program: "/nonexistent/lanwatch-nmap".into(), ..Default::default() };
        let scanner = NmapScanner::new(opts).unwrap();
        assert!(matches!(scanner.snapshot().await, Err(ProviderError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let opts = NmapOptions { program: "false".into(), ..Default::default() };
        let scanner = NmapScanner::new(opts).unwrap();
        assert!(matches!(scanner.snapshot().await, Err(ProviderError::Exit { .. })));
    }
}
