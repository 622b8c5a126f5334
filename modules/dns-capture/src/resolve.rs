use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::warn;

/// Host name recorded when a lookup fails.
pub const UNKNOWN_HOST: &str = "desconocido";

/// Maps a source address to a host label for the capture log.
#[async_trait]
pub trait HostnameResolver: Send + Sync {
    async fn resolve(&self, ip: &str) -> String;
}

/// Records the address itself as the host name.
#[derive(Debug, Clone, Default)]
pub struct AddressOnly;

#[async_trait]
impl HostnameResolver for AddressOnly {
    async fn resolve(&self, ip: &str) -> String {
        ip.to_string()
    }
}

/// Reverse lookup through `nmap -sn -R <ip>`.
#[derive(Debug, Clone)]
pub struct NmapReverseLookup {
    pub program: String,
}

impl Default for NmapReverseLookup {
    fn default() -> Self {
        NmapReverseLookup { program: "nmap".into() }
    }
}

#[async_trait]
impl HostnameResolver for NmapReverseLookup {
    async fn resolve(&self, ip: &str) -> String {
        let out = Command::new(&self.program)
            .args(["-sn", "-R", ip])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;
        match out {
            Ok(out) if out.status.success() => {
                parse_reverse_lookup(&String::from_utf8_lossy(&out.stdout)).unwrap_or_else(|| UNKNOWN_HOST.to_string())
            }
            Ok(out) => {
                warn!(%ip, status = %out.status, "reverse lookup failed");
                UNKNOWN_HOST.to_string()
            }
            Err(e) => {
                warn!(%ip, error = %e, "reverse lookup failed");
                UNKNOWN_HOST.to_string()
            }
        }
    }
}

/// Fifth field of nmap's report line: the host name when one resolved, the
/// bare address otherwise.
pub fn parse_reverse_lookup(output: &str) -> Option<String> {
    output
        .lines()
        .filter(|l| l.contains("report"))
        .find_map(|l| l.split_whitespace().nth(4))
        .map(str::to_string)
}
