//! DNS query capture: tshark output is deduplicated, labelled with a host
//! name and handed to a single writer task that appends JSON lines.

mod line;
mod resolve;

use lanwatch_core::{timefmt, DnsQueryRecord};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use line::{parse_capture_line, SeenLines};
pub use resolve::{parse_reverse_lookup, AddressOnly, HostnameResolver, NmapReverseLookup, UNKNOWN_HOST};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture log {path}: {source}")]
    OpenLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("error reading capture output: {0}")]
    Read(#[source] std::io::Error),
    #[error("{tool} exited with {status}")]
    Exit { tool: String, status: ExitStatus },
    #[error("capture writer task failed: {0}")]
    Writer(String),
}

#[derive(Debug, Clone)]
pub struct TsharkOptions {
    pub program: String,
    pub interface: String,
    pub filter: String,
    pub sudo: bool,
}

impl Default for TsharkOptions {
    fn default() -> Self {
        TsharkOptions {
            program: "tshark".into(),
            interface: "wlo1".into(),
            filter: "dns.flags.response == 0 && !dns.qry.name.len == 0".into(),
            sudo: false,
        }
    }
}

impl TsharkOptions {
    pub fn command_line(&self) -> Vec<String> {
        let mut argv = Vec::new();
        if self.sudo {
            argv.push("sudo".to_string());
        }
        argv.push(self.program.clone());
        for a in ["-i", self.interface.as_str(), "-Y", self.filter.as_str(), "-T", "fields", "-e", "ip.src", "-e", "dns.qry.name"] {
            argv.push(a.to_string());
        }
        argv
    }
}

/// Counters for one pass over the capture stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub lines: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub sent: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    pub pumped: PumpStats,
    pub written: usize,
}

/// Producer side: read capture lines until EOF or `shutdown`, forwarding each
/// new well-formed query. Lines that are not UTF-8 count as malformed; only
/// a read error ends the pump early. Dropping `tx` on return closes the channel.
pub async fn pump_lines<R>(
    reader: R,
    resolver: &dyn HostnameResolver,
    tx: mpsc::Sender<DnsQueryRecord>,
    shutdown: &CancellationToken,
) -> Result<PumpStats, CaptureError>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = PumpStats::default();
    let mut seen = SeenLines::default();
    let mut segments = reader.split(b'\n');
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = segments.next_segment() => next.map_err(CaptureError::Read)?,
        };
        let Some(mut raw) = next else { break };
        stats.lines += 1;
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        let line = match String::from_utf8(raw) {
            Ok(line) => line,
            Err(e) => {
                debug!(line = %String::from_utf8_lossy(e.as_bytes()), "skipping undecodable capture line");
                stats.malformed += 1;
                continue;
            }
        };
        if !seen.first_sighting(&line) {
            stats.duplicates += 1;
            continue;
        }
        let Some((ip, domain)) = parse_capture_line(&line) else {
            debug!(%line, "skipping malformed capture line");
            stats.malformed += 1;
            continue;
        };
        let host = resolver.resolve(ip).await;
        let rec = DnsQueryRecord::new(ip, domain, &host, timefmt::now());
        debug!(ip = %rec.source_ip, domain = %rec.domain, host = %rec.host_name, "dns query");
        if tx.send(rec).await.is_err() {
            warn!("capture writer went away, stopping");
            break;
        }
        stats.sent += 1;
    }
    Ok(stats)
}

/// Consumer side: append each record as one JSON line until the channel is
/// closed and drained. Records that fail to encode or write are logged and
/// skipped. Returns the number of records written.
pub async fn write_records<W>(mut rx: mpsc::Receiver<DnsQueryRecord>, mut out: W) -> usize
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while let Some(rec) = rx.recv().await {
        let mut line = match serde_json::to_string(&rec) {
            Ok(l) => l,
            Err(e) => {
                warn!(error = %e, "failed to encode capture record");
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = out.write_all(line.as_bytes()).await {
            warn!(error = %e, "failed to append capture record");
            continue;
        }
        if let Err(e) = out.flush().await {
            warn!(error = %e, "failed to flush capture log");
        }
        written += 1;
    }
    written
}

pub async fn open_log(path: &Path) -> Result<tokio::fs::File, CaptureError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|source| CaptureError::OpenLog { path: path.to_path_buf(), source })
}

/// Run tshark until it exits or `shutdown` fires, appending captured queries
/// to `log_path`. Queued records are always written before returning.
pub async fn run_capture(
    opts: &TsharkOptions,
    resolver: Arc<dyn HostnameResolver>,
    log_path: &Path,
    shutdown: CancellationToken,
) -> Result<CaptureSummary, CaptureError> {
    let log = open_log(log_path).await?;
    let argv = opts.command_line();
    let tool = opts.program.clone();
    let mut child = Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CaptureError::Spawn { tool: tool.clone(), source })?;
    info!(command = %argv.join(" "), log = %log_path.display(), "capture started");

    let (tx, rx) = mpsc::channel::<DnsQueryRecord>(1);
    let writer = tokio::spawn(write_records(rx, log));

    let pumped = match child.stdout.take() {
        Some(stdout) => pump_lines(BufReader::new(stdout), resolver.as_ref(), tx, &shutdown).await,
        None => {
            drop(tx);
            Ok(PumpStats::default())
        }
    };
    let written = writer.await.map_err(|e| CaptureError::Writer(e.to_string()))?;

    let status = if shutdown.is_cancelled() || pumped.is_err() {
        let _ = child.kill().await;
        None
    } else {
        child.wait().await.ok()
    };
    let pumped = pumped?;
    info!(lines = pumped.lines, duplicates = pumped.duplicates, written, "capture finished");

    match status {
        Some(status) if !status.success() => Err(CaptureError::Exit { tool, status }),
        _ => Ok(CaptureSummary { pumped, written }),
    }
}
