//! Scraping of nmap's normal (human readable) output.

use lanwatch_core::{ObservedHost, Snapshot};
use regex::Regex;
use std::sync::LazyLock;

static REPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Nmap scan report for (.+?)(?: \(([0-9A-Fa-f:.]+)\))?$").expect("report pattern")
});
static OS_DETAILS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"OS details: (.+)").expect("os pattern"));
static OPEN_TCP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)/tcp\s+open(?:\s|$)").expect("port pattern"));

/// Build a snapshot from nmap output. Each `Nmap scan report for` line opens
/// a host; following `OS details:` and `<port>/tcp open` lines belong to it.
/// A host reported more than once is merged: ports accumulate and the last
/// OS line wins.
pub fn parse_nmap_output(output: &str) -> Snapshot {
    let mut hosts = Snapshot::new();
    let mut current: Option<String> = None;

    for line in output.lines().map(str::trim_end) {
        if let Some(caps) = REPORT.captures(line) {
            let label = caps[1].trim().to_string();
            let (ip, name) = match caps.get(2) {
                Some(ip) => (ip.as_str().to_string(), label),
                None => (label.clone(), label),
            };
            hosts.entry(ip.clone()).or_insert_with(|| ObservedHost::named(name));
            current = Some(ip);
            continue;
        }
        let Some(host) = current.as_ref().and_then(|ip| hosts.get_mut(ip)) else { continue };
        if let Some(caps) = OS_DETAILS.captures(line) {
            host.os_fingerprint = Some(caps[1].trim().to_string());
        } else if let Some(caps) = OPEN_TCP.captures(line) {
            host.add_port(&caps[1]);
        }
    }
    hosts
}
