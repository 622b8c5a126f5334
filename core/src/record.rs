use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::timefmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostState {
    #[serde(rename = "conectado")]
    Connected,
    #[serde(rename = "desconectado")]
    Disconnected,
}

/// One connection episode of a host. A host that reconnects after being
/// marked disconnected gets a fresh record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub ip: String,
    #[serde(rename = "equipo")]
    pub display_name: String,
    #[serde(rename = "sistema", default)]
    pub os_fingerprint: String,
    #[serde(rename = "puertos", default)]
    pub open_ports: Vec<String>,
    #[serde(rename = "firstSeen", with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    #[serde(rename = "lastSeen", with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
    #[serde(rename = "status")]
    pub state: HostState,
}

impl HostRecord {
    /// Open a new connected episode for `ip` at `now`.
    pub fn new_episode(ip: &str, observed: &ObservedHost, now: OffsetDateTime) -> Self {
        HostRecord {
            ip: ip.to_string(),
            display_name: observed.display_name.clone(),
            os_fingerprint: observed.os_fingerprint.clone().unwrap_or_default(),
            open_ports: observed.open_ports.clone(),
            first_seen: now,
            last_seen: now,
            state: HostState::Connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == HostState::Connected
    }

    /// Confirm the host is still present. Attributes are left as they were
    /// when the episode opened.
    pub fn touch(&mut self, now: OffsetDateTime) {
        self.last_seen = now.max(self.first_seen);
    }

    /// Close the episode, recording `now` as the moment it went away.
    pub fn disconnect(&mut self, now: OffsetDateTime) {
        self.touch(now);
        self.state = HostState::Disconnected;
    }
}

/// What a scan saw for one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedHost {
    pub display_name: String,
    pub os_fingerprint: Option<String>,
    pub open_ports: Vec<String>,
}

impl ObservedHost {
    pub fn named(display_name: impl Into<String>) -> Self {
        ObservedHost { display_name: display_name.into(), ..Default::default() }
    }

    /// Record an open port; repeated mentions are ignored.
    pub fn add_port(&mut self, port: impl Into<String>) {
        let port = port.into();
        if !self.open_ports.contains(&port) {
            self.open_ports.push(port);
        }
    }
}

/// One captured DNS query, as appended to the capture log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsQueryRecord {
    #[serde(rename = "ipOrigen")]
    pub source_ip: String,
    #[serde(rename = "dominio")]
    pub domain: String,
    #[serde(rename = "equipo")]
    pub host_name: String,
    #[serde(rename = "fecha")]
    pub date: String,
    #[serde(rename = "hora")]
    pub time: String,
}

impl DnsQueryRecord {
    pub fn new(source_ip: &str, domain: &str, host_name: &str, at: OffsetDateTime) -> Self {
        DnsQueryRecord {
            source_ip: source_ip.to_string(),
            domain: domain.to_string(),
            host_name: host_name.to_string(),
            date: timefmt::log_date(at),
            time: timefmt::log_time(at),
        }
    }
}
