use lanwatch_core::{HostRecord, ObservedHost, Snapshot};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::net::IpAddr;
use time::OffsetDateTime;

/// IPs that changed state during one reconciliation, each list in address order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub arrived: Vec<String>,
    pub refreshed: Vec<String>,
    pub departed: Vec<String>,
}

impl CycleReport {
    pub fn is_quiet(&self) -> bool {
        self.arrived.is_empty() && self.departed.is_empty()
    }
}

/// Merge `snapshot` into `inventory`, stamping every change with `now`.
pub fn reconcile(inventory: Vec<HostRecord>, snapshot: &Snapshot, now: OffsetDateTime) -> Vec<HostRecord> {
    reconcile_with_report(inventory, snapshot, now).0
}

/// Same as [`reconcile`], also reporting which hosts arrived, stayed or left.
///
/// Connected hosts only get their `last_seen` refreshed; the attributes seen
/// when the episode opened are kept. Hosts with no connected record open a
/// new episode at the end of the inventory. Connected hosts missing from the
/// snapshot are closed. Nothing is ever removed.
pub fn reconcile_with_report(
    mut inventory: Vec<HostRecord>,
    snapshot: &Snapshot,
    now: OffsetDateTime,
) -> (Vec<HostRecord>, CycleReport) {
    let mut report = CycleReport::default();
    let connected = connected_index(&inventory);

    let mut arrivals: Vec<(&String, &ObservedHost)> = Vec::new();
    for (ip, observed) in snapshot {
        match connected.get(ip.as_str()) {
            Some(&idx) => {
                inventory[idx].touch(now);
                report.refreshed.push(ip.clone());
            }
            None => arrivals.push((ip, observed)),
        }
    }

    for record in inventory.iter_mut().filter(|r| r.is_connected()) {
        if !snapshot.contains_key(&record.ip) {
            record.disconnect(now);
            report.departed.push(record.ip.clone());
        }
    }

    arrivals.sort_by(|a, b| address_order(a.0, b.0));
    for (ip, observed) in arrivals {
        inventory.push(HostRecord::new_episode(ip, observed, now));
        report.arrived.push(ip.clone());
    }

    report.refreshed.sort_by(|a, b| address_order(a, b));
    report.departed.sort_by(|a, b| address_order(a, b));
    (inventory, report)
}

/// Position of the connected record for each IP. Should a damaged inventory
/// hold several, the earliest one wins.
fn connected_index(inventory: &[HostRecord]) -> HashMap<String, usize> {
    let mut index = HashMap::new();
    for (i, rec) in inventory.iter().enumerate().filter(|(_, r)| r.is_connected()) {
        index.entry(rec.ip.clone()).or_insert(i);
    }
    index
}

/// Numeric order for parseable addresses, text order otherwise (after them).
fn address_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<IpAddr>(), b.parse::<IpAddr>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanwatch_core::HostState;
    use time::macros::datetime;
    use time::Duration;

    fn snap(entries: &[(&str, &str)]) -> Snapshot {
        entries
            .iter()
            .map(|(ip, name)| (ip.to_string(), ObservedHost::named(*name)))
            .collect()
    }

    fn connected_count(inv: &[HostRecord], ip: &str) -> usize {
        inv.iter().filter(|r| r.ip == ip && r.is_connected()).count()
    }

    #[test]
    fn new_host_opens_episode() {
        let now = datetime!(2024-05-01 12:00:00 UTC);
        let inv = reconcile(Vec::new(), &snap(&[("10.0.0.5", "printer")]), now);
        assert_eq!(inv.len(), 1);
        assert_eq!(inv[0].ip, "10.0.0.5");
        assert_eq!(inv[0].display_name, "printer");
        assert_eq!(inv[0].state, HostState::Connected);
        assert_eq!(inv[0].first_seen, now);
        assert_eq!(inv[0].last_seen, now);
    }

    #[test]
    fn absent_host_is_disconnected() {
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        let t1 = t0 + Duration::minutes(1);
        let inv = reconcile(Vec::new(), &snap(&[("10.0.0.5", "printer")]), t0);
        let (inv, report) = reconcile_with_report(inv, &Snapshot::new(), t1);
        assert_eq!(inv.len(), 1);
        assert_eq!(inv[0].state, HostState::Disconnected);
        assert_eq!(inv[0].first_seen, t0);
        assert_eq!(inv[0].last_seen, t1);
        assert_eq!(report.departed, vec!["10.0.0.5"]);
    }

    #[test]
    fn repeated_snapshot_only_refreshes() {
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        let t1 = t0 + Duration::minutes(1);
        let s = snap(&[("10.0.0.5", "printer"), ("10.0.0.7", "tv")]);
        let first = reconcile(Vec::new(), &s, t0);
        let (second, report) = reconcile_with_report(first.clone(), &s, t1);
        assert_eq!(second.len(), first.len());
        assert!(second.iter().all(|r| r.is_connected() && r.last_seen == t1 && r.first_seen == t0));
        assert_eq!(report.refreshed, vec!["10.0.0.5", "10.0.0.7"]);
        assert!(report.is_quiet());
    }

    #[test]
    fn reconnection_appends_new_episode() {
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        let t1 = t0 + Duration::minutes(1);
        let t2 = t0 + Duration::minutes(2);
        let s = snap(&[("10.0.0.5", "printer")]);
        let inv = reconcile(Vec::new(), &s, t0);
        let inv = reconcile(inv, &Snapshot::new(), t1);
        let old = inv[0].clone();
        let inv = reconcile(inv, &s, t2);
        assert_eq!(inv.len(), 2);
        assert_eq!(inv[0], old);
        assert_eq!(inv[1].state, HostState::Connected);
        assert_eq!(inv[1].first_seen, t2);
    }

    #[test]
    fn attributes_frozen_within_episode() {
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        let inv = reconcile(Vec::new(), &snap(&[("10.0.0.5", "printer")]), t0);

        let mut changed = ObservedHost::named("renamed");
        changed.os_fingerprint = Some("Linux 6.X".into());
        changed.add_port("22");
        let s: Snapshot = [("10.0.0.5".to_string(), changed)].into_iter().collect();
        let inv = reconcile(inv, &s, t0 + Duration::minutes(1));

        assert_eq!(inv[0].display_name, "printer");
        assert_eq!(inv[0].os_fingerprint, "");
        assert!(inv[0].open_ports.is_empty());
    }

    #[test]
    fn arrivals_are_appended_in_address_order() {
        let now = datetime!(2024-05-01 12:00:00 UTC);
        let s = snap(&[("10.0.0.10", "b"), ("10.0.0.9", "a"), ("fe80::1", "c")]);
        let inv = reconcile(Vec::new(), &s, now);
        let ips: Vec<_> = inv.iter().map(|r| r.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.0.0.9", "10.0.0.10", "fe80::1"]);
    }

    #[test]
    fn clock_stepping_back_keeps_first_seen_before_last_seen() {
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        let s = snap(&[("10.0.0.5", "printer")]);
        let inv = reconcile(Vec::new(), &s, t0);
        let inv = reconcile(inv, &s, t0 - Duration::hours(1));
        assert_eq!(inv[0].last_seen, t0);
        let inv = reconcile(inv, &Snapshot::new(), t0 - Duration::hours(2));
        assert!(inv[0].first_seen <= inv[0].last_seen);
    }

    #[test]
    fn earliest_duplicate_connected_record_is_the_one_refreshed() {
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        let rec = HostRecord::new_episode("10.0.0.5", &ObservedHost::named("a"), t0);
        let inv = vec![rec.clone(), rec];
        let t1 = t0 + Duration::minutes(1);
        let inv = reconcile(inv, &snap(&[("10.0.0.5", "a")]), t1);
        assert_eq!(inv.len(), 2);
        assert_eq!(inv[0].last_seen, t1);
        assert_eq!(inv[1].last_seen, t0);
    }

    #[test]
    fn invariants_hold_over_a_sequence_of_cycles() {
        let cycles: [&[(&str, &str)]; 6] = [
            &[("10.0.0.1", "gw"), ("10.0.0.5", "printer")],
            &[("10.0.0.1", "gw")],
            &[("10.0.0.1", "gw"), ("10.0.0.5", "printer"), ("10.0.0.8", "phone")],
            &[],
            &[("10.0.0.8", "phone")],
            &[("10.0.0.8", "phone"), ("10.0.0.5", "printer")],
        ];
        let mut inv = Vec::new();
        let mut now = datetime!(2024-05-01 12:00:00 UTC);
        for entries in cycles {
            let before = inv.len();
            let s = snap(entries);
            inv = reconcile(inv, &s, now);
            assert!(inv.len() >= before);
            for ip in ["10.0.0.1", "10.0.0.5", "10.0.0.8"] {
                assert!(connected_count(&inv, ip) <= 1);
                assert_eq!(connected_count(&inv, ip), usize::from(s.contains_key(ip)));
            }
            assert!(inv.iter().all(|r| r.first_seen <= r.last_seen));
            now += Duration::minutes(1);
        }
        assert_eq!(inv.iter().filter(|r| r.ip == "10.0.0.5").count(), 3);
    }
}
