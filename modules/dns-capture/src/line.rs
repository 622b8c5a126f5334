use std::collections::HashSet;

/// Split a `tshark -T fields -e ip.src -e dns.qry.name` line into
/// `(source ip, queried domain)`. Lines with fewer than two fields yield `None`.
pub fn parse_capture_line(line: &str) -> Option<(&str, &str)> {
    let mut fields = line.split_whitespace();
    let ip = fields.next()?;
    let domain = fields.next()?;
    Some((ip, domain))
}

/// Remembers raw lines already handled during one capture run.
#[derive(Debug, Default)]
pub struct SeenLines {
    seen: HashSet<String>,
}

impl SeenLines {
    /// True the first time `line` is offered.
    pub fn first_sighting(&mut self, line: &str) -> bool {
        if self.seen.contains(line) {
            return false;
        }
        self.seen.insert(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_and_space_separated() {
        assert_eq!(parse_capture_line("192.168.1.20\texample.com"), Some(("192.168.1.20", "example.com")));
        assert_eq!(parse_capture_line("  10.0.0.3   api.example.org  "), Some(("10.0.0.3", "api.example.org")));
    }

    #[test]
    fn short_lines_are_rejected() {
        assert_eq!(parse_capture_line("192.168.1.20"), None);
        assert_eq!(parse_capture_line(""), None);
    }

    #[test]
    fn dedup_is_exact_match() {
        let mut seen = SeenLines::default();
        assert!(seen.first_sighting("a\tb"));
        assert!(!seen.first_sighting("a\tb"));
        assert!(seen.first_sighting("a b"));
        assert!(!seen.first_sighting("a b"));
    }
}
