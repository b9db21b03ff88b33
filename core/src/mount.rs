//! Mount option parsing (spec §6.3). Deliberately a small hand-rolled
//! parser rather than a general CLI crate: it only ever sees a
//! comma-separated `key=value` string handed down by the caller's mount
//! syscall equivalent, not `argv`.

/// The two recognized mount options. Unrecognized options are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountOptions {
    pub journal_dev: Option<u32>,
    pub journal_path: Option<String>,
}

impl MountOptions {
    /// Parses a comma-separated option string such as
    /// `"journal_dev=3,ro"`. Unknown keys (and bare flags with no `=`)
    /// are silently ignored, matching the spec's "unrecognized options
    /// are ignored".
    pub fn parse(opts: &str) -> Self {
        let mut out = Self::default();
        for kv in opts.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((key, value)) = kv.split_once('=') else {
                continue;
            };
            match key {
                "journal_dev" => out.journal_dev = value.parse().ok(),
                "journal_path" => out.journal_path = Some(value.to_string()),
                _ => {}
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_journal_dev() {
        let opts = MountOptions::parse("journal_dev=7");
        assert_eq!(opts.journal_dev, Some(7));
        assert_eq!(opts.journal_path, None);
    }

    #[test]
    fn parses_journal_path_and_ignores_unknown_options() {
        let opts = MountOptions::parse("ro,journal_path=/dev/sdb1,noatime");
        assert_eq!(opts.journal_path.as_deref(), Some("/dev/sdb1"));
        assert_eq!(opts.journal_dev, None);
    }

    #[test]
    fn empty_string_yields_defaults() {
        assert_eq!(MountOptions::parse(""), MountOptions::default());
    }
}
