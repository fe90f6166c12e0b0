//! Immutable snapshot of git-config style key/value settings.
//!
//! # Design
//! - Section and variable names are case-insensitive, subsections keep their case,
//!   matching git's own rules.
//! - The last value for a key wins, as with `git config --get`.

use std::collections::BTreeMap;

/// Normalised key/value view of a git configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    entries: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    /// Empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from key/value pairs, later pairs overriding earlier ones.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut snapshot = Self::new();
        for (key, value) in pairs {
            snapshot.insert(key.as_ref(), value);
        }
        snapshot
    }

    /// Parse `git config --list` output (`key=value` per line).
    ///
    /// A key without `=` is a boolean set to `true`.
    #[must_use]
    pub fn parse_list(text: &str) -> Self {
        let mut snapshot = Self::new();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            match line.split_once('=') {
                Some((key, value)) => snapshot.insert(key, value),
                None => snapshot.insert(line, "true"),
            }
        }
        snapshot
    }

    /// Parse `git config --list -z` output (`key\nvalue` records separated by NUL).
    #[must_use]
    pub fn parse_list_nul(text: &str) -> Self {
        let mut snapshot = Self::new();
        for record in text.split('\0').filter(|record| !record.is_empty()) {
            match record.split_once('\n') {
                Some((key, value)) => snapshot.insert(key, value),
                None => snapshot.insert(record, "true"),
            }
        }
        snapshot
    }

    /// Set `key` to `value`.
    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.entries.insert(normalize_key(key), value.into());
    }

    /// Look up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&normalize_key(key)).map(String::as_str)
    }

    /// Iterate `(subsection, value)` for every `<section>.<subsection>.<variable>` key.
    pub fn subsections<'a>(
        &'a self,
        section: &str,
        variable: &str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let prefix = format!("{}.", section.to_ascii_lowercase());
        let suffix = format!(".{}", variable.to_ascii_lowercase());
        self.entries.iter().filter_map(move |(key, value)| {
            key.strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix(&suffix))
                .filter(|subsection| !subsection.is_empty())
                .map(|subsection| (subsection, value.as_str()))
        })
    }

    /// Number of keys in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn normalize_key(key: &str) -> String {
    let key = key.trim();
    let Some((section, rest)) = key.split_once('.') else {
        return key.to_ascii_lowercase();
    };
    match rest.rsplit_once('.') {
        Some((subsection, variable)) => format!(
            "{}.{subsection}.{}",
            section.to_ascii_lowercase(),
            variable.to_ascii_lowercase()
        ),
        None => format!(
            "{}.{}",
            section.to_ascii_lowercase(),
            rest.to_ascii_lowercase()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive_outside_subsections() {
        let snapshot = ConfigSnapshot::from_pairs([
            ("LFS.ConcurrentTransfers", "4"),
            ("remote.Upstream.URL", "https://example.test/repo"),
        ]);
        assert_eq!(snapshot.get("lfs.concurrenttransfers"), Some("4"));
        assert_eq!(
            snapshot.get("remote.Upstream.url"),
            Some("https://example.test/repo")
        );
        assert_eq!(snapshot.get("remote.upstream.url"), None);
    }

    #[test]
    fn list_output_parses_values_and_bare_booleans() {
        let snapshot =
            ConfigSnapshot::parse_list("core.bare\nlfs.url=https://lfs.test/x=y\n\nuser.name=Jane\n");
        assert_eq!(snapshot.get("core.bare"), Some("true"));
        assert_eq!(snapshot.get("lfs.url"), Some("https://lfs.test/x=y"));
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn nul_separated_output_keeps_multiline_values() {
        let snapshot = ConfigSnapshot::parse_list_nul("alias.x\nline one\nline two\0core.bare\0");
        assert_eq!(snapshot.get("alias.x"), Some("line one\nline two"));
        assert_eq!(snapshot.get("core.bare"), Some("true"));
    }

    #[test]
    fn later_values_override_earlier_ones() {
        let snapshot = ConfigSnapshot::parse_list("lfs.url=a\nlfs.url=b\n");
        assert_eq!(snapshot.get("lfs.url"), Some("b"));
    }

    #[test]
    fn subsections_match_dotted_urls() {
        let snapshot = ConfigSnapshot::from_pairs([
            ("lfs.https://host.test/repo.git/info/lfs.access", "basic"),
            ("lfs.https://host.test.access", "none"),
            ("lfs.url", "https://host.test"),
        ]);
        let mut found: Vec<_> = snapshot.subsections("lfs", "access").collect();
        found.sort_unstable();
        assert_eq!(
            found,
            vec![
                ("https://host.test", "none"),
                ("https://host.test/repo.git/info/lfs", "basic"),
            ]
        );
    }
}
