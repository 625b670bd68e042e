//! Photo URL allow-list.

use crate::error::{Error, Result};

/// Upload CDN hosts accepted when nothing else is configured.
pub const DEFAULT_ASSET_HOSTS: &[&str] = &["utfs.io", "ufs.sh"];

/// Accepts `https` URLs whose host is an allow-listed host or one of its
/// subdomains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPolicy {
    hosts: Vec<String>,
}

impl Default for AssetPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ASSET_HOSTS.iter().copied())
    }
}

impl AssetPolicy {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().trim_start_matches('.').to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated host list.
    pub fn from_list(list: &str) -> Self {
        Self::new(list.split(','))
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Check a photo URL.
    pub fn validate(&self, url: &str) -> Result<()> {
        let invalid = || Error::validation("Photo must be an https URL on an allowed upload host");

        let rest = url.trim().strip_prefix("https://").ok_or_else(invalid)?;
        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if authority.is_empty() || authority.contains('@') || authority.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let host = authority
            .split_once(':')
            .map(|(h, _)| h)
            .unwrap_or(authority)
            .to_lowercase();

        let allowed = self.hosts.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .map_or(false, |prefix| prefix.ends_with('.') && prefix.len() > 1)
        });
        if allowed {
            Ok(())
        } else {
            Err(invalid())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hosts() {
        let policy = AssetPolicy::default();
        assert!(policy.validate("https://utfs.io/f/abc.png").is_ok());
        assert!(policy.validate("https://x7k2.ufs.sh/f/abc.png").is_ok());
        assert!(policy.validate("https://UTFS.IO/f/abc.png").is_ok());
    }

    #[test]
    fn test_rejects() {
        let policy = AssetPolicy::default();
        for bad in [
            "http://utfs.io/f/abc.png",
            "https://evil.com/utfs.io/abc.png",
            "https://notutfs.io/f/abc.png",
            "https://utfs.io.evil.com/abc.png",
            "https://utfs.io@evil.com/abc.png",
            "https://.utfs.io/abc.png",
            "ftp://utfs.io/abc.png",
            "",
        ] {
            assert!(policy.validate(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_from_list() {
        let policy = AssetPolicy::from_list(" cdn.example.com , ,.img.example.org");
        assert_eq!(policy.hosts(), &["cdn.example.com".to_string(), "img.example.org".to_string()]);
        assert!(policy.validate("https://a.img.example.org/x.jpg").is_ok());
        assert!(policy.validate("https://utfs.io/x.jpg").is_err());
    }
}
