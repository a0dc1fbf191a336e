//! Window origins and the embedder allow-list.
//!
//! Origin format: `scheme://host[:port]`. Any path after the authority is
//! dropped on parse, so full page URLs are accepted too.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An origin in the form `scheme://authority`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin {
    scheme: String,
    authority: String,
}

impl Origin {
    /// The scheme (e.g., "https").
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host and optional port, lowercased.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// True if this origin is `other` or one of its subdomains.
    ///
    /// The scheme is ignored: only authorities are compared.
    pub fn is_within(&self, other: &Origin) -> bool {
        if self.authority == other.authority {
            return true;
        }
        self.authority
            .strip_suffix(other.authority.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

impl FromStr for Origin {
    type Err = OriginParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| OriginParseError::MissingScheme(s.to_string()))?;

        if scheme.is_empty() {
            return Err(OriginParseError::MissingScheme(s.to_string()));
        }

        let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
        if authority.is_empty() {
            return Err(OriginParseError::EmptyHost(s.to_string()));
        }

        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            authority: authority.to_ascii_lowercase(),
        })
    }
}

impl TryFrom<String> for Origin {
    type Error = OriginParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.to_string()
    }
}

/// Error parsing an origin string.
#[derive(Debug, Clone, thiserror::Error)]
pub enum OriginParseError {
    #[error("origin must start with 'scheme://', got: {0}")]
    MissingScheme(String),
    #[error("origin has no host: {0}")]
    EmptyHost(String),
}

/// Origins allowed to drive an agent.
///
/// A sender is accepted when its origin is an entry, or when its host is an
/// entry's host or a subdomain of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OriginAllowList {
    origins: Vec<Origin>,
}

impl OriginAllowList {
    /// Build a list from already-parsed origins.
    pub fn new(origins: Vec<Origin>) -> Self {
        Self { origins }
    }

    /// Parse every entry; fails on the first invalid one.
    pub fn parse<I, S>(entries: I) -> Result<Self, OriginParseError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins = entries
            .into_iter()
            .map(|entry| entry.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { origins })
    }

    pub fn origins(&self) -> &[Origin] {
        &self.origins
    }

    /// Check a sender origin as reported by the message channel.
    pub fn allows(&self, origin: &str) -> bool {
        if origin.is_empty() || origin == "null" {
            return false;
        }
        let Ok(candidate) = origin.parse::<Origin>() else {
            return false;
        };
        self.origins.iter().any(|allowed| candidate.is_within(allowed))
    }
}

impl Default for OriginAllowList {
    fn default() -> Self {
        let origins = [
            ("https", "pulsegen.app"),
            ("https", "staging.pulsegen.app"),
            ("http", "localhost:3000"),
            ("http", "localhost:5173"),
        ]
        .into_iter()
        .map(|(scheme, authority)| Origin {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
        })
        .collect();
        Self { origins }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_drops_path() {
        let origin: Origin = "https://App.PulseGen.app/dashboard?x=1".parse().unwrap();
        assert_eq!(origin.scheme(), "https");
        assert_eq!(origin.authority(), "app.pulsegen.app");
        assert_eq!(origin.to_string(), "https://app.pulsegen.app");
    }

    #[test]
    fn parse_rejects_bare_host() {
        assert!("pulsegen.app".parse::<Origin>().is_err());
        assert!("https://".parse::<Origin>().is_err());
    }

    #[test]
    fn allows_exact_and_subdomains() {
        let list = OriginAllowList::default();
        assert!(list.allows("https://pulsegen.app"));
        assert!(list.allows("https://eu.app.pulsegen.app"));
        assert!(list.allows("http://localhost:3000"));
    }

    #[test]
    fn rejects_lookalikes() {
        let list = OriginAllowList::default();
        assert!(!list.allows("https://evilpulsegen.app"));
        assert!(!list.allows("https://pulsegen.app.evil.com"));
        assert!(!list.allows("http://localhost:3001"));
        assert!(!list.allows("null"));
        assert!(!list.allows(""));
    }

    #[test]
    fn configured_list() {
        let list = OriginAllowList::parse(["https://crm.example.com"]).unwrap();
        assert!(list.allows("https://crm.example.com"));
        assert!(!list.allows("https://pulsegen.app"));
        assert!(OriginAllowList::parse(["crm.example.com"]).is_err());
    }
}
