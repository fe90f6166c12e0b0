//! Access-mode resolution for remote endpoints.
//!
//! # Design
//! - Rules come from `lfs.<url>.access` keys; a rule matches a target URL when scheme,
//!   host, and port agree and the rule path is a segment-aligned prefix of the target path.
//! - Rules are held most-specific-first so the first match wins; a URL-level rule therefore
//!   overrides a host-level one without any inheritance chain.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use url::Url;

use crate::error::ConfigError;

/// How credentials are attached to requests for an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Nothing configured; requests start anonymous and may upgrade to basic on a 401.
    #[default]
    Empty,
    /// Explicitly anonymous; credentials are never attached.
    None,
    /// HTTP basic credentials are attached.
    Basic,
}

impl AccessMode {
    /// Config value for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::None => "none",
            Self::Basic => "basic",
        }
    }
}

impl Display for AccessMode {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(Self::Empty),
            "none" => Ok(Self::None),
            "basic" => Ok(Self::Basic),
            // No SPNEGO support; such endpoints get the anonymous-then-basic flow.
            "negotiate" => Ok(Self::Empty),
            _ => Err(ConfigError::InvalidField {
                key: "lfs.<url>.access".to_string(),
                value: value.to_string(),
                reason: "expected one of none, basic, negotiate",
            }),
        }
    }
}

/// A single URL-prefix → access mode rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    mode: AccessMode,
}

impl AccessRule {
    /// Build a rule for `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] when `prefix` is not an absolute URL with a host.
    pub fn new(prefix: &str, mode: AccessMode) -> Result<Self, ConfigError> {
        let url = Url::parse(prefix).map_err(|source| ConfigError::InvalidUrl {
            value: prefix.to_string(),
            source,
        })?;
        let host = url.host_str().ok_or_else(|| ConfigError::InvalidUrl {
            value: prefix.to_string(),
            source: url::ParseError::EmptyHost,
        })?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_ascii_lowercase(),
            port: url.port_or_known_default(),
            path: url.path().trim_end_matches('/').to_string(),
            mode,
        })
    }

    /// Mode applied when the rule matches.
    #[must_use]
    pub const fn mode(&self) -> AccessMode {
        self.mode
    }

    fn matches(&self, target: &Url) -> bool {
        if target.scheme() != self.scheme
            || target.port_or_known_default() != self.port
            || !target
                .host_str()
                .is_some_and(|host| host.eq_ignore_ascii_case(&self.host))
        {
            return false;
        }
        let path = target.path();
        self.path.is_empty()
            || path == self.path
            || path
                .strip_prefix(&self.path)
                .is_some_and(|rest| rest.starts_with('/'))
    }

    fn specificity(&self) -> usize {
        self.path.split('/').filter(|segment| !segment.is_empty()).count()
    }
}

/// Ordered set of access rules evaluated most-specific-first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessResolver {
    rules: Vec<AccessRule>,
}

impl AccessResolver {
    /// Build a resolver, ordering `rules` from most to least specific.
    #[must_use]
    pub fn new(mut rules: Vec<AccessRule>) -> Self {
        rules.sort_by_key(|rule| std::cmp::Reverse(rule.specificity()));
        Self { rules }
    }

    /// Mode for `url`; [`AccessMode::Empty`] when no rule matches or `url` is unparsable.
    #[must_use]
    pub fn access_for(&self, url: &str) -> AccessMode {
        let Ok(target) = Url::parse(url) else {
            return AccessMode::Empty;
        };
        self.access_for_url(&target)
    }

    /// Mode for an already parsed URL.
    #[must_use]
    pub fn access_for_url(&self, target: &Url) -> AccessMode {
        self.rules
            .iter()
            .find(|rule| rule.matches(target))
            .map_or(AccessMode::Empty, AccessRule::mode)
    }
}
