//! Derivation of the large-object endpoint from a git remote URL.

use url::Url;

use crate::error::{ConfigError, ConfigResult};

/// Derive the large-object endpoint for a git remote URL.
///
/// HTTP(S) remotes gain a `.git` suffix (when missing) and `/info/lfs`. SSH and scp-style
/// remotes are mapped onto HTTPS on the same host and path.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidUrl`] for unparsable URLs and
/// [`ConfigError::InvalidField`] for remote kinds without an HTTP endpoint (local paths).
pub fn endpoint_from_remote_url(remote_url: &str) -> ConfigResult<Url> {
    let trimmed = remote_url.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        let url = parse(trimmed)?;
        return Ok(with_lfs_suffix(url));
    }

    if trimmed.starts_with("ssh://") || trimmed.starts_with("git+ssh://") {
        let url = parse(trimmed)?;
        let host = url.host_str().ok_or_else(|| ConfigError::InvalidUrl {
            value: trimmed.to_string(),
            source: url::ParseError::EmptyHost,
        })?;
        let https = parse(&format!("https://{host}{}", url.path()))?;
        return Ok(with_lfs_suffix(https));
    }

    if let Some((authority, path)) = split_scp_like(trimmed) {
        let host = authority
            .rsplit_once('@')
            .map_or(authority, |(_, host)| host);
        let path = path.trim_start_matches('/');
        let https = parse(&format!("https://{host}/{path}"))?;
        return Ok(with_lfs_suffix(https));
    }

    Err(ConfigError::InvalidField {
        key: "remote.<name>.url".to_string(),
        value: trimmed.to_string(),
        reason: "remote has no http endpoint",
    })
}

fn parse(value: &str) -> ConfigResult<Url> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        value: value.to_string(),
        source,
    })
}

fn split_scp_like(value: &str) -> Option<(&str, &str)> {
    if value.contains("://") {
        return None;
    }
    let (authority, path) = value.split_once(':')?;
    if authority.is_empty() || authority.contains('/') || path.is_empty() {
        return None;
    }
    Some((authority, path))
}

fn with_lfs_suffix(mut url: Url) -> Url {
    let mut path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with(".git") {
        path.push_str(".git");
    }
    path.push_str("/info/lfs");
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    url
}
