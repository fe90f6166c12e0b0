//! Value parsers for git-config settings.

use crate::error::{ConfigError, ConfigResult};
use crate::snapshot::ConfigSnapshot;

pub(crate) fn parse_u64(snapshot: &ConfigSnapshot, key: &str, default: u64) -> ConfigResult<u64> {
    let Some(raw) = snapshot.get(key) else {
        return Ok(default);
    };
    raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidField {
        key: key.to_string(),
        value: raw.to_string(),
        reason: "must be a non-negative integer",
    })
}

pub(crate) fn parse_u32(snapshot: &ConfigSnapshot, key: &str, default: u32) -> ConfigResult<u32> {
    let value = parse_u64(snapshot, key, u64::from(default))?;
    u32::try_from(value).map_err(|_| ConfigError::InvalidField {
        key: key.to_string(),
        value: value.to_string(),
        reason: "must fit within 32 bits",
    })
}

/// Parse a count that must be at least one.
pub(crate) fn parse_positive(
    snapshot: &ConfigSnapshot,
    key: &str,
    default: usize,
) -> ConfigResult<usize> {
    let value = parse_u64(snapshot, key, default as u64)?;
    let value = usize::try_from(value).map_err(|_| ConfigError::InvalidField {
        key: key.to_string(),
        value: value.to_string(),
        reason: "is too large",
    })?;
    if value == 0 {
        return Err(ConfigError::InvalidField {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be at least 1",
        });
    }
    Ok(value)
}

/// Parse a git boolean (`true/yes/on/1` and `false/no/off/0`).
pub(crate) fn parse_bool(snapshot: &ConfigSnapshot, key: &str, default: bool) -> ConfigResult<bool> {
    let Some(raw) = snapshot.get(key) else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" | "" => Ok(false),
        _ => Err(ConfigError::InvalidField {
            key: key.to_string(),
            value: raw.to_string(),
            reason: "must be a boolean",
        }),
    }
}
