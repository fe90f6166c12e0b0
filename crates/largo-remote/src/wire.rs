//! Wire-level constants and response helpers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Response;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::Deserialize;
use url::Url;

/// Media type for every JSON request and response of the protocol.
pub const MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// Error document returned by the remote alongside non-2xx statuses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    /// Human readable message.
    #[serde(default)]
    pub message: String,
    /// Identifier the remote assigned to the request.
    #[serde(default)]
    pub request_id: Option<String>,
    /// Link to further documentation.
    #[serde(default)]
    pub documentation_url: Option<String>,
}

impl ApiErrorBody {
    /// Decode an error body, falling back to the trimmed text when it is not JSON.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        serde_json::from_slice::<Self>(bytes)
            .ok()
            .filter(|body| !body.message.is_empty())
            .unwrap_or_else(|| Self {
                message: String::from_utf8_lossy(bytes).trim().to_string(),
                ..Self::default()
            })
    }

    /// Message with the documentation link appended when present.
    #[must_use]
    pub fn describe(&self, status: u16) -> String {
        let message = if self.message.is_empty() {
            format!("request failed with status {status}")
        } else {
            self.message.clone()
        };
        match &self.documentation_url {
            Some(url) => format!("{message} (see {url})"),
            None => message,
        }
    }
}

/// Append `path` to an endpoint URL, keeping every existing path segment.
///
/// # Errors
///
/// Returns the parse error when the joined URL is invalid.
pub fn join_endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

/// Parse a `Retry-After` header given as delta-seconds or an HTTP date.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Status, retry hint, and decoded error body of a non-2xx response.
pub(crate) async fn read_failure(response: Response) -> (u16, Option<Duration>, ApiErrorBody) {
    let status = response.status().as_u16();
    let retry_after = parse_retry_after(response.headers(), Utc::now());
    let bytes = response.bytes().await.unwrap_or_default();
    (status, retry_after, ApiErrorBody::from_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn error_bodies_prefer_json_message() {
        let body = ApiErrorBody::from_bytes(
            br#"{"message":"quota exceeded","request_id":"r-1","documentation_url":"https://docs.test/quota"}"#,
        );
        assert_eq!(body.request_id.as_deref(), Some("r-1"));
        assert_eq!(
            body.describe(507),
            "quota exceeded (see https://docs.test/quota)"
        );

        let plain = ApiErrorBody::from_bytes(b"  bad gateway \n");
        assert_eq!(plain.describe(502), "bad gateway");
        assert_eq!(
            ApiErrorBody::from_bytes(b"").describe(500),
            "request failed with status 500"
        );
    }

    #[test]
    fn endpoints_keep_their_path() -> Result<(), url::ParseError> {
        let base = Url::parse("https://h.test/team/repo.git/info/lfs")?;
        assert_eq!(
            join_endpoint(&base, "objects/batch")?.as_str(),
            "https://h.test/team/repo.git/info/lfs/objects/batch"
        );
        let slashed = Url::parse("https://h.test/lfs/")?;
        assert_eq!(
            join_endpoint(&slashed, "/locks/verify")?.as_str(),
            "https://h.test/lfs/locks/verify"
        );
        Ok(())
    }

    #[test]
    fn retry_after_accepts_seconds_and_dates() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers, now), Some(Duration::from_secs(7)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers, now), Some(Duration::ZERO));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));
        assert_eq!(parse_retry_after(&headers, now), None);
    }
}
