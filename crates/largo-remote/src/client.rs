//! Access-mode aware HTTP client.
//!
//! # Design
//! - Credentials are attached according to the access mode resolved for the exact
//!   request URL, so a verify href can be anonymous while the batch endpoint is not.
//! - `Empty` requests go out anonymously and are replayed once with basic credentials
//!   on a 401; `None` never carries credentials added by the client.
//! - Headers supplied by the caller (action headers) are never overridden.

use std::future::Future;
use std::sync::Arc;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use reqwest::{Client, Method, Request, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use largo_config::{AccessMode, AccessResolver};

use crate::credentials::{CredentialProvider, Credentials};
use crate::error::{RemoteError, RemoteResult};
use crate::wire::{MEDIA_TYPE, read_failure};

/// Shared HTTP client for every remote interaction of one invocation.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    access: AccessResolver,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    /// Build a client.
    #[must_use]
    pub fn new(
        http: Client,
        access: AccessResolver,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            http,
            access,
            credentials,
        }
    }

    /// Underlying reqwest client.
    #[must_use]
    pub const fn http(&self) -> &Client {
        &self.http
    }

    /// Access mode for `url`.
    #[must_use]
    pub fn access_for(&self, url: &Url) -> AccessMode {
        self.access.access_for_url(url)
    }

    /// Build a JSON request carrying the protocol media type and `extra` headers.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Build`] when a header or body cannot be encoded.
    pub fn json_request<B, I, K, V>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&B>,
        extra: I,
    ) -> RemoteResult<Request>
    where
        B: Serialize + ?Sized,
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = self
            .http
            .request(method, url.clone())
            .header(ACCEPT, MEDIA_TYPE);
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body).map_err(|err| RemoteError::Build {
                message: format!("unable to encode request body: {err}"),
            })?;
            builder = builder.header(CONTENT_TYPE, MEDIA_TYPE).body(bytes);
        }
        let mut request = builder.build().map_err(|err| RemoteError::Build {
            message: err.to_string(),
        })?;
        apply_headers(&mut request, extra)?;
        Ok(request)
    }

    /// Attach credentials to `request` as `mode` demands.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Credentials`] when `mode` is basic and no credentials exist.
    pub async fn authorize(&self, mut request: Request, mode: AccessMode) -> RemoteResult<Request> {
        if mode != AccessMode::Basic || request.headers().contains_key(AUTHORIZATION) {
            return Ok(request);
        }
        let url = request.url().clone();
        let credentials = self
            .lookup(&url)
            .await?
            .ok_or_else(|| RemoteError::Credentials {
                url: url.to_string(),
            })?;
        insert_basic(&mut request, &credentials)?;
        Ok(request)
    }

    /// Execute the request produced by `build`, applying the access mode of its URL.
    ///
    /// `build` is invoked again when an anonymous request must be replayed with
    /// credentials, so streaming bodies can be reopened. Non-2xx responses are
    /// returned as-is.
    ///
    /// # Errors
    ///
    /// Returns an error when `build` fails, credentials are required but missing, or the
    /// request produces no response.
    pub async fn execute<F, Fut>(&self, build: F) -> RemoteResult<Response>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = RemoteResult<Request>> + Send,
    {
        let request = build().await?;
        let url = request.url().clone();
        let mode = self.access_for(&url);
        let carries_auth = request.headers().contains_key(AUTHORIZATION);
        let request = self.authorize(request, mode).await?;
        let response = self.send(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED
            || mode != AccessMode::Empty
            || carries_auth
        {
            return Ok(response);
        }
        let Some(credentials) = self.lookup(&url).await? else {
            return Ok(response);
        };

        debug!(url = %url, "replaying request with basic credentials");
        let mut retry = build().await?;
        insert_basic(&mut retry, &credentials)?;
        let response = self.send(retry).await?;
        match response.status() {
            status if status.is_success() => self.credentials.approve(&url, &credentials).await,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.credentials.reject(&url, &credentials).await;
            }
            _ => {}
        }
        Ok(response)
    }

    /// Send a JSON request and return the raw response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns an error when the request cannot be built or produces no response.
    pub async fn send_json<B>(
        &self,
        method: Method,
        url: &Url,
        body: Option<&B>,
    ) -> RemoteResult<Response>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.execute(|| {
            let request = self.json_request(method.clone(), url, body, NO_HEADERS);
            async move { request }
        })
        .await
    }

    /// Send a JSON request and decode a JSON success body.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Status`] for non-2xx answers and [`RemoteError::Decode`]
    /// when the success body does not decode as `T`.
    pub async fn call_json<B, T>(&self, method: Method, url: &Url, body: Option<&B>) -> RemoteResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send_json(method, url, body).await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        decode(response).await
    }

    async fn send(&self, request: Request) -> RemoteResult<Response> {
        let url = request.url().clone();
        debug!(method = %request.method(), url = %url, "sending request");
        self.http
            .execute(request)
            .await
            .map_err(|err| RemoteError::transport(&url, &err))
    }

    async fn lookup(&self, url: &Url) -> RemoteResult<Option<Credentials>> {
        if let Some(credentials) = Credentials::from_url(url) {
            return Ok(Some(credentials));
        }
        self.credentials.fill(url).await
    }
}

const NO_HEADERS: [(&str, &str); 0] = [];

/// Convert a non-2xx response into [`RemoteError::Status`].
pub async fn status_error(response: Response) -> RemoteError {
    let (status, retry_after, body) = read_failure(response).await;
    RemoteError::Status {
        status,
        message: body.describe(status),
        request_id: body.request_id,
        retry_after,
    }
}

/// Decode a JSON response body.
///
/// # Errors
///
/// Returns [`RemoteError::Decode`] when the body cannot be read or decoded.
pub async fn decode<T: DeserializeOwned>(response: Response) -> RemoteResult<T> {
    let bytes = response.bytes().await.map_err(|err| RemoteError::Decode {
        reason: err.to_string(),
    })?;
    serde_json::from_slice(&bytes).map_err(|err| RemoteError::Decode {
        reason: err.to_string(),
    })
}

fn apply_headers<I, K, V>(request: &mut Request, headers: I) -> RemoteResult<()>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes()).map_err(|_| {
            RemoteError::Build {
                message: format!("invalid header name {:?}", name.as_ref()),
            }
        })?;
        let value = HeaderValue::from_str(value.as_ref()).map_err(|_| RemoteError::Build {
            message: format!("invalid value for header {name}"),
        })?;
        request.headers_mut().insert(name, value);
    }
    Ok(())
}

/// Copy `headers` onto `request`, replacing existing values of the same name.
///
/// # Errors
///
/// Returns [`RemoteError::Build`] when a name or value is not a valid header.
pub fn with_headers<I, K, V>(mut request: Request, headers: I) -> RemoteResult<Request>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    apply_headers(&mut request, headers)?;
    Ok(request)
}

fn insert_basic(request: &mut Request, credentials: &Credentials) -> RemoteResult<()> {
    let mut value =
        HeaderValue::from_str(&credentials.basic_header()).map_err(|_| RemoteError::Build {
            message: "credentials cannot be encoded as a header".to_string(),
        })?;
    value.set_sensitive(true);
    request.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}
