//! Batch protocol client.
//!
//! # Design
//! - One call negotiates one batch; chunking and sequencing belong to the caller so
//!   negotiation of batch N+1 can overlap execution of batch N.
//! - Rejections and malformed responses are distinct `ProtocolError`s; per-object
//!   errors only fail their object.

use std::collections::HashMap;

use chrono::Utc;
use largo_core::{Direction, Pointer, ProtocolError, Ref, Transfer, TransferError};
use largo_remote::{ApiClient, decode, join_endpoint, status_error};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    operation: &'static str,
    transfers: &'a [&'static str],
    objects: Vec<ObjectSpec<'a>>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    remote_ref: Option<RefSpec<'a>>,
}

#[derive(Debug, Serialize)]
struct ObjectSpec<'a> {
    oid: &'a str,
    size: u64,
}

#[derive(Debug, Serialize)]
struct RefSpec<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    transfer: Option<String>,
    #[serde(default)]
    objects: Vec<ObjectResponse>,
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    #[serde(default)]
    oid: Option<String>,
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    actions: largo_core::ActionSet,
    #[serde(default)]
    error: Option<ObjectError>,
}

#[derive(Debug, Deserialize)]
struct ObjectError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// Resolution of one requested object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchItem {
    /// The primary action was offered; the transfer must be executed.
    Ready(Transfer),
    /// No primary action was offered; nothing to do for this object.
    Skipped(Transfer),
    /// The remote reported an error for this object, or left it out of the response.
    Failed {
        /// Object that failed.
        pointer: Pointer,
        /// Permanent failure for the object.
        error: TransferError,
    },
}

impl BatchItem {
    /// Object identifier of the item.
    #[must_use]
    pub fn oid(&self) -> &str {
        match self {
            Self::Ready(transfer) | Self::Skipped(transfer) => &transfer.oid,
            Self::Failed { pointer, .. } => &pointer.oid,
        }
    }
}

/// Client for `POST <endpoint>/objects/batch`.
#[derive(Clone)]
pub struct BatchClient {
    client: ApiClient,
    endpoint: Url,
    adapters: Vec<&'static str>,
}

impl BatchClient {
    /// Client for the endpoint, advertising the `basic` adapter.
    #[must_use]
    pub fn new(client: ApiClient, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            adapters: vec!["basic"],
        }
    }

    /// Advertise `adapters` instead of `basic`.
    #[must_use]
    pub fn with_adapters(mut self, adapters: Vec<&'static str>) -> Self {
        self.adapters = adapters;
        self
    }

    /// Negotiate one batch for `pointers`.
    ///
    /// Returns one item per pointer, in request order.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Rejected`] when the remote refuses the batch,
    /// [`ProtocolError::Malformed`] when its answer breaks the protocol, and
    /// [`ProtocolError::Unreachable`] when no answer arrives.
    pub async fn negotiate(
        &self,
        direction: Direction,
        pointers: &[Pointer],
        remote_ref: Option<&Ref>,
    ) -> Result<Vec<BatchItem>, ProtocolError> {
        if pointers.is_empty() {
            return Ok(Vec::new());
        }
        let url = join_endpoint(&self.endpoint, "objects/batch").map_err(|err| {
            ProtocolError::Unreachable {
                message: format!("invalid batch endpoint: {err}"),
            }
        })?;
        let request = BatchRequest {
            operation: direction.as_str(),
            transfers: &self.adapters,
            objects: pointers
                .iter()
                .map(|pointer| ObjectSpec {
                    oid: &pointer.oid,
                    size: pointer.size,
                })
                .collect(),
            remote_ref: remote_ref.map(|remote_ref| RefSpec {
                name: &remote_ref.name,
            }),
        };

        debug!(%direction, objects = pointers.len(), url = %url, "negotiating batch");
        let response = self
            .client
            .send_json(Method::POST, &url, Some(&request))
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await.into());
        }
        let received_at = Utc::now();
        let body: BatchResponse = decode(response).await?;
        let items = self.resolve(direction, pointers, body, received_at)?;
        info!(
            %direction,
            objects = items.len(),
            ready = items.iter().filter(|item| matches!(item, BatchItem::Ready(_))).count(),
            "negotiated batch"
        );
        Ok(items)
    }

    fn resolve(
        &self,
        direction: Direction,
        pointers: &[Pointer],
        body: BatchResponse,
        received_at: chrono::DateTime<Utc>,
    ) -> Result<Vec<BatchItem>, ProtocolError> {
        let malformed = |reason: String| ProtocolError::Malformed { reason };

        if let Some(name) = body.transfer.as_deref()
            && !self.adapters.contains(&name)
        {
            return Err(malformed(format!("remote selected unknown adapter {name:?}")));
        }

        let requested: HashMap<&str, &Pointer> = pointers
            .iter()
            .map(|pointer| (pointer.oid.as_str(), pointer))
            .collect();
        let mut resolved: HashMap<String, BatchItem> = HashMap::with_capacity(body.objects.len());
        for object in body.objects {
            let oid = object
                .oid
                .ok_or_else(|| malformed("object without oid".to_string()))?;
            let pointer = requested
                .get(oid.as_str())
                .ok_or_else(|| malformed(format!("object {oid} was not requested")))?;

            let item = if let Some(error) = object.error {
                BatchItem::Failed {
                    pointer: (*pointer).clone(),
                    error: TransferError::Object {
                        code: error.code,
                        message: error.message,
                    },
                }
            } else {
                let mut transfer =
                    Transfer::from_pointer(pointer, object.actions.anchored(received_at));
                transfer.authenticated = object.authenticated;
                if transfer.actions.primary(direction).is_some() {
                    BatchItem::Ready(transfer)
                } else {
                    BatchItem::Skipped(transfer)
                }
            };
            resolved.insert(oid, item);
        }

        Ok(pointers
            .iter()
            .map(|pointer| {
                resolved
                    .remove(&pointer.oid)
                    .unwrap_or_else(|| BatchItem::Failed {
                        pointer: pointer.clone(),
                        error: TransferError::Unnegotiated {
                            message: "object missing from batch response".to_string(),
                        },
                    })
            })
            .collect())
    }
}
