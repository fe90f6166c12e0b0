//! `basic` transfer adapter: plain HTTP `PUT`/`GET` against action hrefs.

use async_trait::async_trait;
use futures_util::StreamExt;
use largo_core::{Action, Transfer, TransferAdapter, TransferError, TransferResult};
use largo_remote::{ApiClient, RemoteError, status_error, with_headers};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Body, Url};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::store::{ObjectStore, storage};

/// Moves object bytes between the local store and action hrefs.
#[derive(Clone)]
pub struct BasicAdapter {
    client: ApiClient,
    store: ObjectStore,
}

impl BasicAdapter {
    /// Adapter reading from and writing to `store`.
    #[must_use]
    pub const fn new(client: ApiClient, store: ObjectStore) -> Self {
        Self { client, store }
    }

    fn href(action: &Action) -> TransferResult<Url> {
        Url::parse(&action.href).map_err(|err| TransferError::Rejected {
            status: 0,
            message: format!("invalid action href {:?}: {err}", action.href),
        })
    }
}

#[async_trait]
impl TransferAdapter for BasicAdapter {
    fn name(&self) -> &'static str {
        "basic"
    }

    async fn upload(&self, transfer: &Transfer, action: &Action) -> TransferResult<u64> {
        let url = Self::href(action)?;
        // Fail before any request when the object is absent or resized.
        drop(self.store.open(&transfer.oid, transfer.size).await?);

        let response = self
            .client
            .execute(|| async {
                let file = self
                    .store
                    .open(&transfer.oid, transfer.size)
                    .await
                    .map_err(|err| RemoteError::Build {
                        message: err.to_string(),
                    })?;
                let request = self
                    .client
                    .http()
                    .put(url.clone())
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .header(CONTENT_LENGTH, transfer.size)
                    .body(Body::from(file))
                    .build()
                    .map_err(|err| RemoteError::Build {
                        message: err.to_string(),
                    })?;
                with_headers(request, &action.header)
            })
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await.into());
        }
        debug!(oid = %transfer.oid, bytes = transfer.size, "uploaded object");
        Ok(transfer.size)
    }

    async fn download(&self, transfer: &Transfer, action: &Action) -> TransferResult<u64> {
        let url = Self::href(action)?;
        let response = self
            .client
            .execute(|| async {
                let request = self
                    .client
                    .http()
                    .get(url.clone())
                    .build()
                    .map_err(|err| RemoteError::Build {
                        message: err.to_string(),
                    })?;
                with_headers(request, &action.header)
            })
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await.into());
        }

        let (temp, mut file) = self.store.temp_file(&transfer.oid).await?;
        let received = receive(response, &mut file, transfer).await;
        let result = match received {
            Ok(()) => file
                .flush()
                .await
                .map_err(|err| storage("flush object", &err)),
            Err(err) => Err(err),
        };
        drop(file);
        if let Err(err) = result {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(err);
        }
        self.store.commit(&temp, &transfer.oid).await?;
        debug!(oid = %transfer.oid, bytes = transfer.size, "downloaded object");
        Ok(transfer.size)
    }
}

async fn receive(
    response: reqwest::Response,
    file: &mut tokio::fs::File,
    transfer: &Transfer,
) -> TransferResult<()> {
    let mut hasher = Sha256::new();
    let mut received = 0_u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|err| TransferError::transient(format!("body read failed: {err}")))?;
        received += chunk.len() as u64;
        if received > transfer.size {
            return Err(TransferError::SizeMismatch {
                expected: transfer.size,
                actual: received,
            });
        }
        hasher.update(&chunk);
        file.write_all(&chunk)
            .await
            .map_err(|err| storage("write object", &err))?;
    }
    if received != transfer.size {
        return Err(TransferError::SizeMismatch {
            expected: transfer.size,
            actual: received,
        });
    }
    let actual = format!("{:x}", hasher.finalize());
    if actual != transfer.oid {
        return Err(TransferError::ChecksumMismatch {
            expected: transfer.oid.clone(),
            actual,
        });
    }
    Ok(())
}
