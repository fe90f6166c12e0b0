use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use largo_config::{ConfigSnapshot, LfsSettings, TransferSettings};
use largo_core::{
    Direction, Pointer, Ref, TransferError, TransferStatus, TransferSummary, VerifyError,
    VerifyStatus,
};
use largo_remote::{ApiClient, Credentials, StaticCredentials};
use largo_test_support::batch::{
    batch_response, download_object, object_error, present_object, upload_object,
};
use largo_test_support::fixtures::{TestRepo, object_id};
use largo_transfer::{
    BasicAdapter, BatchClient, ObjectStore, RetryPolicy, TransferQueue, VerifyBudget, Verifier,
    spawn_scan,
};

struct Harness {
    settings: TransferSettings,
    client: ApiClient,
    endpoint: url::Url,
}

impl Harness {
    fn new(server: &MockServer, pairs: &[(&str, String)]) -> anyhow::Result<Self> {
        let mut snapshot = ConfigSnapshot::from_pairs(pairs.iter().cloned());
        snapshot.insert("lfs.url", server.url("/repo.git/info/lfs"));
        let lfs = LfsSettings::new(snapshot);
        let mut settings = lfs.transfer()?;
        settings.base_retry_delay = Duration::ZERO;
        settings.max_retry_delay = Duration::ZERO;
        let client = ApiClient::new(
            reqwest::Client::new(),
            lfs.access_resolver()?,
            Arc::new(StaticCredentials::new(Credentials::new("alice", "s3cret"))),
        );
        let endpoint = lfs.endpoint("origin", Direction::Upload)?;
        Ok(Self {
            settings,
            client,
            endpoint,
        })
    }

    fn queue(&self, direction: Direction, store: ObjectStore) -> TransferQueue {
        let adapter = Arc::new(BasicAdapter::new(self.client.clone(), store));
        let batch = BatchClient::new(self.client.clone(), self.endpoint.clone());
        TransferQueue::new(direction, batch, adapter, self.settings.clone())
            .with_ref(Some(Ref::new("main")))
    }

    fn verifier(&self) -> Verifier {
        Verifier::new(
            self.client.clone(),
            Arc::new(VerifyBudget::new(self.settings.max_verifies)),
            RetryPolicy::from_settings(&self.settings),
            self.settings.activity_timeout,
        )
    }
}

fn report<'a>(summary: &'a TransferSummary, pointer: &Pointer) -> &'a largo_core::TransferReport {
    summary
        .reports
        .iter()
        .find(|report| report.oid == pointer.oid)
        .unwrap_or_else(|| panic!("no report for {}", pointer.oid))
}

#[tokio::test]
async fn push_uploads_scanned_objects_and_verifies_them() -> anyhow::Result<()> {
    let repo = TestRepo::new()?;
    let logo = repo.track("assets/logo.png", b"logo bytes")?;
    let video = repo.track("media/intro.mp4", b"intro video bytes")?;
    let present = repo.track("media/outro.mp4", b"already uploaded")?;
    repo.write_file("README.md", "plain text stays untouched")?;

    let server = MockServer::start_async().await;
    let batch = server.mock(|when, then| {
        when.method(POST).path("/repo.git/info/lfs/objects/batch");
        then.status(200).json_body(batch_response(vec![
            upload_object(
                &logo.oid,
                logo.size,
                &server.url(format!("/storage/{}", logo.oid)),
                Some(&server.url("/verify")),
            ),
            upload_object(
                &video.oid,
                video.size,
                &server.url(format!("/storage/{}", video.oid)),
                Some(&server.url("/verify")),
            ),
            present_object(&present.oid, present.size),
        ]));
    });
    let logo_put = server.mock(|when, then| {
        when.method(PUT)
            .path(format!("/storage/{}", logo.oid))
            .header("authorization", "Bearer upload")
            .body("logo bytes");
        then.status(200);
    });
    let video_put = server.mock(|when, then| {
        when.method(PUT)
            .path(format!("/storage/{}", video.oid))
            .body("intro video bytes");
        then.status(200);
    });
    let present_put = server.mock(|when, then| {
        when.method(PUT)
            .path(format!("/storage/{}", present.oid));
        then.status(200);
    });
    let verify = server.mock(|when, then| {
        when.method(POST).path("/verify").header("foo", "bar");
        then.status(200);
    });

    let harness = Harness::new(&server, &[])?;
    let queue = harness
        .queue(Direction::Upload, ObjectStore::for_git_dir(&repo.git_dir()))
        .with_verifier(harness.verifier());
    let stream = spawn_scan(repo.root().to_path_buf(), vec![".".into()], 8);
    let summary = queue.run_stream(stream).await?;

    batch.assert();
    logo_put.assert();
    video_put.assert();
    present_put.assert_calls(0);
    verify.assert_calls(2);
    assert!(summary.is_success(), "{summary:?}");
    assert_eq!(summary.reports.len(), 3);
    assert_eq!(report(&summary, &logo).verify, VerifyStatus::Verified);
    assert_eq!(report(&summary, &present).status, TransferStatus::Skipped);
    Ok(())
}

#[tokio::test]
async fn zero_verify_budget_skips_verification_but_keeps_the_upload() -> anyhow::Result<()> {
    let repo = TestRepo::new()?;
    let logo = repo.track("logo.png", b"logo bytes")?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/repo.git/info/lfs/objects/batch");
        then.status(200).json_body(batch_response(vec![upload_object(
            &logo.oid,
            logo.size,
            &server.url("/storage/logo"),
            Some(&server.url("/verify")),
        )]));
    });
    let put = server.mock(|when, then| {
        when.method(PUT).path("/storage/logo");
        then.status(200);
    });
    let verify = server.mock(|when, then| {
        when.method(POST).path("/verify");
        then.status(200);
    });

    let harness = Harness::new(&server, &[("lfs.transfer.maxverifies", "0".to_string())])?;
    let summary = harness
        .queue(Direction::Upload, ObjectStore::for_git_dir(&repo.git_dir()))
        .with_verifier(harness.verifier())
        .run(vec![logo.clone()])
        .await;

    put.assert();
    verify.assert_calls(0);
    assert!(summary.is_success());
    assert_eq!(report(&summary, &logo).verify, VerifyStatus::BudgetExhausted);
    Ok(())
}

#[tokio::test]
async fn verify_endpoint_with_access_none_never_sees_credentials() -> anyhow::Result<()> {
    let repo = TestRepo::new()?;
    let logo = repo.track("logo.png", b"logo bytes")?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/repo.git/info/lfs/objects/batch");
        then.status(200).json_body(batch_response(vec![upload_object(
            &logo.oid,
            logo.size,
            &server.url("/storage/logo"),
            Some(&server.url("/verify")),
        )]));
    });
    server.mock(|when, then| {
        when.method(PUT).path("/storage/logo");
        then.status(200);
    });
    let with_auth = server.mock(|when, then| {
        when.method(POST).path("/verify").header_exists("authorization");
        then.status(500);
    });
    let without_auth = server.mock(|when, then| {
        when.method(POST)
            .path("/verify")
            .header_missing("authorization")
            .header("content-type", "application/vnd.git-lfs+json");
        then.status(200);
    });

    let harness = Harness::new(
        &server,
        &[
            (
                &format!("lfs.{}.access", server.base_url()),
                "basic".to_string(),
            ),
            (&format!("lfs.{}.access", server.url("/verify")), "none".to_string()),
        ],
    )?;
    let summary = harness
        .queue(Direction::Upload, ObjectStore::for_git_dir(&repo.git_dir()))
        .with_verifier(harness.verifier())
        .run(vec![logo.clone()])
        .await;

    with_auth.assert_calls(0);
    without_auth.assert();
    assert_eq!(report(&summary, &logo).verify, VerifyStatus::Verified);
    Ok(())
}

#[tokio::test]
async fn fetch_stores_checked_objects_and_rejects_corrupt_ones() -> anyhow::Result<()> {
    let repo = TestRepo::new()?;
    let good = repo.track_remote("good.bin", b"the real bytes")?;
    let corrupt = repo.track_remote("corrupt.bin", b"expected bytes")?;
    let missing = repo.track_remote("missing.bin", b"gone for good")?;

    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/repo.git/info/lfs/objects/batch");
        then.status(200).json_body(batch_response(vec![
            download_object(&good.oid, good.size, &server.url("/objects/good")),
            download_object(&corrupt.oid, corrupt.size, &server.url("/objects/corrupt")),
            object_error(&missing.oid, missing.size, 404, "Object does not exist"),
        ]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/objects/good");
        then.status(200).body("the real bytes");
    });
    server.mock(|when, then| {
        when.method(GET).path("/objects/corrupt");
        then.status(200).body("tampered bytes");
    });

    let harness = Harness::new(&server, &[])?;
    let store = ObjectStore::for_git_dir(&repo.git_dir());
    let summary = harness
        .queue(Direction::Download, store.clone())
        .run(vec![good.clone(), corrupt.clone(), missing.clone()])
        .await;

    assert!(!summary.is_success());
    assert_eq!(
        report(&summary, &good).status,
        TransferStatus::Completed { bytes: good.size }
    );
    assert!(store.contains(&good.oid, good.size).await);
    assert_eq!(std::fs::read(repo.object_path(&good.oid))?, b"the real bytes");
    assert!(matches!(
        report(&summary, &corrupt).status,
        TransferStatus::Failed(TransferError::ChecksumMismatch { .. })
    ));
    assert!(!store.contains(&corrupt.oid, corrupt.size).await);
    assert!(matches!(
        report(&summary, &missing).status,
        TransferStatus::Failed(TransferError::Object { code: 404, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn throttled_downloads_stop_after_the_configured_retries() -> anyhow::Result<()> {
    let repo = TestRepo::new()?;
    let pointer = repo.track_remote("busy.bin", b"busy")?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/repo.git/info/lfs/objects/batch");
        then.status(200).json_body(batch_response(vec![download_object(
            &pointer.oid,
            pointer.size,
            &server.url("/objects/busy"),
        )]));
    });
    let download = server.mock(|when, then| {
        when.method(GET).path("/objects/busy");
        then.status(503).body("try later");
    });

    let harness = Harness::new(&server, &[("lfs.transfer.maxretries", "2".to_string())])?;
    let summary = harness
        .queue(Direction::Download, ObjectStore::for_git_dir(&repo.git_dir()))
        .run(vec![pointer.clone()])
        .await;

    download.assert_calls(3);
    let report = report(&summary, &pointer);
    assert_eq!(report.attempts, 3);
    assert!(matches!(
        &report.status,
        TransferStatus::Failed(TransferError::RetriesExhausted { attempts: 3, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn failed_verification_does_not_roll_back_the_upload() -> anyhow::Result<()> {
    let repo = TestRepo::new()?;
    let logo = repo.track("logo.png", b"logo bytes")?;
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/repo.git/info/lfs/objects/batch");
        then.status(200).json_body(batch_response(vec![upload_object(
            &logo.oid,
            logo.size,
            &server.url("/storage/logo"),
            Some(&server.url("/verify")),
        )]));
    });
    server.mock(|when, then| {
        when.method(PUT).path("/storage/logo");
        then.status(200);
    });
    server.mock(|when, then| {
        when.method(POST).path("/verify");
        then.status(422).body("object size mismatch");
    });

    let harness = Harness::new(&server, &[])?;
    let summary = harness
        .queue(Direction::Upload, ObjectStore::for_git_dir(&repo.git_dir()))
        .with_verifier(harness.verifier())
        .run(vec![logo.clone()])
        .await;

    let report = report(&summary, &logo);
    assert_eq!(report.status, TransferStatus::Completed { bytes: logo.size });
    assert!(matches!(
        &report.verify,
        VerifyStatus::Failed(VerifyError::Status { status: 422, .. })
    ));
    assert!(!summary.is_success());
    assert_eq!(object_id(b"logo bytes"), logo.oid);
    Ok(())
}
