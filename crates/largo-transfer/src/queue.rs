//! Transfer queue: batch coordinator plus a bounded worker pool.
//!
//! # Design
//! - The coordinator owns negotiation, deduplication and reporting; workers only run
//!   actions and send events back.
//! - Jobs travel over one bounded channel shared by the pool, so each job is received
//!   by exactly one worker.
//! - Every object reaches the observer exactly once, always from the coordinator.
//! - Fail-fast flips a watch flag. Workers check it before each attempt and wake from
//!   retry backoff when it flips, but never abort a request already in flight.
//! - A batch failure stops negotiation; objects not yet negotiated are reported as
//!   unnegotiated while in-flight work completes.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use largo_config::TransferSettings;
use largo_core::{
    ActionSet, Direction, NoopObserver, Pointer, ProgressObserver, Ref, Transfer, TransferAdapter,
    TransferError, TransferReport, TransferStatus, TransferSummary,
};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::batch::{BatchClient, BatchItem};
use crate::error::StreamError;
use crate::retry::{RetryPolicy, backoff};
use crate::stream::PointerStream;
use crate::verify::Verifier;

/// Actions expiring within this window are sent back for renewal.
const EXPIRY_WINDOW_SECS: i64 = 5;
/// Renewals allowed per object before it fails as expired.
const MAX_RENEWALS: u32 = 3;

/// Negotiates batches and executes their actions for one direction.
#[derive(Clone)]
pub struct TransferQueue {
    direction: Direction,
    batch: BatchClient,
    adapter: Arc<dyn TransferAdapter>,
    verifier: Option<Verifier>,
    observer: Arc<dyn ProgressObserver>,
    settings: TransferSettings,
    remote_ref: Option<Ref>,
}

impl TransferQueue {
    /// Queue running `adapter` for `direction`. The batch client advertises the
    /// adapter's name.
    #[must_use]
    pub fn new(
        direction: Direction,
        batch: BatchClient,
        adapter: Arc<dyn TransferAdapter>,
        settings: TransferSettings,
    ) -> Self {
        let batch = batch.with_adapters(vec![adapter.name()]);
        Self {
            direction,
            batch,
            adapter,
            verifier: None,
            observer: Arc::new(NoopObserver),
            settings,
            remote_ref: None,
        }
    }

    /// Confirm uploads through `verifier`.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    /// Send progress to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Negotiate batches against `remote_ref`.
    #[must_use]
    pub fn with_ref(mut self, remote_ref: Option<Ref>) -> Self {
        self.remote_ref = remote_ref;
        self
    }

    /// Transfer a known set of pointers.
    pub async fn run(&self, pointers: Vec<Pointer>) -> TransferSummary {
        let mut stream = PointerStream::from_pointers(pointers);
        self.process(&mut stream).await
    }

    /// Transfer every pointer the stream yields, then collect its outcome.
    ///
    /// # Errors
    ///
    /// Returns the stream's terminal error once all started work has finished.
    pub async fn run_stream(
        &self,
        mut stream: PointerStream,
    ) -> Result<TransferSummary, StreamError> {
        let summary = self.process(&mut stream).await;
        stream.wait().await?;
        Ok(summary)
    }

    async fn process(&self, stream: &mut PointerStream) -> TransferSummary {
        let batch_size = self.settings.batch_size.max(1);
        let workers = self.settings.concurrency.max(1);
        let (job_tx, job_rx) = mpsc::channel::<Job>(batch_size.max(workers));
        let (event_tx, mut events) = mpsc::unbounded_channel::<Event>();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut pool = JoinSet::new();
        for id in 0..workers {
            let worker = Worker {
                id,
                direction: self.direction,
                adapter: Arc::clone(&self.adapter),
                verifier: self.verifier.clone(),
                observer: Arc::clone(&self.observer),
                retry: RetryPolicy::from_settings(&self.settings),
                timeout: self.settings.activity_timeout,
                jobs: Arc::clone(&job_rx),
                events: event_tx.clone(),
                cancel: cancel_rx.clone(),
            };
            pool.spawn(worker.run());
        }
        drop(event_tx);

        let mut coordinator = Coordinator {
            queue: self,
            batch_size,
            jobs: Some(job_tx),
            cancel: cancel_tx,
            seen: HashSet::new(),
            pending: Vec::new(),
            renew: Vec::new(),
            inflight: HashMap::new(),
            halted: None,
            summary: TransferSummary::default(),
        };

        let mut open = true;
        loop {
            if !coordinator.renew.is_empty() {
                coordinator.renew_expired().await;
            }
            if !open {
                coordinator.flush().await;
                if coordinator.inflight.is_empty() && coordinator.renew.is_empty() {
                    break;
                }
            }
            tokio::select! {
                pointer = stream.next_pointer(), if open => match pointer {
                    Some(pointer) => coordinator.accept(pointer).await,
                    None => open = false,
                },
                event = events.recv() => match event {
                    Some(event) => coordinator.handle(event),
                    None => break,
                },
            }
        }

        coordinator.jobs = None;
        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "transfer worker ended abnormally");
            }
        }
        while let Ok(event) = events.try_recv() {
            coordinator.handle(event);
        }
        coordinator.finish()
    }
}

struct Job {
    transfer: Transfer,
    renewals: u32,
}

enum Event {
    Done(TransferReport),
    Expired { transfer: Transfer, renewals: u32 },
}

struct Coordinator<'a> {
    queue: &'a TransferQueue,
    batch_size: usize,
    jobs: Option<mpsc::Sender<Job>>,
    cancel: watch::Sender<bool>,
    seen: HashSet<String>,
    pending: Vec<Pointer>,
    renew: Vec<(Pointer, u32)>,
    inflight: HashMap<String, Pointer>,
    // Reason every not-yet-negotiated object fails once the run stops negotiating.
    halted: Option<TransferError>,
    summary: TransferSummary,
}

impl Coordinator<'_> {
    async fn accept(&mut self, pointer: Pointer) {
        if !self.seen.insert(pointer.oid.clone()) {
            debug!(oid = %pointer.oid, path = ?pointer.path, "duplicate object skipped");
            return;
        }
        if let Some(error) = self.halted.clone() {
            self.fail(&pointer, error);
            return;
        }
        self.pending.push(pointer);
        if self.pending.len() >= self.batch_size {
            let pending = mem::take(&mut self.pending);
            self.negotiate(pending.into_iter().map(|pointer| (pointer, 0)).collect())
                .await;
        }
    }

    async fn flush(&mut self) {
        let mut work: Vec<(Pointer, u32)> = mem::take(&mut self.renew);
        work.extend(mem::take(&mut self.pending).into_iter().map(|pointer| (pointer, 0)));
        if !work.is_empty() {
            self.negotiate(work).await;
        }
    }

    async fn renew_expired(&mut self) {
        let renew = mem::take(&mut self.renew);
        self.negotiate(renew).await;
    }

    async fn negotiate(&mut self, work: Vec<(Pointer, u32)>) {
        for chunk in work.chunks(self.batch_size) {
            if let Some(error) = self.halted.clone() {
                for (pointer, _) in chunk {
                    self.fail(pointer, error.clone());
                }
                continue;
            }
            let pointers: Vec<Pointer> = chunk.iter().map(|(pointer, _)| pointer.clone()).collect();
            let renewals: HashMap<&str, u32> = chunk
                .iter()
                .map(|(pointer, renewals)| (pointer.oid.as_str(), *renewals))
                .collect();
            let queue = self.queue;
            match queue
                .batch
                .negotiate(queue.direction, &pointers, queue.remote_ref.as_ref())
                .await
            {
                Ok(items) => {
                    for item in items {
                        let renewals = renewals.get(item.oid()).copied().unwrap_or(0);
                        self.dispatch(item, renewals).await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, objects = pointers.len(), "batch negotiation failed; no further batches will be sent");
                    let error = TransferError::Unnegotiated {
                        message: err.to_string(),
                    };
                    self.halted = Some(error.clone());
                    if self.summary.protocol_error.is_none() {
                        self.summary.protocol_error = Some(err);
                    }
                    for pointer in &pointers {
                        self.fail(pointer, error.clone());
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, item: BatchItem, renewals: u32) {
        match item {
            BatchItem::Ready(transfer) => {
                if let Some(error) = self.halted.clone() {
                    self.fail(&transfer.pointer(), error);
                    return;
                }
                let Some(jobs) = self.jobs.as_ref() else {
                    self.fail(&transfer.pointer(), TransferError::Cancelled);
                    return;
                };
                let pointer = transfer.pointer();
                self.inflight.insert(pointer.oid.clone(), pointer.clone());
                if jobs.send(Job { transfer, renewals }).await.is_err() {
                    self.inflight.remove(&pointer.oid);
                    self.fail(&pointer, TransferError::Cancelled);
                }
            }
            BatchItem::Skipped(transfer) => {
                debug!(oid = %transfer.oid, "remote offered no action; nothing to transfer");
                let report = TransferReport::for_transfer(
                    &transfer,
                    self.queue.direction,
                    TransferStatus::Skipped,
                );
                self.report(report);
            }
            BatchItem::Failed { pointer, error } => {
                self.trip_fail_fast(&pointer.oid, &error);
                self.fail(&pointer, error);
            }
        }
    }

    /// Stop the run after a permanent object failure when fail-fast is on.
    fn trip_fail_fast(&mut self, oid: &str, error: &TransferError) {
        if *error == TransferError::Cancelled
            || !self.queue.settings.fail_fast
            || self.halted.is_some()
        {
            return;
        }
        warn!(oid, error = %error, "fail-fast: cancelling remaining transfers");
        self.halted = Some(TransferError::Cancelled);
        self.cancel.send_replace(true);
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Done(report) => {
                self.inflight.remove(&report.oid);
                if let TransferStatus::Failed(error) = &report.status {
                    self.trip_fail_fast(&report.oid, error);
                }
                self.report(report);
            }
            Event::Expired { transfer, renewals } => {
                self.inflight.remove(&transfer.oid);
                let pointer = transfer.pointer();
                if let Some(error) = self.halted.clone() {
                    self.fail(&pointer, error);
                } else if renewals >= MAX_RENEWALS {
                    self.fail(&pointer, TransferError::Expired);
                } else {
                    debug!(oid = %pointer.oid, renewals, "action expired; renegotiating");
                    self.renew.push((pointer, renewals + 1));
                }
            }
        }
    }

    fn fail(&mut self, pointer: &Pointer, error: TransferError) {
        let transfer = Transfer::from_pointer(pointer, ActionSet::default());
        let report = TransferReport::for_transfer(
            &transfer,
            self.queue.direction,
            TransferStatus::Failed(error),
        );
        self.report(report);
    }

    fn report(&mut self, report: TransferReport) {
        self.queue.observer.on_complete(&report);
        self.summary.reports.push(report);
    }

    fn finish(mut self) -> TransferSummary {
        let leftover: Vec<Pointer> = self
            .pending
            .drain(..)
            .chain(self.renew.drain(..).map(|(pointer, _)| pointer))
            .chain(self.inflight.drain().map(|(_, pointer)| pointer))
            .collect();
        for pointer in &leftover {
            self.fail(pointer, TransferError::Cancelled);
        }
        let failed = self.summary.failed().count();
        info!(
            direction = %self.queue.direction,
            objects = self.summary.reports.len(),
            failed,
            "transfer run finished"
        );
        self.summary
    }
}

struct Worker {
    id: usize,
    direction: Direction,
    adapter: Arc<dyn TransferAdapter>,
    verifier: Option<Verifier>,
    observer: Arc<dyn ProgressObserver>,
    retry: RetryPolicy,
    timeout: Duration,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    events: mpsc::UnboundedSender<Event>,
    cancel: watch::Receiver<bool>,
}

impl Worker {
    async fn run(self) {
        loop {
            let job = self.jobs.lock().await.recv().await;
            let Some(job) = job else {
                break;
            };
            let event = self.execute(job).await;
            if self.events.send(event).is_err() {
                break;
            }
        }
        debug!(worker = self.id, "transfer worker stopped");
    }

    fn cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    fn finished(&self, transfer: &Transfer, status: TransferStatus, attempts: u32) -> TransferReport {
        let mut report = TransferReport::for_transfer(transfer, self.direction, status);
        report.attempts = attempts;
        report
    }

    async fn execute(&self, job: Job) -> Event {
        let Job { transfer, renewals } = job;
        if self.cancelled() {
            let cancelled = TransferStatus::Failed(TransferError::Cancelled);
            return Event::Done(self.finished(&transfer, cancelled, 0));
        }
        let Some(action) = transfer.actions.primary(self.direction).cloned() else {
            return Event::Done(self.finished(&transfer, TransferStatus::Skipped, 0));
        };
        let window = chrono::Duration::seconds(EXPIRY_WINDOW_SECS);

        let mut attempts = 0_u32;
        let status = loop {
            if action.is_expired_within(Utc::now(), window) {
                return Event::Expired { transfer, renewals };
            }
            attempts += 1;
            debug!(worker = self.id, oid = %transfer.oid, attempts, "starting {} action", self.direction);
            let outcome = tokio::time::timeout(
                self.timeout,
                self.adapter.perform(self.direction, &transfer, &action),
            )
            .await
            .unwrap_or_else(|_| {
                Err(TransferError::transient(format!(
                    "no activity within {:?}",
                    self.timeout
                )))
            });

            match outcome {
                Ok(bytes) => break TransferStatus::Completed { bytes },
                Err(err) if err.is_transient() && self.retry.allows_retry(attempts) => {
                    if self.cancelled() {
                        break TransferStatus::Failed(TransferError::Cancelled);
                    }
                    warn!(oid = %transfer.oid, attempts, error = %err, "transient transfer failure; retrying");
                    self.observer.on_retry(&transfer.oid, attempts, &err);
                    let retry_after = match &err {
                        TransferError::Transient { retry_after, .. } => *retry_after,
                        _ => None,
                    };
                    let mut cancel = self.cancel.clone();
                    if !backoff(self.retry.delay(attempts, retry_after), &mut cancel).await {
                        break TransferStatus::Failed(TransferError::Cancelled);
                    }
                }
                Err(err) if err.is_transient() => {
                    break TransferStatus::Failed(TransferError::RetriesExhausted {
                        attempts,
                        last: err.to_string(),
                    });
                }
                Err(err) => {
                    debug!(oid = %transfer.oid, attempts, error = %err, "permanent transfer failure");
                    break TransferStatus::Failed(err);
                }
            }
        };

        let completed = matches!(status, TransferStatus::Completed { .. });
        let mut report = self.finished(&transfer, status, attempts);
        if completed
            && self.direction == Direction::Upload
            && let Some(verifier) = &self.verifier
        {
            report.verify = verifier
                .verify_until_cancelled(&transfer, self.cancel.clone())
                .await;
        }
        Event::Done(report)
    }
}
