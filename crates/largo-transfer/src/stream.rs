//! Bounded producer/consumer conduit for discovered pointers.
//!
//! # Design
//! - Pointers travel over a bounded channel so a slow consumer applies backpressure.
//! - The terminal outcome travels over a separate oneshot and is only read by
//!   [`PointerStream::wait`], after the channel has been drained.
//! - A producer dropped without [`PointerSender::finish`] surfaces as
//!   [`StreamError::ProducerAborted`].

use std::pin::Pin;
use std::task::{Context, Poll};

use largo_core::Pointer;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::Stream;
use tracing::debug;

use crate::error::{ScanError, StreamError};

/// Create a conduit buffering at most `capacity` pointers (minimum one).
#[must_use]
pub fn pointer_channel(capacity: usize) -> (PointerSender, PointerStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (outcome_tx, outcome_rx) = oneshot::channel();
    (
        PointerSender {
            tx,
            outcome: outcome_tx,
        },
        PointerStream {
            rx,
            outcome: outcome_rx,
            delivered: 0,
        },
    )
}

/// Producer half of the conduit.
#[derive(Debug)]
pub struct PointerSender {
    tx: mpsc::Sender<Pointer>,
    outcome: oneshot::Sender<Result<(), ScanError>>,
}

impl PointerSender {
    /// Send one pointer, waiting while the buffer is full.
    ///
    /// Returns `false` when the consumer has gone away.
    pub async fn send(&self, pointer: Pointer) -> bool {
        self.tx.send(pointer).await.is_ok()
    }

    /// Blocking variant of [`Self::send`] for producers running off the runtime.
    ///
    /// Returns `false` when the consumer has gone away.
    #[must_use]
    pub fn blocking_send(&self, pointer: Pointer) -> bool {
        self.tx.blocking_send(pointer).is_ok()
    }

    /// Close the conduit with the producer's outcome. Consumes the sender so the
    /// conduit is closed exactly once.
    pub fn finish(self, outcome: Result<(), ScanError>) {
        let Self { tx, outcome: slot } = self;
        drop(tx);
        if slot.send(outcome).is_err() {
            debug!("pointer consumer dropped before the outcome was reported");
        }
    }
}

/// Consumer half of the conduit.
#[derive(Debug)]
pub struct PointerStream {
    rx: mpsc::Receiver<Pointer>,
    outcome: oneshot::Receiver<Result<(), ScanError>>,
    delivered: usize,
}

impl PointerStream {
    /// Stream over an already known set of pointers.
    #[must_use]
    pub fn from_pointers(pointers: Vec<Pointer>) -> Self {
        let (tx, rx) = mpsc::channel(pointers.len().max(1));
        for pointer in pointers {
            // capacity covers every pointer and the receiver is alive
            let _ = tx.try_send(pointer);
        }
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let _ = outcome_tx.send(Ok(()));
        Self {
            rx,
            outcome: outcome_rx,
            delivered: 0,
        }
    }

    /// Next pointer in discovery order, or `None` once the producer closed the conduit.
    pub async fn next_pointer(&mut self) -> Option<Pointer> {
        let pointer = self.rx.recv().await;
        if pointer.is_some() {
            self.delivered += 1;
        }
        pointer
    }

    /// Pointers handed to the consumer so far.
    #[must_use]
    pub const fn delivered(&self) -> usize {
        self.delivered
    }

    /// Terminal outcome of the producer.
    ///
    /// Calling this before the stream is exhausted is a usage error: the remainder is
    /// drained (so the producer never stays blocked) and [`StreamError::Undrained`]
    /// is returned with the number of discarded pointers.
    ///
    /// # Errors
    ///
    /// Returns the producer's scan failure, [`StreamError::ProducerAborted`], or
    /// [`StreamError::Undrained`].
    pub async fn wait(mut self) -> Result<(), StreamError> {
        let mut remaining = 0_usize;
        while self.rx.recv().await.is_some() {
            remaining += 1;
        }
        let outcome = self.outcome.await;
        if remaining > 0 {
            return Err(StreamError::Undrained {
                remaining,
                scan: outcome.ok().and_then(Result::err),
            });
        }
        match outcome {
            Ok(result) => result.map_err(StreamError::from),
            Err(_) => Err(StreamError::ProducerAborted),
        }
    }
}

impl Stream for PointerStream {
    type Item = Pointer;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Pointer>> {
        let this = self.get_mut();
        let polled = this.rx.poll_recv(cx);
        if let Poll::Ready(Some(_)) = &polled {
            this.delivered += 1;
        }
        polled
    }
}

/// Drain every pointer, then wait for the terminal outcome.
///
/// The pointers received before a failure are returned alongside it.
pub async fn collect_pointers(
    mut stream: PointerStream,
) -> (Vec<Pointer>, Result<(), StreamError>) {
    let mut pointers = Vec::new();
    while let Some(pointer) = stream.next_pointer().await {
        pointers.push(pointer);
    }
    let outcome = stream.wait().await;
    (pointers, outcome)
}
