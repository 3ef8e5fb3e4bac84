//! HTTP transport that drives `SseEventParser` from a single reader task.

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{CancellationToken, SseEvent, SseEventParser, SseParseError};

const ERROR_CHANNEL_CAPACITY: usize = 1;

/// Terminal errors reported by an `EventStream`.
#[derive(Debug, Error)]
pub enum SseStreamError {
    #[error("sse connection failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sse url returned non-success status {status}")]
    HttpStatus { status: u16 },
    #[error(transparent)]
    Parse(#[from] SseParseError),
    #[error("sse stream closed by remote")]
    EndOfStream,
    #[error("sse stream cancelled")]
    Cancelled,
    #[error("sse event queue closed by all consumers")]
    QueueClosed,
}

/// A running SSE reader.
///
/// The reader task owns the event queue's sender and the error channel's
/// sender; it reports exactly one terminal error and then drops both, which
/// closes the queue for consumers and the error channel for the caller.
#[derive(Debug)]
pub struct EventStream {
    errors: mpsc::Receiver<SseStreamError>,
    task: JoinHandle<()>,
}

impl EventStream {
    /// Connects to `url` and spawns the reader task.
    ///
    /// Connection failures and non-success statuses fail immediately without
    /// queueing any events; `output` is dropped in that case, so consumers
    /// observe a closed queue.
    pub async fn start(
        client: &reqwest::Client,
        url: &str,
        output: mpsc::Sender<SseEvent>,
        cancel: CancellationToken,
    ) -> Result<Self, SseStreamError> {
        let request = client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SseStreamError::Cancelled),
            response = request => response?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(SseStreamError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let (error_tx, errors) = mpsc::channel(ERROR_CHANNEL_CAPACITY);
        let task = tokio::spawn(async move {
            let error = read_events(response, &output, &cancel).await;
            tracing::debug!(error = %error, "sse reader exiting");
            let _ = error_tx.try_send(error);
            drop(output);
        });
        tracing::info!(url = url, "sse stream started");

        Ok(Self { errors, task })
    }

    /// Waits for the reader's terminal error.
    ///
    /// Returns `None` once the error channel has been drained and closed.
    pub async fn next_error(&mut self) -> Option<SseStreamError> {
        self.errors.recv().await
    }

    /// Drains any remaining errors and waits for the reader task to exit.
    pub async fn finish(mut self) -> Vec<SseStreamError> {
        let mut remaining = Vec::new();
        while let Some(error) = self.errors.recv().await {
            remaining.push(error);
        }
        if let Err(error) = self.task.await {
            tracing::warn!(error = %error, "sse reader task did not exit cleanly");
        }
        remaining
    }
}

async fn read_events(
    response: reqwest::Response,
    output: &mpsc::Sender<SseEvent>,
    cancel: &CancellationToken,
) -> SseStreamError {
    let mut body = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut parser = SseEventParser::new();

    loop {
        while let Some(pos) = buffer.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = buffer.drain(..=pos).collect();
            match parser.feed(raw.trim_ascii()) {
                Ok(false) => {}
                Ok(true) => {
                    let event = parser.take_event();
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return SseStreamError::Cancelled,
                        sent = output.send(event) => {
                            if sent.is_err() {
                                return SseStreamError::QueueClosed;
                            }
                        }
                    }
                }
                Err(error) => return error.into(),
            }
        }

        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return SseStreamError::Cancelled,
            chunk = body.next() => chunk,
        };
        match chunk {
            Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
            Some(Err(error)) => return error.into(),
            None => return SseStreamError::EndOfStream,
        }
    }
}
