//! Long-lived GET against the streaming host.
//!
//! A background worker owns the HTTP response, cuts the body into records and
//! forwards them over an unbounded channel. The worker never ends the request
//! on its own; callers stop it through [`StreamHandle::destroy`], which aborts
//! the task and drops the socket without a graceful close. Dropping the
//! [`StreamConnection`] also ends the worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use crate::stream::framing::{Framing, RecordSplitter};

/// Errors that end a live feed.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Connection or body read failure.
    #[error("stream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The streaming host refused the request.
    #[error("stream rejected with http status {status}")]
    HttpStatus { status: StatusCode },

    /// The worker task panicked.
    #[error("stream worker failed: {0}")]
    Worker(String),
}

#[derive(Debug, Default)]
struct StreamState {
    closed: AtomicBool,
    destroyed: AtomicBool,
    dropped_fragments: AtomicU64,
}

/// Cloneable handle to the socket behind a live feed.
#[derive(Clone, Debug)]
pub struct StreamHandle {
    abort: AbortHandle,
    state: Arc<StreamState>,
}

impl StreamHandle {
    /// Tears the connection down immediately. No further records are
    /// delivered after this returns.
    pub fn destroy(&self) {
        self.state.destroyed.store(true, Ordering::SeqCst);
        self.state.closed.store(true, Ordering::SeqCst);
        self.abort.abort();
    }

    /// Whether the socket is gone, either destroyed or ended by the peer.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Whether [`StreamHandle::destroy`] was called. A feed ended by the peer
    /// is closed but not destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    /// Fragments that were neither blank nor valid JSON.
    pub fn dropped_fragments(&self) -> u64 {
        self.state.dropped_fragments.load(Ordering::Relaxed)
    }
}

/// An open live feed: a record receiver plus the handle to its socket.
#[derive(Debug)]
pub struct StreamConnection {
    records: mpsc::UnboundedReceiver<Value>,
    handle: StreamHandle,
    task: JoinHandle<Result<(), StreamError>>,
}

impl StreamConnection {
    /// Returns the socket handle. Available before any record arrives.
    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    /// Receives the next record, or `None` once the socket is gone.
    ///
    /// Records still queued when the handle is destroyed are discarded.
    pub async fn recv(&mut self) -> Option<Value> {
        if self.handle.is_destroyed() {
            return None;
        }
        let record = self.records.recv().await?;
        if self.handle.is_destroyed() {
            return None;
        }
        Some(record)
    }

    /// Waits for the worker and reports why the feed ended.
    ///
    /// A feed stopped through [`StreamHandle::destroy`] ends with `Ok(())`.
    pub async fn finish(self) -> Result<(), StreamError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(StreamError::Worker(err.to_string())),
        }
    }
}

pub(crate) fn open_stream(
    http: Client,
    url: Url,
    authorization: HeaderValue,
    framing: Framing,
) -> StreamConnection {
    let (record_tx, record_rx) = mpsc::unbounded_channel();
    let state = Arc::new(StreamState::default());
    let worker_state = Arc::clone(&state);

    let task = tokio::spawn(async move {
        let result = stream_worker(http, url, authorization, framing, record_tx, &worker_state).await;
        worker_state.closed.store(true, Ordering::SeqCst);
        if let Err(err) = &result {
            warn!(event = "stream_failed", error = %err);
        }
        result
    });

    StreamConnection {
        records: record_rx,
        handle: StreamHandle {
            abort: task.abort_handle(),
            state,
        },
        task,
    }
}

async fn stream_worker(
    http: Client,
    url: Url,
    authorization: HeaderValue,
    framing: Framing,
    record_tx: mpsc::UnboundedSender<Value>,
    state: &StreamState,
) -> Result<(), StreamError> {
    debug!(event = "stream_opening", path = url.path());
    let response = http
        .get(url)
        .header(AUTHORIZATION, authorization)
        .header(CONTENT_TYPE, "application/json")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(StreamError::HttpStatus { status });
    }

    let mut splitter = RecordSplitter::new(framing);
    let mut chunks = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            chunk = chunks.next() => chunk,
            _ = record_tx.closed() => {
                debug!(event = "stream_receiver_dropped");
                return Ok(());
            }
        };
        let Some(chunk) = chunk else {
            break;
        };
        let chunk = chunk?;
        for record in splitter.push(&chunk) {
            if record_tx.send(record).is_err() {
                debug!(event = "stream_receiver_dropped");
                return Ok(());
            }
        }
        state
            .dropped_fragments
            .store(splitter.dropped(), Ordering::Relaxed);
    }

    debug!(event = "stream_ended_by_peer");
    Ok(())
}
