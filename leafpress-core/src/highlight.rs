//! Client for the `leafpress-highlight` service.
//!
//! One connection is shared by every document in a generator run. Requests
//! are pipelined: callers do not wait for earlier responses before sending.
//! The protocol has no request ids, so responses are matched to requests by
//! order alone. The invariant that keeps this sound is that reserving a
//! response slot and writing the request happen together, under one lock,
//! so the order of slots in the queue is the order of requests on the wire.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use leafpress_highlight::protocol::{self, ProtocolError, Response, DELIMITER};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Error, Debug, Clone)]
pub enum HighlightError {
    #[error("highlighter connection failed: {0}")]
    Io(Arc<io::Error>),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("highlighter: {0}")]
    Service(String),

    #[error("highlighter disconnected: {0}")]
    Disconnected(String),
}

impl From<io::Error> for HighlightError {
    fn from(err: io::Error) -> Self {
        HighlightError::Io(Arc::new(err))
    }
}

/// Something that turns source code into highlighted HTML.
#[async_trait]
pub trait Highlighter: Send + Sync {
    async fn highlight(&self, language: &str, code: &str) -> Result<String, HighlightError>;
}

type Waiter = oneshot::Sender<Result<String, HighlightError>>;

#[derive(Default)]
struct Pending {
    waiters: VecDeque<Waiter>,
    /// Set once the reader stops; later calls fail fast with this reason.
    closed: Option<String>,
}

/// A persistent, pipelined connection to the highlighting service.
pub struct HighlightClient {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Arc<parking_lot::Mutex<Pending>>,
    reader: JoinHandle<()>,
}

impl HighlightClient {
    pub async fn connect(socket: &Path) -> Result<Self, HighlightError> {
        let stream = UnixStream::connect(socket).await?;
        debug!("connected to highlighter at {}", socket.display());
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: UnixStream) -> Self {
        let (read, write) = stream.into_split();
        let pending = Arc::new(parking_lot::Mutex::new(Pending::default()));
        let reader = tokio::spawn(read_responses(read, pending.clone()));

        Self {
            writer: tokio::sync::Mutex::new(write),
            pending,
            reader,
        }
    }

    /// Highlight `code`, resolving once the service answers this request.
    pub async fn highlight(&self, language: &str, code: &str) -> Result<String, HighlightError> {
        let request = protocol::encode_request(language, code)?;

        let response = {
            // Critical section: the slot is queued and the request written
            // before any other caller may do either.
            let mut writer = self.writer.lock().await;
            let (tx, rx) = oneshot::channel();
            {
                let mut pending = self.pending.lock();
                if let Some(reason) = &pending.closed {
                    return Err(HighlightError::Disconnected(reason.clone()));
                }
                pending.waiters.push_back(tx);
            }

            if let Err(err) = writer.write_all(&request).await {
                // Our slot is still the tail: nobody else can queue while we
                // hold the writer.
                self.pending.lock().waiters.pop_back();
                return Err(err.into());
            }
            rx
        };

        debug!(language, bytes = code.len(), "highlight request sent");
        response
            .await
            .unwrap_or_else(|_| Err(HighlightError::Disconnected("reader stopped".into())))
    }

    /// Number of requests sent but not yet answered.
    pub fn in_flight(&self) -> usize {
        self.pending.lock().waiters.len()
    }
}

#[async_trait]
impl Highlighter for HighlightClient {
    async fn highlight(&self, language: &str, code: &str) -> Result<String, HighlightError> {
        HighlightClient::highlight(self, language, code).await
    }
}

impl fmt::Debug for HighlightClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HighlightClient")
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Drop for HighlightClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Split incoming bytes into frames and complete waiters in FIFO order.
async fn read_responses(read: OwnedReadHalf, pending: Arc<parking_lot::Mutex<Pending>>) {
    let mut reader = BufReader::new(read);
    let mut frame = Vec::new();

    let reason = loop {
        frame.clear();
        match reader.read_until(DELIMITER, &mut frame).await {
            Ok(0) => break "connection closed".to_string(),
            Ok(_) => {
                if frame.pop() != Some(DELIMITER) {
                    break "connection closed mid-response".to_string();
                }
                let result = Response::decode(&frame)
                    .into_result()
                    .map_err(HighlightError::Service);
                let waiter = pending.lock().waiters.pop_front();
                match waiter {
                    // The caller may have given up; its slot still had to be
                    // consumed to keep the queue aligned.
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => warn!("discarding unsolicited highlighter response"),
                }
            }
            Err(err) => break err.to_string(),
        }
    };

    debug!("highlighter reader stopped: {reason}");
    let mut pending = pending.lock();
    for tx in pending.waiters.drain(..) {
        let _ = tx.send(Err(HighlightError::Disconnected(reason.clone())));
    }
    pending.closed = Some(reason);
}
