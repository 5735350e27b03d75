//! Relays an engine generation stream to a client as plain text.
//!
//! The engine writes one JSON event per line. A `Relay` owns the upstream
//! body, decodes complete lines, and pushes each `response` fragment through
//! a bounded channel that backs the HTTP response body. Dropping the relay
//! drops the upstream connection, so it is released exactly once whichever
//! way the relay ends.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamEvent {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl StreamEvent {
    /// `None` for lines that are not a JSON event.
    pub fn parse(line: &str) -> Option<Self> {
        serde_json::from_str(line).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Streaming,
    Completed,
    Errored,
}

impl RelayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Streaming => write!(f, "Streaming"),
            Self::Completed => write!(f, "Completed"),
            Self::Errored => write!(f, "Errored"),
        }
    }
}

/// Longest line the decoder will hold while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1 << 20;

/// Splits a byte stream into lines. A line cut by a chunk boundary is held
/// back until the rest arrives, which also keeps multi-byte UTF-8 intact.
/// A partial line that outgrows the limit is dropped through its newline.
#[derive(Debug)]
pub struct LineDecoder {
    buf: Vec<u8>,
    max_line: usize,
    discarding: bool,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line,
            discarding: false,
        }
    }

    /// Returns the non-blank lines completed by `chunk`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut chunk = chunk;
        if self.discarding {
            let Some(newline) = chunk.iter().position(|&b| b == b'\n') else {
                return Vec::new();
            };
            self.discarding = false;
            chunk = &chunk[newline + 1..];
        }

        self.buf.extend_from_slice(chunk);

        let lines = match self.buf.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => {
                let rest = self.buf.split_off(last_newline + 1);
                let complete = std::mem::replace(&mut self.buf, rest);
                complete
                    .split(|&b| b == b'\n')
                    .filter_map(decode_line)
                    .collect()
            }
            None => Vec::new(),
        };

        if self.buf.len() > self.max_line {
            tracing::warn!(
                bytes = self.buf.len(),
                limit = self.max_line,
                "dropping oversized line from engine stream"
            );
            self.buf = Vec::new();
            self.discarding = true;
        }

        lines
    }

    /// Whatever is left once the input has ended.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        if std::mem::take(&mut self.discarding) {
            return None;
        }
        decode_line(&rest)
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

enum Step {
    Continue,
    Stop(RelayState),
}

pub struct Relay<S> {
    upstream: S,
    decoder: LineDecoder,
    state: RelayState,
    idle_timeout: Option<Duration>,
    forwarded: usize,
}

impl<S> Relay<S>
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    pub fn new(upstream: S) -> Self {
        Self {
            upstream,
            decoder: LineDecoder::new(),
            state: RelayState::Idle,
            idle_timeout: None,
            forwarded: 0,
        }
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Runs the relay on its own task and returns the client-facing stream.
    pub fn spawn(self, capacity: usize) -> ReceiverStream<Result<Bytes>> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(self.run(tx));
        ReceiverStream::new(rx)
    }

    /// Drives the relay to a terminal state. The upstream is dropped on return.
    pub async fn run(mut self, tx: mpsc::Sender<Result<Bytes>>) -> RelayState {
        self.transition(RelayState::Streaming);

        while !self.state.is_terminal() {
            let next = tokio::select! {
                _ = tx.closed() => None,
                next = self.next_chunk() => Some(next),
            };
            let Some(next) = next else {
                tracing::debug!("client went away, dropping upstream");
                self.transition(RelayState::Completed);
                break;
            };

            let step = match next {
                Ok(Some(chunk)) => {
                    let lines = self.decoder.push(&chunk);
                    self.handle_lines(lines, &tx).await
                }
                Ok(None) => {
                    let tail: Vec<String> = self.decoder.finish().into_iter().collect();
                    match self.handle_lines(tail, &tx).await {
                        Step::Continue => Step::Stop(RelayState::Completed),
                        stop => stop,
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "upstream stream failed");
                    let _ = tx.send(Err(e)).await;
                    Step::Stop(RelayState::Errored)
                }
            };

            if let Step::Stop(state) = step {
                self.transition(state);
            }
        }

        tracing::debug!(
            state = %self.state,
            fragments = self.forwarded,
            leftover_bytes = self.decoder.pending(),
            "relay finished"
        );
        self.state
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let next = match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, self.upstream.next())
                .await
                .map_err(|_| Error::UpstreamUnavailable("engine stream went idle".into()))?,
            None => self.upstream.next().await,
        };
        next.transpose()
    }

    async fn handle_lines(&mut self, lines: Vec<String>, tx: &mpsc::Sender<Result<Bytes>>) -> Step {
        for line in lines {
            let Some(event) = StreamEvent::parse(&line) else {
                tracing::trace!(line = %line, "skipping undecodable line");
                continue;
            };

            if let Some(text) = event.response.filter(|t| !t.is_empty()) {
                if tx.send(Ok(Bytes::from(text))).await.is_err() {
                    tracing::debug!("client went away mid-send");
                    return Step::Stop(RelayState::Completed);
                }
                self.forwarded += 1;
            }

            if let Some(message) = event.error {
                let _ = tx.send(Err(Error::UpstreamUnavailable(message))).await;
                return Step::Stop(RelayState::Errored);
            }

            if event.done {
                return Step::Stop(RelayState::Completed);
            }
        }
        Step::Continue
    }

    fn transition(&mut self, next: RelayState) {
        tracing::trace!(from = %self.state, to = %next, "relay state");
        self.state = next;
    }
}
