use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{Decision, FilterSpec, Listener, Sink, Termination};
use crate::client::ClientHandle;
use crate::error::TweetResult;

const FILTER_ENDPOINT: &str = "/1.1/statuses/filter.json";

/// Largest message accepted before a line terminator shows up.
const MAX_MESSAGE_BYTES: usize = 1 << 20;

/// Subscribes to `filter` and drives `listener` until it terminates, the
/// remote closes the body, or `stop` flips to `true`.
///
/// Cancellation is observed before every message, never during an append.
/// Transport errors end the listener as `Disconnected` and are returned.
pub async fn run<S: Sink>(
    handle: &ClientHandle,
    filter: &FilterSpec,
    listener: &mut Listener<S>,
    mut stop: watch::Receiver<bool>,
) -> TweetResult<Termination> {
    listener.start();
    info!(track = %filter.track(), "subscribing to filtered stream");

    if *stop.borrow() {
        listener.stop();
        return Ok(Termination::Stopped);
    }

    let form = vec![("track".to_string(), filter.track())];
    let response = match handle.open_stream(FILTER_ENDPOINT, &form).await {
        Ok(response) => response,
        Err(e) => {
            listener.end(Termination::Disconnected);
            return Err(e);
        }
    };

    let status = response.status();
    if !status.is_success() {
        listener.handle_error(status.as_u16());
        return Ok(listener.termination().unwrap_or(Termination::Disconnected));
    }

    let mut body = response.bytes_stream();
    let mut buffer = LineBuffer::new(MAX_MESSAGE_BYTES);

    loop {
        let chunk: Option<reqwest::Result<Bytes>> = tokio::select! {
            biased;
            changed = stop.changed() => {
                // a dropped sender counts as a stop request
                if changed.is_err() || *stop.borrow() {
                    listener.stop();
                    break;
                }
                continue;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            None => {
                let dropped = buffer.finish();
                if dropped > 0 {
                    warn!(bytes = dropped, "dropping unterminated message at end of stream");
                }
                listener.end(Termination::EndOfStream);
                break;
            }
            Some(Err(e)) => {
                warn!(error = %e, "stream connection failed");
                listener.end(Termination::Disconnected);
                return Err(e.into());
            }
            Some(Ok(chunk)) => {
                buffer.extend(&chunk);
                if feed_lines(listener, &mut buffer, &stop) == Decision::Stop {
                    break;
                }
            }
        }
    }

    Ok(listener.termination().unwrap_or(Termination::EndOfStream))
}

/// Accumulates body bytes and hands out `\n`-terminated lines.
///
/// Bytes already searched for a terminator are not searched again. A
/// message growing past `max_len` without one is discarded up to and
/// including its eventual terminator.
struct LineBuffer {
    bytes: Vec<u8>,
    scanned: usize,
    max_len: usize,
    discarding: bool,
}

impl LineBuffer {
    fn new(max_len: usize) -> Self {
        Self {
            bytes: Vec::new(),
            scanned: 0,
            max_len,
            discarding: false,
        }
    }

    fn extend(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Next complete line, terminator included.
    fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let Some(offset) = self.bytes[self.scanned..].iter().position(|&b| b == b'\n') else {
                self.scanned = self.bytes.len();
                if self.bytes.len() > self.max_len {
                    warn!(bytes = self.bytes.len(), "discarding oversized message");
                    self.bytes.clear();
                    self.scanned = 0;
                    self.discarding = true;
                }
                return None;
            };

            let end = self.scanned + offset;
            let line: Vec<u8> = self.bytes.drain(..=end).collect();
            self.scanned = 0;
            if std::mem::take(&mut self.discarding) {
                debug!(bytes = line.len(), "skipped tail of oversized message");
                continue;
            }
            return Some(line);
        }
    }

    /// Empties the buffer, returning how many non-blank bytes were left.
    fn finish(&mut self) -> usize {
        let rest = std::mem::take(&mut self.bytes);
        self.scanned = 0;
        if rest.iter().all(u8::is_ascii_whitespace) {
            0
        } else {
            rest.len()
        }
    }
}

/// Hands every complete message in `buffer` to the listener, line
/// terminator included. Blank keep-alive lines are dropped. A raised `stop`
/// flag ends the session before the next message is appended.
fn feed_lines<S: Sink>(
    listener: &mut Listener<S>,
    buffer: &mut LineBuffer,
    stop: &watch::Receiver<bool>,
) -> Decision {
    while let Some(line) = buffer.next_line() {
        if line.iter().all(u8::is_ascii_whitespace) {
            debug!("keep-alive");
            continue;
        }
        if *stop.borrow() {
            listener.stop();
            return Decision::Stop;
        }
        if listener.handle_data(&line) == Decision::Stop {
            return Decision::Stop;
        }
    }
    Decision::Continue
}
