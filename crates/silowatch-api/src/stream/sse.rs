// Server-Sent Events transport.
//
// One GET request per connection; the response body is decoded
// incrementally into frames. The last seen event id is replayed as
// `Last-Event-ID` on the next connection so the server can resume.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::{Buf, BytesMut};
use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use reqwest::header::{ACCEPT, CACHE_CONTROL, HeaderValue};
use tracing::{debug, trace};
use url::Url;

use super::{Connector, FrameStream, StreamFrame};
use crate::error::Error;
use crate::transport::TransportConfig;

const LAST_EVENT_ID: &str = "Last-Event-ID";

// ── Decoder ──────────────────────────────────────────────────────────

/// Incremental `text/event-stream` decoder.
///
/// Feed it raw body chunks in any split; it returns each event as soon as
/// its terminating blank line arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: BytesMut,
    data: String,
    has_data: bool,
    event: Option<String>,
    last_event_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id of the most recent event that carried an `id:` field.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let terminator = self.buf[pos];
            // A trailing CR may be the first half of a CRLF split across chunks.
            if terminator == b'\r' && pos + 1 == self.buf.len() {
                break;
            }
            let line = self.buf.split_to(pos);
            let skip = if terminator == b'\r' && self.buf.get(1) == Some(&b'\n') {
                2
            } else {
                1
            };
            self.buf.advance(skip);

            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<StreamFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            trace!(comment = &line[1..], "sse comment");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_owned()),
            "id" if !value.contains('\0') => {
                self.last_event_id = (!value.is_empty()).then(|| value.to_owned());
            }
            // `retry:` is server advice; the reconnect policy is fixed client-side.
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<StreamFrame> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;
        Some(StreamFrame {
            data: std::mem::take(&mut self.data),
            event_id: self.last_event_id.clone(),
            event,
        })
    }
}

// ── Connector ────────────────────────────────────────────────────────

/// Push-stream connector speaking `text/event-stream` over HTTP(S).
pub struct SseConnector {
    http: reqwest::Client,
    url: Url,
    last_event_id: Arc<Mutex<Option<String>>>,
}

impl SseConnector {
    pub fn new(url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self::with_client(url, transport.build_stream_client()?))
    }

    pub fn with_client(url: Url, http: reqwest::Client) -> Self {
        Self {
            http,
            url,
            last_event_id: Arc::default(),
        }
    }

    async fn open(&self) -> Result<FrameStream, Error> {
        debug!(url = %self.url, "opening event stream");

        let mut request = self
            .http
            .get(self.url.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        let resume = self
            .last_event_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(id) = resume {
            request = request.header(LAST_EVENT_ID, id);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Error::StreamConnect(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(Error::Authentication {
                message: format!("event stream rejected with HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(Error::StreamConnect(format!(
                "event stream returned HTTP {status}"
            )));
        }

        let last_event_id = Arc::clone(&self.last_event_id);
        let mut body = resp.bytes_stream();
        let frames = async_stream::try_stream! {
            let mut decoder = SseDecoder::new();
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| Error::StreamConnect(e.to_string()))?;
                for frame in decoder.feed(&chunk) {
                    if let Some(id) = &frame.event_id {
                        *last_event_id.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(id.clone());
                    }
                    yield frame;
                }
            }
        };

        Ok(frames.boxed())
    }
}

impl Connector for SseConnector {
    fn connect(&self) -> BoxFuture<'_, Result<FrameStream, Error>> {
        Box::pin(self.open())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn frame(data: &str, id: Option<&str>, event: Option<&str>) -> StreamFrame {
        StreamFrame {
            data: data.into(),
            event_id: id.map(Into::into),
            event: event.map(Into::into),
        }
    }

    #[test]
    fn decodes_single_event() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: {\"a\":1}\n\n");
        assert_eq!(frames, vec![frame("{\"a\":1}", None, None)]);
    }

    #[test]
    fn joins_multi_line_data() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: line one\ndata: line two\n\n");
        assert_eq!(frames, vec![frame("line one\nline two", None, None)]);
    }

    #[test]
    fn carries_id_and_event_name() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"id: 7\nevent: reading\ndata: x\n\ndata: y\n\n");
        assert_eq!(
            frames,
            vec![frame("x", Some("7"), Some("reading")), frame("y", Some("7"), None)]
        );
        assert_eq!(decoder.last_event_id(), Some("7"));
    }

    #[test]
    fn handles_frames_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"da").is_empty());
        assert!(decoder.feed(b"ta: hel").is_empty());
        assert!(decoder.feed(b"lo\r").is_empty());
        let frames = decoder.feed(b"\n\r\n");
        assert_eq!(frames, vec![frame("hello", None, None)]);
    }

    #[test]
    fn accepts_cr_only_line_endings() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: a\r\rdata: b\r\r ");
        assert_eq!(frames, vec![frame("a", None, None), frame("b", None, None)]);
    }

    #[test]
    fn ignores_comments_retry_and_empty_events() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": keep-alive\nretry: 1000\n\nevent: ping\n\ndata\n\n");
        // `data` with no colon dispatches an empty payload.
        assert_eq!(frames, vec![frame("", None, None)]);
    }

    #[test]
    fn empty_id_clears_last_event_id() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"id: 3\ndata: a\n\n");
        let frames = decoder.feed(b"id:\ndata: b\n\n");
        assert_eq!(frames, vec![frame("b", None, None)]);
    }
}
