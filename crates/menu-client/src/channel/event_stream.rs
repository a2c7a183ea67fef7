use super::{PushStream, PushTransport};
use crate::error::{ClientError, ClientResult};
use crate::session::SessionStore;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Client;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Push transport over a `text/event-stream` response.
pub struct EventStreamTransport {
    http: Client,
    url: String,
    session: Arc<dyn SessionStore>,
}

impl EventStreamTransport {
    /// The stream is long-lived, so only connecting is bounded in time.
    pub fn new(
        url: impl Into<String>,
        connect_timeout: Duration,
        session: Arc<dyn SessionStore>,
    ) -> ClientResult<Self> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("event stream client: {e}")))?;
        Ok(Self {
            http,
            url: url.into(),
            session,
        })
    }
}

#[async_trait]
impl PushTransport for EventStreamTransport {
    async fn connect(&self) -> ClientResult<Box<dyn PushStream>> {
        let mut req = self
            .http
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(token) = self.session.token() {
            req = req.bearer_auth(token);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ClientError::ChannelDisconnected(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_status(status, &body, &self.url));
        }

        debug!(url = %self.url, "Event stream opened");
        Ok(Box::new(EventStream {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::default(),
        }))
    }
}

struct EventStream {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
}

#[async_trait]
impl PushStream for EventStream {
    async fn next_message(&mut self) -> ClientResult<Option<String>> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(Some(frame));
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.decoder.feed(&chunk),
                Some(Err(e)) => return Err(ClientError::ChannelDisconnected(e.to_string())),
                None => return Ok(None),
            }
        }
    }

    async fn close(&mut self) {
        self.body = futures::stream::empty().boxed();
    }
}

/// Incremental `text/event-stream` parser.
///
/// Bytes are buffered until a full line is available, so events split across
/// network chunks (even inside a UTF-8 sequence) decode intact. A named event
/// (`event: menu-updated`) whose data is not already a tagged record is
/// wrapped as `{"type": <name>, "data": <data>}`.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    ready: VecDeque<String>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.line(line.trim_end_matches(['\n', '\r']));
        }
    }

    pub fn next_frame(&mut self) -> Option<String> {
        self.ready.pop_front()
    }

    fn line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) {
        let event = self.event.take();
        if self.data.is_empty() {
            return;
        }
        let data = self.data.join("\n");
        self.data.clear();

        let frame = match event.as_deref() {
            None | Some("message") => data,
            Some(name) => {
                let parsed = serde_json::from_str::<Value>(&data)
                    .unwrap_or_else(|_| Value::String(data.clone()));
                if parsed.get("type").is_some() {
                    data
                } else {
                    json!({ "type": name, "data": parsed }).to_string()
                }
            }
        };
        self.ready.push_back(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use menu_proto::PushMessage;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn frames(decoder: &mut SseDecoder) -> Vec<String> {
        std::iter::from_fn(|| decoder.next_frame()).collect()
    }

    #[test]
    fn test_decoder_buffers_split_chunks() {
        let mut decoder = SseDecoder::default();
        decoder.feed(b"data: {\"type\":\"menu-changed\",");
        assert!(frames(&mut decoder).is_empty());
        decoder.feed(b"\"data\":\"7\"}\r\n");
        assert!(frames(&mut decoder).is_empty());
        decoder.feed(b"\r\n: keep-alive\n\n");
        assert_eq!(
            frames(&mut decoder),
            vec![r#"{"type":"menu-changed","data":"7"}"#.to_string()]
        );
    }

    #[test]
    fn test_decoder_split_utf8() {
        let mut decoder = SseDecoder::default();
        let text = "data: {\"type\":\"menu-changed\",\"data\":\"Café\"}\n\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        decoder.feed(&text[..split]);
        decoder.feed(&text[split..]);
        assert_eq!(
            PushMessage::decode(&frames(&mut decoder)[0]).unwrap(),
            PushMessage::menu_changed("Café")
        );
    }

    #[test]
    fn test_named_event_is_wrapped() {
        let mut decoder = SseDecoder::default();
        decoder.feed(b"event: menu-updated\ndata: {\"restaurantId\":5}\n\n");
        decoder.feed(b"event: ping\n\n");
        let out = frames(&mut decoder);
        assert_eq!(out.len(), 1);
        assert_eq!(
            PushMessage::decode(&out[0]).unwrap(),
            PushMessage::menu_changed("5")
        );
    }

    #[tokio::test]
    async fn test_transport_reads_frames_until_close() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(
                        "data: {\"type\":\"menu-changed\",\"data\":1}\n\n\
                         data: {\"type\":\"other\"}\n\n",
                    ),
            )
            .mount(&server)
            .await;

        let session = Arc::new(MemorySessionStore::with_session(menu_proto::Session {
            token: "tok".into(),
            user: menu_proto::UserProfile {
                id: "1".into(),
                email: "a@b.c".into(),
                name: None,
                role: None,
                restaurant_id: None,
            },
        }));
        let transport = EventStreamTransport::new(
            format!("{}/events", server.uri()),
            Duration::from_secs(2),
            session,
        )
        .unwrap();

        let mut stream = transport.connect().await.unwrap();
        let first = stream.next_message().await.unwrap().unwrap();
        assert_eq!(PushMessage::decode(&first).unwrap(), PushMessage::menu_changed("1"));
        assert!(stream.next_message().await.unwrap().is_some());
        assert_eq!(stream.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rejected_handshake() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let transport = EventStreamTransport::new(
            server.uri(),
            Duration::from_secs(2),
            Arc::new(MemorySessionStore::new()),
        )
        .unwrap();
        assert!(matches!(
            transport.connect().await,
            Err(ClientError::ServerError { status: 503, .. })
        ));
    }
}
