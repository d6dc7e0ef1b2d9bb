//! Response dispatching and stream decoding.
//!
//! The server picks one of three encodings per response and announces it in
//! `Content-Type`. [`StreamDecoder::for_response`] inspects the status and
//! that header once; [`ResponseDispatcher`] then drives the chosen decoder
//! over the body, handing each message to the caller's handler in arrival
//! order.

use futures_util::StreamExt;
use tracing::{debug, trace, warn};

use crate::codec::{decode_document, MessageCodec};
use crate::engine::{HttpResponse, LineStream};
use crate::error::{ErrorKind, Result, TransportError};
use crate::handler::MessageHandler;
use crate::resumption::ResumptionTracker;
use crate::sse::{FrameParser, SseFrame};

/// Content type of a line-delimited JSON sequence.
pub const CONTENT_TYPE_JSON_SEQ: &str = "application/json-seq";
/// Content type of a server-push event stream.
pub const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";
/// Content type of a single JSON document.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// RFC 7464 record separator that may prefix each sequence record.
const RECORD_SEPARATOR: char = '\u{1e}';

/// The decoder selected for one response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDecoder {
    /// One JSON document: an object or an array of objects.
    SingleDocument,
    /// One JSON message per line.
    JsonSequence,
    /// `text/event-stream` frames.
    EventStream,
}

impl StreamDecoder {
    /// Pick a decoder by substring match on a `Content-Type` value.
    ///
    /// `application/json-seq` is checked before `application/json` because
    /// the latter is a prefix of the former.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        if content_type.contains(CONTENT_TYPE_JSON_SEQ) {
            Some(Self::JsonSequence)
        } else if content_type.contains(CONTENT_TYPE_EVENT_STREAM) {
            Some(Self::EventStream)
        } else if content_type.contains(CONTENT_TYPE_JSON) {
            Some(Self::SingleDocument)
        } else {
            None
        }
    }

    /// Inspect status and content type of `response`.
    ///
    /// Returns `Ok(None)` for `202 Accepted`, which has no body to decode.
    ///
    /// # Errors
    ///
    /// - [`TransportError::CapabilityNegative`] for 404 / 405
    /// - [`TransportError::ClientError`], [`TransportError::ServerError`] or
    ///   [`TransportError::UnexpectedStatus`] for other non-2xx statuses
    /// - [`TransportError::UnsupportedContentType`] for an unknown or missing
    ///   content type
    pub fn for_response(response: &HttpResponse) -> Result<Option<Self>> {
        if response.status == 202 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(TransportError::from_status(response.status));
        }
        let content_type = response.content_type().unwrap_or_default();
        Self::from_content_type(content_type)
            .map(Some)
            .ok_or_else(|| TransportError::UnsupportedContentType(content_type.to_string()))
    }
}

type StopFn<'a> = &'a (dyn Fn() -> bool + Send + Sync);

/// Runs decoders against response bodies.
pub struct ResponseDispatcher<'a, C: MessageCodec> {
    codec: &'a C,
    handler: &'a dyn MessageHandler<C::Message>,
    resumption: &'a ResumptionTracker,
    should_stop: Option<StopFn<'a>>,
}

impl<'a, C: MessageCodec> ResponseDispatcher<'a, C> {
    /// Create a dispatcher.
    pub fn new(
        codec: &'a C,
        handler: &'a dyn MessageHandler<C::Message>,
        resumption: &'a ResumptionTracker,
    ) -> Self {
        Self {
            codec,
            handler,
            resumption,
            should_stop: None,
        }
    }

    /// Stop consuming the body as soon as `should_stop` returns `true`.
    ///
    /// Checked once per line. Messages already handed to the handler stay handled.
    #[must_use]
    pub fn with_stop_check(mut self, should_stop: StopFn<'a>) -> Self {
        self.should_stop = Some(should_stop);
        self
    }

    /// Check the response and decode its body.
    ///
    /// Returns the number of messages handed to the handler.
    ///
    /// # Errors
    ///
    /// Any error from [`StreamDecoder::for_response`] or [`decode`](Self::decode).
    pub async fn dispatch(&self, response: HttpResponse) -> Result<usize> {
        match StreamDecoder::for_response(&response)? {
            Some(decoder) => self.decode(decoder, response.body).await,
            None => {
                debug!("202 Accepted, nothing to decode");
                Ok(0)
            }
        }
    }

    /// Decode `body` with `decoder`.
    ///
    /// # Errors
    ///
    /// Body read errors, handler errors, and malformed data (except single
    /// records of a JSON sequence, which are logged and skipped).
    pub async fn decode(&self, decoder: StreamDecoder, body: LineStream) -> Result<usize> {
        trace!(?decoder, "decoding response body");
        match decoder {
            StreamDecoder::SingleDocument => self.decode_single(body).await,
            StreamDecoder::JsonSequence => self.decode_sequence(body).await,
            StreamDecoder::EventStream => self.decode_event_stream(body).await,
        }
    }

    fn stopped(&self) -> bool {
        self.should_stop.is_some_and(|stop| stop())
    }

    async fn decode_single(&self, mut body: LineStream) -> Result<usize> {
        let mut text = String::new();
        while let Some(line) = body.next().await {
            text.push_str(&line?);
            text.push('\n');
        }
        if self.stopped() {
            return Ok(0);
        }
        let messages = decode_document(self.codec, &text)?;
        self.deliver(messages).await
    }

    async fn decode_sequence(&self, mut body: LineStream) -> Result<usize> {
        let mut handled = 0;
        while let Some(line) = body.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) if e.kind() == ErrorKind::MalformedData => {
                    warn!(error = %e, "skipping undecodable JSON sequence line");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if self.stopped() {
                debug!("stopping JSON sequence decoding");
                break;
            }
            let record = line.trim().trim_start_matches(RECORD_SEPARATOR).trim();
            if record.is_empty() {
                continue;
            }
            match self.codec.decode(record) {
                Ok(message) => {
                    self.handler.handle(message).await?;
                    handled += 1;
                }
                Err(e) => warn!(error = %e, record, "skipping malformed JSON sequence record"),
            }
        }
        Ok(handled)
    }

    async fn decode_event_stream(&self, mut body: LineStream) -> Result<usize> {
        let mut parser = FrameParser::new();
        let mut handled = 0;
        while let Some(line) = body.next().await {
            let line = line?;
            if self.stopped() {
                debug!("stopping event-stream decoding");
                return Ok(handled);
            }
            if let Some(frame) = parser.push_line(&line) {
                handled += self.handle_frame(frame).await?;
            }
        }
        if let Some(frame) = parser.finish() {
            handled += self.handle_frame(frame).await?;
        }
        Ok(handled)
    }

    async fn handle_frame(&self, frame: SseFrame) -> Result<usize> {
        if !frame.is_message() {
            trace!(event = %frame.event, "dropping non-message frame");
            return Ok(0);
        }
        let messages = decode_document(self.codec, &frame.data).inspect_err(|e| {
            warn!(error = %e, data = %frame.data, "malformed event-stream payload");
        })?;
        let handled = self.deliver(messages).await?;
        if let Some(id) = frame.resumption_id() {
            self.resumption.advance(id);
        }
        Ok(handled)
    }

    async fn deliver(&self, messages: Vec<C::Message>) -> Result<usize> {
        let count = messages.len();
        for message in messages {
            self.handler.handle(message).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::codec::{JsonRpcCodec, JsonValueCodec};
    use crate::protocol::JsonRpcMessage;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex as StdMutex};

    #[derive(Clone)]
    struct Collector<M> {
        seen: Arc<StdMutex<Vec<M>>>,
        fail_after: Option<usize>,
    }

    #[async_trait::async_trait]
    impl<M: Send + 'static> MessageHandler<M> for Collector<M> {
        async fn handle(&self, message: M) -> Result<()> {
            let mut seen = self.seen.lock().unwrap();
            if self.fail_after.is_some_and(|n| seen.len() >= n) {
                return Err(TransportError::Handler("refused".into()));
            }
            seen.push(message);
            Ok(())
        }
    }

    impl<M: Clone> Collector<M> {
        fn new() -> Self {
            Self {
                seen: Arc::new(StdMutex::new(Vec::new())),
                fail_after: None,
            }
        }

        fn seen(&self) -> Vec<M> {
            self.seen.lock().unwrap().clone()
        }
    }

    fn response(content_type: &str, body: &str) -> HttpResponse {
        HttpResponse::from_text(
            200,
            vec![("Content-Type".into(), content_type.into())],
            body,
        )
    }

    async fn dispatch_values(
        content_type: &str,
        body: &str,
    ) -> (Result<usize>, Vec<Value>, ResumptionTracker) {
        let handler = Collector::new();
        let tracker = ResumptionTracker::new();
        let result = ResponseDispatcher::new(&JsonValueCodec, &handler, &tracker)
            .dispatch(response(content_type, body))
            .await;
        (result, handler.seen(), tracker)
    }

    #[test]
    fn content_type_priority() {
        assert_eq!(
            StreamDecoder::from_content_type("application/json-seq"),
            Some(StreamDecoder::JsonSequence)
        );
        assert_eq!(
            StreamDecoder::from_content_type("text/event-stream; charset=utf-8"),
            Some(StreamDecoder::EventStream)
        );
        assert_eq!(
            StreamDecoder::from_content_type("application/json; charset=utf-8"),
            Some(StreamDecoder::SingleDocument)
        );
        assert_eq!(StreamDecoder::from_content_type("text/html"), None);
    }

    #[test]
    fn accepted_bypasses_content_type() {
        assert_eq!(
            StreamDecoder::for_response(&HttpResponse::empty(202)).unwrap(),
            None
        );
    }

    #[test]
    fn missing_content_type_is_unsupported() {
        let err = StreamDecoder::for_response(&HttpResponse::empty(200)).unwrap_err();
        assert!(matches!(err, TransportError::UnsupportedContentType(ref ct) if ct.is_empty()));
    }

    #[test]
    fn error_statuses_map_before_content_type() {
        let err = StreamDecoder::for_response(&HttpResponse::empty(405)).unwrap_err();
        assert!(matches!(err, TransportError::CapabilityNegative { status: 405 }));
        let err = StreamDecoder::for_response(&HttpResponse::empty(400)).unwrap_err();
        assert!(matches!(err, TransportError::ClientError { status: 400 }));
    }

    #[tokio::test]
    async fn single_object_document() {
        let (result, seen, _) = dispatch_values("application/json", r#"{"a":1}"#).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(seen, vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn single_array_document_spanning_lines() {
        let (result, seen, _) =
            dispatch_values("application/json", "[\n  {\"a\":1},\n  {\"b\":2}\n]").await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(seen, vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[tokio::test]
    async fn malformed_single_document_fails_whole_decode() {
        let (result, seen, _) = dispatch_values("application/json", r#"{"a":"#).await;
        assert!(matches!(result, Err(TransportError::MalformedMessage(_))));
        assert!(seen.is_empty());
    }

    #[tokio::test]
    async fn sequence_skips_malformed_lines() {
        let body = "{\"n\":1}\nnot json\n\n\u{1e}{\"n\":2}\n{\"n\":\n{\"n\":3}\n";
        let (result, seen, _) = dispatch_values("application/json-seq", body).await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(seen, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
    }

    #[tokio::test]
    async fn sequence_skips_lines_that_are_not_utf8() {
        let chunks: Vec<std::result::Result<&'static [u8], String>> =
            vec![Ok(b"{\"a\":1}\n\xff\xfe\n{\"b\":2}\n")];
        let response = HttpResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "application/json-seq".into())],
            body: crate::engine::lines_from_chunks(futures_util::stream::iter(chunks)),
        };
        let handler = Collector::new();
        let tracker = ResumptionTracker::new();
        let result = ResponseDispatcher::new(&JsonValueCodec, &handler, &tracker)
            .dispatch(response)
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(handler.seen(), vec![json!({"a": 1}), json!({"b": 2})]);
    }

    #[tokio::test]
    async fn sequence_still_fails_on_interrupted_body() {
        let chunks: Vec<std::result::Result<&'static [u8], String>> =
            vec![Ok(b"{\"a\":1}\n"), Err("reset".into())];
        let response = HttpResponse {
            status: 200,
            headers: vec![("Content-Type".into(), "application/json-seq".into())],
            body: crate::engine::lines_from_chunks(futures_util::stream::iter(chunks)),
        };
        let handler = Collector::new();
        let tracker = ResumptionTracker::new();
        let result = ResponseDispatcher::new(&JsonValueCodec, &handler, &tracker)
            .dispatch(response)
            .await;
        assert!(matches!(result, Err(TransportError::StreamInterrupted(_))));
        assert_eq!(handler.seen(), vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn event_stream_filters_non_message_frames() {
        let body = "event: ping\ndata: {\"skip\":true}\n\n\
                    data: {\"untyped\":true}\n\n\
                    event: message\ndata: {\"keep\":true}\n\n";
        let (result, seen, _) = dispatch_values("text/event-stream", body).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(seen, vec![json!({"keep": true})]);
    }

    #[tokio::test]
    async fn event_stream_scenario_sets_token() {
        let body = "event: message\ndata: {\"a\":1}\nid: 7\n\n";
        let (result, seen, tracker) = dispatch_values("text/event-stream", body).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(seen, vec![json!({"a": 1})]);
        assert_eq!(tracker.get().as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn event_stream_multi_line_data_regression() {
        let body = "event: message\ndata: {\"a\":\ndata: 1}\nid: 3\n\n";
        let (result, seen, tracker) = dispatch_values("text/event-stream", body).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(seen, vec![json!({"a": 1})]);
        assert_eq!(tracker.get().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn event_stream_array_payload_yields_each_element() {
        let body = "event: message\ndata: [{\"a\":1},{\"b\":2}]\n\n";
        let (result, seen, _) = dispatch_values("text/event-stream", body).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(seen.len(), 2);
    }

    #[tokio::test]
    async fn malformed_frame_does_not_advance_token() {
        let body = "event: message\ndata: {\"ok\":1}\nid: 1\n\n\
                    event: message\ndata: {broken\nid: 2\n\n\
                    event: message\ndata: {\"ok\":3}\nid: 3\n\n";
        let (result, seen, tracker) = dispatch_values("text/event-stream", body).await;
        assert!(matches!(result, Err(TransportError::MalformedMessage(_))));
        assert_eq!(seen, vec![json!({"ok": 1})]);
        assert_eq!(tracker.get().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn handler_failure_mid_frame_does_not_advance_token() {
        let handler = Collector {
            fail_after: Some(1),
            ..Collector::new()
        };
        let tracker = ResumptionTracker::new();
        tracker.advance("0");
        let body = "event: message\ndata: [{\"a\":1},{\"b\":2}]\nid: 9\n\n";
        let result = ResponseDispatcher::new(&JsonValueCodec, &handler, &tracker)
            .dispatch(response("text/event-stream", body))
            .await;
        assert!(matches!(result, Err(TransportError::Handler(_))));
        assert_eq!(handler.seen().len(), 1);
        assert_eq!(tracker.get().as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn frame_without_id_keeps_previous_token() {
        let body = "event: message\ndata: {}\nid: 4\n\nevent: message\ndata: {}\n\n";
        let (result, _, tracker) = dispatch_values("text/event-stream", body).await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(tracker.get().as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn stop_check_halts_consumption() {
        let handler = Collector::new();
        let tracker = ResumptionTracker::new();
        let stop = || true;
        let result = ResponseDispatcher::new(&JsonValueCodec, &handler, &tracker)
            .with_stop_check(&stop)
            .dispatch(response("application/json-seq", "{\"a\":1}\n{\"b\":2}\n"))
            .await;
        assert_eq!(result.unwrap(), 0);
        assert!(handler.seen().is_empty());
    }

    #[tokio::test]
    async fn typed_codec_decodes_json_rpc() {
        let handler = Collector::<JsonRpcMessage>::new();
        let tracker = ResumptionTracker::new();
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        let handled = ResponseDispatcher::new(&JsonRpcCodec, &handler, &tracker)
            .dispatch(response("text/event-stream", body))
            .await
            .unwrap();
        assert_eq!(handled, 1);
        assert!(matches!(handler.seen()[0], JsonRpcMessage::Response(_)));
    }
}
