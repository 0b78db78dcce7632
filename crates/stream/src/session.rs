//! Client session: one transcript, at most one query in flight.

use crate::client::{CompletedQuery, QueryBackend};
use crate::decoder::FrameDecoder;
use crate::frame::Frame;
use crate::transcript::{Message, MessageStatus, Transcript, TranscriptAssembler};
use docstream_core::{AppError, AppResult};
use futures::StreamExt;

/// Appended as a new assistant message whenever a query fails.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, something went wrong while answering your question. Please try again.";

/// Conversation state for one user.
///
/// The step methods ([`begin`](Self::begin), [`feed`](Self::feed),
/// [`end`](Self::end), [`fail`](Self::fail)) let callers drive their own
/// transport; [`ask_stream`](Self::ask_stream) and [`ask`](Self::ask) run a
/// whole query against a [`QueryBackend`].
#[derive(Debug, Default)]
pub struct Session {
    transcript: Transcript,
    in_flight: bool,
    decoder: FrameDecoder,
    assembler: TranscriptAssembler,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Whether submission is currently disabled.
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Record the user turn and open the pending assistant turn.
    pub fn begin(&mut self, query: &str) -> AppResult<()> {
        if self.in_flight {
            return Err(AppError::Busy);
        }
        if query.trim().is_empty() {
            return Err(AppError::Input("Query is required".to_string()));
        }

        self.transcript.push(Message::user(query));
        self.decoder = FrameDecoder::new();
        self.assembler.begin(&mut self.transcript, false);
        self.in_flight = true;
        Ok(())
    }

    pub fn set_cache_hit(&mut self, cache_hit: bool) {
        self.assembler.set_cache_hit(cache_hit);
    }

    /// Decode a chunk of the response body and apply its frames in order.
    ///
    /// Returns the frames applied. Stops at the first bad frame.
    pub fn feed(&mut self, chunk: &[u8]) -> AppResult<Vec<Frame>> {
        let mut applied = Vec::new();
        self.feed_each(chunk, |frame| applied.push(frame.clone()))?;
        Ok(applied)
    }

    /// Like [`feed`](Self::feed), but hands each frame to `on_frame` right
    /// after it is applied. Frames ahead of a bad one in the same chunk are
    /// still delivered before the error returns.
    pub fn feed_each<F>(&mut self, chunk: &[u8], mut on_frame: F) -> AppResult<usize>
    where
        F: FnMut(&Frame),
    {
        self.ensure_in_flight()?;

        let mut count = 0;
        for decoded in self.decoder.push(chunk) {
            let frame = decoded?;
            self.assembler.apply(&mut self.transcript, frame.clone())?;
            on_frame(&frame);
            count += 1;
        }
        Ok(count)
    }

    /// The response body has closed. Succeeds only if the answer completed.
    pub fn end(&mut self) -> AppResult<Option<Frame>> {
        self.ensure_in_flight()?;

        let trailing = match self.decoder.finish() {
            Some(decoded) => {
                let frame = decoded?;
                self.assembler.apply(&mut self.transcript, frame.clone())?;
                Some(frame)
            }
            None => None,
        };

        self.assembler.finish(&mut self.transcript)?;
        self.in_flight = false;
        Ok(trailing)
    }

    /// Fill the pending turn from a non-streaming response.
    pub fn record_response(&mut self, completed: CompletedQuery) -> AppResult<()> {
        self.ensure_in_flight()?;

        let message = self
            .transcript
            .last_mut()
            .ok_or_else(|| AppError::Other("transcript is empty".to_string()))?;
        message.content = completed.response.answer;
        message.sources = Some(completed.response.sources);
        message.metrics = Some(completed.metrics);
        message.status = MessageStatus::Complete;

        self.in_flight = false;
        Ok(())
    }

    /// Abandon the in-flight query: leave the partial turn untouched, append
    /// the apology and re-enable submission. Returns `err` for propagation.
    pub fn fail(&mut self, err: AppError) -> AppError {
        tracing::warn!("Query failed: {}", err);

        if self.in_flight {
            self.assembler.abort(&mut self.transcript);
            self.transcript.push(Message::assistant(APOLOGY_MESSAGE));
            self.in_flight = false;
        }
        err
    }

    /// Run a streaming query to completion.
    ///
    /// `on_frame` sees every frame as it is applied, so callers can render
    /// tokens as they arrive.
    pub async fn ask_stream<B, F>(&mut self, backend: &B, query: &str, mut on_frame: F) -> AppResult<()>
    where
        B: QueryBackend + ?Sized,
        F: FnMut(&Frame) + Send,
    {
        self.begin(query)?;

        let mut stream = match backend.open_stream(query).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(e)),
        };
        self.set_cache_hit(stream.cache_hit);

        while let Some(chunk) = stream.bytes.next().await {
            if let Err(e) = chunk.and_then(|bytes| self.feed_each(&bytes, &mut on_frame)) {
                return Err(self.fail(e));
            }
        }

        match self.end() {
            Ok(trailing) => {
                if let Some(frame) = trailing {
                    on_frame(&frame);
                }
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Run a non-streaming query.
    pub async fn ask<B>(&mut self, backend: &B, query: &str) -> AppResult<()>
    where
        B: QueryBackend + ?Sized,
    {
        self.begin(query)?;

        match backend.query(query).await {
            Ok(completed) => self.record_response(completed),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn ensure_in_flight(&self) -> AppResult<()> {
        if self.in_flight {
            Ok(())
        } else {
            Err(AppError::Protocol("no query in flight".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::FrameStream;
    use crate::frame::{QueryMetrics, QueryResponse};
    use crate::transcript::Role;

    /// Backend replaying canned body chunks.
    struct ScriptedBackend {
        chunks: Vec<&'static str>,
        cache_hit: bool,
        fail_midway: bool,
    }

    impl ScriptedBackend {
        fn new(chunks: Vec<&'static str>) -> Self {
            Self {
                chunks,
                cache_hit: false,
                fail_midway: false,
            }
        }
    }

    #[async_trait::async_trait]
    impl QueryBackend for ScriptedBackend {
        async fn open_stream(&self, _query: &str) -> AppResult<FrameStream> {
            let mut items: Vec<AppResult<Vec<u8>>> = self
                .chunks
                .iter()
                .map(|c| Ok(c.as_bytes().to_vec()))
                .collect();
            if self.fail_midway {
                items.push(Err(AppError::Upstream("connection reset".to_string())));
            }
            Ok(FrameStream {
                bytes: Box::pin(futures::stream::iter(items)),
                cache_hit: self.cache_hit,
            })
        }

        async fn query(&self, _query: &str) -> AppResult<CompletedQuery> {
            Ok(CompletedQuery {
                response: QueryResponse {
                    answer: "json answer".to_string(),
                    sources: vec![],
                    latency_ms: 10.0,
                },
                metrics: QueryMetrics::from_round_trip(12.0, 10.0, self.cache_hit),
            })
        }
    }

    const FULL_BODY: [&str; 4] = [
        "data: {\"type\":\"retrieval\",\"sources\":[]}\n\n",
        "data: {\"type\":\"token\",\"content\":\"Hello \"}\n\ndata: {\"type\":\"tok",
        "en\",\"content\":\"there\"}\n\n",
        "data: {\"type\":\"done\",\"latency_ms\":50.0}\n\n",
    ];

    #[tokio::test]
    async fn test_ask_stream_assembles_answer() {
        let backend = ScriptedBackend {
            cache_hit: true,
            ..ScriptedBackend::new(FULL_BODY.to_vec())
        };
        let mut session = Session::new();
        let mut tokens = String::new();

        session
            .ask_stream(&backend, "hi", |frame| {
                if let Frame::Token { content } = frame {
                    tokens.push_str(content);
                }
            })
            .await
            .unwrap();

        assert_eq!(tokens, "Hello there");
        assert!(!session.is_busy());

        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].content, "Hello there");
        assert_eq!(messages[1].sources, Some(vec![]));

        let metrics = messages[1].metrics.unwrap();
        assert_eq!(metrics.total_ms, 50.0);
        assert!(metrics.cache_hit);
    }

    #[tokio::test]
    async fn test_early_close_appends_apology_and_reenables() {
        let backend = ScriptedBackend::new(vec![FULL_BODY[0]]);
        let mut session = Session::new();

        let err = session.ask_stream(&backend, "hi", |_| {}).await.unwrap_err();
        assert!(err.is_upstream());
        assert!(!session.is_busy());

        let messages = session.transcript().messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[1].content.is_empty());
        assert!(messages[1].metrics.is_none());
        assert_eq!(messages[1].status, MessageStatus::Partial);
        assert_eq!(messages[2].content, APOLOGY_MESSAGE);

        // Submission works again after the failure.
        let backend = ScriptedBackend::new(FULL_BODY.to_vec());
        session.ask_stream(&backend, "again", |_| {}).await.unwrap();
        assert_eq!(session.transcript().len(), 5);
    }

    #[tokio::test]
    async fn test_network_error_mid_stream() {
        let backend = ScriptedBackend {
            fail_midway: true,
            ..ScriptedBackend::new(FULL_BODY[..2].to_vec())
        };
        let mut session = Session::new();

        let err = session.ask_stream(&backend, "hi", |_| {}).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream(_)));

        let messages = session.transcript().messages();
        assert_eq!(messages[1].content, "Hello ");
        assert_eq!(messages[2].content, APOLOGY_MESSAGE);
    }

    #[tokio::test]
    async fn test_malformed_frame_is_reported() {
        let backend = ScriptedBackend::new(vec!["data: {oops}\n\n"]);
        let mut session = Session::new();

        let err = session.ask_stream(&backend, "hi", |_| {}).await.unwrap_err();
        assert!(matches!(err, AppError::Protocol(_)));
        assert_eq!(
            session.transcript().last().unwrap().content,
            APOLOGY_MESSAGE
        );
    }

    #[tokio::test]
    async fn test_frames_before_bad_frame_reach_callback() {
        let backend = ScriptedBackend::new(vec![
            "data: {\"type\":\"token\",\"content\":\"ok\"}\n\ndata: {oops}\n\n",
        ]);
        let mut session = Session::new();
        let mut seen = Vec::new();

        let err = session
            .ask_stream(&backend, "hi", |frame| seen.push(frame.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Protocol(_)));
        assert_eq!(
            seen,
            vec![Frame::Token {
                content: "ok".to_string()
            }]
        );

        let messages = session.transcript().messages();
        assert_eq!(messages[1].content, "ok");
        assert_eq!(messages[1].status, MessageStatus::Partial);
        assert_eq!(messages[2].content, APOLOGY_MESSAGE);
    }

    #[test]
    fn test_feed_each_counts_applied_frames() {
        let mut session = Session::new();
        session.begin("q").unwrap();

        let mut tokens = String::new();
        let count = session
            .feed_each(
                b"data: {\"type\":\"token\",\"content\":\"a \"}\n\ndata: {\"type\":\"token\",\"content\":\"b\"}\n\n",
                |frame| {
                    if let Frame::Token { content } = frame {
                        tokens.push_str(content);
                    }
                },
            )
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(tokens, "a b");
    }

    #[tokio::test]
    async fn test_ask_records_json_response() {
        let backend = ScriptedBackend::new(vec![]);
        let mut session = Session::new();

        session.ask(&backend, "hi").await.unwrap();

        let last = session.transcript().last().unwrap();
        assert_eq!(last.content, "json answer");
        assert_eq!(last.status, MessageStatus::Complete);
        assert_eq!(last.metrics.unwrap().total_ms, 12.0);
    }

    #[test]
    fn test_second_begin_is_busy() {
        let mut session = Session::new();
        session.begin("first").unwrap();

        assert!(matches!(session.begin("second"), Err(AppError::Busy)));
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn test_blank_query_rejected_without_transcript_change() {
        let mut session = Session::new();
        assert!(matches!(session.begin("   "), Err(AppError::Input(_))));
        assert!(session.transcript().is_empty());
        assert!(!session.is_busy());
    }

    #[test]
    fn test_step_api_with_trailing_unterminated_frame() {
        let mut session = Session::new();
        session.begin("q").unwrap();

        let frames = session
            .feed(b"data: {\"type\":\"token\",\"content\":\"x\"}\n\ndata: {\"type\":\"done\",\"latency_ms\":2.0}")
            .unwrap();
        assert_eq!(frames.len(), 1);

        let trailing = session.end().unwrap();
        assert_eq!(trailing, Some(Frame::Done { latency_ms: 2.0 }));
        assert!(!session.is_busy());
    }
}
