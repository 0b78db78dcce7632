//! Server-side frame encoder.
//!
//! [`StreamEncoder`] walks a query through `Start → RetrievalSent →
//! Streaming → Done`, writing each frame to a [`FrameSink`]. Out-of-order
//! calls are protocol faults; a sink that reports a closed channel stops the
//! encoder for good.

use crate::frame::Frame;
use docstream_core::{AppError, AppResult};
use docstream_retrieval::{Source, Synthesis};
use std::time::Instant;
use tokio::sync::mpsc;

/// Destination for encoded frames.
#[async_trait::async_trait]
pub trait FrameSink: Send {
    /// Write one complete frame. Fails with [`AppError::Upstream`] when the
    /// consumer has gone away.
    async fn send(&mut self, frame: &Frame) -> AppResult<()>;
}

/// Sink feeding an HTTP response body through a bounded channel.
///
/// Each frame is serialized to a full event before it is sent, so a frame
/// is never split across two writes.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver the response body reads from.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait::async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: &Frame) -> AppResult<()> {
        let event = frame.to_event()?;
        self.tx
            .send(event)
            .await
            .map_err(|_| AppError::Upstream("client disconnected".to_string()))
    }
}

/// Encoder progress for one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Start,
    RetrievalSent,
    Streaming,
    Done,
    /// The sink failed; nothing more will be written
    Closed,
}

/// Per-query frame encoder.
pub struct StreamEncoder<S: FrameSink> {
    sink: S,
    state: EncoderState,
    received_at: Instant,
    frames_sent: usize,
}

impl<S: FrameSink> StreamEncoder<S> {
    /// Create an encoder for a query received at `received_at`.
    pub fn new(sink: S, received_at: Instant) -> Self {
        Self {
            sink,
            state: EncoderState::Start,
            received_at,
            frames_sent: 0,
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn frames_sent(&self) -> usize {
        self.frames_sent
    }

    /// Emit the single retrieval frame. Only valid before any other frame.
    pub async fn retrieval(&mut self, sources: Vec<Source>) -> AppResult<()> {
        self.check_state(&[EncoderState::Start], "retrieval")?;
        self.write(Frame::Retrieval { sources }).await?;
        self.state = EncoderState::RetrievalSent;
        Ok(())
    }

    /// Emit one answer fragment.
    pub async fn token(&mut self, content: impl Into<String>) -> AppResult<()> {
        self.check_state(
            &[
                EncoderState::Start,
                EncoderState::RetrievalSent,
                EncoderState::Streaming,
            ],
            "token",
        )?;
        self.write(Frame::Token {
            content: content.into(),
        })
        .await?;
        self.state = EncoderState::Streaming;
        Ok(())
    }

    /// Emit the terminating frame and return the reported latency.
    pub async fn done(&mut self) -> AppResult<f64> {
        self.check_state(
            &[
                EncoderState::Start,
                EncoderState::RetrievalSent,
                EncoderState::Streaming,
            ],
            "done",
        )?;
        let latency_ms = self.received_at.elapsed().as_secs_f64() * 1000.0;
        self.write(Frame::Done { latency_ms }).await?;
        self.state = EncoderState::Done;
        Ok(latency_ms)
    }

    /// Give the sink back, closing the stream once it is dropped.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn check_state(&self, allowed: &[EncoderState], frame: &str) -> AppResult<()> {
        match self.state {
            EncoderState::Closed => Err(AppError::Upstream(format!(
                "cannot send {} frame: channel closed",
                frame
            ))),
            state if allowed.contains(&state) => Ok(()),
            state => Err(AppError::Protocol(format!(
                "{} frame not allowed in state {:?}",
                frame, state
            ))),
        }
    }

    async fn write(&mut self, frame: Frame) -> AppResult<()> {
        match self.sink.send(&frame).await {
            Ok(()) => {
                self.frames_sent += 1;
                Ok(())
            }
            Err(e) => {
                tracing::debug!("Stopping encoder after {} frame: {}", frame.kind(), e);
                self.state = EncoderState::Closed;
                Err(e)
            }
        }
    }
}

/// Split an answer into token fragments of `words_per_token` words.
///
/// Whitespace stays attached to the fragments, so concatenating them
/// reproduces the answer byte for byte.
pub fn chunk_answer(answer: &str, words_per_token: usize) -> Vec<String> {
    let words_per_token = words_per_token.max(1);

    // Byte offsets where a word starts after whitespace.
    let mut starts = Vec::new();
    let mut prev_ws = false;
    for (i, c) in answer.char_indices() {
        let ws = c.is_whitespace();
        if !ws && prev_ws {
            starts.push(i);
        }
        prev_ws = ws;
    }

    let mut chunks = Vec::new();
    let mut from = 0;
    for boundary in starts.into_iter().skip(words_per_token - 1).step_by(words_per_token) {
        chunks.push(answer[from..boundary].to_string());
        from = boundary;
    }
    if from < answer.len() {
        chunks.push(answer[from..].to_string());
    }
    chunks
}

/// Stream a full synthesis: retrieval, tokens, then done.
///
/// Returns the latency reported in the done frame.
pub async fn encode_synthesis<S: FrameSink>(
    encoder: &mut StreamEncoder<S>,
    synthesis: &Synthesis,
    words_per_token: usize,
) -> AppResult<f64> {
    encoder.retrieval(synthesis.sources.clone()).await?;

    for chunk in chunk_answer(&synthesis.answer, words_per_token) {
        encoder.token(chunk).await?;
    }

    let latency_ms = encoder.done().await?;
    tracing::debug!(
        "Encoded {} frames in {:.2}ms",
        encoder.frames_sent(),
        latency_ms
    );
    Ok(latency_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sink that records frames and can simulate a consumer hanging up.
    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<Frame>,
        fail_after: Option<usize>,
    }

    #[async_trait::async_trait]
    impl FrameSink for RecordingSink {
        async fn send(&mut self, frame: &Frame) -> AppResult<()> {
            if self.fail_after.is_some_and(|n| self.frames.len() >= n) {
                return Err(AppError::Upstream("client disconnected".to_string()));
            }
            self.frames.push(frame.clone());
            Ok(())
        }
    }

    fn synthesis(answer: &str) -> Synthesis {
        Synthesis {
            intent: None,
            answer: answer.to_string(),
            sources: Vec::new(),
        }
    }

    fn concat_tokens(frames: &[Frame]) -> String {
        frames
            .iter()
            .filter_map(|f| match f {
                Frame::Token { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_chunk_answer_reconstructs_exactly() {
        let answers = [
            "",
            "single",
            "two words",
            "  leading and trailing  ",
            "tabs\tand\nnewlines  mixed",
            "unicode ✓ marks and émigré words",
        ];

        for answer in answers {
            for n in 1..4 {
                let chunks = chunk_answer(answer, n);
                assert_eq!(chunks.concat(), answer, "n={n} answer={answer:?}");
                assert!(chunks.iter().all(|c| !c.is_empty()));
            }
        }
    }

    #[test]
    fn test_chunk_answer_groups_words() {
        assert_eq!(
            chunk_answer("one two three four five", 2),
            vec!["one two ", "three four ", "five"]
        );
        assert_eq!(chunk_answer("a b", 1), vec!["a ", "b"]);
        assert!(chunk_answer("", 1).is_empty());
    }

    #[tokio::test]
    async fn test_encode_synthesis_frame_order() {
        let mut encoder = StreamEncoder::new(RecordingSink::default(), Instant::now());
        let answer = "Our security protocols are strict.";

        encode_synthesis(&mut encoder, &synthesis(answer), 1)
            .await
            .unwrap();
        assert_eq!(encoder.state(), EncoderState::Done);

        let frames = encoder.into_sink().frames;
        assert!(matches!(frames.first(), Some(Frame::Retrieval { .. })));
        assert!(matches!(frames.last(), Some(Frame::Done { .. })));
        assert_eq!(
            frames
                .iter()
                .filter(|f| matches!(f, Frame::Done { .. }))
                .count(),
            1
        );
        assert_eq!(concat_tokens(&frames), answer);
    }

    #[tokio::test]
    async fn test_nothing_after_done() {
        let mut encoder = StreamEncoder::new(RecordingSink::default(), Instant::now());
        encoder.done().await.unwrap();

        assert!(matches!(
            encoder.token("late").await,
            Err(AppError::Protocol(_))
        ));
        assert!(matches!(encoder.done().await, Err(AppError::Protocol(_))));
        assert_eq!(encoder.into_sink().frames.len(), 1);
    }

    #[tokio::test]
    async fn test_retrieval_only_first() {
        let mut encoder = StreamEncoder::new(RecordingSink::default(), Instant::now());
        encoder.token("early").await.unwrap();

        assert!(matches!(
            encoder.retrieval(Vec::new()).await,
            Err(AppError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_sink_stops_encoder() {
        let sink = RecordingSink {
            frames: Vec::new(),
            fail_after: Some(2),
        };
        let mut encoder = StreamEncoder::new(sink, Instant::now());

        let result = encode_synthesis(&mut encoder, &synthesis("a b c d e"), 1).await;
        assert!(matches!(result, Err(AppError::Upstream(_))));
        assert_eq!(encoder.state(), EncoderState::Closed);
        assert!(matches!(encoder.done().await, Err(AppError::Upstream(_))));
        assert_eq!(encoder.into_sink().frames.len(), 2);
    }

    #[tokio::test]
    async fn test_channel_sink_detects_dropped_receiver() {
        let (sink, rx) = ChannelSink::channel(4);
        let mut encoder = StreamEncoder::new(sink, Instant::now());

        encoder.retrieval(Vec::new()).await.unwrap();
        drop(rx);

        assert!(matches!(
            encoder.token("lost").await,
            Err(AppError::Upstream(_))
        ));
        assert_eq!(encoder.state(), EncoderState::Closed);
    }

    #[tokio::test]
    async fn test_channel_sink_writes_whole_events() {
        let (sink, mut rx) = ChannelSink::channel(4);
        let mut encoder = StreamEncoder::new(sink, Instant::now());

        encoder.token("hi").await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event, "data: {\"type\":\"token\",\"content\":\"hi\"}\n\n");
    }
}
