//! Conversation transcript and the frame assembler that fills it.
//!
//! A [`Transcript`] is append-only. The only in-place mutation is on the last
//! message, which the [`TranscriptAssembler`] grows while an answer streams.

use crate::frame::{Frame, QueryMetrics};
use docstream_core::{AppError, AppResult};
use docstream_retrieval::Source;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a message in the transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Answer still streaming
    Pending,
    #[default]
    Complete,
    /// The stream ended early; the message will not change again
    Partial,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<QueryMetrics>,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: None,
            metrics: None,
            status: MessageStatus::Complete,
        }
    }

    /// A finished assistant message with no attachments.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources: None,
            metrics: None,
            status: MessageStatus::Complete,
        }
    }

    fn pending() -> Self {
        Self {
            status: MessageStatus::Pending,
            ..Self::assistant(String::new())
        }
    }
}

/// Ordered conversation owned by one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_mut(&mut self) -> Option<&mut Message> {
        self.messages.last_mut()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Assembler progress for the in-flight answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    /// No query begun
    Idle,
    AwaitingFrames,
    Retrieved,
    Streaming,
    Complete,
    Partial,
}

/// Applies frames to the accumulator message at the end of a transcript.
#[derive(Debug)]
pub struct TranscriptAssembler {
    state: AssemblyState,
    pending_sources: Option<Vec<Source>>,
    cache_hit: bool,
}

impl Default for TranscriptAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self {
            state: AssemblyState::Idle,
            pending_sources: None,
            cache_hit: false,
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Start a new answer: append the empty assistant accumulator.
    pub fn begin(&mut self, transcript: &mut Transcript, cache_hit: bool) {
        transcript.push(Message::pending());
        self.state = AssemblyState::AwaitingFrames;
        self.pending_sources = None;
        self.cache_hit = cache_hit;
    }

    /// Cache status is learned from response headers, after `begin`.
    pub fn set_cache_hit(&mut self, cache_hit: bool) {
        self.cache_hit = cache_hit;
    }

    /// Apply one frame. An out-of-order frame marks a still-streaming answer
    /// partial; a completed answer is never touched again.
    pub fn apply(&mut self, transcript: &mut Transcript, frame: Frame) -> AppResult<()> {
        let kind = frame.kind();
        let streaming = matches!(
            self.state,
            AssemblyState::AwaitingFrames | AssemblyState::Retrieved | AssemblyState::Streaming
        );
        let result = self.transition(transcript, frame);
        if let Err(e) = &result {
            tracing::debug!("Rejected {} frame: {}", kind, e);
            if streaming {
                self.mark_partial(transcript);
            }
        }
        result
    }

    /// The stream has closed. Fails if no done frame arrived.
    pub fn finish(&mut self, transcript: &mut Transcript) -> AppResult<()> {
        match self.state {
            AssemblyState::Complete => Ok(()),
            AssemblyState::Idle => Err(AppError::Protocol(
                "stream closed before any query began".to_string(),
            )),
            AssemblyState::Partial => Err(AppError::Upstream(
                "stream ended after a protocol fault".to_string(),
            )),
            _ => {
                self.mark_partial(transcript);
                Err(AppError::Upstream(
                    "stream closed before completion".to_string(),
                ))
            }
        }
    }

    /// Abandon the in-flight answer, leaving whatever content arrived.
    pub fn abort(&mut self, transcript: &mut Transcript) {
        if !matches!(
            self.state,
            AssemblyState::Idle | AssemblyState::Complete | AssemblyState::Partial
        ) {
            self.mark_partial(transcript);
        }
    }

    fn transition(&mut self, transcript: &mut Transcript, frame: Frame) -> AppResult<()> {
        use AssemblyState::*;

        match (self.state, frame) {
            (AwaitingFrames, Frame::Retrieval { sources }) => {
                self.pending_sources = Some(sources);
                self.state = Retrieved;
                Ok(())
            }
            (AwaitingFrames | Retrieved | Streaming, Frame::Token { content }) => {
                accumulator(transcript)?.content.push_str(&content);
                self.state = Streaming;
                Ok(())
            }
            (AwaitingFrames | Retrieved | Streaming, Frame::Done { latency_ms }) => {
                if !latency_ms.is_finite() || latency_ms < 0.0 {
                    return Err(AppError::Protocol(format!(
                        "invalid latency in done frame: {}",
                        latency_ms
                    )));
                }
                let sources = self.pending_sources.take().unwrap_or_default();
                let metrics = QueryMetrics::from_latency(latency_ms, self.cache_hit);

                let message = accumulator(transcript)?;
                message.sources = Some(sources);
                message.metrics = Some(metrics);
                message.status = MessageStatus::Complete;
                self.state = Complete;
                Ok(())
            }
            (state, frame) => Err(AppError::Protocol(format!(
                "unexpected {} frame in state {:?}",
                frame.kind(),
                state
            ))),
        }
    }

    fn mark_partial(&mut self, transcript: &mut Transcript) {
        if let Ok(message) = accumulator(transcript) {
            message.status = MessageStatus::Partial;
        }
        self.state = AssemblyState::Partial;
    }
}

fn accumulator(transcript: &mut Transcript) -> AppResult<&mut Message> {
    match transcript.last_mut() {
        Some(message) if message.role == Role::Assistant => Ok(message),
        _ => Err(AppError::Protocol(
            "no assistant message to accumulate into".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstream_retrieval::{Metadata, MetadataValue};

    fn source(title: &str) -> Source {
        let mut metadata = Metadata::new();
        metadata.insert("title".to_string(), MetadataValue::from(title));
        Source {
            excerpt: format!("{} excerpt", title),
            metadata,
            relevance: 0.9,
        }
    }

    fn token(content: &str) -> Frame {
        Frame::Token {
            content: content.to_string(),
        }
    }

    fn started() -> (Transcript, TranscriptAssembler) {
        let mut transcript = Transcript::new();
        transcript.push(Message::user("q"));
        let mut assembler = TranscriptAssembler::new();
        assembler.begin(&mut transcript, false);
        (transcript, assembler)
    }

    #[test]
    fn test_begin_appends_pending_assistant() {
        let (transcript, assembler) = started();
        assert_eq!(transcript.len(), 2);

        let last = transcript.last().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert!(last.content.is_empty());
        assert_eq!(last.status, MessageStatus::Pending);
        assert_eq!(assembler.state(), AssemblyState::AwaitingFrames);
    }

    #[test]
    fn test_full_sequence_completes_message() {
        let (mut transcript, mut assembler) = started();
        assembler.set_cache_hit(true);

        let frames = vec![
            Frame::Retrieval {
                sources: vec![source("A"), source("B")],
            },
            token("Hello "),
            token("world"),
            Frame::Done { latency_ms: 100.0 },
        ];
        for frame in frames {
            assembler.apply(&mut transcript, frame).unwrap();
        }
        assembler.finish(&mut transcript).unwrap();

        let last = transcript.last().unwrap();
        assert_eq!(last.content, "Hello world");
        assert_eq!(last.status, MessageStatus::Complete);
        assert_eq!(last.sources.as_ref().unwrap().len(), 2);

        let metrics = last.metrics.unwrap();
        assert_eq!(metrics.total_ms, 100.0);
        assert_eq!(metrics.retrieval_ms, 30.0);
        assert_eq!(metrics.generation_ms, 70.0);
        assert!(metrics.cache_hit);
    }

    #[test]
    fn test_sources_attach_only_on_done() {
        let (mut transcript, mut assembler) = started();
        assembler
            .apply(
                &mut transcript,
                Frame::Retrieval {
                    sources: vec![source("A")],
                },
            )
            .unwrap();
        assembler.apply(&mut transcript, token("partial")).unwrap();

        assert!(transcript.last().unwrap().sources.is_none());
    }

    #[test]
    fn test_done_without_retrieval_attaches_empty_sources() {
        let (mut transcript, mut assembler) = started();
        assembler.apply(&mut transcript, token("x")).unwrap();
        assembler
            .apply(&mut transcript, Frame::Done { latency_ms: 1.0 })
            .unwrap();

        assert_eq!(transcript.last().unwrap().sources, Some(vec![]));
    }

    #[test]
    fn test_retrieval_then_close_is_partial() {
        let (mut transcript, mut assembler) = started();
        assembler
            .apply(
                &mut transcript,
                Frame::Retrieval {
                    sources: vec![source("A")],
                },
            )
            .unwrap();

        let err = assembler.finish(&mut transcript).unwrap_err();
        assert!(err.is_upstream());
        assert_eq!(assembler.state(), AssemblyState::Partial);

        let last = transcript.last().unwrap();
        assert!(last.content.is_empty());
        assert!(last.metrics.is_none());
        assert!(last.sources.is_none());
        assert_eq!(last.status, MessageStatus::Partial);
    }

    #[test]
    fn test_frame_after_done_is_protocol_fault() {
        let (mut transcript, mut assembler) = started();
        assembler
            .apply(&mut transcript, Frame::Done { latency_ms: 5.0 })
            .unwrap();

        let err = assembler.apply(&mut transcript, token("late")).unwrap_err();
        assert!(matches!(err, AppError::Protocol(_)));
        assert_eq!(assembler.state(), AssemblyState::Complete);

        let last = transcript.last().unwrap();
        assert!(last.content.is_empty());
        assert_eq!(last.status, MessageStatus::Complete);
        assert!(last.metrics.is_some());
    }

    #[test]
    fn test_completed_message_survives_late_frames() {
        let (mut transcript, mut assembler) = started();
        assembler.apply(&mut transcript, token("ok")).unwrap();
        assembler
            .apply(&mut transcript, Frame::Done { latency_ms: 1.0 })
            .unwrap();

        assert!(assembler.apply(&mut transcript, token("late")).is_err());
        assert!(assembler
            .apply(&mut transcript, Frame::Retrieval { sources: vec![] })
            .is_err());
        assembler.finish(&mut transcript).unwrap();

        let last = transcript.last().unwrap();
        assert_eq!(last.content, "ok");
        assert_eq!(last.status, MessageStatus::Complete);
        assert_eq!(last.metrics.unwrap().total_ms, 1.0);
    }

    #[test]
    fn test_second_retrieval_is_protocol_fault() {
        let (mut transcript, mut assembler) = started();
        assembler
            .apply(&mut transcript, Frame::Retrieval { sources: vec![] })
            .unwrap();

        let err = assembler
            .apply(&mut transcript, Frame::Retrieval { sources: vec![] })
            .unwrap_err();
        assert!(matches!(err, AppError::Protocol(_)));
        assert_eq!(transcript.last().unwrap().status, MessageStatus::Partial);
    }

    #[test]
    fn test_partial_message_is_not_mutated_further() {
        let (mut transcript, mut assembler) = started();
        assembler.apply(&mut transcript, token("kept")).unwrap();
        assembler
            .apply(&mut transcript, Frame::Retrieval { sources: vec![] })
            .unwrap_err();

        assert!(assembler.apply(&mut transcript, token(" lost")).is_err());
        assert_eq!(transcript.last().unwrap().content, "kept");
    }

    #[test]
    fn test_negative_latency_rejected() {
        let (mut transcript, mut assembler) = started();
        let err = assembler
            .apply(&mut transcript, Frame::Done { latency_ms: -1.0 })
            .unwrap_err();
        assert!(matches!(err, AppError::Protocol(_)));
    }

    #[test]
    fn test_message_serializes_without_empty_attachments() {
        let value = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"role": "user", "content": "hi", "status": "complete"})
        );
    }
}
