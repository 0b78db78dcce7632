//! Streaming answer protocol for docstream.
//!
//! The server side encodes a synthesized answer as a sequence of frames
//! (`retrieval`, `token`..., `done`); the client side decodes those frames
//! from raw bytes and assembles them into a conversation transcript.

pub mod client;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod session;
pub mod transcript;

pub use client::{ByteStream, CompletedQuery, FrameStream, QueryBackend, QueryClient};
pub use decoder::FrameDecoder;
pub use encoder::{chunk_answer, encode_synthesis, ChannelSink, EncoderState, FrameSink, StreamEncoder};
pub use frame::{
    ErrorBody, Frame, QueryMetrics, QueryRequest, QueryResponse, CACHE_HEADER, DATA_PREFIX,
    EVENT_STREAM_CONTENT_TYPE,
};
pub use session::{Session, APOLOGY_MESSAGE};
pub use transcript::{AssemblyState, Message, MessageStatus, Role, Transcript, TranscriptAssembler};
