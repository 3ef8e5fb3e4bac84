//! Server-Sent-Events transport for the comment feed.
//!
//! `SseEventParser` is a pure line-at-a-time state machine; `EventStream`
//! owns the HTTP connection, drives the parser from a single reader task and
//! pushes completed events onto a bounded queue. The reader is the sole owner
//! of that queue's sending half and of the error channel: both are closed
//! when the reader exits, whatever the reason.

mod cancellation;
mod sse_parser;
mod sse_stream;

pub use cancellation::CancellationToken;
pub use sse_parser::{SseEvent, SseEventParser, SseParseError};
pub use sse_stream::{EventStream, SseStreamError};
