//! # Streaming Module
//!
//! Pull-based event streams and the Server-Sent Events reader that feeds them.
//!
//! ## Key Features:
//! - Cancellable `next` on every stream, no hidden tasks per transformation
//! - SSE body reader with exactly-once body release
//! - Arrival timestamps captured before any parsing

pub mod core;
pub mod sse;

pub use self::core::{iter, map, ChannelStream, EventStream, IterStream, Map, Next};
pub use self::sse::{read_server_sent_events, sanitize_line, RawEvent, SseStream, DONE_SENTINEL};
