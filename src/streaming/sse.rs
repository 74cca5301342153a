//! # Server-Sent Events Reader
//!
//! Turns a response body into a cancellable stream of [`RawEvent`]s.
//!
//! The reader takes ownership of the body. A producer task reads one line at a
//! time and races every read against a cancellation token derived from the
//! caller's token, so a read that would otherwise block forever is abandoned
//! and the body dropped as soon as cancellation fires. The body is dropped
//! exactly once, by the producer, before the stream reports exhaustion or
//! cancellation to its consumer.
//!
//! Event indices count *emitted* events: blank lines, comment lines and the
//! `[DONE]` sentinel do not consume an index.

use super::core::{EventStream, Next, Terminal};
use async_trait::async_trait;
use std::io;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Sentinel payload that ends a completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

const EVENT_BUFFER: usize = 100;

/// A single `data:` event read from the body.
#[derive(Debug)]
pub struct RawEvent {
    /// Position among the events emitted by this stream, starting at 0.
    pub index: usize,
    /// Sanitized payload, or the read failure that terminated the stream.
    pub data: Result<String, io::Error>,
    /// Captured immediately after the underlying read returned.
    pub received_at: Instant,
}

impl RawEvent {
    pub fn payload(&self) -> Option<&str> {
        self.data.as_deref().ok()
    }

    pub fn failure(&self) -> Option<&io::Error> {
        self.data.as_ref().err()
    }
}

/// Stream returned by [`read_server_sent_events`].
pub struct SseStream {
    frames: mpsc::Receiver<RawEvent>,
    shutdown: CancellationToken,
    /// Resolves to true if the producer stopped because of cancellation.
    producer: Option<JoinHandle<bool>>,
    terminal: Option<Terminal>,
}

/// Starts reading `body` as a stream of server-sent events.
///
/// The returned stream stops on the `[DONE]` sentinel, on clean end of input,
/// on a read failure (emitted as a final event carrying the error) or when
/// `cancel` fires (reported as [`Next::Cancelled`]).
pub fn read_server_sent_events<R>(body: R, cancel: &CancellationToken) -> SseStream
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let shutdown = cancel.child_token();
    let producer = tokio::spawn(produce(body, tx, shutdown.clone()));

    SseStream {
        frames: rx,
        shutdown,
        producer: Some(producer),
        terminal: None,
    }
}

async fn produce<R>(body: R, tx: mpsc::Sender<RawEvent>, shutdown: CancellationToken) -> bool
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut reader = BufReader::new(body);
    let cancelled = read_loop(&mut reader, &tx, &shutdown).await;

    // The body goes away before the consumer can observe the end of the stream.
    drop(reader);
    drop(tx);
    cancelled
}

/// Returns true if reading stopped because of cancellation.
async fn read_loop<R>(
    reader: &mut BufReader<R>,
    tx: &mpsc::Sender<RawEvent>,
    shutdown: &CancellationToken,
) -> bool
where
    R: AsyncRead + Unpin,
{
    let mut index = 0;
    let mut line = Vec::with_capacity(1024);

    loop {
        line.clear();
        let read = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("SSE read abandoned on cancellation");
                return true;
            }
            read = reader.read_until(b'\n', &mut line) => read,
        };
        let received_at = Instant::now();

        let data = match read {
            Ok(0) => {
                trace!(events = index, "SSE body reached end of input");
                return false;
            }
            Ok(_) => match sanitize_line(&line) {
                Some(payload) if payload == DONE_SENTINEL => {
                    trace!(events = index, "SSE stream signalled completion");
                    return false;
                }
                Some(payload) => Ok(payload),
                None => continue,
            },
            // A read failing because the body was torn down under us is a cancellation.
            Err(_) if shutdown.is_cancelled() => return true,
            Err(err) => Err(err),
        };

        let failed = data.is_err();
        let event = RawEvent {
            index,
            data,
            received_at,
        };
        index += 1;

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return true,
            sent = tx.send(event) => {
                if sent.is_err() {
                    // Consumer is gone; nobody is left to report to.
                    return false;
                }
            }
        }

        if failed {
            debug!(events = index, "SSE stream terminated by read failure");
            return false;
        }
    }
}

/// Extracts the payload of one SSE line.
///
/// Strips surrounding whitespace and the `data:` field prefix. Returns `None`
/// for lines that carry no payload (blank lines and `:` comments).
///
/// Runs between the read and the hand-off of every event, so it must stay cheap.
pub fn sanitize_line(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.starts_with(':') {
        return None;
    }

    let payload = line.strip_prefix("data:").unwrap_or(line).trim();
    if payload.is_empty() {
        None
    } else {
        Some(payload.to_string())
    }
}

impl SseStream {
    /// Waits for the producer task, which guarantees the body has been dropped.
    /// Returns true if the producer stopped because of cancellation.
    async fn join_producer(&mut self) -> bool {
        let Some(producer) = self.producer.take() else {
            return false;
        };
        match producer.await {
            Ok(cancelled) => cancelled,
            Err(err) => {
                debug!(error = %err, "SSE producer task did not finish cleanly");
                err.is_cancelled()
            }
        }
    }

    /// Settles the stream. Cancellation seen by either side wins over a clean
    /// end, including when events the producer had buffered were still delivered.
    async fn finish(&mut self, cancelled: bool) -> Next<RawEvent> {
        self.frames.close();
        let producer_cancelled = self.join_producer().await;
        let terminal = if cancelled || producer_cancelled {
            Terminal::Cancelled
        } else {
            Terminal::Exhausted
        };
        self.terminal = Some(terminal);
        terminal.report()
    }
}

#[async_trait]
impl EventStream for SseStream {
    type Item = RawEvent;

    async fn next(&mut self, cancel: &CancellationToken) -> Next<RawEvent> {
        if let Some(terminal) = self.terminal {
            return terminal.report();
        }

        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.shutdown.cancel();
                return self.finish(true).await;
            }
            event = self.frames.recv() => event,
        };

        match event {
            Some(event) => Next::Item(event),
            None => self.finish(false).await,
        }
    }
}

impl Drop for SseStream {
    fn drop(&mut self) {
        // An abandoned stream must not keep the connection open.
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, ReadBuf};

    /// Body wrapper that counts how many times it is closed (dropped).
    struct TrackedBody<R> {
        inner: R,
        closes: Arc<AtomicUsize>,
    }

    impl<R: AsyncRead + Unpin> AsyncRead for TrackedBody<R> {
        fn poll_read(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Pin::new(&mut self.inner).poll_read(cx, buf)
        }
    }

    impl<R> Drop for TrackedBody<R> {
        fn drop(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn tracked<R>(inner: R) -> (TrackedBody<R>, Arc<AtomicUsize>) {
        let closes = Arc::new(AtomicUsize::new(0));
        (
            TrackedBody {
                inner,
                closes: closes.clone(),
            },
            closes,
        )
    }

    fn payloads(events: &[RawEvent]) -> Vec<&str> {
        events.iter().filter_map(RawEvent::payload).collect()
    }

    #[test]
    fn test_sanitize_line() {
        assert_eq!(sanitize_line(b"data: {\"a\":1}\n").as_deref(), Some("{\"a\":1}"));
        assert_eq!(sanitize_line(b"  data:[DONE]\r\n").as_deref(), Some("[DONE]"));
        assert_eq!(sanitize_line(b"data:\n"), None);
        assert_eq!(sanitize_line(b"\n"), None);
        assert_eq!(sanitize_line(b": keep-alive\n"), None);
        assert_eq!(sanitize_line(b"plain text").as_deref(), Some("plain text"));
    }

    #[tokio::test]
    async fn test_reads_events_until_done() {
        let cancel = CancellationToken::new();
        let (body, closes) = tracked(
            tokio_test::io::Builder::new()
                .read(b"data: one\n\ndata: two\n")
                .read(b"\ndata: three\n\n")
                .read(b"data: [DONE]\n")
                .build(),
        );

        let mut stream = read_server_sent_events(body, &cancel);
        let events = stream.drain_all(&cancel).await.unwrap();

        assert_eq!(payloads(&events), vec!["one", "two", "three"]);
        let indices: Vec<usize> = events.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(matches!(stream.next(&cancel).await, Next::Exhausted));
    }

    #[tokio::test]
    async fn test_blank_lines_do_not_consume_indices() {
        let cancel = CancellationToken::new();
        let body = tokio_test::io::Builder::new()
            .read(b"\n\n: ping\n\ndata: a\n\n\n\ndata: b\n")
            .build();

        let events = read_server_sent_events(body, &cancel)
            .drain_all(&cancel)
            .await
            .unwrap();

        let indices: Vec<usize> = events.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(payloads(&events), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_end_of_input_without_done_is_clean() {
        let cancel = CancellationToken::new();
        let (body, closes) = tracked(
            tokio_test::io::Builder::new()
                .read(b"data: first\n")
                .read(b"data: last-without-newline")
                .build(),
        );

        let events = read_server_sent_events(body, &cancel)
            .drain_all(&cancel)
            .await
            .unwrap();

        assert_eq!(payloads(&events), vec!["first", "last-without-newline"]);
        assert!(events.iter().all(|e| e.failure().is_none()));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_read_failure_is_the_final_event() {
        let cancel = CancellationToken::new();
        let (body, closes) = tracked(
            tokio_test::io::Builder::new()
                .read(b"data: ok\n")
                .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "peer reset"))
                .build(),
        );

        let mut stream = read_server_sent_events(body, &cancel);
        let events = stream.drain_all(&cancel).await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].payload(), Some("ok"));
        let failure = events[1].failure().expect("second event carries the failure");
        assert_eq!(failure.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(events[1].index, 1);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(matches!(stream.next(&cancel).await, Next::Exhausted));
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_pending_read_and_closes_body() {
        let cancel = CancellationToken::new();
        let (mut writer, reader) = tokio::io::duplex(1024);
        let (body, closes) = tracked(reader);

        writer.write_all(b"data: early\n").await.unwrap();
        let mut stream = read_server_sent_events(body, &cancel);

        let first = stream.next(&cancel).await;
        assert!(matches!(first, Next::Item(ref e) if e.payload() == Some("early")));

        // Writer stays open, so the next read blocks until cancellation.
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let outcome = tokio::time::timeout(Duration::from_secs(2), stream.next(&cancel))
            .await
            .expect("cancellation must unblock the read");
        assert!(matches!(outcome, Next::Cancelled));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(matches!(stream.next(&cancel).await, Next::Cancelled));
        drop(writer);
    }

    #[tokio::test]
    async fn test_reader_token_cancellation_is_reported() {
        // The consumer polls with a token that never fires; the token the
        // reader was built with does.
        let reader_cancel = CancellationToken::new();
        let consumer_cancel = CancellationToken::new();
        let (_writer, reader) = tokio::io::duplex(64);
        let (body, closes) = tracked(reader);

        let mut stream = read_server_sent_events(body, &reader_cancel);
        reader_cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), stream.next(&consumer_cancel))
            .await
            .expect("producer cancellation must reach the consumer");
        assert!(matches!(outcome, Next::Cancelled));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancellation_with_a_full_buffer_is_not_a_clean_end() {
        let reader_cancel = CancellationToken::new();
        let consumer_cancel = CancellationToken::new();
        let (mut writer, reader) = tokio::io::duplex(16 * 1024);
        let (body, closes) = tracked(reader);

        for i in 0..150 {
            writer.write_all(format!("data: event-{i}\n").as_bytes()).await.unwrap();
        }
        let mut stream = read_server_sent_events(body, &reader_cancel);

        // Let the producer fill the channel and block handing off the next event.
        tokio::time::sleep(Duration::from_millis(50)).await;
        reader_cancel.cancel();

        let mut delivered = 0;
        let outcome = loop {
            match stream.next(&consumer_cancel).await {
                Next::Item(_) => delivered += 1,
                other => break other,
            }
        };

        assert_eq!(delivered, EVENT_BUFFER);
        assert!(matches!(outcome, Next::Cancelled));
        assert!(matches!(stream.next(&consumer_cancel).await, Next::Cancelled));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        drop(writer);
    }

    #[tokio::test]
    async fn test_dropping_the_stream_releases_the_body() {
        let cancel = CancellationToken::new();
        let (_writer, reader) = tokio::io::duplex(64);
        let (body, closes) = tracked(reader);

        let stream = read_server_sent_events(body, &cancel);
        drop(stream);

        tokio::time::timeout(Duration::from_secs(2), async {
            while closes.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("body should be dropped after the stream is abandoned");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_timestamps_follow_arrival() {
        let cancel = CancellationToken::new();
        let body = tokio_test::io::Builder::new()
            .read(b"data: a\n")
            .wait(Duration::from_millis(40))
            .read(b"data: b\n")
            .build();

        let events = read_server_sent_events(body, &cancel)
            .drain_all(&cancel)
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        let gap = events[1].received_at.duration_since(events[0].received_at);
        assert!(gap >= Duration::from_millis(30), "gap was {gap:?}");
    }
}
