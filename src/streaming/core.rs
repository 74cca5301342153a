//! # Core Streaming Functionality
//!
//! Pull-based, cancellable event streams shared by the SSE reader, the
//! completion client and the benchmark runner.
//!
//! An [`EventStream`] is driven by its single consumer: every call to
//! [`EventStream::next`] pulls one item through the whole pipeline on the
//! caller's task. Transformations such as [`map`] add a function call per item
//! and never spawn a task or allocate a channel of their own.
//!
//! ```rust,no_run
//! use nexus_nitro_bench::streaming::{EventStream, Next, iter};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let cancel = CancellationToken::new();
//! let mut lengths = iter(vec!["a", "bb", "ccc"]).map(str::len);
//!
//! while let Next::Item(len) = lengths.next(&cancel).await {
//!     println!("{len}");
//! }
//! # }
//! ```

use crate::error::BenchError;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Outcome of a single pull from an [`EventStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next<T> {
    /// The next item in the sequence.
    Item(T),
    /// The sequence ended. Every later call reports this again.
    Exhausted,
    /// The wait was cancelled. Every later call reports this again.
    Cancelled,
}

impl<T> Next<T> {
    /// Converts the outcome into `Ok(Some(item))`, `Ok(None)` or `Err(Cancelled)`.
    pub fn into_result(self) -> Result<Option<T>, BenchError> {
        match self {
            Next::Item(item) => Ok(Some(item)),
            Next::Exhausted => Ok(None),
            Next::Cancelled => Err(BenchError::Cancelled),
        }
    }

    pub fn is_item(&self) -> bool {
        matches!(self, Next::Item(_))
    }
}

/// Terminal state a stream latches into once it stops producing items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Terminal {
    Exhausted,
    Cancelled,
}

impl Terminal {
    pub(crate) fn report<T>(self) -> Next<T> {
        match self {
            Terminal::Exhausted => Next::Exhausted,
            Terminal::Cancelled => Next::Cancelled,
        }
    }
}

/// A lazy, cancellable, pull-based sequence.
///
/// A stream is owned by exactly one consumer. Once `next` reports
/// [`Next::Exhausted`] or [`Next::Cancelled`] it keeps reporting the same
/// outcome, and the consumer should stop calling it.
#[async_trait]
pub trait EventStream: Send {
    type Item: Send;

    /// Produces the next item, waiting at most until `cancel` fires.
    async fn next(&mut self, cancel: &CancellationToken) -> Next<Self::Item>;

    /// Collects every remaining item, or fails with [`BenchError::Cancelled`].
    async fn drain_all(&mut self, cancel: &CancellationToken) -> Result<Vec<Self::Item>, BenchError> {
        let mut items = Vec::with_capacity(100);
        loop {
            match self.next(cancel).await {
                Next::Item(item) => items.push(item),
                Next::Exhausted => return Ok(items),
                Next::Cancelled => return Err(BenchError::Cancelled),
            }
        }
    }

    /// Lazily converts every item with `convert`. See [`map`].
    fn map<U, F>(self, convert: F) -> Map<Self, F>
    where
        Self: Sized,
        F: FnMut(Self::Item) -> U + Send,
        U: Send,
    {
        map(self, convert)
    }
}

#[async_trait]
impl<S> EventStream for Box<S>
where
    S: EventStream + ?Sized,
{
    type Item = S::Item;

    async fn next(&mut self, cancel: &CancellationToken) -> Next<Self::Item> {
        (**self).next(cancel).await
    }
}

/// Returns a stream whose `next` pulls from `source` and applies `convert`.
///
/// Exhaustion and cancellation pass through unchanged. `convert` runs on the
/// consumer's task, synchronously, once per item.
pub fn map<S, U, F>(source: S, convert: F) -> Map<S, F>
where
    S: EventStream,
    F: FnMut(S::Item) -> U + Send,
    U: Send,
{
    Map {
        source,
        convert,
        terminal: None,
    }
}

/// Stream returned by [`map`].
pub struct Map<S, F> {
    source: S,
    convert: F,
    terminal: Option<Terminal>,
}

#[async_trait]
impl<S, U, F> EventStream for Map<S, F>
where
    S: EventStream,
    F: FnMut(S::Item) -> U + Send,
    U: Send,
{
    type Item = U;

    async fn next(&mut self, cancel: &CancellationToken) -> Next<U> {
        if let Some(terminal) = self.terminal {
            return terminal.report();
        }

        match self.source.next(cancel).await {
            Next::Item(item) => Next::Item((self.convert)(item)),
            Next::Exhausted => {
                self.terminal = Some(Terminal::Exhausted);
                Next::Exhausted
            }
            Next::Cancelled => {
                self.terminal = Some(Terminal::Cancelled);
                Next::Cancelled
            }
        }
    }
}

/// Stream over the receiving half of a tokio channel.
///
/// Brings values produced by another task into the pull-based world. The
/// stream is exhausted once every sender is dropped and the buffer is empty.
pub struct ChannelStream<T> {
    receiver: mpsc::Receiver<T>,
    terminal: Option<Terminal>,
}

impl<T> ChannelStream<T> {
    pub fn new(receiver: mpsc::Receiver<T>) -> Self {
        Self {
            receiver,
            terminal: None,
        }
    }
}

#[async_trait]
impl<T: Send> EventStream for ChannelStream<T> {
    type Item = T;

    async fn next(&mut self, cancel: &CancellationToken) -> Next<T> {
        if let Some(terminal) = self.terminal {
            return terminal.report();
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.terminal = Some(Terminal::Cancelled);
                Next::Cancelled
            }
            value = self.receiver.recv() => match value {
                Some(value) => Next::Item(value),
                None => {
                    self.terminal = Some(Terminal::Exhausted);
                    Next::Exhausted
                }
            },
        }
    }
}

/// Stream over an in-memory iterator. Never blocks, but still honours a
/// cancelled token.
pub struct IterStream<I> {
    iter: I,
    terminal: Option<Terminal>,
}

/// Creates an [`IterStream`] from anything iterable.
pub fn iter<I>(items: I) -> IterStream<I::IntoIter>
where
    I: IntoIterator,
    I::IntoIter: Send,
    I::Item: Send,
{
    IterStream {
        iter: items.into_iter(),
        terminal: None,
    }
}

#[async_trait]
impl<I> EventStream for IterStream<I>
where
    I: Iterator + Send,
    I::Item: Send,
{
    type Item = I::Item;

    async fn next(&mut self, cancel: &CancellationToken) -> Next<I::Item> {
        if let Some(terminal) = self.terminal {
            return terminal.report();
        }
        if cancel.is_cancelled() {
            self.terminal = Some(Terminal::Cancelled);
            return Next::Cancelled;
        }

        match self.iter.next() {
            Some(item) => Next::Item(item),
            None => {
                self.terminal = Some(Terminal::Exhausted);
                Next::Exhausted
            }
        }
    }
}
