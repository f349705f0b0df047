//! Fan-out of one byte source to several independent readers
//!
//! The source is read once. Every chunk is handed to each attached view over
//! a bounded channel, so the slowest view throttles the source read. A view
//! that is dropped early is detached and no longer receives data.

use bytes::Bytes;
use futures::StreamExt;
use std::io;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::trace;

/// Chunks buffered per view before the source read blocks
pub const DEFAULT_VIEW_CAPACITY: usize = 16;

type Chunk = io::Result<Bytes>;

/// One consumer's side of the tee
#[derive(Debug)]
pub struct TeeView {
    rx: mpsc::Receiver<Chunk>,
}

impl TeeView {
    /// Next chunk, `None` once the source is exhausted
    pub async fn next_chunk(&mut self) -> Option<Chunk> {
        self.rx.recv().await
    }

    /// Adapt the view into an `AsyncRead` (for line-oriented consumers)
    pub fn into_reader(self) -> StreamReader<ReceiverStream<Chunk>, Bytes> {
        StreamReader::new(ReceiverStream::new(self.rx))
    }
}

/// Producer side: owns the source and the senders of every view
pub struct Tee<R> {
    source: R,
    senders: Vec<Option<mpsc::Sender<Chunk>>>,
}

impl<R> Tee<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(source: R) -> Self {
        Self {
            source,
            senders: Vec::new(),
        }
    }

    /// Attach a new view. Must be called before [`Tee::pump`].
    pub fn view(&mut self, capacity: usize) -> TeeView {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.senders.push(Some(tx));
        TeeView { rx }
    }

    /// Drive the source to completion, broadcasting every chunk.
    ///
    /// Returns the number of bytes read. A read error is forwarded to every
    /// attached view and returned.
    pub async fn pump(self) -> io::Result<u64> {
        let Tee {
            source,
            mut senders,
        } = self;
        let mut chunks = ReaderStream::new(source);
        let mut total = 0u64;

        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => {
                    total += bytes.len() as u64;
                    for slot in senders.iter_mut() {
                        let Some(tx) = slot else {
                            continue;
                        };
                        if tx.send(Ok(bytes.clone())).await.is_err() {
                            trace!("Tee view closed; detaching");
                            *slot = None;
                        }
                    }
                }
                Err(e) => {
                    for tx in senders.iter().flatten() {
                        let _ = tx.send(Err(io::Error::new(e.kind(), e.to_string()))).await;
                    }
                    return Err(e);
                }
            }
        }

        Ok(total)
    }
}
