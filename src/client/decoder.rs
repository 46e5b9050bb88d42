use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio_stream::Stream;

const DELIMITER: u8 = b'\n';

/// Splits a chunked byte stream into newline-terminated records.
///
/// Chunk boundaries carry no meaning: a record may arrive split across any
/// number of chunks and one chunk may hold many records. Bytes after the last
/// delimiter stay buffered until more data or [`LineDecoder::finish`] arrives.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every record it completed, in arrival order
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut records = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|&b| b == DELIMITER) {
            self.buffer.extend_from_slice(&rest[..pos]);
            rest = &rest[pos + 1..];

            let line = std::mem::take(&mut self.buffer);
            if let Some(record) = into_record(line) {
                records.push(record);
            }
        }

        self.buffer.extend_from_slice(rest);
        records
    }

    /// End of stream acts as a final delimiter for whatever is still buffered
    pub fn finish(&mut self) -> Option<String> {
        into_record(std::mem::take(&mut self.buffer))
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

// Drops a trailing CR and skips blank lines.
fn into_record(mut line: Vec<u8>) -> Option<String> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    Some(
        String::from_utf8(line)
            .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned()),
    )
}

/// Lazy, non-restartable sequence of records decoded from a chunk stream.
///
/// A transport error from the inner stream is yielded once and ends the
/// sequence; the partial buffer is discarded in that case.
pub struct RecordStream<S> {
    inner: S,
    decoder: LineDecoder,
    ready: VecDeque<String>,
    done: bool,
}

impl<S> RecordStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: LineDecoder::new(),
            ready: VecDeque::new(),
            done: false,
        }
    }
}

impl<S, B, E> Stream for RecordStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    type Item = Result<String, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(record) = this.ready.pop_front() {
                return Poll::Ready(Some(Ok(record)));
            }
            if this.done {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let records = this.decoder.push(chunk.as_ref());
                    this.ready.extend(records);
                }
                Some(Err(err)) => {
                    this.done = true;
                    this.decoder = LineDecoder::new();
                    return Poll::Ready(Some(Err(err)));
                }
                None => {
                    this.done = true;
                    if let Some(last) = this.decoder.finish() {
                        this.ready.push_back(last);
                    }
                }
            }
        }
    }
}
