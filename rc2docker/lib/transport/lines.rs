use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use super::ByteStream;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Reassembles newline-delimited records from arbitrarily split chunks.
///
/// A chunk may end in the middle of a record, or carry several records at once. Complete records
/// are returned without their line terminator; blank lines are dropped.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: BytesMut,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LineBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every record it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line = self.pending.split_to(pos + 1).freeze();
            if let Some(line) = trim_line(line) {
                lines.push(line);
            }
        }

        lines
    }

    /// Returns the trailing record left when the stream ended without a final newline.
    pub fn finish(&mut self) -> Option<Bytes> {
        let rest = self.pending.split().freeze();
        trim_line(rest)
    }

    /// Returns true if a partial record is buffered.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Adapts a chunk stream into a stream of complete newline-delimited records.
pub fn lines(mut chunks: ByteStream) -> ByteStream {
    let stream = async_stream::try_stream! {
        let mut buffer = LineBuffer::new();
        while let Some(chunk) = chunks.next().await {
            for line in buffer.push(&chunk?) {
                yield line;
            }
        }

        if let Some(line) = buffer.finish() {
            yield line;
        }
    };

    Box::pin(stream)
}

fn trim_line(mut line: Bytes) -> Option<Bytes> {
    while let Some(last) = line.last() {
        if *last == b'\n' || *last == b'\r' {
            line.truncate(line.len() - 1);
        } else {
            break;
        }
    }

    let blank = line.iter().all(|b| b.is_ascii_whitespace());
    (!blank).then_some(line)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
