use bytes::{Buf, Bytes, BytesMut};
use futures::{stream::BoxStream, StreamExt};

use crate::{DockerError, DockerResult};

use super::ByteStream;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Size of the header in front of every multiplexed frame.
pub const FRAME_HEADER_LEN: usize = 8;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Which output stream a frame was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    /// Standard output.
    Stdout,

    /// Standard error.
    Stderr,
}

/// A live stream of decoded container output.
pub type LogEntryStream = BoxStream<'static, DockerResult<LogEntry>>;

/// One decoded frame of container output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// The stream the payload was written to.
    pub stream: LogStream,

    /// The raw payload.
    pub data: Bytes,
}

/// Decodes the engine's multiplexed stdout/stderr framing.
///
/// Every frame starts with an 8 byte header: the stream type in byte 0 (1 = stdout, 2 = stderr)
/// and the payload length as a big-endian `u32` in bytes 4..8. Frames may be split across
/// chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: BytesMut,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LogEntry {
    /// Returns the payload as lossy utf-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> DockerResult<Vec<LogEntry>> {
        self.buffer.extend_from_slice(chunk);

        let mut entries = Vec::new();
        while self.buffer.len() >= FRAME_HEADER_LEN {
            let stream = match self.buffer[0] {
                1 => LogStream::Stdout,
                2 => LogStream::Stderr,
                other => {
                    return Err(DockerError::Decoding(format!(
                        "invalid log stream type: {other}"
                    )))
                }
            };

            let size = u32::from_be_bytes([
                self.buffer[4],
                self.buffer[5],
                self.buffer[6],
                self.buffer[7],
            ]) as usize;

            if self.buffer.len() < FRAME_HEADER_LEN + size {
                break;
            }

            self.buffer.advance(FRAME_HEADER_LEN);
            let data = self.buffer.split_to(size).freeze();
            entries.push(LogEntry { stream, data });
        }

        Ok(entries)
    }

    /// Returns true if a partial frame is buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Decodes a complete multiplexed body. A truncated trailing frame is an error.
pub fn decode_frames(data: &[u8]) -> DockerResult<Vec<LogEntry>> {
    let mut decoder = FrameDecoder::new();
    let entries = decoder.push(data)?;
    if decoder.has_pending() {
        return Err(DockerError::Decoding("truncated log frame".to_string()));
    }

    Ok(entries)
}

/// Adapts a multiplexed chunk stream into a stream of decoded frames.
pub fn frames(mut chunks: ByteStream) -> LogEntryStream {
    let stream = async_stream::try_stream! {
        let mut decoder = FrameDecoder::new();
        while let Some(chunk) = chunks.next().await {
            for entry in decoder.push(&chunk?)? {
                yield entry;
            }
        }

        if decoder.has_pending() {
            tracing::debug!("log stream ended inside a frame");
        }
    };

    Box::pin(stream)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn frame(stream: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![stream, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_frame_decoder_split_header_and_payload() -> anyhow::Result<()> {
        let mut data = frame(1, b"hello\n");
        data.extend(frame(2, b"oops\n"));

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&data[..5])?.is_empty());
        let first = decoder.push(&data[5..16])?;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].stream, LogStream::Stdout);
        assert_eq!(first[0].text(), "hello\n");

        let second = decoder.push(&data[16..])?;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].stream, LogStream::Stderr);
        assert_eq!(second[0].text(), "oops\n");
        assert!(!decoder.has_pending());

        Ok(())
    }

    #[test]
    fn test_frame_decoder_rejects_unknown_stream() {
        let data = frame(7, b"x");
        assert!(matches!(
            FrameDecoder::new().push(&data),
            Err(DockerError::Decoding(_))
        ));
    }

    #[test]
    fn test_decode_frames_truncated() {
        let data = frame(1, b"abcdef");
        assert!(decode_frames(&data[..10]).is_err());
        assert_eq!(decode_frames(&data).map(|e| e.len()).ok(), Some(1));
        assert!(decode_frames(&[]).map(|e| e.is_empty()).unwrap_or(false));
    }
}
