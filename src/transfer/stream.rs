//! Byte sources for uploads and flow-controlled sinks for downloads

use bytes::Bytes;
use std::fmt;
use std::io::{self, Cursor};
use std::path::Path;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Upload body with a declared length.
///
/// The length is never guessed: readers without a known length carry `None`
/// and are rejected by the transport.
pub struct InputStream {
    reader: Pin<Box<dyn AsyncRead + Send>>,
    length: Option<u64>,
    /// In-memory copy that lets the client replay the body on retry
    replay: Option<Bytes>,
}

impl InputStream {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            length: Some(data.len() as u64),
            reader: Box::pin(Cursor::new(data.clone())),
            replay: Some(data),
        }
    }

    pub fn from_reader<R>(reader: R, length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self {
            reader: Box::pin(reader),
            length,
            replay: None,
        }
    }

    /// Stream a file; the length comes from its metadata
    pub async fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let length = file.metadata().await?.len();
        Ok(Self::from_reader(file, Some(length)))
    }

    /// Declared length in bytes, `None` when indeterminate
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Whole body when it is held in memory
    pub fn replayable(&self) -> Option<&Bytes> {
        self.replay.as_ref()
    }

    pub fn into_reader(self) -> Pin<Box<dyn AsyncRead + Send>> {
        self.reader
    }
}

impl fmt::Debug for InputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputStream")
            .field("length", &self.length)
            .field("replayable", &self.replay.is_some())
            .finish()
    }
}

/// Download destination.
///
/// Writes are awaited chunk by chunk, so a slow writer stops the connection
/// from being read instead of buffering the response.
pub struct OutputSink {
    writer: Pin<Box<dyn AsyncWrite + Send>>,
}

impl OutputSink {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + 'static,
    {
        Self {
            writer: Box::pin(writer),
        }
    }

    /// Sink that drops every byte
    pub fn discard() -> Self {
        Self::new(tokio::io::sink())
    }

    pub async fn create_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = tokio::fs::File::create(path.as_ref()).await?;
        Ok(Self::new(tokio::io::BufWriter::with_capacity(256 * 1024, file)))
    }

    pub async fn write_chunk(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk).await
    }

    /// Flush and close the writer so readers observe end of stream
    pub async fn finish(&mut self) -> io::Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await
    }
}

impl fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_bytes_stream_declares_length() {
        let stream = InputStream::from_bytes(vec![7u8; 1024]);
        assert_eq!(stream.length(), Some(1024));
        assert_eq!(stream.replayable().map(|b| b.len()), Some(1024));

        let mut reader = stream.into_reader();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf.len(), 1024);
    }

    #[tokio::test]
    async fn test_reader_without_length() {
        let stream = InputStream::from_reader(tokio::io::empty(), None);
        assert_eq!(stream.length(), None);
        assert!(stream.replayable().is_none());
    }

    #[tokio::test]
    async fn test_file_stream_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        tokio::fs::write(&path, vec![1u8; 333]).await.unwrap();

        let stream = InputStream::from_file(&path).await.unwrap();
        assert_eq!(stream.length(), Some(333));
    }

    #[tokio::test]
    async fn test_sink_applies_backpressure() {
        // A 16-byte duplex buffer cannot absorb 64 bytes until the reader drains it
        let (writer, mut reader) = tokio::io::duplex(16);
        let mut sink = OutputSink::new(writer);

        let producer = tokio::spawn(async move {
            sink.write_chunk(&[9u8; 64]).await.unwrap();
            sink.finish().await.unwrap();
        });

        let mut received = Vec::new();
        reader.read_to_end(&mut received).await.unwrap();
        producer.await.unwrap();
        assert_eq!(received, vec![9u8; 64]);
    }
}
