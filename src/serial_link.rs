use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

/// This is an abstraction for writing to the serial line, introduced to facilitate mocking
///  the I/O part away for testing
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SerialWriter: Send + Sync + 'static {
    /// Write all bytes of a message to the line, returning only after they were handed over
    ///  completely. Messages must not be interleaved on the line.
    async fn write_bytes(&self, data: &[u8]) -> anyhow::Result<()>;
}

/// A [SerialWriter] for any async byte stream, e.g. a serial port device or one half of a
///  [tokio::io::duplex] pipe
pub struct StreamWriter<W> {
    stream: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send + 'static> StreamWriter<W> {
    pub fn new(stream: W) -> StreamWriter<W> {
        StreamWriter {
            stream: Mutex::new(stream),
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> SerialWriter for StreamWriter<W> {
    async fn write_bytes(&self, data: &[u8]) -> anyhow::Result<()> {
        trace!("serial line: writing {} bytes", data.len());

        let mut stream = self.stream.lock().await;
        stream.write_all(data).await?;
        stream.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_stream_writer() {
        let (client, mut server) = tokio::io::duplex(64);
        let writer = StreamWriter::new(client);

        writer.write_bytes(b"alpha\x05").await.unwrap();
        writer.write_bytes(b"\x04").await.unwrap();

        let mut buf = [0u8; 7];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"alpha\x05\x04");
    }

    #[tokio::test]
    async fn test_stream_writer_closed() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);

        let writer = StreamWriter::new(client);
        assert!(writer.write_bytes(b"\x04").await.is_err());
    }
}
