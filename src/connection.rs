//! Buffered duplex transport wrapper.
//!
//! The connection accepts any ordered reliable byte stream (TCP in
//! production, an in-memory duplex in tests) and owns a read-ahead
//! buffer: the inline block reader may pull more bytes than one message
//! needs, and the surplus stays here for the next read instead of being
//! lost. All typed reads drain the buffer before touching the socket.

use crate::{
    wire_format::{
        FixedSize,
        WireFormat,
    },
    Error,
    Result,
};
use bytes::{
    Buf,
    BytesMut,
};
use tokio::io::{
    AsyncRead,
    AsyncReadExt,
    AsyncWrite,
    AsyncWriteExt,
    BufWriter,
};
use tokio::net::TcpStream;

const WRITE_BUFFER_SIZE: usize = 8192;
const READ_CHUNK_SIZE: usize = 8192;
const MAX_STRING_LEN: usize = 0x00FF_FFFF;

/// A duplex connection with buffered reads and writes.
pub struct Connection {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    buffered: BytesMut,
}

impl Connection {
    /// Wrap an established duplex stream.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: Box::new(read_half),
            writer: BufWriter::with_capacity(
                WRITE_BUFFER_SIZE,
                Box::new(write_half),
            ),
            buffered: BytesMut::with_capacity(READ_CHUNK_SIZE),
        }
    }

    /// Connect to a server over TCP with `TCP_NODELAY` set.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr).await.map_err(|e| {
            Error::Connection(format!("failed to connect to {}: {}", addr, e))
        })?;

        stream.set_nodelay(true).map_err(|e| {
            Error::Connection(format!("failed to set TCP_NODELAY: {}", e))
        })?;

        tracing::debug!(%addr, "connected");
        Ok(Self::new(stream))
    }

    /// Bytes read ahead of the parser.
    pub fn buffered(&self) -> &[u8] {
        &self.buffered
    }

    /// Detach the first `len` read-ahead bytes.
    pub fn take_buffered(&mut self, len: usize) -> BytesMut {
        self.buffered.split_to(len)
    }

    /// Pull at least one more byte from the transport into the read-ahead
    /// buffer.
    pub async fn fill_buffer(&mut self) -> Result<usize> {
        let read = self.reader.read_buf(&mut self.buffered).await?;
        if read == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed by peer",
            )));
        }
        Ok(read)
    }

    /// Read exactly `buf.len()` bytes, draining the read-ahead buffer
    /// first.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let from_buffered = self.buffered.len().min(buf.len());
        if from_buffered > 0 {
            buf[..from_buffered].copy_from_slice(&self.buffered[..from_buffered]);
            self.buffered.advance(from_buffered);
        }
        if from_buffered < buf.len() {
            self.reader.read_exact(&mut buf[from_buffered..]).await?;
        }
        Ok(())
    }

    /// Read exactly `len` bytes into a new vector.
    pub async fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Read one byte.
    pub async fn read_u8(&mut self) -> Result<u8> {
        if !self.buffered.is_empty() {
            return Ok(self.buffered.get_u8());
        }
        Ok(self.reader.read_u8().await?)
    }

    /// Read an unsigned LEB128 varint.
    pub async fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;

        loop {
            let byte = self.read_u8().await?;
            result |= ((byte & 0x7F) as u64) << shift;

            if byte & 0x80 == 0 {
                break;
            }

            shift += 7;
            if shift >= 64 {
                return Err(Error::MalformedWire(
                    "varint exceeds 10 bytes".to_string(),
                ));
            }
        }

        Ok(result)
    }

    /// Read a length-prefixed UTF-8 string.
    pub async fn read_string(&mut self) -> Result<String> {
        let len = self.read_varint().await? as usize;
        if len > MAX_STRING_LEN {
            return Err(Error::MalformedWire(format!(
                "string length too large: {}",
                len
            )));
        }

        let bytes = self.read_bytes(len).await?;
        String::from_utf8(bytes).map_err(|e| {
            Error::MalformedWire(format!("invalid UTF-8 in string: {}", e))
        })
    }

    /// Read a fixed-size little-endian value.
    pub async fn read_fixed<T: FixedSize>(&mut self) -> Result<T> {
        // Drain the read-ahead buffer byte-wise first.
        if !self.buffered.is_empty() {
            let mut bytes = vec![0u8; std::mem::size_of::<T>()];
            self.read_exact(&mut bytes).await?;
            let mut cursor = &bytes[..];
            return WireFormat::read_fixed(&mut cursor).await;
        }
        WireFormat::read_fixed(&mut self.reader).await
    }

    /// Read a little-endian i32.
    pub async fn read_i32(&mut self) -> Result<i32> {
        self.read_fixed().await
    }

    /// Read a little-endian u64.
    pub async fn read_u64(&mut self) -> Result<u64> {
        self.read_fixed().await
    }

    /// Write one byte.
    pub async fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.writer.write_u8(value).await?)
    }

    /// Write a little-endian i64.
    pub async fn write_i64(&mut self, value: i64) -> Result<()> {
        Ok(self.writer.write_i64_le(value).await?)
    }

    /// Write an unsigned LEB128 varint.
    pub async fn write_varint(&mut self, value: u64) -> Result<()> {
        WireFormat::write_varint64(&mut self.writer, value).await
    }

    /// Write a length-prefixed UTF-8 string.
    pub async fn write_string(&mut self, s: &str) -> Result<()> {
        WireFormat::write_string(&mut self.writer, s).await
    }

    /// Write raw bytes.
    pub async fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        Ok(self.writer.write_all(data).await?)
    }

    /// Flush buffered writes to the transport.
    pub async fn flush(&mut self) -> Result<()> {
        Ok(self.writer.flush().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_drain_read_ahead_first() {
        let (client, server) = tokio::io::duplex(256);
        let mut conn = Connection::new(client);

        let mut peer = Connection::new(server);
        peer.write_varint(300).await.unwrap();
        peer.write_string("hello").await.unwrap();
        peer.write_u8(7).await.unwrap();
        peer.flush().await.unwrap();

        // Pull everything into the read-ahead buffer up front, then parse
        // from it.
        conn.fill_buffer().await.unwrap();
        assert!(!conn.buffered().is_empty());

        assert_eq!(conn.read_varint().await.unwrap(), 300);
        assert_eq!(conn.read_string().await.unwrap(), "hello");
        assert_eq!(conn.read_u8().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn take_buffered_detaches_prefix() {
        let (client, server) = tokio::io::duplex(256);
        let mut conn = Connection::new(client);

        let mut peer = Connection::new(server);
        peer.write_bytes(b"abcdef").await.unwrap();
        peer.flush().await.unwrap();

        conn.fill_buffer().await.unwrap();
        let head = conn.take_buffered(3);
        assert_eq!(&head[..], b"abc");
        assert_eq!(conn.buffered(), b"def");
    }

    #[tokio::test]
    async fn eof_reported_on_fill() {
        let (client, server) = tokio::io::duplex(256);
        drop(server);

        let mut conn = Connection::new(client);
        assert!(conn.fill_buffer().await.is_err());
    }

    #[tokio::test]
    async fn fixed_reads_span_buffer_and_socket() {
        let (client, server) = tokio::io::duplex(256);
        let mut conn = Connection::new(client);

        let mut peer = Connection::new(server);
        peer.write_bytes(&0x11223344u32.to_le_bytes()).await.unwrap();
        peer.write_i64(-5).await.unwrap();
        peer.flush().await.unwrap();

        conn.fill_buffer().await.unwrap();
        let first: u32 = conn.read_fixed().await.unwrap();
        assert_eq!(first, 0x11223344);
        assert_eq!(conn.read_fixed::<i64>().await.unwrap(), -5);
    }
}
