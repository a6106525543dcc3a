//! Compressed-frame codec for data blocks.
//!
//! Each compressed block on the wire is
//! `[16-byte checksum][1-byte method][u32 compressed_size][u32
//! uncompressed_size][payload]`, where `compressed_size` includes the 9-byte
//! header that follows the checksum. The checksum is CityHash128 (the
//! v1.0.2 variant ClickHouse uses) over header plus payload; it is verified
//! on every read.

use crate::{
    io::pool::{
        self,
        PooledBuffer,
    },
    protocol::CompressionMethod,
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    Bytes,
    BytesMut,
};
use cityhash_rs::cityhash_102_128;

/// Compression header size: 1 byte method + 4 bytes compressed size + 4
/// bytes uncompressed size.
pub const HEADER_SIZE: usize = 9;

/// Checksum size (CityHash128).
pub const CHECKSUM_SIZE: usize = 16;

/// Method bytes fixed by the wire protocol.
pub const METHOD_BYTE_NONE: u8 = 0x02;
pub const METHOD_BYTE_LZ4: u8 = 0x82;
pub const METHOD_BYTE_ZSTD: u8 = 0x90;

/// Maximum accepted block size on either side of compression (1 GiB).
const MAX_BLOCK_SIZE: usize = 0x4000_0000;

/// A block compression algorithm.
///
/// `compress` appends the compressed form of `src` to `dst` and returns the
/// compressed length; `decompress` fills `dst` (sized to the exact
/// uncompressed length) from `src`.
pub trait Compressor {
    /// The algorithm byte written into the frame header.
    fn method_byte(&self) -> u8;

    /// Upper bound on the compressed size of `n` input bytes.
    fn max_compressed_size(&self, n: usize) -> usize;

    /// Compress `src` into `dst`, returning the number of bytes written.
    fn compress(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize>;

    /// Decompress `src` into `dst`; `dst.len()` is the expected
    /// uncompressed length.
    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<()>;
}

/// LZ4 block compression.
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn method_byte(&self) -> u8 {
        METHOD_BYTE_LZ4
    }

    fn max_compressed_size(&self, n: usize) -> usize {
        lz4::block::compress_bound(n).unwrap_or(n + n / 255 + 16)
    }

    fn compress(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize> {
        let start = dst.len();
        dst.resize(start + self.max_compressed_size(src.len()), 0);
        let written =
            lz4::block::compress_to_buffer(src, None, false, &mut dst[start..])
                .map_err(|e| {
                    Error::Compression(format!("LZ4 compression failed: {}", e))
                })?;
        dst.truncate(start + written);
        Ok(written)
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<()> {
        let written = lz4::block::decompress_to_buffer(
            src,
            Some(dst.len() as i32),
            dst,
        )
        .map_err(|e| {
            Error::Compression(format!("LZ4 decompression failed: {}", e))
        })?;

        if written != dst.len() {
            return Err(Error::Compression(format!(
                "LZ4 decompression size mismatch: expected {}, got {}",
                dst.len(),
                written
            )));
        }
        Ok(())
    }
}

/// ZSTD block compression at level 3.
pub struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn method_byte(&self) -> u8 {
        METHOD_BYTE_ZSTD
    }

    fn max_compressed_size(&self, n: usize) -> usize {
        zstd::zstd_safe::compress_bound(n)
    }

    fn compress(&self, src: &[u8], dst: &mut Vec<u8>) -> Result<usize> {
        let start = dst.len();
        dst.resize(start + self.max_compressed_size(src.len()), 0);
        let written = zstd::bulk::compress_to_buffer(src, &mut dst[start..], 3)
            .map_err(|e| {
                Error::Compression(format!("ZSTD compression failed: {}", e))
            })?;
        dst.truncate(start + written);
        Ok(written)
    }

    fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<()> {
        let written = zstd::bulk::decompress_to_buffer(src, dst).map_err(
            |e| Error::Compression(format!("ZSTD decompression failed: {}", e)),
        )?;

        if written != dst.len() {
            return Err(Error::Compression(format!(
                "ZSTD decompression size mismatch: expected {}, got {}",
                dst.len(),
                written
            )));
        }
        Ok(())
    }
}

fn compressor_for(method: CompressionMethod) -> Option<&'static dyn Compressor> {
    match method {
        CompressionMethod::None => None,
        CompressionMethod::Lz4 => Some(&Lz4Compressor),
        CompressionMethod::Zstd => Some(&ZstdCompressor),
    }
}

// The checksum travels as two little-endian u64 halves: the low 8 bytes
// first, then the high 8 bytes.
fn checksum_bytes(hash: u128) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&(hash as u64).to_le_bytes());
    out[8..].copy_from_slice(&((hash >> 64) as u64).to_le_bytes());
    out
}

/// Compress `data` into a complete wire frame (checksum + header +
/// payload).
pub fn compress(method: CompressionMethod, data: &[u8]) -> Result<Bytes> {
    if data.len() > MAX_BLOCK_SIZE {
        return Err(Error::Compression(format!(
            "block too large to compress: {} bytes",
            data.len()
        )));
    }

    let mut body = Vec::with_capacity(HEADER_SIZE + data.len() / 2);
    let method_byte;

    match compressor_for(method) {
        Some(compressor) => {
            method_byte = compressor.method_byte();
            body.extend_from_slice(&[0u8; HEADER_SIZE]);
            compressor.compress(data, &mut body)?;
        }
        None => {
            method_byte = METHOD_BYTE_NONE;
            body.extend_from_slice(&[0u8; HEADER_SIZE]);
            body.extend_from_slice(data);
        }
    }

    let compressed_size = body.len();
    body[0] = method_byte;
    body[1..5].copy_from_slice(&(compressed_size as u32).to_le_bytes());
    body[5..9].copy_from_slice(&(data.len() as u32).to_le_bytes());

    let checksum = checksum_bytes(cityhash_102_128(&body[..]));

    let mut frame = BytesMut::with_capacity(CHECKSUM_SIZE + body.len());
    frame.put_slice(&checksum);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

/// Parsed frame header, as read ahead of the payload.
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Algorithm byte (0x82 LZ4, 0x90 ZSTD, 0x02 passthrough).
    pub method: u8,
    /// Total size of header plus compressed payload.
    pub compressed_size: usize,
    /// Size of the payload after decompression.
    pub uncompressed_size: usize,
}

impl FrameHeader {
    /// Parse the 9 header bytes that follow the checksum.
    pub fn parse(mut header: &[u8]) -> Result<Self> {
        if header.len() < HEADER_SIZE {
            return Err(Error::MalformedWire(
                "truncated compressed frame header".to_string(),
            ));
        }

        let method = header.get_u8();
        let compressed_size = header.get_u32_le() as usize;
        let uncompressed_size = header.get_u32_le() as usize;

        if compressed_size < HEADER_SIZE {
            return Err(Error::MalformedWire(format!(
                "compressed size {} smaller than frame header",
                compressed_size
            )));
        }
        if compressed_size > MAX_BLOCK_SIZE || uncompressed_size > MAX_BLOCK_SIZE
        {
            return Err(Error::MalformedWire(format!(
                "compressed frame too large: {} -> {}",
                compressed_size, uncompressed_size
            )));
        }

        Ok(Self { method, compressed_size, uncompressed_size })
    }
}

/// Decompress a complete wire frame, verifying its checksum.
///
/// `frame` must hold exactly `CHECKSUM_SIZE + compressed_size` bytes. The
/// output buffer comes from the shared decompression pool and returns there
/// on drop.
pub fn decompress(frame: &[u8]) -> Result<PooledBuffer<u8>> {
    if frame.len() < CHECKSUM_SIZE + HEADER_SIZE {
        return Err(Error::MalformedWire(
            "compressed frame shorter than checksum and header".to_string(),
        ));
    }

    let (checksum, body) = frame.split_at(CHECKSUM_SIZE);

    // Checksum first: a frame whose header was corrupted must surface as
    // a checksum failure, not a size complaint.
    let actual = checksum_bytes(cityhash_102_128(body));
    if actual != checksum {
        return Err(Error::ChecksumMismatch);
    }

    let header = FrameHeader::parse(body)?;
    if body.len() != header.compressed_size {
        return Err(Error::MalformedWire(format!(
            "compressed frame length mismatch: header says {}, have {}",
            header.compressed_size,
            body.len()
        )));
    }

    let payload = &body[HEADER_SIZE..];
    let mut out = pool::decompress_buffer(header.uncompressed_size);

    match header.method {
        METHOD_BYTE_NONE => {
            if payload.len() != header.uncompressed_size {
                return Err(Error::MalformedWire(format!(
                    "uncompressed payload size mismatch: expected {}, got {}",
                    header.uncompressed_size,
                    payload.len()
                )));
            }
            out.extend_from_slice(payload);
        }
        METHOD_BYTE_LZ4 => {
            out.resize(header.uncompressed_size, 0);
            Lz4Compressor.decompress(payload, &mut out)?;
        }
        METHOD_BYTE_ZSTD => {
            out.resize(header.uncompressed_size, 0);
            ZstdCompressor.decompress(payload, &mut out)?;
        }
        other => return Err(Error::UnsupportedAlgorithm(other)),
    }

    Ok(out)
}
