//! Length-prefixed, optionally compressed frames over a byte stream.
//!
//! ```text
//! +-------------------+------------+---------------------------+
//! | length (4 bytes)  | flag (1)   | body (length - 1 bytes)   |
//! | u32 little-endian | 0x00/0x01  | raw or LZ4 size-prepended |
//! +-------------------+------------+---------------------------+
//! ```
//!
//! The length covers the flag byte and the body. Bodies at or above the
//! compression threshold are LZ4-compressed; generated images carried in a
//! full-state snapshot are the usual reason a frame crosses it.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Flag byte: body is stored as-is.
pub const FLAG_RAW: u8 = 0x00;

/// Flag byte: body is LZ4-compressed with its size prepended.
pub const FLAG_LZ4: u8 = 0x01;

/// Limits and thresholds for the frame codec.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Maximum allowed frame length in bytes (flag + body). Default: 16 MB.
    pub max_frame_bytes: u32,
    /// Minimum body size before LZ4 is applied. Default: 1 KB.
    pub compression_threshold: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 16 * 1_048_576,
            compression_threshold: 1024,
        }
    }
}

/// Errors that can occur while reading or writing frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame length exceeds the configured maximum.
    #[error("frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// The actual frame size.
        size: u64,
        /// The configured maximum.
        max: u32,
    },

    /// A frame declared zero length, so it has no flag byte.
    #[error("empty frame")]
    EmptyFrame,

    /// The flag byte is not one this codec writes.
    #[error("unknown compression flag: 0x{0:02X}")]
    UnknownFlag(u8),

    /// LZ4 decompression failed.
    #[error("LZ4 decompression failed: {0}")]
    Decompress(String),

    /// The peer closed the stream before a complete frame arrived.
    #[error("connection closed")]
    ConnectionClosed,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Build the flag + body bytes for a payload, compressing when it is large.
pub fn encode_body(payload: &[u8], config: &CodecConfig) -> Vec<u8> {
    if payload.len() < config.compression_threshold {
        let mut out = Vec::with_capacity(1 + payload.len());
        out.push(FLAG_RAW);
        out.extend_from_slice(payload);
        out
    } else {
        let compressed = compress_prepend_size(payload);
        let mut out = Vec::with_capacity(1 + compressed.len());
        out.push(FLAG_LZ4);
        out.extend_from_slice(&compressed);
        out
    }
}

/// Recover the payload from flag + body bytes.
///
/// The decompressed size is bounded by `config.max_frame_bytes` too, checked
/// against the size prefix before anything is allocated.
pub fn decode_body(frame: &[u8], config: &CodecConfig) -> Result<Vec<u8>, FrameError> {
    let (&flag, body) = frame.split_first().ok_or(FrameError::EmptyFrame)?;
    match flag {
        FLAG_RAW => Ok(body.to_vec()),
        FLAG_LZ4 => {
            let prefix: [u8; 4] = body
                .get(..4)
                .and_then(|bytes| bytes.try_into().ok())
                .ok_or_else(|| FrameError::Decompress("missing size prefix".to_string()))?;
            let size = u32::from_le_bytes(prefix);
            if size > config.max_frame_bytes {
                return Err(FrameError::FrameTooLarge {
                    size: u64::from(size),
                    max: config.max_frame_bytes,
                });
            }
            decompress_size_prepended(body).map_err(|e| FrameError::Decompress(e.to_string()))
        }
        other => Err(FrameError::UnknownFlag(other)),
    }
}

/// Read one frame and return its decoded payload.
///
/// Returns [`FrameError::ConnectionClosed`] if the peer closes the stream
/// before the frame is complete.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    config: &CodecConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let frame_len = u32::from_le_bytes(len_buf);
    if frame_len > config.max_frame_bytes {
        return Err(FrameError::FrameTooLarge {
            size: u64::from(frame_len),
            max: config.max_frame_bytes,
        });
    }
    if frame_len == 0 {
        return Err(FrameError::EmptyFrame);
    }

    let mut frame = vec![0u8; frame_len as usize];
    reader.read_exact(&mut frame).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::ConnectionClosed
        } else {
            FrameError::Io(e)
        }
    })?;

    decode_body(&frame, config)
}

/// Encode `payload` and write it as one frame.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &CodecConfig,
) -> Result<(), FrameError> {
    let body = encode_body(payload, config);
    write_encoded(writer, &body, config).await
}

/// Write bytes already produced by [`encode_body`] as one frame.
///
/// Broadcasts encode once and hand the same bytes to every channel.
pub async fn write_encoded<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    body: &[u8],
    config: &CodecConfig,
) -> Result<(), FrameError> {
    let len = u32::try_from(body.len())
        .ok()
        .filter(|len| *len <= config.max_frame_bytes)
        .ok_or(FrameError::FrameTooLarge {
            size: body.len() as u64,
            max: config.max_frame_bytes,
        })?;

    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn default_config() -> CodecConfig {
        CodecConfig::default()
    }

    #[tokio::test]
    async fn test_single_frame_roundtrip() {
        let (mut client, mut server) = duplex(8192);
        let config = default_config();

        write_frame(&mut client, b"hello peer", &config).await.unwrap();
        let received = read_frame(&mut server, &config).await.unwrap();
        assert_eq!(received, b"hello peer");
    }

    #[tokio::test]
    async fn test_back_to_back_frames_dont_merge() {
        let (mut client, mut server) = duplex(8192);
        let config = default_config();

        write_frame(&mut client, b"aaa", &config).await.unwrap();
        write_frame(&mut client, b"bbb", &config).await.unwrap();

        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"aaa");
        assert_eq!(read_frame(&mut server, &config).await.unwrap(), b"bbb");
    }

    #[tokio::test]
    async fn test_large_payload_is_compressed_on_the_wire() {
        let (mut client, mut server) = duplex(1 << 16);
        let config = default_config();
        let image = vec![0xABu8; 32_768];

        write_frame(&mut client, &image, &config).await.unwrap();

        let mut len_buf = [0u8; 4];
        server.read_exact(&mut len_buf).await.unwrap();
        let frame_len = u32::from_le_bytes(len_buf) as usize;
        assert!(frame_len < image.len(), "frame should be compressed");

        let mut frame = vec![0u8; frame_len];
        server.read_exact(&mut frame).await.unwrap();
        assert_eq!(frame[0], FLAG_LZ4);
        assert_eq!(decode_body(&frame, &config).unwrap(), image);
    }

    #[tokio::test]
    async fn test_partial_reads_resume() {
        let (mut client, mut server) = duplex(8);
        let config = default_config();
        let payload = b"this payload is larger than the duplex buffer".to_vec();

        let write_config = config.clone();
        let expected = payload.clone();
        let write_task = tokio::spawn(async move {
            write_frame(&mut client, &payload, &write_config)
                .await
                .unwrap();
        });

        let received = read_frame(&mut server, &config).await.unwrap();
        write_task.await.unwrap();
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_on_read() {
        let (mut client, mut server) = duplex(8192);
        let config = CodecConfig {
            max_frame_bytes: 16,
            ..CodecConfig::default()
        };

        client.write_all(&1024u32.to_le_bytes()).await.unwrap();
        client.flush().await.unwrap();

        let result = read_frame(&mut server, &config).await;
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_on_write() {
        let (mut client, _server) = duplex(8192);
        let config = CodecConfig {
            max_frame_bytes: 16,
            compression_threshold: usize::MAX,
        };

        let result = write_frame(&mut client, &[7u8; 64], &config).await;
        assert!(matches!(result, Err(FrameError::FrameTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_expanding_body_rejected_on_read() {
        let (mut client, mut server) = duplex(1 << 16);
        let config = CodecConfig {
            max_frame_bytes: 1024,
            ..CodecConfig::default()
        };
        // Tiny on the wire, far larger than the limit once inflated.
        let inflated = vec![0u8; 64 * 1024];
        let mut body = vec![FLAG_LZ4];
        body.extend_from_slice(&compress_prepend_size(&inflated));
        assert!(body.len() < 1024);

        write_encoded(&mut client, &body, &config).await.unwrap();

        let result = read_frame(&mut server, &config).await;
        assert!(matches!(
            result,
            Err(FrameError::FrameTooLarge { size: 65_536, max: 1024 })
        ));
    }

    #[test]
    fn test_truncated_size_prefix_rejected() {
        assert!(matches!(
            decode_body(&[FLAG_LZ4, 1, 2], &default_config()),
            Err(FrameError::Decompress(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_stream_reports_connection_closed() {
        let (client, mut server) = duplex(8192);
        drop(client);

        let result = read_frame(&mut server, &default_config()).await;
        assert!(matches!(result, Err(FrameError::ConnectionClosed)));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(matches!(
            decode_body(&[0x7F, 1, 2], &default_config()),
            Err(FrameError::UnknownFlag(0x7F))
        ));
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert!(matches!(
            decode_body(&[], &default_config()),
            Err(FrameError::EmptyFrame)
        ));
    }
}
