//! Decoder for the AWS signed chunk framing used by streaming uploads.
//!
//! Clients that sign with `STREAMING-AWS4-HMAC-SHA256-PAYLOAD` wrap the object
//! body in frames of the form:
//!
//! ```text
//! <hex-size>;chunk-signature=<sig>\r\n
//! <data>\r\n
//! ...
//! 0;chunk-signature=<sig>\r\n
//! ```
//!
//! The decoder strips the framing and writes the chunk bodies to a sink.
//! Chunk signatures are logged and otherwise ignored.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// `x-amz-content-sha256` value announcing a chunk-framed body.
pub const STREAMING_PAYLOAD: &str = "STREAMING-AWS4-HMAC-SHA256-PAYLOAD";

/// Longest size line we accept before declaring the stream malformed.
const MAX_SIZE_LINE_LEN: usize = 4096;

/// How an upload body is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEncoding {
    /// Bytes are the object payload as-is.
    Raw,
    /// Bytes are wrapped in AWS chunk framing.
    AwsChunked,
}

impl UploadEncoding {
    /// Select the encoding from the `x-amz-content-sha256` header value.
    ///
    /// Only an exact match on [`STREAMING_PAYLOAD`] selects chunk decoding.
    pub fn from_content_sha256(value: Option<&str>) -> Self {
        match value {
            Some(STREAMING_PAYLOAD) => Self::AwsChunked,
            _ => Self::Raw,
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed chunked stream: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed(reason.into())
}

/// Decode a chunk-framed stream from `reader` into `writer`.
///
/// Returns the number of payload bytes written. Decoding stops at the first
/// zero-size chunk; anything after it (trailers) is left unread.
pub async fn decode_chunked<R, W>(reader: &mut R, writer: &mut W) -> Result<u64, DecodeError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total: u64 = 0;
    let mut line = Vec::with_capacity(128);

    loop {
        line.clear();
        let read = (&mut *reader)
            .take(MAX_SIZE_LINE_LEN as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if read == 0 {
            return Err(malformed("stream ended before the terminating chunk"));
        }
        if line.last() != Some(&b'\n') {
            return Err(malformed("chunk size line is not terminated"));
        }

        let (size, signature) = parse_size_line(&line)?;
        debug!(size, signature = signature.unwrap_or(""), "chunk header");

        if size == 0 {
            break;
        }

        let copied = tokio::io::copy(&mut (&mut *reader).take(size), writer).await?;
        if copied != size {
            return Err(malformed(format!(
                "chunk declared {size} bytes but only {copied} were sent"
            )));
        }
        total += size;

        let mut crlf = [0u8; 2];
        match reader.read_exact(&mut crlf).await {
            Ok(_) if &crlf == b"\r\n" => {}
            Ok(_) => return Err(malformed("chunk data not followed by CRLF")),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(malformed("stream ended before chunk CRLF"));
            }
            Err(err) => return Err(err.into()),
        }
    }

    writer.flush().await?;
    debug!(total, "chunked stream decoded");
    Ok(total)
}

/// Split a size line into the chunk size and the raw extension text.
fn parse_size_line(line: &[u8]) -> Result<(u64, Option<&str>), DecodeError> {
    let text = std::str::from_utf8(line).map_err(|_| malformed("chunk size line is not UTF-8"))?;
    let text = text.trim();
    let (hex, ext) = match text.split_once(';') {
        Some((hex, ext)) => (hex, Some(ext)),
        None => (text, None),
    };

    let hex = hex.trim();
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed(format!("invalid chunk size `{hex}`")));
    }
    let size =
        u64::from_str_radix(hex, 16).map_err(|_| malformed(format!("chunk size `{hex}` overflows")))?;

    Ok((size, ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn decode(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let mut reader = input;
        let mut out = Vec::new();
        decode_chunked(&mut reader, &mut out).await?;
        Ok(out)
    }

    #[test]
    fn encoding_requires_exact_sentinel() {
        assert_eq!(
            UploadEncoding::from_content_sha256(Some(STREAMING_PAYLOAD)),
            UploadEncoding::AwsChunked
        );
        assert_eq!(
            UploadEncoding::from_content_sha256(Some("UNSIGNED-PAYLOAD")),
            UploadEncoding::Raw
        );
        assert_eq!(
            UploadEncoding::from_content_sha256(Some("STREAMING-UNSIGNED-PAYLOAD-TRAILER")),
            UploadEncoding::Raw
        );
        assert_eq!(UploadEncoding::from_content_sha256(None), UploadEncoding::Raw);
    }

    #[tokio::test]
    async fn decodes_signed_chunks() {
        let body = b"5;chunk-signature=abc123\r\nhello\r\n6;chunk-signature=def\r\n world\r\n0;chunk-signature=fff\r\n\r\n";
        assert_eq!(decode(body).await.unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn decodes_unsigned_chunks_and_uppercase_hex() {
        let payload = vec![b'x'; 0x1A];
        let mut body = b"1A\r\n".to_vec();
        body.extend_from_slice(&payload);
        body.extend_from_slice(b"\r\n0\r\n\r\n");
        assert_eq!(decode(&body).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn zero_chunk_only_is_empty_object() {
        let out = decode(b"0;chunk-signature=abc\r\n\r\n").await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn many_small_chunks_concatenate() {
        let parts: [&[u8]; 4] = [b"a", b"bc", b"def", b"ghij"];
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("{:x};chunk-signature=00\r\n", part.len()).as_bytes());
            body.extend_from_slice(part);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(b"0;chunk-signature=00\r\n\r\n");
        assert_eq!(decode(&body).await.unwrap(), b"abcdefghij");
    }

    #[tokio::test]
    async fn rejects_non_hex_size() {
        let err = decode(b"zz;chunk-signature=abc\r\nhello\r\n0\r\n\r\n")
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[tokio::test]
    async fn rejects_empty_size() {
        let err = decode(b";chunk-signature=abc\r\nhello\r\n").await.unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[tokio::test]
    async fn rejects_truncated_chunk_body() {
        let err = decode(b"a;chunk-signature=abc\r\nhello").await.unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[tokio::test]
    async fn rejects_missing_crlf_after_data() {
        let err = decode(b"5\r\nhelloXX0\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));

        let err = decode(b"5\r\nhello").await.unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[tokio::test]
    async fn rejects_stream_without_terminator() {
        let err = decode(b"5\r\nhello\r\n").await.unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));

        let err = decode(b"5").await.unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
