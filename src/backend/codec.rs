//! Frames exchanged with backend data sources
//!
//! A connection opens with [`FORWARD_MAGIC`], then carries
//! `[length: u32 BE][MessagePack payload]` frames in both directions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::collector::CorrelationId;
use crate::error::DriverCause;
use crate::merge::MemoryQueryResult;
use crate::response::{QueryMetadata, QueryOutcome, RawOutcome, UpdateOutcome};

pub const FORWARD_MAGIC: &[u8] = b"shardline-fwd-v1\0";
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed: {0}")]
    Encode(String),

    #[error("Deserialization failed: {0}")]
    Decode(String),

    #[error("Frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    #[error("Peer did not send the expected protocol header")]
    BadMagic,
}

/// One physical statement sent to a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardRequest {
    pub correlation_id: CorrelationId,
    pub unit_index: usize,
    pub sql: String,
    #[serde(default)]
    pub return_generated_keys: bool,
    #[serde(default)]
    pub capture_metadata: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_size: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendReply {
    Rows {
        #[serde(default)]
        metadata: Option<QueryMetadata>,
        rows: Vec<Vec<Value>>,
    },
    Ok {
        affected_rows: u64,
        #[serde(default)]
        last_insert_id: u64,
    },
    Error {
        cause: DriverCause,
    },
}

impl BackendReply {
    pub fn rows(metadata: Option<QueryMetadata>, rows: Vec<Vec<Value>>) -> Self {
        BackendReply::Rows { metadata, rows }
    }

    pub fn ok(affected_rows: u64, last_insert_id: u64) -> Self {
        BackendReply::Ok {
            affected_rows,
            last_insert_id,
        }
    }

    pub fn error(cause: DriverCause) -> Self {
        BackendReply::Error { cause }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, BackendReply::Error { .. })
    }

    pub fn into_outcome(self) -> RawOutcome {
        match self {
            BackendReply::Rows { metadata, rows } => {
                let column_count = metadata
                    .as_ref()
                    .map(|m| m.column_count())
                    .or_else(|| rows.first().map(|r| r.len()))
                    .unwrap_or(0);
                RawOutcome::Query(QueryOutcome {
                    metadata,
                    rows: Box::new(MemoryQueryResult::new(column_count, rows)),
                })
            }
            BackendReply::Ok {
                affected_rows,
                last_insert_id,
            } => RawOutcome::Update(UpdateOutcome::new(affected_rows, last_insert_id)),
            BackendReply::Error { cause } => RawOutcome::Error(cause),
        }
    }
}

/// Reply to one [`ForwardRequest`], echoing its correlation id and index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub correlation_id: CorrelationId,
    pub unit_index: usize,
    pub reply: BackendReply,
}

pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, CodecError> {
    let payload = rmp_serde::to_vec_named(msg).map_err(|e| CodecError::Encode(e.to_string()))?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(payload.len()));
    }

    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

pub fn decode_frame<T: for<'de> Deserialize<'de>>(payload: &[u8]) -> Result<T, CodecError> {
    rmp_serde::from_slice(payload).map_err(|e| CodecError::Decode(e.to_string()))
}

pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = encode_frame(msg)?;
    writer.write_all(&data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame; `Ok(None)` when the peer closed between frames
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, CodecError>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_frame(&payload).map(Some)
}

pub async fn write_magic<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), CodecError> {
    writer.write_all(FORWARD_MAGIC).await?;
    Ok(())
}

pub async fn read_magic<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(), CodecError> {
    let mut magic = vec![0u8; FORWARD_MAGIC.len()];
    reader.read_exact(&mut magic).await?;
    if magic != FORWARD_MAGIC {
        return Err(CodecError::BadMagic);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{ColumnMetadata, ColumnType};
    use serde_json::json;

    #[test]
    fn test_reply_frame_roundtrip() {
        let frame = ReplyFrame {
            correlation_id: CorrelationId(11),
            unit_index: 2,
            reply: BackendReply::rows(
                Some(QueryMetadata::new(vec![ColumnMetadata::new("id", ColumnType::Integer)])),
                vec![vec![json!(1)], vec![json!(2)]],
            ),
        };
        let encoded = encode_frame(&frame).unwrap();
        let len = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize;
        assert_eq!(len, encoded.len() - 4);

        let decoded: ReplyFrame = decode_frame(&encoded[4..]).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_error_reply_becomes_error_outcome() {
        let reply = BackendReply::error(DriverCause::new("Unknown column 'x'").with_code(1054, "42S22"));
        assert!(reply.is_error());
        match reply.into_outcome() {
            RawOutcome::Error(cause) => assert_eq!(cause.code, Some(1054)),
            other => panic!("expected error outcome, got {:?}", other),
        }
    }

    #[test]
    fn test_rows_without_metadata_use_row_width() {
        match BackendReply::rows(None, vec![vec![json!(1), json!("a")]]).into_outcome() {
            RawOutcome::Query(query) => {
                assert!(query.metadata.is_none());
                assert_eq!(query.rows.column_count(), 2);
            }
            other => panic!("expected query outcome, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_framing() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_magic(&mut client).await.unwrap();
        let request = ForwardRequest {
            correlation_id: CorrelationId(3),
            unit_index: 0,
            sql: "SELECT 1".to_string(),
            return_generated_keys: false,
            capture_metadata: true,
            fetch_size: None,
        };
        write_frame(&mut client, &request).await.unwrap();
        drop(client);

        read_magic(&mut server).await.unwrap();
        let received: Option<ForwardRequest> = read_frame(&mut server).await.unwrap();
        assert_eq!(received, Some(request));
        let eof: Option<ForwardRequest> = read_frame(&mut server).await.unwrap();
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn test_bad_magic() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"not-the-right-magic!").await.unwrap();
        assert!(matches!(read_magic(&mut server).await, Err(CodecError::BadMagic)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let big = "x".repeat(MAX_FRAME_SIZE + 1);
        assert!(matches!(encode_frame(&big), Err(CodecError::FrameTooLarge(_))));
    }
}
