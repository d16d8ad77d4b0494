//! JSON line frames and structured errors for directory calls.
//!
//! Every call is one request frame followed by one response frame on a
//! fresh connection; errors travel inside the response rather than as
//! transport failures.

use std::{io, net::SocketAddr};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

const LINE_ENDINGS: &[char] = &['\n', '\r'];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryRequest {
    RegisterNameserver { zone: String, handle: SocketAddr },
    RegisterUser { name: String, address: String },
    Lookup { name: String },
    GetNameserver { label: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectoryResponse {
    Registered,
    Address { address: String },
    Nameserver { handle: SocketAddr },
    Failed { error: DirectoryError },
}

/// Structural violations and remote failures of directory operations.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DirectoryError {
    #[error("zone {0:?} is already registered")]
    AlreadyRegistered(String),
    #[error("no zone is delegated for {0:?}")]
    InvalidDomain(String),
    #[error("no user {0:?} is registered")]
    UnknownUsername(String),
    #[error("directory call failed: {0}")]
    CallFailed(String),
}

pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let trimmed = line.trim_end_matches(LINE_ENDINGS);
        if trimmed.is_empty() {
            continue;
        }

        let parsed = serde_json::from_str(trimmed).map_err(to_io_error)?;
        return Ok(Some(parsed));
    }
}

pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut encoded = serde_json::to_vec(frame).map_err(to_io_error)?;
    encoded.push(b'\n');
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_round_trips_as_json_line() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);
        let request = DirectoryRequest::RegisterNameserver {
            zone: "vienna.at".into(),
            handle: "127.0.0.1:7001".parse().expect("addr"),
        };

        write_frame(&mut writer, &request).await.expect("write frame");
        let parsed = read_frame::<_, DirectoryRequest>(&mut reader)
            .await
            .expect("read frame")
            .expect("expected frame");

        assert_eq!(parsed, request);
    }

    #[tokio::test]
    async fn error_survives_the_response_frame() {
        let (mut writer, reader) = tokio::io::duplex(1024);
        let mut reader = tokio::io::BufReader::new(reader);
        let response = DirectoryResponse::Failed {
            error: DirectoryError::AlreadyRegistered("at".into()),
        };

        write_frame(&mut writer, &response).await.expect("write frame");
        let parsed = read_frame::<_, DirectoryResponse>(&mut reader)
            .await
            .expect("read frame")
            .expect("expected frame");

        assert_eq!(parsed, response);
    }
}
