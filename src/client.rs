//! Client side of the relay protocol.
//!
//! One connection carries one request and one response:
//!
//! ```no_run
//! use relaymux::client::{query, Request};
//!
//! # async fn demo() -> Result<(), relaymux::client::ClientError> {
//! let reply = query("localhost", 65432, &Request::Status).await?;
//! println!("{}", reply);
//! # Ok(())
//! # }
//! ```

use crate::connection::READ_CHUNK_SIZE;
use crate::protocol::{RelayIndex, RelayState, NEWLINE, STATUS_KEYWORD};
use std::fmt;
use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Errors from a client round trip.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("server closed the connection without responding")]
    NoResponse,

    #[error("response is not valid UTF-8")]
    InvalidUtf8,
}

/// A request a client can send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Status,
    Set { index: RelayIndex, state: RelayState },
}

impl Request {
    /// Encodes the request as one newline-terminated line.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut line = self.to_string().into_bytes();
        line.extend_from_slice(NEWLINE);
        line
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Status => f.write_str(STATUS_KEYWORD),
            Request::Set { index, state } => write!(f, "{} {}", index, state),
        }
    }
}

/// Sends one request and reads one response over an established stream.
///
/// The response is read up to its newline, end of stream, or
/// [`READ_CHUNK_SIZE`] bytes, whichever comes first, and returned without
/// surrounding whitespace.
pub async fn send_request<S>(stream: &mut S, request: &Request) -> Result<String, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&request.to_wire()).await?;
    stream.flush().await?;

    let mut response = Vec::with_capacity(64);
    let mut buf = [0u8; READ_CHUNK_SIZE];
    while response.len() < READ_CHUNK_SIZE && !response.contains(&b'\n') {
        let want = READ_CHUNK_SIZE - response.len();
        let n = stream.read(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        response.extend_from_slice(&buf[..n]);
    }

    if response.is_empty() {
        return Err(ClientError::NoResponse);
    }

    let text = String::from_utf8(response).map_err(|_| ClientError::InvalidUtf8)?;
    Ok(text.trim().to_string())
}

/// Connects to `host:port` and performs one round trip.
pub async fn query(host: &str, port: u16, request: &Request) -> Result<String, ClientError> {
    let address = format!("{}:{}", host, port);
    let mut stream = TcpStream::connect((host, port))
        .await
        .map_err(|source| ClientError::Connect {
            address: address.clone(),
            source,
        })?;
    debug!(address = %address, request = %request, "Connected");

    let response = send_request(&mut stream, request).await?;
    // Closing is best effort; the response is already in hand
    let _ = stream.shutdown().await;
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn set(n: u8, state: RelayState) -> Request {
        Request::Set {
            index: RelayIndex::try_from(n).unwrap(),
            state,
        }
    }

    #[test]
    fn test_wire_encoding() {
        assert_eq!(Request::Status.to_wire(), b"status\n");
        assert_eq!(set(1, RelayState::On).to_wire(), b"1 on\n");
        assert_eq!(set(4, RelayState::Off).to_wire(), b"4 off\n");
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let mut stream = Builder::new()
            .write(b"status\n")
            .read(b"Current Relay State: 00000101\n")
            .build();

        let response = send_request(&mut stream, &Request::Status).await.unwrap();
        assert_eq!(response, "Current Relay State: 00000101");
    }

    #[tokio::test]
    async fn test_response_split_across_reads() {
        let mut stream = Builder::new()
            .write(b"2 on\n")
            .read(b"Relay 2 ")
            .read(b"set to ON.\n")
            .build();

        let response = send_request(&mut stream, &set(2, RelayState::On))
            .await
            .unwrap();
        assert_eq!(response, "Relay 2 set to ON.");
    }

    #[tokio::test]
    async fn test_error_response_is_returned() {
        let mut stream = Builder::new()
            .write(b"3 off\n")
            .read(b"Error: adapter not responding\n")
            .build();

        let response = send_request(&mut stream, &set(3, RelayState::Off))
            .await
            .unwrap();
        assert_eq!(response, "Error: adapter not responding");
    }

    #[tokio::test]
    async fn test_unterminated_response_until_eof() {
        let mut stream = Builder::new()
            .write(b"status\n")
            .read(b"Current Relay State: 00000000")
            .build();

        let response = send_request(&mut stream, &Request::Status).await.unwrap();
        assert_eq!(response, "Current Relay State: 00000000");
    }

    #[tokio::test]
    async fn test_no_response() {
        let mut stream = Builder::new().write(b"status\n").build();

        let err = send_request(&mut stream, &Request::Status)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoResponse));
    }

    #[tokio::test]
    async fn test_connect_failure() {
        // Bind then drop to find a port with no listener
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = query("127.0.0.1", port, &Request::Status)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Connect { .. }));
    }
}
