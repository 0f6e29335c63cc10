//! Sending a single query to a single nameserver.

use async_trait::async_trait;
use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

use dns_types::protocol::{deserialise, serialise, types::*};

/// Port nameservers listen on.
pub const DNS_PORT: u16 = 53;

/// Largest reply accepted over UDP (no EDNS).
pub const UDP_MESSAGE_SIZE: usize = 512;

/// One query, one reply.
///
/// Any failure is for this attempt against this server only: the
/// resolver moves on to the next candidate.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        address: Ipv4Addr,
        request: &Message,
        timeout: Duration,
    ) -> Result<Message, TransportError>;
}

/// Plain DNS over UDP.  There is no TCP fallback: a truncated reply is
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpTransport {
    port: u16,
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::with_port(DNS_PORT)
    }

    pub fn with_port(port: u16) -> Self {
        Self { port }
    }

    /// Timeout-less version of `send`.
    async fn exchange(&self, address: Ipv4Addr, serialised: &[u8]) -> Result<Message, TransportError> {
        let mut buf = vec![0u8; UDP_MESSAGE_SIZE];

        let sock = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        sock.connect((address, self.port)).await?;
        sock.send(serialised).await?;
        let size = sock.recv(&mut buf).await?;

        Message::from_octets(&buf[..size]).map_err(TransportError::Deserialise)
    }
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(
        &self,
        address: Ipv4Addr,
        request: &Message,
        timeout_duration: Duration,
    ) -> Result<Message, TransportError> {
        let serialised = request.to_octets().map_err(TransportError::Serialise)?;

        match timeout(timeout_duration, self.exchange(address, &serialised)).await {
            Ok(response) => {
                let response = response?;
                check_response(request, &response)?;
                Ok(response)
            }
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

/// Very basic validation that a nameserver response belongs to a
/// request:
///
/// - Check the ID, opcode, and questions match.
///
/// - Check it is a response.
///
/// - Check it is not truncated.
///
/// The rcode is not checked: a negative answer is still an answer.
pub fn check_response(request: &Message, response: &Message) -> Result<(), TransportError> {
    if request.header.id != response.header.id
        || !response.header.is_response
        || request.header.opcode != response.header.opcode
        || request.questions != response.questions
    {
        return Err(TransportError::Mismatch);
    }
    if response.header.is_truncated {
        return Err(TransportError::Truncated);
    }

    Ok(())
}

/// Why a single query attempt failed.
#[derive(Debug)]
pub enum TransportError {
    /// No reply within the timeout.
    Timeout,

    /// The socket could not be set up, or sending or receiving failed.
    Io(io::Error),

    /// The request could not be serialised.
    Serialise(serialise::Error),

    /// The reply could not be parsed.
    Deserialise(deserialise::Error),

    /// The reply had the TC flag set.
    Truncated,

    /// The reply is for some other request.
    Mismatch,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransportError::Timeout => write!(f, "timed out"),
            TransportError::Io(error) => write!(f, "I/O error: {error}"),
            TransportError::Serialise(error) => write!(f, "could not serialise request: {error}"),
            TransportError::Deserialise(error) => write!(f, "could not parse response: {error}"),
            TransportError::Truncated => write!(f, "response truncated"),
            TransportError::Mismatch => write!(f, "response does not match request"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Io(error) => Some(error),
            TransportError::Serialise(error) => Some(error),
            TransportError::Deserialise(error) => Some(error),
            _ => None,
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(error: io::Error) -> Self {
        TransportError::Io(error)
    }
}
