//! Async UDP I/O for DSS.
//!
//! The transport is connectionless and unreliable, so every
//! request/reply exchange here applies a caller-side timeout and a
//! bounded number of resend attempts. Both planes use the same policy:
//! control-plane retries are harmless (registration and state queries
//! are idempotent, phase-1 acquires are de-duplicated by the manager)
//! and a re-sent `WRITE_BLOCK` simply overwrites the same key.

use std::net::SocketAddr;
use std::time::Duration;

use dss_proto::constants::MAX_DATAGRAM;
use dss_proto::defaults::{DEFAULT_REQUEST_RETRIES, DEFAULT_REQUEST_TIMEOUT_MS};
use dss_proto::{DssError, DssResult};
use tokio::net::UdpSocket;
use tracing::{debug, error, trace};

/// Timeout and retry budget for one request/reply exchange.
#[derive(Debug, Clone, Copy)]
pub struct ExchangePolicy {
    /// Per-attempt wait for the reply
    pub timeout: Duration,
    /// Total send attempts before giving up
    pub attempts: u32,
}

impl Default for ExchangePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            attempts: DEFAULT_REQUEST_RETRIES,
        }
    }
}

/// Bind a UDP socket on the given address and port.
pub async fn bind_udp(bind_addr: &str, port: u16) -> DssResult<UdpSocket> {
    let addr = format!("{}:{}", bind_addr, port);
    let sock = UdpSocket::bind(&addr).await.map_err(|e| {
        error!("failed to bind UDP socket on {}: {}", addr, e);
        DssError::Network
    })?;
    debug!("bound UDP socket on {}", addr);
    Ok(sock)
}

/// Bind an ephemeral UDP socket for a one-shot exchange.
pub async fn ephemeral_udp() -> DssResult<UdpSocket> {
    UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|_| DssError::Network)
}

/// Send `frame` to `target` and await one reply datagram, resending on
/// timeout up to the policy's attempt budget.
pub async fn exchange(
    sock: &UdpSocket,
    target: SocketAddr,
    frame: &[u8],
    policy: ExchangePolicy,
) -> DssResult<Vec<u8>> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    for attempt in 1..=policy.attempts {
        sock.send_to(frame, target)
            .await
            .map_err(|_| DssError::Network)?;
        match tokio::time::timeout(policy.timeout, sock.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => {
                trace!("reply from {} ({} bytes)", from, len);
                return Ok(buf[..len].to_vec());
            }
            Ok(Err(e)) => {
                error!("recv error talking to {}: {}", target, e);
                return Err(DssError::Network);
            }
            Err(_) => {
                debug!(
                    "no reply from {} (attempt {}/{})",
                    target, attempt, policy.attempts
                );
            }
        }
    }
    Err(DssError::Timeout)
}

/// One-shot raw exchange over a fresh ephemeral socket.
pub async fn request_frame(
    target: SocketAddr,
    frame: &[u8],
    policy: ExchangePolicy,
) -> DssResult<Vec<u8>> {
    let sock = ephemeral_udp().await?;
    exchange(&sock, target, frame, policy).await
}

/// One-shot text exchange over a fresh ephemeral socket.
pub async fn request_text(
    target: SocketAddr,
    text: &str,
    policy: ExchangePolicy,
) -> DssResult<String> {
    let reply = request_frame(target, text.as_bytes(), policy).await?;
    String::from_utf8(reply).map_err(|_| DssError::BadFrame)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_policy() -> ExchangePolicy {
        ExchangePolicy {
            timeout: Duration::from_millis(100),
            attempts: 2,
        }
    }

    #[tokio::test]
    async fn test_exchange_round_trip() {
        let server = bind_udp("127.0.0.1", 0).await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            let (len, from) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], b"ping");
            server.send_to(b"pong", from).await.unwrap();
        });

        let reply = request_frame(server_addr, b"ping", quick_policy())
            .await
            .unwrap();
        assert_eq!(reply, b"pong");
    }

    #[tokio::test]
    async fn test_exchange_times_out_without_reply() {
        // Bind a socket that never answers
        let silent = bind_udp("127.0.0.1", 0).await.unwrap();
        let addr = silent.local_addr().unwrap();

        let err = request_frame(addr, b"anyone there", quick_policy())
            .await
            .unwrap_err();
        assert_eq!(err, DssError::Timeout);
    }

    #[tokio::test]
    async fn test_exchange_retries_until_reply() {
        let server = bind_udp("127.0.0.1", 0).await.unwrap();
        let server_addr = server.local_addr().unwrap();

        // Drop the first datagram, answer the second
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            let _ = server.recv_from(&mut buf).await.unwrap();
            let (len, from) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(&buf[..len], from).await.unwrap();
        });

        let reply = request_frame(server_addr, b"again", quick_policy())
            .await
            .unwrap();
        assert_eq!(reply, b"again");
    }
}
