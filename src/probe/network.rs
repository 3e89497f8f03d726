use super::{ProbeFailure, ProbeResult, Prober};
use crate::config::{deadline_after, Protocol, ServiceTarget};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream, UdpSocket};
use tokio::time::Instant;

/// Transport-level prober: a TCP handshake or a UDP send.
///
/// UDP has no handshake, so a UDP probe succeeds whenever the datagram is
/// handed to the kernel without error. That says nothing about whether a
/// server is listening.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkProber;

#[async_trait]
impl Prober for NetworkProber {
    async fn probe(&self, target: &ServiceTarget, attempt_timeout: Duration) -> ProbeResult {
        let deadline = deadline_after(Instant::now(), attempt_timeout);
        let addrs = resolve(target, deadline).await?;
        match target.protocol() {
            Protocol::Tcp => probe_tcp(&addrs, deadline).await,
            Protocol::Udp => probe_udp(&addrs).await,
        }
    }
}

async fn resolve(target: &ServiceTarget, deadline: Instant) -> Result<Vec<SocketAddr>, ProbeFailure> {
    let lookup = lookup_host((target.host(), target.port()));
    match tokio::time::timeout_at(deadline, lookup).await {
        Err(_) => Err(ProbeFailure::Timeout),
        Ok(Err(e)) => Err(ProbeFailure::UnresolvedHost(format!(
            "{}: {}",
            target.host(),
            e
        ))),
        Ok(Ok(addrs)) => {
            let addrs: Vec<SocketAddr> = addrs.collect();
            if addrs.is_empty() {
                Err(ProbeFailure::UnresolvedHost(format!(
                    "{}: no addresses",
                    target.host()
                )))
            } else {
                Ok(addrs)
            }
        }
    }
}

/// Try each resolved address in turn; the first completed handshake wins.
async fn probe_tcp(addrs: &[SocketAddr], deadline: Instant) -> ProbeResult {
    let mut last_failure = ProbeFailure::Timeout;
    for addr in addrs {
        match tokio::time::timeout_at(deadline, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => return Ok(()),
            Ok(Err(e)) => {
                tracing::trace!("TCP connect to {} failed: {}", addr, e);
                last_failure = classify_io_error(&e);
            }
            Err(_) => return Err(ProbeFailure::Timeout),
        }
    }
    Err(last_failure)
}

async fn probe_udp(addrs: &[SocketAddr]) -> ProbeResult {
    let mut last_failure = ProbeFailure::Io("no usable address".to_string());
    for addr in addrs {
        let bind_addr: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let result = async {
            let socket = UdpSocket::bind(bind_addr).await?;
            socket.connect(addr).await?;
            socket.send(&[0u8]).await
        }
        .await;
        match result {
            Ok(_) => return Ok(()),
            Err(e) => {
                tracing::trace!("UDP send to {} failed: {}", addr, e);
                last_failure = classify_io_error(&e);
            }
        }
    }
    Err(last_failure)
}

fn classify_io_error(err: &std::io::Error) -> ProbeFailure {
    match err.kind() {
        ErrorKind::ConnectionRefused => ProbeFailure::Refused,
        ErrorKind::TimedOut => ProbeFailure::Timeout,
        _ => ProbeFailure::Io(err.to_string()),
    }
}
