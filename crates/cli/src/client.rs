// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP transport to a receiving host.
//!
//! One connection per request. The write side is never shut down early:
//! the host treats a half-closed connection as a client that went away.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use wd_engine::{TransferError, Transport};
use wd_wire::{read_response, write_request, Request, Response, DEFAULT_PORT, PROTOCOL_VERSION};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Add the default port to a host given without one.
pub fn normalize_addr(host: &str) -> String {
    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return SocketAddr::new(ip, DEFAULT_PORT).to_string();
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.parse::<u16>().is_ok() => host.to_string(),
        _ => format!("{host}:{DEFAULT_PORT}"),
    }
}

pub struct TcpTransport {
    addr: String,
    connect_timeout: Duration,
}

impl TcpTransport {
    pub fn new(host: &str) -> Self {
        Self { addr: normalize_addr(host), connect_timeout: CONNECT_TIMEOUT }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self) -> Result<TcpStream, TransferError> {
        let connect_error = |source| TransferError::Connect { addr: self.addr.clone(), source };
        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(connect_error(e)),
            // Nothing was sent, so this is not a request timeout
            Err(_) => Err(connect_error(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            ))),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn call(&self, request: Request, timeout: Duration) -> Result<Response, TransferError> {
        let mut stream = self.connect().await?;
        write_request(&mut stream, &request, timeout).await?;
        Ok(read_response(&mut stream, timeout).await?)
    }
}

/// Exchange versions with a host. Returns the host's version.
///
/// A mismatch is only logged; the request set is stable across minor versions.
pub async fn hello<T: Transport>(transport: &T, timeout: Duration) -> Result<String, TransferError> {
    let request = Request::Hello { version: PROTOCOL_VERSION.to_string() };
    match transport.call(request, timeout).await? {
        Response::Hello { version } => {
            if version != PROTOCOL_VERSION {
                tracing::warn!(host_version = %version, client_version = PROTOCOL_VERSION, "protocol version mismatch");
            }
            Ok(version)
        }
        Response::Error { message } => Err(TransferError::Remote(message)),
        other => Err(TransferError::Unexpected(format!("{other:?}"))),
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
