// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP accept loop.
//!
//! Each connection carries one request and one response. Read-only requests
//! are raced against client disconnect and shutdown; a mutating request always
//! runs to completion so its result lands in the status report even if the
//! client gave up waiting, and shutdown waits for it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use wd_core::{Clock, SystemClock};
use wd_engine::ProcessManager;
use wd_wire::{ProtocolError, Request};

use crate::service::DeployService;

pub struct Listener<P: ProcessManager, C: Clock = SystemClock> {
    tcp: TcpListener,
    service: Arc<DeployService<P, C>>,
    io_timeout: Duration,
}

impl<P: ProcessManager, C: Clock> Listener<P, C> {
    pub fn new(tcp: TcpListener, service: Arc<DeployService<P, C>>, io_timeout: Duration) -> Self {
        Self { tcp, service, io_timeout }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    /// Accept connections until `shutdown` is cancelled, then wait for
    /// in-flight mutating requests to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        let tasks = TaskTracker::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("listener stopping");
                    break;
                }
                result = self.tcp.accept() => match result {
                    Ok((stream, addr)) => {
                        debug!(%addr, "connection accepted");
                        let service = Arc::clone(&self.service);
                        let io_timeout = self.io_timeout;
                        let shutdown = shutdown.clone();
                        tasks.spawn(async move {
                            let (reader, writer) = stream.into_split();
                            let handled =
                                handle_connection(reader, writer, &service, io_timeout, &shutdown).await;
                            if let Err(e) = handled {
                                log_connection_error(e);
                            }
                        });
                    }
                    Err(e) => error!("TCP accept error: {}", e),
                }
            }
        }

        tasks.close();
        if !tasks.is_empty() {
            info!(connections = tasks.len(), "waiting for in-flight requests");
        }
        tasks.wait().await;
    }
}

fn log_connection_error(e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!("client disconnected"),
        ProtocolError::Timeout => warn!("connection timeout"),
        _ => error!("connection error: {}", e),
    }
}

fn request_kind(request: &Request) -> &'static str {
    match request {
        Request::Hello { .. } => "hello",
        Request::GetHashes => "get-hashes",
        Request::Deploy { .. } => "deploy",
        Request::Chunk { .. } => "chunk",
        Request::CancelSession { .. } => "cancel-session",
        Request::Status => "status",
    }
}

async fn handle_connection<R, W, P, C>(
    mut reader: R,
    mut writer: W,
    service: &DeployService<P, C>,
    io_timeout: Duration,
    shutdown: &CancellationToken,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    P: ProcessManager,
    C: Clock,
{
    let request = tokio::select! {
        request = wd_wire::read_request(&mut reader, io_timeout) => request?,
        _ = shutdown.cancelled() => {
            debug!("shutting down before a request arrived");
            return Ok(());
        }
    };
    let kind = request_kind(&request);

    let response = if request.is_mutating() {
        info!(request = kind, "received request");
        service.handle(request).await
    } else {
        debug!(request = kind, "received request");
        tokio::select! {
            response = service.handle(request) => response,
            _ = detect_client_disconnect(&mut reader) => {
                debug!(request = kind, "client disconnected, dropping handler");
                return Ok(());
            }
            _ = shutdown.cancelled() => {
                debug!(request = kind, "shutting down, dropping handler");
                return Ok(());
            }
        }
    };

    debug!(request = kind, "sending response");
    wd_wire::write_response(&mut writer, &response, io_timeout).await
}

/// Resolves once the client closes its side after sending the request.
async fn detect_client_disconnect<R: AsyncRead + Unpin>(reader: &mut R) {
    let mut buf = [0u8; 1];
    let _ = reader.read(&mut buf).await;
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
