//! Registry server: accept loop and per-connection sessions.
//!
//! Every accepted control connection gets its own task and session id. The
//! task reads one command line at a time, runs it through the executor and
//! writes back exactly one response frame. However the connection ends, a
//! `disconnect` is executed on its behalf so no identity outlives its
//! session.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use peershare_core::command::DISCONNECT;
use peershare_core::config::ServerConfig;
use peershare_core::wire::{read_command_line, write_response, WireError};
use peershare_core::{Command, PeerError, Response};
use peershare_services::{CommandExecutor, Registry, SessionId, SessionIdAllocator};

pub struct RegistryServer {
    listener: TcpListener,
    executor: CommandExecutor,
    session_ids: SessionIdAllocator,
    max_line_bytes: usize,
}

impl RegistryServer {
    pub async fn bind(config: &ServerConfig, registry: Registry) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind registry on {addr}"))?;
        Ok(Self {
            listener,
            executor: CommandExecutor::new(registry),
            session_ids: SessionIdAllocator::default(),
            max_line_bytes: config.max_line_bytes,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> &Registry {
        self.executor.registry()
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("registry shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let session = self.session_ids.next();
                    let executor = self.executor.clone();
                    let max_line_bytes = self.max_line_bytes;
                    tokio::spawn(handle_connection(stream, peer, session, executor, max_line_bytes));
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    session: SessionId,
    executor: CommandExecutor,
    max_line_bytes: usize,
) {
    tracing::info!(session, peer = %peer, "client connected");

    if let Err(e) = serve_session(stream, session, &executor, max_line_bytes).await {
        tracing::warn!(session, peer = %peer, error = %e, "client connection failed");
    }

    let cleanup = executor.execute(session, &Command::bare(DISCONNECT));
    tracing::info!(session, peer = %peer, cleanup = %cleanup, "client disconnected");
}

async fn serve_session(
    stream: TcpStream,
    session: SessionId,
    executor: &CommandExecutor,
    max_line_bytes: usize,
) -> Result<(), PeerError> {
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while let Some(line) = read_command_line(&mut reader, max_line_bytes).await? {
        let command = Command::parse(&line);
        let response = executor.execute(session, &command);
        tracing::debug!(session, command = %command.name, status = %response.status, "handled");
        match write_response(&mut writer, &response).await {
            // Nothing was written yet, so the session can carry on.
            Err(WireError::FrameTooLarge(len)) => {
                tracing::warn!(session, command = %command.name, bytes = len, "response too large");
                let refusal = Response::error(format!(
                    "response of {len} bytes exceeds the {} byte limit",
                    peershare_core::wire::MAX_RESPONSE_BYTES
                ));
                write_response(&mut writer, &refusal).await?;
            }
            result => result?,
        }
    }
    Ok(())
}
