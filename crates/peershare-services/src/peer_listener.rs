//! Peer listener: serves files from the local filesystem to other peers.
//!
//! One task per inbound connection. A connection may carry any number of
//! `download <identity> <source> <destination>` requests; each is answered
//! either with a single `ERROR` frame, or with `SENDING_FILE`, the file
//! stream, and a closing `OK`.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use peershare_core::command::{DOWNLOAD, QUIT};
use peershare_core::wire::{read_command_line, write_file_stream, write_response};
use peershare_core::{Command, PeerError, Response, UserIdentity};

/// Longest request line a peer may send. Paths are the only variable part.
const MAX_REQUEST_LINE: usize = 16 * 1024;

pub struct PeerListener {
    listener: TcpListener,
    copy_buffer_bytes: usize,
}

impl PeerListener {
    /// Bind on `addr` (`host:port`). Port 0 picks a free port.
    pub async fn bind(addr: &str, copy_buffer_bytes: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind peer listener on {addr}"))?;
        Ok(Self {
            listener,
            copy_buffer_bytes: copy_buffer_bytes.max(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until `shutdown` fires. A failing connection never stops the
    /// accept loop.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let local = self.local_addr()?;
        tracing::info!(addr = %local, "peer listener ready");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!(addr = %local, "peer listener shutting down");
                    return Ok(());
                }

                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(a) => a,
                        Err(e) => {
                            tracing::warn!(error = %e, "peer accept failed");
                            continue;
                        }
                    };
                    let buffer = self.copy_buffer_bytes;
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, peer, buffer).await {
                            tracing::warn!(peer = %peer, error = %e, "peer connection failed");
                        }
                    });
                }
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, buffer: usize) -> Result<(), PeerError> {
    tracing::debug!(peer = %peer, "peer connected");
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    while let Some(line) = read_command_line(&mut reader, MAX_REQUEST_LINE).await? {
        let command = Command::parse(&line);
        match command.name.as_str() {
            DOWNLOAD => serve_download(&command.arguments, &mut writer, buffer).await?,
            QUIT => break,
            other => tracing::debug!(peer = %peer, command = other, "ignoring command"),
        }
    }

    tracing::debug!(peer = %peer, "peer disconnected");
    Ok(())
}

/// A validated `download` request whose source is an existing regular file.
#[derive(Debug)]
struct ServeRequest {
    peer: UserIdentity,
    source: PathBuf,
    destination: String,
}

impl ServeRequest {
    async fn validate(args: &[String]) -> Result<Self, PeerError> {
        if args.len() != 3 {
            return Err(PeerError::Validation(format!(
                "Invalid count of arguments: \"{DOWNLOAD}\" expects exactly 3 arguments."
            )));
        }
        let peer: UserIdentity = args[0].parse()?;
        let source = PathBuf::from(&args[1]);
        match tokio::fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                return Err(PeerError::NotFound(format!(
                    "File {} does not exist!",
                    source.display()
                )))
            }
        }
        Ok(Self {
            peer,
            source,
            destination: args[2].clone(),
        })
    }
}

async fn serve_download<W>(args: &[String], writer: &mut W, buffer: usize) -> Result<(), PeerError>
where
    W: AsyncWrite + Unpin,
{
    let (request, file) = match open_request(args).await {
        Ok(opened) => opened,
        Err(e) if e.is_recoverable() => {
            tracing::debug!(error = %e, "download refused");
            write_response(writer, &Response::error(e.to_string())).await?;
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let len = file.metadata().await?.len();
    tracing::info!(
        peer = %request.peer,
        source = %request.source.display(),
        bytes = len,
        "sending file"
    );

    write_response(writer, &Response::sending_file(&request.destination)).await?;
    let mut source = BufReader::with_capacity(buffer, file);
    write_file_stream(writer, &mut source, len).await?;
    write_response(
        writer,
        &Response::ok(format!(
            "File {} downloaded successfully to {}",
            request.source.display(),
            request.destination
        )),
    )
    .await?;
    Ok(())
}

/// Validate and open before anything is written, so an unreadable source
/// still produces a single `ERROR` frame.
async fn open_request(args: &[String]) -> Result<(ServeRequest, File), PeerError> {
    let request = ServeRequest::validate(args).await?;
    let file = File::open(&request.source).await.map_err(|e| {
        PeerError::NotFound(format!("File {} cannot be read: {e}", request.source.display()))
    })?;
    Ok((request, file))
}
