//! Interactive console: stdin lines in, printed responses out.
//!
//! `download` is handled locally by the download client. Everything else is
//! forwarded verbatim to the registry. A successful `register` starts the
//! peer listener for that identity; `disconnect` stops it again.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use peershare_core::command::{DISCONNECT, DOWNLOAD, QUIT, REGISTER};
use peershare_core::{Command, PeerError, Response, UserIdentity};
use peershare_services::{download_files, DownloadRequest, PeerListener, RegistryClient, TransferOutcome};

/// What the run loop should do after a line.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Print(Vec<String>),
    Quit,
}

pub struct Console {
    client: RegistryClient,
    copy_buffer_bytes: usize,
    current_user: Option<UserIdentity>,
    listener: Option<(SocketAddr, broadcast::Sender<()>)>,
}

impl Console {
    pub fn new(client: RegistryClient, copy_buffer_bytes: usize) -> Self {
        Self {
            client,
            copy_buffer_bytes,
            current_user: None,
            listener: None,
        }
    }

    pub fn current_user(&self) -> Option<&UserIdentity> {
        self.current_user.as_ref()
    }

    pub fn listener_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(|(addr, _)| *addr)
    }

    /// Read stdin until EOF, `quit`, or `shutdown`.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                _ = shutdown.recv() => break,
                line = lines.next_line() => match line.context("failed to read stdin")? {
                    Some(line) => line,
                    None => break,
                },
            };
            match self.handle_line(&line).await {
                Ok(Step::Print(out)) => {
                    for l in out {
                        println!("{l}");
                    }
                }
                Ok(Step::Quit) => break,
                Err(e) => {
                    self.stop_listener();
                    return Err(e).context("lost connection to the registry");
                }
            }
        }
        self.stop_listener();
        Ok(())
    }

    /// Handle one console line. An `Err` means the registry connection is
    /// unusable.
    pub async fn handle_line(&mut self, line: &str) -> Result<Step, PeerError> {
        let command = Command::parse(line);
        match command.name.as_str() {
            "" => Ok(Step::Print(Vec::new())),
            QUIT => Ok(Step::Quit),
            DOWNLOAD => Ok(Step::Print(self.download(&command.arguments).await)),
            _ => self.forward(line, &command).await.map(Step::Print),
        }
    }

    async fn forward(&mut self, line: &str, command: &Command) -> Result<Vec<String>, PeerError> {
        let response = self.client.request(line).await?;
        let mut out = vec![response.to_string()];
        if response.is_ok() {
            match command.name.as_str() {
                REGISTER => out.extend(self.on_registered(command).await),
                DISCONNECT => {
                    self.current_user = None;
                    self.stop_listener();
                }
                _ => {}
            }
        }
        Ok(out)
    }

    async fn on_registered(&mut self, command: &Command) -> Option<String> {
        if self.current_user.is_some() {
            return None;
        }
        let user: UserIdentity = command.arguments.first()?.parse().ok()?;
        self.current_user = Some(user.clone());
        if self.listener.is_some() {
            return None;
        }
        Some(match self.start_listener(&user).await {
            Ok(addr) => format!("Listening for peers on {addr}"),
            Err(e) => {
                tracing::error!(user = %user, error = %e, "peer listener failed to start");
                format!("[ERROR] peer listener failed to start: {e:#}")
            }
        })
    }

    async fn start_listener(&mut self, user: &UserIdentity) -> Result<SocketAddr> {
        let listener = PeerListener::bind(&user.socket_addr(), self.copy_buffer_bytes).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(async move {
            if let Err(e) = listener.run(shutdown_rx).await {
                tracing::error!(error = %e, "peer listener stopped");
            }
        });
        self.listener = Some((addr, shutdown_tx));
        Ok(addr)
    }

    fn stop_listener(&mut self) {
        if let Some((_, shutdown)) = self.listener.take() {
            let _ = shutdown.send(());
        }
    }

    async fn download(&self, args: &[String]) -> Vec<String> {
        let request = match DownloadRequest::parse(args) {
            Ok(r) => r,
            Err(e) => return vec![Response::error(e.to_string()).to_string()],
        };

        let known = self.client.cached_users().await;
        if !known.is_empty() && !known.contains(&request.peer) {
            tracing::warn!(peer = %request.peer, "peer is not in the last known user list");
        }

        match download_files(self.current_user.as_ref(), &request).await {
            Ok(outcomes) => outcomes.iter().map(describe).collect(),
            Err(e) => vec![Response::error(e.to_string()).to_string()],
        }
    }
}

fn describe(outcome: &TransferOutcome) -> String {
    match &outcome.result {
        Ok(resp) => format!("{} -> {}: {resp}", outcome.source, outcome.destination),
        Err(e) => format!("{} -> {}: [ERROR] {e}", outcome.source, outcome.destination),
    }
}
