//! Client side of the registry control connection.
//!
//! One long-lived TCP connection carries every command. Requests and their
//! response frames are strictly paired, so the connection sits behind a
//! mutex: the console and the background user-list refresh never interleave.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use peershare_core::command::LIST_USERS;
use peershare_core::wire::read_response;
use peershare_core::{PeerError, Response, UserIdentity};

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

#[derive(Clone)]
pub struct RegistryClient {
    conn: Arc<Mutex<Connection>>,
    users: Arc<RwLock<Vec<UserIdentity>>>,
}

impl RegistryClient {
    pub async fn connect(addr: &str) -> Result<Self, PeerError> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, writer) = stream.into_split();
        tracing::info!(server = addr, "connected to registry");
        Ok(Self {
            conn: Arc::new(Mutex::new(Connection {
                reader: BufReader::new(read_half),
                writer,
            })),
            users: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Send one command line and wait for its response.
    pub async fn request(&self, line: &str) -> Result<Response, PeerError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.contains('\n') {
            return Err(PeerError::Validation(
                "a command must fit on a single line".to_string(),
            ));
        }

        let mut conn = self.conn.lock().await;
        conn.writer.write_all(line.as_bytes()).await?;
        conn.writer.write_all(b"\n").await?;
        conn.writer.flush().await?;
        Ok(read_response(&mut conn.reader).await?)
    }

    /// Ask the registry for the current user list.
    pub async fn list_users(&self) -> Result<Vec<UserIdentity>, PeerError> {
        let resp = self.request(LIST_USERS).await?;
        if !resp.is_ok() {
            return Err(PeerError::ProtocolViolation(format!(
                "{LIST_USERS} failed: {resp}"
            )));
        }
        let mut users = Vec::new();
        for line in resp.message.lines().filter(|l| !l.trim().is_empty()) {
            match line.parse() {
                Ok(user) => users.push(user),
                Err(e) => tracing::warn!(line, error = %e, "skipping malformed user entry"),
            }
        }
        Ok(users)
    }

    /// Fetch the user list and replace the cache with it.
    pub async fn refresh_users(&self) -> Result<usize, PeerError> {
        let users = self.list_users().await?;
        let count = users.len();
        *self.users.write().await = users;
        Ok(count)
    }

    /// The user list as of the last successful refresh.
    pub async fn cached_users(&self) -> Vec<UserIdentity> {
        self.users.read().await.clone()
    }

    /// Refresh the cache every `every`, starting one period from now.
    pub fn spawn_refresh(&self, every: Duration) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            loop {
                interval.tick().await;
                match client.refresh_users().await {
                    Ok(count) => tracing::debug!(count, "user list refreshed"),
                    Err(e @ PeerError::Transport(_)) => {
                        tracing::warn!(error = %e, "registry connection lost, stopping refresh");
                        return;
                    }
                    Err(e) => tracing::warn!(error = %e, "user list refresh failed"),
                }
            }
        })
    }
}
