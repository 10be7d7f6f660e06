//! Download client: fetches files from another peer's listener.
//!
//! Console form: `download <identity> [{src},...] [{dst},...]`. Each
//! source/destination pair is fetched on its own connection, one after the
//! other. A failed pair is reported in its outcome and never stops the rest.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use peershare_core::command::DOWNLOAD;
use peershare_core::file_list::{parse_transfer_pairs, FILE_LIST_FORMAT};
use peershare_core::identity::IDENTITY_FORMAT;
use peershare_core::wire::{read_file_stream, read_response};
use peershare_core::{PeerError, Response, ResponseStatus, UserIdentity};

/// A parsed console `download` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub peer: UserIdentity,
    pub pairs: Vec<(String, String)>,
}

impl DownloadRequest {
    /// Parse the arguments following `download`. The file lists may have been
    /// split on whitespace by the command parser; they are rejoined first.
    pub fn parse(args: &[String]) -> Result<Self, PeerError> {
        if args.len() < 3 {
            return Err(PeerError::Validation(format!(
                "Invalid count of arguments: usage is \"{DOWNLOAD} {IDENTITY_FORMAT} {FILE_LIST_FORMAT} {FILE_LIST_FORMAT}\""
            )));
        }
        let peer: UserIdentity = args[0].parse()?;
        let pairs = parse_transfer_pairs(&args[1..].join(" "))?;
        Ok(Self { peer, pairs })
    }
}

/// What happened to one source/destination pair.
#[derive(Debug)]
pub struct TransferOutcome {
    pub source: String,
    pub destination: String,
    /// The peer's final response, or the local failure that ended the pair.
    pub result: Result<Response, PeerError>,
}

impl TransferOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(&self.result, Ok(r) if r.is_ok())
    }
}

/// Fetch every pair in `request` from its peer.
///
/// `local` is the identity this process registered under; guests (`None`)
/// are refused before any connection is made.
pub async fn download_files(
    local: Option<&UserIdentity>,
    request: &DownloadRequest,
) -> Result<Vec<TransferOutcome>, PeerError> {
    let Some(local) = local else {
        return Err(PeerError::Validation(
            "Download is not available for guest users! Register first.".to_string(),
        ));
    };

    let mut outcomes = Vec::with_capacity(request.pairs.len());
    for (source, destination) in &request.pairs {
        let result = fetch_one(local, &request.peer, source, Path::new(destination)).await;
        match &result {
            Ok(resp) => tracing::info!(
                peer = %request.peer,
                source = %source,
                destination = %destination,
                status = %resp.status,
                "transfer finished"
            ),
            Err(e) => tracing::warn!(
                peer = %request.peer,
                source = %source,
                error = %e,
                "transfer failed"
            ),
        }
        outcomes.push(TransferOutcome {
            source: source.clone(),
            destination: destination.clone(),
            result,
        });
    }
    Ok(outcomes)
}

async fn fetch_one(
    local: &UserIdentity,
    peer: &UserIdentity,
    source: &str,
    destination: &Path,
) -> Result<Response, PeerError> {
    let stream = TcpStream::connect(peer.socket_addr()).await?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let line = format!("{DOWNLOAD} {local} {source} {}\n", destination.display());
    writer.write_all(line.as_bytes()).await?;

    let first = read_response(&mut reader).await?;
    let last = match first.status {
        ResponseStatus::Error => first,
        ResponseStatus::SendingFile => {
            receive_into(&mut reader, destination).await?;
            read_response(&mut reader).await?
        }
        ResponseStatus::Ok => {
            return Err(PeerError::ProtocolViolation(format!(
                "expected SENDING_FILE or ERROR, got {first}"
            )))
        }
    };

    // Best effort: the peer also treats EOF as the end of the conversation.
    let _ = writer.write_all(b"quit\n").await;
    Ok(last)
}

/// Stream into a sibling `.part` file and rename over `destination` only
/// once every announced byte has arrived.
async fn receive_into<R>(reader: &mut R, destination: &Path) -> Result<u64, PeerError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let partial = partial_path(destination);
    let mut file = tokio::fs::File::create(&partial).await?;
    let received = match read_file_stream(reader, &mut file).await {
        Ok(n) => n,
        Err(e) => {
            drop(file);
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
    };
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(&partial, destination).await?;
    Ok(received)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
