use crate::*;

use peershare_core::{PeerError, ResponseStatus, UserIdentity};
use peershare_services::{download_files, DownloadRequest};

fn request(line: &str) -> DownloadRequest {
    let args: Vec<String> = line.split_whitespace().map(String::from).collect();
    DownloadRequest::parse(&args).unwrap()
}

/// Deterministic, non-repeating-looking content of `len` bytes.
fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 253) as u8).collect()
}

#[tokio::test]
async fn test_end_to_end_download_via_registry() {
    let dir = scratch_dir("e2e");
    let server = TestRegistry::start().await.unwrap();

    // alice shares a file and serves it
    let (alice_port, _alice_listener) = start_peer().await.unwrap();
    let shared = dir.join("notes.txt");
    std::fs::write(&shared, b"meeting at noon\n").unwrap();
    let alice = server.client().await.unwrap();
    let resp = alice
        .request(&format!(
            "register alice-127.0.0.1:{alice_port} {}",
            shared.display()
        ))
        .await
        .unwrap();
    assert!(resp.is_ok(), "{resp}");

    // bob registers, discovers alice, downloads
    let bob = server.client().await.unwrap();
    bob.request("register bob-127.0.0.1:1 /nothing").await.unwrap();
    let alice_id: UserIdentity = format!("alice-127.0.0.1:{alice_port}").parse().unwrap();
    assert!(bob.list_users().await.unwrap().contains(&alice_id));

    let copy = dir.join("copy.txt");
    let req = request(&format!(
        "{alice_id} [{{{}}}] [{{{}}}]",
        shared.display(),
        copy.display()
    ));
    let bob_id: UserIdentity = "bob-127.0.0.1:1".parse().unwrap();
    let outcomes = download_files(Some(&bob_id), &req).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    let last = outcomes[0].result.as_ref().unwrap();
    assert_eq!(last.status, ResponseStatus::Ok, "{last}");
    assert_eq!(std::fs::read(&copy).unwrap(), b"meeting at noon\n");
}

#[tokio::test]
async fn test_large_file_is_byte_identical() {
    let dir = scratch_dir("large");
    let (port, _listener) = start_peer().await.unwrap();

    // Larger than the listener's copy buffer and not a multiple of it.
    let content = pattern(3 * 1024 * 1024 + 17);
    let source = dir.join("big.bin");
    std::fs::write(&source, &content).unwrap();
    let dest = dir.join("big.copy");

    let req = request(&format!(
        "alice-127.0.0.1:{port} [{{{}}}] [{{{}}}]",
        source.display(),
        dest.display()
    ));
    let me: UserIdentity = "bob-127.0.0.1:1".parse().unwrap();
    let outcomes = download_files(Some(&me), &req).await.unwrap();

    assert!(outcomes[0].succeeded(), "{:?}", outcomes[0]);
    let copied = std::fs::read(&dest).unwrap();
    assert_eq!(copied.len(), content.len());
    assert!(copied == content, "copy differs from source");
}

#[tokio::test]
async fn test_empty_file_downloads() {
    let dir = scratch_dir("empty");
    let (port, _listener) = start_peer().await.unwrap();
    let source = dir.join("empty.txt");
    std::fs::write(&source, b"").unwrap();
    let dest = dir.join("empty.copy");

    let req = request(&format!(
        "alice-127.0.0.1:{port} [{{{}}}] [{{{}}}]",
        source.display(),
        dest.display()
    ));
    let me: UserIdentity = "bob-127.0.0.1:1".parse().unwrap();
    let outcomes = download_files(Some(&me), &req).await.unwrap();
    assert!(outcomes[0].succeeded());
    assert_eq!(std::fs::metadata(&dest).unwrap().len(), 0);
}

#[tokio::test]
async fn test_missing_remote_file_creates_nothing() {
    let dir = scratch_dir("missing");
    let (port, _listener) = start_peer().await.unwrap();
    let dest = dir.join("never.txt");

    let req = request(&format!(
        "alice-127.0.0.1:{port} [{{{}}}] [{{{}}}]",
        dir.join("not-there.txt").display(),
        dest.display()
    ));
    let me: UserIdentity = "bob-127.0.0.1:1".parse().unwrap();
    let outcomes = download_files(Some(&me), &req).await.unwrap();

    let resp = outcomes[0].result.as_ref().unwrap();
    assert_eq!(resp.status, ResponseStatus::Error);
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_multiple_pairs_run_in_order() {
    let dir = scratch_dir("multi");
    let (port, _listener) = start_peer().await.unwrap();

    let names = ["one", "two", "three"];
    for name in names {
        std::fs::write(dir.join(name), name.as_bytes()).unwrap();
    }
    let sources: Vec<String> = names
        .iter()
        .map(|n| format!("{{{}}}", dir.join(n).display()))
        .collect();
    let dests: Vec<String> = names
        .iter()
        .map(|n| format!("{{{}}}", dir.join(format!("{n}.copy")).display()))
        .collect();

    let req = request(&format!(
        "alice-127.0.0.1:{port} [{}] [{}]",
        sources.join(","),
        dests.join(",")
    ));
    let me: UserIdentity = "bob-127.0.0.1:1".parse().unwrap();
    let outcomes = download_files(Some(&me), &req).await.unwrap();

    assert_eq!(outcomes.len(), 3);
    for (outcome, name) in outcomes.iter().zip(names) {
        assert!(outcome.succeeded(), "{outcome:?}");
        assert!(outcome.source.ends_with(name));
        assert_eq!(
            std::fs::read(dir.join(format!("{name}.copy"))).unwrap(),
            name.as_bytes()
        );
    }
}

#[tokio::test]
async fn test_guest_cannot_download() {
    let (port, _listener) = start_peer().await.unwrap();
    let req = request(&format!("alice-127.0.0.1:{port} [{{/etc/hostname}}] [{{/tmp/x}}]"));
    let err = download_files(None, &req).await.unwrap_err();
    assert!(matches!(err, PeerError::Validation(_)));
}

#[tokio::test]
async fn test_listener_serves_concurrent_downloads() {
    let dir = scratch_dir("concurrent");
    let (port, _listener) = start_peer().await.unwrap();
    let content = pattern(256 * 1024);
    let source = dir.join("shared.bin");
    std::fs::write(&source, &content).unwrap();

    let mut tasks = Vec::new();
    for i in 0..6 {
        let dest = dir.join(format!("copy-{i}.bin"));
        let line = format!(
            "alice-127.0.0.1:{port} [{{{}}}] [{{{}}}]",
            source.display(),
            dest.display()
        );
        tasks.push(tokio::spawn(async move {
            let me: UserIdentity = format!("bob{i}-127.0.0.1:1").parse().unwrap();
            let outcomes = download_files(Some(&me), &request(&line)).await.unwrap();
            (dest, outcomes[0].succeeded())
        }));
    }
    for task in tasks {
        let (dest, ok) = task.await.unwrap();
        assert!(ok);
        assert!(std::fs::read(&dest).unwrap() == content);
    }
}
