use crate::*;

use std::collections::HashSet;

use peershare_core::{ResponseStatus, UserIdentity};

fn identity(text: &str) -> UserIdentity {
    text.parse().unwrap()
}

#[tokio::test]
async fn test_register_list_unregister_over_tcp() {
    let server = TestRegistry::start().await.unwrap();
    let alice = server.client().await.unwrap();

    let resp = alice
        .request("register alice-127.0.0.1:9001 /srv/a.txt /srv/b.txt")
        .await
        .unwrap();
    assert!(resp.is_ok(), "{resp}");

    let listing = alice.request("list-files").await.unwrap();
    assert_eq!(listing.message, "alice-127.0.0.1:9001 : [/srv/a.txt, /srv/b.txt]");

    let resp = alice
        .request("unregister alice-127.0.0.1:9001 /srv/a.txt")
        .await
        .unwrap();
    assert!(resp.is_ok(), "{resp}");
    let remaining = server.registry.files.get(&identity("alice-127.0.0.1:9001"));
    assert_eq!(remaining, HashSet::from(["/srv/b.txt".to_string()]));
}

#[tokio::test]
async fn test_unregister_unknown_user_changes_nothing() {
    let server = TestRegistry::start().await.unwrap();
    let alice = server.client().await.unwrap();
    alice.request("register alice-127.0.0.1:9001 /a").await.unwrap();

    let resp = alice
        .request("unregister ghost-127.0.0.1:1 /a")
        .await
        .unwrap();
    assert_eq!(resp.status, ResponseStatus::Error);
    assert_eq!(server.registry.files.len(), 1);
    assert_eq!(
        server.registry.files.get(&identity("alice-127.0.0.1:9001")).len(),
        1
    );
}

#[tokio::test]
async fn test_users_visible_across_sessions() {
    let server = TestRegistry::start().await.unwrap();
    let alice = server.client().await.unwrap();
    let bob = server.client().await.unwrap();

    alice.request("register alice-127.0.0.1:9001 /a").await.unwrap();
    bob.request("register bob-127.0.0.1:9002 /b").await.unwrap();

    let users = bob.list_users().await.unwrap();
    assert_eq!(
        users,
        vec![identity("alice-127.0.0.1:9001"), identity("bob-127.0.0.1:9002")]
    );

    assert_eq!(alice.refresh_users().await.unwrap(), 2);
    assert_eq!(alice.cached_users().await, users);
}

#[tokio::test]
async fn test_disconnect_removes_user_from_listings() {
    let server = TestRegistry::start().await.unwrap();
    let alice = server.client().await.unwrap();
    let bob = server.client().await.unwrap();
    alice.request("register alice-127.0.0.1:9001 /a").await.unwrap();
    bob.request("register bob-127.0.0.1:9002 /b").await.unwrap();

    let resp = alice.request("disconnect").await.unwrap();
    assert!(resp.is_ok(), "{resp}");

    assert_eq!(bob.request("list-users").await.unwrap().message, "bob-127.0.0.1:9002");
    assert_eq!(
        bob.request("list-files").await.unwrap().message,
        "bob-127.0.0.1:9002 : [/b]"
    );

    // The connection itself stays open after an explicit disconnect.
    assert!(alice.request("list-users").await.unwrap().is_ok());
}

#[tokio::test]
async fn test_dropped_connection_acts_as_disconnect() {
    let server = TestRegistry::start().await.unwrap();
    let bob = server.client().await.unwrap();
    bob.request("register bob-127.0.0.1:9002 /b").await.unwrap();

    {
        let alice = server.client().await.unwrap();
        alice.request("register alice-127.0.0.1:9001 /a").await.unwrap();
        assert_eq!(server.registry.files.len(), 2);
    }

    let registry = server.registry.clone();
    wait_for(Duration::from_secs(2), move || registry.files.len() == 1)
        .await
        .unwrap();
    assert_eq!(bob.list_users().await.unwrap(), vec![identity("bob-127.0.0.1:9002")]);

    // The identity is free again for a new session.
    let again = server.client().await.unwrap();
    assert!(again
        .request("register alice-127.0.0.1:9001 /z")
        .await
        .unwrap()
        .is_ok());
}

#[tokio::test]
async fn test_identity_cannot_be_hijacked_by_another_session() {
    let server = TestRegistry::start().await.unwrap();
    let alice = server.client().await.unwrap();
    let mallory = server.client().await.unwrap();
    alice.request("register alice-127.0.0.1:9001 /a").await.unwrap();

    let resp = mallory
        .request("register alice-127.0.0.1:9001 /etc/passwd")
        .await
        .unwrap();
    assert_eq!(resp.status, ResponseStatus::Error);

    // Dropping the refused session must not disconnect the real owner.
    drop(mallory);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        server.registry.files.get(&identity("alice-127.0.0.1:9001")),
        HashSet::from(["/a".to_string()])
    );
}

#[tokio::test]
async fn test_many_concurrent_sessions() {
    let server = TestRegistry::start().await.unwrap();

    // An idle connection must not hold up anyone else.
    let _idle = server.client().await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..24u16 {
        let client = server.client().await.unwrap();
        tasks.push(tokio::spawn(async move {
            let line = format!("register user{i}-127.0.0.1:{} /file-{i}", 10_000 + i);
            let resp = client.request(&line).await.unwrap();
            (client, resp)
        }));
    }
    // Keep every client alive; a dropped one would be disconnected.
    let mut clients = Vec::new();
    for task in tasks {
        let (client, resp) = task.await.unwrap();
        assert!(resp.is_ok(), "{resp}");
        clients.push(client);
    }

    let observer = server.client().await.unwrap();
    assert_eq!(observer.list_users().await.unwrap().len(), 24);
}

#[tokio::test]
async fn test_empty_registry_listings() {
    let server = TestRegistry::start().await.unwrap();
    let client = server.client().await.unwrap();
    let users = client.request("list-users").await.unwrap();
    assert!(users.is_ok());
    assert!(users.message.is_empty());
    assert!(client.list_users().await.unwrap().is_empty());
}
