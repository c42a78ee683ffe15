//! Integration tests for BandHub
//!
//! Tests the complete system including server, client, and persistence

use bandhub::{BandDraft, BandServer, Client, MusicGenre, ServerConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Start a server on its own thread and return the address it listens on
fn start_test_server(db_path: PathBuf) -> String {
    let (addr_tx, addr_rx) = mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let config = ServerConfig {
                bind_addr: "127.0.0.1:0".to_string(),
                db_path,
                ..ServerConfig::default()
            };
            let server = BandServer::new(config).await.unwrap();
            addr_tx.send(server.local_addr().unwrap()).unwrap();
            let _ = server.run().await;
        });
    });
    addr_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("server failed to start")
        .to_string()
}

fn db_in(dir: &TempDir) -> PathBuf {
    dir.path().join("bands.db")
}

async fn connect_user(addr: &str, username: &str) -> Client {
    let mut client = Client::connect(addr).await.unwrap();
    let response = client.register(username, "secret").await.unwrap();
    assert!(response.is_success(), "register failed: {}", response.message);
    client
}

fn band(participants: i64) -> BandDraft {
    BandDraft::new("The Band", 10.0, 20.0, participants, 1)
}

fn band_ids(path: &Path) -> HashSet<i64> {
    use bandhub::persistence::{BandRepository, SqliteBandRepository};
    let repo = SqliteBandRepository::open(path, "music_bands").unwrap();
    repo.fetch_all().unwrap().into_iter().map(|b| b.id).collect()
}

#[tokio::test]
async fn test_add_grows_collection_with_unique_ids() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));
    let mut client = connect_user(&addr, "alice").await;

    let mut seen = HashSet::new();
    for i in 1..=5 {
        let before = client.load().await.unwrap().len();
        let response = client.add(band(i)).await.unwrap();
        assert!(response.is_success());
        let bands = client.load().await.unwrap();
        assert_eq!(bands.len(), before + 1);
        let newest = bands.iter().map(|b| b.id).max().unwrap();
        assert!(seen.insert(newest), "id {} issued twice", newest);
    }

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_ownership_scenario() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));
    let mut alice = connect_user(&addr, "alice").await;
    let mut bob = connect_user(&addr, "bob").await;

    alice.add(band(3)).await.unwrap();
    let id = alice.load().await.unwrap()[0].id;
    let before = bob.load().await.unwrap();

    let denied = bob.remove(id).await.unwrap();
    assert!(!denied.is_success());
    assert!(denied.message.contains("Authorization denied"));
    assert_eq!(bob.load().await.unwrap(), before);

    let denied = bob.update(id, band(9)).await.unwrap();
    assert!(!denied.is_success());
    assert_eq!(bob.load().await.unwrap(), before);

    let removed = alice.remove(id).await.unwrap();
    assert!(removed.is_success());
    assert_eq!(alice.load().await.unwrap().len(), before.len() - 1);
    assert!(!band_ids(&db_in(&dir)).contains(&id));

    alice.close().await.unwrap();
    bob.close().await.unwrap();
}

#[tokio::test]
async fn test_unauthenticated_client_can_only_read() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));
    let mut reader = Client::connect(&addr).await.unwrap();

    let response = reader.add(band(1)).await.unwrap();
    assert!(!response.is_success());
    assert!(reader.load().await.unwrap().is_empty());
    assert_eq!(reader.info().await.unwrap().size, 0);
    assert_eq!(reader.count_lesser_genre("SOUL").await.unwrap(), 0);

    let response = reader.login("ghost", "nope").await.unwrap();
    assert!(!response.is_success());
    assert!(reader.credentials().is_none());

    reader.close().await.unwrap();
}

#[tokio::test]
async fn test_add_if_min_and_max_scenario() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));
    let mut client = connect_user(&addr, "alice").await;

    assert!(client.add_if_min(band(5)).await.unwrap().is_success());
    assert_eq!(client.load().await.unwrap().len(), 1);

    for _ in 0..2 {
        assert!(!client.add_if_min(band(10)).await.unwrap().is_success());
        assert_eq!(client.load().await.unwrap().len(), 1);
    }

    assert!(client.add_if_max(band(10)).await.unwrap().is_success());
    assert!(!client.add_if_max(band(7)).await.unwrap().is_success());
    assert_eq!(client.load().await.unwrap().len(), 2);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_count_lesser_genre_over_the_wire() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));
    let mut client = connect_user(&addr, "alice").await;

    client.add(band(1).with_genre(MusicGenre::HipHop)).await.unwrap();
    client.add(band(2).with_genre(MusicGenre::PostPunk)).await.unwrap();
    client.add(band(3)).await.unwrap();

    assert_eq!(client.count_lesser_genre("SOUL").await.unwrap(), 1);
    assert_eq!(client.count_lesser_genre("HIP_HOP").await.unwrap(), 0);
    assert!(client.count_lesser_genre("JAZZ").await.is_err());

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_clear_keeps_other_users_bands() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));
    let mut alice = connect_user(&addr, "alice").await;
    let mut bob = connect_user(&addr, "bob").await;

    alice.add(band(1)).await.unwrap();
    alice.add(band(2)).await.unwrap();
    bob.add(band(3)).await.unwrap();

    assert!(alice.clear().await.unwrap().is_success());
    let bands = bob.load().await.unwrap();
    assert_eq!(bands.len(), 1);
    assert_eq!(bands[0].owner_username, "bob");

    alice.close().await.unwrap();
    bob.close().await.unwrap();
}

#[tokio::test]
async fn test_persistence_and_recovery() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));

    let mut client = connect_user(&addr, "alice").await;
    client
        .add(band(4).with_description("krautrock").with_genre(MusicGenre::ProgressiveRock))
        .await
        .unwrap();
    client.add(band(5)).await.unwrap();
    client.add(band(6)).await.unwrap();
    let second = client.load().await.unwrap()[1].id;
    client.remove(second).await.unwrap();
    let written = client.load().await.unwrap();
    client.close().await.unwrap();

    // A second server on the same database loads what the first one stored
    let addr2 = start_test_server(db_in(&dir));
    let mut client2 = Client::connect(&addr2).await.unwrap();
    let mut reloaded = client2.load().await.unwrap();
    reloaded.sort_by_key(|b| b.id);
    assert_eq!(reloaded, written);
    assert_eq!(reloaded[0].description.as_deref(), Some("krautrock"));
    assert!(reloaded.iter().all(|b| b.owner_username == "alice"));

    // accounts survive too
    assert!(client2.login("alice", "secret").await.unwrap().is_success());
    client2.close().await.unwrap();
}

#[tokio::test]
async fn test_malformed_stream_only_drops_that_connection() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));

    let mut healthy = Client::connect(&addr).await.unwrap();
    let mut broken = TcpStream::connect(&addr).await.unwrap();

    broken.write_all(&[0, 0, 0, 5]).await.unwrap();
    broken.write_all(b"nope!").await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), broken.read(&mut buf))
        .await
        .expect("server did not close the connection");
    assert!(matches!(read, Ok(0) | Err(_)));

    assert!(healthy.load().await.unwrap().is_empty());
    healthy.close().await.unwrap();
}

#[tokio::test]
async fn test_client_closing_mid_frame_only_drops_that_connection() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));

    let mut healthy = connect_user(&addr, "alice").await;
    healthy.add(band(2)).await.unwrap();

    let frame = bandhub::codec::encode_frame(&bandhub::Request::new(bandhub::Command::Load)).unwrap();
    let mut truncated = TcpStream::connect(&addr).await.unwrap();
    truncated.write_all(&frame[..frame.len() - 3]).await.unwrap();
    truncated.shutdown().await.unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), truncated.read(&mut buf))
        .await
        .expect("server did not close the connection");
    assert!(matches!(read, Ok(0) | Err(_)));

    assert_eq!(healthy.load().await.unwrap().len(), 1);
    assert!(healthy.add(band(3)).await.unwrap().is_success());
    healthy.close().await.unwrap();
}

#[tokio::test]
async fn test_negative_insert_index_is_rejected_without_dropping_connection() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));
    let mut client = connect_user(&addr, "alice").await;

    let response = client.insert_at(-1, band(1)).await.unwrap();
    assert!(!response.is_success());
    assert!(response.message.contains("index"), "{}", response.message);

    assert!(client.load().await.unwrap().is_empty());
    assert!(client.insert_at(0, band(1)).await.unwrap().is_success());
    assert_eq!(client.load().await.unwrap().len(), 1);
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_request_split_across_writes() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));

    let request = bandhub::Request::new(bandhub::Command::Info);
    let frame = bandhub::codec::encode_frame(&request).unwrap();

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    for byte in &frame {
        stream.write_all(std::slice::from_ref(byte)).await.unwrap();
        stream.flush().await.unwrap();
    }

    let mut decoder = bandhub::codec::FrameDecoder::default();
    let mut buf = [0u8; 1024];
    let response: bandhub::Response = loop {
        if let Some(response) = decoder.decode().unwrap() {
            break response;
        }
        let read = stream.read(&mut buf).await.unwrap();
        assert!(read > 0, "server closed the connection");
        decoder.extend(&buf[..read]);
    };
    assert!(response.is_success());
}

#[tokio::test]
async fn test_execute_script_over_the_wire() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));
    let mut client = connect_user(&addr, "alice").await;

    let response = client
        .execute_script(vec![
            bandhub::Command::Add { band: band(1) },
            bandhub::Command::Add { band: band(2) },
            bandhub::Command::Remove { id: 9999 },
        ])
        .await
        .unwrap();
    assert!(!response.is_success());
    match response.payload {
        Some(bandhub::Payload::Script(responses)) => {
            assert_eq!(responses.len(), 3);
            assert!(responses[0].is_success());
            assert!(responses[1].is_success());
            assert!(!responses[2].is_success());
        }
        other => panic!("expected script payload, got {:?}", other),
    }
    assert_eq!(client.load().await.unwrap().len(), 2);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_clients() {
    let dir = TempDir::new().unwrap();
    let addr = start_test_server(db_in(&dir));

    let num_clients = 8;
    let ops_per_client = 20;
    let mut handles = Vec::new();

    for client_id in 0..num_clients {
        let addr = addr.clone();
        handles.push(tokio::spawn(async move {
            let mut client = connect_user(&addr, &format!("user{}", client_id)).await;
            for i in 0..ops_per_client {
                assert!(client.add(band(i + 1)).await.unwrap().is_success());
            }
            let own = client
                .load()
                .await
                .unwrap()
                .into_iter()
                .filter(|b| b.owner_username == format!("user{}", client_id))
                .count();
            assert_eq!(own, ops_per_client as usize);
            client.close().await.unwrap();
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let mut client = Client::connect(&addr).await.unwrap();
    assert_eq!(
        client.load().await.unwrap().len(),
        num_clients * ops_per_client as usize
    );
}

#[tokio::test]
async fn test_error_handling() {
    // Test connection to non-existent server
    let result = Client::connect("127.0.0.1:1").await;
    assert!(result.is_err());
}
