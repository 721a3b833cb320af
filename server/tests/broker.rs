//! End-to-end scenarios driven against a real broker instance over
//! loopback UDP.

use broker_protocol::{Command, CommandTag};
use broker_server::dispatch::{register_builtins, Collaborators, Dispatcher};
use broker_server::net::NetworkManager;
use broker_server::persist::{PersistConfig, Spooler};
use broker_server::topic::Router;
use broker_std::compression::Compression;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

struct TestBroker {
    addr: std::net::SocketAddr,
    router: Arc<Router>,
    _handle: tokio::task::JoinHandle<()>,
}

async fn start_broker(plain_mode: bool, persist: PersistConfig) -> TestBroker {
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = socket.local_addr().unwrap();
    let compression = Arc::new(Compression::new(plain_mode));
    let router = Arc::new(Router::new(socket.clone(), compression.clone()));
    let spooler = Spooler::start(persist);

    let mut dispatcher = Dispatcher::new();
    register_builtins(&mut dispatcher);

    let collaborators = Collaborators {
        router: router.clone(),
        spooler,
    };
    let manager = NetworkManager::new(socket, compression, router.clone(), dispatcher, collaborators);
    let handle = tokio::spawn(async move { manager.run().await });

    TestBroker {
        addr,
        router,
        _handle: handle,
    }
}

fn disabled_persist() -> PersistConfig {
    PersistConfig {
        enabled: false,
        folder: std::path::PathBuf::from("."),
        prefix: "test".to_string(),
    }
}

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn send_command(socket: &UdpSocket, broker_addr: std::net::SocketAddr, command: &Command) {
    let bytes = broker_protocol::encode(command).unwrap();
    socket.send_to(&bytes, broker_addr).await.unwrap();
}

async fn recv_command(socket: &UdpSocket) -> Command {
    let mut buf = vec![0u8; 64 * 1024];
    let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for a reply")
        .unwrap();
    broker_protocol::decode(&buf[..len]).unwrap()
}

fn echo(payload: serde_json::Value) -> Command {
    Command {
        command: CommandTag::Echo,
        timestamp: Utc::now(),
        payload,
        source: None,
    }
}

#[tokio::test]
async fn echo_fans_out_with_fresh_timestamp_and_stashed_original() {
    let broker = start_broker(true, disabled_persist()).await;
    let a = client().await;

    let t0 = Utc::now();
    let cmd = Command {
        command: CommandTag::Echo,
        timestamp: t0,
        payload: json!({ "x": 1 }),
        source: None,
    };
    send_command(&a, broker.addr, &cmd).await;

    let reply = recv_command(&a).await;
    assert!(reply.timestamp > t0);
    assert_eq!(reply.payload["orig_timestamp"], json!(t0));
    assert_eq!(reply.payload["x"], json!(1));
}

#[tokio::test]
async fn get_clients_lists_every_subscriber() {
    let broker = start_broker(true, disabled_persist()).await;
    let a = client().await;
    let b = client().await;

    // Auto-subscribe both via any datagram first.
    send_command(&a, broker.addr, &echo(json!({}))).await;
    let _ = recv_command(&a).await;
    send_command(&b, broker.addr, &echo(json!({}))).await;
    // B's echo also reaches A (both now subscribed); drain it.
    let _ = recv_command(&a).await;
    let _ = recv_command(&b).await;

    let get_clients = Command {
        command: CommandTag::Get,
        timestamp: Utc::now(),
        payload: json!({ "params": ["clients"] }),
        source: None,
    };
    send_command(&a, broker.addr, &get_clients).await;

    let reply = recv_command(&a).await;
    let response = reply.payload["response"].as_array().unwrap();
    let addrs: Vec<String> = response.iter().map(|v| v.as_str().unwrap().to_string()).collect();
    assert_eq!(addrs.len(), 2);
    assert!(addrs.contains(&a.local_addr().unwrap().to_string()));
    assert!(addrs.contains(&b.local_addr().unwrap().to_string()));
}

#[tokio::test]
async fn get_help_lists_all_seven_command_tags() {
    let broker = start_broker(true, disabled_persist()).await;
    let a = client().await;

    let get_help = Command {
        command: CommandTag::Get,
        timestamp: Utc::now(),
        payload: json!({ "params": ["help"] }),
        source: None,
    };
    send_command(&a, broker.addr, &get_help).await;

    let reply = recv_command(&a).await;
    let response = reply.payload["response"].as_array().unwrap();
    let tags: std::collections::HashSet<&str> = response.iter().map(|v| v.as_str().unwrap()).collect();
    let expected: std::collections::HashSet<&str> =
        ["echo", "shutdown", "disconnect", "get", "set", "update", "msg"]
            .into_iter()
            .collect();
    assert_eq!(tags, expected);
}

#[tokio::test]
async fn update_persists_a_row_and_broadcasts() {
    let dir = tempfile::tempdir().unwrap();
    let broker = start_broker(
        true,
        PersistConfig {
            enabled: true,
            folder: dir.path().to_path_buf(),
            prefix: "test".to_string(),
        },
    )
    .await;
    let a = client().await;
    let b = client().await;

    // Subscribe both first.
    send_command(&a, broker.addr, &echo(json!({}))).await;
    let _ = recv_command(&a).await;
    send_command(&b, broker.addr, &echo(json!({}))).await;
    let _ = recv_command(&a).await;
    let _ = recv_command(&b).await;

    let update = Command {
        command: CommandTag::Update,
        timestamp: Utc::now(),
        payload: json!({ "k": "v" }),
        source: None,
    };
    send_command(&a, broker.addr, &update).await;

    let from_a = recv_command(&a).await;
    let from_b = recv_command(&b).await;
    assert_eq!(from_a.command, CommandTag::Update);
    assert_eq!(from_b.command, CommandTag::Update);

    broker.router.close().await;
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    let contents = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
    assert!(contents.contains(&a.local_addr().unwrap().to_string()));
}

#[tokio::test]
async fn disconnect_stops_further_broadcasts_to_that_client() {
    let broker = start_broker(true, disabled_persist()).await;
    let a = client().await;
    let b = client().await;

    send_command(&a, broker.addr, &echo(json!({}))).await;
    let _ = recv_command(&a).await;
    send_command(&b, broker.addr, &echo(json!({}))).await;
    let _ = recv_command(&a).await;
    let _ = recv_command(&b).await;

    let disconnect = Command {
        command: CommandTag::Disconnect,
        timestamp: Utc::now(),
        payload: json!({}),
        source: None,
    };
    send_command(&a, broker.addr, &disconnect).await;

    // A's disconnect itself isn't broadcast (no handler-triggered fan-out);
    // the next echo from B must reach B but not A.
    send_command(&b, broker.addr, &echo(json!({ "tag": "after-disconnect" }))).await;
    let from_b = recv_command(&b).await;
    assert_eq!(from_b.payload["tag"], json!("after-disconnect"));

    let mut buf = vec![0u8; 1024];
    let result = timeout(Duration::from_millis(300), a.recv_from(&mut buf)).await;
    assert!(result.is_err(), "A should not have received anything after disconnecting");
}

#[tokio::test]
async fn gzip_framing_round_trips_when_not_plain_mode() {
    let broker = start_broker(false, disabled_persist()).await;
    let a = client().await;
    let compression = Compression::new(false);

    let t0 = Utc::now();
    let cmd = Command {
        command: CommandTag::Echo,
        timestamp: t0,
        payload: json!({ "foo": "bar" }),
        source: None,
    };
    let encoded = broker_protocol::encode(&cmd).unwrap();
    let framed = compression.pack(&encoded).unwrap();
    a.send_to(&framed, broker.addr).await.unwrap();

    let mut buf = vec![0u8; 64 * 1024];
    let (len, _) = timeout(Duration::from_secs(2), a.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    let unpacked = compression.unpack(&buf[..len]).unwrap();
    let reply = broker_protocol::decode(&unpacked).unwrap();
    assert!(reply.timestamp > t0);
    assert_eq!(reply.payload["foo"], json!("bar"));
}
