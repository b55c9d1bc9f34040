//! Integration tests for the relay client against a real relay server.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

use std::net::SocketAddr;
use std::time::Duration;

use relay_client::{send_once, Conversation, Envelope, RelayClient};
use relay_core::ClientName;
use relayd::config::RelayConfig;
use relayd::registry::{spawn_registry, RegistryHandle};
use relayd::server::RelayServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let config = RelayConfig::with_bind_addr("127.0.0.1:0".parse().unwrap());
        let registry = spawn_registry(config.registry_settings());
        let cancel_token = CancellationToken::new();
        let server = RelayServer::bind(&config, registry.clone(), cancel_token.clone())
            .await
            .expect("bind test server");
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(async move {
            server.serve().await.expect("serve");
        });

        Self {
            addr,
            registry,
            cancel_token,
            task,
        }
    }

    /// Connects a client and waits until the relay has bound its name.
    async fn client(&self, name: &str) -> RelayClient {
        let client = RelayClient::connect(self.addr, name).await.expect("connect");
        let name = ClientName::new(name);
        let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
        while !self
            .registry
            .list_mailboxes()
            .await
            .iter()
            .any(|m| m.name == name && m.connected)
        {
            assert!(tokio::time::Instant::now() < deadline, "{name} never connected");
            sleep(POLL_INTERVAL).await;
        }
        client
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        timeout(RECV_TIMEOUT, self.task)
            .await
            .expect("server did not shut down")
            .expect("server task panicked");
    }
}

/// Reads the front-end's output until `needle` shows up.
async fn read_until(screen: &mut DuplexStream, needle: &str) -> String {
    let mut printed = String::new();
    let mut buf = [0u8; 256];
    while !printed.contains(needle) {
        let n = timeout(RECV_TIMEOUT, screen.read(&mut buf))
            .await
            .expect("timed out waiting for output")
            .unwrap();
        assert!(n > 0, "output closed before {needle:?}; got {printed:?}");
        printed.push_str(&String::from_utf8_lossy(&buf[..n]));
    }
    printed
}

async fn receive(client: &mut RelayClient) -> Option<Envelope> {
    timeout(RECV_TIMEOUT, client.receive())
        .await
        .expect("timed out waiting for a message")
}

// ============================================================================
// connect / send / receive
// ============================================================================

#[tokio::test]
async fn test_alice_and_bob() {
    let server = TestServer::spawn().await;
    let mut alice = server.client("alice").await;
    let mut bob = server.client("bob").await;

    alice.send("bob", "hi").await.unwrap();
    assert_eq!(receive(&mut bob).await, Some(Envelope::new("alice", "hi")));

    bob.send("alice", "yo").await.unwrap();
    assert_eq!(receive(&mut alice).await, Some(Envelope::new("bob", "yo")));

    server.shutdown().await;
}

#[tokio::test]
async fn test_carol_writes_to_dave_before_dave_connects() {
    let server = TestServer::spawn().await;
    let mut carol = server.client("carol").await;

    carol.send("dave", "later").await.unwrap();
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while !server.registry.list_names().await.contains(&ClientName::new("dave")) {
        assert!(tokio::time::Instant::now() < deadline);
        sleep(POLL_INTERVAL).await;
    }

    let mut dave = RelayClient::connect(server.addr, "dave").await.unwrap();
    assert_eq!(receive(&mut dave).await, Some(Envelope::new("carol", "later")));

    server.shutdown().await;
}

#[tokio::test]
async fn test_fifo_across_senders() {
    let server = TestServer::spawn().await;
    let mut target = server.client("target").await;
    let mut a = server.client("a").await;
    let mut b = server.client("b").await;

    let mut expected = Vec::new();
    for i in 0..10 {
        let (sender, client) = if i % 2 == 0 { ("a", &mut a) } else { ("b", &mut b) };
        let body = format!("message {i}");
        client.send("target", &body).await.unwrap();
        // Wait for each one so the relay's enqueue order is the send order.
        assert_eq!(receive(&mut target).await, Some(Envelope::new(sender, body.clone())));
        expected.push(body);
    }
    assert_eq!(expected.len(), 10);

    server.shutdown().await;
}

#[tokio::test]
async fn test_receive_signals_end_of_stream() {
    let server = TestServer::spawn().await;
    let mut alice = server.client("alice").await;

    server.shutdown().await;
    assert_eq!(receive(&mut alice).await, None);
    assert_eq!(receive(&mut alice).await, None);
}

#[tokio::test]
async fn test_split_halves_work_concurrently() {
    let server = TestServer::spawn().await;
    let alice = server.client("alice").await;
    let mut bob = server.client("bob").await;

    let (mut sender, mut receiver) = alice.into_split();
    let reader = tokio::spawn(async move {
        let mut got = Vec::new();
        while got.len() < 3 {
            match timeout(RECV_TIMEOUT, receiver.receive()).await.unwrap() {
                Some(envelope) => got.push(envelope.body),
                None => break,
            }
        }
        got
    });

    for i in 0..3 {
        bob.send("alice", &format!("ping {i}")).await.unwrap();
    }
    sender.send("bob", "pong").await.unwrap();

    assert_eq!(reader.await.unwrap(), vec!["ping 0", "ping 1", "ping 2"]);
    assert_eq!(receive(&mut bob).await, Some(Envelope::new("alice", "pong")));

    server.shutdown().await;
}

#[tokio::test]
async fn test_send_once_delivers_and_disconnects() {
    let server = TestServer::spawn().await;
    let mut bob = server.client("bob").await;

    send_once(server.addr, "cron", "bob", "backup done").await.unwrap();
    assert_eq!(receive(&mut bob).await, Some(Envelope::new("cron", "backup done")));

    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    loop {
        let cron = server
            .registry
            .list_mailboxes()
            .await
            .into_iter()
            .find(|m| m.name.as_str() == "cron")
            .expect("cron has a mailbox");
        if !cron.connected {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "cron never disconnected");
        sleep(POLL_INTERVAL).await;
    }

    server.shutdown().await;
}

// ============================================================================
// Conversation
// ============================================================================

#[tokio::test]
async fn test_conversation_sends_lines_and_prints_replies() {
    let server = TestServer::spawn().await;
    let mut bob = server.client("bob").await;
    let alice = server.client("alice").await;

    let (mut keyboard, input) = tokio::io::duplex(1024);
    let (output, mut screen) = tokio::io::duplex(4096);
    let conversation = Conversation::new(alice, "bob");
    assert_eq!(conversation.peer().as_str(), "bob");
    let running = tokio::spawn(conversation.run(BufReader::new(input), output));

    keyboard.write_all(b"hello bob\n\n").await.unwrap();
    assert_eq!(receive(&mut bob).await, Some(Envelope::new("alice", "hello bob")));

    bob.send("alice", "hi alice").await.unwrap();
    let printed = read_until(&mut screen, "bob>>hi alice").await;
    assert!(printed.starts_with("alice>>"), "printed: {printed:?}");

    keyboard.write_all(b"Goodbye!\n").await.unwrap();
    assert_eq!(receive(&mut bob).await, Some(Envelope::new("alice", "Goodbye!")));

    timeout(RECV_TIMEOUT, running)
        .await
        .expect("conversation did not end")
        .unwrap()
        .unwrap();

    server.shutdown().await;
}

#[tokio::test]
async fn test_conversation_ends_when_relay_closes_with_input_idle() {
    let server = TestServer::spawn().await;
    let alice = server.client("alice").await;

    // Keep the typing end open so the input never reaches end of file.
    let (_keyboard, input) = tokio::io::duplex(64);
    let (output, mut screen) = tokio::io::duplex(4096);
    let running = tokio::spawn(Conversation::new(alice, "bob").run(BufReader::new(input), output));

    read_until(&mut screen, "alice>>").await;
    server.shutdown().await;

    read_until(&mut screen, "Relay closed the connection.").await;
    timeout(RECV_TIMEOUT, running)
        .await
        .expect("conversation kept waiting for input")
        .unwrap()
        .unwrap();
}
