//! Integration tests for the chat client against a real server.
//!
//! User input is fed through an in-memory duplex pipe; dropping the
//! writing end simulates end of input.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parlor_client::{ChatClient, ClientConfig, ClientEvent};
use parlord::config::ServerConfig;
use parlord::registry::{spawn_registry, RegistryHandle};
use parlord::server::ChatServer;
use parlord::sink::MemoryLog;
use tokio::io::{AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// Test Helpers
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    registry: RegistryHandle,
    cancel_token: CancellationToken,
}

impl TestServer {
    async fn start() -> Self {
        let registry = spawn_registry();
        let cancel_token = CancellationToken::new();
        let server = ChatServer::bind(
            &ServerConfig::ephemeral(),
            registry.clone(),
            Arc::new(MemoryLog::new()),
            cancel_token.clone(),
        )
        .await
        .expect("bind ephemeral port");
        let addr = server.local_addr();
        tokio::spawn(server.run());

        Self {
            addr,
            registry,
            cancel_token,
        }
    }

    /// Polls until `name` is no longer registered.
    async fn wait_until_gone(&self, name: &str) {
        for _ in 0..100 {
            if self.registry.lookup(name).await.is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{name} is still registered");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// A client running in the background, with handles to drive it.
struct RunningClient {
    input: DuplexStream,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    cancel_token: CancellationToken,
    task: JoinHandle<parlor_client::Result<()>>,
}

impl RunningClient {
    fn start(server: &TestServer, username: Option<&str>) -> Self {
        let config = ClientConfig {
            host: server.addr.ip().to_string(),
            port: server.addr.port(),
            username: username.map(str::to_string),
        };
        let (event_tx, events) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let client = ChatClient::new(config, event_tx, cancel_token.clone());

        let (input, client_side) = tokio::io::duplex(1024);
        let task = tokio::spawn(async move { client.run(BufReader::new(client_side)).await });

        Self {
            input,
            events,
            cancel_token,
            task,
        }
    }

    async fn type_line(&mut self, line: &str) {
        self.input
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }

    /// Drops the writing end of the input pipe, so the client reads EOF.
    fn close_input(&mut self) {
        self.input = tokio::io::duplex(1).0;
    }

    async fn next_event(&mut self) -> ClientEvent {
        timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("event channel closed")
    }

    async fn expect_line(&mut self, expected: &str) {
        assert_eq!(self.next_event().await, ClientEvent::Line(expected.to_string()));
    }

    /// Skips server lines until the client reports the disconnect.
    async fn expect_disconnect(&mut self) {
        loop {
            match self.next_event().await {
                ClientEvent::Disconnected => return,
                ClientEvent::Line(_) => continue,
                other => panic!("unexpected event {other:?}"),
            }
        }
    }

    async fn finish(self) {
        let result = timeout(EVENT_TIMEOUT, self.task)
            .await
            .expect("client did not finish")
            .unwrap();
        assert!(result.is_ok(), "client failed: {result:?}");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_username_from_config() {
    let server = TestServer::start().await;
    let mut client = RunningClient::start(&server, Some("alice"));

    assert!(matches!(client.next_event().await, ClientEvent::Connected { .. }));
    client.expect_line("Enter your username:").await;
    client.expect_line("🔔 alice joined the chat. 👥 (1 online)").await;

    client.type_line("hello").await;
    client.expect_line("alice: hello").await;

    client.type_line("/quit").await;
    client.expect_disconnect().await;
    client.finish().await;
}

#[tokio::test]
async fn test_username_from_first_input_line() {
    let server = TestServer::start().await;
    let mut client = RunningClient::start(&server, None);

    assert!(matches!(client.next_event().await, ClientEvent::Connected { .. }));
    client.expect_line("Enter your username:").await;

    client.type_line("bob").await;
    client.expect_line("🔔 bob joined the chat. 👥 (1 online)").await;
    assert!(server.registry.lookup("bob").await.is_some());

    client.type_line("/count").await;
    client.expect_line("📊 Members online: 1").await;
}

#[tokio::test]
async fn test_quit_removes_user_from_server() {
    let server = TestServer::start().await;
    let mut client = RunningClient::start(&server, Some("carol"));
    client.next_event().await;
    client.next_event().await;
    client.next_event().await;

    client.type_line("/QUIT").await;
    client.expect_disconnect().await;
    client.finish().await;

    server.wait_until_gone("carol").await;
}

#[tokio::test]
async fn test_end_of_input_leaves_chat() {
    let server = TestServer::start().await;
    let mut client = RunningClient::start(&server, Some("dave"));
    client.next_event().await;
    client.next_event().await;
    client.next_event().await;

    client.close_input();

    client.expect_disconnect().await;
    client.finish().await;
    server.wait_until_gone("dave").await;
}

#[tokio::test]
async fn test_server_shutdown_reports_disconnect() {
    let server = TestServer::start().await;
    let mut client = RunningClient::start(&server, Some("erin"));
    client.next_event().await;
    client.next_event().await;
    client.next_event().await;

    server.cancel_token.cancel();

    client.expect_disconnect().await;
    client.finish().await;
}

#[tokio::test]
async fn test_cancel_stops_client() {
    let server = TestServer::start().await;
    let mut client = RunningClient::start(&server, Some("frank"));
    client.next_event().await;

    client.cancel_token.cancel();
    client.finish().await;
}

#[tokio::test]
async fn test_two_clients_exchange_private_messages() {
    let server = TestServer::start().await;
    let mut alice = RunningClient::start(&server, Some("alice"));
    alice.next_event().await;
    alice.expect_line("Enter your username:").await;
    alice.expect_line("🔔 alice joined the chat. 👥 (1 online)").await;

    let mut bob = RunningClient::start(&server, Some("bob"));
    bob.next_event().await;
    bob.expect_line("Enter your username:").await;
    bob.expect_line("🔔 bob joined the chat. 👥 (2 online)").await;
    alice.expect_line("🔔 bob joined the chat. 👥 (2 online)").await;

    bob.type_line("@alice psst").await;
    alice.expect_line("🕵️ (PM) bob: psst").await;
    bob.expect_line("🕵️ (PM) bob: psst").await;
}
