#![allow(dead_code)]

use std::net::TcpListener;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use relq_sdk::{Client, DeliveredMessage, ReceiveOptions};

/// A running `relq-server` instance for e2e testing.
///
/// Spawns the server binary on a random port against the database named by
/// `TEST_DATABASE_URL`, with a 1-second sweeper interval so reclaim and DLQ
/// scenarios stay fast. The server is killed when this struct is dropped.
pub struct TestServer {
    child: Option<Child>,
    addr: String,
}

/// Sweeper period the test server runs with, in seconds.
pub const SWEEP_INTERVAL_SECS: u64 = 1;

impl TestServer {
    /// Start a server, or return `None` when `TEST_DATABASE_URL` is unset
    /// (the calling test should skip itself).
    pub fn start() -> Option<Self> {
        let database_url = std::env::var("TEST_DATABASE_URL").ok()?;

        let port = free_port();
        let addr = format!("127.0.0.1:{port}");

        let binary = server_binary();
        assert!(
            binary.exists(),
            "relq-server binary not found at {binary:?}. Run `cargo build -p relq-server` first."
        );

        let child = Command::new(&binary)
            .env("DATABASE_URL", database_url)
            .env("PORT", port.to_string())
            .env("SWEEP_INTERVAL", SWEEP_INTERVAL_SECS.to_string())
            .env("LOG_LEVEL", "info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("start relq-server");

        // Poll TCP until the server is reachable.
        let start = std::time::Instant::now();
        let mut connected = false;
        while start.elapsed() < Duration::from_secs(10) {
            if std::net::TcpStream::connect(&addr).is_ok() {
                connected = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(
            connected,
            "relq-server did not become reachable at {addr} within 10s"
        );

        Some(Self {
            child: Some(child),
            addr: format!("http://{addr}"),
        })
    }

    /// The HTTP address of the running server.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn client(&self) -> Client {
        Client::new(self.addr())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// A queue name unique to this test invocation, so suites can share a
/// database without interfering.
pub fn unique_queue(prefix: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock before epoch")
        .as_nanos();
    format!("{prefix}-{}-{nanos}", std::process::id())
}

/// Poll a queue until a message shows up or the deadline passes. Returns
/// the claimed batch (empty on timeout).
pub async fn receive_within(
    client: &Client,
    queue: &str,
    opts: ReceiveOptions,
    deadline: Duration,
) -> Vec<DeliveredMessage> {
    let start = std::time::Instant::now();
    loop {
        let messages = client
            .receive(queue, opts.clone())
            .await
            .expect("receive failed");
        if !messages.is_empty() || start.elapsed() > deadline {
            return messages;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Find a free TCP port.
fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind to free port");
    listener.local_addr().unwrap().port()
}

/// Resolve the path to the relq-server binary in the workspace target dir.
fn server_binary() -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.pop(); // crates/
    path.pop(); // workspace root
    path.push("target");
    path.push("debug");
    path.push("relq-server");
    path
}
