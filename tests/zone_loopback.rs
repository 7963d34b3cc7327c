//! Tier 2: Real UDP/TCP loopback integration tests.
//!
//! These tests start the full `DnsServer` on an ephemeral loopback port with
//! static collaborators, and send real DNS queries to it.
//!
//! **Requires:**
//! - Permission to bind 127.0.0.1
//! - Feature flag: `integration-loopback`
//!
//! Run with:
//! ```sh
//! cargo test --test zone_loopback --features integration-loopback -- --test-threads=1
//! ```

#![cfg(feature = "integration-loopback")]

mod common;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use cirrid::address::StaticProbe;
use cirrid::platform::NoopReconciler;
use cirrid::reconcile::StaticIdentity;
use cirrid::{Config, DnsServer};
use hickory_proto::op::Message;
use hickory_proto::rr::RecordType;
use hickory_server::ServerFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;

use common::*;

// =========================================================================
// Infrastructure
// =========================================================================

/// A responder running on a random UDP port.
struct TestServer {
    port: u16,
    _shutdown: tokio::sync::oneshot::Sender<()>,
}

impl TestServer {
    async fn start(state: cirrid::DnsState) -> Self {
        let udp_socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("failed to bind UDP socket");
        let port = udp_socket
            .local_addr()
            .expect("failed to get local addr")
            .port();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut server = ServerFuture::new(cirrid::ZoneResponder::new(state));
            server.register_socket(udp_socket);

            tokio::select! {
                result = server.block_until_done() => {
                    if let Err(e) = result {
                        eprintln!("server error: {}", e);
                    }
                }
                _ = rx => {}
            }
        });

        // Give the server a moment to start accepting packets.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            port,
            _shutdown: tx,
        }
    }
}

/// Send a DNS query over UDP and return the parsed response.
async fn query_udp(server_port: u16, name: &str, record_type: RecordType, id: u16) -> Message {
    let sock = UdpSocket::bind("127.0.0.1:0")
        .await
        .expect("failed to bind client socket");

    let dest: SocketAddr = format!("127.0.0.1:{}", server_port).parse().unwrap();
    let query_bytes = build_query_bytes(name, record_type, id);

    sock.send_to(&query_bytes, dest)
        .await
        .expect("failed to send query");

    let mut buf = vec![0u8; 4096];
    let timeout = Duration::from_secs(5);
    let len = tokio::time::timeout(timeout, sock.recv(&mut buf))
        .await
        .expect("query timed out")
        .expect("failed to recv response");

    Message::from_vec(&buf[..len]).expect("failed to parse DNS response")
}

/// Send a DNS query over TCP (length-prefixed) and return the parsed response.
async fn query_tcp(server_port: u16, name: &str, record_type: RecordType, id: u16) -> Message {
    let dest: SocketAddr = format!("127.0.0.1:{}", server_port).parse().unwrap();
    let mut stream = TcpStream::connect(dest).await.expect("failed to connect");

    let query_bytes = build_query_bytes(name, record_type, id);
    stream
        .write_all(&(query_bytes.len() as u16).to_be_bytes())
        .await
        .unwrap();
    stream.write_all(&query_bytes).await.unwrap();

    let timeout = Duration::from_secs(5);
    let mut len_buf = [0u8; 2];
    tokio::time::timeout(timeout, stream.read_exact(&mut len_buf))
        .await
        .expect("query timed out")
        .expect("failed to read length");
    let mut buf = vec![0u8; u16::from_be_bytes(len_buf) as usize];
    stream.read_exact(&mut buf).await.expect("failed to read response");

    Message::from_vec(&buf).expect("failed to parse DNS response")
}

/// Pick a free loopback port for a server that binds both UDP and TCP.
async fn free_port() -> u16 {
    let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    sock.local_addr().unwrap().port()
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn loopback_wildcard_answer() {
    let server = TestServer::start(zone_wildcard_state()).await;

    let msg = query_udp(server.port, "data.ona.im.", RecordType::A, 1).await;
    assert_a_answer(&msg, ZONE_ADDR);

    let msg = query_udp(server.port, "ona.im.", RecordType::A, 2).await;
    assert_empty_answer(&msg);

    let msg = query_udp(server.port, "data.ona.im.", RecordType::AAAA, 3).await;
    assert_empty_answer(&msg);
}

#[tokio::test]
async fn loopback_full_server_lifecycle() {
    let port = free_port().await;
    let mut config = Config::parse_str(
        "zone = ona.im\nask_workload = false\nuse_hostname = true\n[hosts]\napi = 10.0.0.5\n",
        config::FileFormat::Ini,
    )
    .unwrap();
    config.dns.listen_addr = SocketAddr::from(([127, 0, 0, 1], port));
    config.dns.manage_resolver = false;

    let server = DnsServer::with_collaborators(
        config,
        Arc::new(StaticProbe::default()),
        Arc::new(StaticIdentity {
            hostname: Some("box1".to_string()),
            workload: None,
        }),
        Arc::new(NoopReconciler),
    );

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(server.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let msg = query_udp(port, "api.ona.im.", RecordType::A, 10).await;
    assert_a_answer(&msg, Ipv4Addr::new(10, 0, 0, 5));

    let msg = query_tcp(port, "www.box1.ona.im.", RecordType::A, 11).await;
    assert_a_answer(&msg, Ipv4Addr::new(172, 17, 0, 1));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .expect("server task panicked")
        .expect("server returned an error");
}
