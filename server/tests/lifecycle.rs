//! Bind/run/stop lifecycle, exercised against a real (ephemeral-port)
//! socket rather than the well-known DHCP ports, since those require
//! privileges the test environment may not have. Protocol state-machine
//! behavior (S1-S6) is covered by `dhcp_server`'s own engine unit tests.

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use dhcp_server::{Server, ServerConfig, TestClock};

fn config() -> ServerConfig {
    ServerConfig {
        endpoint: "127.0.0.1:0".parse().unwrap(),
        pool_start: Ipv4Addr::new(192, 168, 1, 10),
        pool_end: Ipv4Addr::new(192, 168, 1, 12),
        default_lease_time: 60,
        minimum_packet_size: 312,
        options: Vec::new(),
        initial_leases: Vec::new(),
        server_identifier: Some(Ipv4Addr::new(192, 168, 1, 1)),
        broadcast_address: None,
        accept_out_of_range: true,
    }
}

#[tokio::test]
async fn stop_unblocks_a_waiting_run_loop() {
    let clock = Arc::new(TestClock::new(0));
    let (server, _lease_events) = Server::bind_with_clock(config(), clock).unwrap();
    let mut status = server.subscribe_status();

    let server = Arc::new(server);
    let runner = {
        let server = server.clone();
        tokio::spawn(async move { server.run().await })
    };

    // Give the receive loop a moment to actually start waiting.
    tokio::time::sleep(Duration::from_millis(20)).await;
    server.stop();

    tokio::time::timeout(Duration::from_secs(1), runner)
        .await
        .expect("run() did not return promptly after stop()")
        .unwrap();

    let change = status.recv().await.unwrap();
    assert!(!change.active);
    assert!(change.reason.is_none());
}
