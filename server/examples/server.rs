use std::net::{Ipv4Addr, SocketAddr};

use dhcp_server::{AddressPool, ConfiguredOption, OptionMode, Server, ServerConfig};

#[tokio::main]
async fn main() {
    env_logger::init();

    let (pool_start, pool_end) =
        AddressPool::parse_range("192.168.0.101-192.168.0.200").expect("invalid pool range");

    let config = ServerConfig {
        endpoint: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 67),
        pool_start,
        pool_end,
        default_lease_time: 86400,
        minimum_packet_size: 576,
        options: vec![
            ConfiguredOption {
                tag: dhcp_protocol::OptionTag::SubnetMask,
                value: Ipv4Addr::new(255, 255, 0, 0).octets().to_vec(),
                mode: OptionMode::Force,
            },
            ConfiguredOption {
                tag: dhcp_protocol::OptionTag::HostName,
                value: b"dhcp-server".to_vec(),
                mode: OptionMode::Optional,
            },
        ],
        initial_leases: Vec::new(),
        server_identifier: Some(Ipv4Addr::new(192, 168, 0, 12)),
        broadcast_address: None,
        accept_out_of_range: true,
    };

    let (server, mut lease_events) = Server::bind(config).expect("failed to bind DHCP socket");

    tokio::spawn(async move {
        while let Ok(event) = lease_events.recv().await {
            log::info!("lease event: {:?}", event);
        }
    });

    server.run().await;
}
