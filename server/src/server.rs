//! Top-level server: wires the transport, the engine and the sweeper
//! together and owns the run/stop lifecycle (§5 "Cancellation").

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dhcp_framed::DhcpFramed;
use tokio::sync::{broadcast, Notify};

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::engine::Engine;
use crate::error::Error;
use crate::events::{LeaseEvent, StatusChange};
use crate::lease::Lease;
use dhcp_protocol::HwAddr;

/// How often the expiry sweeper runs (§4.3).
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct Server {
    engine: Arc<Engine>,
    transport: Arc<DhcpFramed>,
    running: Arc<AtomicBool>,
    stop_signal: Arc<Notify>,
    status: broadcast::Sender<StatusChange>,
}

impl Server {
    /// Binds the transport and constructs the engine. `server_identifier`
    /// falls back to the bound endpoint's address if the config did not
    /// set one (§4.4 "Server identity").
    pub fn bind(config: ServerConfig) -> std::io::Result<(Self, broadcast::Receiver<LeaseEvent>)> {
        Self::bind_with_clock(config, Arc::new(SystemClock))
    }

    pub fn bind_with_clock(
        config: ServerConfig,
        clock: Arc<dyn Clock>,
    ) -> std::io::Result<(Self, broadcast::Receiver<LeaseEvent>)> {
        let transport = DhcpFramed::bind(config.endpoint)?;
        let server_identifier = config.server_identifier.unwrap_or(match transport.local_addr()?.ip() {
            std::net::IpAddr::V4(address) => address,
            std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
        });

        let (engine, lease_events) = Engine::new(config, server_identifier, clock);
        let (status, _) = broadcast::channel(16);

        Ok((
            Server {
                engine: Arc::new(engine),
                transport: Arc::new(transport),
                running: Arc::new(AtomicBool::new(false)),
                stop_signal: Arc::new(Notify::new()),
                status,
            },
            lease_events,
        ))
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusChange> {
        self.status.subscribe()
    }

    // ---- lease query/mutation interface (§6 "a lease query/mutation interface") ----

    pub fn get_lease_by_hwaddr(&self, hwaddr: &HwAddr) -> Option<Lease> {
        self.engine.get_by_hwaddr(hwaddr)
    }

    pub fn get_lease_by_address(&self, address: Ipv4Addr) -> Option<Lease> {
        self.engine.get_by_address(address)
    }

    pub fn lease_snapshot(&self) -> Vec<Lease> {
        self.engine.snapshot()
    }

    pub fn make_static(&self, hwaddr: &HwAddr, address: Ipv4Addr) -> Result<Lease, Error> {
        self.engine.make_static(hwaddr, address)
    }

    pub fn make_dynamic(&self, hwaddr: &HwAddr) -> Result<Lease, Error> {
        self.engine.make_dynamic(hwaddr)
    }

    /// The address actually bound, useful when `config.endpoint` asked
    /// for an ephemeral port (tests).
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the receive loop and the sweeper until `stop` is called or
    /// the socket fails. Returns once both workers have exited.
    pub async fn run(&self) {
        self.running.store(true, Ordering::SeqCst);
        log::info!("DHCP server listening");

        let sweeper = {
            let engine = self.engine.clone();
            let stop_signal = self.stop_signal.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => engine.sweep(),
                        _ = stop_signal.notified() => break,
                    }
                }
            })
        };

        let mut shutdown_reason = None;
        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                received = self.transport.recv() => match received {
                    Ok((_from, bytes)) => {
                        self.engine.handle_datagram(&self.transport, &bytes).await;
                    }
                    Err(err) => {
                        log::error!("socket failure, shutting down: {}", err);
                        shutdown_reason = Some(err.to_string());
                        break;
                    }
                },
                _ = self.stop_signal.notified() => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
        let _ = sweeper.await;

        let _ = self.status.send(StatusChange {
            active: false,
            reason: shutdown_reason,
        });
    }

    /// Requests shutdown; `run`'s receive loop wakes immediately rather
    /// than waiting for another datagram (§5 "Cancellation").
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_signal.notify_waiters();
    }
}
