//! The protocol engine (§4.4).
//!
//! Owns both the lease table and the address pool, so the two can be
//! coordinated without either holding a back-pointer into the other
//! (§9, "cyclic owner/owned relationship"). `leases_sync` serializes
//! end-to-end handling of one datagram; the table and pool each carry
//! their own finer-grained lock underneath it (§5).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use dhcp_framed::DhcpFramed;
use dhcp_protocol::{HwAddr, Message, MessageType, OperationCode, DHCP_PORT_CLIENT, DHCP_PORT_SERVER};
use tokio::sync::Mutex as AsyncMutex;

use crate::clock::Clock;
use crate::config::{OptionMode, ServerConfig};
use crate::lease::{Lease, LeaseStatus};
use crate::pool::AddressPool;
use crate::table::{LeaseTable, LeaseUpdate};

pub struct Engine {
    config: ServerConfig,
    server_identifier: Ipv4Addr,
    /// Echoed in the BOOTP `sname` field of every reply; best-effort,
    /// falls back to empty when the host's name is unavailable or not
    /// representable as UTF-8 (§10.3).
    server_name: String,
    pool: AddressPool,
    table: LeaseTable,
    clock: Arc<dyn Clock>,
    /// Held for the duration of parsing through reply-send for a single
    /// datagram (§5, `leases_sync`).
    leases_sync: AsyncMutex<()>,
}

impl Engine {
    pub fn new(
        config: ServerConfig,
        server_identifier: Ipv4Addr,
        clock: Arc<dyn Clock>,
    ) -> (Self, tokio::sync::broadcast::Receiver<crate::events::LeaseEvent>) {
        let (table, lease_events) = LeaseTable::new(config.default_lease_time);
        let pool = AddressPool::new(config.pool_start, config.pool_end, config.accept_out_of_range);
        let initial_leases = config.initial_leases.clone();

        let server_name = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_default();

        let engine = Engine {
            config,
            server_identifier,
            server_name,
            pool,
            table,
            clock,
            leases_sync: AsyncMutex::new(()),
        };
        engine.load_initial_leases(initial_leases);
        (engine, lease_events)
    }

    pub fn subscribe_lease_events(&self) -> tokio::sync::broadcast::Receiver<crate::events::LeaseEvent> {
        self.table.subscribe()
    }

    /// Bulk-loads leases supplied at construction (§4.3 `load`), after
    /// first reserving each one's address against the pool; a dynamic
    /// lease whose address the pool will not reserve is skipped. A
    /// static lease is always kept (it is exempt from pool bookkeeping
    /// by definition, §4.4.8), but its address is still removed from
    /// the free set when it falls inside the dynamic range, so a later
    /// DISCOVER cannot also hand it out (§8 invariant 1).
    fn load_initial_leases(&self, leases: Vec<Lease>) {
        let mut accepted = Vec::with_capacity(leases.len());
        for lease in leases {
            if lease.is_static {
                if self.pool.in_range(lease.address) {
                    self.pool.allocate_specific(lease.address);
                }
                accepted.push(lease);
            } else if self.pool.allocate_specific(lease.address) {
                accepted.push(lease);
            } else {
                log::warn!("dropping initial lease for {}: address unavailable", lease.hwaddr);
            }
        }
        self.table.load(accepted);
    }

    // ---- administrative query/mutation interface (§4.3, §6) ----

    pub fn get_by_hwaddr(&self, hwaddr: &HwAddr) -> Option<Lease> {
        self.table.get_by_hwaddr(hwaddr)
    }

    pub fn get_by_address(&self, address: Ipv4Addr) -> Option<Lease> {
        self.table.get_by_address(address)
    }

    pub fn snapshot(&self) -> Vec<Lease> {
        self.table.snapshot()
    }

    /// Pins a lease to `address` outside the ordinary DISCOVER/REQUEST
    /// flow, e.g. a reservation an operator configures out of band
    /// (§4.3 `make_static`). Reconciles the pool's free set around the
    /// reassignment so the address can't also be handed out dynamically
    /// (§8 invariant 1): the previous address, if any and if different,
    /// is freed, and the new one is reserved when it falls in range.
    pub fn make_static(&self, hwaddr: &HwAddr, address: Ipv4Addr) -> Result<Lease, crate::error::Error> {
        let previous = self.table.get_by_hwaddr(hwaddr).map(|lease| lease.address);
        let lease = self.table.make_static(hwaddr, address)?;
        if previous != Some(address) {
            if let Some(previous) = previous {
                self.pool.mark_unused(previous);
            }
            if self.pool.in_range(address) {
                self.pool.allocate_specific(address);
            }
        }
        Ok(lease)
    }

    pub fn make_dynamic(&self, hwaddr: &HwAddr) -> Result<Lease, crate::error::Error> {
        self.table.make_dynamic(hwaddr)
    }

    /// Runs the 1-second expiry sweep once (§4.3 "Expiry sweeper").
    /// Intended to be called from a periodic timer task.
    pub fn sweep(&self) {
        let now = self.clock.now();
        let transitioned = self.table.transition_expired_to_released(now);
        if transitioned > 0 {
            log::debug!("sweeper released {} expired lease(s)", transitioned);
        }
    }

    /// Parses and dispatches a single inbound datagram, sending any
    /// reply through `transport` (§4.4 "Entry point").
    pub async fn handle_datagram(&self, transport: &DhcpFramed, bytes: &[u8]) {
        let request = match Message::decode(bytes) {
            Ok(message) => message,
            Err(err) => {
                log::warn!("dropping malformed datagram: {}", err);
                return;
            }
        };

        if request.operation_code != OperationCode::BootRequest {
            return;
        }
        let message_type = match request.options.message_type {
            Some(message_type) => message_type,
            None => {
                log::trace!("dropping request with no message type option");
                return;
            }
        };

        log::trace!("received {} from {}", message_type, request.client_hardware_address);

        let guard = self.leases_sync.lock().await;
        let reply = match message_type {
            MessageType::Discover => self.handle_discover(&request),
            MessageType::Request => self.handle_request(&request),
            MessageType::Decline => {
                self.handle_decline(&request);
                None
            }
            MessageType::Release => {
                self.handle_release(&request);
                None
            }
            MessageType::Inform => self.handle_inform(&request),
            MessageType::Offer | MessageType::Ack | MessageType::Nak => None,
        };
        drop(guard);

        if let Some((message, destination)) = reply {
            log::trace!("sending {} to {}", message, destination);
            let bytes = message.encode(self.config.minimum_packet_size);
            if let Err(err) = transport.send_to(destination, &bytes).await {
                log::warn!("failed to send reply to {}: {}", destination, err);
            }
        }
    }

    // ---- message-type handlers (§4.4.1 - §4.4.5) ----

    fn handle_discover(&self, request: &Message) -> Option<(Message, SocketAddr)> {
        let hwaddr = &request.client_hardware_address;
        let now = self.clock.now();

        let existing = self.table.get_by_hwaddr(hwaddr);
        let (address, lease_time) = match &existing {
            Some(lease) => (lease.address, lease.lease_time),
            None => match self.allocate_any(now) {
                Some(address) => (address, self.config.default_lease_time),
                None => {
                    log::debug!("pool exhausted, dropping DISCOVER from {}", hwaddr);
                    return None;
                }
            },
        };

        self.table.create(hwaddr.clone());
        let lease = self
            .table
            .update(
                hwaddr,
                LeaseUpdate {
                    address,
                    status: LeaseStatus::Offered,
                    lease_time,
                    start: now,
                    hostname: request.options.hostname.clone(),
                    client_id: request.options.client_identifier.clone(),
                    options: request.options.unrecognized.clone(),
                },
            )
            .ok()?;

        Some(self.build_offer(request, &lease))
    }

    fn handle_request(&self, request: &Message) -> Option<(Message, SocketAddr)> {
        let hwaddr = &request.client_hardware_address;
        if let Some(server_identifier) = request.options.server_identifier {
            self.handle_request_selecting(request, hwaddr, server_identifier)
        } else if request.client_ip_address != Ipv4Addr::UNSPECIFIED {
            self.handle_request_renewing(request, hwaddr, request.client_ip_address)
        } else if let Some(requested) = request.options.requested_ip_address {
            self.handle_request_init_reboot(request, hwaddr, requested)
        } else {
            // (d) malformed INIT-REBOOT: neither ciaddr nor opt 50 present.
            None
        }
    }

    /// (a) SELECTING: a reply to our own or another server's OFFER.
    fn handle_request_selecting(
        &self,
        request: &Message,
        hwaddr: &HwAddr,
        server_identifier: Ipv4Addr,
    ) -> Option<(Message, SocketAddr)> {
        if server_identifier != self.server_identifier {
            if let Some(lease) = self.table.get_by_hwaddr(hwaddr) {
                if lease.status == LeaseStatus::Offered {
                    self.remove_and_free(hwaddr);
                }
            }
            return None;
        }

        match self.table.get_by_hwaddr(hwaddr) {
            Some(lease) if lease.status == LeaseStatus::Offered => {
                if request.options.requested_ip_address == Some(lease.address) {
                    let now = self.clock.now();
                    let updated = self
                        .table
                        .update(
                            hwaddr,
                            LeaseUpdate {
                                address: lease.address,
                                status: LeaseStatus::Bound,
                                lease_time: lease.lease_time,
                                start: now,
                                hostname: request.options.hostname.clone(),
                                client_id: request.options.client_identifier.clone(),
                                options: request.options.unrecognized.clone(),
                            },
                        )
                        .ok()?;
                    Some(self.build_ack(request, &updated))
                } else {
                    self.remove_and_free(hwaddr);
                    Some(self.build_nak(request))
                }
            }
            _ => Some(self.build_nak(request)),
        }
    }

    /// (b) RENEWING / REBINDING: `ciaddr` is set and opt 54 is absent.
    fn handle_request_renewing(
        &self,
        request: &Message,
        hwaddr: &HwAddr,
        ciaddr: Ipv4Addr,
    ) -> Option<(Message, SocketAddr)> {
        let now = self.clock.now();
        match self.table.get_by_hwaddr(hwaddr) {
            Some(lease) if lease.address == ciaddr => {
                let updated = self
                    .table
                    .update(
                        hwaddr,
                        LeaseUpdate {
                            address: ciaddr,
                            status: LeaseStatus::Bound,
                            lease_time: lease.lease_time,
                            start: now,
                            hostname: request.options.hostname.clone(),
                            client_id: request.options.client_identifier.clone(),
                            options: request.options.unrecognized.clone(),
                        },
                    )
                    .ok()?;
                Some(self.build_ack(request, &updated))
            }
            Some(lease) if lease.is_static => Some(self.build_nak(request)),
            Some(_) => {
                self.remove_and_free(hwaddr);
                self.create_at(hwaddr, ciaddr, LeaseStatus::Bound, now, request).map(|lease| self.build_ack(request, &lease))
            }
            None => {
                // Design decision (SPEC_FULL.md §9): OFFER, not ACK, forces
                // the client back through SELECTING.
                match self.create_at(hwaddr, ciaddr, LeaseStatus::Offered, now, request) {
                    Some(lease) => Some(self.build_offer(request, &lease)),
                    None => Some(self.build_nak(request)),
                }
            }
        }
    }

    /// (c) INIT-REBOOT: `ciaddr` zero, opt 50 present.
    fn handle_request_init_reboot(
        &self,
        request: &Message,
        hwaddr: &HwAddr,
        requested: Ipv4Addr,
    ) -> Option<(Message, SocketAddr)> {
        let now = self.clock.now();
        match self.table.get_by_hwaddr(hwaddr) {
            Some(lease) if lease.status == LeaseStatus::Bound && lease.address == requested => {
                let updated = self
                    .table
                    .update(
                        hwaddr,
                        LeaseUpdate {
                            address: requested,
                            status: LeaseStatus::Bound,
                            lease_time: lease.lease_time,
                            start: now,
                            hostname: request.options.hostname.clone(),
                            client_id: request.options.client_identifier.clone(),
                            options: request.options.unrecognized.clone(),
                        },
                    )
                    .ok()?;
                Some(self.build_ack(request, &updated))
            }
            _ => {
                self.remove_and_free(hwaddr);
                Some(self.build_nak(request))
            }
        }
    }

    fn handle_decline(&self, request: &Message) {
        if request.options.server_identifier != Some(self.server_identifier) {
            return;
        }
        self.remove_and_free(&request.client_hardware_address);
    }

    fn handle_release(&self, request: &Message) {
        if request.options.server_identifier != Some(self.server_identifier) {
            return;
        }
        let hwaddr = &request.client_hardware_address;
        let Some(lease) = self.table.get_by_hwaddr(hwaddr) else {
            return;
        };
        if request.client_ip_address == lease.address {
            let _ = self.table.update(
                hwaddr,
                LeaseUpdate {
                    address: lease.address,
                    status: LeaseStatus::Released,
                    lease_time: lease.lease_time,
                    start: lease.start,
                    hostname: lease.hostname.clone(),
                    client_id: lease.client_id.clone(),
                    options: lease.options.clone(),
                },
            );
        } else {
            self.remove_and_free(hwaddr);
        }
    }

    fn handle_inform(&self, request: &Message) -> Option<(Message, SocketAddr)> {
        let mut reply = self.base_reply(request);
        reply.options.message_type = Some(MessageType::Ack);
        reply.options.server_identifier = Some(self.server_identifier);
        self.merge_configured_options(&mut reply, request);
        let destination = SocketAddr::new(IpAddr::V4(request.client_ip_address), DHCP_PORT_CLIENT);
        Some((reply, destination))
    }

    // ---- shared helpers ----

    /// Creates and binds a fresh lease to `address` for a client with no
    /// prior record, used by the RENEWING no-lease path (§4.4.2b).
    fn create_at(
        &self,
        hwaddr: &HwAddr,
        address: Ipv4Addr,
        status: LeaseStatus,
        now: i64,
        request: &Message,
    ) -> Option<Lease> {
        if !self.reserve_specific(address) {
            return None;
        }
        self.table.create(hwaddr.clone());
        self.table
            .update(
                hwaddr,
                LeaseUpdate {
                    address,
                    status,
                    lease_time: self.config.default_lease_time,
                    start: now,
                    hostname: request.options.hostname.clone(),
                    client_id: request.options.client_identifier.clone(),
                    options: request.options.unrecognized.clone(),
                },
            )
            .ok()
    }

    /// Reserves `address` specifically, falling back to evicting a
    /// `Released`, non-static lease that currently holds it when the
    /// pool's free set doesn't have it (§4.2 `allocate_specific`, second
    /// branch — "if a lease holds addr and is non-static and Released,
    /// evict that lease and return addr").
    fn reserve_specific(&self, address: Ipv4Addr) -> bool {
        if self.pool.allocate_specific(address) {
            return true;
        }
        if self.table.evict_if_released(address).is_none() {
            return false;
        }
        self.pool.mark_unused(address);
        self.pool.allocate_specific(address)
    }

    /// A no-op when the lease is static or already absent — a static
    /// reservation survives DECLINE, a bad RELEASE, or a rejected
    /// REQUEST (§4.3 `remove`, `StaticViolation`).
    fn remove_and_free(&self, hwaddr: &HwAddr) -> Option<Lease> {
        let removed = self.table.remove(hwaddr).ok()?;
        self.pool.mark_unused(removed.address);
        Some(removed)
    }

    /// `allocate_any`, falling back to evicting the oldest expired
    /// non-static lease when the pool has nothing free (§4.2).
    fn allocate_any(&self, now: i64) -> Option<Ipv4Addr> {
        if let Some(address) = self.pool.allocate_any() {
            return Some(address);
        }
        let freed = self.table.evict_oldest_expired(now)?;
        self.pool.mark_unused(freed);
        self.pool.allocate_specific(freed).then_some(freed)
    }

    fn base_reply(&self, request: &Message) -> Message {
        Message {
            operation_code: OperationCode::BootReply,
            hardware_type: request.hardware_type,
            hardware_address_length: request.hardware_address_length,
            hops: 0,
            transaction_id: request.transaction_id,
            seconds: request.seconds,
            is_broadcast: request.is_broadcast,
            client_ip_address: Ipv4Addr::UNSPECIFIED,
            your_ip_address: Ipv4Addr::UNSPECIFIED,
            server_ip_address: self.server_identifier,
            gateway_ip_address: request.gateway_ip_address,
            client_hardware_address: request.client_hardware_address.clone(),
            server_name: self.server_name.clone(),
            boot_filename: String::new(),
            options: dhcp_protocol::Options::default(),
        }
    }

    fn build_offer(&self, request: &Message, lease: &Lease) -> (Message, SocketAddr) {
        let mut reply = self.base_reply(request);
        reply.your_ip_address = lease.address;
        reply.options.message_type = Some(MessageType::Offer);
        reply.options.server_identifier = Some(self.server_identifier);
        reply.options.lease_time = Some(lease.lease_time);
        self.merge_configured_options(&mut reply, request);
        (reply, self.offer_ack_destination(request))
    }

    fn build_ack(&self, request: &Message, lease: &Lease) -> (Message, SocketAddr) {
        let mut reply = self.base_reply(request);
        reply.your_ip_address = lease.address;
        reply.options.message_type = Some(MessageType::Ack);
        reply.options.server_identifier = Some(self.server_identifier);
        reply.options.lease_time = Some(lease.lease_time);
        self.merge_configured_options(&mut reply, request);
        (reply, self.offer_ack_destination(request))
    }

    /// NAK carries only the server identifier, and optionally the
    /// subnet mask if the operator configured one (§4.4.6).
    fn build_nak(&self, request: &Message) -> (Message, SocketAddr) {
        let mut reply = self.base_reply(request);
        reply.options.message_type = Some(MessageType::Nak);
        reply.options.server_identifier = Some(self.server_identifier);
        (reply, self.nak_destination(request))
    }

    /// Merges operator-configured options into an OFFER/ACK/INFORMACK
    /// reply: `Force` options always, `Optional` ones only if the
    /// client's Parameter Request List asked for them (§4.4.6).
    fn merge_configured_options(&self, reply: &mut Message, request: &Message) {
        let requested = request.options.parameter_request_list.as_deref().unwrap_or(&[]);
        for option in &self.config.options {
            let code = option.tag as u8;
            if reply.options.contains_code(code) {
                continue;
            }
            let include = option.mode == OptionMode::Force || requested.contains(&code);
            if include {
                reply.options.push_raw(code, option.value.clone());
            }
        }
    }

    fn offer_ack_destination(&self, request: &Message) -> SocketAddr {
        if request.gateway_ip_address != Ipv4Addr::UNSPECIFIED {
            SocketAddr::new(IpAddr::V4(request.gateway_ip_address), DHCP_PORT_SERVER)
        } else if request.client_ip_address != Ipv4Addr::UNSPECIFIED {
            SocketAddr::new(IpAddr::V4(request.client_ip_address), DHCP_PORT_CLIENT)
        } else {
            SocketAddr::new(IpAddr::V4(self.config.broadcast_address()), DHCP_PORT_CLIENT)
        }
    }

    fn nak_destination(&self, request: &Message) -> SocketAddr {
        if request.gateway_ip_address != Ipv4Addr::UNSPECIFIED {
            SocketAddr::new(IpAddr::V4(request.gateway_ip_address), DHCP_PORT_SERVER)
        } else {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), DHCP_PORT_CLIENT)
        }
    }
}
