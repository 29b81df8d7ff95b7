//! Server configuration (§6, §10.3).
//!
//! The teacher's `Server::new` took address ranges, subnet mask,
//! routers and DNS servers as direct constructor arguments; this
//! generalizes that into a single struct so the core stays agnostic of
//! where the values come from (CLI flags, a file, hardcoded in a test).

use std::net::{Ipv4Addr, SocketAddr};

use dhcp_protocol::OptionTag;

use crate::lease::Lease;

/// Whether a configured option is always sent, or only echoed back
/// when the client's Parameter Request List asks for it (§4.4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionMode {
    Force,
    Optional,
}

/// A single operator-configured option to apply to OFFER/ACK/INFORMACK
/// replies (§6 `options`).
#[derive(Debug, Clone)]
pub struct ConfiguredOption {
    pub tag: OptionTag,
    pub value: Vec<u8>,
    pub mode: OptionMode,
}

/// Everything the core needs at construction (§6).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address and port; conventionally `0.0.0.0:67`.
    pub endpoint: SocketAddr,
    /// Inclusive address range managed by the pool. A caller parsing this
    /// out of a config file or CLI flag can turn a textual range or CIDR
    /// block into these bounds with `crate::pool::AddressPool::parse_range`.
    pub pool_start: Ipv4Addr,
    pub pool_end: Ipv4Addr,
    /// Seconds; zero disables auto-expiry.
    pub default_lease_time: u32,
    /// Floor is `dhcp_protocol::SIZE_MESSAGE_FLOOR`; values below it
    /// are clamped up by the wire codec.
    pub minimum_packet_size: usize,
    pub options: Vec<ConfiguredOption>,
    /// Bulk-loaded at construction; each address is validated against
    /// the pool before being accepted (§4.3 `load`).
    pub initial_leases: Vec<Lease>,
    /// Option 54; defaults to the bound endpoint's address when unset.
    pub server_identifier: Option<Ipv4Addr>,
    /// Option 28; defaults to the limited broadcast address.
    pub broadcast_address: Option<Ipv4Addr>,
    /// SPEC_FULL.md §9, open question (a): whether `allocate_specific`
    /// accepts an address outside `pool_start..=pool_end`.
    pub accept_out_of_range: bool,
}

impl ServerConfig {
    pub fn broadcast_address(&self) -> Ipv4Addr {
        self.broadcast_address.unwrap_or(Ipv4Addr::BROADCAST)
    }
}
