//! Lease record implementation (§3).

use std::net::Ipv4Addr;

use dhcp_protocol::HwAddr;

/// Where a lease sits in the lifecycle described in §3's "Lifecycle" note
/// and the state machine of §4.4.8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseStatus {
    Created,
    Offered,
    Bound,
    Released,
}

/// A single client's binding to an address.
///
/// Cloned out of the table for every query and every event (§4.3,
/// "Event emission") so callers never hold a reference into the live
/// table.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub hwaddr: HwAddr,
    pub client_id: Option<Vec<u8>>,
    pub hostname: Option<String>,
    pub address: Ipv4Addr,
    pub status: LeaseStatus,
    pub is_static: bool,
    /// Seconds; zero disables auto-expiry (an infinite lease).
    pub lease_time: u32,
    /// Unix timestamps, valid while `status` is `Offered` or `Bound`.
    pub start: i64,
    pub end: i64,
    /// Option items associated with this lease, carried informationally.
    pub options: Vec<(u8, Vec<u8>)>,
}

impl Lease {
    /// A freshly `Created` record with no address yet, per §4.3 `create`.
    pub fn new(hwaddr: HwAddr, default_lease_time: u32) -> Self {
        Lease {
            hwaddr,
            client_id: None,
            hostname: None,
            address: Ipv4Addr::UNSPECIFIED,
            status: LeaseStatus::Created,
            is_static: false,
            lease_time: default_lease_time,
            start: 0,
            end: 0,
            options: Vec::new(),
        }
    }

    /// True once `lease_time` is non-zero and `end` has passed `now`.
    ///
    /// A zero `lease_time` is an infinite lease and never expires (§4.3,
    /// "Expiry sweeper").
    pub fn is_expired(&self, now: i64) -> bool {
        self.lease_time != 0 && self.end < now
    }
}
