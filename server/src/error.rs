//! Server-side error kinds (§7).
//!
//! None of these propagate out of an inbound-datagram handler: the
//! engine answers on the wire (NAK / silent drop) or traces them.

use std::net::Ipv4Addr;

use dhcp_protocol::HwAddr;

/// Errors surfaced by the lease table and address pool.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A lookup by hardware address found no record during a mutation
    /// that required one.
    #[error("no lease record for {0}")]
    NotFound(HwAddr),

    /// An attempt to change a static lease's address, or to remove a
    /// static lease.
    #[error("lease for {0} is static and cannot be changed this way")]
    StaticViolation(HwAddr),

    /// An attempt to make a lease static using an address already held
    /// by another active, non-static lease.
    #[error("address {0} is already held by another active lease")]
    Conflict(Ipv4Addr),

    /// The address pool has no free address and no expired lease to
    /// evict.
    #[error("address pool exhausted")]
    PoolExhausted,

    /// The transport's socket failed; the server must shut down.
    #[error("socket error: {0}")]
    SocketFatal(String),

    /// A configured pool range was neither `a.b.c.d-a.b.c.e` nor
    /// `a.b.c.d/n` (§4.2 "Construction").
    #[error("invalid address range {0:?}, expected `a.b.c.d-a.b.c.e` or `a.b.c.d/n`")]
    InvalidRange(String),
}
