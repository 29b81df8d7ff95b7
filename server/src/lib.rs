//! A DHCPv4 server core: wire-level clients/relays in, lease decisions
//! out. See [`Server`] for the entry point.

mod clock;
mod config;
mod engine;
mod error;
mod events;
mod lease;
mod pool;
mod server;
mod table;

pub use self::{
    clock::{Clock, SystemClock, TestClock},
    config::{ConfiguredOption, OptionMode, ServerConfig},
    error::Error,
    events::{LeaseEvent, StatusChange},
    lease::{Lease, LeaseStatus},
    pool::AddressPool,
    server::Server,
};
pub use dhcp_protocol::HwAddr;
