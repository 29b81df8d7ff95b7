//! DHCP message encoding, decoding and the option table.
//!
//! This crate implements the RFC 2131 BOOTP frame and RFC 2132 option
//! encoding. It knows nothing about leases, pools or sockets; it only
//! turns bytes into a [`Message`] and back.

mod constants;
mod error;
mod hardware_type;
mod hwaddr;
mod message;
mod operation_code;
mod options;

pub use self::{
    constants::*,
    error::Error,
    hardware_type::HardwareType,
    hwaddr::HwAddr,
    message::Message,
    operation_code::OperationCode,
    options::{MessageType, OptionTag, Options, RelayAgentInformation},
};

/// The well-known DHCP server port.
pub const DHCP_PORT_SERVER: u16 = 67;
/// The well-known DHCP client port.
pub const DHCP_PORT_CLIENT: u16 = 68;
