//! DHCP message constants.

/// `client_hardware_address` size in bytes.
pub const SIZE_HARDWARE_ADDRESS: usize = 16;

/// `server_name` size in bytes.
pub const SIZE_SERVER_NAME: usize = 64;

/// `boot_filename` size in bytes.
pub const SIZE_BOOT_FILENAME: usize = 128;

/// Bytes consumed by the fixed header, up to and including the magic cookie.
pub const OFFSET_OPTIONS: usize =
    28 + SIZE_HARDWARE_ADDRESS + SIZE_SERVER_NAME + SIZE_BOOT_FILENAME + 4;

/// Only the highest bit of the `flags` field is used in DHCP.
pub const FLAG_BROADCAST: u16 = 0b1000_0000_0000_0000;

/// The magic number before the DHCP options.
pub const MAGIC_COOKIE: u32 = 0x6382_5363;

/// The minimal message size a client MUST be able to accept (RFC 2131 §2).
pub const SIZE_MESSAGE_MINIMAL: usize = 576;

/// The floor below which `minimum_packet_size` may never be configured.
pub const SIZE_MESSAGE_FLOOR: usize = 312;
