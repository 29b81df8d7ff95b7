//! Wire codec error type.

/// Errors returned while decoding a DHCP message from the wire.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The packet is shorter than the fixed header, the magic cookie does
    /// not match, or an option's declared length runs past the buffer.
    #[error("malformed DHCP message: {0}")]
    Malformed(String),
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::Malformed(reason.into())
    }
}
