//! DHCP option table (RFC 2132).
//!
//! Options the protocol mandates get typed fields; everything else is
//! preserved as a raw `(code, value)` pair so it round-trips even though
//! this crate does not understand it (§4.1).

use std::{fmt, net::Ipv4Addr};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;

/// Option tags this crate gives first-class meaning to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionTag {
    Pad = 0,
    SubnetMask = 1,
    HostName = 12,
    RequestedIpAddress = 50,
    IpAddressLeaseTime = 51,
    MessageType = 53,
    ServerIdentifier = 54,
    ParameterRequestList = 55,
    MaximumMessageSize = 57,
    ClientIdentifier = 61,
    RelayAgentInformation = 82,
    End = 255,
}

/// DHCP message type, option 53.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl MessageType {
    fn from_u8(value: u8) -> Option<Self> {
        use MessageType::*;
        Some(match value {
            1 => Discover,
            2 => Offer,
            3 => Request,
            4 => Decline,
            5 => Ack,
            6 => Nak,
            7 => Release,
            8 => Inform,
            _ => return None,
        })
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use MessageType::*;
        let name = match self {
            Discover => "DHCPDISCOVER",
            Offer => "DHCPOFFER",
            Request => "DHCPREQUEST",
            Decline => "DHCPDECLINE",
            Ack => "DHCPACK",
            Nak => "DHCPNAK",
            Release => "DHCPRELEASE",
            Inform => "DHCPINFORM",
        };
        write!(f, "{}", name)
    }
}

/// Sub-options of Relay Agent Information (option 82), RFC 3046.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayAgentInformation {
    pub agent_circuit_id: Option<Vec<u8>>,
    pub agent_remote_id: Option<Vec<u8>>,
    /// The option's bytes as received, so it can be echoed verbatim even
    /// though only two of its sub-options are exposed individually.
    pub raw: Vec<u8>,
}

impl RelayAgentInformation {
    fn parse(raw: &[u8]) -> Self {
        let mut info = RelayAgentInformation {
            raw: raw.to_vec(),
            ..Default::default()
        };
        let mut i = 0;
        while i + 2 <= raw.len() {
            let code = raw[i];
            let len = raw[i + 1] as usize;
            let start = i + 2;
            if start + len > raw.len() {
                break;
            }
            let value = &raw[start..start + len];
            match code {
                1 => info.agent_circuit_id = Some(value.to_vec()),
                2 => info.agent_remote_id = Some(value.to_vec()),
                _ => {}
            }
            i = start + len;
        }
        info
    }
}

/// The decoded option table of a DHCP message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    pub subnet_mask: Option<Ipv4Addr>,
    pub hostname: Option<String>,
    pub requested_ip_address: Option<Ipv4Addr>,
    pub lease_time: Option<u32>,
    pub message_type: Option<MessageType>,
    pub server_identifier: Option<Ipv4Addr>,
    pub parameter_request_list: Option<Vec<u8>>,
    pub max_message_size: Option<u16>,
    pub client_identifier: Option<Vec<u8>>,
    pub relay_agent_information: Option<RelayAgentInformation>,
    /// Every option this crate does not give a typed field to, preserved
    /// verbatim in arrival order.
    pub unrecognized: Vec<(u8, Vec<u8>)>,
}

impl Options {
    /// Decodes a TLV option stream until option 255 or end-of-buffer.
    ///
    /// End-of-stream is treated as an implicit terminator (§4.1) rather
    /// than an error, so a truncated option list still parses.
    pub fn decode(buf: &mut impl Buf) -> Result<Self, Error> {
        let mut options = Options::default();

        while buf.has_remaining() {
            let code = buf.get_u8();
            if code == OptionTag::Pad as u8 {
                continue;
            }
            if code == OptionTag::End as u8 {
                break;
            }
            if !buf.has_remaining() {
                return Err(Error::malformed("option code with no length byte"));
            }
            let len = buf.get_u8() as usize;
            if buf.remaining() < len {
                return Err(Error::malformed("option length overruns buffer"));
            }
            let mut value = vec![0u8; len];
            buf.copy_to_slice(&mut value);

            match code {
                c if c == OptionTag::SubnetMask as u8 => {
                    options.subnet_mask = Some(read_ipv4(&value)?);
                }
                c if c == OptionTag::HostName as u8 => {
                    options.hostname = Some(String::from_utf8_lossy(&value).into_owned());
                }
                c if c == OptionTag::RequestedIpAddress as u8 => {
                    options.requested_ip_address = Some(read_ipv4(&value)?);
                }
                c if c == OptionTag::IpAddressLeaseTime as u8 => {
                    options.lease_time = Some(read_u32(&value)?);
                }
                c if c == OptionTag::MessageType as u8 => {
                    if value.len() != 1 {
                        return Err(Error::malformed("message type must be 1 byte"));
                    }
                    options.message_type = MessageType::from_u8(value[0]);
                }
                c if c == OptionTag::ServerIdentifier as u8 => {
                    options.server_identifier = Some(read_ipv4(&value)?);
                }
                c if c == OptionTag::ParameterRequestList as u8 => {
                    options.parameter_request_list = Some(value);
                }
                c if c == OptionTag::MaximumMessageSize as u8 => {
                    if value.len() != 2 {
                        return Err(Error::malformed("max message size must be 2 bytes"));
                    }
                    options.max_message_size = Some(u16::from_be_bytes([value[0], value[1]]));
                }
                c if c == OptionTag::ClientIdentifier as u8 => {
                    options.client_identifier = Some(value);
                }
                c if c == OptionTag::RelayAgentInformation as u8 => {
                    options.relay_agent_information = Some(RelayAgentInformation::parse(&value));
                }
                _ => options.unrecognized.push((code, value)),
            }
        }

        Ok(options)
    }

    /// Encodes the option table, terminated by option 255.
    pub fn encode(&self, dst: &mut BytesMut) {
        if let Some(value) = self.subnet_mask {
            put_tlv(dst, OptionTag::SubnetMask as u8, &value.octets());
        }
        if let Some(ref value) = self.hostname {
            put_tlv(dst, OptionTag::HostName as u8, value.as_bytes());
        }
        if let Some(value) = self.requested_ip_address {
            put_tlv(dst, OptionTag::RequestedIpAddress as u8, &value.octets());
        }
        if let Some(value) = self.lease_time {
            put_tlv(dst, OptionTag::IpAddressLeaseTime as u8, &value.to_be_bytes());
        }
        if let Some(value) = self.message_type {
            put_tlv(dst, OptionTag::MessageType as u8, &[value as u8]);
        }
        if let Some(value) = self.server_identifier {
            put_tlv(dst, OptionTag::ServerIdentifier as u8, &value.octets());
        }
        if let Some(ref value) = self.parameter_request_list {
            put_tlv(dst, OptionTag::ParameterRequestList as u8, value);
        }
        if let Some(value) = self.max_message_size {
            put_tlv(dst, OptionTag::MaximumMessageSize as u8, &value.to_be_bytes());
        }
        if let Some(ref value) = self.client_identifier {
            put_tlv(dst, OptionTag::ClientIdentifier as u8, value);
        }
        if let Some(ref value) = self.relay_agent_information {
            put_tlv(dst, OptionTag::RelayAgentInformation as u8, &value.raw);
        }
        for (code, value) in &self.unrecognized {
            put_tlv(dst, *code, value);
        }
        dst.put_u8(OptionTag::End as u8);
    }

    /// Looks up a raw configured-option code in the typed fields, so the
    /// engine can tell whether it would need to be duplicated.
    pub fn contains_code(&self, code: u8) -> bool {
        let tag_matches = |tag: OptionTag, present: bool| code == tag as u8 && present;
        tag_matches(OptionTag::SubnetMask, self.subnet_mask.is_some())
            || tag_matches(OptionTag::HostName, self.hostname.is_some())
            || tag_matches(
                OptionTag::RequestedIpAddress,
                self.requested_ip_address.is_some(),
            )
            || tag_matches(OptionTag::IpAddressLeaseTime, self.lease_time.is_some())
            || tag_matches(OptionTag::MessageType, self.message_type.is_some())
            || tag_matches(
                OptionTag::ServerIdentifier,
                self.server_identifier.is_some(),
            )
            || tag_matches(
                OptionTag::ParameterRequestList,
                self.parameter_request_list.is_some(),
            )
            || tag_matches(
                OptionTag::MaximumMessageSize,
                self.max_message_size.is_some(),
            )
            || tag_matches(OptionTag::ClientIdentifier, self.client_identifier.is_some())
            || tag_matches(
                OptionTag::RelayAgentInformation,
                self.relay_agent_information.is_some(),
            )
            || self.unrecognized.iter().any(|(c, _)| *c == code)
    }

    /// Appends a raw `(code, value)` pair as-is, used by the engine to
    /// merge operator-configured options it has no typed field for.
    pub fn push_raw(&mut self, code: u8, value: Vec<u8>) {
        self.unrecognized.push((code, value));
    }
}

fn put_tlv(dst: &mut BytesMut, code: u8, value: &[u8]) {
    dst.put_u8(code);
    dst.put_u8(value.len() as u8);
    dst.put_slice(value);
}

fn read_ipv4(value: &[u8]) -> Result<Ipv4Addr, Error> {
    if value.len() != 4 {
        return Err(Error::malformed("expected a 4 byte IPv4 address"));
    }
    Ok(Ipv4Addr::new(value[0], value[1], value[2], value[3]))
}

fn read_u32(value: &[u8]) -> Result<u32, Error> {
    if value.len() != 4 {
        return Err(Error::malformed("expected a 4 byte integer"));
    }
    Ok(u32::from_be_bytes([value[0], value[1], value[2], value[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn round_trips_typed_options() {
        let mut options = Options::default();
        options.subnet_mask = Some(Ipv4Addr::new(255, 255, 255, 0));
        options.message_type = Some(MessageType::Discover);
        options.parameter_request_list = Some(vec![1, 3, 6]);

        let mut buf = BytesMut::new();
        options.encode(&mut buf);
        let decoded = Options::decode(&mut buf.freeze()).unwrap();

        assert_eq!(decoded.subnet_mask, options.subnet_mask);
        assert_eq!(decoded.message_type, options.message_type);
        assert_eq!(decoded.parameter_request_list, options.parameter_request_list);
    }

    #[test]
    fn preserves_unknown_option_bytes() {
        let mut buf = BytesMut::new();
        put_tlv(&mut buf, 99, &[1, 2, 3]);
        buf.put_u8(OptionTag::End as u8);

        let decoded = Options::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.unrecognized, vec![(99u8, vec![1, 2, 3])]);
    }

    #[test]
    fn missing_length_byte_is_malformed() {
        let mut buf = BytesMut::new();
        buf.put_u8(OptionTag::SubnetMask as u8);
        // no length byte, no value, no terminator
        let result = Options::decode(&mut buf.freeze());
        assert!(result.is_err());
    }

    #[test]
    fn missing_terminator_is_tolerated() {
        let mut buf = BytesMut::new();
        put_tlv(&mut buf, OptionTag::SubnetMask as u8, &[255, 255, 255, 0]);
        // stream simply ends, no option 255
        let decoded = Options::decode(&mut buf.freeze()).unwrap();
        assert_eq!(decoded.subnet_mask, Some(Ipv4Addr::new(255, 255, 255, 0)));
    }

    #[test]
    fn parses_relay_agent_sub_options() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&[1, 3, b'a', b'b', b'c']);
        raw.extend_from_slice(&[2, 2, b'x', b'y']);
        let info = RelayAgentInformation::parse(&raw);
        assert_eq!(info.agent_circuit_id.as_deref(), Some(b"abc".as_ref()));
        assert_eq!(info.agent_remote_id.as_deref(), Some(b"xy".as_ref()));
        assert_eq!(info.raw, raw);
    }
}
