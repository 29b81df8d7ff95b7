//! The main DHCP message: the BOOTP header plus the option table.

use std::{fmt, net::Ipv4Addr};

use bytes::{Buf, BufMut, BytesMut};

use crate::{
    constants::*,
    error::Error,
    hardware_type::HardwareType,
    hwaddr::HwAddr,
    operation_code::OperationCode,
    options::Options,
};

/// A decoded RFC 2131 BOOTP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub operation_code: OperationCode,
    pub hardware_type: HardwareType,
    pub hardware_address_length: u8,
    pub hops: u8,

    pub transaction_id: u32,
    pub seconds: u16,
    pub is_broadcast: bool,

    pub client_ip_address: Ipv4Addr,
    pub your_ip_address: Ipv4Addr,
    pub server_ip_address: Ipv4Addr,
    pub gateway_ip_address: Ipv4Addr,

    pub client_hardware_address: HwAddr,
    pub server_name: String,
    pub boot_filename: String,

    pub options: Options,
}

impl Message {
    /// Decodes a message from a received datagram.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the buffer is shorter than the
    /// fixed header, the magic cookie does not match, or an option's
    /// declared length overruns the buffer (§4.1).
    pub fn decode(src: &[u8]) -> Result<Self, Error> {
        if src.len() < OFFSET_OPTIONS {
            return Err(Error::malformed("packet shorter than the fixed header"));
        }
        let mut buf = src;

        let operation_code = OperationCode::from(buf.get_u8());
        let hardware_type = HardwareType::from(buf.get_u8());
        let hardware_address_length = buf.get_u8();
        let hops = buf.get_u8();
        let transaction_id = buf.get_u32();
        let seconds = buf.get_u16();
        let is_broadcast = buf.get_u16() & FLAG_BROADCAST != 0;
        let client_ip_address = Ipv4Addr::from(buf.get_u32());
        let your_ip_address = Ipv4Addr::from(buf.get_u32());
        let server_ip_address = Ipv4Addr::from(buf.get_u32());
        let gateway_ip_address = Ipv4Addr::from(buf.get_u32());

        let mut chaddr = vec![0u8; SIZE_HARDWARE_ADDRESS];
        buf.copy_to_slice(&mut chaddr);
        let significant = hardware_address_length as usize;
        chaddr.truncate(significant.min(SIZE_HARDWARE_ADDRESS));
        let client_hardware_address = HwAddr::new(chaddr);

        let mut sname = vec![0u8; SIZE_SERVER_NAME];
        buf.copy_to_slice(&mut sname);
        let server_name = trim_trailing_zeros(&sname);

        let mut file = vec![0u8; SIZE_BOOT_FILENAME];
        buf.copy_to_slice(&mut file);
        let boot_filename = trim_trailing_zeros(&file);

        if buf.remaining() < 4 || buf.get_u32() != MAGIC_COOKIE {
            return Err(Error::malformed("bad magic cookie"));
        }

        let options = Options::decode(&mut buf)?;

        Ok(Message {
            operation_code,
            hardware_type,
            hardware_address_length,
            hops,
            transaction_id,
            seconds,
            is_broadcast,
            client_ip_address,
            your_ip_address,
            server_ip_address,
            gateway_ip_address,
            client_hardware_address,
            server_name,
            boot_filename,
            options,
        })
    }

    /// Encodes the message to the wire, zero-padding the result to at
    /// least `minimum_packet_size` bytes (§4.1), never below
    /// [`SIZE_MESSAGE_FLOOR`].
    pub fn encode(&self, minimum_packet_size: usize) -> BytesMut {
        let minimum_packet_size = minimum_packet_size.max(SIZE_MESSAGE_FLOOR);
        let mut dst = BytesMut::with_capacity(minimum_packet_size);

        dst.put_u8(self.operation_code.into());
        dst.put_u8(self.hardware_type.into());
        dst.put_u8(self.hardware_address_length);
        dst.put_u8(self.hops);
        dst.put_u32(self.transaction_id);
        dst.put_u16(self.seconds);
        dst.put_u16(if self.is_broadcast { FLAG_BROADCAST } else { 0 });
        dst.put_u32(u32::from(self.client_ip_address));
        dst.put_u32(u32::from(self.your_ip_address));
        dst.put_u32(u32::from(self.server_ip_address));
        dst.put_u32(u32::from(self.gateway_ip_address));

        put_padded(&mut dst, self.client_hardware_address.as_bytes(), SIZE_HARDWARE_ADDRESS);
        put_padded(&mut dst, self.server_name.as_bytes(), SIZE_SERVER_NAME);
        put_padded(&mut dst, self.boot_filename.as_bytes(), SIZE_BOOT_FILENAME);

        dst.put_u32(MAGIC_COOKIE);
        self.options.encode(&mut dst);

        if dst.len() < minimum_packet_size {
            dst.resize(minimum_packet_size, 0);
        }
        dst
    }
}

fn put_padded(dst: &mut BytesMut, value: &[u8], width: usize) {
    let take = value.len().min(width);
    dst.put_slice(&value[..take]);
    dst.put_bytes(0, width - take);
}

fn trim_trailing_zeros(bytes: &[u8]) -> String {
    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} xid={:#x} chaddr={}", self.operation_code, self.transaction_id, self.client_hardware_address)?;
        writeln!(
            f,
            "ciaddr={} yiaddr={} siaddr={} giaddr={}",
            self.client_ip_address, self.your_ip_address, self.server_ip_address, self.gateway_ip_address
        )?;
        if let Some(message_type) = self.options.message_type {
            write!(f, "type={}", message_type)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::MessageType;

    fn sample() -> Message {
        Message {
            operation_code: OperationCode::BootRequest,
            hardware_type: HardwareType::Ethernet,
            hardware_address_length: 6,
            hops: 0,
            transaction_id: 0x1234_5678,
            seconds: 3,
            is_broadcast: true,
            client_ip_address: Ipv4Addr::UNSPECIFIED,
            your_ip_address: Ipv4Addr::UNSPECIFIED,
            server_ip_address: Ipv4Addr::UNSPECIFIED,
            gateway_ip_address: Ipv4Addr::UNSPECIFIED,
            client_hardware_address: HwAddr::new(vec![0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]),
            server_name: String::new(),
            boot_filename: String::new(),
            options: Options {
                message_type: Some(MessageType::Discover),
                parameter_request_list: Some(vec![1, 3, 6]),
                ..Options::default()
            },
        }
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let message = sample();
        let encoded = message.encode(SIZE_MESSAGE_FLOOR);
        let decoded = Message::decode(&encoded).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn encodes_at_least_the_minimum_packet_size() {
        let message = sample();
        let encoded = message.encode(576);
        assert!(encoded.len() >= 576);
    }

    #[test]
    fn rejects_bad_magic_cookie() {
        let message = sample();
        let mut encoded = message.encode(SIZE_MESSAGE_FLOOR).to_vec();
        // corrupt the magic cookie, just past the fixed fields
        let cookie_offset = OFFSET_OPTIONS - 4;
        encoded[cookie_offset] = 0;
        assert!(matches!(Message::decode(&encoded), Err(Error::Malformed(_))));
    }

    #[test]
    fn rejects_packets_shorter_than_the_header() {
        assert!(Message::decode(&[0u8; 10]).is_err());
    }
}
