//! Binary descriptor of how to reach a waiting listener.
//!
//! Wire format (version 1):
//! ```text
//! tag 1 (socket): [tag:1][addr:4][port:4]   = 9 bytes
//! tag 2 (bridge): [tag:1]                   = 1 byte
//! ```
//! The address is the four IPv4 octets in the order the host reports them.
//! The port is a 32-bit **little-endian** integer, even though only the low
//! 16 bits are meaningful; companion apps depend on this exact layout.

use std::net::{IpAddr, Ipv4Addr};

use thiserror::Error;

/// Tag byte for a direct socket listener.
pub const TAG_SOCKET: u8 = 0x01;

/// Tag byte for "use the already connected bridge".  Carries no address.
pub const TAG_BRIDGE: u8 = 0x02;

/// Encoded size of a socket header.
pub const SOCKET_HEADER_SIZE: usize = 9;

/// Errors that can occur while building or decoding a [`Header`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    /// The host has no IPv4 interface that a peer could connect back to.
    #[error("no IPv4 interface found on this host")]
    NoInterfaceFound,

    /// The byte slice is shorter than the layout for its tag.
    #[error("insufficient data: need {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The tag byte names a transport this version does not know.
    #[error("unknown transport tag: 0x{0:02X}")]
    UnknownTransport(u8),

    /// The 4-byte port field holds a value that does not fit a TCP port.
    #[error("port value {0} is out of range")]
    PortOutOfRange(u32),
}

/// How a peer reaches this application.
///
/// Exactly one header describes one reachable endpoint.  A header is
/// immutable; a new one is computed only when a listener is recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Header {
    /// Connect over TCP to `address:port`.
    Socket { address: Ipv4Addr, port: u16 },
    /// Answer over the existing bridge connection.
    Bridge,
}

impl Header {
    /// Builds a socket header from the first IPv4 address in `candidates`.
    ///
    /// IPv6 candidates are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError::NoInterfaceFound`] when no candidate is IPv4.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    /// use lockall_core::Header;
    ///
    /// let candidates = [IpAddr::V6(Ipv6Addr::LOCALHOST), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7))];
    /// let header = Header::for_first_ipv4(candidates, 5000).unwrap();
    /// assert_eq!(header, Header::Socket { address: Ipv4Addr::new(10, 0, 0, 7), port: 5000 });
    /// ```
    pub fn for_first_ipv4<I>(candidates: I, port: u16) -> Result<Self, HeaderError>
    where
        I: IntoIterator<Item = IpAddr>,
    {
        candidates
            .into_iter()
            .find_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .map(|address| Header::Socket { address, port })
            .ok_or(HeaderError::NoInterfaceFound)
    }

    /// Returns the transport tag byte.
    pub fn tag(&self) -> u8 {
        match self {
            Header::Socket { .. } => TAG_SOCKET,
            Header::Bridge => TAG_BRIDGE,
        }
    }

    /// Number of bytes [`Header::encode`] produces.
    pub fn encoded_len(&self) -> usize {
        match self {
            Header::Socket { .. } => SOCKET_HEADER_SIZE,
            Header::Bridge => 1,
        }
    }

    /// Encodes the header into its wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.push(self.tag());
        if let Header::Socket { address, port } = self {
            buf.extend_from_slice(&address.octets());
            buf.extend_from_slice(&u32::from(*port).to_le_bytes());
        }
        buf
    }

    /// Decodes a header from the beginning of `bytes`.
    ///
    /// Trailing bytes are ignored; use [`Header::encoded_len`] on the result
    /// to advance a cursor.
    ///
    /// # Errors
    ///
    /// Returns [`HeaderError`] for short input, unknown tags, or a port that
    /// does not fit in 16 bits.
    pub fn decode(bytes: &[u8]) -> Result<Self, HeaderError> {
        let tag = *bytes.first().ok_or(HeaderError::InsufficientData {
            needed: 1,
            available: 0,
        })?;

        match tag {
            TAG_SOCKET => {
                if bytes.len() < SOCKET_HEADER_SIZE {
                    return Err(HeaderError::InsufficientData {
                        needed: SOCKET_HEADER_SIZE,
                        available: bytes.len(),
                    });
                }
                let address = Ipv4Addr::new(bytes[1], bytes[2], bytes[3], bytes[4]);
                let raw_port = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
                let port =
                    u16::try_from(raw_port).map_err(|_| HeaderError::PortOutOfRange(raw_port))?;
                Ok(Header::Socket { address, port })
            }
            TAG_BRIDGE => Ok(Header::Bridge),
            other => Err(HeaderError::UnknownTransport(other)),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_socket_header_round_trip() {
        let header = Header::Socket {
            address: Ipv4Addr::new(192, 168, 1, 20),
            port: 51234,
        };
        let bytes = header.encode();
        assert_eq!(bytes.len(), SOCKET_HEADER_SIZE);
        assert_eq!(Header::decode(&bytes), Ok(header));
    }

    #[test]
    fn test_socket_header_layout_is_tag_addr_port_le() {
        let header = Header::Socket {
            address: Ipv4Addr::new(10, 1, 2, 3),
            port: 0x1F90, // 8080
        };
        assert_eq!(
            header.encode(),
            vec![0x01, 10, 1, 2, 3, 0x90, 0x1F, 0x00, 0x00]
        );
    }

    #[test]
    fn test_bridge_header_is_single_tag_byte() {
        assert_eq!(Header::Bridge.encode(), vec![TAG_BRIDGE]);
        assert_eq!(Header::decode(&[TAG_BRIDGE]), Ok(Header::Bridge));
    }

    #[test]
    fn test_for_first_ipv4_skips_ipv6() {
        let candidates = [
            IpAddr::V6(Ipv6Addr::LOCALHOST),
            IpAddr::V4(Ipv4Addr::new(172, 16, 0, 9)),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        ];
        let header = Header::for_first_ipv4(candidates, 4000).unwrap();
        assert_eq!(
            header,
            Header::Socket {
                address: Ipv4Addr::new(172, 16, 0, 9),
                port: 4000
            }
        );
    }

    #[test]
    fn test_for_first_ipv4_without_ipv4_is_no_interface() {
        let candidates = [IpAddr::V6(Ipv6Addr::LOCALHOST)];
        assert_eq!(
            Header::for_first_ipv4(candidates, 4000),
            Err(HeaderError::NoInterfaceFound)
        );
        assert_eq!(
            Header::for_first_ipv4(Vec::<IpAddr>::new(), 4000),
            Err(HeaderError::NoInterfaceFound)
        );
    }

    #[test]
    fn test_decode_empty_returns_insufficient_data() {
        assert_eq!(
            Header::decode(&[]),
            Err(HeaderError::InsufficientData {
                needed: 1,
                available: 0
            })
        );
    }

    #[test]
    fn test_decode_truncated_socket_header() {
        let result = Header::decode(&[TAG_SOCKET, 127, 0, 0]);
        assert!(matches!(result, Err(HeaderError::InsufficientData { .. })));
    }

    #[test]
    fn test_decode_unknown_tag() {
        assert_eq!(
            Header::decode(&[0x7F, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(HeaderError::UnknownTransport(0x7F))
        );
    }

    #[test]
    fn test_decode_port_out_of_range() {
        let mut bytes = vec![TAG_SOCKET, 127, 0, 0, 1];
        bytes.extend_from_slice(&70_000u32.to_le_bytes());
        assert_eq!(
            Header::decode(&bytes),
            Err(HeaderError::PortOutOfRange(70_000))
        );
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let header = Header::Socket {
            address: Ipv4Addr::LOCALHOST,
            port: 1,
        };
        let mut bytes = header.encode();
        bytes.extend_from_slice(b"trailing");
        assert_eq!(Header::decode(&bytes), Ok(header));
    }
}
