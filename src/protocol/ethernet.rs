//! Ethernet frame parsing and construction

use super::MacAddr;
use crate::{Error, Result};

/// Ethernet header size (without FCS)
pub const HEADER_SIZE: usize = 14;

/// EtherType for IPv6
pub const ETHERTYPE_IPV6: u16 = 0x86dd;

/// Parsed Ethernet frame (zero-copy reference)
#[derive(Debug)]
pub struct Frame<'a> {
    buffer: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn parse(buffer: &'a [u8]) -> Result<Self> {
        if buffer.len() < HEADER_SIZE {
            return Err(Error::Parse("frame too short".into()));
        }
        Ok(Self { buffer })
    }

    pub fn dst_mac(&self) -> MacAddr {
        MacAddr(self.buffer[0..6].try_into().unwrap())
    }

    pub fn src_mac(&self) -> MacAddr {
        MacAddr(self.buffer[6..12].try_into().unwrap())
    }

    pub fn ethertype(&self) -> u16 {
        u16::from_be_bytes([self.buffer[12], self.buffer[13]])
    }

    pub fn payload(&self) -> &[u8] {
        &self.buffer[HEADER_SIZE..]
    }
}

/// Prepend an Ethernet header to an IPv6 packet
pub fn frame(dst: MacAddr, src: MacAddr, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&dst.0);
    buf.extend_from_slice(&src.0);
    buf.extend_from_slice(&ethertype.to_be_bytes());
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let dst = MacAddr([0x33, 0x33, 0x00, 0x00, 0x00, 0x01]);
        let src = MacAddr([0x52, 0x54, 0x00, 0xaa, 0xbb, 0xcc]);
        let built = frame(dst, src, ETHERTYPE_IPV6, &[0x60, 0x00]);

        let parsed = Frame::parse(&built).unwrap();
        assert_eq!(parsed.dst_mac(), dst);
        assert_eq!(parsed.src_mac(), src);
        assert_eq!(parsed.ethertype(), ETHERTYPE_IPV6);
        assert_eq!(parsed.payload(), &[0x60, 0x00]);
    }

    #[test]
    fn test_frame_too_short() {
        assert!(Frame::parse(&[0u8; 13]).is_err());
    }
}
