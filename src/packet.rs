//! Shared packet data model
//!
//! A [`Packet`] is an opaque payload plus its capture metadata. Payloads are
//! `bytes::Bytes`, so cloning a packet for fan-out to N subscribers is a
//! reference-count bump, not a copy.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

/// Link-layer type carried in the pcap global header.
///
/// A thin newtype over the registered pcap linktype values. Only the common
/// ones get named constants; anything else round-trips as a raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkType(pub u32);

impl LinkType {
    /// BSD loopback encapsulation
    pub const NULL: LinkType = LinkType(0);
    /// Ethernet (10Mb and up)
    pub const ETHERNET: LinkType = LinkType(1);
    /// Raw IP, no link layer
    pub const RAW: LinkType = LinkType(101);
    /// IEEE 802.11 wireless
    pub const IEEE802_11: LinkType = LinkType(105);
    /// Linux cooked capture
    pub const LINUX_SLL: LinkType = LinkType(113);

    /// Raw linktype value as written to the wire
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for LinkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            LinkType::NULL => write!(f, "NULL"),
            LinkType::ETHERNET => write!(f, "ETHERNET"),
            LinkType::RAW => write!(f, "RAW"),
            LinkType::IEEE802_11 => write!(f, "IEEE802_11"),
            LinkType::LINUX_SLL => write!(f, "LINUX_SLL"),
            LinkType(other) => write!(f, "LINKTYPE_{}", other),
        }
    }
}

/// Capture metadata for one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInfo {
    /// When the packet was captured
    pub timestamp: SystemTime,
    /// Number of bytes actually captured (length of the payload)
    pub captured_len: u32,
    /// Original length of the packet on the wire
    pub original_len: u32,
}

impl CaptureInfo {
    /// Timestamp as seconds + microseconds since the Unix epoch.
    ///
    /// Timestamps before the epoch saturate to zero.
    pub fn unix_micros(&self) -> (u32, u32) {
        let since_epoch = self
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        (since_epoch.as_secs() as u32, since_epoch.subsec_micros())
    }
}

/// One captured packet: payload plus metadata
///
/// Immutable once produced. Cheap to clone: the payload is reference-counted,
/// so every subscriber queue holds the same underlying allocation.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Capture metadata
    pub info: CaptureInfo,
    /// Raw packet bytes (zero-copy via reference counting)
    pub data: Bytes,
}

impl Packet {
    /// Create a packet from metadata and payload
    pub fn new(info: CaptureInfo, data: Bytes) -> Self {
        Self { info, data }
    }

    /// Create a packet captured in full (captured length == original length)
    pub fn full(timestamp: SystemTime, data: Bytes) -> Self {
        let len = data.len() as u32;
        Self {
            info: CaptureInfo {
                timestamp,
                captured_len: len,
                original_len: len,
            },
            data,
        }
    }

    /// Captured length in bytes
    pub fn captured_len(&self) -> u32 {
        self.info.captured_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_type_display() {
        assert_eq!(LinkType::ETHERNET.to_string(), "ETHERNET");
        assert_eq!(LinkType::RAW.to_string(), "RAW");
        assert_eq!(LinkType(147).to_string(), "LINKTYPE_147");
    }

    #[test]
    fn test_unix_micros() {
        let info = CaptureInfo {
            timestamp: UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_000),
            captured_len: 4,
            original_len: 4,
        };

        let (secs, micros) = info.unix_micros();
        assert_eq!(secs, 1_700_000_000);
        assert_eq!(micros, 123_456);
    }

    #[test]
    fn test_unix_micros_before_epoch_saturates() {
        let info = CaptureInfo {
            timestamp: UNIX_EPOCH - Duration::from_secs(10),
            captured_len: 0,
            original_len: 0,
        };

        assert_eq!(info.unix_micros(), (0, 0));
    }

    #[test]
    fn test_packet_full() {
        let packet = Packet::full(UNIX_EPOCH, Bytes::from_static(b"abcd"));

        assert_eq!(packet.captured_len(), 4);
        assert_eq!(packet.info.original_len, 4);
        assert_eq!(packet.data.as_ref(), b"abcd");
    }

    #[test]
    fn test_packet_clone_shares_payload() {
        let packet = Packet::full(UNIX_EPOCH, Bytes::from(vec![0u8; 1024]));
        let copy = packet.clone();

        // Same allocation, not a deep copy
        assert_eq!(packet.data.as_ptr(), copy.data.as_ptr());
    }
}
