//! Classic libpcap stream format
//!
//! The wire protocol spoken to every subscriber is the streamed legacy pcap
//! file format: one 24-byte global header at connection start, then one
//! 16-byte record header plus payload per packet. Byte-for-byte compatible
//! with standard capture tooling (`tcpdump -r -`, Wireshark's pcap-over-IP).
//!
//! ```text
//! Global header (little-endian on write):
//! +-------+-------+-------+----------+---------+---------+---------+
//! | magic | v_maj | v_min | thiszone | sigfigs | snaplen | network |
//! |  u32  |  u16  |  u16  |   i32    |   u32   |   u32   |   u32   |
//! +-------+-------+-------+----------+---------+---------+---------+
//!
//! Record:
//! +--------+---------+----------+----------+-----------+
//! | ts_sec | ts_usec | incl_len | orig_len | data(N)   |
//! |  u32   |  u32    |   u32    |   u32    |           |
//! +--------+---------+----------+----------+-----------+
//! ```
//!
//! [`PcapWriter`] is the outbound codec used by subscriber drain tasks.
//! [`PcapReader`] is the inbound side: it backs the packet source and the
//! decode half of the integration tests. The reader accepts both
//! endiannesses and the nanosecond-resolution magic; the writer always emits
//! the standard little-endian microsecond format.

pub mod reader;
pub mod writer;

pub use reader::PcapReader;
pub use writer::PcapWriter;

/// Standard pcap magic, microsecond timestamps
pub const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
/// Pcap magic for nanosecond-resolution timestamps
pub const MAGIC_NANOS: u32 = 0xa1b2_3c4d;

/// Pcap format version written to the global header
pub const VERSION_MAJOR: u16 = 2;
pub const VERSION_MINOR: u16 = 4;

/// Global header length in bytes
pub const FILE_HEADER_LEN: usize = 24;
/// Per-record header length in bytes
pub const RECORD_HEADER_LEN: usize = 16;

/// Default snap length, matching the reference implementation
pub const DEFAULT_SNAPLEN: u32 = 65535;

/// Sanity bound on a single record's captured length when decoding
pub const MAX_RECORD_LEN: u32 = 1 << 20;

/// Wire-format errors
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Stream does not start with a known pcap magic
    #[error("bad pcap magic: {0:#010x}")]
    BadMagic(u32),

    /// Pcap version this codec does not understand
    #[error("unsupported pcap version {0}.{1}")]
    UnsupportedVersion(u16, u16),

    /// Stream ended in the middle of a record
    #[error("truncated pcap record")]
    TruncatedRecord,

    /// Record claims a captured length beyond the sanity bound
    #[error("pcap record too large: {0} bytes")]
    RecordTooLarge(u32),

    /// Payload length does not match the capture metadata
    #[error("capture length {expected} does not match data length {actual}")]
    CaptureLengthMismatch { expected: u32, actual: usize },
}
