//! Inbound pcap codec
//!
//! Decodes a pcap byte stream into [`Packet`]s. Clean EOF at a record
//! boundary is the normal end-of-capture signal and surfaces as `Ok(None)`;
//! EOF inside a header or payload is a [`WireError::TruncatedRecord`].

use std::time::{Duration, UNIX_EPOCH};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::packet::{CaptureInfo, LinkType, Packet};

use super::{
    WireError, FILE_HEADER_LEN, MAGIC_MICROS, MAGIC_NANOS, MAX_RECORD_LEN, RECORD_HEADER_LEN,
    VERSION_MAJOR,
};

/// Timestamp resolution signalled by the stream's magic number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Micros,
    Nanos,
}

/// Streaming pcap decoder over an async reader
#[derive(Debug)]
pub struct PcapReader<R> {
    inner: R,
    link_type: LinkType,
    snaplen: u32,
    big_endian: bool,
    resolution: Resolution,
}

impl<R: AsyncRead + Unpin> PcapReader<R> {
    /// Read and validate the global header, returning a ready decoder.
    ///
    /// Both byte orders and both timestamp magics are accepted; only format
    /// version 2.x is supported.
    pub async fn new(mut inner: R) -> Result<Self, WireError> {
        let mut header = [0u8; FILE_HEADER_LEN];
        inner.read_exact(&mut header).await?;

        let raw_magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let (big_endian, resolution) = match raw_magic {
            MAGIC_MICROS => (false, Resolution::Micros),
            MAGIC_NANOS => (false, Resolution::Nanos),
            m if m.swap_bytes() == MAGIC_MICROS => (true, Resolution::Micros),
            m if m.swap_bytes() == MAGIC_NANOS => (true, Resolution::Nanos),
            other => return Err(WireError::BadMagic(other)),
        };

        let read_u16 = |bytes: [u8; 2]| {
            if big_endian {
                u16::from_be_bytes(bytes)
            } else {
                u16::from_le_bytes(bytes)
            }
        };
        let read_u32 = |bytes: [u8; 4]| {
            if big_endian {
                u32::from_be_bytes(bytes)
            } else {
                u32::from_le_bytes(bytes)
            }
        };

        let version_major = read_u16([header[4], header[5]]);
        let version_minor = read_u16([header[6], header[7]]);
        if version_major != VERSION_MAJOR {
            return Err(WireError::UnsupportedVersion(version_major, version_minor));
        }

        let snaplen = read_u32([header[16], header[17], header[18], header[19]]);
        let link_type = LinkType(read_u32([header[20], header[21], header[22], header[23]]));

        Ok(Self {
            inner,
            link_type,
            snaplen,
            big_endian,
            resolution,
        })
    }

    /// Link-layer type declared by the stream's global header
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Snap length declared by the stream's global header
    pub fn snaplen(&self) -> u32 {
        self.snaplen
    }

    /// Decode the next packet record.
    ///
    /// Returns `Ok(None)` on clean EOF at a record boundary.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>, WireError> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        match read_full(&mut self.inner, &mut header).await? {
            ReadOutcome::Eof => return Ok(None),
            ReadOutcome::Partial => return Err(WireError::TruncatedRecord),
            ReadOutcome::Full => {}
        }

        let read_u32 = |bytes: [u8; 4]| {
            if self.big_endian {
                u32::from_be_bytes(bytes)
            } else {
                u32::from_le_bytes(bytes)
            }
        };

        let ts_sec = read_u32([header[0], header[1], header[2], header[3]]);
        let ts_frac = read_u32([header[4], header[5], header[6], header[7]]);
        let captured_len = read_u32([header[8], header[9], header[10], header[11]]);
        let original_len = read_u32([header[12], header[13], header[14], header[15]]);

        if captured_len > MAX_RECORD_LEN {
            return Err(WireError::RecordTooLarge(captured_len));
        }

        let mut data = BytesMut::zeroed(captured_len as usize);
        if !matches!(
            read_full(&mut self.inner, &mut data).await?,
            ReadOutcome::Full
        ) {
            return Err(WireError::TruncatedRecord);
        }

        let offset = match self.resolution {
            Resolution::Micros => {
                Duration::from_secs(ts_sec as u64) + Duration::from_micros(ts_frac as u64)
            }
            Resolution::Nanos => {
                Duration::from_secs(ts_sec as u64) + Duration::from_nanos(ts_frac as u64)
            }
        };

        Ok(Some(Packet::new(
            CaptureInfo {
                timestamp: UNIX_EPOCH + offset,
                captured_len,
                original_len,
            },
            data.freeze(),
        )))
    }
}

enum ReadOutcome {
    /// Buffer filled completely
    Full,
    /// EOF before the first byte
    Eof,
    /// EOF mid-buffer
    Partial,
}

/// Fill `buf` from `reader`, distinguishing clean EOF from a short read.
async fn read_full<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<ReadOutcome, WireError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Ok(if filled == 0 {
                ReadOutcome::Eof
            } else {
                ReadOutcome::Partial
            });
        }
        filled += n;
    }
    Ok(ReadOutcome::Full)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::time::{Duration, UNIX_EPOCH};

    use bytes::Bytes;

    use crate::wire::PcapWriter;

    use super::*;

    async fn encode(packets: &[Packet]) -> Vec<u8> {
        let mut writer = PcapWriter::new(Vec::new());
        writer
            .write_file_header(65535, LinkType::ETHERNET)
            .await
            .unwrap();
        for packet in packets {
            writer.write_packet(packet).await.unwrap();
        }
        writer.into_inner()
    }

    #[tokio::test]
    async fn test_decode_own_output() {
        let sent = vec![
            Packet::full(
                UNIX_EPOCH + Duration::from_secs(1),
                Bytes::from_static(b"one"),
            ),
            Packet::full(
                UNIX_EPOCH + Duration::from_micros(1_500_042),
                Bytes::from_static(b"second packet"),
            ),
        ];

        let bytes = encode(&sent).await;
        let mut reader = PcapReader::new(Cursor::new(bytes)).await.unwrap();

        assert_eq!(reader.link_type(), LinkType::ETHERNET);
        assert_eq!(reader.snaplen(), 65535);

        for expected in &sent {
            let got = reader.read_packet().await.unwrap().unwrap();
            assert_eq!(got.data, expected.data);
            assert_eq!(got.info, expected.info);
        }
        assert!(reader.read_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_big_endian_header() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC_MICROS.to_be_bytes());
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&4u16.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 8]); // thiszone + sigfigs
        bytes.extend_from_slice(&262144u32.to_be_bytes());
        bytes.extend_from_slice(&113u32.to_be_bytes());
        // one record: ts 3.000001, 2 bytes
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&[0xca, 0xfe]);

        let mut reader = PcapReader::new(Cursor::new(bytes)).await.unwrap();
        assert_eq!(reader.link_type(), LinkType::LINUX_SLL);
        assert_eq!(reader.snaplen(), 262144);

        let packet = reader.read_packet().await.unwrap().unwrap();
        assert_eq!(packet.data.as_ref(), &[0xca, 0xfe]);
        assert_eq!(packet.info.unix_micros(), (3, 1));
    }

    #[tokio::test]
    async fn test_nanosecond_magic() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC_NANOS.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&65535u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&7u32.to_le_bytes()); // ts_sec
        bytes.extend_from_slice(&500u32.to_le_bytes()); // 500 ns
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(0xff);

        let mut reader = PcapReader::new(Cursor::new(bytes)).await.unwrap();
        let packet = reader.read_packet().await.unwrap().unwrap();

        let expected = UNIX_EPOCH
            + Duration::from_secs(7)
            + Duration::from_nanos(500);
        assert_eq!(packet.info.timestamp, expected);
    }

    #[tokio::test]
    async fn test_bad_magic() {
        let bytes = vec![0u8; FILE_HEADER_LEN];
        let err = PcapReader::new(Cursor::new(bytes)).await.unwrap_err();
        assert!(matches!(err, WireError::BadMagic(0)));
    }

    #[tokio::test]
    async fn test_unsupported_version() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC_MICROS.to_le_bytes());
        bytes.extend_from_slice(&3u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]);

        let err = PcapReader::new(Cursor::new(bytes)).await.unwrap_err();
        assert!(matches!(err, WireError::UnsupportedVersion(3, 0)));
    }

    #[tokio::test]
    async fn test_truncated_record() {
        let packet = Packet::full(UNIX_EPOCH, Bytes::from_static(b"data"));
        let mut bytes = encode(&[packet]).await;
        bytes.truncate(bytes.len() - 2); // chop payload

        let mut reader = PcapReader::new(Cursor::new(bytes)).await.unwrap();
        let err = reader.read_packet().await.unwrap_err();
        assert!(matches!(err, WireError::TruncatedRecord));
    }

    #[tokio::test]
    async fn test_oversized_record_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC_MICROS.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&65535u32.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 8]); // ts
        bytes.extend_from_slice(&(MAX_RECORD_LEN + 1).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        let mut reader = PcapReader::new(Cursor::new(bytes)).await.unwrap();
        let err = reader.read_packet().await.unwrap_err();
        assert!(matches!(err, WireError::RecordTooLarge(_)));
    }
}
