//! Outbound pcap codec
//!
//! Serializes the global header and packet records onto any `AsyncWrite`.
//! Each record is assembled in one buffer and flushed with a single
//! `write_all`, so a record is never interleaved with another writer's
//! output and short writes cannot split a header from its payload.

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::packet::{LinkType, Packet};

use super::{WireError, FILE_HEADER_LEN, MAGIC_MICROS, RECORD_HEADER_LEN, VERSION_MAJOR, VERSION_MINOR};

/// Streaming pcap encoder over an async writer
pub struct PcapWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> PcapWriter<W> {
    /// Wrap a writer. Nothing is written until [`write_file_header`] is
    /// called.
    ///
    /// [`write_file_header`]: PcapWriter::write_file_header
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write the 24-byte pcap global header.
    ///
    /// Must be written exactly once, before any record.
    pub async fn write_file_header(
        &mut self,
        snaplen: u32,
        link_type: LinkType,
    ) -> Result<(), WireError> {
        let mut buf = BytesMut::with_capacity(FILE_HEADER_LEN);
        buf.put_u32_le(MAGIC_MICROS);
        buf.put_u16_le(VERSION_MAJOR);
        buf.put_u16_le(VERSION_MINOR);
        buf.put_i32_le(0); // thiszone
        buf.put_u32_le(0); // sigfigs
        buf.put_u32_le(snaplen);
        buf.put_u32_le(link_type.as_u32());

        self.inner.write_all(&buf).await?;
        Ok(())
    }

    /// Write one packet record: 16-byte header plus payload.
    pub async fn write_packet(&mut self, packet: &Packet) -> Result<(), WireError> {
        let info = &packet.info;
        if packet.data.len() != info.captured_len as usize {
            return Err(WireError::CaptureLengthMismatch {
                expected: info.captured_len,
                actual: packet.data.len(),
            });
        }

        let (ts_sec, ts_usec) = info.unix_micros();

        let mut buf = BytesMut::with_capacity(RECORD_HEADER_LEN + packet.data.len());
        buf.put_u32_le(ts_sec);
        buf.put_u32_le(ts_usec);
        buf.put_u32_le(info.captured_len);
        buf.put_u32_le(info.original_len);
        buf.extend_from_slice(&packet.data);

        self.inner.write_all(&buf).await?;
        Ok(())
    }

    /// Access the underlying writer (used to shut the connection down)
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap into the underlying writer
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use bytes::Bytes;

    use crate::packet::CaptureInfo;

    use super::*;

    #[tokio::test]
    async fn test_file_header_golden_bytes() {
        let mut writer = PcapWriter::new(Vec::new());
        writer
            .write_file_header(65535, LinkType::ETHERNET)
            .await
            .unwrap();

        let expected: &[u8] = &[
            0xd4, 0xc3, 0xb2, 0xa1, // magic, little-endian
            0x02, 0x00, 0x04, 0x00, // version 2.4
            0x00, 0x00, 0x00, 0x00, // thiszone
            0x00, 0x00, 0x00, 0x00, // sigfigs
            0xff, 0xff, 0x00, 0x00, // snaplen 65535
            0x01, 0x00, 0x00, 0x00, // ethernet
        ];
        assert_eq!(writer.into_inner(), expected);
    }

    #[tokio::test]
    async fn test_record_golden_bytes() {
        let packet = Packet::new(
            CaptureInfo {
                timestamp: UNIX_EPOCH + Duration::new(2, 7),
                captured_len: 4,
                original_len: 6,
            },
            Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]),
        );

        let mut writer = PcapWriter::new(Vec::new());
        writer.write_packet(&packet).await.unwrap();

        let expected: &[u8] = &[
            0x02, 0x00, 0x00, 0x00, // ts_sec
            0x00, 0x00, 0x00, 0x00, // ts_usec (7ns truncates to 0)
            0x04, 0x00, 0x00, 0x00, // incl_len
            0x06, 0x00, 0x00, 0x00, // orig_len
            0xde, 0xad, 0xbe, 0xef,
        ];
        assert_eq!(writer.into_inner(), expected);
    }

    #[tokio::test]
    async fn test_capture_length_mismatch_rejected() {
        let packet = Packet::new(
            CaptureInfo {
                timestamp: UNIX_EPOCH,
                captured_len: 10,
                original_len: 10,
            },
            Bytes::from_static(b"short"),
        );

        let mut writer = PcapWriter::new(Vec::new());
        let err = writer.write_packet(&packet).await.unwrap_err();
        assert!(matches!(
            err,
            WireError::CaptureLengthMismatch {
                expected: 10,
                actual: 5
            }
        ));
    }
}
