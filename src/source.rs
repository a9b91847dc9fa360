//! Packet source plumbing
//!
//! A [`PacketSource`] produces an ordered, lazy sequence of packets;
//! [`pump`] pulls from it one packet at a time and pushes into the broker's
//! bounded ingestion queue. The queue's capacity is the only thing that
//! lets the source run ahead of broadcast processing; when the broker is
//! busy, the pump waits.
//!
//! Exhaustion is a normal termination signal: `pump` returns, drops the
//! [`PacketSender`], and that closed queue is what shuts the broker down.

use tokio::io::AsyncRead;

use crate::broker::PacketSender;
use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::wire::PcapReader;

/// An ordered, finite-or-infinite sequence of captured packets
#[allow(async_fn_in_trait)]
pub trait PacketSource {
    /// Pull the next packet. `Ok(None)` means the capture is exhausted,
    /// which is not an error.
    async fn next_packet(&mut self) -> Result<Option<Packet>>;
}

impl<R: AsyncRead + Unpin + Send> PacketSource for PcapReader<R> {
    async fn next_packet(&mut self) -> Result<Option<Packet>> {
        Ok(self.read_packet().await?)
    }
}

/// Feed a source into the broker until the source ends or fails.
///
/// Returns the number of packets forwarded. A closed broker (shutdown
/// already triggered elsewhere) ends the pump cleanly rather than erroring.
pub async fn pump<S: PacketSource>(mut source: S, sender: PacketSender) -> Result<u64> {
    let mut forwarded = 0u64;

    loop {
        let packet = match source.next_packet().await? {
            Some(packet) => packet,
            None => {
                tracing::info!(forwarded, "Packet source exhausted");
                return Ok(forwarded);
            }
        };

        if let Err(Error::BrokerClosed) = sender.send(packet).await {
            tracing::debug!(forwarded, "Broker closed, stopping pump");
            return Ok(forwarded);
        }
        forwarded += 1;
    }
}
