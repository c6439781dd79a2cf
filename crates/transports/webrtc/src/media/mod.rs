//! Media relay, recording sinks and local sources
//!
//! Recorders and local sources share one on-disk format, the packet dump:
//!
//! ```text
//! magic "PLNKDUMP"
//! repeated: [u32 payload len][u16 seq][u32 timestamp][u8 payload type][u8 marker][payload]
//! ```
//!
//! All integers are big-endian.

pub mod recorder;
pub mod relay;
pub mod source;

pub use recorder::{FileRecorder, FileRecorderFactory, Recorder, RecorderFactory};
pub use relay::{ConsumerId, MediaRelay, TrackConsumer};
pub use source::{LocalMediaSource, PacketFileSource};

use crate::engine::MediaPacket;
use crate::{Error, Result};
use bytes::{Buf, BufMut, Bytes};

/// File magic of a packet dump
pub const DUMP_MAGIC: &[u8; 8] = b"PLNKDUMP";

const RECORD_HEADER_LEN: usize = 4 + 2 + 4 + 1 + 1;

/// Append one packet record to `buf`
pub fn encode_packet(buf: &mut Vec<u8>, packet: &MediaPacket) {
    buf.reserve(RECORD_HEADER_LEN + packet.payload.len());
    buf.put_u32(packet.payload.len() as u32);
    buf.put_u16(packet.sequence_number);
    buf.put_u32(packet.timestamp);
    buf.put_u8(packet.payload_type);
    buf.put_u8(packet.marker as u8);
    buf.put_slice(&packet.payload);
}

/// Parse a whole packet dump, magic included
pub fn decode_packets(mut data: Bytes) -> Result<Vec<MediaPacket>> {
    if data.len() < DUMP_MAGIC.len() || &data[..DUMP_MAGIC.len()] != DUMP_MAGIC {
        return Err(Error::MediaTrackError(
            "not a packet dump (bad magic)".to_string(),
        ));
    }
    data.advance(DUMP_MAGIC.len());

    let mut packets = Vec::new();
    while data.has_remaining() {
        if data.remaining() < RECORD_HEADER_LEN {
            return Err(Error::MediaTrackError(format!(
                "truncated record header after {} packets",
                packets.len()
            )));
        }
        let len = data.get_u32() as usize;
        let sequence_number = data.get_u16();
        let timestamp = data.get_u32();
        let payload_type = data.get_u8();
        let marker = data.get_u8() != 0;
        if data.remaining() < len {
            return Err(Error::MediaTrackError(format!(
                "truncated payload in packet {}",
                packets.len()
            )));
        }
        packets.push(MediaPacket {
            payload: data.split_to(len),
            sequence_number,
            timestamp,
            marker,
            payload_type,
        });
    }
    Ok(packets)
}

#[cfg(test)]
pub(crate) fn packet(seq: u16) -> MediaPacket {
    MediaPacket {
        payload: Bytes::from(vec![seq as u8; 4]),
        sequence_number: seq,
        timestamp: seq as u32 * 960,
        marker: false,
        payload_type: 111,
    }
}
