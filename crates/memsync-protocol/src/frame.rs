//! Peer wire frames and their stream codec

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use memsync_core::{Delta, MergeReport, ReplicaId};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// Version of the peer protocol; both ends must agree during the handshake
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest frame body accepted from a peer (16MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_PREFIX: usize = 4;

/// A message exchanged between two replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    /// First frame on every link, sent by both sides
    Hello { replica_id: ReplicaId, protocol: u32 },

    /// A batch of writes
    Delta {
        seq: u64,
        #[serde(with = "entry_blobs")]
        delta: Delta,
    },

    /// Asks the peer for a `Scoped` batch of everything under `scope`
    Pull { scope: Bytes },

    /// A batch limited to one key or folder; never moves cursors
    Scoped {
        seq: u64,
        #[serde(with = "entry_blobs")]
        delta: Delta,
    },

    /// Acknowledges the `Delta` or `Scoped` batch with the same `seq`
    Ack {
        seq: u64,
        applied: u64,
        superseded: u64,
        rejected: u64,
    },

    Ping,

    Pong,

    /// Orderly shutdown of the session
    Bye,
}

impl Frame {
    pub fn hello(replica_id: ReplicaId) -> Self {
        Frame::Hello {
            replica_id,
            protocol: PROTOCOL_VERSION,
        }
    }

    /// Acknowledgement summarizing how a delta was merged
    pub fn ack(seq: u64, report: &MergeReport) -> Self {
        Frame::Ack {
            seq,
            applied: report.applied as u64,
            superseded: report.superseded as u64,
            rejected: report.rejected.len() as u64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::Delta { .. } => "delta",
            Frame::Pull { .. } => "pull",
            Frame::Scoped { .. } => "scoped",
            Frame::Ack { .. } => "ack",
            Frame::Ping => "ping",
            Frame::Pong => "pong",
            Frame::Bye => "bye",
        }
    }

    /// Encode the frame body (no length prefix)
    pub fn to_bytes(&self) -> ProtocolResult<Vec<u8>> {
        rmp_serde::to_vec_named(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode a frame body (no length prefix)
    pub fn from_slice(body: &[u8]) -> ProtocolResult<Self> {
        if body.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: body.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        rmp_serde::from_slice(body).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Delta entries travel as individually encoded blobs
///
/// An entry that fails to decode becomes an undecodable placeholder, which
/// the merge engine rejects on its own while the rest of the batch applies.
mod entry_blobs {
    use bytes::Bytes;
    use memsync_core::{Delta, DeltaEntry};
    use serde::ser::{Error as _, SerializeSeq};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(delta: &Delta, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(delta.len()))?;
        for entry in delta.entries() {
            let blob = rmp_serde::to_vec_named(entry).map_err(S::Error::custom)?;
            seq.serialize_element(&Bytes::from(blob))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Delta, D::Error> {
        let blobs = Vec::<Bytes>::deserialize(deserializer)?;
        Ok(blobs
            .iter()
            .map(|blob| {
                rmp_serde::from_slice(blob)
                    .unwrap_or_else(|e| DeltaEntry::undecodable(e.to_string()))
            })
            .collect())
    }
}

/// Length-prefixed framing for byte streams
///
/// Each frame is a 4-byte big-endian body length followed by the body.
pub struct FrameCodec {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_frame_size,
        }
    }

    /// Encode a frame with its length prefix
    pub fn encode(&self, frame: &Frame) -> ProtocolResult<Bytes> {
        let mut buf = BytesMut::new();
        self.encode_into(frame, &mut buf)?;
        Ok(buf.freeze())
    }

    pub fn encode_into(&self, frame: &Frame, buf: &mut BytesMut) -> ProtocolResult<()> {
        let body = frame.to_bytes()?;
        if body.len() > self.max_frame_size {
            return Err(ProtocolError::MessageTooLarge {
                size: body.len(),
                max: self.max_frame_size,
            });
        }

        buf.reserve(LENGTH_PREFIX + body.len());
        buf.put_u32(body.len() as u32);
        buf.put_slice(&body);
        Ok(())
    }

    /// Add received bytes to the decode buffer
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Buffer to read into directly, e.g. with `AsyncReadExt::read_buf`
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buffer
    }

    /// Try to decode the next complete frame from the buffer
    pub fn decode(&mut self) -> ProtocolResult<Option<Frame>> {
        if self.buffer.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let mut prefix = [0u8; LENGTH_PREFIX];
        prefix.copy_from_slice(&self.buffer[..LENGTH_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;

        if len > self.max_frame_size {
            warn!(size = len, max = self.max_frame_size, "Rejecting oversized frame");
            return Err(ProtocolError::MessageTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        if self.buffer.len() < LENGTH_PREFIX + len {
            self.buffer.reserve(LENGTH_PREFIX + len - self.buffer.len());
            return Ok(None);
        }

        self.buffer.advance(LENGTH_PREFIX);
        let body = self.buffer.split_to(len);
        let frame = Frame::from_slice(&body)?;
        trace!(frame = frame.name(), size = len, "Decoded frame");
        Ok(Some(frame))
    }

    /// Bytes received but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memsync_core::{DeltaEntry, VersionStamp};

    fn sample_delta() -> Delta {
        let replica = ReplicaId::from_u128(42);
        vec![
            DeltaEntry {
                key: Bytes::from_static(b"test"),
                payload: Bytes::from_static(b"present"),
                stamp: Some(VersionStamp::new(replica, 1)),
                tombstone: false,
                ..DeltaEntry::default()
            },
            DeltaEntry {
                key: Bytes::from_static(b"gone"),
                payload: Bytes::new(),
                stamp: Some(VersionStamp::new(replica, 2)),
                tombstone: true,
                ..DeltaEntry::default()
            },
        ]
        .into()
    }

    #[test]
    fn test_delta_frame_survives_codec() {
        let codec = FrameCodec::new();
        let frame = Frame::Delta {
            seq: 3,
            delta: sample_delta(),
        };

        let encoded = codec.encode(&frame).unwrap();
        assert_eq!(
            u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]) as usize,
            encoded.len() - LENGTH_PREFIX
        );

        let mut decoder = FrameCodec::new();
        decoder.feed(&encoded);
        assert_eq!(decoder.decode().unwrap(), Some(frame));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_partial_frames_wait_for_more_bytes() {
        let codec = FrameCodec::new();
        let mut stream = BytesMut::new();
        codec
            .encode_into(&Frame::hello(ReplicaId::from_u128(1)), &mut stream)
            .unwrap();
        codec.encode_into(&Frame::Ping, &mut stream).unwrap();

        let mut decoder = FrameCodec::new();
        decoder.feed(&stream[..2]);
        assert_eq!(decoder.decode().unwrap(), None);
        decoder.feed(&stream[2..7]);
        assert_eq!(decoder.decode().unwrap(), None);
        decoder.feed(&stream[7..]);

        assert!(matches!(
            decoder.decode().unwrap(),
            Some(Frame::Hello { protocol: PROTOCOL_VERSION, .. })
        ));
        assert_eq!(decoder.decode().unwrap(), Some(Frame::Ping));
        assert_eq!(decoder.decode().unwrap(), None);
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = FrameCodec::with_max_frame_size(16);
        decoder.feed(&(1024u32).to_be_bytes());
        assert!(matches!(
            decoder.decode(),
            Err(ProtocolError::MessageTooLarge { size: 1024, max: 16 })
        ));

        let small = FrameCodec::with_max_frame_size(4);
        assert!(small
            .encode(&Frame::Delta {
                seq: 1,
                delta: sample_delta()
            })
            .is_err());
    }

    #[test]
    fn test_garbage_body_is_decode_error() {
        let mut decoder = FrameCodec::new();
        decoder.feed(&3u32.to_be_bytes());
        decoder.feed(&[0xc1, 0xc1, 0xc1]);
        assert!(matches!(decoder.decode(), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_ack_from_report() {
        let report = MergeReport {
            applied: 2,
            superseded: 1,
            ..Default::default()
        };
        assert_eq!(
            Frame::ack(9, &report),
            Frame::Ack {
                seq: 9,
                applied: 2,
                superseded: 1,
                rejected: 0
            }
        );
    }

    #[test]
    fn test_unstamped_entry_still_decodes() {
        // A peer may send an entry without a stamp; it must reach the merge
        // engine to be rejected there rather than failing the frame.
        let delta: Delta = vec![DeltaEntry {
            key: Bytes::from_static(b"k"),
            payload: Bytes::from_static(b"v"),
            stamp: None,
            tombstone: false,
            ..DeltaEntry::default()
        }]
        .into();
        let body = Frame::Delta { seq: 1, delta: delta.clone() }.to_bytes().unwrap();
        assert_eq!(
            Frame::from_slice(&body).unwrap(),
            Frame::Delta { seq: 1, delta }
        );
    }

    #[test]
    fn test_ill_typed_entry_rejected_alone() {
        #[derive(Serialize)]
        struct IllTyped {
            key: u32,
            stamp: &'static str,
        }

        // Same variant name as the real frame, with raw entry blobs
        #[derive(Serialize)]
        enum RawFrame {
            Delta { seq: u64, delta: Vec<Bytes> },
        }

        let good = sample_delta().entries()[0].clone();
        let raw = RawFrame::Delta {
            seq: 4,
            delta: vec![
                Bytes::from(rmp_serde::to_vec_named(&good).unwrap()),
                Bytes::from(rmp_serde::to_vec_named(&IllTyped { key: 7, stamp: "nope" }).unwrap()),
            ],
        };
        let body = rmp_serde::to_vec_named(&raw).unwrap();

        let delta = match Frame::from_slice(&body).unwrap() {
            Frame::Delta { seq: 4, delta } => delta,
            other => panic!("unexpected frame {:?}", other),
        };
        assert_eq!(delta.len(), 2);
        assert_eq!(delta.entries()[0], good);
        assert!(delta.entries()[1].decode_error.is_some());

        let store = memsync_core::Store::new();
        let report = store.apply_delta(&delta, memsync_core::ChangeOrigin::Remote);
        assert_eq!(report.applied, 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].index, 1);
    }

    #[test]
    fn test_pull_and_scoped_frames_survive_codec() {
        let codec = FrameCodec::new();
        let mut decoder = FrameCodec::new();
        for frame in [
            Frame::Pull {
                scope: Bytes::from_static(b"folder/"),
            },
            Frame::Scoped {
                seq: 2,
                delta: sample_delta(),
            },
        ] {
            decoder.feed(&codec.encode(&frame).unwrap());
            assert_eq!(decoder.decode().unwrap(), Some(frame));
        }
    }
}
