//! Sync frame
//!
//! Frame layout is 38 bytes, little-endian:
//! - Byte 0: Wire version (4 bits) + Frame kind (4 bits)
//! - Byte 1: Snapshot flags
//! - Bytes 2-9: Object ID
//! - Bytes 10-17: Sender replica ID
//! - Bytes 18-21: Snapshot version
//! - Bytes 22-29: Anchor network time (f64 seconds)
//! - Bytes 30-37: Anchor timeline time (f64 seconds)

use bytes::{Buf, BufMut, Bytes, BytesMut};
use lockstep_core::{LockstepError, LockstepResult, NetworkTime, ObjectId, ReplicaId, SyncSnapshot};

use crate::SnapshotFlags;

/// Frame size in bytes
pub const FRAME_SIZE: usize = 38;

/// Current wire protocol version
pub const WIRE_VERSION: u8 = 0;

/// What a frame is for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Owner broadcast after a mutation
    Snapshot = 1,
    /// Unchanged snapshot pushed for late joiners
    FullState = 2,
    /// A replica announcing it has joined and needs the current state
    JoinRequest = 3,
}

impl FrameKind {
    pub fn from_nibble(n: u8) -> Option<Self> {
        match n {
            1 => Some(FrameKind::Snapshot),
            2 => Some(FrameKind::FullState),
            3 => Some(FrameKind::JoinRequest),
            _ => None,
        }
    }

    #[inline]
    pub fn to_nibble(self) -> u8 {
        self as u8
    }

    /// Frames that carry a snapshot worth applying
    #[inline]
    pub fn carries_state(self) -> bool {
        matches!(self, FrameKind::Snapshot | FrameKind::FullState)
    }
}

/// One replication message
#[derive(Clone, Debug, PartialEq)]
pub struct SyncFrame {
    pub kind: FrameKind,
    pub object_id: ObjectId,
    pub sender: ReplicaId,
    /// Default (paused at zero, version 0) for join requests
    pub snapshot: SyncSnapshot,
}

impl SyncFrame {
    pub fn snapshot(object_id: ObjectId, sender: ReplicaId, snapshot: SyncSnapshot) -> Self {
        SyncFrame {
            kind: FrameKind::Snapshot,
            object_id,
            sender,
            snapshot,
        }
    }

    pub fn full_state(object_id: ObjectId, sender: ReplicaId, snapshot: SyncSnapshot) -> Self {
        SyncFrame {
            kind: FrameKind::FullState,
            object_id,
            sender,
            snapshot,
        }
    }

    pub fn join_request(object_id: ObjectId, sender: ReplicaId) -> Self {
        SyncFrame {
            kind: FrameKind::JoinRequest,
            object_id,
            sender,
            snapshot: SyncSnapshot::default(),
        }
    }

    /// Serialize to a fixed-size buffer
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FRAME_SIZE);

        buf.put_u8((WIRE_VERSION << 4) | self.kind.to_nibble());

        let mut flags = SnapshotFlags::NONE;
        flags.set_playing(self.snapshot.is_playing);
        flags.set_loop(self.snapshot.is_loop);
        buf.put_u8(flags.0);

        buf.put_u64_le(self.object_id.0);
        buf.put_u64_le(self.sender.0);
        buf.put_u32_le(self.snapshot.version);
        buf.put_f64_le(self.snapshot.anchor_network_time.as_secs_f64());
        buf.put_f64_le(self.snapshot.anchor_timeline_time);

        buf.freeze()
    }

    /// Parse a frame. Trailing bytes beyond [`FRAME_SIZE`] are rejected.
    pub fn parse(data: &[u8]) -> LockstepResult<Self> {
        if data.len() < FRAME_SIZE {
            return Err(LockstepError::BufferTooShort {
                expected: FRAME_SIZE,
                actual: data.len(),
            });
        }
        if data.len() > FRAME_SIZE {
            return Err(LockstepError::InvalidWireFormat(format!(
                "frame is {} bytes, expected {}",
                data.len(),
                FRAME_SIZE
            )));
        }

        let mut buf = data;

        let first = buf.get_u8();
        let version = first >> 4;
        if version != WIRE_VERSION {
            return Err(LockstepError::UnsupportedWireVersion(version));
        }
        let kind = FrameKind::from_nibble(first & 0x0F)
            .ok_or(LockstepError::UnknownFrameKind(first & 0x0F))?;

        let flags = SnapshotFlags::new(buf.get_u8());
        if flags.has_reserved() {
            return Err(LockstepError::InvalidWireFormat(
                "reserved snapshot flags set".into(),
            ));
        }

        let object_id = ObjectId::new(buf.get_u64_le());
        let sender = ReplicaId::new(buf.get_u64_le());
        let version = buf.get_u32_le();

        let anchor_network_time = buf.get_f64_le();
        if !anchor_network_time.is_finite() {
            return Err(LockstepError::NonFiniteValue("anchor_network_time"));
        }
        let anchor_timeline_time = buf.get_f64_le();
        if !anchor_timeline_time.is_finite() {
            return Err(LockstepError::NonFiniteValue("anchor_timeline_time"));
        }

        Ok(SyncFrame {
            kind,
            object_id,
            sender,
            snapshot: SyncSnapshot {
                anchor_network_time: NetworkTime::from_secs_f64(anchor_network_time),
                anchor_timeline_time,
                is_playing: flags.is_playing(),
                is_loop: flags.is_loop(),
                version,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> SyncFrame {
        SyncFrame::snapshot(
            ObjectId::new(7),
            ReplicaId::new(42),
            SyncSnapshot {
                anchor_network_time: NetworkTime::from_secs_f64(1234.5),
                anchor_timeline_time: 12.25,
                is_playing: true,
                is_loop: false,
                version: 9,
            },
        )
    }

    #[test]
    fn test_encode_layout() {
        let bytes = sample().encode();
        assert_eq!(bytes.len(), FRAME_SIZE);
        assert_eq!(bytes[0], FrameKind::Snapshot.to_nibble());
        assert_eq!(bytes[1], SnapshotFlags::PLAYING);
        assert_eq!(bytes[2], 7);
        assert_eq!(bytes[10], 42);
        assert_eq!(bytes[18], 9);
    }

    #[test]
    fn test_parse_encoded() {
        let frame = sample();
        let parsed = SyncFrame::parse(&frame.encode()).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_join_request_has_default_snapshot() {
        let frame = SyncFrame::join_request(ObjectId::new(1), ReplicaId::new(2));
        let parsed = SyncFrame::parse(&frame.encode()).unwrap();
        assert_eq!(parsed.kind, FrameKind::JoinRequest);
        assert!(!parsed.kind.carries_state());
        assert_eq!(parsed.snapshot, SyncSnapshot::default());
    }

    #[test]
    fn test_short_buffer() {
        let bytes = sample().encode();
        match SyncFrame::parse(&bytes[..20]) {
            Err(LockstepError::BufferTooShort { expected, actual }) => {
                assert_eq!(expected, FRAME_SIZE);
                assert_eq!(actual, 20);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_kind_and_version() {
        let mut bytes = sample().encode().to_vec();
        bytes[0] = 0x0F;
        assert!(matches!(
            SyncFrame::parse(&bytes),
            Err(LockstepError::UnknownFrameKind(0x0F))
        ));

        bytes[0] = 0x11;
        assert!(matches!(
            SyncFrame::parse(&bytes),
            Err(LockstepError::UnsupportedWireVersion(1))
        ));
    }

    #[test]
    fn test_rejects_reserved_flags() {
        let mut bytes = sample().encode().to_vec();
        bytes[1] |= 0x40;
        assert!(matches!(
            SyncFrame::parse(&bytes),
            Err(LockstepError::InvalidWireFormat(_))
        ));
    }

    #[test]
    fn test_rejects_non_finite_anchor() {
        let mut bytes = sample().encode().to_vec();
        bytes[30..38].copy_from_slice(&f64::NAN.to_le_bytes());
        assert!(matches!(
            SyncFrame::parse(&bytes),
            Err(LockstepError::NonFiniteValue("anchor_timeline_time"))
        ));
    }

    proptest! {
        #[test]
        fn prop_parse_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
            let _ = SyncFrame::parse(&data);
        }
    }
}
