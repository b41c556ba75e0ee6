//! Snapshot flags byte

/// Boolean snapshot fields packed into one byte
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotFlags(pub u8);

impl SnapshotFlags {
    pub const NONE: SnapshotFlags = SnapshotFlags(0);

    pub const PLAYING: u8 = 0b0000_0001;
    pub const LOOP: u8 = 0b0000_0010;
    /// Bits with no meaning yet; must be zero on the wire
    pub const RESERVED: u8 = 0b1111_1100;

    #[inline]
    pub fn new(bits: u8) -> Self {
        SnapshotFlags(bits)
    }

    #[inline]
    pub fn is_playing(self) -> bool {
        self.0 & Self::PLAYING != 0
    }

    #[inline]
    pub fn is_loop(self) -> bool {
        self.0 & Self::LOOP != 0
    }

    #[inline]
    pub fn has_reserved(self) -> bool {
        self.0 & Self::RESERVED != 0
    }

    #[inline]
    pub fn set_playing(&mut self, value: bool) {
        if value {
            self.0 |= Self::PLAYING;
        } else {
            self.0 &= !Self::PLAYING;
        }
    }

    #[inline]
    pub fn set_loop(&mut self, value: bool) {
        if value {
            self.0 |= Self::LOOP;
        } else {
            self.0 &= !Self::LOOP;
        }
    }
}
