//! Opaque stream handles.
//!
//! A handle names a registry slot and the generation the slot had when the
//! stream was registered. Closing a stream bumps the generation, so a stale
//! handle never reaches a stream that later reuses the slot.

use std::fmt;

/// Tag occupying the top 16 bits of a raw handle.
const RAW_TAG: u64 = 0x5354;
const TAG_SHIFT: u32 = 48;
const GENERATION_SHIFT: u32 = 32;

/// Handle to an open stream.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamHandle {
    pub(crate) index: u32,
    pub(crate) generation: u16,
}

impl StreamHandle {
    pub(crate) fn new(index: u32, generation: u16) -> Self {
        Self { index, generation }
    }

    /// Pack into an integer suitable for crossing an FFI-style boundary.
    pub fn into_raw(self) -> u64 {
        (RAW_TAG << TAG_SHIFT)
            | (u64::from(self.generation) << GENERATION_SHIFT)
            | u64::from(self.index)
    }

    /// Unpack a value produced by [`StreamHandle::into_raw`].
    ///
    /// Returns `None` for zero and for values that do not carry the handle
    /// tag. A well-formed value may still name a closed stream; the
    /// registry decides that.
    pub fn from_raw(raw: u64) -> Option<Self> {
        if raw >> TAG_SHIFT != RAW_TAG {
            return None;
        }
        Some(Self {
            index: (raw & u64::from(u32::MAX)) as u32,
            generation: ((raw >> GENERATION_SHIFT) & u64::from(u16::MAX)) as u16,
        })
    }
}

impl fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamHandle({}#{})", self.index, self.generation)
    }
}
