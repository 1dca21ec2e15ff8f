//! Owned memory regions that make up a stream.

use std::fmt;

use crate::error::{Error, Result};

/// Which tier a segment came from and will return to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Fixed-size block from the small tier
    Small,
    /// Size-classed buffer from the large tier
    Large,
    /// Oversized buffer that never enters a pool
    Unpooled,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Small => write!(f, "small"),
            Tier::Large => write!(f, "large"),
            Tier::Unpooled => write!(f, "unpooled"),
        }
    }
}

/// A single owned byte region plus the tier it belongs to.
///
/// Pooled memory may still hold a previous tenant's bytes; the stream is
/// responsible for never exposing anything it did not write or zero itself.
pub struct Segment {
    buf: Box<[u8]>,
    tier: Tier,
}

impl Segment {
    #[inline]
    pub(crate) fn new(buf: Box<[u8]>, tier: Tier) -> Self {
        Self { buf, tier }
    }

    #[inline]
    pub fn tier(&self) -> Tier {
        self.tier
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    #[inline]
    pub(crate) fn into_buf(self) -> Box<[u8]> {
        self.buf
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("tier", &self.tier)
            .field("len", &self.buf.len())
            .finish()
    }
}

/// Allocate `len` zeroed bytes, reporting exhaustion instead of aborting.
pub(crate) fn allocate_zeroed(len: usize) -> Result<Box<[u8]>> {
    let mut buf: Vec<u8> = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory { requested: len })?;
    buf.resize(len, 0);
    Ok(buf.into_boxed_slice())
}
