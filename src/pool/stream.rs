//! Growable, seekable byte stream over pooled segments.

use bytes::Bytes;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use super::manager::PoolInner;
use super::segment::Segment;
use crate::error::{Error, Result};
use crate::types::StreamId;

/// A byte stream whose storage is borrowed from a `PoolManager`.
///
/// The logical contents are the concatenation of the stream's segments up to
/// `len()`. Segments need not be contiguous in memory and may hold bytes
/// left behind by a previous tenant; every byte below `len()` has either been
/// written by this stream or zeroed by it, and nothing at or above `len()` is
/// ever readable.
///
/// A stream must be released explicitly, with [`PooledStream::release`],
/// [`PoolManager::release`](super::PoolManager::release), or by acquiring it
/// scoped. Dropping an unreleased stream still returns its memory to the
/// pools but is reported as a leak.
pub struct PooledStream {
    id: StreamId,
    tag: Arc<str>,
    pool: Arc<PoolInner>,
    segments: Vec<Segment>,
    /// Logical offset at which each segment starts.
    offsets: Vec<usize>,
    capacity: usize,
    length: usize,
    position: usize,
    released: bool,
}

impl PooledStream {
    pub(crate) fn new(
        pool: Arc<PoolInner>,
        tag: Arc<str>,
        segments: Vec<Segment>,
        requested: usize,
    ) -> Self {
        let id = StreamId::next();
        pool.register(id, tag.clone(), requested);

        let mut stream = Self {
            id,
            tag,
            pool,
            segments: Vec::with_capacity(segments.len()),
            offsets: Vec::with_capacity(segments.len()),
            capacity: 0,
            length: 0,
            position: 0,
            released: false,
        };
        for segment in segments {
            stream.push_segment(segment);
        }
        stream
    }

    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    #[inline]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Logical length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current read/write cursor.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Total bytes held across all segments.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of segments backing the stream.
    #[inline]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Move the cursor. Positions past the end are allowed; the gap is
    /// zero-filled by the next write.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        self.check_live()?;
        self.check_stream_cap(position)?;
        self.position = position;
        Ok(())
    }

    /// Change the logical length. Growing zero-fills the new range;
    /// shrinking keeps the memory and clamps the cursor.
    pub fn set_len(&mut self, new_len: usize) -> Result<()> {
        self.check_live()?;
        if new_len > self.length {
            self.ensure_capacity(new_len)?;
            self.zero_range(self.length, new_len - self.length);
        }
        self.length = new_len;
        self.position = self.position.min(new_len);
        Ok(())
    }

    /// Fill `buf` from `offset` without moving the cursor.
    ///
    /// Fails with `ReadPastEnd` if the range extends beyond `len()`.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        self.check_live()?;
        let end = offset.checked_add(buf.len());
        if end.map_or(true, |end| end > self.length) {
            return Err(Error::ReadPastEnd {
                offset,
                requested: buf.len(),
                length: self.length,
            });
        }
        self.copy_out(offset, buf);
        Ok(())
    }

    /// Copy of the logical contents.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        self.check_live()?;
        let mut out = vec![0u8; self.length];
        self.copy_out(0, &mut out);
        Ok(out)
    }

    /// Copy of the logical contents as `Bytes`.
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.to_vec().map(Bytes::from)
    }

    /// Write the logical contents to `writer`, segment by segment.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.check_live()?;
        let mut remaining = self.length;
        for segment in &self.segments {
            if remaining == 0 {
                break;
            }
            let n = remaining.min(segment.len());
            writer.write_all(&segment.as_slice()[..n])?;
            remaining -= n;
        }
        Ok(())
    }

    /// Contents as one contiguous slice.
    ///
    /// A stream spanning several segments is consolidated into a single
    /// buffer from the large tier (unpooled above `max_buffer_size`) and its
    /// old segments go back to their pools. Later writes keep working; they
    /// grow the stream with blocks again.
    pub fn contiguous(&mut self) -> Result<&[u8]> {
        self.check_live()?;
        if self.segments.len() > 1 {
            let mut merged = self.pool.take_large(self.length)?;
            self.copy_out(0, &mut merged.as_mut_slice()[..self.length]);

            let old = std::mem::take(&mut self.segments);
            self.offsets.clear();
            self.capacity = 0;
            self.push_segment(merged);
            self.pool.consolidated(old);
        }

        Ok(match self.segments.first() {
            Some(segment) => &segment.as_slice()[..self.length],
            None => &[],
        })
    }

    /// Return every segment to the pools and mark the stream released.
    ///
    /// Calling this a second time is a no-op that is reported as a
    /// double-release diagnostic.
    pub fn release(&mut self) {
        if self.released {
            self.pool.double_release(self.id, &self.tag);
            return;
        }
        let segments = self.detach();
        self.pool.complete_release(self.id, segments);
    }

    pub(crate) fn belongs_to(&self, pool: &Arc<PoolInner>) -> bool {
        Arc::ptr_eq(&self.pool, pool)
    }

    // -- internals ---------------------------------------------------------

    fn detach(&mut self) -> Vec<Segment> {
        self.released = true;
        self.offsets.clear();
        self.capacity = 0;
        self.length = 0;
        self.position = 0;
        std::mem::take(&mut self.segments)
    }

    #[inline]
    fn check_live(&self) -> Result<()> {
        if self.released {
            return Err(Error::StreamReleased { id: self.id });
        }
        Ok(())
    }

    fn check_stream_cap(&self, required: usize) -> Result<()> {
        match self.pool.max_stream_capacity() {
            Some(maximum) if required > maximum => Err(Error::CapacityExceeded {
                requested: required,
                maximum,
            }),
            _ => Ok(()),
        }
    }

    fn push_segment(&mut self, segment: Segment) {
        self.offsets.push(self.capacity);
        self.capacity += segment.len();
        self.segments.push(segment);
    }

    /// Grow with blocks until at least `required` bytes are addressable.
    /// The per-stream cap applies to `required` itself, not to whatever
    /// rounding up to whole blocks or a size class left spare.
    fn ensure_capacity(&mut self, required: usize) -> Result<()> {
        self.check_stream_cap(required)?;
        if required <= self.capacity {
            return Ok(());
        }
        while self.capacity < required {
            let block = self.pool.take_block()?;
            self.push_segment(block);
        }
        Ok(())
    }

    /// Segment index and offset within it for logical position `pos`.
    #[inline]
    fn locate(&self, pos: usize) -> (usize, usize) {
        let index = self.offsets.partition_point(|&start| start <= pos) - 1;
        (index, pos - self.offsets[index])
    }

    fn copy_out(&self, mut pos: usize, out: &mut [u8]) {
        let mut done = 0;
        while done < out.len() {
            let (index, offset) = self.locate(pos);
            let src = &self.segments[index].as_slice()[offset..];
            let n = src.len().min(out.len() - done);
            out[done..done + n].copy_from_slice(&src[..n]);
            done += n;
            pos += n;
        }
    }

    fn copy_in(&mut self, mut pos: usize, data: &[u8]) {
        let mut done = 0;
        while done < data.len() {
            let (index, offset) = self.locate(pos);
            let dst = &mut self.segments[index].as_mut_slice()[offset..];
            let n = dst.len().min(data.len() - done);
            dst[..n].copy_from_slice(&data[done..done + n]);
            done += n;
            pos += n;
        }
    }

    fn zero_range(&mut self, mut pos: usize, len: usize) {
        let end = pos + len;
        while pos < end {
            let (index, offset) = self.locate(pos);
            let dst = &mut self.segments[index].as_mut_slice()[offset..];
            let n = dst.len().min(end - pos);
            dst[..n].fill(0);
            pos += n;
        }
    }

    fn read_inner(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.check_live()?;
        if self.position >= self.length {
            return Ok(0);
        }
        let n = buf.len().min(self.length - self.position);
        self.copy_out(self.position, &mut buf[..n]);
        self.position += n;
        Ok(n)
    }

    fn write_inner(&mut self, data: &[u8]) -> Result<usize> {
        self.check_live()?;
        if data.is_empty() {
            return Ok(0);
        }
        let end = self
            .position
            .checked_add(data.len())
            .ok_or(Error::CapacityExceeded {
                requested: usize::MAX,
                maximum: usize::MAX,
            })?;
        self.ensure_capacity(end)?;

        // Never let a gap expose what a previous tenant left in the segment.
        if self.position > self.length {
            self.zero_range(self.length, self.position - self.length);
        }
        self.copy_in(self.position, data);
        self.position = end;
        self.length = self.length.max(end);
        Ok(data.len())
    }

    fn seek_inner(&mut self, target: SeekFrom) -> Result<u64> {
        self.check_live()?;
        let position: i128 = match target {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.length as i128 + delta as i128,
        };
        if position < 0 {
            return Err(Error::NegativeSeek { position });
        }
        let position = usize::try_from(position).map_err(|_| Error::CapacityExceeded {
            requested: usize::MAX,
            maximum: usize::MAX,
        })?;
        self.set_position(position)?;
        Ok(position as u64)
    }
}

impl Read for PooledStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_inner(buf).map_err(io::Error::from)
    }
}

impl Write for PooledStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_inner(buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for PooledStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.seek_inner(pos).map_err(io::Error::from)
    }
}

impl Drop for PooledStream {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let segments = self.detach();
        self.pool.finalize(self.id, segments);
    }
}

impl fmt::Debug for PooledStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledStream")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("len", &self.length)
            .field("position", &self.position)
            .field("capacity", &self.capacity)
            .field("segments", &self.segments.len())
            .field("released", &self.released)
            .finish()
    }
}
