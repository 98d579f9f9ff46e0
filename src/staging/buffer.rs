//! A single staging buffer and its recorded, pending copies.

use std::sync::Arc;

use crate::backend::{BufferImageCopy, GpuBackend, GpuBuffer, GpuCommandList, LayoutTransition};
use crate::bitvec::BitVec;
use crate::error::StreamError;
use crate::texture::{LayoutTracker, Texture};
use crate::types::{Barrier, BufferDescriptor, BufferUsage, ImageLayout};

/// Granularity of staging reservations, in bytes (128 KiB).
pub(crate) const STAGING_BLOCK: u64 = 131072;

/// Bits per word of the staging bitmap.
const WORD_BITS: u64 = 32;

/// A layer left pending by a recorded copy, to be resolved when the
/// copy's command list is submitted or abandoned.
pub(crate) struct PendingCopy {
    tracker: Arc<LayoutTracker>,
    layer: usize,
    layout: ImageLayout,
}

/// One staging buffer: a mappable device buffer, a block-granular
/// occupancy bitmap, a command list recording the copies staged so
/// far, and the layers those copies left pending.
pub(crate) struct StagingBuffer {
    backend: Arc<dyn GpuBackend>,
    list: GpuCommandList,
    buf: GpuBuffer,
    bitmap: BitVec<u32>,
    pending: Vec<PendingCopy>,
}

impl StagingBuffer {
    /// Create a staging buffer with at least `size` bytes of capacity,
    /// rounded up to a whole bitmap word of blocks.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub(crate) fn new(backend: Arc<dyn GpuBackend>, size: u64) -> Result<Self, StreamError> {
        assert!(size > 0, "staging buffer size cannot be zero");
        let chunk = STAGING_BLOCK * WORD_BITS;
        let words = (size + chunk - 1) / chunk;
        let size = words * chunk;
        let list = backend.create_command_list()?;
        let buf = backend.create_buffer(
            &BufferDescriptor::new(
                size,
                BufferUsage::COPY_SRC
                    | BufferUsage::COPY_DST
                    | BufferUsage::MAP_READ
                    | BufferUsage::MAP_WRITE,
            )
            .with_label("staging"),
        )?;
        let mut bitmap = BitVec::new();
        bitmap.grow(words as usize);
        Ok(Self {
            backend,
            list,
            buf,
            bitmap,
            pending: Vec::new(),
        })
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.backend.buffer_capacity(&self.buf)
    }

    /// Reserve `n` bytes of staging space and return its byte offset.
    ///
    /// When the bitmap has no free run long enough, the buffer is
    /// committed and then grown; staged contents carry over to the new
    /// buffer.
    ///
    /// # Panics
    ///
    /// Panics if `n` is zero.
    pub(crate) fn reserve(&mut self, n: u64) -> Result<u64, StreamError> {
        assert!(n > 0, "cannot reserve zero bytes");
        let blocks = ((n + STAGING_BLOCK - 1) / STAGING_BLOCK) as usize;
        if let Some(idx) = self.bitmap.search_range(blocks) {
            for b in idx..idx + blocks {
                self.bitmap.set(b);
            }
            return Ok(idx as u64 * STAGING_BLOCK);
        }
        // Execute whatever was staged so far, then grow past the
        // current capacity. The new extent always starts at a word
        // boundary of the bitmap.
        self.commit()?;
        let words = (blocks + WORD_BITS as usize - 1) / WORD_BITS as usize;
        let old_cap = self.capacity();
        let new_cap = old_cap + words as u64 * WORD_BITS * STAGING_BLOCK;
        let new_buf = self.backend.create_buffer(
            &BufferDescriptor::new(
                new_cap,
                BufferUsage::COPY_SRC
                    | BufferUsage::COPY_DST
                    | BufferUsage::MAP_READ
                    | BufferUsage::MAP_WRITE,
            )
            .with_label("staging"),
        )?;
        let mut carry = vec![0u8; old_cap as usize];
        self.backend.read_buffer(&self.buf, 0, &mut carry);
        self.backend.write_buffer(&new_buf, 0, &carry);
        self.buf = new_buf;
        log::trace!("staging buffer grown: {} -> {} bytes", old_cap, new_cap);
        let idx = self.bitmap.grow(words);
        for b in idx..idx + blocks {
            self.bitmap.set(b);
        }
        Ok(idx as u64 * STAGING_BLOCK)
    }

    /// Reserve space for `data` and write it into the buffer.
    ///
    /// Returns the byte offset of the staged data.
    pub(crate) fn stage(&mut self, data: &[u8]) -> Result<u64, StreamError> {
        let off = self.reserve(data.len() as u64)?;
        self.backend.write_buffer(&self.buf, off, data);
        Ok(off)
    }

    /// Read staged data back and release its blocks.
    ///
    /// Returns the number of bytes read, which may be less than
    /// `dst.len()` if the read would pass the end of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `off` is not block-aligned.
    pub(crate) fn unstage(&mut self, off: u64, dst: &mut [u8]) -> usize {
        if off >= self.capacity() {
            return 0;
        }
        assert!(off % STAGING_BLOCK == 0, "misaligned staging offset");
        let n = self.backend.read_buffer(&self.buf, off, dst);
        let first = (off / STAGING_BLOCK) as usize;
        let blocks = (n as u64 + STAGING_BLOCK - 1) / STAGING_BLOCK;
        for b in first..first + blocks as usize {
            self.bitmap.unset(b);
        }
        n
    }

    /// Record a copy of staged data at `off` into every layer of a
    /// texture view, leaving those layers pending until commit.
    pub(crate) fn copy_to_view(
        &mut self,
        tex: &Texture,
        view: usize,
        off: u64,
    ) -> Result<(), StreamError> {
        if tex.samples() != 1 {
            return Err(StreamError::Unsupported(
                "cannot copy data to a multisample texture".into(),
            ));
        }
        if !tex.is_valid_view(view) {
            return Err(StreamError::OutOfBounds("invalid texture view".into()));
        }
        if tex.levels() > 1 {
            return Err(StreamError::Unsupported(
                "staging to mip chains is not supported".into(),
            ));
        }
        let (il, nl) = tex.resolve_view(view);
        let n = tex.view_size(view) as u64;
        if off + n > self.capacity() {
            return Err(StreamError::InsufficientCapacity(format!(
                "copy of {} bytes at offset {} exceeds staging capacity {}",
                n,
                off,
                self.capacity(),
            )));
        }
        self.ensure_recording()?;
        // Contents are overwritten whole, so the previous layout of
        // the destination layers is discarded.
        self.backend.record_transition(
            &self.list,
            &[LayoutTransition {
                barrier: Barrier::copy_write(),
                layout_before: ImageLayout::Undefined,
                layout_after: ImageLayout::CopyDst,
                image: tex.image().clone(),
                layer: il as u32,
                layers: nl as u32,
                level: 0,
                levels: 1,
            }],
        );
        self.backend.record_copy_buffer_to_image(
            &self.list,
            &BufferImageCopy {
                buffer: self.buf.clone(),
                buffer_offset: off,
                row_stride: tex.width(),
                slice_stride: tex.height(),
                image: tex.image().clone(),
                image_layer: il as u32,
                level: 0,
                extent: tex.extent(),
                layers: nl as u32,
            },
        );
        for i in 0..nl {
            tex.tracker().set_pending(il + i);
            self.pending.push(PendingCopy {
                tracker: tex.tracker().clone(),
                layer: il + i,
                layout: ImageLayout::CopyDst,
            });
        }
        Ok(())
    }

    /// Record a copy of every layer of a texture view into staging
    /// space at `off`, leaving those layers pending until commit.
    pub(crate) fn copy_from_view(
        &mut self,
        tex: &Texture,
        view: usize,
        off: u64,
    ) -> Result<(), StreamError> {
        if tex.samples() != 1 {
            return Err(StreamError::Unsupported(
                "cannot copy data from a multisample texture".into(),
            ));
        }
        if !tex.is_valid_view(view) {
            return Err(StreamError::OutOfBounds("invalid texture view".into()));
        }
        if tex.levels() > 1 {
            return Err(StreamError::Unsupported(
                "staging from mip chains is not supported".into(),
            ));
        }
        let (il, nl) = tex.resolve_view(view);
        let n = tex.view_size(view) as u64;
        if off + n > self.capacity() {
            return Err(StreamError::InsufficientCapacity(format!(
                "copy of {} bytes at offset {} exceeds staging capacity {}",
                n,
                off,
                self.capacity(),
            )));
        }
        self.ensure_recording()?;
        let mut before = Vec::with_capacity(nl);
        let mut differ = false;
        for i in 0..nl {
            let prev = tex.tracker().set_pending(il + i);
            differ = differ || (i > 0 && prev != before[i - 1]);
            before.push(prev);
        }
        if differ {
            let transitions: Vec<_> = before
                .iter()
                .enumerate()
                .map(|(i, &prev)| LayoutTransition {
                    barrier: Barrier::copy_read(),
                    layout_before: prev,
                    layout_after: ImageLayout::CopySrc,
                    image: tex.image().clone(),
                    layer: (il + i) as u32,
                    layers: 1,
                    level: 0,
                    levels: 1,
                })
                .collect();
            self.backend.record_transition(&self.list, &transitions);
        } else {
            self.backend.record_transition(
                &self.list,
                &[LayoutTransition {
                    barrier: Barrier::copy_read(),
                    layout_before: before[0],
                    layout_after: ImageLayout::CopySrc,
                    image: tex.image().clone(),
                    layer: il as u32,
                    layers: nl as u32,
                    level: 0,
                    levels: 1,
                }],
            );
        }
        self.backend.record_copy_image_to_buffer(
            &self.list,
            &BufferImageCopy {
                buffer: self.buf.clone(),
                buffer_offset: off,
                row_stride: tex.width(),
                slice_stride: tex.height(),
                image: tex.image().clone(),
                image_layer: il as u32,
                level: 0,
                extent: tex.extent(),
                layers: nl as u32,
            },
        );
        for (i, _) in before.iter().enumerate() {
            self.pending.push(PendingCopy {
                tracker: tex.tracker().clone(),
                layer: il + i,
                layout: ImageLayout::CopySrc,
            });
        }
        Ok(())
    }

    fn ensure_recording(&mut self) -> Result<(), StreamError> {
        if !self.backend.is_recording(&self.list) {
            if let Err(err) = self.backend.begin(&self.list) {
                self.bitmap.clear();
                return Err(err);
            }
        }
        Ok(())
    }

    /// Submit everything recorded so far and block until it executes.
    ///
    /// All staged reservations are released and every pending layer is
    /// resolved, to its target layout on success or to
    /// [`ImageLayout::Undefined`] on failure.
    pub(crate) fn commit(&mut self) -> Result<(), StreamError> {
        if !self.backend.is_recording(&self.list) {
            debug_assert!(
                self.pending.is_empty(),
                "pending copies with nothing recorded"
            );
            return Ok(());
        }
        self.bitmap.clear();
        if let Err(err) = self.backend.end(&self.list) {
            self.drain_pending(true);
            return Err(err);
        }
        let res = self.backend.submit(std::slice::from_ref(&self.list));
        self.drain_pending(res.is_err());
        res
    }

    /// Resolve every pending layer and forget the copies.
    pub(crate) fn drain_pending(&mut self, failed: bool) {
        for p in self.pending.drain(..) {
            let layout = if failed {
                ImageLayout::Undefined
            } else {
                p.layout
            };
            p.tracker.unset_pending(p.layer, layout);
        }
    }

    pub(crate) fn is_recording(&self) -> bool {
        self.backend.is_recording(&self.list)
    }

    pub(crate) fn end(&mut self) -> Result<(), StreamError> {
        self.backend.end(&self.list)
    }

    pub(crate) fn reset(&mut self) {
        self.backend.reset(&self.list);
    }

    pub(crate) fn clear_bitmap(&mut self) {
        self.bitmap.clear();
    }

    pub(crate) fn list_handle(&self) -> GpuCommandList {
        self.list.clone()
    }

    #[cfg(test)]
    pub(crate) fn free_blocks(&self) -> usize {
        self.bitmap.rem()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;

    fn buffer(size: u64) -> StagingBuffer {
        StagingBuffer::new(Arc::new(DummyBackend::new()), size).unwrap()
    }

    #[test]
    fn test_new_rounds_up() {
        let b = buffer(1);
        assert_eq!(b.capacity(), STAGING_BLOCK * 32);
        let b = buffer(STAGING_BLOCK * 32 + 1);
        assert_eq!(b.capacity(), STAGING_BLOCK * 64);
    }

    #[test]
    fn test_reserve_is_block_granular() {
        let mut b = buffer(1);
        assert_eq!(b.reserve(1).unwrap(), 0);
        assert_eq!(b.reserve(STAGING_BLOCK).unwrap(), STAGING_BLOCK);
        assert_eq!(b.reserve(STAGING_BLOCK + 1).unwrap(), 2 * STAGING_BLOCK);
        assert_eq!(b.reserve(1).unwrap(), 4 * STAGING_BLOCK);
        assert_eq!(b.free_blocks(), 32 - 5);
    }

    #[test]
    #[should_panic(expected = "cannot reserve zero bytes")]
    fn test_reserve_zero_panics() {
        buffer(1).reserve(0).unwrap();
    }

    #[test]
    fn test_reserve_grows_when_full() {
        let mut b = buffer(1);
        b.reserve(STAGING_BLOCK * 30).unwrap();
        let data = vec![7u8; STAGING_BLOCK as usize];
        let off = b.stage(&data).unwrap();
        // Three blocks would not fit; the buffer grows by a word of
        // blocks and the new space starts past the old capacity.
        let grown = b.reserve(STAGING_BLOCK * 3).unwrap();
        assert_eq!(grown, STAGING_BLOCK * 32);
        assert_eq!(b.capacity(), STAGING_BLOCK * 64);
        // Previously staged bytes carried over.
        let mut back = vec![0u8; data.len()];
        assert_eq!(b.unstage(off, &mut back), data.len());
        assert_eq!(back, data);
    }

    #[test]
    fn test_stage_unstage_roundtrip() {
        let mut b = buffer(1);
        let data: Vec<u8> = (0..200u32).map(|x| x as u8).collect();
        let off = b.stage(&data).unwrap();
        let mut back = vec![0u8; data.len()];
        assert_eq!(b.unstage(off, &mut back), data.len());
        assert_eq!(back, data);
        assert_eq!(b.free_blocks(), 32);
    }

    #[test]
    #[should_panic(expected = "misaligned staging offset")]
    fn test_unstage_misaligned_panics() {
        let mut b = buffer(1);
        let mut dst = [0u8; 4];
        b.unstage(1, &mut dst);
    }

    #[test]
    fn test_unstage_past_end() {
        let mut b = buffer(1);
        let mut dst = [0u8; 4];
        assert_eq!(b.unstage(b.capacity(), &mut dst), 0);
    }

    #[test]
    fn test_commit_nothing_recorded() {
        let mut b = buffer(1);
        assert!(b.commit().is_ok());
    }
}
