//! Packed device-buffer storage for mesh primitives.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{GpuBackend, GpuBuffer, GpuCommandList};
use crate::error::StreamError;
use crate::mesh::convert::convert;
use crate::mesh::data::{MeshData, PrimitiveData, Semantic, SEMANTIC_COUNT};
use crate::mesh::Mesh;
use crate::bitvec::BitVec;
use crate::types::{BufferDescriptor, BufferUsage, IndexFormat, PrimitiveTopology, VertexFormat};

/// Granularity of mesh storage, in bytes.
pub(crate) const SPAN_BLOCK: usize = 512;

/// Bytes covered by one word of the span bitmap; buffer capacities
/// must be a multiple of this.
pub(crate) const SPAN_CHUNK: usize = SPAN_BLOCK * 32;

/// Number of primitive slots added per growth step.
const PRIM_GROW: usize = 16;

const MESH_USAGE: BufferUsage = BufferUsage::VERTEX
    .union(BufferUsage::INDEX)
    .union(BufferUsage::COPY_SRC)
    .union(BufferUsage::COPY_DST)
    .union(BufferUsage::MAP_READ)
    .union(BufferUsage::MAP_WRITE);

/// A block-granular range of the mesh buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// First block of the range.
    pub start: usize,
    /// One past the last block of the range.
    pub end: usize,
}

impl Span {
    /// Number of blocks in the range.
    pub fn blocks(&self) -> usize {
        self.end - self.start
    }

    /// Byte offset of the range in the buffer.
    pub fn byte_offset(&self) -> usize {
        self.start * SPAN_BLOCK
    }

    /// Length of the range in bytes.
    pub fn byte_len(&self) -> usize {
        self.blocks() * SPAN_BLOCK
    }

    /// Whether the range holds no blocks.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Channel {
    format: Option<VertexFormat>,
    span: Span,
}

/// A stored primitive: where each of its streams landed in the buffer.
#[derive(Debug, Clone, Default)]
struct Primitive {
    topology: PrimitiveTopology,
    count: u32,
    mask: u32,
    vertex: [Channel; SEMANTIC_COUNT],
    index: Option<(IndexFormat, Span)>,
    next: Option<usize>,
}

struct StoreInner {
    buf: Option<GpuBuffer>,
    span_map: BitVec<u32>,
    prim_map: BitVec<u16>,
    prims: Vec<Primitive>,
}

/// Packs the streams of every mesh into one device buffer.
///
/// Storage is allocated in 512-byte blocks tracked by a bitmap; the
/// buffer grows on demand, carrying stored contents over. Primitives
/// of one mesh form a chain of slots, so a [`Mesh`] handle is just the
/// first slot and a length.
pub struct MeshStore {
    backend: Arc<dyn GpuBackend>,
    inner: RwLock<StoreInner>,
}

impl MeshStore {
    /// Create an empty store. The buffer is created on first use.
    pub fn new(backend: Arc<dyn GpuBackend>) -> Self {
        Self {
            backend,
            inner: RwLock::new(StoreInner {
                buf: None,
                span_map: BitVec::new(),
                prim_map: BitVec::new(),
                prims: Vec::new(),
            }),
        }
    }

    /// Replace the backing buffer, invalidating everything stored.
    ///
    /// Passing the buffer already in use is a no-op. Returns the
    /// previous buffer, if any.
    ///
    /// # Panics
    ///
    /// Panics if the buffer's capacity is zero or not a multiple of
    /// 16384 bytes.
    pub fn set_buffer(&self, buf: Option<GpuBuffer>) -> Option<GpuBuffer> {
        let mut inner = self.inner.write();
        if let (Some(new), Some(old)) = (&buf, &inner.buf) {
            if new.same(old) {
                return None;
            }
        }
        let mut span_map = BitVec::new();
        if let Some(new) = &buf {
            let cap = self.backend.buffer_capacity(new) as usize;
            assert!(
                cap > 0 && cap % SPAN_CHUNK == 0,
                "invalid mesh buffer capacity"
            );
            span_map.grow(cap / SPAN_CHUNK);
        }
        inner.span_map = span_map;
        inner.prim_map = BitVec::new();
        inner.prims.clear();
        std::mem::replace(&mut inner.buf, buf)
    }

    /// Current backing buffer handle.
    pub fn buffer(&self) -> Option<GpuBuffer> {
        self.inner.read().buf.clone()
    }

    /// Number of unallocated bytes in the backing buffer.
    pub fn free_bytes(&self) -> usize {
        self.inner.read().span_map.rem() * SPAN_BLOCK
    }

    /// Store raw bytes in the buffer and return the span they occupy.
    ///
    /// The span covers whole blocks, so up to 511 trailing bytes are
    /// padding.
    pub fn store(&self, src: &[u8]) -> Result<Span, StreamError> {
        if src.is_empty() {
            return Err(StreamError::InvalidParameter(
                "cannot store zero bytes".into(),
            ));
        }
        let mut inner = self.inner.write();
        self.store_bytes(&mut inner, src)
    }

    fn store_bytes(&self, inner: &mut StoreInner, src: &[u8]) -> Result<Span, StreamError> {
        debug_assert!(!src.is_empty());
        let blocks = (src.len() + SPAN_BLOCK - 1) / SPAN_BLOCK;
        let start = match inner.span_map.search_range(blocks) {
            Some(idx) => idx,
            None => {
                // Grow by whole bitmap words past the current capacity,
                // carrying stored contents into the new buffer.
                let words = (blocks + 31) / 32;
                let old_cap = inner
                    .buf
                    .as_ref()
                    .map(|b| self.backend.buffer_capacity(b))
                    .unwrap_or(0);
                let new_cap = old_cap + (words * SPAN_CHUNK) as u64;
                let new_buf = self.backend.create_buffer(
                    &BufferDescriptor::new(new_cap, MESH_USAGE).with_label("mesh_store"),
                )?;
                if let Some(old) = inner.buf.take() {
                    let mut carry = vec![0u8; old_cap as usize];
                    self.backend.read_buffer(&old, 0, &mut carry);
                    self.backend.write_buffer(&new_buf, 0, &carry);
                }
                log::trace!("mesh buffer grown: {} -> {} bytes", old_cap, new_cap);
                inner.buf = Some(new_buf);
                inner.span_map.grow(words)
            }
        };
        for b in start..start + blocks {
            inner.span_map.set(b);
        }
        let span = Span {
            start,
            end: start + blocks,
        };
        let buf = match &inner.buf {
            Some(buf) => buf,
            None => unreachable!("span allocated without a buffer"),
        };
        self.backend
            .write_buffer(buf, span.byte_offset() as u64, src);
        Ok(span)
    }

    fn free_span(&self, inner: &mut StoreInner, span: Span) {
        for b in span.start..span.end {
            inner.span_map.unset(b);
        }
    }

    fn release_primitive(&self, inner: &mut StoreInner, prim: &Primitive) {
        if let Some((_, span)) = prim.index {
            self.free_span(inner, span);
        }
        for channel in prim.vertex {
            if !channel.span.is_empty() {
                self.free_span(inner, channel.span);
            }
        }
    }

    fn new_entry(
        &self,
        inner: &mut StoreInner,
        data: &PrimitiveData,
        sources: &[Vec<u8>],
    ) -> Result<usize, StreamError> {
        let mut prim = Primitive {
            topology: data.topology,
            count: data.count(),
            ..Default::default()
        };
        if let Some(index) = &data.index {
            let n = index.count as usize * index.format.size();
            let bytes = sources
                .get(index.src)
                .and_then(|s| s.get(index.offset..index.offset + n))
                .ok_or_else(|| StreamError::OutOfBounds("index stream out of range".into()))?;
            let span = self.store_bytes(inner, bytes)?;
            prim.index = Some((index.format, span));
        }
        for semantic in Semantic::ALL {
            let Some(sd) = data.semantic(semantic) else {
                continue;
            };
            let n = data.vertex_count as usize * sd.format.size();
            let res = sources
                .get(sd.src)
                .and_then(|s| s.get(sd.offset..sd.offset + n))
                .ok_or_else(|| StreamError::OutOfBounds("vertex stream out of range".into()))
                .and_then(|bytes| convert(semantic, sd.format, bytes, data.vertex_count as usize))
                .and_then(|bytes| self.store_bytes(inner, &bytes));
            match res {
                Ok(span) => {
                    prim.mask |= 1 << semantic.index();
                    prim.vertex[semantic.index()] = Channel {
                        format: Some(semantic.canonical_format()),
                        span,
                    };
                }
                Err(err) => {
                    // Free whatever this primitive stored so far.
                    self.release_primitive(inner, &prim);
                    return Err(err);
                }
            }
        }
        let slot = match inner.prim_map.search() {
            Some(slot) => slot,
            None => {
                let slot = inner.prim_map.grow(1);
                inner.prims.resize_with(slot + PRIM_GROW, Primitive::default);
                slot
            }
        };
        inner.prim_map.set(slot);
        inner.prims[slot] = prim;
        Ok(slot)
    }

    fn free_entry(&self, inner: &mut StoreInner, slot: usize) {
        debug_assert!(inner.prim_map.is_set(slot));
        let prim = std::mem::take(&mut inner.prims[slot]);
        inner.prim_map.unset(slot);
        self.release_primitive(inner, &prim);
    }

    /// Store every primitive of a mesh, chained in order.
    ///
    /// On any failure nothing remains stored.
    pub fn new_mesh(&self, data: &MeshData) -> Result<Mesh, StreamError> {
        data.validate()?;
        let mut inner = self.inner.write();
        let first = self.new_entry(&mut inner, &data.primitives[0], &data.sources)?;
        let mut prev = first;
        for pd in &data.primitives[1..] {
            match self.new_entry(&mut inner, pd, &data.sources) {
                Ok(slot) => {
                    inner.prims[prev].next = Some(slot);
                    prev = slot;
                }
                Err(err) => {
                    let mut cur = Some(first);
                    while let Some(slot) = cur {
                        cur = inner.prims[slot].next;
                        self.free_entry(&mut inner, slot);
                    }
                    return Err(err);
                }
            }
        }
        log::trace!(
            "mesh stored: {} primitive(s), first slot {}",
            data.primitives.len(),
            first,
        );
        Ok(Mesh {
            first,
            len: data.primitives.len(),
        })
    }

    /// Release everything a mesh stored.
    pub fn free_mesh(&self, mesh: Mesh) {
        if mesh.len == 0 {
            return;
        }
        let mut inner = self.inner.write();
        let mut cur = Some(mesh.first);
        while let Some(slot) = cur {
            cur = inner.prims[slot].next;
            self.free_entry(&mut inner, slot);
        }
    }

    /// Record bindings and a draw of one primitive of a mesh.
    ///
    /// Each present semantic is bound as a vertex buffer at its
    /// binding-order index.
    ///
    /// # Panics
    ///
    /// Panics if `primitive` is out of range for the mesh.
    pub fn draw(&self, list: &GpuCommandList, mesh: &Mesh, primitive: usize, instance_count: u32) {
        assert!(primitive < mesh.len, "primitive index out of range");
        let inner = self.inner.read();
        let buf = match &inner.buf {
            Some(buf) => buf,
            None => return,
        };
        let mut slot = mesh.first;
        for _ in 0..primitive {
            slot = match inner.prims[slot].next {
                Some(next) => next,
                None => panic!("broken primitive chain"),
            };
        }
        let prim = &inner.prims[slot];
        for semantic in Semantic::ALL {
            if prim.mask & (1 << semantic.index()) == 0 {
                continue;
            }
            let span = prim.vertex[semantic.index()].span;
            self.backend.record_set_vertex_buffers(
                list,
                semantic.index() as u32,
                std::slice::from_ref(buf),
                &[span.byte_offset() as u64],
            );
        }
        match prim.index {
            Some((format, span)) => {
                self.backend
                    .record_set_index_buffer(list, format, buf, span.byte_offset() as u64);
                self.backend
                    .record_draw_indexed(list, prim.count, instance_count);
            }
            None => self.backend.record_draw(list, prim.count, instance_count),
        }
    }
}

impl std::fmt::Debug for MeshStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MeshStore")
            .field("blocks", &inner.span_map.len())
            .field("free_blocks", &inner.span_map.rem())
            .field("prim_slots", &inner.prims.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(MeshStore: Send, Sync);
