//! GPU backend abstraction layer.
//!
//! This module provides a trait-based abstraction over the GPU driver,
//! covering exactly the capability set the streaming subsystem
//! consumes: buffer/image creation, CPU byte access to mappable
//! buffers, command recording for copies and layout transitions, and
//! batched blocking submission.
//!
//! # Available Backends
//!
//! - `dummy`: CPU-emulated backend. Buffers and image layers are plain
//!   byte vectors and `submit` executes recorded copies, so the whole
//!   streaming path is observable in tests without GPU hardware.
//!
//! Real driver backends plug in as additional variants of the handle
//! enums, the same way render backends do elsewhere in the engine.

pub mod dummy;

use std::sync::Arc;

use crate::error::StreamError;
use crate::types::{
    Barrier, BufferDescriptor, Extent3d, ImageDescriptor, ImageLayout, IndexFormat,
};

pub use dummy::DummyBackend;

/// Handle to a GPU buffer resource.
#[derive(Clone)]
pub enum GpuBuffer {
    /// Dummy backend buffer (CPU-resident bytes).
    Dummy(Arc<dummy::DummyBuffer>),
}

impl GpuBuffer {
    /// Check whether two handles refer to the same buffer resource.
    pub fn same(&self, other: &GpuBuffer) -> bool {
        match (self, other) {
            (Self::Dummy(a), Self::Dummy(b)) => Arc::ptr_eq(a, b),
        }
    }
}

impl std::fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(buffer) => f
                .debug_struct("GpuBuffer::Dummy")
                .field("capacity", &buffer.capacity())
                .finish(),
        }
    }
}

/// Handle to a GPU image resource.
#[derive(Clone)]
pub enum GpuImage {
    /// Dummy backend image (CPU-resident layers).
    Dummy(Arc<dummy::DummyImage>),
}

impl std::fmt::Debug for GpuImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(image) => f
                .debug_struct("GpuImage::Dummy")
                .field("layers", &image.layer_count())
                .finish(),
        }
    }
}

/// Handle to a command list used to record copy commands.
#[derive(Clone)]
pub enum GpuCommandList {
    /// Dummy backend command list.
    Dummy(Arc<dummy::DummyCommandList>),
}

impl std::fmt::Debug for GpuCommandList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy(list) => f
                .debug_struct("GpuCommandList::Dummy")
                .field("recording", &list.is_recording())
                .finish(),
        }
    }
}

/// A layout transition to record into a command list.
#[derive(Debug, Clone)]
pub struct LayoutTransition {
    /// Dependency scoping for the transition.
    pub barrier: Barrier,
    /// Layout the affected layers are currently in.
    pub layout_before: ImageLayout,
    /// Layout the affected layers transition to.
    pub layout_after: ImageLayout,
    /// Target image.
    pub image: GpuImage,
    /// First affected layer.
    pub layer: u32,
    /// Number of affected layers.
    pub layers: u32,
    /// First affected mip level.
    pub level: u32,
    /// Number of affected mip levels.
    pub levels: u32,
}

/// A copy between a buffer and an image to record into a command list.
#[derive(Debug, Clone)]
pub struct BufferImageCopy {
    /// The buffer side of the copy.
    pub buffer: GpuBuffer,
    /// Byte offset into the buffer.
    pub buffer_offset: u64,
    /// Row stride of the buffer data, in pixels.
    pub row_stride: u32,
    /// Slice stride of the buffer data, in rows.
    pub slice_stride: u32,
    /// The image side of the copy.
    pub image: GpuImage,
    /// First layer of the image affected by the copy.
    pub image_layer: u32,
    /// Mip level affected by the copy.
    pub level: u32,
    /// Extent of the copied region (whole layers only).
    pub extent: Extent3d,
    /// Number of layers copied, tightly packed in the buffer.
    pub layers: u32,
}

/// GPU backend trait abstracting the driver.
///
/// All command-list methods take the list handle explicitly: handles
/// are plain data and the backend owns the execution semantics.
/// `submit` is a single batched, blocking submission; it reports
/// success or failure synchronously.
pub trait GpuBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// Create a buffer resource.
    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, StreamError>;

    /// Get the capacity of a buffer in bytes.
    fn buffer_capacity(&self, buffer: &GpuBuffer) -> u64;

    /// Write CPU data into a mappable buffer.
    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]);

    /// Read bytes from a mappable buffer into `dst`.
    ///
    /// Returns the number of bytes read, which may be less than
    /// `dst.len()` if the read would pass the end of the buffer.
    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, dst: &mut [u8]) -> usize;

    /// Create an image resource.
    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<GpuImage, StreamError>;

    /// Create a command list for recording copy commands.
    fn create_command_list(&self) -> Result<GpuCommandList, StreamError>;

    /// Begin recording. The list must not already be recording.
    fn begin(&self, list: &GpuCommandList) -> Result<(), StreamError>;

    /// End recording. The list must be recording.
    fn end(&self, list: &GpuCommandList) -> Result<(), StreamError>;

    /// Discard all recorded commands and leave the list reusable.
    fn reset(&self, list: &GpuCommandList);

    /// Check whether the list is currently recording.
    fn is_recording(&self, list: &GpuCommandList) -> bool;

    /// Record layout transition barriers.
    fn record_transition(&self, list: &GpuCommandList, transitions: &[LayoutTransition]);

    /// Record a buffer→image copy.
    fn record_copy_buffer_to_image(&self, list: &GpuCommandList, copy: &BufferImageCopy);

    /// Record an image→buffer copy.
    fn record_copy_image_to_buffer(&self, list: &GpuCommandList, copy: &BufferImageCopy);

    /// Record vertex buffer bindings starting at binding `first`.
    fn record_set_vertex_buffers(
        &self,
        list: &GpuCommandList,
        first: u32,
        buffers: &[GpuBuffer],
        offsets: &[u64],
    );

    /// Record an index buffer binding.
    fn record_set_index_buffer(
        &self,
        list: &GpuCommandList,
        format: IndexFormat,
        buffer: &GpuBuffer,
        offset: u64,
    );

    /// Record a non-indexed draw.
    fn record_draw(&self, list: &GpuCommandList, vertex_count: u32, instance_count: u32);

    /// Record an indexed draw.
    fn record_draw_indexed(&self, list: &GpuCommandList, index_count: u32, instance_count: u32);

    /// Submit ended command lists as one batch and block until the
    /// work completes, reporting success or failure.
    fn submit(&self, lists: &[GpuCommandList]) -> Result<(), StreamError>;
}

static_assertions::assert_obj_safe!(GpuBackend);
