//! Common type definitions shared across the crate.

mod buffer;
mod image;
mod vertex;

pub use buffer::{BufferDescriptor, BufferUsage};
pub use image::{
    AccessFlags, Barrier, Extent3d, ImageDescriptor, ImageLayout, PipelineStages, PixelFormat,
    TextureUsage,
};
pub use vertex::{IndexFormat, PrimitiveTopology, VertexFormat};
