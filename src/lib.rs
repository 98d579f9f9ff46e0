//! # Cinder Graphics
//!
//! GPU resource streaming and synchronization for the Cinder engine.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`BitVec`] - Growable bit vector used by every allocator in the crate
//! - [`MeshStore`] - Packs vertex/index streams into one large device buffer
//! - [`StagingPool`] - Pooled staging buffers batching CPU↔GPU copies
//! - [`Texture`] - Image wrapper with per-layer layout tracking
//! - [`backend`] - Trait for GPU backend implementations (Dummy for testing)
//!
//! ## Example
//!
//! ```ignore
//! use cinder_graphics::{backend::DummyBackend, StagingPool, Texture, TextureParams};
//!
//! let backend = std::sync::Arc::new(DummyBackend::new());
//! let pool = StagingPool::new(backend.clone(), None)?;
//! let texture = Texture::new_2d(backend, &params)?;
//! texture.copy_to_view(&pool, 0, &pixels, false)?;
//! // ... more copies ...
//! pool.commit_all()?;
//! ```

pub mod backend;
pub mod bitvec;
pub mod error;
pub mod mesh;
pub mod staging;
pub mod texture;
pub mod types;

// Re-export main types for convenience
pub use backend::{DummyBackend, GpuBackend, GpuBuffer, GpuCommandList, GpuImage};
pub use bitvec::BitVec;
pub use error::StreamError;
pub use mesh::{IndexData, Mesh, MeshData, MeshStore, PrimitiveData, Semantic, SemanticData, Span};
pub use staging::StagingPool;
pub use texture::{LayoutTracker, Texture, TextureParams};
pub use types::{
    Barrier, BufferDescriptor, BufferUsage, Extent3d, ImageLayout, IndexFormat, PixelFormat,
    PrimitiveTopology, TextureUsage, VertexFormat,
};

/// Graphics library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the graphics subsystem.
///
/// This should be called before using any graphics functionality.
pub fn init() {
    log::info!("Cinder Graphics v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_dummy_backend() {
        let backend = DummyBackend::new();
        assert_eq!(backend.name(), "Dummy");
    }
}
