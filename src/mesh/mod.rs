//! Mesh storage.
//!
//! Vertex and index streams of every mesh live packed together in one
//! device buffer managed by [`MeshStore`]. Storing a mesh converts its
//! attribute streams to canonical per-semantic formats, allocates
//! 512-byte block spans for them, and chains its primitives into
//! store slots; the returned [`Mesh`] handle is all a caller keeps.

mod convert;
mod data;
mod store;

pub use data::{
    IndexData, MeshData, PrimitiveData, Semantic, SemanticData, SEMANTIC_COUNT,
};
pub use store::{MeshStore, Span};

/// Handle to a mesh stored in a [`MeshStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mesh {
    pub(crate) first: usize,
    pub(crate) len: usize,
}

impl Mesh {
    /// Number of primitives in the mesh.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the handle refers to no primitives.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
