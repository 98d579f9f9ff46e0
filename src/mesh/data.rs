//! Mesh data description and validation.

use crate::error::StreamError;
use crate::types::{IndexFormat, PrimitiveTopology, VertexFormat};

/// Number of vertex semantics.
pub const SEMANTIC_COUNT: usize = 8;

/// Role of a vertex attribute stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    /// Vertex position.
    Position,
    /// Vertex normal.
    Normal,
    /// Vertex tangent.
    Tangent,
    /// First texture coordinate set.
    TexCoord0,
    /// Second texture coordinate set.
    TexCoord1,
    /// Vertex color.
    Color0,
    /// Skinning joint indices.
    Joints0,
    /// Skinning joint weights.
    Weights0,
}

impl Semantic {
    /// Every semantic, in binding order.
    pub const ALL: [Semantic; SEMANTIC_COUNT] = [
        Semantic::Position,
        Semantic::Normal,
        Semantic::Tangent,
        Semantic::TexCoord0,
        Semantic::TexCoord1,
        Semantic::Color0,
        Semantic::Joints0,
        Semantic::Weights0,
    ];

    /// Index of the semantic in binding order.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The format vertex data of this semantic is stored in.
    ///
    /// Source data in other formats is converted on store when a
    /// conversion exists.
    pub fn canonical_format(self) -> VertexFormat {
        match self {
            Self::Position | Self::Normal => VertexFormat::Float32x3,
            Self::Tangent => VertexFormat::Float32x4,
            Self::TexCoord0 | Self::TexCoord1 => VertexFormat::Float32x2,
            Self::Color0 | Self::Weights0 => VertexFormat::Float32x4,
            Self::Joints0 => VertexFormat::Uint16x4,
        }
    }
}

/// One vertex attribute stream of a primitive, located in a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemanticData {
    /// Encoding of the stream.
    pub format: VertexFormat,
    /// Index of the source holding the stream.
    pub src: usize,
    /// Byte offset of the stream within the source.
    pub offset: usize,
}

/// The index stream of a primitive, located in a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexData {
    /// Encoding of the indices.
    pub format: IndexFormat,
    /// Number of indices.
    pub count: u32,
    /// Index of the source holding the stream.
    pub src: usize,
    /// Byte offset of the stream within the source.
    pub offset: usize,
}

/// Description of one primitive of a mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveData {
    /// How vertices are assembled.
    pub topology: PrimitiveTopology,
    /// Number of vertices in each attribute stream.
    pub vertex_count: u32,
    /// Attribute streams, indexed by [`Semantic::index`].
    pub semantics: [Option<SemanticData>; SEMANTIC_COUNT],
    /// Index stream, if the primitive is indexed.
    pub index: Option<IndexData>,
}

impl PrimitiveData {
    /// Create a non-indexed primitive with no attribute streams.
    pub fn new(topology: PrimitiveTopology, vertex_count: u32) -> Self {
        Self {
            topology,
            vertex_count,
            semantics: [None; SEMANTIC_COUNT],
            index: None,
        }
    }

    /// Add an attribute stream.
    pub fn with_semantic(mut self, semantic: Semantic, data: SemanticData) -> Self {
        self.semantics[semantic.index()] = Some(data);
        self
    }

    /// Add an index stream.
    pub fn with_index(mut self, index: IndexData) -> Self {
        self.index = Some(index);
        self
    }

    /// Get the attribute stream of a semantic, if present.
    pub fn semantic(&self, semantic: Semantic) -> Option<&SemanticData> {
        self.semantics[semantic.index()].as_ref()
    }

    /// Number of vertices assembled when drawing: the index count for
    /// indexed primitives, the vertex count otherwise.
    pub fn count(&self) -> u32 {
        match &self.index {
            Some(index) => index.count,
            None => self.vertex_count,
        }
    }
}

/// Description of a whole mesh: its primitives and the byte sources
/// their streams live in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeshData {
    /// The primitives of the mesh, drawn in order.
    pub primitives: Vec<PrimitiveData>,
    /// Byte sources referenced by the primitives.
    pub sources: Vec<Vec<u8>>,
}

impl MeshData {
    /// Check that the description is complete and consistent.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.primitives.is_empty() {
            return Err(StreamError::InvalidParameter(
                "mesh has no primitives".into(),
            ));
        }
        for prim in &self.primitives {
            if prim.vertex_count == 0 {
                return Err(StreamError::InvalidParameter(
                    "primitive has no vertices".into(),
                ));
            }
            if prim.semantic(Semantic::Position).is_none() {
                return Err(StreamError::InvalidParameter(
                    "primitive has no position stream".into(),
                ));
            }
            let count = prim.count() as usize;
            let valid = match prim.topology {
                PrimitiveTopology::PointList => true,
                PrimitiveTopology::LineList => count % 2 == 0,
                PrimitiveTopology::LineStrip => count >= 2,
                PrimitiveTopology::TriangleList => count % 3 == 0,
                PrimitiveTopology::TriangleStrip => count >= 3,
            };
            if !valid {
                return Err(StreamError::InvalidParameter(format!(
                    "{} vertices do not assemble as {:?}",
                    count, prim.topology,
                )));
            }
            if let Some(index) = &prim.index {
                if index.count == 0 {
                    return Err(StreamError::InvalidParameter(
                        "indexed primitive has no indices".into(),
                    ));
                }
                let n = index.count as usize * index.format.size();
                let src = self.sources.get(index.src).ok_or_else(|| {
                    StreamError::OutOfBounds("index stream source out of range".into())
                })?;
                if index.offset + n > src.len() {
                    return Err(StreamError::OutOfBounds(
                        "index stream exceeds its source".into(),
                    ));
                }
            }
            for semantic in Semantic::ALL {
                let Some(data) = prim.semantic(semantic) else {
                    continue;
                };
                let n = prim.vertex_count as usize * data.format.size();
                let src = self.sources.get(data.src).ok_or_else(|| {
                    StreamError::OutOfBounds("vertex stream source out of range".into())
                })?;
                if data.offset + n > src.len() {
                    return Err(StreamError::OutOfBounds(
                        "vertex stream exceeds its source".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn positions(count: u32) -> Vec<u8> {
        vec![0u8; count as usize * 12]
    }

    fn simple(topology: PrimitiveTopology, vertex_count: u32) -> MeshData {
        MeshData {
            primitives: vec![PrimitiveData::new(topology, vertex_count).with_semantic(
                Semantic::Position,
                SemanticData {
                    format: VertexFormat::Float32x3,
                    src: 0,
                    offset: 0,
                },
            )],
            sources: vec![positions(vertex_count)],
        }
    }

    #[rstest]
    #[case(PrimitiveTopology::PointList, 1)]
    #[case(PrimitiveTopology::LineList, 4)]
    #[case(PrimitiveTopology::LineStrip, 2)]
    #[case(PrimitiveTopology::TriangleList, 6)]
    #[case(PrimitiveTopology::TriangleStrip, 3)]
    fn test_validate_topology_ok(#[case] topology: PrimitiveTopology, #[case] count: u32) {
        assert!(simple(topology, count).validate().is_ok());
    }

    #[rstest]
    #[case(PrimitiveTopology::LineList, 3)]
    #[case(PrimitiveTopology::LineStrip, 1)]
    #[case(PrimitiveTopology::TriangleList, 4)]
    #[case(PrimitiveTopology::TriangleStrip, 2)]
    fn test_validate_topology_mismatch(#[case] topology: PrimitiveTopology, #[case] count: u32) {
        assert!(simple(topology, count).validate().is_err());
    }

    #[test]
    fn test_validate_requires_position() {
        let data = MeshData {
            primitives: vec![PrimitiveData::new(PrimitiveTopology::PointList, 1)],
            sources: vec![positions(1)],
        };
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_validate_zero_vertices() {
        assert!(simple(PrimitiveTopology::PointList, 0).validate().is_err());
    }

    #[test]
    fn test_validate_source_bounds() {
        let mut data = simple(PrimitiveTopology::PointList, 4);
        data.sources[0].truncate(47);
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_validate_index_bounds() {
        let mut data = simple(PrimitiveTopology::TriangleList, 3);
        data.primitives[0].index = Some(IndexData {
            format: IndexFormat::Uint16,
            count: 3,
            src: 0,
            offset: data.sources[0].len() - 4,
        });
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_index_count_drives_assembly() {
        // 4 vertices drawn as 6 indices: valid triangle list.
        let mut data = simple(PrimitiveTopology::TriangleList, 4);
        data.sources.push(vec![0u8; 12]);
        data.primitives[0].index = Some(IndexData {
            format: IndexFormat::Uint16,
            count: 6,
            src: 1,
            offset: 0,
        });
        assert!(data.validate().is_ok());
        assert_eq!(data.primitives[0].count(), 6);
    }

    #[test]
    fn test_canonical_formats() {
        assert_eq!(
            Semantic::Position.canonical_format(),
            VertexFormat::Float32x3
        );
        assert_eq!(
            Semantic::Tangent.canonical_format(),
            VertexFormat::Float32x4
        );
        assert_eq!(Semantic::Joints0.canonical_format(), VertexFormat::Uint16x4);
    }
}
