//! Vertex and index stream formats.

/// Encoding of a vertex attribute stream.
///
/// Integer formats are interpreted per semantic: unsigned normalized
/// for texture coordinates, colors, and weights; plain unsigned for
/// joint indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    /// Two 32-bit floats.
    Float32x2,
    /// Three 32-bit floats.
    Float32x3,
    /// Four 32-bit floats.
    Float32x4,
    /// Two 16-bit unsigned integers.
    Uint16x2,
    /// Three 16-bit unsigned integers.
    Uint16x3,
    /// Four 16-bit unsigned integers.
    Uint16x4,
    /// Two 8-bit unsigned integers.
    Uint8x2,
    /// Three 8-bit unsigned integers.
    Uint8x3,
    /// Four 8-bit unsigned integers.
    Uint8x4,
}

impl VertexFormat {
    /// Size in bytes of one element of the stream.
    pub fn size(&self) -> usize {
        match self {
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
            Self::Uint16x2 => 4,
            Self::Uint16x3 => 6,
            Self::Uint16x4 => 8,
            Self::Uint8x2 => 2,
            Self::Uint8x3 => 3,
            Self::Uint8x4 => 4,
        }
    }
}

/// Encoding of an index stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit unsigned indices.
    Uint16,
    /// 32-bit unsigned indices.
    Uint32,
}

impl IndexFormat {
    /// Size in bytes of one index.
    pub fn size(&self) -> usize {
        match self {
            Self::Uint16 => 2,
            Self::Uint32 => 4,
        }
    }
}

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Each vertex is a point.
    PointList,
    /// Every two vertices form a line.
    LineList,
    /// Consecutive vertices form connected lines.
    LineStrip,
    /// Every three vertices form a triangle.
    #[default]
    TriangleList,
    /// Consecutive vertices form connected triangles.
    TriangleStrip,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sizes() {
        assert_eq!(VertexFormat::Float32x3.size(), 12);
        assert_eq!(VertexFormat::Uint16x4.size(), 8);
        assert_eq!(VertexFormat::Uint8x3.size(), 3);
        assert_eq!(IndexFormat::Uint16.size(), 2);
        assert_eq!(IndexFormat::Uint32.size(), 4);
    }
}
