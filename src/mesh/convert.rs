//! Vertex stream conversion into canonical semantic formats.

use std::borrow::Cow;

use crate::error::StreamError;
use crate::mesh::data::Semantic;
use crate::types::VertexFormat;

fn u16_at(src: &[u8], i: usize) -> u16 {
    u16::from_le_bytes([src[2 * i], src[2 * i + 1]])
}

fn f32_at(src: &[u8], i: usize) -> f32 {
    f32::from_le_bytes([src[4 * i], src[4 * i + 1], src[4 * i + 2], src[4 * i + 3]])
}

fn unorm8(v: u8) -> f32 {
    v as f32 / u8::MAX as f32
}

fn unorm16(v: u16) -> f32 {
    v as f32 / u16::MAX as f32
}

fn bytes_of_f32(v: &[f32]) -> Vec<u8> {
    bytemuck::cast_slice(v).to_vec()
}

/// Convert `count` vertices of a stream into the canonical format of
/// its semantic.
///
/// `src` must hold exactly `count` elements of `format`. When the
/// stream already uses the canonical format it is passed through
/// unchanged. Integer inputs are treated as unsigned normalized,
/// except joint indices, which are plain integers.
pub(crate) fn convert<'a>(
    semantic: Semantic,
    format: VertexFormat,
    src: &'a [u8],
    count: usize,
) -> Result<Cow<'a, [u8]>, StreamError> {
    debug_assert_eq!(src.len(), count * format.size());
    if format == semantic.canonical_format() {
        return Ok(Cow::Borrowed(src));
    }
    let out = match (semantic, format) {
        (Semantic::TexCoord0 | Semantic::TexCoord1, VertexFormat::Uint16x2) => {
            let mut v = Vec::with_capacity(count * 2);
            for i in 0..count * 2 {
                v.push(unorm16(u16_at(src, i)));
            }
            bytes_of_f32(&v)
        }
        (Semantic::TexCoord0 | Semantic::TexCoord1, VertexFormat::Uint8x2) => {
            let mut v = Vec::with_capacity(count * 2);
            for &b in &src[..count * 2] {
                v.push(unorm8(b));
            }
            bytes_of_f32(&v)
        }
        (Semantic::Color0, VertexFormat::Float32x3) => {
            let mut v = Vec::with_capacity(count * 4);
            for i in 0..count {
                v.push(f32_at(src, 3 * i));
                v.push(f32_at(src, 3 * i + 1));
                v.push(f32_at(src, 3 * i + 2));
                v.push(1.0);
            }
            bytes_of_f32(&v)
        }
        (Semantic::Color0 | Semantic::Weights0, VertexFormat::Uint16x4) => {
            let mut v = Vec::with_capacity(count * 4);
            for i in 0..count * 4 {
                v.push(unorm16(u16_at(src, i)));
            }
            bytes_of_f32(&v)
        }
        (Semantic::Color0, VertexFormat::Uint16x3) => {
            let mut v = Vec::with_capacity(count * 4);
            for i in 0..count {
                v.push(unorm16(u16_at(src, 3 * i)));
                v.push(unorm16(u16_at(src, 3 * i + 1)));
                v.push(unorm16(u16_at(src, 3 * i + 2)));
                v.push(1.0);
            }
            bytes_of_f32(&v)
        }
        (Semantic::Color0 | Semantic::Weights0, VertexFormat::Uint8x4) => {
            let mut v = Vec::with_capacity(count * 4);
            for &b in &src[..count * 4] {
                v.push(unorm8(b));
            }
            bytes_of_f32(&v)
        }
        (Semantic::Color0, VertexFormat::Uint8x3) => {
            let mut v = Vec::with_capacity(count * 4);
            for i in 0..count {
                v.push(unorm8(src[3 * i]));
                v.push(unorm8(src[3 * i + 1]));
                v.push(unorm8(src[3 * i + 2]));
                v.push(1.0);
            }
            bytes_of_f32(&v)
        }
        (Semantic::Joints0, VertexFormat::Uint8x4) => {
            let v: Vec<u16> = src[..count * 4].iter().map(|&b| b as u16).collect();
            bytemuck::cast_slice(&v).to_vec()
        }
        _ => {
            return Err(StreamError::UnsupportedFormat(format!(
                "no conversion from {:?} for {:?}",
                format, semantic,
            )));
        }
    };
    Ok(Cow::Owned(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn as_f32(bytes: &[u8]) -> Vec<f32> {
        bytemuck::cast_slice(bytes).to_vec()
    }

    #[test]
    fn test_passthrough_borrows() {
        let src = vec![0u8; 2 * 12];
        let out = convert(Semantic::Position, VertexFormat::Float32x3, &src, 2).unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn test_texcoord_from_uint16() {
        let src: Vec<u8> = [0u16, u16::MAX, u16::MAX / 2, 0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let out = convert(Semantic::TexCoord0, VertexFormat::Uint16x2, &src, 2).unwrap();
        let v = as_f32(&out);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[1], 1.0);
        assert!((v[2] - 0.5).abs() < 1e-4);
        assert_eq!(v[3], 0.0);
    }

    #[test]
    fn test_texcoord_from_uint8() {
        let src = vec![0u8, 255, 128, 0];
        let out = convert(Semantic::TexCoord1, VertexFormat::Uint8x2, &src, 2).unwrap();
        let v = as_f32(&out);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[1], 1.0);
    }

    #[test]
    fn test_color_from_float_rgb() {
        let src: Vec<u8> = [0.25f32, 0.5, 0.75]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let out = convert(Semantic::Color0, VertexFormat::Float32x3, &src, 1).unwrap();
        assert_eq!(as_f32(&out), vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_color_from_uint8_rgb() {
        let src = vec![255u8, 0, 255];
        let out = convert(Semantic::Color0, VertexFormat::Uint8x3, &src, 1).unwrap();
        assert_eq!(as_f32(&out), vec![1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_joints_widen() {
        let src = vec![1u8, 2, 3, 255];
        let out = convert(Semantic::Joints0, VertexFormat::Uint8x4, &src, 1).unwrap();
        let v: Vec<u16> = bytemuck::cast_slice(&out).to_vec();
        assert_eq!(v, vec![1, 2, 3, 255]);
    }

    #[test]
    fn test_weights_from_uint8() {
        let src = vec![0u8, 85, 170, 255];
        let out = convert(Semantic::Weights0, VertexFormat::Uint8x4, &src, 1).unwrap();
        let v = as_f32(&out);
        assert_eq!(v[3], 1.0);
        assert!((v[1] - 1.0 / 3.0).abs() < 1e-2);
    }

    #[rstest]
    #[case(Semantic::Position, VertexFormat::Uint16x3)]
    #[case(Semantic::Normal, VertexFormat::Uint8x3)]
    #[case(Semantic::Tangent, VertexFormat::Float32x3)]
    #[case(Semantic::Joints0, VertexFormat::Uint16x2)]
    #[case(Semantic::Weights0, VertexFormat::Float32x3)]
    fn test_unconvertible(#[case] semantic: Semantic, #[case] format: VertexFormat) {
        let src = vec![0u8; format.size() * 3];
        assert!(convert(semantic, format, &src, 3).is_err());
    }
}
