//! Textures and per-layer layout tracking.
//!
//! A [`Texture`] wraps a backend image with a view table and a shared
//! [`LayoutTracker`]. Views follow a fixed convention: arrayed 2D
//! textures expose one view per layer plus one whole-array view, cube
//! textures expose one view per six-layer face group plus the array
//! view, and everything else exposes a single view. Data movement goes
//! through a [`StagingPool`](crate::staging::StagingPool); layout
//! transitions for rendering are recorded explicitly with
//! [`Texture::transition`].

mod layout;

pub use layout::LayoutTracker;

use std::sync::Arc;

use crate::backend::{GpuBackend, GpuCommandList, GpuImage, LayoutTransition};
use crate::error::StreamError;
use crate::staging::StagingPool;
use crate::types::{Barrier, Extent3d, ImageDescriptor, ImageLayout, PixelFormat, TextureUsage};

/// Largest supported width/height, in pixels.
pub const MAX_DIMENSION: u32 = 16384;
/// Largest supported layer count.
pub const MAX_LAYERS: u32 = 2048;

/// Number of mip levels in a full chain for the given extent.
pub fn compute_levels(extent: Extent3d) -> u32 {
    let mut d = extent.width.max(extent.height).max(extent.depth);
    let mut levels = 1;
    while d > 1 {
        d /= 2;
        levels += 1;
    }
    levels
}

/// Creation parameters shared by all texture kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureParams {
    /// Pixel format.
    pub format: PixelFormat,
    /// Extent of the first mip level.
    pub extent: Extent3d,
    /// Number of array layers.
    pub layers: u32,
    /// Number of mip levels.
    pub levels: u32,
    /// Sample count.
    pub samples: u32,
}

/// A texture resource with tracked per-layer layouts.
pub struct Texture {
    backend: Arc<dyn GpuBackend>,
    image: GpuImage,
    usage: TextureUsage,
    param: TextureParams,
    view_count: usize,
    layouts: Arc<LayoutTracker>,
}

impl Texture {
    /// Create a sampled 2D (or 2D array) texture.
    pub fn new_2d(backend: Arc<dyn GpuBackend>, param: &TextureParams) -> Result<Self, StreamError> {
        Self::validate_2d(param)?;
        let usage = TextureUsage::COPY_SRC | TextureUsage::COPY_DST | TextureUsage::SHADER_SAMPLE;
        // One view per layer, plus a whole-array view when arrayed.
        let view_count = if param.layers > 1 {
            param.layers as usize + 1
        } else {
            1
        };
        Self::create(backend, param, usage, view_count)
    }

    /// Create a sampled cube (or cube array) texture.
    pub fn new_cube(backend: Arc<dyn GpuBackend>, param: &TextureParams) -> Result<Self, StreamError> {
        if param.extent.width != param.extent.height {
            return Err(StreamError::InvalidParameter(
                "cube texture must be square".into(),
            ));
        }
        if param.layers % 6 != 0 || param.layers == 0 {
            return Err(StreamError::InvalidParameter(
                "cube layer count must be a non-zero multiple of 6".into(),
            ));
        }
        if param.samples != 1 {
            return Err(StreamError::InvalidParameter(
                "cube texture cannot be multisampled".into(),
            ));
        }
        Self::validate_2d(param)?;
        let usage = TextureUsage::COPY_SRC | TextureUsage::COPY_DST | TextureUsage::SHADER_SAMPLE;
        // One view per cube, plus a whole-array view when arrayed.
        let view_count = if param.layers > 6 {
            param.layers as usize / 6 + 1
        } else {
            1
        };
        Self::create(backend, param, usage, view_count)
    }

    /// Create a render target texture that can also be sampled and
    /// copied.
    pub fn new_target(
        backend: Arc<dyn GpuBackend>,
        param: &TextureParams,
    ) -> Result<Self, StreamError> {
        Self::validate_2d(param)?;
        let usage = TextureUsage::COPY_SRC
            | TextureUsage::COPY_DST
            | TextureUsage::SHADER_SAMPLE
            | TextureUsage::RENDER_TARGET;
        let view_count = if param.layers > 1 {
            param.layers as usize + 1
        } else {
            1
        };
        Self::create(backend, param, usage, view_count)
    }

    fn validate_2d(param: &TextureParams) -> Result<(), StreamError> {
        if param.extent.width == 0 || param.extent.height == 0 {
            return Err(StreamError::InvalidParameter(
                "texture extent cannot be zero".into(),
            ));
        }
        if param.extent.depth != 0 {
            return Err(StreamError::InvalidParameter(
                "2D texture depth must be zero".into(),
            ));
        }
        if param.extent.width > MAX_DIMENSION || param.extent.height > MAX_DIMENSION {
            return Err(StreamError::InvalidParameter(
                "texture extent exceeds the size limit".into(),
            ));
        }
        if param.layers == 0 || param.layers > MAX_LAYERS {
            return Err(StreamError::InvalidParameter(
                "invalid texture layer count".into(),
            ));
        }
        if param.levels == 0 || param.levels > compute_levels(param.extent) {
            return Err(StreamError::InvalidParameter(
                "invalid texture level count".into(),
            ));
        }
        if param.samples == 0 || !param.samples.is_power_of_two() {
            return Err(StreamError::InvalidParameter(
                "sample count must be a power of two".into(),
            ));
        }
        if param.levels > 1 && param.samples != 1 {
            return Err(StreamError::InvalidParameter(
                "multisample texture cannot have mip levels".into(),
            ));
        }
        Ok(())
    }

    fn create(
        backend: Arc<dyn GpuBackend>,
        param: &TextureParams,
        usage: TextureUsage,
        view_count: usize,
    ) -> Result<Self, StreamError> {
        let image = backend.create_image(&ImageDescriptor {
            label: None,
            format: param.format,
            extent: param.extent,
            layers: param.layers,
            levels: param.levels,
            samples: param.samples,
            usage,
        })?;
        log::trace!(
            "created texture: {:?} {}x{} layers={} levels={} samples={}",
            param.format,
            param.extent.width,
            param.extent.height,
            param.layers,
            param.levels,
            param.samples,
        );
        Ok(Self {
            backend,
            image,
            usage,
            param: *param,
            view_count,
            layouts: Arc::new(LayoutTracker::new(param.layers as usize)),
        })
    }

    /// Check that `view` identifies a view of this texture.
    pub fn is_valid_view(&self, view: usize) -> bool {
        view < self.view_count
    }

    /// Number of views this texture exposes.
    pub fn view_count(&self) -> usize {
        self.view_count
    }

    /// Resolve a view to its first layer and layer count.
    ///
    /// # Panics
    ///
    /// Panics if `view` is out of range.
    pub(crate) fn resolve_view(&self, view: usize) -> (usize, usize) {
        assert!(self.is_valid_view(view), "invalid texture view");
        let layers = self.param.layers as usize;
        if layers > 1 {
            if view == self.view_count - 1 {
                // Whole-array view (also the sole view of a single cube).
                return (0, layers);
            }
            if self.view_count < layers {
                // Cube array: each view selects one face group.
                return (view * 6, 6);
            }
        }
        (view, 1)
    }

    /// Number of layers spanned by a view.
    pub fn view_layers(&self, view: usize) -> usize {
        self.resolve_view(view).1
    }

    /// Total size in bytes of the data of a view, all layers and the
    /// first mip level included.
    pub fn view_size(&self, view: usize) -> usize {
        self.layer_size() * self.view_layers(view)
    }

    /// Size in bytes of one layer at the first mip level.
    pub(crate) fn layer_size(&self) -> usize {
        self.param.format.size()
            * self.param.extent.width as usize
            * self.param.extent.height as usize
    }

    /// Pixel format.
    pub fn format(&self) -> PixelFormat {
        self.param.format
    }

    /// Extent of the first mip level.
    pub fn extent(&self) -> Extent3d {
        self.param.extent
    }

    /// Width of the first mip level.
    pub fn width(&self) -> u32 {
        self.param.extent.width
    }

    /// Height of the first mip level.
    pub fn height(&self) -> u32 {
        self.param.extent.height
    }

    /// Number of array layers.
    pub fn layers(&self) -> u32 {
        self.param.layers
    }

    /// Number of mip levels.
    pub fn levels(&self) -> u32 {
        self.param.levels
    }

    /// Sample count.
    pub fn samples(&self) -> u32 {
        self.param.samples
    }

    /// Usage flags the texture was created with.
    pub fn usage(&self) -> TextureUsage {
        self.usage
    }

    /// Backend image handle.
    pub fn image(&self) -> &GpuImage {
        &self.image
    }

    /// Current layout of a layer, or `None` while a copy or transition
    /// targeting it is in flight.
    pub fn layout(&self, layer: usize) -> Option<ImageLayout> {
        self.layouts.layout(layer)
    }

    pub(crate) fn tracker(&self) -> &Arc<LayoutTracker> {
        &self.layouts
    }

    /// Copy CPU data to a view through the staging pool.
    ///
    /// `data` must cover the whole view, laid out tightly, layer after
    /// layer, first mip level only; excess bytes are ignored. With
    /// `commit` set the copy executes before this returns; otherwise
    /// it is left recorded and executes on the next commit of the
    /// staging buffer it landed in (usually via
    /// [`StagingPool::commit_all`]).
    ///
    /// Returns the number of bytes staged.
    pub fn copy_to_view(
        &self,
        pool: &StagingPool,
        view: usize,
        data: &[u8],
        commit: bool,
    ) -> Result<usize, StreamError> {
        if !self.is_valid_view(view) {
            return Err(StreamError::OutOfBounds("invalid texture view".into()));
        }
        let n = self.view_size(view);
        if data.len() < n {
            return Err(StreamError::InvalidParameter(
                "data does not cover the view".into(),
            ));
        }
        let mut buf = pool.take();
        let res = (|| {
            let off = buf.stage(&data[..n])?;
            buf.copy_to_view(self, view, off)?;
            if commit {
                buf.commit()?;
            }
            Ok(n)
        })();
        pool.put(buf);
        res
    }

    /// Copy the contents of a view to CPU memory through the staging
    /// pool. Commits any work pending in the staging buffer used.
    ///
    /// `dst` is truncated to the size of the view. Returns the number
    /// of bytes read back.
    pub fn copy_from_view(
        &self,
        pool: &StagingPool,
        view: usize,
        dst: &mut [u8],
    ) -> Result<usize, StreamError> {
        if !self.is_valid_view(view) {
            return Err(StreamError::OutOfBounds("invalid texture view".into()));
        }
        let n = dst.len().min(self.view_size(view));
        if n == 0 {
            return Ok(0);
        }
        let mut buf = pool.take();
        let res = (|| {
            // The recorded copy always writes the whole view, so the
            // reservation covers it even when `dst` is shorter.
            let off = buf.reserve(self.view_size(view) as u64)?;
            buf.copy_from_view(self, view, off)?;
            buf.commit()?;
            Ok(buf.unstage(off, &mut dst[..n]))
        })();
        pool.put(buf);
        res
    }

    /// Record a layout transition for every layer of a view.
    ///
    /// The layers become pending until [`Texture::set_layout`] resolves
    /// them after the list is submitted (or the submission fails).
    ///
    /// # Panics
    ///
    /// Panics if the view is invalid, the list is not recording, the
    /// target layout is [`ImageLayout::Undefined`], or any layer of the
    /// view is already pending.
    pub fn transition(
        &self,
        view: usize,
        list: &GpuCommandList,
        layout: ImageLayout,
        barrier: Barrier,
    ) {
        assert!(self.is_valid_view(view), "invalid texture view");
        assert!(
            self.backend.is_recording(list),
            "command list not recording"
        );
        assert!(
            layout != ImageLayout::Undefined,
            "cannot transition to undefined layout"
        );
        let (il, nl) = self.resolve_view(view);
        let mut before = Vec::with_capacity(nl);
        let mut differ = false;
        for i in 0..nl {
            let prev = self.layouts.set_pending(il + i);
            differ = differ || (i > 0 && prev != before[i - 1]);
            before.push(prev);
        }
        if differ {
            // Layers disagree on their current layout; transition each
            // one separately.
            let transitions: Vec<_> = before
                .iter()
                .enumerate()
                .map(|(i, &prev)| LayoutTransition {
                    barrier,
                    layout_before: prev,
                    layout_after: layout,
                    image: self.image.clone(),
                    layer: (il + i) as u32,
                    layers: 1,
                    level: 0,
                    levels: self.param.levels,
                })
                .collect();
            self.backend.record_transition(list, &transitions);
        } else {
            self.backend.record_transition(
                list,
                &[LayoutTransition {
                    barrier,
                    layout_before: before[0],
                    layout_after: layout,
                    image: self.image.clone(),
                    layer: il as u32,
                    layers: nl as u32,
                    level: 0,
                    levels: self.param.levels,
                }],
            );
        }
    }

    /// Resolve the pending layers of a view to `layout`.
    ///
    /// Call after the command list holding a [`Texture::transition`]
    /// was submitted, with [`ImageLayout::Undefined`] if the submission
    /// failed.
    ///
    /// # Panics
    ///
    /// Panics if the view is invalid or its layers are not pending.
    pub fn set_layout(&self, view: usize, layout: ImageLayout) {
        let (il, nl) = self.resolve_view(view);
        for i in 0..nl {
            self.layouts.unset_pending(il + i, layout);
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("format", &self.param.format)
            .field("extent", &self.param.extent)
            .field("layers", &self.param.layers)
            .field("levels", &self.param.levels)
            .field("samples", &self.param.samples)
            .field("views", &self.view_count)
            .finish()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyBackend;
    use rstest::rstest;

    fn backend() -> Arc<dyn GpuBackend> {
        Arc::new(DummyBackend::new())
    }

    fn params(width: u32, height: u32, layers: u32) -> TextureParams {
        TextureParams {
            format: PixelFormat::Rgba8Unorm,
            extent: Extent3d::new_2d(width, height),
            layers,
            levels: 1,
            samples: 1,
        }
    }

    #[rstest]
    #[case(Extent3d::new_2d(1, 1), 1)]
    #[case(Extent3d::new_2d(2, 2), 2)]
    #[case(Extent3d::new_2d(256, 256), 9)]
    #[case(Extent3d::new_2d(1024, 16), 11)]
    #[case(Extent3d::new_2d(100, 100), 7)]
    fn test_compute_levels(#[case] extent: Extent3d, #[case] expected: u32) {
        assert_eq!(compute_levels(extent), expected);
    }

    #[test]
    fn test_new_2d_views() {
        let tex = Texture::new_2d(backend(), &params(8, 8, 1)).unwrap();
        assert_eq!(tex.view_count(), 1);
        assert_eq!(tex.resolve_view(0), (0, 1));

        let tex = Texture::new_2d(backend(), &params(8, 8, 4)).unwrap();
        assert_eq!(tex.view_count(), 5);
        assert_eq!(tex.resolve_view(0), (0, 1));
        assert_eq!(tex.resolve_view(3), (3, 1));
        assert_eq!(tex.resolve_view(4), (0, 4));
    }

    #[test]
    fn test_new_cube_views() {
        let tex = Texture::new_cube(backend(), &params(8, 8, 6)).unwrap();
        assert_eq!(tex.view_count(), 1);
        assert_eq!(tex.resolve_view(0), (0, 6));

        let tex = Texture::new_cube(backend(), &params(8, 8, 18)).unwrap();
        assert_eq!(tex.view_count(), 4);
        assert_eq!(tex.resolve_view(0), (0, 6));
        assert_eq!(tex.resolve_view(2), (12, 6));
        assert_eq!(tex.resolve_view(3), (0, 18));
    }

    #[test]
    fn test_view_size() {
        let tex = Texture::new_2d(backend(), &params(4, 4, 2)).unwrap();
        assert_eq!(tex.view_size(0), 4 * 4 * 4);
        assert_eq!(tex.view_size(2), 4 * 4 * 4 * 2);
    }

    #[rstest]
    #[case(params(0, 8, 1))]
    #[case(params(8, 0, 1))]
    #[case(params(MAX_DIMENSION + 1, 8, 1))]
    #[case(params(8, 8, 0))]
    #[case(params(8, 8, MAX_LAYERS + 1))]
    #[case(TextureParams { levels: 0, ..params(8, 8, 1) })]
    #[case(TextureParams { levels: 5, ..params(8, 8, 1) })]
    #[case(TextureParams { samples: 3, ..params(8, 8, 1) })]
    #[case(TextureParams { extent: Extent3d { width: 8, height: 8, depth: 2 }, ..params(8, 8, 1) })]
    fn test_new_2d_rejects(#[case] param: TextureParams) {
        assert!(Texture::new_2d(backend(), &param).is_err());
    }

    #[rstest]
    #[case(params(8, 4, 6))]
    #[case(params(8, 8, 5))]
    #[case(params(8, 8, 0))]
    #[case(TextureParams { samples: 4, ..params(8, 8, 6) })]
    fn test_new_cube_rejects(#[case] param: TextureParams) {
        assert!(Texture::new_cube(backend(), &param).is_err());
    }

    #[test]
    fn test_new_target_usage() {
        let tex = Texture::new_target(backend(), &params(8, 8, 1)).unwrap();
        assert!(tex.usage().contains(TextureUsage::RENDER_TARGET));
    }

    #[test]
    fn test_multisample_target() {
        let param = TextureParams {
            samples: 4,
            ..params(8, 8, 1)
        };
        let tex = Texture::new_target(backend(), &param).unwrap();
        assert_eq!(tex.samples(), 4);
    }

    #[test]
    fn test_transition_and_set_layout() {
        let be = backend();
        let tex = Texture::new_2d(be.clone(), &params(8, 8, 2)).unwrap();
        let list = be.create_command_list().unwrap();
        be.begin(&list).unwrap();
        tex.transition(2, &list, ImageLayout::ShaderRead, Barrier::copy_write());
        assert_eq!(tex.layout(0), None);
        assert_eq!(tex.layout(1), None);
        be.end(&list).unwrap();
        be.submit(&[list]).unwrap();
        tex.set_layout(2, ImageLayout::ShaderRead);
        assert_eq!(tex.layout(0), Some(ImageLayout::ShaderRead));
        assert_eq!(tex.layout(1), Some(ImageLayout::ShaderRead));
    }

    #[test]
    #[should_panic(expected = "layout already pending")]
    fn test_transition_overlapping_views_panics() {
        let be = backend();
        let tex = Texture::new_2d(be.clone(), &params(8, 8, 2)).unwrap();
        let list = be.create_command_list().unwrap();
        be.begin(&list).unwrap();
        tex.transition(0, &list, ImageLayout::ShaderRead, Barrier::copy_write());
        // The array view includes layer 0, which is still pending.
        tex.transition(2, &list, ImageLayout::ShaderRead, Barrier::copy_write());
    }

    #[test]
    #[should_panic(expected = "command list not recording")]
    fn test_transition_requires_recording() {
        let be = backend();
        let tex = Texture::new_2d(be.clone(), &params(8, 8, 1)).unwrap();
        let list = be.create_command_list().unwrap();
        tex.transition(0, &list, ImageLayout::ShaderRead, Barrier::copy_write());
    }
}
