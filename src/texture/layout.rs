//! Per-layer image layout tracking.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::ImageLayout;

/// Sentinel stored while a transition or copy owns a layer.
const PENDING: i64 = -1;

/// Tracks the driver layout of each layer of one image.
///
/// One atomic per layer; the pending sentinel doubles as a per-layer
/// lock, which is what lets many threads copy to different layers of
/// the same image concurrently without a texture-wide mutex. A layer
/// is pending if and only if exactly one in-flight transition or copy
/// targets it; starting a second one is a programming error and
/// panics.
pub struct LayoutTracker {
    layers: Vec<AtomicI64>,
}

impl LayoutTracker {
    /// Create a tracker with every layer in [`ImageLayout::Undefined`].
    pub fn new(layers: usize) -> Self {
        let mut v = Vec::with_capacity(layers);
        v.resize_with(layers, || AtomicI64::new(ImageLayout::Undefined.to_raw()));
        Self { layers: v }
    }

    /// Number of tracked layers.
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Mark a layer as pending and return the layout it was in.
    ///
    /// # Panics
    ///
    /// Panics if the layer is already pending. This is the single
    /// invariant preventing two concurrent copies or transitions from
    /// targeting the same layer.
    pub fn set_pending(&self, layer: usize) -> ImageLayout {
        let prev = self.layers[layer].swap(PENDING, Ordering::AcqRel);
        match ImageLayout::from_raw(prev) {
            Some(layout) => layout,
            None => panic!("layout already pending"),
        }
    }

    /// Resolve a pending layer to `layout`.
    ///
    /// # Panics
    ///
    /// Panics if the layer is not currently pending.
    pub fn unset_pending(&self, layer: usize, layout: ImageLayout) {
        if self.layers[layer]
            .compare_exchange(PENDING, layout.to_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            panic!("layout not pending");
        }
    }

    /// Get the layout of a layer, or `None` while it is pending.
    pub fn layout(&self, layer: usize) -> Option<ImageLayout> {
        ImageLayout::from_raw(self.layers[layer].load(Ordering::Acquire))
    }
}

impl std::fmt::Debug for LayoutTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutTracker")
            .field("layers", &self.layers.len())
            .finish()
    }
}

static_assertions::assert_impl_all!(LayoutTracker: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_undefined() {
        let t = LayoutTracker::new(4);
        for i in 0..4 {
            assert_eq!(t.layout(i), Some(ImageLayout::Undefined));
        }
    }

    #[test]
    fn test_pending_cycle() {
        let t = LayoutTracker::new(2);
        assert_eq!(t.set_pending(0), ImageLayout::Undefined);
        assert_eq!(t.layout(0), None);
        t.unset_pending(0, ImageLayout::CopyDst);
        assert_eq!(t.layout(0), Some(ImageLayout::CopyDst));
        assert_eq!(t.set_pending(0), ImageLayout::CopyDst);
        t.unset_pending(0, ImageLayout::Undefined);
        assert_eq!(t.layout(0), Some(ImageLayout::Undefined));
    }

    #[test]
    #[should_panic(expected = "layout already pending")]
    fn test_double_pending_panics() {
        let t = LayoutTracker::new(1);
        t.set_pending(0);
        t.set_pending(0);
    }

    #[test]
    #[should_panic(expected = "layout not pending")]
    fn test_unset_not_pending_panics() {
        let t = LayoutTracker::new(1);
        t.unset_pending(0, ImageLayout::CopyDst);
    }

    #[test]
    fn test_independent_layers() {
        let t = LayoutTracker::new(3);
        t.set_pending(1);
        assert_eq!(t.layout(0), Some(ImageLayout::Undefined));
        assert_eq!(t.layout(2), Some(ImageLayout::Undefined));
        t.set_pending(2);
        t.unset_pending(1, ImageLayout::ShaderRead);
        assert_eq!(t.layout(1), Some(ImageLayout::ShaderRead));
        t.unset_pending(2, ImageLayout::Undefined);
    }
}
