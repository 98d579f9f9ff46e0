//! Dummy GPU backend for testing and development.
//!
//! Unlike a no-op stub, this backend keeps buffer and image contents
//! in CPU memory and executes recorded copy commands at `submit`, so
//! staging round trips are observable without GPU hardware. Failure
//! injection hooks exercise the rollback paths of commits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StreamError;
use crate::types::{BufferDescriptor, ImageDescriptor, IndexFormat};

use super::{BufferImageCopy, GpuBuffer, GpuCommandList, GpuImage, LayoutTransition};

/// CPU-resident buffer storage.
pub struct DummyBuffer {
    bytes: Mutex<Vec<u8>>,
    capacity: u64,
}

impl DummyBuffer {
    /// Get the buffer capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

/// CPU-resident image storage, one byte vector per array layer.
pub struct DummyImage {
    layers: Mutex<Vec<Vec<u8>>>,
    layer_size: usize,
}

impl DummyImage {
    /// Get the number of array layers.
    pub fn layer_count(&self) -> usize {
        self.layers.lock().len()
    }

    /// Get the byte size of one layer's first mip level.
    pub fn layer_size(&self) -> usize {
        self.layer_size
    }
}

/// A command recorded into a [`DummyCommandList`].
enum DummyCommand {
    CopyBufferToImage {
        buffer: Arc<DummyBuffer>,
        buffer_offset: u64,
        image: Arc<DummyImage>,
        first_layer: u32,
        layer_count: u32,
    },
    CopyImageToBuffer {
        buffer: Arc<DummyBuffer>,
        buffer_offset: u64,
        image: Arc<DummyImage>,
        first_layer: u32,
        layer_count: u32,
    },
    Transition {
        count: usize,
    },
    Draw,
}

/// Command list that stores commands for execution at submit time.
pub struct DummyCommandList {
    recording: AtomicBool,
    commands: Mutex<Vec<DummyCommand>>,
}

impl DummyCommandList {
    /// Check whether the list is currently recording.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }
}

/// Dummy GPU backend.
#[derive(Debug, Default)]
pub struct DummyBackend {
    fail_next_end: AtomicBool,
    fail_next_submit: AtomicBool,
}

impl DummyBackend {
    /// Create a new dummy backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `end` call fail (for testing rollback paths).
    pub fn fail_next_end(&self) {
        self.fail_next_end.store(true, Ordering::Release);
    }

    /// Make the next `submit` call fail (for testing rollback paths).
    pub fn fail_next_submit(&self) {
        self.fail_next_submit.store(true, Ordering::Release);
    }

    fn execute(&self, commands: &[DummyCommand]) {
        for cmd in commands {
            match cmd {
                DummyCommand::CopyBufferToImage {
                    buffer,
                    buffer_offset,
                    image,
                    first_layer,
                    layer_count,
                } => {
                    let src = buffer.bytes.lock();
                    let mut layers = image.layers.lock();
                    let n = image.layer_size;
                    for l in 0..*layer_count as usize {
                        let start = *buffer_offset as usize + l * n;
                        let layer = &mut layers[*first_layer as usize + l];
                        layer.copy_from_slice(&src[start..start + n]);
                    }
                }
                DummyCommand::CopyImageToBuffer {
                    buffer,
                    buffer_offset,
                    image,
                    first_layer,
                    layer_count,
                } => {
                    let mut dst = buffer.bytes.lock();
                    let layers = image.layers.lock();
                    let n = image.layer_size;
                    for l in 0..*layer_count as usize {
                        let start = *buffer_offset as usize + l * n;
                        let layer = &layers[*first_layer as usize + l];
                        dst[start..start + n].copy_from_slice(layer);
                    }
                }
                DummyCommand::Transition { count } => {
                    log::trace!("DummyBackend: executing {count} transition(s)");
                }
                DummyCommand::Draw => {
                    log::trace!("DummyBackend: executing draw");
                }
            }
        }
    }
}

impl super::GpuBackend for DummyBackend {
    fn name(&self) -> &'static str {
        "Dummy"
    }

    fn create_buffer(&self, descriptor: &BufferDescriptor) -> Result<GpuBuffer, StreamError> {
        if descriptor.size == 0 {
            return Err(StreamError::InvalidParameter(
                "buffer size cannot be zero".to_string(),
            ));
        }
        log::trace!(
            "DummyBackend: creating buffer {:?} (size: {})",
            descriptor.label,
            descriptor.size
        );
        Ok(GpuBuffer::Dummy(Arc::new(DummyBuffer {
            bytes: Mutex::new(vec![0u8; descriptor.size as usize]),
            capacity: descriptor.size,
        })))
    }

    fn buffer_capacity(&self, buffer: &GpuBuffer) -> u64 {
        match buffer {
            GpuBuffer::Dummy(b) => b.capacity,
        }
    }

    fn write_buffer(&self, buffer: &GpuBuffer, offset: u64, data: &[u8]) {
        match buffer {
            GpuBuffer::Dummy(b) => {
                let mut bytes = b.bytes.lock();
                let start = offset as usize;
                bytes[start..start + data.len()].copy_from_slice(data);
            }
        }
    }

    fn read_buffer(&self, buffer: &GpuBuffer, offset: u64, dst: &mut [u8]) -> usize {
        match buffer {
            GpuBuffer::Dummy(b) => {
                let bytes = b.bytes.lock();
                let start = offset as usize;
                if start >= bytes.len() {
                    return 0;
                }
                let n = dst.len().min(bytes.len() - start);
                dst[..n].copy_from_slice(&bytes[start..start + n]);
                n
            }
        }
    }

    fn create_image(&self, descriptor: &ImageDescriptor) -> Result<GpuImage, StreamError> {
        if descriptor.extent.width == 0 || descriptor.extent.height == 0 {
            return Err(StreamError::InvalidParameter(
                "image dimensions cannot be zero".to_string(),
            ));
        }
        if descriptor.layers == 0 {
            return Err(StreamError::InvalidParameter(
                "image layer count cannot be zero".to_string(),
            ));
        }
        let layer_size = descriptor.format.size()
            * descriptor.extent.width as usize
            * descriptor.extent.height as usize;
        log::trace!(
            "DummyBackend: creating image {:?} ({}x{}, {} layer(s))",
            descriptor.label,
            descriptor.extent.width,
            descriptor.extent.height,
            descriptor.layers
        );
        Ok(GpuImage::Dummy(Arc::new(DummyImage {
            layers: Mutex::new(vec![vec![0u8; layer_size]; descriptor.layers as usize]),
            layer_size,
        })))
    }

    fn create_command_list(&self) -> Result<GpuCommandList, StreamError> {
        Ok(GpuCommandList::Dummy(Arc::new(DummyCommandList {
            recording: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
        })))
    }

    fn begin(&self, list: &GpuCommandList) -> Result<(), StreamError> {
        let GpuCommandList::Dummy(l) = list;
        assert!(!l.is_recording(), "command list is already recording");
        l.recording.store(true, Ordering::Release);
        Ok(())
    }

    fn end(&self, list: &GpuCommandList) -> Result<(), StreamError> {
        let GpuCommandList::Dummy(l) = list;
        assert!(l.is_recording(), "command list is not recording");
        if self.fail_next_end.swap(false, Ordering::AcqRel) {
            l.recording.store(false, Ordering::Release);
            l.commands.lock().clear();
            return Err(StreamError::SubmissionFailed(
                "injected end failure".to_string(),
            ));
        }
        l.recording.store(false, Ordering::Release);
        Ok(())
    }

    fn reset(&self, list: &GpuCommandList) {
        let GpuCommandList::Dummy(l) = list;
        l.recording.store(false, Ordering::Release);
        l.commands.lock().clear();
    }

    fn is_recording(&self, list: &GpuCommandList) -> bool {
        let GpuCommandList::Dummy(l) = list;
        l.is_recording()
    }

    fn record_transition(&self, list: &GpuCommandList, transitions: &[LayoutTransition]) {
        let GpuCommandList::Dummy(l) = list;
        debug_assert!(l.is_recording());
        l.commands.lock().push(DummyCommand::Transition {
            count: transitions.len(),
        });
    }

    fn record_copy_buffer_to_image(&self, list: &GpuCommandList, copy: &BufferImageCopy) {
        let GpuCommandList::Dummy(l) = list;
        debug_assert!(l.is_recording());
        let GpuBuffer::Dummy(buffer) = &copy.buffer;
        let GpuImage::Dummy(image) = &copy.image;
        l.commands.lock().push(DummyCommand::CopyBufferToImage {
            buffer: buffer.clone(),
            buffer_offset: copy.buffer_offset,
            image: image.clone(),
            first_layer: copy.image_layer,
            layer_count: copy.layers,
        });
    }

    fn record_copy_image_to_buffer(&self, list: &GpuCommandList, copy: &BufferImageCopy) {
        let GpuCommandList::Dummy(l) = list;
        debug_assert!(l.is_recording());
        let GpuBuffer::Dummy(buffer) = &copy.buffer;
        let GpuImage::Dummy(image) = &copy.image;
        l.commands.lock().push(DummyCommand::CopyImageToBuffer {
            buffer: buffer.clone(),
            buffer_offset: copy.buffer_offset,
            image: image.clone(),
            first_layer: copy.image_layer,
            layer_count: copy.layers,
        });
    }

    fn record_set_vertex_buffers(
        &self,
        list: &GpuCommandList,
        _first: u32,
        buffers: &[GpuBuffer],
        offsets: &[u64],
    ) {
        let GpuCommandList::Dummy(l) = list;
        debug_assert!(l.is_recording());
        debug_assert_eq!(buffers.len(), offsets.len());
        log::trace!("DummyBackend: binding {} vertex buffer(s)", buffers.len());
    }

    fn record_set_index_buffer(
        &self,
        list: &GpuCommandList,
        format: IndexFormat,
        _buffer: &GpuBuffer,
        offset: u64,
    ) {
        let GpuCommandList::Dummy(l) = list;
        debug_assert!(l.is_recording());
        log::trace!("DummyBackend: binding index buffer {format:?} at {offset}");
    }

    fn record_draw(&self, list: &GpuCommandList, vertex_count: u32, instance_count: u32) {
        let GpuCommandList::Dummy(l) = list;
        debug_assert!(l.is_recording());
        log::trace!("DummyBackend: draw {vertex_count} x{instance_count}");
        l.commands.lock().push(DummyCommand::Draw);
    }

    fn record_draw_indexed(&self, list: &GpuCommandList, index_count: u32, instance_count: u32) {
        let GpuCommandList::Dummy(l) = list;
        debug_assert!(l.is_recording());
        log::trace!("DummyBackend: draw indexed {index_count} x{instance_count}");
        l.commands.lock().push(DummyCommand::Draw);
    }

    fn submit(&self, lists: &[GpuCommandList]) -> Result<(), StreamError> {
        if self.fail_next_submit.swap(false, Ordering::AcqRel) {
            for list in lists {
                self.reset(list);
            }
            return Err(StreamError::SubmissionFailed(
                "injected submit failure".to_string(),
            ));
        }
        log::trace!("DummyBackend: submitting {} command list(s)", lists.len());
        for list in lists {
            let GpuCommandList::Dummy(l) = list;
            assert!(!l.is_recording(), "submitted list is still recording");
            let mut commands = l.commands.lock();
            self.execute(&commands);
            commands.clear();
        }
        Ok(())
    }
}

static_assertions::assert_impl_all!(DummyBackend: Send, Sync);
static_assertions::assert_impl_all!(DummyCommandList: Send, Sync);
