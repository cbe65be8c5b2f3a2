//! Output compositing.
//!
//! Takes decoded [`ImageBuffer`]s and writes them into the single shared
//! [`OutputTarget`]. The target is allocated lazily on the first image,
//! reallocated whenever the incoming dimensions differ, and otherwise
//! overwritten in place.
//!
//! Surfaces come from a [`SurfaceAllocator`] and are handed back to it on
//! resize or release, so every allocation is paired with exactly one
//! release.

use crate::error::ExchangeError;
use crate::exchange::types::ImageBuffer;

// ── Surface ──────────────────────────────────────────────────────

/// One allocation of RGBA storage.
#[derive(Debug)]
pub struct Surface {
    id: u64,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Surface {
    /// Zero-filled surface of the given size.
    pub fn new(id: u64, width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * ImageBuffer::BYTES_PER_TEXEL;
        Self {
            id,
            width,
            height,
            pixels: vec![0u8; len],
        }
    }

    /// Allocator-assigned identity.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

// ── SurfaceAllocator ─────────────────────────────────────────────

/// Source and sink of [`Surface`] storage.
pub trait SurfaceAllocator: Send {
    fn allocate(&mut self, width: u32, height: u32) -> Surface;
    fn release(&mut self, surface: Surface);
}

/// Plain heap allocator.
#[derive(Debug, Default)]
pub struct HeapAllocator {
    next_id: u64,
}

impl SurfaceAllocator for HeapAllocator {
    fn allocate(&mut self, width: u32, height: u32) -> Surface {
        self.next_id += 1;
        Surface::new(self.next_id, width, height)
    }

    fn release(&mut self, surface: Surface) {
        drop(surface);
    }
}

// ── OutputTarget ─────────────────────────────────────────────────

/// The shared render surface published to downstream consumers.
#[derive(Debug, Default)]
pub struct OutputTarget {
    surface: Option<Surface>,
    /// Incremented on every completed copy.
    generation: u64,
}

impl OutputTarget {
    pub fn is_allocated(&self) -> bool {
        self.surface.is_some()
    }

    /// `(width, height)` of the current allocation.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.surface.as_ref().map(|s| (s.width, s.height))
    }

    /// RGBA bytes of the current allocation (empty when unallocated).
    pub fn pixels(&self) -> &[u8] {
        self.surface.as_ref().map(|s| s.pixels()).unwrap_or_default()
    }

    /// Identity of the current allocation.
    pub fn surface_id(&self) -> Option<u64> {
        self.surface.as_ref().map(Surface::id)
    }

    /// Number of images applied so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

// ── FrameCompositor ──────────────────────────────────────────────

/// Owns the [`OutputTarget`] and its allocator.
pub struct FrameCompositor {
    allocator: Box<dyn SurfaceAllocator>,
    target: OutputTarget,
}

impl FrameCompositor {
    pub fn new() -> Self {
        Self::with_allocator(Box::new(HeapAllocator::default()))
    }

    pub fn with_allocator(allocator: Box<dyn SurfaceAllocator>) -> Self {
        Self {
            allocator,
            target: OutputTarget::default(),
        }
    }

    /// Current target (possibly unallocated).
    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    /// Copy `image` into the target, (re)allocating it first if needed.
    ///
    /// An image whose buffer does not hold exactly `width * height * 4`
    /// bytes, or that has no texels, is rejected with
    /// [`ExchangeError::MalformedResponse`] and the target is left as it
    /// was. The returned reference observes the completed copy.
    pub fn apply(&mut self, image: ImageBuffer) -> Result<&OutputTarget, ExchangeError> {
        if image.width == 0 || image.height == 0 {
            return Err(ExchangeError::MalformedResponse(format!(
                "image is {}x{}",
                image.width, image.height
            )));
        }
        if image.rgba.len() != image.byte_len() {
            return Err(ExchangeError::MalformedResponse(format!(
                "{}x{} image carries {} bytes, expected {}",
                image.width,
                image.height,
                image.rgba.len(),
                image.byte_len()
            )));
        }

        if self.target.dimensions() != Some((image.width, image.height)) {
            if let Some(old) = self.target.surface.take() {
                self.allocator.release(old);
            }
            self.target.surface = Some(self.allocator.allocate(image.width, image.height));
        }
        if let Some(surface) = self.target.surface.as_mut() {
            surface.pixels.copy_from_slice(&image.rgba);
        }
        self.target.generation += 1;

        Ok(&self.target)
    }

    /// Return the target's storage to the allocator.
    ///
    /// No-op when nothing is allocated.
    pub fn release(&mut self) {
        if let Some(surface) = self.target.surface.take() {
            self.allocator.release(surface);
        }
    }
}

impl Default for FrameCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FrameCompositor {
    fn drop(&mut self) {
        self.release();
    }
}

// ── Tests ────────────────────────────────────────────────────────
